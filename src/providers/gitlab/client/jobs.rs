use bytes::Bytes;

use super::core::GitLabClient;
use crate::error::Result;
use crate::providers::gitlab::types::GitLabJob;

impl GitLabClient {
    pub async fn fetch_job(&self, project_id: u64, job_id: u64) -> Result<GitLabJob> {
        let url = self.project_url(project_id, &format!("jobs/{job_id}"))?;
        self.get_json(&url).await
    }

    /// Downloads the job's artifacts archive (a zip file).
    pub async fn fetch_artifacts(&self, project_id: u64, job_id: u64) -> Result<Bytes> {
        let url = self.project_url(project_id, &format!("jobs/{job_id}/artifacts"))?;
        self.get_bytes(&url).await
    }
}
