use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

use super::client::GitLabClient;
use super::types::{
    GitLabCommit, GitLabCompare, GitLabDiff, GitLabJob, GitLabMergeRequest, GitLabProject,
    GitLabVariable,
};

/// The GitLab lookups the relay depends on.
///
/// Implemented by [`GitLabClient`] over the REST API; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    async fn project(&self, project_id: u64) -> Result<GitLabProject>;

    async fn job(&self, project_id: u64, job_id: u64) -> Result<GitLabJob>;

    async fn merge_request(&self, project_id: u64, iid: u64) -> Result<GitLabMergeRequest>;

    async fn merge_request_commits(&self, project_id: u64, iid: u64) -> Result<Vec<GitLabCommit>>;

    async fn compare(&self, project_id: u64, from: &str, to: &str) -> Result<GitLabCompare>;

    async fn commit_diff(&self, project_id: u64, sha: &str) -> Result<Vec<GitLabDiff>>;

    /// Returns `None` when the project does not define the variable.
    async fn project_variable(&self, project_id: u64, key: &str)
        -> Result<Option<GitLabVariable>>;

    async fn group_variables(&self, group_path: &str) -> Result<Vec<GitLabVariable>>;

    async fn download_artifacts(&self, project_id: u64, job_id: u64) -> Result<Bytes>;

    async fn version(&self) -> Result<String>;
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn project(&self, project_id: u64) -> Result<GitLabProject> {
        self.fetch_project(project_id).await
    }

    async fn job(&self, project_id: u64, job_id: u64) -> Result<GitLabJob> {
        self.fetch_job(project_id, job_id).await
    }

    async fn merge_request(&self, project_id: u64, iid: u64) -> Result<GitLabMergeRequest> {
        self.fetch_merge_request(project_id, iid).await
    }

    async fn merge_request_commits(&self, project_id: u64, iid: u64) -> Result<Vec<GitLabCommit>> {
        self.fetch_merge_request_commits(project_id, iid).await
    }

    async fn compare(&self, project_id: u64, from: &str, to: &str) -> Result<GitLabCompare> {
        self.fetch_compare(project_id, from, to).await
    }

    async fn commit_diff(&self, project_id: u64, sha: &str) -> Result<Vec<GitLabDiff>> {
        self.fetch_commit_diff(project_id, sha).await
    }

    async fn project_variable(
        &self,
        project_id: u64,
        key: &str,
    ) -> Result<Option<GitLabVariable>> {
        self.fetch_project_variable(project_id, key).await
    }

    async fn group_variables(&self, group_path: &str) -> Result<Vec<GitLabVariable>> {
        self.fetch_group_variables(group_path).await
    }

    async fn download_artifacts(&self, project_id: u64, job_id: u64) -> Result<Bytes> {
        self.fetch_artifacts(project_id, job_id).await
    }

    async fn version(&self) -> Result<String> {
        self.fetch_version().await
    }
}
