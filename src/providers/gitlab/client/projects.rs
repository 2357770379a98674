use super::core::{GitLabClient, PAGE_SIZE};
use crate::error::Result;
use crate::providers::gitlab::types::{
    GitLabCommit, GitLabCompare, GitLabDiff, GitLabMergeRequest, GitLabProject, GitLabVariable,
    GitLabVersion,
};

impl GitLabClient {
    pub async fn fetch_project(&self, project_id: u64) -> Result<GitLabProject> {
        let url = self.api_path(&format!("projects/{project_id}"))?;
        self.get_json(&url).await
    }

    pub async fn fetch_merge_request(
        &self,
        project_id: u64,
        iid: u64,
    ) -> Result<GitLabMergeRequest> {
        let url = self.project_url(project_id, &format!("merge_requests/{iid}"))?;
        self.get_json(&url).await
    }

    pub async fn fetch_merge_request_commits(
        &self,
        project_id: u64,
        iid: u64,
    ) -> Result<Vec<GitLabCommit>> {
        let mut url = self.project_url(project_id, &format!("merge_requests/{iid}/commits"))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());
        self.get_json(&url).await
    }

    pub async fn fetch_compare(&self, project_id: u64, from: &str, to: &str) -> Result<GitLabCompare> {
        let mut url = self.project_url(project_id, "repository/compare")?;
        url.query_pairs_mut()
            .append_pair("from", from)
            .append_pair("to", to);
        self.get_json(&url).await
    }

    pub async fn fetch_commit_diff(&self, project_id: u64, sha: &str) -> Result<Vec<GitLabDiff>> {
        let mut url = self.project_url(project_id, &format!("repository/commits/{sha}/diff"))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());
        self.get_json(&url).await
    }

    pub async fn fetch_project_variable(
        &self,
        project_id: u64,
        key: &str,
    ) -> Result<Option<GitLabVariable>> {
        let url = self.project_url(
            project_id,
            &format!("variables/{}", urlencoding::encode(key)),
        )?;
        self.get_optional_json(&url).await
    }

    /// Variables defined on a group, addressed by its full path.
    pub async fn fetch_group_variables(&self, group_path: &str) -> Result<Vec<GitLabVariable>> {
        let mut url = self.api_path(&format!(
            "groups/{}/variables",
            urlencoding::encode(group_path)
        ))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());
        self.get_json(&url).await
    }

    pub async fn fetch_version(&self) -> Result<String> {
        let url = self.api_path("version")?;
        let version: GitLabVersion = self.get_json(&url).await?;
        Ok(version.version)
    }
}
