use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitLab project as returned by `GET /projects/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabProject {
    pub id: u64,
    /// Full path (e.g., "group/subgroup/project")
    pub path_with_namespace: String,
    #[serde(default)]
    pub http_url_to_repo: String,
    #[serde(default)]
    pub ssh_url_to_repo: String,
    pub namespace: Option<GitLabNamespace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabNamespace {
    pub id: u64,
    /// `group` or `user`
    pub kind: String,
    pub full_path: String,
}

/// A CI job as returned by `GET /projects/:id/jobs/:job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabJob {
    pub id: u64,
    pub name: String,
    /// Present only when the job uploaded an artifacts archive
    pub artifacts_file: Option<ArtifactsFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsFile {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabMergeRequest {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub author: Option<GitLabUser>,
    pub web_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabUser {
    pub username: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub committer_name: String,
    #[serde(default)]
    pub committer_email: String,
    pub committed_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl GitLabCommit {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.committed_date.or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabCompare {
    #[serde(default)]
    pub commits: Vec<GitLabCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabDiff {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
}

impl GitLabDiff {
    /// Change type as the CI servers name it.
    pub fn change_type(&self) -> &'static str {
        if self.new_file {
            "add"
        } else if self.deleted_file {
            "delete"
        } else {
            "edit"
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabVariable {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabVersion {
    pub version: String,
}
