use serde::Deserialize;
use serde_json::Value;

/// Payload of a `pipeline` webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineHook {
    pub object_attributes: PipelineAttributes,
    pub project: HookProject,
    pub user: Option<HookUser>,
    /// Jobs GitLab created for the pipeline
    #[serde(default)]
    pub builds: Vec<HookBuild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAttributes {
    pub id: u64,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub status: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub before_sha: String,
    /// Seconds; GitLab sends either an integer or a decimal
    #[serde(default)]
    pub duration: Option<Value>,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    #[serde(default)]
    pub variables: Vec<HookVariable>,
    /// Either a JSON boolean or the string `"true"`
    #[serde(default)]
    pub pipeline_schedule: Option<Value>,
}

/// Payload of a `build` (job) webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildHook {
    pub build_id: u64,
    pub build_name: String,
    pub build_status: String,
    pub pipeline_id: u64,
    pub project_id: u64,
    #[serde(rename = "ref")]
    pub ref_: String,
    #[serde(default)]
    pub build_duration: Option<Value>,
    pub build_created_at: Option<String>,
    pub build_started_at: Option<String>,
    pub build_finished_at: Option<String>,
    pub user: Option<HookUser>,
    pub repository: HookRepository,
}

/// Payload of a `merge_request` webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestHook {
    pub object_attributes: MergeRequestAttributes,
    pub project: HookProject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestAttributes {
    pub iid: u64,
    pub action: Option<String>,
}

/// Payload of a `push` webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PushHook {
    pub after: String,
    pub checkout_sha: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub user_name: Option<String>,
    pub project_id: u64,
    pub repository: HookRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookProject {
    pub id: u64,
    #[serde(default)]
    pub web_url: String,
    pub path_with_namespace: Option<String>,
    pub git_http_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookRepository {
    #[serde(default)]
    pub homepage: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookUser {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookBuild {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookVariable {
    pub key: String,
    #[serde(default)]
    pub value: String,
}
