use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Queued,
    Started,
    Finished,
    Deleted,
    Undefined,
    Scm,
}

impl EventType {
    /// Maps a GitLab status string to an event type, without the
    /// pipeline-specific overrides.
    pub fn from_status(status: &str) -> Self {
        match status {
            "process" | "enqueue" | "pending" | "created" => Self::Queued,
            "success" | "failed" | "canceled" | "skipped" => Self::Finished,
            "running" | "manual" => Self::Started,
            "delete" => Self::Deleted,
            _ => Self::Undefined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Aborted,
    Unstable,
    Unavailable,
}

impl BuildResult {
    pub fn from_status(status: &str) -> Self {
        match status {
            "success" => Self::Success,
            "failed" => Self::Failure,
            "drop" | "skipped" | "canceled" => Self::Aborted,
            "unstable" => Self::Unstable,
            _ => Self::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
    Post,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultiBranchType {
    MultiBranchChild,
}

/// Why a build ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cause {
    User {
        user: String,
    },
    Timer,
    Scm,
    Upstream {
        project: String,
        #[serde(rename = "buildCiId")]
        build_ci_id: String,
        causes: Vec<Cause>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScmData {
    pub repository: ScmRepository,
    pub built_rev_id: String,
    pub commits: Vec<ScmCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmRepository {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScmCommit {
    /// Milliseconds since the epoch
    pub time: i64,
    pub user: String,
    pub user_email: String,
    pub rev_id: String,
    pub parent_rev_id: String,
    pub comment: String,
    pub changes: Vec<ScmChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmChange {
    /// `add`, `delete` or `edit`
    #[serde(rename = "type")]
    pub kind: String,
    pub file: String,
}

/// A CI event as the downstream CI servers ingest it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiEvent {
    pub event_type: EventType,
    pub project: String,
    pub project_display_name: String,
    pub build_ci_id: String,
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ci_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_branch_type: Option<MultiBranchType>,
    pub skip_validation: bool,
    /// Milliseconds since the epoch
    pub start_time: Option<i64>,
    /// Milliseconds
    pub duration: Option<i64>,
    pub result: Option<BuildResult>,
    pub causes: Vec<Cause>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scm_data: Option<ScmData>,
    pub phase_type: Option<PhaseType>,
}
