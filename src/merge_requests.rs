//! Forwarding of merge-request notifications as pull requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;

use crate::config::VariableNames;
use crate::downstream::CiServers;
use crate::error::Result;
use crate::events::{commit_changes, ScmChange, ScmCommit};
use crate::hooks::MergeRequestHook;
use crate::providers::gitlab::{variables, GitLabApi, GitLabCommit, GitLabMergeRequest};

pub const UNKNOWN_ACTION_WARNING: &str = "Unknown event on merge request has taken place!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRequestAction {
    Open,
    Update,
    Close,
    Reopen,
    Merge,
    Unknown,
}

impl MergeRequestAction {
    pub fn from_action(action: &str) -> Self {
        match action {
            "open" => Self::Open,
            "update" => Self::Update,
            "close" => Self::Close,
            "reopen" => Self::Reopen,
            "merge" => Self::Merge,
            _ => Self::Unknown,
        }
    }
}

/// A merge request in the shape the CI servers ingest pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub state: String,
    pub author_name: String,
    pub repository_url: String,
    pub source_branch: String,
    pub target_branch: String,
    pub self_url: String,
    pub is_merged: bool,
    /// Milliseconds since the epoch
    pub created_time: Option<i64>,
    pub updated_time: Option<i64>,
    pub merged_time: Option<i64>,
    pub closed_time: Option<i64>,
    pub commits: Vec<ScmCommit>,
}

pub struct MergeRequestForwarder {
    gitlab: Arc<dyn GitLabApi>,
    servers: CiServers,
    variables: VariableNames,
}

impl MergeRequestForwarder {
    pub fn new(gitlab: Arc<dyn GitLabApi>, servers: CiServers, variables: VariableNames) -> Self {
        Self {
            gitlab,
            servers,
            variables,
        }
    }

    /// Forwards a merge request to the CI servers when its project opted in.
    ///
    /// Returns a warning for the webhook response when the notification could
    /// not be forwarded for a reason the project owner should fix.
    pub async fn forward(&self, hook: &MergeRequestHook) -> Result<Option<String>> {
        let action = hook.object_attributes.action.as_deref().unwrap_or_default();
        info!("Merge request !{} {action}", hook.object_attributes.iid);

        if MergeRequestAction::from_action(action) == MergeRequestAction::Unknown {
            warn!("{UNKNOWN_ACTION_WARNING}");
            return Ok(Some(UNKNOWN_ACTION_WARNING.to_string()));
        }

        let gitlab = self.gitlab.as_ref();
        let project = gitlab.project(hook.project.id).await?;

        if !variables::resolve_flag(gitlab, &project, &self.variables.publish_merge_requests).await {
            return Ok(None);
        }

        let Some(workspace) =
            variables::resolve_variable(gitlab, &project, &self.variables.destination_workspace)
                .await
        else {
            let warning = format!(
                "Variable for destination workspace has not been set for project with id {}",
                project.id
            );
            warn!("{warning}");
            return Ok(Some(warning));
        };

        let repository_url =
            if variables::resolve_flag(gitlab, &project, &self.variables.use_ssh_format).await {
                project.ssh_url_to_repo.clone()
            } else {
                project.http_url_to_repo.clone()
            };

        let merge_request = gitlab
            .merge_request(project.id, hook.object_attributes.iid)
            .await?;
        let commits = gitlab
            .merge_request_commits(project.id, merge_request.iid)
            .await?;

        let changes = join_all(
            commits
                .iter()
                .map(|commit| commit_changes(gitlab, project.id, &commit.id)),
        )
        .await;
        let scm_commits = commits
            .into_iter()
            .zip(changes)
            .map(|(commit, changes)| scm_commit(commit, changes))
            .collect();

        let pull_request = pull_request(merge_request, repository_url, scm_commits);
        info!(
            "Publishing merge request !{} of {} to workspace {workspace}",
            pull_request.id, project.path_with_namespace
        );
        self.servers
            .publish_pull_request(&workspace, &pull_request)
            .await;

        Ok(None)
    }
}

fn scm_commit(commit: GitLabCommit, changes: Vec<ScmChange>) -> ScmCommit {
    ScmCommit {
        time: commit
            .timestamp()
            .unwrap_or_else(Utc::now)
            .timestamp_millis(),
        user: commit.committer_name,
        user_email: commit.committer_email,
        parent_rev_id: commit.parent_ids.into_iter().next().unwrap_or_default(),
        rev_id: commit.id,
        comment: commit.message,
        changes,
    }
}

fn pull_request(
    merge_request: GitLabMergeRequest,
    repository_url: String,
    commits: Vec<ScmCommit>,
) -> PullRequest {
    let millis = |time: Option<DateTime<Utc>>| time.map(|t| t.timestamp_millis());

    PullRequest {
        id: merge_request.iid.to_string(),
        title: merge_request.title,
        description: merge_request.description.unwrap_or_default(),
        is_merged: merge_request.state == "merged",
        state: merge_request.state,
        author_name: merge_request
            .author
            .map(|author| author.username)
            .unwrap_or_default(),
        repository_url,
        source_branch: merge_request.source_branch,
        target_branch: merge_request.target_branch,
        self_url: merge_request.web_url,
        created_time: millis(merge_request.created_at),
        updated_time: millis(merge_request.updated_at),
        merged_time: millis(merge_request.merged_at),
        closed_time: millis(merge_request.closed_at),
        commits,
    }
}
