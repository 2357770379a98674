//! Normalized CI events and how they are derived from webhook notifications.

mod causes;
mod identity;
mod timing;
mod types;

pub use identity::Identity;
pub use types::*;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};

use crate::error::Result;
use crate::hooks::{Notification, PipelineHook, BLANK_SHA};
use crate::providers::gitlab::GitLabApi;
use timing::{duration_seconds, normalize_duration, Timestamps};

/// Builds [`CiEvent`]s from notifications.
pub struct EventBuilder {
    gitlab: Arc<dyn GitLabApi>,
    job_ci_id_prefix: String,
}

impl EventBuilder {
    pub fn new(gitlab: Arc<dyn GitLabApi>, job_ci_id_prefix: impl Into<String>) -> Self {
        Self {
            gitlab,
            job_ci_id_prefix: job_ci_id_prefix.into(),
        }
    }

    pub async fn identify(&self, notification: &Notification) -> Identity {
        Identity::resolve(notification, self.gitlab.as_ref()).await
    }

    /// Builds the event for a notification.
    ///
    /// Fails only when the payload carries a duration in a representation
    /// GitLab never sends.
    pub fn build(
        &self,
        notification: &Notification,
        identity: &Identity,
        parameters: Vec<Parameter>,
    ) -> Result<CiEvent> {
        let event_type = notification.event_type();
        let prefix = self.job_ci_id_prefix.as_str();

        let (raw_duration, timestamps) = match notification {
            Notification::Pipeline(pipeline) => {
                let attributes = &pipeline.object_attributes;
                (
                    attributes.duration.as_ref(),
                    Timestamps {
                        created_at: attributes.created_at.as_deref(),
                        started_at: attributes.started_at.as_deref(),
                        finished_at: attributes.finished_at.as_deref(),
                    },
                )
            }
            Notification::Build(build) => (
                build.build_duration.as_ref(),
                Timestamps {
                    created_at: build.build_created_at.as_deref(),
                    started_at: build.build_started_at.as_deref(),
                    finished_at: build.build_finished_at.as_deref(),
                },
            ),
            _ => (None, Timestamps::default()),
        };
        // Started events report no duration, so an unreadable one is ignored.
        let seconds = match duration_seconds(raw_duration) {
            Err(e) if event_type == EventType::Started => {
                debug!("Ignoring duration of a started event: {e}");
                None
            }
            seconds => seconds?,
        };

        let has_scm_data = match notification {
            Notification::Pipeline(pipeline) if event_type != EventType::Started => {
                has_commit_range(pipeline)
            }
            _ => false,
        };

        let result = match event_type {
            EventType::Started | EventType::Deleted => BuildResult::Unavailable,
            _ => BuildResult::from_status(notification.status()),
        };

        let project = identity.ci_full_name(notification, prefix);
        let target_id = notification.target_id().to_string();

        let mut event = CiEvent {
            event_type,
            project_display_name: identity.display_name(notification),
            build_ci_id: target_id.clone(),
            number: Some(target_id),
            parent_ci_id: None,
            multi_branch_type: None,
            skip_validation: project.ends_with("/build"),
            start_time: timing::start_time(timestamps, seconds),
            duration: Some(normalize_duration(event_type, seconds)),
            result: Some(result),
            causes: causes::causes(notification, has_scm_data, &identity.project_ci_id(prefix)),
            parameters,
            scm_data: None,
            phase_type: Some(if notification.is_pipeline() {
                PhaseType::Post
            } else {
                PhaseType::Internal
            }),
            project,
        };

        if let Notification::Pipeline(pipeline) = notification {
            let display_path = pipeline
                .project
                .path_with_namespace
                .clone()
                .unwrap_or_else(|| identity.project_full_path.clone());
            event.project_display_name = format!("{display_path}/{}", identity.branch);
            event.parent_ci_id = Some(format!("{prefix}{}", identity.project_full_path));
            event.multi_branch_type = Some(MultiBranchType::MultiBranchChild);
            event.skip_validation = true;
        }

        Ok(event)
    }

    /// The SCM event companion of a pipeline start: the commits between the
    /// previous and the current pipeline SHA.
    ///
    /// `None` when the pipeline has no previous SHA or GitLab cannot compare
    /// the two.
    pub async fn scm_event(
        &self,
        notification: &Notification,
        identity: &Identity,
    ) -> Option<CiEvent> {
        let Notification::Pipeline(pipeline) = notification else {
            return None;
        };
        if !has_commit_range(pipeline) {
            return None;
        }

        let scm_data = self.scm_data(pipeline, identity).await?;

        Some(CiEvent {
            event_type: EventType::Scm,
            project: identity.ci_full_name(notification, &self.job_ci_id_prefix),
            project_display_name: identity.display_name(notification),
            build_ci_id: notification.target_id().to_string(),
            number: None,
            parent_ci_id: None,
            multi_branch_type: None,
            skip_validation: false,
            start_time: None,
            duration: None,
            result: None,
            causes: causes::causes(
                notification,
                true,
                &identity.project_ci_id(&self.job_ci_id_prefix),
            ),
            parameters: Vec::new(),
            scm_data: Some(scm_data),
            phase_type: None,
        })
    }

    async fn scm_data(&self, pipeline: &PipelineHook, identity: &Identity) -> Option<ScmData> {
        let project_id = pipeline.project.id;
        let sha = &pipeline.object_attributes.sha;
        let before_sha = &pipeline.object_attributes.before_sha;

        let compare = match self.gitlab.compare(project_id, before_sha, sha).await {
            Ok(compare) => compare,
            Err(e) => {
                warn!("Failed to compare {before_sha}..{sha} of project {project_id}, skipping SCM data: {e}");
                return None;
            }
        };

        info!(
            "Reading {} commits between {before_sha} and {sha}",
            compare.commits.len()
        );
        let changes = join_all(
            compare
                .commits
                .iter()
                .map(|commit| commit_changes(self.gitlab.as_ref(), project_id, &commit.id)),
        )
        .await;

        let commits = compare
            .commits
            .into_iter()
            .zip(changes)
            .map(|(commit, changes)| ScmCommit {
                time: commit
                    .timestamp()
                    .unwrap_or_else(Utc::now)
                    .timestamp_millis(),
                user: commit.committer_name,
                user_email: commit.committer_email,
                rev_id: commit.id,
                parent_rev_id: sha.clone(),
                comment: commit.message,
                changes,
            })
            .collect();

        Some(ScmData {
            repository: ScmRepository {
                kind: "git".to_string(),
                url: pipeline.project.git_http_url.clone().unwrap_or_default(),
                branch: identity.branch.clone(),
            },
            built_rev_id: sha.clone(),
            commits,
        })
    }
}

/// File changes of one commit; a failed diff lookup yields none.
pub async fn commit_changes(gitlab: &dyn GitLabApi, project_id: u64, sha: &str) -> Vec<ScmChange> {
    match gitlab.commit_diff(project_id, sha).await {
        Ok(diffs) => diffs
            .iter()
            .map(|diff| ScmChange {
                kind: diff.change_type().to_string(),
                file: diff.new_path.clone(),
            })
            .collect(),
        Err(e) => {
            warn!("Failed to read the diff of commit {sha}: {e}");
            Vec::new()
        }
    }
}

fn has_commit_range(pipeline: &PipelineHook) -> bool {
    let before_sha = &pipeline.object_attributes.before_sha;
    !before_sha.is_empty() && before_sha != BLANK_SHA
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::fixtures;
    use crate::testing::FakeGitLab;
    use serde_json::json;

    fn builder(gitlab: FakeGitLab) -> EventBuilder {
        EventBuilder::new(Arc::new(gitlab), "pipeline:")
    }

    async fn build_event(builder: &EventBuilder, raw: serde_json::Value) -> CiEvent {
        let notification = Notification::parse(raw).unwrap();
        let identity = builder.identify(&notification).await;
        builder.build(&notification, &identity, Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_start_event() {
        let builder = builder(FakeGitLab::default());

        let event = build_event(&builder, fixtures::pipeline(100, "pending", json!([]))).await;

        assert_eq!(event.event_type, EventType::Started);
        assert_eq!(event.project, "pipeline:group/app/feature-login");
        assert_eq!(event.project_display_name, "Group/App/feature/login");
        assert_eq!(event.parent_ci_id.as_deref(), Some("pipeline:group/app"));
        assert_eq!(event.multi_branch_type, Some(MultiBranchType::MultiBranchChild));
        assert!(event.skip_validation);
        assert_eq!(event.build_ci_id, "100");
        assert_eq!(event.duration, Some(0));
        assert_eq!(event.result, Some(BuildResult::Unavailable));
        assert_eq!(event.phase_type, Some(PhaseType::Post));
        assert_eq!(event.start_time, Some(1_709_287_200_000));
    }

    #[tokio::test]
    async fn test_build_finish_event() {
        let builder = builder(FakeGitLab::default());

        let event = build_event(&builder, fixtures::build(100, 5, "test", "failed")).await;

        assert_eq!(event.event_type, EventType::Finished);
        assert_eq!(event.project, "group/app/test");
        assert_eq!(event.project_display_name, "test");
        assert_eq!(event.build_ci_id, "5");
        assert_eq!(event.duration, Some(12_500));
        assert_eq!(event.result, Some(BuildResult::Failure));
        assert_eq!(event.phase_type, Some(PhaseType::Internal));
        assert!(!event.skip_validation);
        assert!(matches!(event.causes[0], Cause::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_build_job_named_build_skips_validation() {
        let builder = builder(FakeGitLab::default());

        let event = build_event(&builder, fixtures::build(100, 5, "build", "success")).await;

        assert!(event.skip_validation);
    }

    #[tokio::test]
    async fn test_string_duration_is_rejected() {
        let builder = builder(FakeGitLab::default());
        let mut raw = fixtures::build(100, 5, "test", "success");
        raw["build_duration"] = json!("12.5");
        let notification = Notification::parse(raw).unwrap();
        let identity = builder.identify(&notification).await;

        assert!(builder.build(&notification, &identity, Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_started_event_ignores_unreadable_duration() {
        let builder = builder(FakeGitLab::default());
        let mut raw = fixtures::pipeline(100, "pending", json!([]));
        raw["object_attributes"]["duration"] = json!("12.5");

        let event = build_event(&builder, raw).await;

        assert_eq!(event.event_type, EventType::Started);
        assert_eq!(event.duration, Some(0));
        assert_eq!(event.start_time, Some(1_709_287_200_000));
    }

    #[tokio::test]
    async fn test_event_serializes_camel_case() {
        let builder = builder(FakeGitLab::default());

        let event = build_event(&builder, fixtures::build(100, 5, "test", "success")).await;
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], "FINISHED");
        assert_eq!(value["buildCiId"], "5");
        assert_eq!(value["causes"][0]["type"], "UPSTREAM");
        assert_eq!(value["causes"][0]["buildCiId"], "100");
        assert_eq!(value["phaseType"], "internal");
    }

    #[tokio::test]
    async fn test_no_scm_event_without_previous_sha() {
        let builder = builder(FakeGitLab::default());
        let notification =
            Notification::parse(fixtures::pipeline(100, "pending", json!([]))).unwrap();
        let identity = builder.identify(&notification).await;

        assert!(builder.scm_event(&notification, &identity).await.is_none());
    }

    #[tokio::test]
    async fn test_scm_event_lists_compared_commits() {
        let gitlab = FakeGitLab::default().with_compared_commit("c1", "src/main.rs", true);
        let builder = builder(gitlab);
        let mut raw = fixtures::pipeline(100, "pending", json!([]));
        raw["object_attributes"]["before_sha"] = json!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let notification = Notification::parse(raw).unwrap();
        let identity = builder.identify(&notification).await;

        let event = builder.scm_event(&notification, &identity).await.unwrap();

        assert_eq!(event.event_type, EventType::Scm);
        assert_eq!(event.causes, vec![Cause::Scm]);
        let scm = event.scm_data.unwrap();
        assert_eq!(scm.repository.branch, "feature/login");
        assert_eq!(scm.commits.len(), 1);
        assert_eq!(scm.commits[0].rev_id, "c1");
        assert_eq!(scm.commits[0].changes[0].kind, "add");
        assert_eq!(scm.commits[0].changes[0].file, "src/main.rs");
    }
}
