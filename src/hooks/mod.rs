//! Typed GitLab webhook notifications and their classification.
//!
//! The inbound endpoint accepts an untyped JSON document; [`Notification::parse`]
//! is the only place that document is looked at as raw JSON.

mod types;

pub use types::*;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::events::EventType;

/// Correlation key of all pipeline-scoped state.
pub type PipelineId = u64;

/// GitLab's placeholder SHA for "no commit" (new branch, deleted branch).
pub const BLANK_SHA: &str = "0000000000000000000000000000000000000000";

/// A webhook notification, discriminated by its `object_kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "object_kind", rename_all = "snake_case")]
pub enum Notification {
    Pipeline(PipelineHook),
    Build(BuildHook),
    MergeRequest(MergeRequestHook),
    Push(PushHook),
}

/// What a notification describes, after looking past the raw `object_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Pipeline,
    Build,
    MergeRequest,
    DeleteBranch,
    Push,
}

impl Notification {
    /// Parses a raw webhook document into its typed form.
    pub fn parse(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| RelayError::Payload(e.to_string()))
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Pipeline(_) => NotificationKind::Pipeline,
            Self::Build(_) => NotificationKind::Build,
            Self::MergeRequest(_) => NotificationKind::MergeRequest,
            Self::Push(push) if push.is_branch_deletion() => NotificationKind::DeleteBranch,
            Self::Push(_) => NotificationKind::Push,
        }
    }

    /// The raw status string the event type is derived from.
    pub fn status(&self) -> &str {
        match self {
            Self::Pipeline(pipeline) => &pipeline.object_attributes.status,
            Self::Build(build) => &build.build_status,
            Self::MergeRequest(mr) => mr.object_attributes.action.as_deref().unwrap_or(""),
            Self::Push(push) if push.is_branch_deletion() => "delete",
            Self::Push(_) => "undefined",
        }
    }

    pub fn event_type(&self) -> EventType {
        let status = self.status();
        if let Self::Pipeline(_) = self {
            match status {
                "pending" => return EventType::Started,
                "running" => return EventType::Undefined,
                _ => {}
            }
        }
        EventType::from_status(status)
    }

    /// Pipeline the notification belongs to; only pipelines and builds have one.
    pub fn pipeline_id(&self) -> Option<PipelineId> {
        match self {
            Self::Pipeline(pipeline) => Some(pipeline.object_attributes.id),
            Self::Build(build) => Some(build.pipeline_id),
            _ => None,
        }
    }

    /// Identifier of the object the notification is about: the pipeline, the
    /// job, the merge request iid, or the project for a deleted branch.
    pub fn target_id(&self) -> u64 {
        match self {
            Self::Pipeline(pipeline) => pipeline.object_attributes.id,
            Self::Build(build) => build.build_id,
            Self::MergeRequest(mr) => mr.object_attributes.iid,
            Self::Push(push) => push.project_id,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline(_))
    }

    /// Name of the job, for build notifications.
    pub fn build_name(&self) -> Option<&str> {
        match self {
            Self::Build(build) => Some(&build.build_name),
            _ => None,
        }
    }
}

impl PushHook {
    /// A push deletes a branch when it moves the ref to the blank SHA and has
    /// nothing left to check out.
    pub fn is_branch_deletion(&self) -> bool {
        !self.after.is_empty() && self.after.chars().all(|c| c == '0') && self.checkout_sha.is_none()
    }
}

impl PipelineHook {
    /// Name of the job with the highest id among the pipeline's builds.
    pub fn last_job_name(&self) -> String {
        self.builds
            .iter()
            .filter(|build| build.id > 0)
            .max_by_key(|build| build.id)
            .map(|build| build.name.clone())
            .unwrap_or_default()
    }

    pub fn is_scheduled(&self) -> bool {
        match &self.object_attributes.pipeline_schedule {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag == "true",
            _ => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_delete_branch_push() {
        let notification = Notification::parse(fixtures::delete_branch()).unwrap();
        assert_eq!(notification.kind(), NotificationKind::DeleteBranch);
        assert_eq!(notification.event_type(), EventType::Deleted);
    }

    #[test]
    fn test_push_with_checkout_sha_is_ordinary_push() {
        let mut raw = fixtures::delete_branch();
        raw["checkout_sha"] = json!("abc123");
        let notification = Notification::parse(raw).unwrap();
        assert_eq!(notification.kind(), NotificationKind::Push);
        assert_eq!(notification.event_type(), EventType::Undefined);
    }

    #[test]
    fn test_pipeline_status_overrides() {
        let pending = Notification::parse(fixtures::pipeline(1, "pending", json!([]))).unwrap();
        let running = Notification::parse(fixtures::pipeline(1, "running", json!([]))).unwrap();
        let success = Notification::parse(fixtures::pipeline(1, "success", json!([]))).unwrap();
        assert_eq!(pending.event_type(), EventType::Started);
        assert_eq!(running.event_type(), EventType::Undefined);
        assert_eq!(success.event_type(), EventType::Finished);
    }

    #[test]
    fn test_build_status_mapping() {
        let cases = [
            ("created", EventType::Queued),
            ("pending", EventType::Queued),
            ("running", EventType::Started),
            ("manual", EventType::Started),
            ("failed", EventType::Finished),
            ("canceled", EventType::Finished),
            ("weird", EventType::Undefined),
        ];
        for (status, expected) in cases {
            let notification = Notification::parse(fixtures::build(1, 2, "a", status)).unwrap();
            assert_eq!(notification.event_type(), expected, "status {status}");
        }
    }

    #[test]
    fn test_last_job_name_picks_highest_id() {
        let raw = fixtures::pipeline(
            100,
            "pending",
            json!([{"id": 5, "name": "build"}, {"id": 9, "name": "test"}, {"id": 7, "name": "lint"}]),
        );
        let Notification::Pipeline(pipeline) = Notification::parse(raw).unwrap() else {
            panic!("expected a pipeline notification");
        };
        assert_eq!(pipeline.last_job_name(), "test");
    }

    #[test]
    fn test_unknown_object_kind_is_payload_error() {
        let result = Notification::parse(json!({"object_kind": "wiki_page"}));
        assert!(matches!(result, Err(RelayError::Payload(_))));
    }

    #[test]
    fn test_pipeline_schedule_flag() {
        let mut raw = fixtures::pipeline(1, "pending", json!([]));
        raw["object_attributes"]["pipeline_schedule"] = json!("true");
        let Notification::Pipeline(pipeline) = Notification::parse(raw).unwrap() else {
            panic!("expected a pipeline notification");
        };
        assert!(pipeline.is_scheduled());
    }
}
