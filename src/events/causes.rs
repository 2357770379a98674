use super::Cause;
use crate::hooks::{Notification, NotificationKind};

/// The chain of causes of a normalized event.
///
/// Pipelines and branch deletions are their own root; jobs point upstream at
/// the pipeline that owns them.
pub fn causes(notification: &Notification, has_scm_data: bool, pipeline_ci_id: &str) -> Vec<Cause> {
    let root = root_cause(notification, has_scm_data);

    match (notification.kind(), notification.pipeline_id()) {
        (NotificationKind::Pipeline | NotificationKind::DeleteBranch, _) | (_, None) => vec![root],
        (_, Some(pipeline_id)) => vec![Cause::Upstream {
            project: pipeline_ci_id.to_string(),
            build_ci_id: pipeline_id.to_string(),
            causes: vec![root],
        }],
    }
}

fn root_cause(notification: &Notification, has_scm_data: bool) -> Cause {
    match notification {
        Notification::Push(push) if push.is_branch_deletion() => Cause::User {
            user: push.user_name.clone().unwrap_or_default(),
        },
        Notification::Pipeline(pipeline) if pipeline.is_scheduled() => Cause::Timer,
        _ if has_scm_data => Cause::Scm,
        _ => Cause::User {
            user: actor(notification),
        },
    }
}

fn actor(notification: &Notification) -> String {
    let user = match notification {
        Notification::Pipeline(pipeline) => pipeline.user.as_ref(),
        Notification::Build(build) => build.user.as_ref(),
        Notification::Push(push) => return push.user_name.clone().unwrap_or_default(),
        Notification::MergeRequest(_) => None,
    };
    user.map(|u| u.name.clone()).unwrap_or_default()
}
