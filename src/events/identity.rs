use log::warn;
use url::Url;

use crate::hooks::Notification;
use crate::providers::gitlab::GitLabApi;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Where a notification's CI job lives: its branch and project path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub branch: String,
    pub project_full_path: String,
}

impl Identity {
    pub async fn resolve(notification: &Notification, gitlab: &dyn GitLabApi) -> Self {
        Self {
            branch: branch_name(notification, gitlab).await,
            project_full_path: project_full_path(notification),
        }
    }

    /// The CI id of the pipeline job for this branch:
    /// `<prefix><project-full-path>/<sanitized-branch>`.
    pub fn project_ci_id(&self, prefix: &str) -> String {
        format!(
            "{prefix}{}/{}",
            self.project_full_path,
            sanitize_branch_name(&self.branch)
        )
    }

    /// The CI id the event is reported under.
    pub fn ci_full_name(&self, notification: &Notification, prefix: &str) -> String {
        match notification.build_name() {
            Some(build_name) => format!("{}/{build_name}", self.project_full_path),
            None => self.project_ci_id(prefix),
        }
    }

    pub fn display_name(&self, notification: &Notification) -> String {
        notification
            .build_name()
            .map_or_else(|| self.branch.clone(), str::to_string)
    }
}

/// Branch names become one segment of a CI id.
pub fn sanitize_branch_name(branch: &str) -> String {
    branch.replace('/', "-")
}

/// Merge-request iid embedded in a `refs/merge-requests/<iid>/head` ref.
pub fn merge_request_iid(ref_: &str) -> Option<u64> {
    ref_.strip_prefix("refs/merge-requests/")?
        .strip_suffix("/head")?
        .parse()
        .ok()
}

async fn branch_name(notification: &Notification, gitlab: &dyn GitLabApi) -> String {
    match notification {
        Notification::Pipeline(pipeline) => pipeline.object_attributes.ref_.clone(),
        Notification::Push(push) => push
            .ref_
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&push.ref_)
            .to_string(),
        Notification::Build(build) => match merge_request_iid(&build.ref_) {
            Some(iid) => match gitlab.merge_request(build.project_id, iid).await {
                Ok(merge_request) => merge_request.source_branch,
                Err(e) => {
                    warn!(
                        "Failed to find merge request !{iid} of ref {}, using an empty branch name: {e}",
                        build.ref_
                    );
                    String::new()
                }
            },
            None => build.ref_.clone(),
        },
        Notification::MergeRequest(_) => String::new(),
    }
}

/// Lower-cased URL path of the project, without the leading slash.
fn project_full_path(notification: &Notification) -> String {
    let url = match notification {
        Notification::Pipeline(pipeline) => &pipeline.project.web_url,
        Notification::MergeRequest(mr) => &mr.project.web_url,
        Notification::Build(build) => &build.repository.homepage,
        Notification::Push(push) => &push.repository.homepage,
    };
    url_path(url)
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path()
            .trim_start_matches('/')
            .to_lowercase(),
        Err(e) => {
            warn!("Failed to read the project path from '{url}', using an empty string: {e}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::fixtures;
    use crate::testing::FakeGitLab;
    use serde_json::json;

    #[test]
    fn test_merge_request_iid_from_ref() {
        assert_eq!(merge_request_iid("refs/merge-requests/42/head"), Some(42));
        assert_eq!(merge_request_iid("refs/merge-requests//head"), None);
        assert_eq!(merge_request_iid("main"), None);
    }

    #[test]
    fn test_url_path_lowercased_without_leading_slash() {
        assert_eq!(url_path("https://gitlab.example.com/Group/Sub/App"), "group/sub/app");
        assert_eq!(url_path("::not a url::"), "");
    }

    #[tokio::test]
    async fn test_pipeline_identity() {
        let notification =
            Notification::parse(fixtures::pipeline(100, "pending", json!([]))).unwrap();
        let identity = Identity::resolve(&notification, &FakeGitLab::default()).await;

        assert_eq!(identity.branch, "feature/login");
        assert_eq!(identity.project_full_path, "group/app");
        assert_eq!(
            identity.ci_full_name(&notification, "pipeline:"),
            "pipeline:group/app/feature-login"
        );
        assert_eq!(identity.display_name(&notification), "feature/login");
    }

    #[tokio::test]
    async fn test_build_identity_uses_job_name() {
        let notification =
            Notification::parse(fixtures::build(100, 1, "unit-tests", "running")).unwrap();
        let identity = Identity::resolve(&notification, &FakeGitLab::default()).await;

        assert_eq!(
            identity.ci_full_name(&notification, "pipeline:"),
            "group/app/unit-tests"
        );
        assert_eq!(identity.display_name(&notification), "unit-tests");
    }

    #[tokio::test]
    async fn test_delete_branch_strips_heads_prefix() {
        let notification = Notification::parse(fixtures::delete_branch()).unwrap();
        let identity = Identity::resolve(&notification, &FakeGitLab::default()).await;

        assert_eq!(identity.branch, "feature/login");
        assert_eq!(
            identity.ci_full_name(&notification, "pipeline:"),
            "pipeline:group/app/feature-login"
        );
    }

    #[tokio::test]
    async fn test_merge_ref_resolves_source_branch() {
        let mut raw = fixtures::build(100, 1, "a", "running");
        raw["ref"] = json!("refs/merge-requests/12/head");
        let notification = Notification::parse(raw).unwrap();
        let gitlab = FakeGitLab::default().with_merge_request(12, "topic/search");

        let identity = Identity::resolve(&notification, &gitlab).await;

        assert_eq!(identity.branch, "topic/search");
    }

    #[tokio::test]
    async fn test_merge_ref_lookup_failure_defaults_to_empty() {
        let mut raw = fixtures::build(100, 1, "a", "running");
        raw["ref"] = json!("refs/merge-requests/12/head");
        let notification = Notification::parse(raw).unwrap();

        let identity = Identity::resolve(&notification, &FakeGitLab::default()).await;

        assert_eq!(identity.branch, "");
    }
}
