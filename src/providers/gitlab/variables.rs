use std::collections::HashMap;

use log::{debug, warn};

use super::api::GitLabApi;
use super::types::GitLabProject;

/// Collects the CI/CD variables of every group above the project.
///
/// Ancestors are visited from the top-level group down, so a variable defined
/// on a nearer group overrides the same key on a farther one. Lookup failures
/// are logged and skipped.
pub async fn project_group_variables(
    gitlab: &dyn GitLabApi,
    project: &GitLabProject,
) -> HashMap<String, String> {
    let mut variables = HashMap::new();

    let Some(namespace) = project.namespace.as_ref().filter(|ns| ns.kind == "group") else {
        return variables;
    };

    for group_path in ancestor_paths(&namespace.full_path) {
        match gitlab.group_variables(&group_path).await {
            Ok(group_variables) => {
                debug!(
                    "Loaded {} variables from group {group_path}",
                    group_variables.len()
                );
                variables.extend(group_variables.into_iter().map(|v| (v.key, v.value)));
            }
            Err(e) => warn!("Failed to read variables of group {group_path}: {e}"),
        }
    }

    variables
}

/// Resolves a variable on the project, falling back to its groups.
pub async fn resolve_variable(
    gitlab: &dyn GitLabApi,
    project: &GitLabProject,
    name: &str,
) -> Option<String> {
    match gitlab.project_variable(project.id, name).await {
        Ok(Some(variable)) => return Some(variable.value),
        Ok(None) => {}
        Err(e) => warn!(
            "Failed to read variable {name} of project {}: {e}",
            project.path_with_namespace
        ),
    }

    project_group_variables(gitlab, project).await.remove(name)
}

/// Resolves a boolean variable; anything but a case-insensitive `true` is false.
pub async fn resolve_flag(gitlab: &dyn GitLabApi, project: &GitLabProject, name: &str) -> bool {
    resolve_variable(gitlab, project, name)
        .await
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

fn ancestor_paths(full_path: &str) -> Vec<String> {
    let segments: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
    (1..=segments.len())
        .map(|depth| segments[..depth].join("/"))
        .collect()
}
