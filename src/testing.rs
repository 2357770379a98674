//! In-memory stand-ins for GitLab and the CI servers.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::downstream::{CiServer, CoverageReportType, JobRun, TestResultsFormat};
use crate::error::{RelayError, Result};
use crate::events::{BuildResult, CiEvent, EventType, PhaseType};
use crate::merge_requests::PullRequest;
use crate::providers::gitlab::{
    ArtifactsFile, GitLabApi, GitLabCommit, GitLabCompare, GitLabDiff, GitLabJob,
    GitLabMergeRequest, GitLabNamespace, GitLabProject, GitLabVariable,
};

fn not_found(what: impl std::fmt::Display) -> RelayError {
    RelayError::Api {
        status: 404,
        message: format!("{what} not found"),
    }
}

/// GitLab with a single project (id 7, `Org/Team/App` in group `org/team`).
#[derive(Default)]
pub struct FakeGitLab {
    project_variables: HashMap<String, String>,
    group_variables: HashMap<String, Vec<GitLabVariable>>,
    merge_requests: HashMap<u64, GitLabMergeRequest>,
    merge_request_commits: Vec<GitLabCommit>,
    compared_commits: Vec<GitLabCommit>,
    diffs: HashMap<String, Vec<GitLabDiff>>,
    jobs: HashMap<u64, GitLabJob>,
    artifacts: Option<Bytes>,
    artifact_downloads: AtomicUsize,
}

impl FakeGitLab {
    pub fn with_project_variable(mut self, key: &str, value: &str) -> Self {
        self.project_variables
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_group_variable(mut self, group_path: &str, key: &str, value: &str) -> Self {
        self.group_variables
            .entry(group_path.to_string())
            .or_default()
            .push(GitLabVariable {
                key: key.to_string(),
                value: value.to_string(),
            });
        self
    }

    pub fn with_merge_request(mut self, iid: u64, source_branch: &str) -> Self {
        self.merge_requests.insert(
            iid,
            GitLabMergeRequest {
                id: 1000 + iid,
                iid,
                title: "Add search".to_string(),
                description: None,
                state: "opened".to_string(),
                source_branch: source_branch.to_string(),
                target_branch: "main".to_string(),
                author: None,
                web_url: format!("https://gitlab.example.com/org/team/app/-/merge_requests/{iid}"),
                created_at: None,
                updated_at: None,
                merged_at: None,
                closed_at: None,
            },
        );
        self
    }

    pub fn with_merge_request_commit(mut self, sha: &str, path: &str) -> Self {
        self.merge_request_commits.push(commit(sha));
        self.diffs.insert(sha.to_string(), vec![diff(path, false)]);
        self
    }

    pub fn with_compared_commit(mut self, sha: &str, path: &str, new_file: bool) -> Self {
        self.compared_commits.push(commit(sha));
        self.diffs.insert(sha.to_string(), vec![diff(path, new_file)]);
        self
    }

    pub fn with_job(mut self, id: u64, name: &str, has_artifacts: bool) -> Self {
        self.jobs.insert(
            id,
            GitLabJob {
                id,
                name: name.to_string(),
                artifacts_file: has_artifacts.then(|| ArtifactsFile {
                    filename: "artifacts.zip".to_string(),
                    size: 0,
                }),
            },
        );
        self
    }

    pub fn with_artifacts(mut self, archive: Bytes) -> Self {
        self.artifacts = Some(archive);
        self
    }

    pub fn project_record(&self) -> GitLabProject {
        GitLabProject {
            id: 7,
            path_with_namespace: "Org/Team/App".to_string(),
            http_url_to_repo: "https://gitlab.example.com/org/team/app.git".to_string(),
            ssh_url_to_repo: "git@gitlab.example.com:org/team/app.git".to_string(),
            namespace: Some(GitLabNamespace {
                id: 3,
                kind: "group".to_string(),
                full_path: "org/team".to_string(),
            }),
        }
    }

    /// How many times an artifacts archive was downloaded.
    pub fn artifact_downloads(&self) -> usize {
        self.artifact_downloads.load(Ordering::SeqCst)
    }
}

fn commit(sha: &str) -> GitLabCommit {
    GitLabCommit {
        id: sha.to_string(),
        message: format!("commit {sha}"),
        committer_name: "Jane Doe".to_string(),
        committer_email: "jane@example.com".to_string(),
        committed_date: None,
        created_at: None,
        parent_ids: Vec::new(),
    }
}

fn diff(path: &str, new_file: bool) -> GitLabDiff {
    GitLabDiff {
        old_path: path.to_string(),
        new_path: path.to_string(),
        new_file,
        deleted_file: false,
    }
}

#[async_trait]
impl GitLabApi for FakeGitLab {
    async fn project(&self, project_id: u64) -> Result<GitLabProject> {
        let project = self.project_record();
        if project_id == project.id {
            Ok(project)
        } else {
            Err(not_found(format!("project {project_id}")))
        }
    }

    async fn job(&self, _project_id: u64, job_id: u64) -> Result<GitLabJob> {
        self.jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| not_found(format!("job {job_id}")))
    }

    async fn merge_request(&self, _project_id: u64, iid: u64) -> Result<GitLabMergeRequest> {
        self.merge_requests
            .get(&iid)
            .cloned()
            .ok_or_else(|| not_found(format!("merge request !{iid}")))
    }

    async fn merge_request_commits(&self, _project_id: u64, _iid: u64) -> Result<Vec<GitLabCommit>> {
        Ok(self.merge_request_commits.clone())
    }

    async fn compare(&self, _project_id: u64, _from: &str, _to: &str) -> Result<GitLabCompare> {
        Ok(GitLabCompare {
            commits: self.compared_commits.clone(),
        })
    }

    async fn commit_diff(&self, _project_id: u64, sha: &str) -> Result<Vec<GitLabDiff>> {
        self.diffs
            .get(sha)
            .cloned()
            .ok_or_else(|| not_found(format!("commit {sha}")))
    }

    async fn project_variable(
        &self,
        _project_id: u64,
        key: &str,
    ) -> Result<Option<GitLabVariable>> {
        Ok(self.project_variables.get(key).map(|value| GitLabVariable {
            key: key.to_string(),
            value: value.clone(),
        }))
    }

    async fn group_variables(&self, group_path: &str) -> Result<Vec<GitLabVariable>> {
        Ok(self
            .group_variables
            .get(group_path)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_artifacts(&self, _project_id: u64, job_id: u64) -> Result<Bytes> {
        self.artifact_downloads.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .clone()
            .ok_or_else(|| not_found(format!("artifacts of job {job_id}")))
    }

    async fn version(&self) -> Result<String> {
        Ok("16.9.0".to_string())
    }
}

/// A CI server that keeps everything it receives. A failing one still
/// records the call before returning an error.
pub struct RecordingServer {
    name: String,
    failing: bool,
    events: Mutex<Vec<CiEvent>>,
    coverage: Mutex<Vec<JobRun>>,
    test_results: Mutex<Vec<(JobRun, TestResultsFormat, Vec<u8>)>>,
    pull_requests: Mutex<Vec<(String, PullRequest)>>,
}

impl RecordingServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failing: false,
            events: Mutex::default(),
            coverage: Mutex::default(),
            test_results: Mutex::default(),
            pull_requests: Mutex::default(),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            failing: true,
            ..Self::new(name)
        }
    }

    pub fn events(&self) -> Vec<CiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn coverage(&self) -> Vec<JobRun> {
        self.coverage.lock().unwrap().clone()
    }

    pub fn test_results(&self) -> Vec<(JobRun, TestResultsFormat, Vec<u8>)> {
        self.test_results.lock().unwrap().clone()
    }

    pub fn pull_requests(&self) -> Vec<(String, PullRequest)> {
        self.pull_requests.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<()> {
        if self.failing {
            Err(RelayError::Api {
                status: 503,
                message: format!("{} is unavailable", self.name),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CiServer for RecordingServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish_event(&self, event: &CiEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        self.outcome()
    }

    async fn push_coverage(
        &self,
        run: &JobRun,
        _report_type: CoverageReportType,
        _report: &[u8],
    ) -> Result<()> {
        self.coverage.lock().unwrap().push(run.clone());
        self.outcome()
    }

    async fn push_test_results(
        &self,
        run: &JobRun,
        format: TestResultsFormat,
        document: &[u8],
    ) -> Result<()> {
        self.test_results
            .lock()
            .unwrap()
            .push((run.clone(), format, document.to_vec()));
        self.outcome()
    }

    async fn publish_pull_request(&self, workspace: &str, pull_request: &PullRequest) -> Result<()> {
        self.pull_requests
            .lock()
            .unwrap()
            .push((workspace.to_string(), pull_request.clone()));
        self.outcome()
    }
}

/// A finished job event.
pub fn sample_event(project: &str, build_ci_id: &str) -> CiEvent {
    CiEvent {
        event_type: EventType::Finished,
        project: project.to_string(),
        project_display_name: project.rsplit('/').next().unwrap_or(project).to_string(),
        build_ci_id: build_ci_id.to_string(),
        number: Some(build_ci_id.to_string()),
        parent_ci_id: None,
        multi_branch_type: None,
        skip_validation: false,
        start_time: Some(1_709_287_200_000),
        duration: Some(12_500),
        result: Some(BuildResult::Success),
        causes: Vec::new(),
        parameters: Vec::new(),
        scm_data: None,
        phase_type: Some(PhaseType::Internal),
    }
}

/// Builds a zip archive holding the given `(path, contents)` entries.
pub fn zip_archive(entries: &[(&str, &str)]) -> Bytes {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, contents) in entries {
        zip.start_file(name.to_string(), options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }

    Bytes::from(zip.finish().unwrap().into_inner())
}
