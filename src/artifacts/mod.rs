//! Coverage and test-result extraction, run once per pipeline when its last
//! job finishes.

mod archive;
mod test_results;

use test_results::{TestResultsProvider, XmlTestResultsProvider};

use std::sync::Arc;

use bytes::Bytes;
use log::{info, warn};

use crate::config::Config;
use crate::downstream::{CiServers, CoverageReportType, JobRun};
use crate::error::Result;
use crate::providers::gitlab::{variables, GitLabApi, GitLabJob, GitLabProject};

pub struct ArtifactPipeline {
    gitlab: Arc<dyn GitLabApi>,
    servers: CiServers,
    coverage_variable: String,
    test_results_pattern: String,
    /// Tried in order until one finds results
    providers: Vec<Box<dyn TestResultsProvider>>,
}

impl ArtifactPipeline {
    pub fn new(gitlab: Arc<dyn GitLabApi>, servers: CiServers, config: &Config) -> Self {
        let pattern = config.test_results.file_pattern.clone();
        let providers: Vec<Box<dyn TestResultsProvider>> = vec![
            Box::new(XmlTestResultsProvider::gherkin(&pattern, servers.clone())),
            Box::new(XmlTestResultsProvider::junit(&pattern, servers.clone())),
        ];

        Self {
            gitlab,
            servers,
            coverage_variable: config.variables.coverage_report_path.clone(),
            test_results_pattern: pattern,
            providers,
        }
    }

    /// Pushes the coverage reports and test results of a finished job.
    ///
    /// Returns a warning for the webhook response, or an empty string when
    /// there is nothing to report.
    pub async fn run(&self, project_id: u64, job_id: u64) -> String {
        match self.try_run(project_id, job_id).await {
            Ok(warning) => warning,
            Err(e) => {
                let warning = format!("Failed to process the artifacts of job {job_id}: {e}");
                warn!("{warning}");
                warning
            }
        }
    }

    async fn try_run(&self, project_id: u64, job_id: u64) -> Result<String> {
        let project = self.gitlab.project(project_id).await?;
        let job = self.gitlab.job(project_id, job_id).await?;

        if job.artifacts_file.is_none() {
            info!(
                "Job {} of {} has no artifacts",
                job.name, project.path_with_namespace
            );
            return Ok(String::new());
        }

        let artifacts = self.gitlab.download_artifacts(project_id, job.id).await?;
        let run = job_run(&project, &job);

        self.send_coverage(&project, &run, artifacts.clone()).await;

        for provider in &self.providers {
            match provider.create_test_list(&run, artifacts.clone()).await {
                Ok(true) => return Ok(String::new()),
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to read {} test results of {}: {e}",
                    provider.format(),
                    run.job_id
                ),
            }
        }

        let warning = format!(
            "No test results found by using the {} pattern",
            self.test_results_pattern
        );
        warn!("{warning}");
        Ok(warning)
    }

    async fn send_coverage(&self, project: &GitLabProject, run: &JobRun, artifacts: Bytes) {
        let Some(pattern) =
            variables::resolve_variable(self.gitlab.as_ref(), project, &self.coverage_variable).await
        else {
            info!(
                "Variable {} is not set for {}, no coverage injection for this pipeline",
                self.coverage_variable, project.path_with_namespace
            );
            return;
        };

        let reports = match archive::extract_matching(artifacts, &pattern).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!("Failed to extract coverage reports matching {pattern}: {e}");
                return;
            }
        };

        for report in reports {
            info!("Pushing coverage report {} of {}", report.name, run.job_id);
            self.servers
                .push_coverage(run, CoverageReportType::JacocoXml, &report.contents)
                .await;
        }
    }
}

/// The job and build ids a job's artifacts are reported under.
fn job_run(project: &GitLabProject, job: &GitLabJob) -> JobRun {
    JobRun {
        job_id: format!(
            "{}/{}",
            project.path_with_namespace.to_lowercase(),
            job.name
        ),
        build_id: job.id.to_string(),
    }
}
