//! Downstream CI servers: the sink of every normalized event.

mod http;

pub use http::HttpCiServer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;
use crate::events::CiEvent;
use crate::merge_requests::PullRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageReportType {
    JacocoXml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResultsFormat {
    Gherkin,
    Junit,
}

impl fmt::Display for CoverageReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JACOCOXML")
    }
}

impl fmt::Display for TestResultsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gherkin => f.write_str("gherkin"),
            Self::Junit => f.write_str("junit"),
        }
    }
}

/// Identity of a job run on the CI servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    /// `<project-path-lowercased>/<job-name>`
    pub job_id: String,
    pub build_id: String,
}

/// One downstream CI server.
#[async_trait]
pub trait CiServer: Send + Sync {
    fn name(&self) -> &str;

    async fn publish_event(&self, event: &CiEvent) -> Result<()>;

    async fn push_coverage(
        &self,
        run: &JobRun,
        report_type: CoverageReportType,
        report: &[u8],
    ) -> Result<()>;

    async fn push_test_results(
        &self,
        run: &JobRun,
        format: TestResultsFormat,
        document: &[u8],
    ) -> Result<()>;

    async fn publish_pull_request(&self, workspace: &str, pull_request: &PullRequest) -> Result<()>;
}

/// Every registered CI server. Each call is broadcast to all of them; a
/// failing server is logged and does not stop delivery to the others.
#[derive(Clone, Default)]
pub struct CiServers {
    servers: Vec<Arc<dyn CiServer>>,
}

impl CiServers {
    pub fn new(servers: Vec<Arc<dyn CiServer>>) -> Self {
        Self { servers }
    }

    pub fn names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn publish_event(&self, event: &CiEvent) {
        for server in &self.servers {
            match server.publish_event(event).await {
                Ok(()) => debug!(
                    "Published {:?} event of {} #{} to {}",
                    event.event_type,
                    event.project,
                    event.build_ci_id,
                    server.name()
                ),
                Err(e) => warn!(
                    "Failed to publish {:?} event of {} to {}: {e}",
                    event.event_type,
                    event.project,
                    server.name()
                ),
            }
        }
    }

    pub async fn push_coverage(&self, run: &JobRun, report_type: CoverageReportType, report: &[u8]) {
        for server in &self.servers {
            if let Err(e) = server.push_coverage(run, report_type, report).await {
                warn!(
                    "Failed to push coverage of {} #{} to {}: {e}",
                    run.job_id,
                    run.build_id,
                    server.name()
                );
            }
        }
    }

    pub async fn push_test_results(&self, run: &JobRun, format: TestResultsFormat, document: &[u8]) {
        for server in &self.servers {
            if let Err(e) = server.push_test_results(run, format, document).await {
                warn!(
                    "Failed to push {format} test results of {} #{} to {}: {e}",
                    run.job_id,
                    run.build_id,
                    server.name()
                );
            }
        }
    }

    pub async fn publish_pull_request(&self, workspace: &str, pull_request: &PullRequest) {
        for server in &self.servers {
            if let Err(e) = server.publish_pull_request(workspace, pull_request).await {
                warn!(
                    "Failed to publish merge request !{} to {}: {e}",
                    pull_request.id,
                    server.name()
                );
            }
        }
    }
}
