use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};

use super::archive::extract_matching;
use crate::downstream::{CiServers, JobRun, TestResultsFormat};
use crate::error::Result;

/// Finds test results of one format in a job's artifacts and pushes them to
/// the CI servers.
#[async_trait]
pub trait TestResultsProvider: Send + Sync {
    fn format(&self) -> TestResultsFormat;

    /// Returns whether any test results were found.
    async fn create_test_list(&self, run: &JobRun, artifacts: Bytes) -> Result<bool>;
}

/// Test result documents recognised by their XML root element.
pub struct XmlTestResultsProvider {
    format: TestResultsFormat,
    root_elements: &'static [&'static str],
    file_pattern: String,
    servers: CiServers,
}

impl XmlTestResultsProvider {
    /// Cucumber/Gherkin results: a `<features>` document.
    pub fn gherkin(file_pattern: impl Into<String>, servers: CiServers) -> Self {
        Self {
            format: TestResultsFormat::Gherkin,
            root_elements: &["features"],
            file_pattern: file_pattern.into(),
            servers,
        }
    }

    /// JUnit results: a `<testsuite>` or `<testsuites>` document.
    pub fn junit(file_pattern: impl Into<String>, servers: CiServers) -> Self {
        Self {
            format: TestResultsFormat::Junit,
            root_elements: &["testsuite", "testsuites"],
            file_pattern: file_pattern.into(),
            servers,
        }
    }
}

#[async_trait]
impl TestResultsProvider for XmlTestResultsProvider {
    fn format(&self) -> TestResultsFormat {
        self.format
    }

    async fn create_test_list(&self, run: &JobRun, artifacts: Bytes) -> Result<bool> {
        let documents: Vec<_> = extract_matching(artifacts, &self.file_pattern)
            .await?
            .into_iter()
            .filter(|file| {
                root_element(&file.contents).is_some_and(|root| self.root_elements.contains(&root))
            })
            .collect();

        if documents.is_empty() {
            debug!("No {} test results in the artifacts of {}", self.format, run.job_id);
            return Ok(false);
        }

        for document in &documents {
            info!(
                "Pushing {} test results {} of {} #{}",
                self.format, document.name, run.job_id, run.build_id
            );
            self.servers
                .push_test_results(run, self.format, &document.contents)
                .await;
        }

        Ok(true)
    }
}

/// Name of the first element of an XML document, skipping the declaration,
/// comments and doctype.
fn root_element(contents: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(contents).ok()?;
    let mut rest = text;

    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];

        if rest.starts_with('?') || rest.starts_with('!') {
            let end = rest.find('>')?;
            rest = &rest[end + 1..];
            continue;
        }

        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        return Some(&rest[..end]);
    }
}
