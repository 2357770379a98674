use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{CiServer, CoverageReportType, JobRun, TestResultsFormat};
use crate::config::CiServerConfig;
use crate::error::{RelayError, Result};
use crate::events::CiEvent;
use crate::merge_requests::PullRequest;

/// A CI server reached over its HTTP ingestion API.
pub struct HttpCiServer {
    name: String,
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCiServer {
    pub fn new(config: &CiServerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cirelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        // A trailing slash keeps the last path segment when joining.
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| RelayError::Config(format!("Invalid CI server URL {}: {e}", config.url)))?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RelayError::Config(format!("Invalid CI server endpoint {path}: {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CiServer for HttpCiServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish_event(&self, event: &CiEvent) -> Result<()> {
        let url = self.endpoint("events")?;
        self.send(self.client.post(url).json(event)).await
    }

    async fn push_coverage(
        &self,
        run: &JobRun,
        report_type: CoverageReportType,
        report: &[u8],
    ) -> Result<()> {
        let mut url = self.endpoint("coverage")?;
        url.query_pairs_mut()
            .append_pair("job", &run.job_id)
            .append_pair("build", &run.build_id)
            .append_pair("type", &report_type.to_string());
        self.send(self.client.put(url).body(report.to_vec())).await
    }

    async fn push_test_results(
        &self,
        run: &JobRun,
        format: TestResultsFormat,
        document: &[u8],
    ) -> Result<()> {
        let mut url = self.endpoint("test-results")?;
        url.query_pairs_mut()
            .append_pair("job", &run.job_id)
            .append_pair("build", &run.build_id)
            .append_pair("format", &format.to_string());
        self.send(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(document.to_vec()),
        )
        .await
    }

    async fn publish_pull_request(&self, workspace: &str, pull_request: &PullRequest) -> Result<()> {
        let mut url = self.endpoint("pull-requests")?;
        url.query_pairs_mut().append_pair("workspace", workspace);
        self.send(self.client.post(url).json(pull_request)).await
    }
}
