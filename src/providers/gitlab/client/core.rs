use bytes::Bytes;
use log::warn;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use crate::error::{RelayError, Result};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_SECONDS: u64 = 2;
pub(super) const PAGE_SIZE: usize = 100;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<String>,
    retry_delay: Duration,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cirelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(base_url)
            .map_err(|e| RelayError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| RelayError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    /// Resolves a path relative to `api/v4/`
    pub(super) fn api_path(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| RelayError::Config(format!("Invalid API URL for {path}: {e}")))
    }

    /// Construct project base URL
    pub(super) fn project_url(&self, project_id: u64, path: &str) -> Result<Url> {
        self.api_path(&format!("projects/{project_id}/{path}"))
    }

    /// Sends a GET request, retrying on connection failures, rate limits and
    /// server errors. Any other status is returned to the caller.
    async fn get_with_retry(&self, url: &Url) -> Result<reqwest::Response> {
        let mut retry_count = 0;
        loop {
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {:?} ({}/{})...",
                        e,
                        self.retry_delay,
                        retry_count + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(RelayError::ApiAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }

                warn!(
                    "GitLab API error (status {status}) for {}. Retry {}/{}...",
                    url.path(),
                    retry_count + 1,
                    MAX_RETRIES
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            return Ok(response);
        }
    }

    async fn checked(&self, url: &Url) -> Result<reqwest::Response> {
        let response = self.get_with_retry(url).await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RelayError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response)
    }

    pub(super) async fn get_json<T>(&self, url: &Url) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self.checked(url).await?.json().await?)
    }

    /// Like [`Self::get_json`], but a 404 yields `None`.
    pub(super) async fn get_optional_json<T>(&self, url: &Url) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.get_with_retry(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Some(response.json().await?))
    }

    pub(super) async fn get_bytes(&self, url: &Url) -> Result<Bytes> {
        Ok(self.checked(url).await?.bytes().await?)
    }
}
