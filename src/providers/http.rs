use std::sync::Arc;
use std::time::Duration;

use log::warn;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{MigrationError, Result};
use crate::retry;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY_SECONDS: u64 = 10;
const MAX_CONCURRENT_REQUESTS: usize = 50;

/// HTTP client shared by both platform clients: bounds concurrent requests
/// and retries rate limits, server errors and connection failures. Retry
/// back-offs end early with [`MigrationError::Cancelled`] once `cancel` fires.
pub struct ApiClient {
    client: Client,
    platform: &'static str,
    retry_delay: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(platform: &'static str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ado2gh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrationError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            platform,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sends the request built by `build`, rebuilding it for every retry.
    /// Returns the response once it has a success status.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| MigrationError::Config(format!("HTTP client closed: {e}")))?;

        let mut retry_count = 0;
        loop {
            let response = match build(&self.client).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({e}), retrying in {}s ({}/{MAX_RETRIES})...",
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                    );
                    retry::sleep(self.retry_delay, &self.cancel).await?;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(MigrationError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }

                warn!(
                    "{} API error (status {status}). Waiting {} seconds before retry {}/{MAX_RETRIES}...",
                    self.platform,
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                );

                retry::sleep(self.retry_delay, &self.cancel).await?;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(MigrationError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            return Ok(response);
        }
    }

    pub async fn send_json<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let text = self.send(build).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// `base` with `segments` appended as escaped path segments.
pub fn path_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| MigrationError::Config(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
