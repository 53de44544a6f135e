use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::types::AdoList;
use crate::auth::Token;
use crate::error::{MigrationError, Result};
use crate::providers::http::{path_url, ApiClient};

const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
const HOSTED_SERVER: &str = "dev.azure.com";
const HOSTED_PROFILE_URL: &str = "https://app.vssps.visualstudio.com/";
const HOSTED_IDENTITY_URL: &str = "https://vssps.dev.azure.com/";

/// Which Azure DevOps host a request goes to.
#[derive(Debug, Clone, Copy)]
pub enum Host {
    Server,
    Profile,
    Identity,
}

pub struct AdoClient {
    http: ApiClient,
    server_url: Url,
    profile_url: Url,
    identity_url: Url,
    token: Token,
}

impl AdoClient {
    pub fn new(server_url: &str, token: Token) -> Result<Self> {
        let server_url = Url::parse(server_url)
            .map_err(|e| MigrationError::Config(format!("Invalid Azure DevOps URL: {e}")))?;

        // Profiles and identities live on separate hosts in the cloud
        // service; anywhere else everything is served from one host.
        let (profile_url, identity_url) = if server_url.host_str() == Some(HOSTED_SERVER) {
            (parse_fixed(HOSTED_PROFILE_URL)?, parse_fixed(HOSTED_IDENTITY_URL)?)
        } else {
            (server_url.clone(), server_url.clone())
        };

        Ok(Self {
            http: ApiClient::new("Azure DevOps")?,
            server_url,
            profile_url,
            identity_url,
            token,
        })
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.http = self.http.with_retry_delay(retry_delay);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.http = self.http.with_cancellation(cancel);
        self
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Builds `<host>/<segments...>?<query>&api-version=<version>` with
    /// every segment escaped.
    pub fn url(
        &self,
        host: Host,
        segments: &[&str],
        query: &[(&str, &str)],
        api_version: &str,
    ) -> Result<Url> {
        let base = match host {
            Host::Server => &self.server_url,
            Host::Profile => &self.profile_url,
            Host::Identity => &self.identity_url,
        };

        let mut url = path_url(base, segments)?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("api-version", api_version);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.http
            .send_json(|client| {
                client
                    .get(url.clone())
                    .basic_auth("", Some(self.token.as_str()))
            })
            .await
    }

    pub async fn get_text(&self, url: &Url) -> Result<String> {
        let response = self
            .http
            .send(|client| {
                client
                    .get(url.clone())
                    .basic_auth("", Some(self.token.as_str()))
            })
            .await?;
        Ok(response.text().await?)
    }

    /// Collects every page of a list endpoint by following continuation
    /// tokens.
    pub async fn get_all<T: DeserializeOwned>(&self, url: &Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut page_url = url.clone();
            if let Some(token) = &continuation {
                page_url
                    .query_pairs_mut()
                    .append_pair("continuationToken", token);
            }

            let response = self
                .http
                .send(|client| {
                    client
                        .get(page_url.clone())
                        .basic_auth("", Some(self.token.as_str()))
                })
                .await?;

            continuation = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned);

            let page: AdoList<T> = serde_json::from_str(&response.text().await?)?;
            items.extend(page.value);

            if continuation.is_none() {
                return Ok(items);
            }
        }
    }

    pub async fn send_body(
        &self,
        method: Method,
        url: &Url,
        body: &impl Serialize,
    ) -> Result<()> {
        self.http
            .send(|client| {
                client
                    .request(method.clone(), url.clone())
                    .basic_auth("", Some(self.token.as_str()))
                    .json(body)
            })
            .await?;
        Ok(())
    }
}

fn parse_fixed(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| MigrationError::Config(format!("Invalid URL {url}: {e}")))
}
