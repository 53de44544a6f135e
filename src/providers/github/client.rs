use std::time::Duration;

use graphql_client::{GraphQLQuery, QueryBody, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Token;
use crate::error::{MigrationError, Result};
use crate::providers::http::{path_url, ApiClient};

pub(super) const PAGE_SIZE: usize = 100;

/// GitHub REST and GraphQL client.
pub struct GitHubClient {
    http: ApiClient,
    api_url: Url,
    graphql_url: Url,
    token: Token,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Token) -> Result<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| MigrationError::Config(format!("Invalid GitHub API URL: {e}")))?;
        let graphql_url = path_url(&api_url, &["graphql"])?;

        Ok(Self {
            http: ApiClient::new("GitHub")?,
            api_url,
            graphql_url,
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

    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        path_url(&self.api_url, segments)
    }

    fn request(&self, client: &reqwest::Client, method: Method, url: Url) -> reqwest::RequestBuilder {
        client
            .request(method, url)
            .bearer_auth(self.token.as_str())
            .header("Accept", "application/vnd.github+json")
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        self.http
            .send_json(|client| self.request(client, Method::GET, url.clone()))
            .await
    }

    /// Fetches every page of a REST list endpoint.
    pub async fn get_all<T: DeserializeOwned>(&self, url: &Url) -> Result<Vec<T>> {
        let mut items = Vec::new();

        for page in 1.. {
            let page_url = with_page(url, page);
            let batch: Vec<T> = self.get(&page_url).await?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);

            if done {
                break;
            }
        }

        Ok(items)
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        body: &impl Serialize,
    ) -> Result<T> {
        self.http
            .send_json(|client| {
                self.request(client, method.clone(), url.clone())
                    .json(body)
            })
            .await
    }

    /// Sends a request whose response body is not needed.
    pub async fn send(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<()> {
        self.http
            .send(|client| {
                let request = self.request(client, method.clone(), url.clone());
                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await?;
        Ok(())
    }

    async fn post_query<V: Serialize, T: DeserializeOwned>(
        &self,
        body: &QueryBody<V>,
    ) -> Result<Response<T>> {
        self.http
            .send_json(|client| {
                self.request(client, Method::POST, self.graphql_url.clone())
                    .json(body)
            })
            .await
    }

    /// Runs the GraphQL operation `Q`. GraphQL-level errors are returned in
    /// the response rather than as `Err`.
    pub async fn graphql<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Response<Q::ResponseData>> {
        self.post_query(&Q::build_query(variables)).await
    }

    /// Like [`Self::graphql`], but any GraphQL error fails the call.
    pub async fn graphql_data<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData> {
        let body = Q::build_query(variables);
        let response = self.post_query(&body).await?;
        into_data(body.operation_name, response)
    }

    /// Downloads an absolute URL, e.g. a pre-signed migration log URL.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.send(|client| client.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

pub(super) fn into_data<T>(operation: &str, response: Response<T>) -> Result<T> {
    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        return Err(MigrationError::GraphQLError {
            operation: operation.to_owned(),
            errors: errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    response.data.ok_or_else(|| {
        MigrationError::UnexpectedResponse(format!("{operation} returned no data"))
    })
}

pub(super) fn with_page(url: &Url, page: usize) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("per_page", &PAGE_SIZE.to_string())
        .append_pair("page", &page.to_string());
    url
}
