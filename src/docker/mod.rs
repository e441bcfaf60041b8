mod stream;

pub use stream::ExecOutput;

use std::time::Duration;

use bollard::container::ListContainersOptions;
use bollard::exec::{CreateExecOptions, CreateExecResults};
use bollard::service::ContainerSummary;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{Error, Result};

const DEFAULT_USER_AGENT: &str = concat!("portainer-exec/", env!("CARGO_PKG_VERSION"));

/// Docker API client scoped to one Portainer endpoint.
///
/// Talks to the daemon through Portainer's proxy path
/// (`/api/endpoints/{id}/docker`), so every request carries the bearer
/// header obtained at login. Request bodies and responses use the
/// bollard model types; only the transport lives here.
#[derive(Debug)]
pub struct DockerApiClient {
    http: reqwest::Client,
    headers: HeaderMap,
    prefix: String,
    timeout: Duration,
}

impl DockerApiClient {
    /// Build a client for `base_url` (the endpoint's docker proxy
    /// path) pinned to one API version and bearer header.
    pub fn new(
        base_url: &str,
        version: &str,
        timeout: Duration,
        auth_header: &str,
    ) -> Result<Self> {
        Self::with_headers(base_url, version, timeout, auth_header, HeaderMap::new())
    }

    /// Same as [`new`](Self::new), with extra default headers. The
    /// authorization header is merged into them, never replacing what
    /// the caller supplied under other names.
    pub fn with_headers(
        base_url: &str,
        version: &str,
        timeout: Duration,
        auth_header: &str,
        extra_headers: HeaderMap,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.extend(extra_headers);
        let mut auth = HeaderValue::from_str(auth_header)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers.clone())
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            headers,
            prefix: format!("{}/v{}", base_url.trim_end_matches('/'), version),
            timeout,
        })
    }

    /// Default header map sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Versioned URL prefix all requests go through.
    pub fn endpoint_url(&self) -> &str {
        &self.prefix
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(Error::api_error(status.as_u16(), message));
        }
        Ok(response.json().await?)
    }

    /// List containers. Only `all`, `limit`, `size` and `filters` of
    /// the options are meaningful to the daemon's query surface.
    pub async fn containers(
        &self,
        options: ListContainersOptions<String>,
    ) -> Result<Vec<ContainerSummary>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if options.all {
            query.push(("all", String::from("true")));
        }
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if options.size {
            query.push(("size", String::from("true")));
        }
        if !options.filters.is_empty() {
            query.push(("filters", serde_json::to_string(&options.filters)?));
        }

        debug!("Listing containers on {}", self.prefix);
        let response = self
            .http
            .get(format!("{}/containers/json", self.prefix))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Create an exec session on a running container.
    pub async fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> Result<CreateExecResults> {
        debug!("Creating exec session on container {}", container_id);
        let response = self
            .http
            .post(format!("{}/containers/{}/exec", self.prefix, container_id))
            .json(&options)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Start an exec session attached, returning its output stream.
    ///
    /// No request timeout is set here: the response body lives for as
    /// long as the remote command keeps producing output.
    pub async fn start_exec(&self, exec_id: &str) -> Result<ExecOutput> {
        debug!("Starting exec session {}", exec_id);
        let response = self
            .http
            .post(format!("{}/exec/{}/start", self.prefix, exec_id))
            .json(&json!({ "Detach": false, "Tty": false }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(Error::api_error(status.as_u16(), message));
        }
        Ok(ExecOutput::new(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(extra: HeaderMap) -> DockerApiClient {
        DockerApiClient::with_headers(
            "http://portainer.local:9000/api/endpoints/3/docker",
            "1.35",
            Duration::from_secs(30),
            "Bearer tok-123",
            extra,
        )
        .unwrap()
    }

    #[test]
    fn authorization_is_merged_into_default_headers() {
        let mut extra = HeaderMap::new();
        extra.insert("x-registry-auth", HeaderValue::from_static("deadbeef"));

        let client = client_with(extra);
        let headers = client.headers();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok-123");
        assert_eq!(headers.get("x-registry-auth").unwrap(), "deadbeef");
        assert!(headers.get(USER_AGENT).is_some());
    }

    #[test]
    fn requests_are_prefixed_with_api_version() {
        let client = client_with(HeaderMap::new());
        assert_eq!(
            client.endpoint_url(),
            "http://portainer.local:9000/api/endpoints/3/docker/v1.35"
        );
    }

    #[test]
    fn trailing_slash_in_base_url_is_tolerated() {
        let client = DockerApiClient::new(
            "http://portainer.local:9000/api/endpoints/3/docker/",
            "1.35",
            Duration::from_secs(30),
            "Bearer t",
        )
        .unwrap();
        assert_eq!(
            client.endpoint_url(),
            "http://portainer.local:9000/api/endpoints/3/docker/v1.35"
        );
    }
}
