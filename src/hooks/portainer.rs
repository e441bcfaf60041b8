use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::connection::ConnectionSource;
use crate::docker::DockerApiClient;
use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT_ID: i64 = 0;
pub const DEFAULT_API_VERSION: &str = "1.35";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    jwt: Option<String>,
}

/// Interact with a Docker daemon via Portainer.
///
/// Thin wrapper that logs in to the Portainer REST API once and hands
/// out a [`DockerApiClient`] scoped to one of its endpoints. The
/// version needs to be set explicitly, otherwise auth does not work
/// properly against the proxy.
pub struct PortainerHook {
    source: Arc<dyn ConnectionSource>,
    conn_id: String,
    portainer_base_url: String,
    base_url: String,
    version: String,
    timeout: Duration,
    client: OnceCell<DockerApiClient>,
}

impl PortainerHook {
    /// Resolve `conn_id` and prepare the endpoint base URL. No network
    /// I/O happens until [`get_client`](Self::get_client) is called.
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        conn_id: &str,
        endpoint_id: i64,
        version: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let conn = source.resolve(conn_id)?;
        let portainer_base_url = conn.base_url();
        let base_url = format!(
            "{}/api/endpoints/{}/docker",
            portainer_base_url, endpoint_id
        );
        Ok(Self {
            source,
            conn_id: conn_id.to_string(),
            portainer_base_url,
            base_url,
            version: version.to_string(),
            timeout,
            client: OnceCell::new(),
        })
    }

    /// Docker API client for the configured endpoint (cached).
    ///
    /// The first call logs in and builds the client; later calls reuse
    /// both it and its bearer token. One login per hook instance.
    pub async fn get_client(&self) -> Result<&DockerApiClient> {
        self.client
            .get_or_try_init(|| async {
                let auth_header = self.login().await?;
                DockerApiClient::new(&self.base_url, &self.version, self.timeout, &auth_header)
            })
            .await
    }

    /// POST `/api/auth` with the connection's credentials and format
    /// the bearer header from the returned token.
    async fn login(&self) -> Result<String> {
        let conn = self.source.resolve(&self.conn_id)?;
        info!("Logging in to portainer with {}", self.conn_id);
        let http = reqwest::Client::builder().build()?;
        let response = http
            .post(format!("{}/api/auth", self.portainer_base_url))
            .json(&json!({ "username": conn.login, "password": conn.password }))
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

        let auth: AuthResponse = response.json().await?;
        // An absent jwt field is tolerated; the resulting empty token
        // makes every later docker call fail auth.
        let jwt = auth.jwt.unwrap_or_else(|| {
            warn!("Login response for {} carried no jwt field", self.conn_id);
            String::new()
        });
        Ok(format!("Bearer {}", jwt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRegistry;

    #[test]
    fn construction_fails_for_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let err = PortainerHook::new(
            Arc::new(registry),
            "missing",
            DEFAULT_ENDPOINT_ID,
            DEFAULT_API_VERSION,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::UnknownConnection(id) if id == "missing"));
    }
}
