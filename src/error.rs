use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the hook, the docker client and the operator.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request itself failed (connect, timeout, decode).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Portainer or the docker daemon answered with a non-2xx status.
    #[error("api error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
    },

    /// No connection is registered under the given identifier.
    #[error("connection '{0}' is not defined")]
    UnknownConnection(String),

    /// The connection record exists but cannot be used.
    #[error("connection '{conn_id}' is invalid: {reason}")]
    InvalidConnection { conn_id: String, reason: String },

    /// The bearer token cannot be carried in an HTTP header.
    #[error("invalid authorization header: {0}")]
    InvalidAuthHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The name filter matched no running container.
    #[error("no running container named '{0}' was found")]
    ContainerNotFound(String),

    /// Outermost wrapper attached by the operator, keeping the cause.
    #[error("failed to run {command:?} in container '{container}': {source}")]
    Exec {
        container: String,
        command: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an API error from status code and message.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a client error (4xx status).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error (or the cause it wraps) is a missing container.
    pub fn is_container_not_found(&self) -> bool {
        match self {
            Self::ContainerNotFound(_) => true,
            Self::Exec { source, .. } => source.is_container_not_found(),
            _ => false,
        }
    }
}
