//! Application-wide error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Outcome classes of a call against the REST service.
///
/// Cloneable: a single deduplicated fetch hands the same error to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The session could not be renewed; the user has to log in again.
    #[error("Session expired - login required")]
    AuthExpired,

    /// 4xx other than 401. The body is surfaced verbatim.
    #[error("Validation error ({status}): {body}")]
    Validation { status: u16, body: String },

    /// 5xx.
    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The consumer went away before the result arrived.
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Classify a non-success HTTP status.
    ///
    /// 401 is not handled here: the transport routes it to renewal before
    /// anything gets classified.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        if status.is_server_error() {
            Self::Server {
                status: status.as_u16(),
                body,
            }
        } else {
            Self::Validation {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Check if this error ends the session.
    #[inline]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// HTTP status attached to the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::AuthExpired => Some(StatusCode::UNAUTHORIZED.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors raised by credential persistence.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
