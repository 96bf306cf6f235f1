// HTTP client error types
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionError;

/// How a failed request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401. The active credential has been cleared and login forced.
    AuthenticationFailure,
    /// Body was not JSON where JSON was expected. Handled like a 401.
    MalformedResponse,
    /// Anything else. Local to the operation; the caller may retry by hand.
    Transient,
}

impl ErrorKind {
    /// Whether this failure already had session-wide side effects.
    pub fn ends_session(&self) -> bool {
        matches!(self, ErrorKind::AuthenticationFailure | ErrorKind::MalformedResponse)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    // 401 Unauthorized
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Expected JSON from {path} but got {content_type}")]
    MalformedResponse { path: String, content_type: String },

    // Any other non-2xx, or `success: false`
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response shape from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid base URL: {0}")]
    BaseUrl(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Unauthorized(_) => ErrorKind::AuthenticationFailure,
            ClientError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            _ => ErrorKind::Transient,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
