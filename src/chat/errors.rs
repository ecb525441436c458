//! Error types for the chat relay and its upstream client.

use crate::accounts::StoreError;
use std::fmt::{Display, Formatter};

/// Failure talking to the remote chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection, TLS or I/O failure before a response was read.
    Transport(String),
    /// Non-success HTTP status; `body` is a truncated excerpt.
    Status { status: u16, body: String },
    /// The response could not be understood.
    Protocol(String),
    /// The service reported an error inside an otherwise valid response.
    Remote(String),
}

impl Display for UpstreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {}", status),
            Self::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            Self::Protocol(msg) => write!(f, "unexpected response: {}", msg),
            Self::Remote(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Failure of a `ChatRelay::send` call before its stream was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    InvalidArgument { message: String },
    NotFound { message: String },
    /// Upstream message, propagated verbatim.
    UpstreamFailure { message: String },
    InternalError { message: String },
}

impl Display for RelayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Self::NotFound { message } => write!(f, "not found: {}", message),
            Self::UpstreamFailure { message } => write!(f, "{}", message),
            Self::InternalError { message } => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        Self::UpstreamFailure {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound {
                message: format!("account {}", id),
            },
            other => Self::InternalError {
                message: other.to_string(),
            },
        }
    }
}
