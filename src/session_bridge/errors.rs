//! Error types for the login bridge.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// The single failure outcome of a login attempt.
///
/// Every variant except `SpawnFailure` carries whatever the helper wrote to
/// stderr, trimmed, so the user can see why the browser flow stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The helper could not be resolved or started.
    SpawnFailure { message: String },
    /// No definitive result arrived before the ceiling timeout.
    Timeout { after: Duration, diagnostics: String },
    /// The helper exited without ever reporting a usable credential.
    NoCredential { diagnostics: String },
    /// The helper explicitly reported `success: false`.
    UpstreamReportedFailure { reason: String, diagnostics: String },
}

impl SessionError {
    /// Stable short name used in the event log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnFailure { .. } => "spawn_failure",
            Self::Timeout { .. } => "timeout",
            Self::NoCredential { .. } => "no_credential",
            Self::UpstreamReportedFailure { .. } => "upstream_reported_failure",
        }
    }

    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Timeout { diagnostics, .. }
            | Self::NoCredential { diagnostics }
            | Self::UpstreamReportedFailure { diagnostics, .. } => {
                Some(diagnostics.as_str()).filter(|d| !d.is_empty())
            }
            _ => None,
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnFailure { message } => write!(f, "failed to start login helper: {}", message),
            Self::Timeout { after, .. } => {
                write!(f, "login timed out after {}s", after.as_secs())
            }
            Self::NoCredential { .. } => {
                write!(f, "login helper exited without reporting a session")
            }
            Self::UpstreamReportedFailure { reason, .. } => write!(f, "login failed: {}", reason),
        }
    }
}

impl std::error::Error for SessionError {}
