//! Error types for the account store.

use std::fmt::{Display, Formatter};

/// Errors raised by `AccountStore`.
///
/// Expected caller mistakes (unknown ids) are reported as `false`/`None`
/// results by the store operations; `NotFound` is only produced by
/// `AccountStore::require`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No account with this id.
    NotFound { id: String },
    /// The table or the requested change would violate a store invariant.
    InvalidState { message: String },
    /// Reading or writing the table file failed.
    Storage { message: String },
}

impl StoreError {
    pub(crate) fn storage(context: &str, err: impl Display) -> Self {
        Self::Storage {
            message: format!("{}: {}", context, err),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "account not found: {}", id),
            Self::InvalidState { message } => write!(f, "invalid account state: {}", message),
            Self::Storage { message } => write!(f, "account storage failure: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}
