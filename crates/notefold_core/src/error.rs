//! Request-boundary error taxonomy.
//!
//! Every error surfaced by services and the gateway maps onto one
//! [`ErrorKind`]. None of them is process-fatal.

use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced container, group, note or root is absent.
    NotFound,
    /// Authorization predicate failed.
    AccessDenied,
    /// Malformed input rejected before touching the store.
    ValidationError,
    /// Underlying persistence failure.
    StorageError,
    /// Credential verification failed before any core operation ran.
    AuthenticationFailed,
    /// Cascading delete removed containers but not every note.
    PartialFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::ValidationError => "validation_error",
            Self::StorageError => "storage_error",
            Self::AuthenticationFailed => "authentication_failed",
            Self::PartialFailure => "partial_failure",
        }
    }

    /// Only storage failures are worth retrying unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StorageError)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
