//! Error types and error codes for the CloudRec console
//!
//! This module defines:
//! - `CloudRecError`: the error taxonomy every console operation reports
//! - `ErrorCode`: structured error codes for user-facing notifications

use serde::{Deserialize, Serialize};

/// Console error taxonomy
///
/// None of these are fatal: each is turned into a transient notification at
/// the point of the user action.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudRecError {
    /// A mutating action was attempted by a caller that does not hold the lock.
    /// Detected before any request is sent.
    #[error("record '{}' is not locked by the current user{}", .id, holder_suffix(.holder))]
    LockNotHeld { id: i64, holder: Option<String> },

    /// The target record disappeared between listing and action
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// Malformed or missing fields in a form commit; never reaches the network
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote call did not complete successfully
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(name) => format!(" (held by '{}')", name),
        None => String::new(),
    }
}

impl CloudRecError {
    pub fn lock_not_held(id: i64, holder: Option<&str>) -> Self {
        CloudRecError::LockNotHeld {
            id,
            holder: holder.map(str::to_string),
        }
    }

    pub fn not_found(id: i64) -> Self {
        CloudRecError::NotFound(format!("whited rule {}", id))
    }

    /// Whether the user may simply re-trigger the action.
    ///
    /// Only transport failures qualify; everything else needs the user to
    /// change something first (grab the lock, fix the form, refresh the list).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudRecError::Transport(_))
    }

    /// Whether the list the action came from should be re-fetched
    pub fn requires_refresh(&self) -> bool {
        matches!(
            self,
            CloudRecError::NotFound(_) | CloudRecError::LockNotHeld { .. }
        )
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            CloudRecError::LockNotHeld { .. } => LOCK_NOT_HELD,
            CloudRecError::NotFound(_) => RESOURCE_NOT_FOUND,
            CloudRecError::Validation(_) => PARAMETER_VALIDATE_ERROR,
            CloudRecError::Transport(_) => TRANSPORT_FAILURE,
            CloudRecError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            CloudRecError::Internal(_) => SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for CloudRecError {
    fn from(value: anyhow::Error) -> Self {
        CloudRecError::Internal(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CloudRecError>;

/// Error code structure for notifications and API responses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 200,
    message: "success",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
};

pub const LOCK_NOT_HELD: ErrorCode<'static> = ErrorCode {
    code: 20014,
    message: "lock not held, please grab the lock first",
};

pub const TRANSPORT_FAILURE: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "remote call failed, please retry",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloudrec_error_display() {
        let err = CloudRecError::lock_not_held(42, Some("alice"));
        assert_eq!(
            err.to_string(),
            "record '42' is not locked by the current user (held by 'alice')"
        );

        let err = CloudRecError::lock_not_held(7, None);
        assert_eq!(err.to_string(), "record '7' is not locked by the current user");

        let err = CloudRecError::not_found(3);
        assert_eq!(err.to_string(), "resource 'whited rule 3' not found");

        let err = CloudRecError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "transport failure: connection reset");

        let err = CloudRecError::IllegalArgument("page size must be positive".to_string());
        assert_eq!(err.to_string(), "illegal argument: page size must be positive");
    }

    #[test]
    fn test_retryable_only_for_transport() {
        assert!(CloudRecError::Transport("x".into()).is_retryable());
        assert!(!CloudRecError::lock_not_held(1, None).is_retryable());
        assert!(!CloudRecError::Validation("x".into()).is_retryable());
        assert!(!CloudRecError::not_found(1).is_retryable());
    }

    #[test]
    fn test_requires_refresh() {
        assert!(CloudRecError::not_found(1).requires_refresh());
        assert!(CloudRecError::lock_not_held(1, Some("bob")).requires_refresh());
        assert!(!CloudRecError::Validation("x".into()).requires_refresh());
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CloudRecError::lock_not_held(1, None).error_code(), LOCK_NOT_HELD);
        assert_eq!(CloudRecError::not_found(1).error_code().code, 20004);
        assert_eq!(SUCCESS.code, 200);
    }

    #[test]
    fn test_from_anyhow() {
        let err: CloudRecError = anyhow::anyhow!("boom").into();
        assert_eq!(err, CloudRecError::Internal("boom".to_string()));
    }
}
