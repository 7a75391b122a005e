//! Client error types

use cloudrec_common::CloudRecError;

/// Error type for CloudRec HTTP client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("server returned error: code={code}, message={message}")]
    ServerError { code: i32, message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for CloudRecError {
    /// The store reports no taxonomy beyond "not success"; only a missing
    /// resource is distinguished so the caller can refresh its list.
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ServerError { code: 404, message } => CloudRecError::NotFound(message),
            other => CloudRecError::Transport(other.to_string()),
        }
    }
}
