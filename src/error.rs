use thiserror::Error;

/// Errors surfaced to callers of the bridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("messaging client is not connected")]
    NotConnected,
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Errors reported by a [`crate::client::MessagingClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("timed out")]
    Timeout,
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<ClientError> for BridgeError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotConnected => BridgeError::NotConnected,
            other => BridgeError::SendFailed(other.to_string()),
        }
    }
}
