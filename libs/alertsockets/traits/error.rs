use thiserror::Error;

/// Main error type for alertsockets
#[derive(Error, Debug)]
pub enum SessionError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Inbound frame could not be decoded as an envelope
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External credential refresh failed
    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),
}

/// Result type for alertsockets operations
pub type Result<T> = std::result::Result<T, SessionError>;
