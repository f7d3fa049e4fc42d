use thiserror::Error;

/// Errors that can occur when using the task sync channel.
///
/// The type is `Clone` so the most recent failure can be kept in observable
/// state (`TaskChannel::last_error`); transport and serde sources are
/// captured as rendered messages for that reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// WebSocket transport error (handshake failed, socket closed, invalid frame)
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid construction-time configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid subscribe/unsubscribe arguments
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Attempted immediate transmission while no transport is available
    #[error("not connected")]
    NotConnected,

    /// Reconnection gave up after the configured number of attempts.
    /// Terminal for the current session; call `connect()` to resume.
    #[error("reconnection exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience type alias for `Result<T, ChannelError>`.
pub type Result<T> = std::result::Result<T, ChannelError>;
