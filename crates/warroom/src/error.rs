//! Client error types.
//!
//! Only construction and the pluggable transport seams return these.
//! Producer operations absorb every delivery failure.

use std::time::Duration;

use thiserror::Error;

/// Result type for war room client operations.
pub type WarroomResult<T> = Result<T, WarroomError>;

/// Errors that can occur while configuring or delivering events.
#[derive(Debug, Error)]
pub enum WarroomError {
    /// Configuration is missing a value or holds an unusable one.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server URL could not be parsed or has an unsupported scheme.
    #[error("Invalid server URL '{url}': {message}")]
    InvalidServerUrl { url: String, message: String },

    /// Configuration sources could not be loaded.
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Real-time channel failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Fallback endpoint answered with a non-success status.
    #[error("Fallback delivery rejected with status {0}")]
    FallbackStatus(reqwest::StatusCode),

    /// Fallback attempt exceeded its time bound.
    #[error("Fallback delivery timed out after {0:?}")]
    FallbackTimeout(Duration),

    /// Event could not be serialized.
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Client was built outside a tokio runtime.
    #[error("War room client must be created inside a tokio runtime")]
    NoRuntime,

    /// Real-time channel is closed.
    #[error("Connection closed")]
    ConnectionClosed,
}
