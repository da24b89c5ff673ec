//! Error types for GameRig

use thiserror::Error;

/// Result type alias using GameRig Error
pub type Result<T> = std::result::Result<T, Error>;

/// GameRig error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Target resolution failed: {0}")]
    TargetResolution(String),

    #[error("Failed to start launch target: {0}")]
    SpawnFailed(String),

    #[error("Process not detected: {0}")]
    ProcessNotDetected(String),

    #[error("Launch cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Window automation error: {0}")]
    Window(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
