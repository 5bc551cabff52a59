//! Error types for DSBridge.

use thiserror::Error;

/// Main error type for DSBridge operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Bad offset/length, zero counts or a malformed lease request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested lease overlaps or duplicates an outstanding one.
    #[error("Region conflict: {0}")]
    RegionConflict(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Device not initialized")]
    NotInitialized,

    #[error("Device already initialized")]
    AlreadyInitialized,

    /// Hardware acquisition failed.
    #[error("No device: {0}")]
    NoDevice(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl BridgeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(format!("config: {err}"))
    }
}

/// Result type alias for DSBridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
