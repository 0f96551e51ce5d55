//! Error types for the mouse layer.

use thiserror::Error;

/// Result type alias for mouselayer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the mouse layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine is not running.
    #[error("mouse layer is not running")]
    NotRunning,

    /// The host refused to install the keyboard hook.
    #[error("key hook unavailable: {0}")]
    HookUnavailable(String),

    /// Raw device listing or registration failed.
    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    /// Neither a raw nor a generic activity source could be installed.
    #[error("no pointer activity source could be installed: {0}")]
    NoActivitySource(String),

    /// The pointer actuator failed to press, release or scroll.
    #[error("pointer actuation failed: {0}")]
    Actuation(String),

    /// A configuration entry could not be parsed.
    #[error("malformed configuration: {0}")]
    MalformedConfiguration(String),

    /// Thread-related error.
    #[error("thread error: {0}")]
    ThreadError(String),

    /// The requested feature is not supported on this platform.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Reading or writing a configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration JSON could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
