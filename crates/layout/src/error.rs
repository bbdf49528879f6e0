//! Error types for the layout engine.
//!
//! Only configuration handling can fail. Computing a layout from a
//! snapshot is infallible.

use thiserror::Error;

/// Result type alias for the layout engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid layout or capacity configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration document could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
