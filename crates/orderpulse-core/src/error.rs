//! Error types for OrderPulse

use thiserror::Error;

/// Result type alias for OrderPulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared across the OrderPulse crates
#[derive(Error, Debug)]
pub enum Error {
    /// Channel frame that is not valid JSON or not a known message shape
    #[error("malformed channel message ({reason}): {snippet}")]
    Malformed { reason: String, snippet: String },

    /// JSON encoding failure for an outbound frame
    #[error("encode error: {0}")]
    Encode(String),

    /// Bad or incomplete run configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encode(e.to_string())
    }
}
