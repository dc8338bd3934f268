//! Probe error taxonomy
//!
//! Every fault a check can hit maps onto one variant so failure text in the
//! report names what actually went wrong: a refused upgrade, a deadline, a
//! frame that said the wrong thing, or a socket that went away early.

use std::time::Duration;

use thiserror::Error;

use orderpulse_core::CloseInfo;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// The WebSocket upgrade was refused before the protocol started
    #[error("handshake rejected with HTTP {status}")]
    HandshakeRejected { status: u16 },

    /// TCP or TLS level failure while connecting
    #[error("connect to {url} failed: {reason}")]
    ConnectFailed { url: String, reason: String },

    /// Deadline elapsed with no qualifying frame
    #[error("timed out after {:.1}s waiting for {what}", timeout.as_secs_f64())]
    Timeout { what: String, timeout: Duration },

    /// A frame arrived but said the wrong thing
    #[error("expected {expected}, got {got}")]
    Mismatch { expected: String, got: String },

    /// The server closed the socket while the check still needed it
    #[error("closed early: {0}")]
    Closed(CloseInfo),

    /// The TCP stream ended without a close frame
    #[error("connection dropped without a close frame")]
    Dropped,

    /// Read or write failure on an established socket
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Client(#[from] orderpulse_client::ClientError),

    #[error(transparent)]
    Core(#[from] orderpulse_core::Error),
}

impl ProbeError {
    pub(crate) fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        ProbeError::Timeout {
            what: what.into(),
            timeout,
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        ProbeError::Mismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}
