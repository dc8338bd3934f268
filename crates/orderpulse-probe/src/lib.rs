//! Stability checks for the realtime order channel
//!
//! The probe dials the channel the way a delivery dashboard would and
//! verifies, one scripted check at a time, that a connection can be
//! established, kept alive, re-subscribed, and actually delivers order
//! pushes. Results aggregate into a [`StabilityReport`] verdict.
//!
//! [`StabilityReport`]: orderpulse_core::StabilityReport

pub mod checks;
pub mod connection;
pub mod error;
pub mod runner;

pub use checks::{run_check, CheckContext, CheckKind};
pub use connection::{ProbeConnection, RejectionOutcome};
pub use error::{ProbeError, Result};
pub use runner::ProbeRunner;
