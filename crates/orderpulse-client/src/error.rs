//! Client error types

use orderpulse_core::Role;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure before any HTTP status arrived
    #[error("request failed: {0}")]
    Request(String),

    /// Non-2xx answer; the body is truncated for the report
    #[error("{context}: HTTP {status}: {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    /// 2xx answer whose body does not carry what the probe needs
    #[error("{context}: unusable response: {reason}")]
    UnusableResponse { context: String, reason: String },

    /// Login succeeded but the account is not the expected role
    #[error("role mismatch: asked for {expected}, platform says {actual}")]
    RoleMismatch { expected: Role, actual: String },

    /// No credentials configured for this role
    #[error("no credentials configured for role {0}")]
    MissingCredentials(Role),

    /// Bootstrap for this role failed earlier in the run
    #[error("no {role} session: {cause}")]
    Bootstrap { role: Role, cause: String },

    /// No session for this role and no recorded failure either
    #[error("no session for role {0}")]
    MissingSession(Role),

    #[error(transparent)]
    Core(#[from] orderpulse_core::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Request(e.to_string())
    }
}
