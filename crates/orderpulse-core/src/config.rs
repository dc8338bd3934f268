//! Run configuration for the probe
//!
//! Everything network-facing is parameterized here so runs against local,
//! staging, and production deployments differ only in the config they are
//! handed. Values deserialize from TOML; every field has a default aimed at
//! a local development stack.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::Role;
use crate::ORDER_CHANNEL_PATH;

/// Default REST base for a local platform instance
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Login credentials for one probe role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Timeouts and pacing for every network-facing step, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTimeouts {
    /// WebSocket connect plus greeting deadline
    pub connect_secs: u64,
    /// Deadline for each heartbeat pong
    pub heartbeat_secs: u64,
    /// Heartbeat cycles per check
    pub heartbeat_cycles: u32,
    /// How long the idle-hold check keeps the socket silent
    pub idle_target_secs: u64,
    /// Poll interval while holding idle
    pub idle_poll_secs: u64,
    /// Deadline for the subscription acknowledgement
    pub subscribe_secs: u64,
    /// How long to wait for the order push after injection
    pub notification_secs: u64,
    /// Deadline for each REST call
    pub http_secs: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            heartbeat_secs: 5,
            heartbeat_cycles: 3,
            idle_target_secs: 90,
            idle_poll_secs: 10,
            subscribe_secs: 5,
            notification_secs: 30,
            http_secs: 15,
        }
    }
}

impl ProbeTimeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn idle_target(&self) -> Duration {
        Duration::from_secs(self.idle_target_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }

    pub fn subscribe(&self) -> Duration {
        Duration::from_secs(self.subscribe_secs)
    }

    pub fn notification(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }
}

/// Everything the probe needs to run against one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// REST base, e.g. `http://localhost:5000`
    pub base_url: String,
    /// Explicit channel endpoint including path. Derived from `base_url`
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Business whose order channel is probed
    pub business_id: i64,
    /// Credentials keyed by role. Roles without an entry are skipped at
    /// bootstrap and their checks recorded as failures.
    pub credentials: HashMap<Role, Credentials>,
    pub timeouts: ProbeTimeouts,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            business_id: 1,
            credentials: demo_credentials(),
            timeouts: ProbeTimeouts::default(),
        }
    }
}

/// Accounts seeded by the platform's local dev fixtures. A config file
/// replaces these wholesale; they exist so a bare `orderpulse` run against
/// a preview deployment can still log in.
fn demo_credentials() -> HashMap<Role, Credentials> {
    let demo = |email: &str| Credentials {
        email: email.to_string(),
        password: "demo1234".to_string(),
    };
    HashMap::from([
        (Role::Business, demo("owner@demo.local")),
        (Role::Admin, demo("admin@demo.local")),
        (Role::Customer, demo("customer@demo.local")),
    ])
}

impl ProbeConfig {
    /// Channel endpoint for one role
    ///
    /// Only the business role names a business; admin sessions watch the
    /// whole platform and connect without one.
    pub fn channel_url(&self, role: Role) -> Result<String> {
        match role {
            Role::Business => Ok(format!(
                "{}?role={}&business_id={}",
                self.channel_root()?,
                role,
                self.business_id
            )),
            _ => Ok(format!("{}?role={}", self.channel_root()?, role)),
        }
    }

    /// Channel endpoint with the business id deliberately left out
    pub fn channel_url_without_business(&self, role: Role) -> Result<String> {
        Ok(format!("{}?role={}", self.channel_root()?, role))
    }

    pub fn credentials_for(&self, role: Role) -> Option<&Credentials> {
        self.credentials.get(&role)
    }

    fn channel_root(&self) -> Result<String> {
        match &self.ws_url {
            Some(explicit) => Ok(explicit.trim_end_matches('/').to_string()),
            None => derive_channel_root(&self.base_url),
        }
    }
}

/// Map an HTTP base URL onto the channel endpoint
///
/// `http` becomes `ws`, `https` becomes `wss`; already-websocket schemes
/// pass through. Anything else is a config error.
fn derive_channel_root(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim_end_matches('/');
    let root = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(Error::Config(format!(
            "base_url must use http(s) or ws(s), got {base_url}"
        )));
    };
    Ok(format!("{root}{ORDER_CHANNEL_PATH}"))
}
