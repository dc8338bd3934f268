//! Common test helpers and platform doubles for OrderPulse tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A scriptable order-channel WebSocket server ([`MockChannel`])
//! - A scriptable platform REST stub ([`MockApi`])
//! - RAII cleanup so failed tests do not leak listeners

use std::time::{Duration, Instant};

pub mod api;
pub mod channel;

pub use api::{
    cooperative_credentials, ApiScript, LoginOutcome, MenuMode, MockApi, OrderMode, OrderRecord,
};
pub use channel::{
    ChannelScript, DropScript, FrameLog, GreetingMode, HandshakeMode, MockChannel,
    NotificationScript, PongMode, SubscribeMode,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Find an available TCP port for testing
///
/// The mocks bind to port 0 themselves; this is for tests that need a port
/// with nothing listening on it.
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}
