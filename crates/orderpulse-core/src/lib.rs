//! OrderPulse Core
//!
//! Shared types for the OrderPulse stability probe.
//!
//! This crate provides:
//! - The JSON frame model spoken on the realtime order channel ([`wire`])
//! - Per-check outcomes and the aggregated report ([`report`])
//! - Run configuration and endpoint derivation ([`config`])

pub mod config;
pub mod error;
pub mod report;
pub mod wire;

pub use config::{Credentials, ProbeConfig, ProbeTimeouts};
pub use error::{Error, Result};
pub use report::{
    CheckResult, StabilityReport, Verdict, MINOR_ISSUES_THRESHOLD, STABLE_THRESHOLD,
};
pub use wire::{
    parse_server_message, ClientMessage, CloseInfo, ConnectionAck, ErrorMessage,
    OrderNotification, Role, ServerMessage, SubscribeAck, PING, PONG,
};

/// Path of the realtime order channel on the platform host
pub const ORDER_CHANNEL_PATH: &str = "/ws/orders";

/// Close code the channel uses to reject malformed connect requests
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code for an orderly server-side shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code a server uses when it is shutting down or restarting
pub const CLOSE_GOING_AWAY: u16 = 1001;
