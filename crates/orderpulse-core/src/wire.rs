//! Message model for the realtime order channel
//!
//! The channel speaks JSON text frames tagged by a `type` field, plus two
//! bare text literals (`ping`/`pong`) for application-level heartbeat.
//! Server pushes are parsed tolerantly: required fields are modeled as
//! options so a defective payload can be reported naming every absent
//! field instead of failing on the first one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Heartbeat request literal sent by clients
pub const PING: &str = "ping";

/// Heartbeat response literal expected from the server
pub const PONG: &str = "pong";

/// How many characters of a raw frame to keep when quoting it in errors
pub const PAYLOAD_SNIPPET_LEN: usize = 200;

/// Connection roles understood by the order channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Business,
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Business => "business",
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-to-client message enum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting pushed right after the upgrade completes
    Connection(ConnectionAck),

    /// Acknowledgement of a `subscribe` request
    Subscribed(SubscribeAck),

    /// Push delivered when an order lands on a subscribed business
    OrderNotification(OrderNotification),

    /// Server-side error report
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Wire name of the `type` tag, for mismatch diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Connection(_) => "connection",
            ServerMessage::Subscribed(_) => "subscribed",
            ServerMessage::OrderNotification(_) => "order_notification",
            ServerMessage::Error(_) => "error",
        }
    }
}

/// Connection greeting payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionAck {
    /// Role echoed by the server. Kept as raw text so a wrong echo can be
    /// quoted verbatim in the failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionAck {
    /// True when the greeting confirms the role this connection asked for
    pub fn confirms_role(&self, expected: Role) -> bool {
        self.role.as_deref() == Some(expected.as_str())
    }
}

/// Subscription acknowledgement payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubscribeAck {
    pub fn confirms_business(&self, business_id: i64) -> bool {
        self.business_id
            .as_ref()
            .map(|v| id_matches(v, business_id))
            .unwrap_or(false)
    }
}

/// Order push payload
///
/// Every field the probe requires is optional here; [`missing_fields`]
/// names the gaps.
///
/// [`missing_fields`]: OrderNotification::missing_fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl OrderNotification {
    /// Names every required field absent from the payload
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.order_id.is_none() {
            missing.push("order_id");
        }
        if self.business_id.is_none() {
            missing.push("business_id");
        }
        if self.customer_name.is_none() {
            missing.push("customer_name");
        }
        if self.total.is_none() {
            missing.push("total");
        }
        missing
    }

    pub fn is_for_business(&self, business_id: i64) -> bool {
        self.business_id
            .as_ref()
            .map(|v| id_matches(v, business_id))
            .unwrap_or(false)
    }

    pub fn matches_order(&self, order_id: i64) -> bool {
        self.order_id
            .as_ref()
            .map(|v| id_matches(v, order_id))
            .unwrap_or(false)
    }

    /// One-line description for check details
    pub fn describe(&self) -> String {
        let show = |v: &Option<Value>| match v {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "?".to_string(),
        };
        format!(
            "order {} for business {} from {} (total {})",
            show(&self.order_id),
            show(&self.business_id),
            self.customer_name.as_deref().unwrap_or("?"),
            show(&self.total),
        )
    }
}

/// Server error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

impl ErrorMessage {
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or("(no message)")
    }
}

/// Client-to-server message enum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { role: Role, business_id: i64 },
}

impl ClientMessage {
    pub fn subscribe(role: Role, business_id: i64) -> Self {
        ClientMessage::Subscribe { role, business_id }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What the server said when it closed the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_policy_violation(&self) -> bool {
        self.code == crate::CLOSE_POLICY_VIOLATION
    }

    /// Closes a healthy but idle server may legitimately send
    pub fn is_expected_idle_close(&self) -> bool {
        self.code == crate::CLOSE_NORMAL || self.code == crate::CLOSE_GOING_AWAY
    }
}

impl std::fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "close code {}", self.code)
        } else {
            write!(f, "close code {} ({})", self.code, self.reason)
        }
    }
}

/// Parse one text frame into a [`ServerMessage`]
///
/// The raw frame is quoted (truncated) in the error so protocol mismatches
/// stay diagnosable from the check detail alone.
pub fn parse_server_message(raw: &str) -> Result<ServerMessage> {
    serde_json::from_str(raw).map_err(|e| Error::Malformed {
        reason: e.to_string(),
        snippet: snippet(raw),
    })
}

/// Bounded quote of a raw frame for error text
pub fn snippet(raw: &str) -> String {
    if raw.chars().count() <= PAYLOAD_SNIPPET_LEN {
        raw.to_string()
    } else {
        let head: String = raw.chars().take(PAYLOAD_SNIPPET_LEN).collect();
        format!("{head}...")
    }
}

/// Compare a JSON id against a known numeric id
///
/// Backends are inconsistent about ids: some echoes carry JSON numbers,
/// others the same value as a string. Accept both spellings.
pub fn id_matches(value: &Value, id: i64) -> bool {
    match value {
        Value::Number(n) => n.as_i64() == Some(id),
        Value::String(s) => s.parse::<i64>().map(|parsed| parsed == id).unwrap_or(false),
        _ => false,
    }
}
