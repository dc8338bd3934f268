//! Scriptable order-channel WebSocket server
//!
//! Every accepted connection is driven by a [`ChannelScript`]: how the
//! upgrade is answered, what greeting follows, whether heartbeats are
//! honored, when the socket gets dropped. Tests describe one misbehavior
//! per scenario and assert how the probe reports it.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{
    Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};

use orderpulse_core::{CLOSE_POLICY_VIOLATION, PING, PONG};

/// How the WebSocket upgrade itself is answered
#[derive(Debug, Clone)]
pub enum HandshakeMode {
    Accept,
    /// Refuse the upgrade with this HTTP status
    Reject { status: u16 },
}

/// What greeting, if any, follows a successful upgrade
#[derive(Debug, Clone)]
pub enum GreetingMode {
    /// Echo the role and business id from the query string
    Normal,
    /// Claim a fixed role regardless of what was requested
    WrongRole(String),
    /// Send a frame with an unexpected type tag
    WrongType,
    /// Send nothing
    Silent,
}

/// How text `ping` frames are answered
#[derive(Debug, Clone)]
pub enum PongMode {
    Always,
    /// Answer the first n pings, then go quiet
    FirstN(u32),
    Never,
}

/// How `subscribe` requests are acknowledged
#[derive(Debug, Clone)]
pub enum SubscribeMode {
    /// Ack with the business id from the request
    Ack,
    /// Ack with an affirmative message but no business id echo
    Affirmative,
    /// Ack naming a different business
    WrongBusiness(i64),
    /// Reply with a server error frame
    Error(String),
    Silent,
}

/// Unprompted disconnect some time after the upgrade
#[derive(Debug, Clone)]
pub struct DropScript {
    pub after: Duration,
    /// Close frame to send first; `None` drops the TCP stream without one
    pub close: Option<(u16, String)>,
}

/// Order push scheduled after a subscribe request arrives
#[derive(Debug, Clone)]
pub struct NotificationScript {
    pub delay: Duration,
    /// Raw payload so tests can leave out required fields
    pub payload: Value,
}

impl NotificationScript {
    /// Well-formed push for the given order
    pub fn complete(delay: Duration, order_id: i64, business_id: i64) -> Self {
        Self {
            delay,
            payload: json!({
                "type": "order_notification",
                "order_id": order_id,
                "business_id": business_id,
                "customer_name": "Probe Customer",
                "total": 21.5,
                "status": "pending",
            }),
        }
    }
}

/// Full behavior description for one mock channel
#[derive(Debug, Clone)]
pub struct ChannelScript {
    pub handshake: HandshakeMode,
    pub greeting: GreetingMode,
    pub pong: PongMode,
    pub drop_after: Option<DropScript>,
    pub subscribe: SubscribeMode,
    pub notification: Option<NotificationScript>,
    /// Close 1008 when a business connection omits the business_id
    /// query parameter
    pub enforce_business_param: bool,
}

impl Default for ChannelScript {
    fn default() -> Self {
        Self {
            handshake: HandshakeMode::Accept,
            greeting: GreetingMode::Normal,
            pong: PongMode::Always,
            drop_after: None,
            subscribe: SubscribeMode::Ack,
            notification: None,
            enforce_business_param: true,
        }
    }
}

impl ChannelScript {
    /// A server that does everything right
    pub fn cooperative() -> Self {
        Self::default()
    }
}

/// Thread-safe record of client-to-server text frames
#[derive(Clone, Default)]
pub struct FrameLog {
    frames: Arc<Mutex<Vec<String>>>,
}

impl FrameLog {
    pub fn push(&self, frame: String) {
        self.frames.lock().push(frame);
    }

    pub fn all(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.frames.lock().iter().any(|f| f.contains(needle))
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

/// A scripted order-channel server that cleans up on drop
pub struct MockChannel {
    port: u16,
    handle: Option<JoinHandle<()>>,
    frames: FrameLog,
    connections: Arc<AtomicU32>,
    finished: Arc<AtomicU32>,
}

impl MockChannel {
    /// Bind a local port and start serving the script
    pub async fn start(script: ChannelScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let frames = FrameLog::default();
        let connections = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));

        let accept_frames = frames.clone();
        let accept_connections = connections.clone();
        let accept_finished = finished.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        accept_connections.fetch_add(1, Ordering::SeqCst);
                        let script = script.clone();
                        let frames = accept_frames.clone();
                        let finished = accept_finished.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, script, frames).await;
                            finished.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            port,
            handle: Some(handle),
            frames,
            connections,
            finished,
        }
    }

    /// Channel endpoint, ready to drop into `ProbeConfig::ws_url`
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws/orders", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Text frames received from clients, across all connections
    pub fn frames(&self) -> Vec<String> {
        self.frames.all()
    }

    pub fn frame_log(&self) -> FrameLog {
        self.frames.clone()
    }

    /// How many connections were accepted so far
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// How many accepted connections have ended, client close included
    pub fn finished_connections(&self) -> u32 {
        self.finished.load(Ordering::SeqCst)
    }

    /// Stop the server explicitly (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

fn is_subscribe(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("subscribe")
}

async fn serve_connection(stream: TcpStream, script: ChannelScript, frames: FrameLog) {
    let query: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let callback = {
        let query = query.clone();
        let handshake = script.handshake.clone();
        move |req: &HsRequest, response: HsResponse| {
            *query.lock() = req.uri().query().map(|q| q.to_string());
            match handshake {
                HandshakeMode::Accept => Ok(response),
                HandshakeMode::Reject { status } => {
                    let rejection = http::Response::builder()
                        .status(status)
                        .body(Some("rejected by script".to_string()))
                        .unwrap();
                    Err(rejection)
                }
            }
        }
    };

    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        // Scripted rejection or a malformed upgrade request
        Err(_) => return,
    };

    let query = query.lock().clone().unwrap_or_default();
    let role = query_param(&query, "role").unwrap_or_default();
    let business_id = query_param(&query, "business_id");

    // Only business connections must name a business; admin sessions watch
    // the whole platform
    if script.enforce_business_param && role == "business" && business_id.is_none() {
        let close = CloseFrame {
            code: CloseCode::from(CLOSE_POLICY_VIOLATION),
            reason: Cow::Borrowed("business_id query parameter is required"),
        };
        let _ = ws.send(WsMessage::Close(Some(close))).await;
        while let Some(Ok(_)) = ws.next().await {}
        return;
    }

    let greeting = match &script.greeting {
        GreetingMode::Normal => {
            let business_json = business_id
                .as_deref()
                .map(|s| {
                    s.parse::<i64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| Value::from(s))
                })
                .unwrap_or(Value::Null);
            Some(json!({
                "type": "connection",
                "role": role,
                "business_id": business_json,
                "message": "connected to order channel",
            }))
        }
        GreetingMode::WrongRole(other) => Some(json!({"type": "connection", "role": other})),
        GreetingMode::WrongType => Some(json!({"type": "welcome", "message": "hello"})),
        GreetingMode::Silent => None,
    };
    if let Some(frame) = greeting {
        if ws.send(WsMessage::Text(frame.to_string())).await.is_err() {
            return;
        }
    }

    let started = tokio::time::Instant::now();
    let drop_at = script.drop_after.as_ref().map(|d| started + d.after);
    let mut notify_at: Option<tokio::time::Instant> = None;
    let mut pongs_answered = 0u32;

    loop {
        let drop_sleep = async move {
            match drop_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => futures::future::pending::<()>().await,
            }
        };
        let notify_sleep = async move {
            match notify_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => futures::future::pending::<()>().await,
            }
        };

        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        frames.push(text.clone());
                        if text == PING {
                            let answer = match script.pong {
                                PongMode::Always => true,
                                PongMode::FirstN(n) => pongs_answered < n,
                                PongMode::Never => false,
                            };
                            if answer {
                                pongs_answered += 1;
                                if ws.send(WsMessage::Text(PONG.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        } else if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            if is_subscribe(&value) {
                                let requested =
                                    value.get("business_id").cloned().unwrap_or(Value::Null);
                                let reply = match &script.subscribe {
                                    SubscribeMode::Ack => Some(
                                        json!({"type": "subscribed", "business_id": requested}),
                                    ),
                                    SubscribeMode::Affirmative => Some(
                                        json!({"type": "subscribed", "message": "subscription active"}),
                                    ),
                                    SubscribeMode::WrongBusiness(other) => Some(
                                        json!({"type": "subscribed", "business_id": other}),
                                    ),
                                    SubscribeMode::Error(message) => {
                                        Some(json!({"type": "error", "message": message}))
                                    }
                                    SubscribeMode::Silent => None,
                                };
                                if let Some(reply) = reply {
                                    if ws
                                        .send(WsMessage::Text(reply.to_string()))
                                        .await
                                        .is_err()
                                    {
                                        break;
                                    }
                                }
                                if let Some(push) = &script.notification {
                                    notify_at =
                                        Some(tokio::time::Instant::now() + push.delay);
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = ws.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = drop_sleep => {
                if let Some(drop) = &script.drop_after {
                    if let Some((code, reason)) = &drop.close {
                        let close = CloseFrame {
                            code: CloseCode::from(*code),
                            reason: Cow::Owned(reason.clone()),
                        };
                        let _ = ws.send(WsMessage::Close(Some(close))).await;
                    }
                }
                break;
            }
            _ = notify_sleep => {
                notify_at = None;
                if let Some(push) = &script.notification {
                    if ws
                        .send(WsMessage::Text(push.payload.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}
