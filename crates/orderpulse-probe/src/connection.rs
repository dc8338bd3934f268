//! One probe-held connection to the order channel
//!
//! Wraps the raw WebSocket with the channel's session rules: a connection
//! only counts as established once the server's greeting confirms the role
//! that was requested. Everything a check does afterwards (heartbeat,
//! subscribing, holding idle, waiting for pushes) lives here.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use orderpulse_core::wire::{id_matches, snippet};
use orderpulse_core::{
    parse_server_message, ClientMessage, CloseInfo, ConnectionAck, OrderNotification, Role,
    ServerMessage, SubscribeAck, PING, PONG,
};

use crate::error::{ProbeError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established, greeting-validated channel connection
pub struct ProbeConnection {
    ws: WsStream,
    role: Role,
    greeting: ConnectionAck,
    established_in: Duration,
}

impl ProbeConnection {
    /// Connect and wait for a greeting confirming `role`, all within `deadline`
    ///
    /// When `business` is given, a greeting that echoes a different business
    /// id also fails establishment. A greeting without the echo is accepted.
    pub async fn connect(
        url: &str,
        role: Role,
        business: Option<i64>,
        deadline: Duration,
    ) -> Result<Self> {
        debug!("connecting {} to {}", role, url);
        let started = Instant::now();
        let establish = async {
            let mut ws = raw_connect(url).await?;
            let greeting = await_greeting(&mut ws, role, business).await?;
            Ok::<_, ProbeError>((ws, greeting))
        };
        let (ws, greeting) = timeout(deadline, establish)
            .await
            .map_err(|_| ProbeError::timeout("connection greeting", deadline))??;
        let established_in = started.elapsed();
        info!("{} connected in {:.0?}", role, established_in);
        Ok(Self {
            ws,
            role,
            greeting,
            established_in,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn greeting(&self) -> &ConnectionAck {
        &self.greeting
    }

    /// Time from dialing to the validated greeting
    pub fn established_in(&self) -> Duration {
        self.established_in
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.ws
            .send(WsMessage::Text(text.to_string()))
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))
    }

    /// One application-level heartbeat: send `ping`, time the `pong`
    pub async fn ping_roundtrip(&mut self, deadline: Duration) -> Result<Duration> {
        let sent = Instant::now();
        self.send_text(PING).await?;
        loop {
            let remaining = deadline
                .checked_sub(sent.elapsed())
                .ok_or_else(|| ProbeError::timeout("heartbeat pong", deadline))?;
            match timeout(remaining, self.ws.next()).await {
                Err(_) => return Err(ProbeError::timeout("heartbeat pong", deadline)),
                Ok(Some(Ok(WsMessage::Text(text)))) if text == PONG => return Ok(sent.elapsed()),
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    return Err(ProbeError::mismatch(format!("{PONG:?}"), snippet(&text)))
                }
                Ok(Some(Ok(WsMessage::Close(frame)))) => {
                    return Err(ProbeError::Closed(close_info(frame)))
                }
                // Control ping/pong is answered by the library
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => return Err(ProbeError::Transport(e.to_string())),
                Ok(None) => return Err(ProbeError::Dropped),
            }
        }
    }

    /// Next parsed JSON frame, skipping control traffic
    pub async fn next_server_message(
        &mut self,
        what: &str,
        deadline: Duration,
    ) -> Result<ServerMessage> {
        let started = Instant::now();
        loop {
            let remaining = deadline
                .checked_sub(started.elapsed())
                .ok_or_else(|| ProbeError::timeout(what, deadline))?;
            match timeout(remaining, self.ws.next()).await {
                Err(_) => return Err(ProbeError::timeout(what, deadline)),
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    return parse_server_message(&text).map_err(ProbeError::from)
                }
                Ok(Some(Ok(WsMessage::Close(frame)))) => {
                    return Err(ProbeError::Closed(close_info(frame)))
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => return Err(ProbeError::Transport(e.to_string())),
                Ok(None) => return Err(ProbeError::Dropped),
            }
        }
    }

    /// Subscribe to a business feed and wait for the acknowledgement
    ///
    /// An ack that echoes the business id must echo the right one; an ack
    /// carrying only an affirmative message is accepted as-is.
    pub async fn subscribe(&mut self, business_id: i64, deadline: Duration) -> Result<SubscribeAck> {
        let request = ClientMessage::subscribe(self.role, business_id).to_json()?;
        self.send_text(&request).await?;
        match self.next_server_message("subscription ack", deadline).await? {
            ServerMessage::Subscribed(ack) => match &ack.business_id {
                Some(echo) if !id_matches(echo, business_id) => Err(ProbeError::mismatch(
                    format!("ack for business {business_id}"),
                    format!("ack for business {echo}"),
                )),
                _ => {
                    debug!("subscribed to business {}", business_id);
                    Ok(ack)
                }
            },
            ServerMessage::Error(e) => Err(ProbeError::mismatch(
                "subscription ack",
                format!("error frame: {}", e.text()),
            )),
            other => Err(ProbeError::mismatch(
                "subscription ack",
                format!("{} frame", other.type_name()),
            )),
        }
    }

    /// Keep the socket open and silent until `target` elapses
    ///
    /// Returns how long the connection actually held. A server-initiated
    /// close or a transport fault before the target fails the hold;
    /// unsolicited frames do not, and an orderly close landing right on
    /// the target boundary still counts as a full hold.
    pub async fn hold_idle(&mut self, target: Duration, poll: Duration) -> Result<Duration> {
        let started = Instant::now();
        loop {
            let elapsed = started.elapsed();
            let remaining = match target.checked_sub(elapsed) {
                Some(rem) if !rem.is_zero() => rem,
                _ => return Ok(elapsed),
            };
            let window = remaining.min(poll);
            match timeout(window, self.ws.next()).await {
                // Silence is the passing outcome here
                Err(_) => {
                    debug!("idle {:.0?} of {:.0?}", started.elapsed(), target);
                    continue;
                }
                Ok(Some(Ok(WsMessage::Close(frame)))) => {
                    let info = close_info(frame);
                    let held = started.elapsed();
                    if held >= target && info.is_expected_idle_close() {
                        return Ok(held);
                    }
                    return Err(ProbeError::Closed(info));
                }
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    debug!("unsolicited frame while idle: {}", snippet(&text));
                    continue;
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => return Err(ProbeError::Transport(e.to_string())),
                Ok(None) => return Err(ProbeError::Dropped),
            }
        }
    }

    /// Wait for a complete order push matching the id delivered on `expected`
    ///
    /// The push can land before the injector learns its order id, so
    /// complete pushes for the right business are held until the id
    /// arrives. A push missing required fields fails immediately; pushes
    /// for other businesses or other orders are skipped.
    pub async fn await_order_push(
        &mut self,
        business_id: i64,
        mut expected: oneshot::Receiver<i64>,
        deadline: Duration,
    ) -> Result<OrderNotification> {
        let started = Instant::now();
        let mut wanted: Option<i64> = None;
        let mut held: Vec<OrderNotification> = Vec::new();
        loop {
            if let Some(id) = wanted {
                if let Some(hit) = held.iter().find(|n| n.matches_order(id)) {
                    return Ok(hit.clone());
                }
            }
            let remaining = deadline
                .checked_sub(started.elapsed())
                .ok_or_else(|| ProbeError::timeout("order notification", deadline))?;
            tokio::select! {
                id = &mut expected, if wanted.is_none() => match id {
                    Ok(id) => wanted = Some(id),
                    Err(_) => {
                        return Err(ProbeError::Transport(
                            "order injection abandoned".to_string(),
                        ))
                    }
                },
                frame = timeout(remaining, self.ws.next()) => match frame {
                    Err(_) => return Err(ProbeError::timeout("order notification", deadline)),
                    Ok(Some(Ok(WsMessage::Text(text)))) => {
                        match parse_server_message(&text)? {
                            ServerMessage::OrderNotification(push) => {
                                let missing = push.missing_fields();
                                if !missing.is_empty() {
                                    return Err(ProbeError::mismatch(
                                        "complete order notification",
                                        format!("push missing {}", missing.join(", ")),
                                    ));
                                }
                                if push.is_for_business(business_id) {
                                    held.push(push);
                                } else {
                                    debug!("push for another business skipped: {}", push.describe());
                                }
                            }
                            other => {
                                debug!("{} frame skipped while waiting for order push", other.type_name());
                            }
                        }
                    }
                    Ok(Some(Ok(WsMessage::Close(frame)))) => {
                        return Err(ProbeError::Closed(close_info(frame)))
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => return Err(ProbeError::Transport(e.to_string())),
                    Ok(None) => return Err(ProbeError::Dropped),
                },
            }
        }
    }

    /// Dial a deliberately defective connect request and report how the
    /// server reacted
    ///
    /// Refusals are values here, not errors: the caller decides which
    /// reactions count as correct enforcement. Only infrastructure faults
    /// (unreachable host, transport breakage) surface as `Err`.
    pub async fn probe_rejection(url: &str, deadline: Duration) -> Result<RejectionOutcome> {
        let started = Instant::now();
        let mut ws = match timeout(deadline, raw_connect(url)).await {
            Err(_) => return Err(ProbeError::timeout("defective-connect handshake", deadline)),
            Ok(Ok(ws)) => ws,
            Ok(Err(ProbeError::HandshakeRejected { status })) => {
                return Ok(RejectionOutcome::HandshakeRefused { status })
            }
            Ok(Err(e)) => return Err(e),
        };
        loop {
            let remaining = match deadline.checked_sub(started.elapsed()) {
                Some(rem) if !rem.is_zero() => rem,
                _ => return Ok(RejectionOutcome::Tolerated),
            };
            match timeout(remaining, ws.next()).await {
                Err(_) => return Ok(RejectionOutcome::Tolerated),
                Ok(Some(Ok(WsMessage::Close(frame)))) => {
                    return Ok(RejectionOutcome::ClosedWith(close_info(frame)))
                }
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    if let Ok(ServerMessage::Error(e)) = parse_server_message(&text) {
                        return Ok(RejectionOutcome::ErrorFrame(e.text().to_string()));
                    }
                    debug!("frame on a defective connect: {}", snippet(&text));
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => return Err(ProbeError::Transport(e.to_string())),
                Ok(None) => return Err(ProbeError::Dropped),
            }
        }
    }

    /// Close the socket politely, ignoring failures
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// How the server reacted to a deliberately defective connect request
#[derive(Debug)]
pub enum RejectionOutcome {
    /// The upgrade itself was refused at the HTTP layer
    HandshakeRefused { status: u16 },
    /// Accepted, then closed with this frame
    ClosedWith(CloseInfo),
    /// Accepted, then an explicit error frame arrived
    ErrorFrame(String),
    /// Accepted and still open when the deadline passed
    Tolerated,
}

impl std::fmt::Display for RejectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionOutcome::HandshakeRefused { status } => {
                write!(f, "upgrade refused with HTTP {status}")
            }
            RejectionOutcome::ClosedWith(info) => write!(f, "{info}"),
            RejectionOutcome::ErrorFrame(text) => write!(f, "error frame: {text}"),
            RejectionOutcome::Tolerated => f.write_str("connection accepted and held open"),
        }
    }
}

async fn raw_connect(url: &str) -> Result<WsStream> {
    match connect_async(url).await {
        Ok((ws, _response)) => Ok(ws),
        Err(WsError::Http(response)) => Err(ProbeError::HandshakeRejected {
            status: response.status().as_u16(),
        }),
        Err(e) => Err(ProbeError::ConnectFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn await_greeting(
    ws: &mut WsStream,
    role: Role,
    business: Option<i64>,
) -> Result<ConnectionAck> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match parse_server_message(&text)? {
                    ServerMessage::Connection(ack) => {
                        if !ack.confirms_role(role) {
                            return Err(ProbeError::mismatch(
                                format!("greeting confirming role {role}"),
                                format!("role {:?}", ack.role.as_deref().unwrap_or("(absent)")),
                            ));
                        }
                        if let (Some(id), Some(echo)) = (business, &ack.business_id) {
                            if !id_matches(echo, id) {
                                return Err(ProbeError::mismatch(
                                    format!("greeting for business {id}"),
                                    format!("greeting for business {echo}"),
                                ));
                            }
                        }
                        Ok(ack)
                    }
                    ServerMessage::Error(e) => Err(ProbeError::mismatch(
                        "connection greeting",
                        format!("error frame: {}", e.text()),
                    )),
                    other => Err(ProbeError::mismatch(
                        "connection greeting",
                        format!("{} frame", other.type_name()),
                    )),
                };
            }
            Some(Ok(WsMessage::Close(frame))) => return Err(ProbeError::Closed(close_info(frame))),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ProbeError::Transport(e.to_string())),
            None => return Err(ProbeError::Dropped),
        }
    }
}

fn close_info(frame: Option<CloseFrame<'_>>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.to_string()),
        // 1005: the peer closed without a status code
        None => CloseInfo::new(1005, ""),
    }
}
