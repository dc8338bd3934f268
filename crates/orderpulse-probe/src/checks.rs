//! The stability check battery
//!
//! Each check is one command: it borrows the shared [`CheckContext`], does
//! its network work, and always comes back as a [`CheckResult`]. Faults
//! never propagate out of a check; they become failed results with the
//! stage and cause spelled out.

use std::time::Instant;

use tokio::sync::oneshot;
use tracing::debug;

use orderpulse_client::{ApiClient, ClientError, OrderInjector, SessionSet};
use orderpulse_core::{CheckResult, ProbeConfig, Role, CLOSE_POLICY_VIOLATION};

use crate::connection::{ProbeConnection, RejectionOutcome};
use crate::error::ProbeError;

/// Everything a check may touch, shared across the battery
pub struct CheckContext<'a> {
    pub config: &'a ProbeConfig,
    pub api: &'a ApiClient,
    pub sessions: &'a SessionSet,
}

/// The battery, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    ConnectBusiness,
    ConnectAdmin,
    Heartbeat,
    IdleHold,
    Resubscribe,
    OrderNotification,
    RejectionPath,
}

impl CheckKind {
    pub const ALL: [CheckKind; 7] = [
        CheckKind::ConnectBusiness,
        CheckKind::ConnectAdmin,
        CheckKind::Heartbeat,
        CheckKind::IdleHold,
        CheckKind::Resubscribe,
        CheckKind::OrderNotification,
        CheckKind::RejectionPath,
    ];

    /// Name used in the report
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::ConnectBusiness => "connection establishment (business)",
            CheckKind::ConnectAdmin => "connection establishment (admin)",
            CheckKind::Heartbeat => "heartbeat ping/pong",
            CheckKind::IdleHold => "idle connection hold",
            CheckKind::Resubscribe => "re-subscription after reconnect",
            CheckKind::OrderNotification => "order notification delivery",
            CheckKind::RejectionPath => "missing business_id rejection",
        }
    }

    /// Sessions the check cannot run without
    pub fn required_roles(&self) -> &'static [Role] {
        match self {
            CheckKind::ConnectBusiness => &[Role::Business],
            CheckKind::ConnectAdmin => &[Role::Admin],
            CheckKind::Heartbeat | CheckKind::IdleHold | CheckKind::Resubscribe => {
                &[Role::Business]
            }
            CheckKind::OrderNotification => &[Role::Business, Role::Customer],
            CheckKind::RejectionPath => &[],
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one check, folding any fault into the returned result
pub async fn run_check(kind: CheckKind, ctx: &CheckContext<'_>) -> CheckResult {
    let started = Instant::now();
    let outcome = match kind {
        CheckKind::ConnectBusiness => connect_check(ctx, Role::Business).await,
        CheckKind::ConnectAdmin => connect_check(ctx, Role::Admin).await,
        CheckKind::Heartbeat => heartbeat_check(ctx).await,
        CheckKind::IdleHold => idle_hold_check(ctx).await,
        CheckKind::Resubscribe => resubscribe_check(ctx).await,
        CheckKind::OrderNotification => notification_check(ctx).await,
        CheckKind::RejectionPath => rejection_check(ctx).await,
    };
    let duration = started.elapsed();
    match outcome {
        Ok(detail) => CheckResult::pass(kind.name(), detail, duration),
        Err(fail) => CheckResult::fail(kind.name(), fail.stage, fail.error.to_string(), duration),
    }
}

/// Failure of one check, tagged with the stage it happened in
struct CheckFail {
    stage: String,
    error: ProbeError,
}

impl From<ProbeError> for CheckFail {
    fn from(error: ProbeError) -> Self {
        Self {
            stage: String::new(),
            error,
        }
    }
}

impl From<ClientError> for CheckFail {
    fn from(error: ClientError) -> Self {
        Self {
            stage: String::new(),
            error: error.into(),
        }
    }
}

impl From<orderpulse_core::Error> for CheckFail {
    fn from(error: orderpulse_core::Error) -> Self {
        Self {
            stage: String::new(),
            error: error.into(),
        }
    }
}

fn stage(name: impl Into<String>) -> impl FnOnce(ProbeError) -> CheckFail {
    let stage = name.into();
    move |error| CheckFail { stage, error }
}

type Outcome = std::result::Result<String, CheckFail>;

async fn connect_check(ctx: &CheckContext<'_>, role: Role) -> Outcome {
    ctx.sessions.require(role)?;
    let url = ctx.config.channel_url(role)?;
    // Admin sessions watch the whole platform, so no business echo to hold
    // them to
    let business = match role {
        Role::Business => Some(ctx.config.business_id),
        _ => None,
    };
    let conn = ProbeConnection::connect(&url, role, business, ctx.config.timeouts.connect()).await?;
    let detail = format!("greeting confirmed {} in {:.0?}", role, conn.established_in());
    conn.close().await;
    Ok(detail)
}

async fn heartbeat_check(ctx: &CheckContext<'_>) -> Outcome {
    ctx.sessions.require(Role::Business)?;
    let timeouts = &ctx.config.timeouts;
    let url = ctx.config.channel_url(Role::Business)?;
    let business = Some(ctx.config.business_id);
    let mut conn = ProbeConnection::connect(&url, Role::Business, business, timeouts.connect()).await?;

    let cycles = timeouts.heartbeat_cycles;
    let mut rtts = Vec::with_capacity(cycles as usize);
    for cycle in 1..=cycles {
        let rtt = conn
            .ping_roundtrip(timeouts.heartbeat())
            .await
            .map_err(stage(format!("heartbeat cycle {cycle}/{cycles}")))?;
        debug!(
            "heartbeat {}/{}: {:.1}ms",
            cycle,
            cycles,
            rtt.as_secs_f64() * 1000.0
        );
        rtts.push(rtt);
    }
    conn.close().await;

    if rtts.is_empty() {
        return Ok("no heartbeat cycles configured".to_string());
    }
    let ms = |r: &std::time::Duration| r.as_secs_f64() * 1000.0;
    let per_cycle = rtts
        .iter()
        .map(|r| format!("{:.1}", ms(r)))
        .collect::<Vec<_>>()
        .join("/");
    let mean_ms = rtts.iter().map(ms).sum::<f64>() / rtts.len() as f64;
    Ok(format!(
        "{} pongs, rtt {}ms, mean {:.1}ms",
        rtts.len(),
        per_cycle,
        mean_ms
    ))
}

async fn idle_hold_check(ctx: &CheckContext<'_>) -> Outcome {
    ctx.sessions.require(Role::Business)?;
    let timeouts = &ctx.config.timeouts;
    let url = ctx.config.channel_url(Role::Business)?;
    let business = Some(ctx.config.business_id);
    let mut conn = ProbeConnection::connect(&url, Role::Business, business, timeouts.connect()).await?;
    let started = Instant::now();
    let held = conn
        .hold_idle(timeouts.idle_target(), timeouts.idle_poll())
        .await
        .map_err(|error| CheckFail {
            stage: format!(
                "idle hold ended at {:.0?} of {:.0?}",
                started.elapsed(),
                timeouts.idle_target()
            ),
            error,
        })?;
    conn.close().await;
    Ok(format!("held open {:.0?} without traffic", held))
}

async fn resubscribe_check(ctx: &CheckContext<'_>) -> Outcome {
    ctx.sessions.require(Role::Business)?;
    let timeouts = &ctx.config.timeouts;
    let business_id = ctx.config.business_id;
    let url = ctx.config.channel_url(Role::Business)?;

    let mut first = ProbeConnection::connect(&url, Role::Business, Some(business_id), timeouts.connect())
        .await
        .map_err(stage("first connect"))?;
    first
        .subscribe(business_id, timeouts.subscribe())
        .await
        .map_err(stage("first subscription"))?;
    first.close().await;

    let mut second = ProbeConnection::connect(&url, Role::Business, Some(business_id), timeouts.connect())
        .await
        .map_err(stage("reconnect"))?;
    second
        .subscribe(business_id, timeouts.subscribe())
        .await
        .map_err(stage("re-subscription"))?;
    second.close().await;

    Ok(format!(
        "business {} re-subscribed after a clean reconnect",
        business_id
    ))
}

async fn notification_check(ctx: &CheckContext<'_>) -> Outcome {
    ctx.sessions.require(Role::Business)?;
    let customer = ctx.sessions.require(Role::Customer)?;
    let timeouts = &ctx.config.timeouts;
    let business_id = ctx.config.business_id;

    // Listener goes up first so the push cannot slip past the probe
    let url = ctx.config.channel_url(Role::Business)?;
    let mut conn = ProbeConnection::connect(&url, Role::Business, Some(business_id), timeouts.connect())
        .await
        .map_err(stage("listener connect"))?;
    conn.subscribe(business_id, timeouts.subscribe())
        .await
        .map_err(stage("listener subscription"))?;

    let deadline = timeouts.notification();
    let (id_tx, id_rx) = oneshot::channel();
    let listener = tokio::spawn(async move {
        let outcome = conn.await_order_push(business_id, id_rx, deadline).await;
        (conn, outcome)
    });

    let injected = match OrderInjector::new(ctx.api, customer)
        .inject(business_id)
        .await
    {
        Ok(injected) => injected,
        Err(e) => {
            listener.abort();
            return Err(CheckFail {
                stage: "order injection".to_string(),
                error: e.into(),
            });
        }
    };
    debug!("order {} injected, waiting for the push", injected.order_id);
    let _ = id_tx.send(injected.order_id);

    let (conn, outcome) = listener.await.map_err(|e| CheckFail {
        stage: "listener task".to_string(),
        error: ProbeError::Transport(e.to_string()),
    })?;
    let push = outcome.map_err(stage("waiting for the push"))?;
    conn.close().await;

    Ok(format!("{} delivered", push.describe()))
}

async fn rejection_check(ctx: &CheckContext<'_>) -> Outcome {
    let url = ctx.config.channel_url_without_business(Role::Business)?;
    let outcome = ProbeConnection::probe_rejection(&url, ctx.config.timeouts.connect())
        .await
        .map_err(stage("defective connect"))?;
    match outcome {
        RejectionOutcome::ClosedWith(info) if info.is_policy_violation() => {
            Ok(format!("refused with {info}"))
        }
        RejectionOutcome::HandshakeRefused { status } => {
            Ok(format!("upgrade refused with HTTP {status}"))
        }
        RejectionOutcome::ErrorFrame(text) => Ok(format!("refused with an error frame: {text}")),
        other => Err(CheckFail {
            stage: "rejection verdict".to_string(),
            error: ProbeError::mismatch(
                format!("close code {}", CLOSE_POLICY_VIOLATION),
                other.to_string(),
            ),
        }),
    }
}
