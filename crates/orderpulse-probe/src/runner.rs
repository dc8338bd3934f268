//! Sequential battery execution
//!
//! Bootstraps sessions once, then walks the selected checks in order. One
//! misbehaving check cannot starve the run: every check gets an outer
//! window on top of its own per-operation deadlines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use orderpulse_client::{ApiClient, SessionSet};
use orderpulse_core::{CheckResult, ProbeConfig, Role, StabilityReport};

use crate::checks::{run_check, CheckContext, CheckKind};
use crate::error::Result;

/// Slack added on top of a check's own deadlines
const GUARD_SLACK: Duration = Duration::from_secs(5);

/// Drives one probe run end to end
pub struct ProbeRunner {
    config: ProbeConfig,
    selected: Vec<CheckKind>,
    interrupted: Arc<AtomicBool>,
}

impl ProbeRunner {
    /// Full battery in standard order
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_checks(config, CheckKind::ALL.to_vec())
    }

    /// Battery restricted to the given checks
    pub fn with_checks(config: ProbeConfig, selected: Vec<CheckKind>) -> Self {
        Self {
            config,
            selected,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Flag that stops the battery between checks once set
    ///
    /// Meant for Ctrl-C handling: an interrupted run finishes the check in
    /// flight and still reports the results it has.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Bootstrap sessions, run the battery, aggregate the report
    pub async fn run(&self) -> Result<StabilityReport> {
        let api = ApiClient::new(&self.config.base_url, self.config.timeouts.http())?;
        info!("bootstrapping sessions against {}", api.base_url());
        let sessions = SessionSet::bootstrap(&api, &self.config).await;
        info!("{} of 3 sessions established", sessions.established());

        let ctx = CheckContext {
            config: &self.config,
            api: &api,
            sessions: &sessions,
        };

        let mut report = StabilityReport::new();
        for kind in &self.selected {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!(
                    "interrupted, stopping with {} of {} checks done",
                    report.total(),
                    self.selected.len()
                );
                break;
            }
            info!("check: {}", kind.name());
            let guard = self.guard_for(*kind);
            let result = if let Some(skipped) = missing_session_failure(*kind, &sessions) {
                skipped
            } else {
                match timeout(guard, run_check(*kind, &ctx)).await {
                    Ok(result) => result,
                    Err(_) => CheckResult::fail(
                        kind.name(),
                        "",
                        format!("check overran its {:.0?} window", guard),
                        guard,
                    ),
                }
            };
            if result.passed {
                info!("pass: {} ({})", result.name, result.detail);
            } else {
                warn!(
                    "fail: {} ({})",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            report.add_result(result);
        }
        Ok(report)
    }

    /// Worst-case window for one check under the configured deadlines
    fn guard_for(&self, kind: CheckKind) -> Duration {
        let t = &self.config.timeouts;
        let base = match kind {
            CheckKind::ConnectBusiness | CheckKind::ConnectAdmin => t.connect(),
            CheckKind::Heartbeat => t.connect() + t.heartbeat() * t.heartbeat_cycles.max(1),
            CheckKind::IdleHold => t.connect() + t.idle_target() + t.idle_poll(),
            CheckKind::Resubscribe => (t.connect() + t.subscribe()) * 2,
            CheckKind::OrderNotification => {
                t.connect() + t.subscribe() + t.notification() + t.http() * 2
            }
            CheckKind::RejectionPath => t.connect(),
        };
        base + GUARD_SLACK
    }
}

/// Failed result for a check whose sessions never came up, so the check
/// itself is not attempted
fn missing_session_failure(kind: CheckKind, sessions: &SessionSet) -> Option<CheckResult> {
    let missing: Vec<Role> = kind
        .required_roles()
        .iter()
        .copied()
        .filter(|role| sessions.session(*role).is_none())
        .collect();
    if missing.is_empty() {
        return None;
    }
    let causes = missing
        .iter()
        .map(|role| match sessions.failure(*role) {
            Some(cause) => format!("{role}: {cause}"),
            None => format!("{role}: no session"),
        })
        .collect::<Vec<_>>()
        .join("; ");
    Some(CheckResult::fail(
        kind.name(),
        "session bootstrap",
        causes,
        Duration::ZERO,
    ))
}
