//! Full battery runs against scripted platform doubles

use std::time::Duration;

use orderpulse_core::{ProbeConfig, ProbeTimeouts, Role, Verdict};
use orderpulse_probe::{CheckKind, ProbeRunner};
use orderpulse_test_utils::{
    cooperative_credentials, ApiScript, ChannelScript, MockApi, MockChannel, NotificationScript,
    PongMode, SubscribeMode,
};

const BUSINESS_ID: i64 = 7;

fn fast_timeouts() -> ProbeTimeouts {
    ProbeTimeouts {
        connect_secs: 2,
        heartbeat_secs: 1,
        heartbeat_cycles: 3,
        idle_target_secs: 1,
        idle_poll_secs: 1,
        subscribe_secs: 1,
        notification_secs: 2,
        http_secs: 2,
    }
}

fn config_for(api: &MockApi, channel: &MockChannel) -> ProbeConfig {
    ProbeConfig {
        base_url: api.base_url(),
        ws_url: Some(channel.url()),
        business_id: BUSINESS_ID,
        credentials: cooperative_credentials(),
        timeouts: fast_timeouts(),
    }
}

/// Channel script whose push matches the api's default injected order
fn pushing_channel() -> ChannelScript {
    ChannelScript {
        notification: Some(NotificationScript::complete(
            Duration::from_millis(200),
            1001,
            BUSINESS_ID,
        )),
        ..Default::default()
    }
}

#[tokio::test]
async fn cooperative_stack_scores_stable() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(pushing_channel()).await;
    let runner = ProbeRunner::new(config_for(&api, &channel));

    let report = runner.run().await.unwrap();

    let failures: Vec<_> = report
        .results()
        .iter()
        .filter(|r| !r.passed)
        .map(|r| (r.name.clone(), r.error.clone()))
        .collect();
    assert_eq!(report.total(), 7);
    assert_eq!(report.failed(), 0, "failures: {failures:?}");
    assert_eq!(report.verdict(), Verdict::Stable);
    assert!(report.is_stable());
}

#[tokio::test]
async fn single_fault_is_recorded_and_the_rest_still_run() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(ChannelScript {
        pong: PongMode::Never,
        ..pushing_channel()
    })
    .await;
    let runner = ProbeRunner::new(config_for(&api, &channel));

    let report = runner.run().await.unwrap();

    assert_eq!(report.total(), 7);
    assert_eq!(report.failed(), 1);
    let failed: Vec<_> = report.results().iter().filter(|r| !r.passed).collect();
    assert_eq!(failed[0].name, "heartbeat ping/pong");
    // 6 of 7 is 85.7%, still at the stable threshold
    assert_eq!(report.verdict(), Verdict::Stable);
}

#[tokio::test]
async fn partial_degradation_scores_minor_issues() {
    // Heartbeat broken and the defective connect accepted: 5 of 7 passes
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(ChannelScript {
        pong: PongMode::Never,
        enforce_business_param: false,
        ..pushing_channel()
    })
    .await;
    let runner = ProbeRunner::new(config_for(&api, &channel));

    let report = runner.run().await.unwrap();

    assert_eq!(report.failed(), 2);
    assert_eq!(report.verdict(), Verdict::MinorIssues);
    assert!(!report.is_stable());
}

#[tokio::test]
async fn widespread_faults_score_critical() {
    // No pongs and no subscription acks take out three checks
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(ChannelScript {
        pong: PongMode::Never,
        subscribe: SubscribeMode::Silent,
        ..Default::default()
    })
    .await;
    let runner = ProbeRunner::new(config_for(&api, &channel));

    let report = runner.run().await.unwrap();

    assert_eq!(report.total(), 7);
    assert_eq!(report.failed(), 3);
    assert_eq!(report.verdict(), Verdict::CriticalIssues);
}

#[tokio::test]
async fn missing_role_credentials_fail_only_their_checks() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(pushing_channel()).await;
    let mut config = config_for(&api, &channel);
    config.credentials.remove(&Role::Admin);
    let runner = ProbeRunner::new(config);

    let report = runner.run().await.unwrap();

    assert_eq!(report.failed(), 1);
    let failed = report.results().iter().find(|r| !r.passed).unwrap();
    assert_eq!(failed.name, "connection establishment (admin)");
    assert!(failed.error.as_deref().unwrap().contains("no credentials"));
}

#[tokio::test]
async fn interrupt_flag_stops_the_battery_between_checks() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(pushing_channel()).await;
    let runner = ProbeRunner::new(config_for(&api, &channel));

    // Set before the run starts: no check should be attempted
    runner
        .interrupt_flag()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let report = runner.run().await.unwrap();

    assert_eq!(report.total(), 0);
    assert!(!report.is_stable());
}

#[tokio::test]
async fn selected_checks_run_in_isolation() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let runner = ProbeRunner::with_checks(
        config_for(&api, &channel),
        vec![CheckKind::RejectionPath],
    );

    let report = runner.run().await.unwrap();

    assert_eq!(report.total(), 1);
    assert_eq!(report.results()[0].name, "missing business_id rejection");
    assert!(report.is_stable());
}
