//! ProbeConnection behavior against a scripted order channel
//!
//! Each test starts a [`MockChannel`] with one misbehavior (or none) and
//! asserts how the connection layer reports it.

use std::time::Duration;

use orderpulse_core::Role;
use orderpulse_probe::{ProbeConnection, ProbeError, RejectionOutcome};
use orderpulse_test_utils::{
    find_available_port, wait_for, ChannelScript, DropScript, GreetingMode, HandshakeMode,
    MockChannel, NotificationScript, PongMode, SubscribeMode, DEFAULT_CHECK_INTERVAL,
    DEFAULT_TIMEOUT,
};

const CONNECT: Duration = Duration::from_secs(2);
const SHORT: Duration = Duration::from_millis(500);

fn business_url(channel: &MockChannel) -> String {
    format!("{}?role=business&business_id=7", channel.url())
}

#[tokio::test]
async fn connects_and_validates_the_greeting() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;

    let conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    assert!(conn.greeting().confirms_role(Role::Business));
    assert!(conn.established_in() > Duration::ZERO);
    assert_eq!(conn.role(), Role::Business);
    conn.close().await;
}

#[tokio::test]
async fn closing_releases_the_server_side() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    conn.close().await;

    let released = wait_for(
        || async { channel.finished_connections() == 1 },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await;
    assert!(released, "server should observe the client close");
}

#[tokio::test]
async fn handshake_rejection_surfaces_the_status() {
    let script = ChannelScript {
        handshake: HandshakeMode::Reject { status: 503 },
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;

    match ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT).await
    {
        Ok(_) => panic!("connect should have been refused"),
        Err(ProbeError::HandshakeRejected { status }) => assert_eq!(status, 503),
        Err(other) => panic!("expected a handshake rejection, got {other}"),
    }
}

#[tokio::test]
async fn wrong_role_greeting_is_a_mismatch() {
    let script = ChannelScript {
        greeting: GreetingMode::WrongRole("customer".to_string()),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;

    match ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT).await
    {
        Ok(_) => panic!("wrong-role greeting should not establish"),
        Err(ProbeError::Mismatch { expected, got }) => {
            assert!(expected.contains("business"), "{expected}");
            assert!(got.contains("customer"), "{got}");
        }
        Err(other) => panic!("expected a mismatch, got {other}"),
    }
}

#[tokio::test]
async fn unparseable_greeting_is_malformed() {
    let script = ChannelScript {
        greeting: GreetingMode::WrongType,
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;

    let err = match ProbeConnection::connect(
        &business_url(&channel),
        Role::Business,
        Some(7),
        CONNECT,
    )
    .await
    {
        Ok(_) => panic!("unknown greeting type should not establish"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("welcome"), "{err}");
}

#[tokio::test]
async fn greeting_for_another_business_is_a_mismatch() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;

    // The url (and so the echo) names business 7, the probe expects 8
    match ProbeConnection::connect(&business_url(&channel), Role::Business, Some(8), CONNECT).await
    {
        Ok(_) => panic!("wrong business echo should not establish"),
        Err(ProbeError::Mismatch { expected, got }) => {
            assert!(expected.contains('8'), "{expected}");
            assert!(got.contains('7'), "{got}");
        }
        Err(other) => panic!("expected a mismatch, got {other}"),
    }
}

#[tokio::test]
async fn silent_greeting_times_out() {
    let script = ChannelScript {
        greeting: GreetingMode::Silent,
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;

    match ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), SHORT).await {
        Ok(_) => panic!("silent server should not establish"),
        Err(ProbeError::Timeout { what, .. }) => assert_eq!(what, "connection greeting"),
        Err(other) => panic!("expected a timeout, got {other}"),
    }
}

#[tokio::test]
async fn ping_roundtrip_measures_rtt() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    let rtt = conn.ping_roundtrip(SHORT).await.unwrap();

    assert!(rtt > Duration::ZERO);
    assert!(rtt < SHORT);
    assert!(channel.frames().iter().any(|f| f == "ping"));
    conn.close().await;
}

#[tokio::test]
async fn unanswered_ping_times_out() {
    let script = ChannelScript {
        pong: PongMode::Never,
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    match conn.ping_roundtrip(SHORT).await {
        Ok(_) => panic!("no pong should have arrived"),
        Err(ProbeError::Timeout { what, .. }) => assert_eq!(what, "heartbeat pong"),
        Err(other) => panic!("expected a timeout, got {other}"),
    }
}

#[tokio::test]
async fn subscription_is_acknowledged() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    let ack = conn.subscribe(7, SHORT).await.unwrap();

    assert!(ack.confirms_business(7));
    assert!(channel.frames().iter().any(|f| f.contains("subscribe")));
    conn.close().await;
}

#[tokio::test]
async fn affirmative_ack_without_echo_is_accepted() {
    let script = ChannelScript {
        subscribe: SubscribeMode::Affirmative,
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    let ack = conn.subscribe(7, SHORT).await.unwrap();

    assert!(ack.business_id.is_none());
    assert_eq!(ack.message.as_deref(), Some("subscription active"));
    conn.close().await;
}

#[tokio::test]
async fn ack_for_the_wrong_business_is_a_mismatch() {
    let script = ChannelScript {
        subscribe: SubscribeMode::WrongBusiness(99),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    match conn.subscribe(7, SHORT).await {
        Ok(_) => panic!("wrong-business ack should not count"),
        Err(ProbeError::Mismatch { expected, got }) => {
            assert!(expected.contains('7'), "{expected}");
            assert!(got.contains("99"), "{got}");
        }
        Err(other) => panic!("expected a mismatch, got {other}"),
    }
}

#[tokio::test]
async fn error_frame_instead_of_ack_is_a_mismatch() {
    let script = ChannelScript {
        subscribe: SubscribeMode::Error("subscriptions disabled".to_string()),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    match conn.subscribe(7, SHORT).await {
        Ok(_) => panic!("error frame should not count as an ack"),
        Err(ProbeError::Mismatch { got, .. }) => {
            assert!(got.contains("subscriptions disabled"), "{got}")
        }
        Err(other) => panic!("expected a mismatch, got {other}"),
    }
}

#[tokio::test]
async fn idle_hold_survives_a_quiet_connection() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    let held = conn
        .hold_idle(Duration::from_millis(300), Duration::from_millis(100))
        .await
        .unwrap();

    assert!(held >= Duration::from_millis(300));
    conn.close().await;
}

#[tokio::test]
async fn idle_hold_reports_a_server_drop() {
    let script = ChannelScript {
        drop_after: Some(DropScript {
            after: Duration::from_millis(100),
            close: Some((1001, "going away".to_string())),
        }),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    match conn
        .hold_idle(Duration::from_secs(1), Duration::from_millis(100))
        .await
    {
        Ok(held) => panic!("hold should have been cut short, held {held:?}"),
        Err(ProbeError::Closed(info)) => {
            assert_eq!(info.code, 1001);
            assert!(info.reason.contains("going away"));
        }
        Err(other) => panic!("expected an early close, got {other}"),
    }
}

#[tokio::test]
async fn idle_hold_reports_a_vanished_peer() {
    let script = ChannelScript {
        drop_after: Some(DropScript {
            after: Duration::from_millis(100),
            close: None,
        }),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();

    match conn
        .hold_idle(Duration::from_secs(1), Duration::from_millis(100))
        .await
    {
        Ok(held) => panic!("hold should have been cut short, held {held:?}"),
        Err(ProbeError::Transport(_)) | Err(ProbeError::Dropped) => {}
        Err(other) => panic!("expected a dropped connection, got {other}"),
    }
}

#[tokio::test]
async fn order_push_is_held_until_the_id_is_known() {
    let script = ChannelScript {
        notification: Some(NotificationScript::complete(
            Duration::from_millis(50),
            321,
            7,
        )),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();
    conn.subscribe(7, SHORT).await.unwrap();

    // The push lands well before the id arrives
    let (id_tx, id_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = id_tx.send(321);
    });

    let push = conn
        .await_order_push(7, id_rx, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(push.matches_order(321));
    assert!(push.is_for_business(7));
    conn.close().await;
}

#[tokio::test]
async fn defective_push_fails_naming_the_missing_fields() {
    let script = ChannelScript {
        notification: Some(NotificationScript {
            delay: Duration::from_millis(50),
            payload: serde_json::json!({"type": "order_notification", "order_id": 5}),
        }),
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let mut conn = ProbeConnection::connect(&business_url(&channel), Role::Business, Some(7), CONNECT)
        .await
        .unwrap();
    conn.subscribe(7, SHORT).await.unwrap();

    let (_id_tx, id_rx) = tokio::sync::oneshot::channel();
    match conn.await_order_push(7, id_rx, Duration::from_secs(2)).await {
        Ok(_) => panic!("defective push should fail the wait"),
        Err(ProbeError::Mismatch { got, .. }) => {
            assert!(got.contains("business_id"), "{got}");
            assert!(got.contains("customer_name"), "{got}");
            assert!(got.contains("total"), "{got}");
        }
        Err(other) => panic!("expected a mismatch, got {other}"),
    }
}

#[tokio::test]
async fn missing_business_param_draws_a_policy_close() {
    let channel = MockChannel::start(ChannelScript::cooperative()).await;
    let url = format!("{}?role=business", channel.url());

    match ProbeConnection::probe_rejection(&url, CONNECT).await.unwrap() {
        RejectionOutcome::ClosedWith(close) => {
            assert!(close.is_policy_violation());
            assert_eq!(close.code, 1008);
            assert!(close.reason.contains("business_id"));
        }
        other => panic!("expected a policy close, got {other}"),
    }
}

#[tokio::test]
async fn refused_upgrade_is_a_rejection_outcome() {
    let script = ChannelScript {
        handshake: HandshakeMode::Reject { status: 403 },
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let url = format!("{}?role=business", channel.url());

    match ProbeConnection::probe_rejection(&url, CONNECT).await.unwrap() {
        RejectionOutcome::HandshakeRefused { status } => assert_eq!(status, 403),
        other => panic!("expected a refused upgrade, got {other}"),
    }
}

#[tokio::test]
async fn lax_server_is_reported_as_tolerating() {
    let script = ChannelScript {
        enforce_business_param: false,
        ..Default::default()
    };
    let channel = MockChannel::start(script).await;
    let url = format!("{}?role=business", channel.url());

    match ProbeConnection::probe_rejection(&url, SHORT).await.unwrap() {
        RejectionOutcome::Tolerated => {}
        other => panic!("expected tolerance, got {other}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_connect_failure() {
    let port = find_available_port().await;
    let url = format!("ws://127.0.0.1:{port}/ws/orders?role=business&business_id=1");

    match ProbeConnection::connect(&url, Role::Business, Some(1), CONNECT).await {
        Ok(_) => panic!("nothing is listening on {port}"),
        Err(ProbeError::ConnectFailed { url: failed, .. }) => {
            assert!(failed.contains(&port.to_string()))
        }
        Err(other) => panic!("expected a connect failure, got {other}"),
    }
}
