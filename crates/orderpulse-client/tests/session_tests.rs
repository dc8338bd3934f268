//! Session bootstrap against a scripted platform API
//!
//! Each test starts a [`MockApi`] with one scenario script and drives the
//! real client against it over loopback.

use std::time::Duration;

use orderpulse_client::{ApiClient, ClientError, SessionSet};
use orderpulse_core::{Credentials, ProbeConfig, Role};
use orderpulse_test_utils::{
    cooperative_credentials, find_available_port, ApiScript, LoginOutcome, MockApi,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

fn config_for(api: &MockApi) -> ProbeConfig {
    ProbeConfig {
        base_url: api.base_url(),
        credentials: cooperative_credentials(),
        ..Default::default()
    }
}

fn credentials(email: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: "probe-pass".to_string(),
    }
}

#[tokio::test]
async fn bootstraps_all_three_roles() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    let sessions = SessionSet::bootstrap(&client, &config_for(&api)).await;

    assert_eq!(sessions.established(), 3);
    assert_eq!(api.login_attempts(), 3);
    for role in [Role::Business, Role::Admin, Role::Customer] {
        let session = sessions.require(role).unwrap();
        assert_eq!(session.role, role);
        assert!(session.token.is_some());
    }
}

#[tokio::test]
async fn failed_role_is_skipped_not_fatal() {
    let script = ApiScript::cooperative().with_login(
        "admin@probe.test",
        LoginOutcome::Deny {
            status: 403,
            body: "admin access disabled".to_string(),
        },
    );
    let api = MockApi::start(script).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    let sessions = SessionSet::bootstrap(&client, &config_for(&api)).await;

    assert_eq!(sessions.established(), 2);
    assert!(sessions.session(Role::Business).is_some());
    assert!(sessions.session(Role::Customer).is_some());
    match sessions.require(Role::Admin).unwrap_err() {
        ClientError::Bootstrap { role, cause } => {
            assert_eq!(role, Role::Admin);
            assert!(cause.contains("403"), "cause should name the status: {cause}");
        }
        other => panic!("expected a bootstrap failure, got {other}"),
    }
}

#[tokio::test]
async fn missing_credentials_skip_the_login_entirely() {
    let api = MockApi::start(ApiScript::cooperative()).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();
    let mut config = config_for(&api);
    config.credentials.remove(&Role::Admin);

    let sessions = SessionSet::bootstrap(&client, &config).await;

    assert_eq!(sessions.established(), 2);
    assert_eq!(api.login_attempts(), 2);
    let recorded = sessions.failure(Role::Admin).unwrap();
    assert!(recorded.contains("no credentials"));
}

#[tokio::test]
async fn login_without_token_still_succeeds() {
    let script = ApiScript::cooperative().with_login(
        "owner@probe.test",
        LoginOutcome::ok_without_token(Role::Business, 11),
    );
    let api = MockApi::start(script).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    let session = client
        .login(Role::Business, &credentials("owner@probe.test"))
        .await
        .unwrap();

    assert!(session.token.is_none());
    assert_eq!(session.user_id, Some(11));
}

#[tokio::test]
async fn role_echo_mismatch_is_an_error() {
    let script = ApiScript::cooperative().with_login(
        "owner@probe.test",
        LoginOutcome::ok("tok-other", Role::Customer, 44),
    );
    let api = MockApi::start(script).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    match client
        .login(Role::Business, &credentials("owner@probe.test"))
        .await
        .unwrap_err()
    {
        ClientError::RoleMismatch { expected, actual } => {
            assert_eq!(expected, Role::Business);
            assert_eq!(actual, "customer");
        }
        other => panic!("expected a role mismatch, got {other}"),
    }
}

#[tokio::test]
async fn denied_login_carries_status_and_body() {
    let script = ApiScript::default().with_login(
        "owner@probe.test",
        LoginOutcome::Deny {
            status: 503,
            body: "platform maintenance window".to_string(),
        },
    );
    let api = MockApi::start(script).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    match client
        .login(Role::Business, &credentials("owner@probe.test"))
        .await
        .unwrap_err()
    {
        ClientError::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert!(body.contains("maintenance"));
        }
        other => panic!("expected a status error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_email_is_rejected_with_401() {
    let api = MockApi::start(ApiScript::default()).await;
    let client = ApiClient::new(&api.base_url(), HTTP_TIMEOUT).unwrap();

    match client
        .login(Role::Business, &credentials("nobody@probe.test"))
        .await
        .unwrap_err()
    {
        ClientError::Status { status, .. } => assert_eq!(status, 401),
        other => panic!("expected a status error, got {other}"),
    }
}

#[tokio::test]
async fn unreachable_api_is_a_request_error() {
    let port = find_available_port().await;
    let client = ApiClient::new(
        &format!("http://127.0.0.1:{port}"),
        Duration::from_millis(500),
    )
    .unwrap();

    let err = client
        .login(Role::Business, &credentials("owner@probe.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Request(_)), "got {err}");
}
