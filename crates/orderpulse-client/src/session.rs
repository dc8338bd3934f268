//! Session bootstrap against the platform REST API
//!
//! One login per configured role. A role that fails to log in is recorded
//! and skipped rather than aborting the run; the checks that needed it
//! report the recorded cause.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use orderpulse_core::wire::snippet;
use orderpulse_core::{Credentials, ProbeConfig, Role};

use crate::error::{ClientError, Result};

/// Authenticated identity for one role
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub role: Role,
    pub email: String,
    /// Bearer token when the platform issued one; cookie-only logins
    /// leave this empty and ride on the client's cookie jar.
    pub token: Option<String>,
    pub user_id: Option<i64>,
}

/// Thin wrapper over the platform REST API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /auth/login, expecting a 200 with a user object
    pub async fn login(&self, role: Role, credentials: &Credentials) -> Result<AuthSession> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                context: format!("login as {}", role),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let body: LoginResponse =
            response
                .json()
                .await
                .map_err(|e| ClientError::UnusableResponse {
                    context: format!("login as {}", role),
                    reason: e.to_string(),
                })?;

        if let Some(actual) = body.user.as_ref().and_then(|u| u.role.as_deref()) {
            if actual != role.as_str() {
                return Err(ClientError::RoleMismatch {
                    expected: role,
                    actual: actual.to_string(),
                });
            }
        }
        if body.access_token.is_none() {
            debug!("login as {} returned no token, relying on cookie", role);
        }

        Ok(AuthSession {
            role,
            email: credentials.email.clone(),
            token: body.access_token,
            user_id: body.user.as_ref().and_then(|u| u.id),
        })
    }

    /// GET a JSON body, attaching the session's bearer token when present
    pub(crate) async fn get_json(
        &self,
        context: &str,
        path: &str,
        session: Option<&AuthSession>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = session.and_then(|s| s.token.as_deref()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::json_or_status(context, response).await
    }

    /// POST a JSON body, attaching the session's bearer token when present
    pub(crate) async fn post_json(
        &self,
        context: &str,
        path: &str,
        body: &Value,
        session: Option<&AuthSession>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = session.and_then(|s| s.token.as_deref()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::json_or_status(context, response).await
    }

    async fn json_or_status(context: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                context: context.to_string(),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::UnusableResponse {
                context: context.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<LoginUser>,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    role: Option<String>,
}

/// Sessions for every role that could be bootstrapped
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: HashMap<Role, AuthSession>,
    failures: HashMap<Role, String>,
}

impl SessionSet {
    /// Log in every configured role, skipping failures
    pub async fn bootstrap(api: &ApiClient, config: &ProbeConfig) -> Self {
        let mut set = SessionSet::default();
        for role in [Role::Business, Role::Admin, Role::Customer] {
            let credentials = match config.credentials_for(role) {
                Some(credentials) => credentials,
                None => {
                    warn!("no credentials configured for {}, role skipped", role);
                    set.failures
                        .insert(role, ClientError::MissingCredentials(role).to_string());
                    continue;
                }
            };
            match api.login(role, credentials).await {
                Ok(session) => {
                    info!("session established for {} ({})", role, session.email);
                    set.sessions.insert(role, session);
                }
                Err(e) => {
                    warn!("login failed for {}: {}", role, e);
                    set.failures.insert(role, e.to_string());
                }
            }
        }
        set
    }

    pub fn session(&self, role: Role) -> Option<&AuthSession> {
        self.sessions.get(&role)
    }

    /// Session for the role, or the recorded bootstrap failure
    pub fn require(&self, role: Role) -> Result<&AuthSession> {
        match self.sessions.get(&role) {
            Some(session) => Ok(session),
            None => match self.failures.get(&role) {
                Some(cause) => Err(ClientError::Bootstrap {
                    role,
                    cause: cause.clone(),
                }),
                None => Err(ClientError::MissingSession(role)),
            },
        }
    }

    pub fn established(&self) -> usize {
        self.sessions.len()
    }

    pub fn failure(&self, role: Role) -> Option<&str> {
        self.failures.get(&role).map(|s| s.as_str())
    }
}
