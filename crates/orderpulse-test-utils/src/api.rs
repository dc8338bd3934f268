//! Scriptable platform REST stub
//!
//! Serves the three endpoints the probe touches: login, public menu, and
//! order creation. Tests pick an [`ApiScript`] per scenario; submitted
//! orders are captured for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use orderpulse_core::{Credentials, Role};

/// How one email is answered at POST /auth/login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// 200 with a user object and, usually, an access token
    Ok {
        token: Option<String>,
        role: Role,
        user_id: i64,
    },
    /// Any non-2xx with a body
    Deny { status: u16, body: String },
}

impl LoginOutcome {
    pub fn ok(token: &str, role: Role, user_id: i64) -> Self {
        LoginOutcome::Ok {
            token: Some(token.to_string()),
            role,
            user_id,
        }
    }

    /// 200 without an access token; some deployments run on cookie auth
    pub fn ok_without_token(role: Role, user_id: i64) -> Self {
        LoginOutcome::Ok {
            token: None,
            role,
            user_id,
        }
    }
}

/// How GET /business/public/:id/menu is answered
#[derive(Debug, Clone)]
pub enum MenuMode {
    Items(Vec<Value>),
    Empty,
    NotFound,
}

impl MenuMode {
    /// Two plain items with numeric ids, titles, and prices
    pub fn standard() -> Self {
        MenuMode::Items(vec![
            json!({"id": 11, "title": "Margherita", "price": 9.9, "category": "pizza"}),
            json!({"id": 12, "title": "Lemonade", "price": 3.5, "category": "drinks"}),
        ])
    }
}

/// How POST /orders is answered
#[derive(Debug, Clone)]
pub enum OrderMode {
    /// 201 with an order id
    Accept { order_id: i64 },
    /// 201 but no id anywhere in the body
    AcceptWithoutId,
    /// Any non-2xx with a body
    Deny { status: u16, body: String },
}

/// Full behavior description for one mock API
#[derive(Debug, Clone)]
pub struct ApiScript {
    pub logins: HashMap<String, LoginOutcome>,
    pub menu: MenuMode,
    pub orders: OrderMode,
}

impl Default for ApiScript {
    fn default() -> Self {
        Self {
            logins: HashMap::new(),
            menu: MenuMode::standard(),
            orders: OrderMode::Accept { order_id: 1001 },
        }
    }
}

impl ApiScript {
    /// Working logins for all three roles, a stocked menu, accepted orders
    pub fn cooperative() -> Self {
        let mut logins = HashMap::new();
        logins.insert(
            "owner@probe.test".to_string(),
            LoginOutcome::ok("tok-business", Role::Business, 11),
        );
        logins.insert(
            "admin@probe.test".to_string(),
            LoginOutcome::ok("tok-admin", Role::Admin, 12),
        );
        logins.insert(
            "customer@probe.test".to_string(),
            LoginOutcome::ok("tok-customer", Role::Customer, 13),
        );
        Self {
            logins,
            ..Default::default()
        }
    }

    pub fn with_login(mut self, email: &str, outcome: LoginOutcome) -> Self {
        self.logins.insert(email.to_string(), outcome);
        self
    }
}

/// Probe credentials matching [`ApiScript::cooperative`]
pub fn cooperative_credentials() -> HashMap<Role, Credentials> {
    let mut credentials = HashMap::new();
    credentials.insert(
        Role::Business,
        Credentials {
            email: "owner@probe.test".to_string(),
            password: "probe-pass".to_string(),
        },
    );
    credentials.insert(
        Role::Admin,
        Credentials {
            email: "admin@probe.test".to_string(),
            password: "probe-pass".to_string(),
        },
    );
    credentials.insert(
        Role::Customer,
        Credentials {
            email: "customer@probe.test".to_string(),
            password: "probe-pass".to_string(),
        },
    );
    credentials
}

/// One captured order submission
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub body: Value,
    pub authorization: Option<String>,
}

struct ApiState {
    script: ApiScript,
    orders: Mutex<Vec<OrderRecord>>,
    login_attempts: AtomicU32,
}

/// A scripted platform REST stub that cleans up on drop
pub struct MockApi {
    port: u16,
    handle: Option<JoinHandle<()>>,
    state: Arc<ApiState>,
}

impl MockApi {
    /// Bind a local port and start serving the script
    pub async fn start(script: ApiScript) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(ApiState {
            script,
            orders: Mutex::new(Vec::new()),
            login_attempts: AtomicU32::new(0),
        });

        let router = Router::new()
            .route("/auth/login", post(handle_login))
            .route("/business/public/:business_id/menu", get(handle_menu))
            .route("/orders", post(handle_create_order))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            port,
            handle: Some(handle),
            state,
        }
    }

    /// REST base, ready to drop into `ProbeConfig::base_url`
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Orders captured at POST /orders, in arrival order
    pub fn orders(&self) -> Vec<OrderRecord> {
        self.state.orders.lock().clone()
    }

    pub fn login_attempts(&self) -> u32 {
        self.state.login_attempts.load(Ordering::SeqCst)
    }

    /// Stop the server explicitly (also happens on drop)
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    #[allow(dead_code)]
    password: String,
}

async fn handle_login(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.login_attempts.fetch_add(1, Ordering::SeqCst);

    match state.script.logins.get(&request.email) {
        Some(LoginOutcome::Ok {
            token,
            role,
            user_id,
        }) => {
            let mut body = json!({
                "user": {"id": user_id, "role": role.as_str()},
                "message": "login successful",
            });
            if let Some(token) = token {
                body["access_token"] = Value::from(token.clone());
            }
            Ok(Json(body))
        }
        Some(LoginOutcome::Deny { status, body }) => Err((
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.clone(),
        )),
        None => Err((StatusCode::UNAUTHORIZED, "invalid credentials".to_string())),
    }
}

async fn handle_menu(
    State(state): State<Arc<ApiState>>,
    Path(business_id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match &state.script.menu {
        MenuMode::Items(items) => Ok(Json(json!({"products": items}))),
        MenuMode::Empty => Ok(Json(json!({"products": []}))),
        MenuMode::NotFound => Err((
            StatusCode::NOT_FOUND,
            format!("business {business_id} not found"),
        )),
    }
}

async fn handle_create_order(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(order): Json<Value>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.orders.lock().push(OrderRecord {
        body: order,
        authorization,
    });

    match &state.script.orders {
        OrderMode::Accept { order_id } => Ok((
            StatusCode::CREATED,
            Json(json!({"order_id": order_id, "status": "pending"})),
        )),
        OrderMode::AcceptWithoutId => {
            Ok((StatusCode::CREATED, Json(json!({"status": "pending"}))))
        }
        OrderMode::Deny { status, body } => Err((
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.clone(),
        )),
    }
}
