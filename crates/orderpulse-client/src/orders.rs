//! Test-order injection
//!
//! Pulls the public menu for the probed business, builds a minimal order
//! from the first listed item and posts it as the customer. The returned
//! order id is what the notification check waits for on the channel.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::session::{ApiClient, AuthSession};

/// One purchasable item from the public menu
#[derive(Debug, Clone, Deserialize)]
pub struct MenuItem {
    #[serde(alias = "product_id")]
    pub id: i64,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub price: f64,
}

/// Line item as the orders endpoint expects it
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub product_id: i64,
    pub title: String,
    pub price: f64,
    pub quantity: u32,
}

/// Order payload ready to POST
#[derive(Debug, Clone)]
pub struct OrderStub {
    pub business_id: i64,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub run_tag: String,
}

impl OrderStub {
    /// Minimal single-item order from a menu entry
    pub fn from_menu_item(business_id: i64, item: &MenuItem) -> Self {
        Self {
            business_id,
            items: vec![OrderItem {
                product_id: item.id,
                title: item.title.clone(),
                price: item.price,
                quantity: 1,
            }],
            total: item.price,
            run_tag: Uuid::new_v4().to_string(),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "business_id": self.business_id,
            "items": self.items.iter().map(|i| json!({
                "product_id": i.product_id,
                "title": i.title,
                "price": i.price,
                "quantity": i.quantity,
            })).collect::<Vec<_>>(),
            "total_amount": self.total,
            "delivery_address": "1 Probe Lane",
            "delivery_lat": 52.52,
            "delivery_lng": 13.405,
            "payment_method": "cash",
            "notes": format!("stability probe {}", self.run_tag),
        })
    }
}

/// Outcome of a successful injection
#[derive(Debug, Clone)]
pub struct InjectedOrder {
    pub order_id: i64,
    pub total: f64,
    pub run_tag: String,
}

/// Places one real order through the REST API
pub struct OrderInjector<'a> {
    api: &'a ApiClient,
    session: &'a AuthSession,
}

impl<'a> OrderInjector<'a> {
    pub fn new(api: &'a ApiClient, session: &'a AuthSession) -> Self {
        Self { api, session }
    }

    /// Public menu of one business
    pub async fn fetch_menu(&self, business_id: i64) -> Result<Vec<MenuItem>> {
        let menu = self
            .api
            .get_json(
                "fetch menu",
                &format!("/business/public/{}/menu", business_id),
                Some(self.session),
            )
            .await?;
        Ok(extract_menu_items(&menu))
    }

    /// POST the order, return the platform's order id
    pub async fn place_order(&self, stub: &OrderStub) -> Result<i64> {
        let created = self
            .api
            .post_json("create order", "/orders", &stub.to_json(), Some(self.session))
            .await?;
        extract_order_id(&created).ok_or_else(|| ClientError::UnusableResponse {
            context: "create order".to_string(),
            reason: "response carries no order id".to_string(),
        })
    }

    /// Fetch the menu, order the first item, return the platform's order id
    pub async fn inject(&self, business_id: i64) -> Result<InjectedOrder> {
        let items = self.fetch_menu(business_id).await?;
        let first = items
            .first()
            .ok_or_else(|| ClientError::UnusableResponse {
                context: "fetch menu".to_string(),
                reason: format!("business {} lists no items", business_id),
            })?;
        debug!("ordering menu item {} ({})", first.id, first.title);

        let stub = OrderStub::from_menu_item(business_id, first);
        let order_id = self.place_order(&stub).await?;
        info!("test order {} placed for business {}", order_id, business_id);

        Ok(InjectedOrder {
            order_id,
            total: stub.total,
            run_tag: stub.run_tag,
        })
    }
}

/// Menu payloads vary between deployments; accept a bare array or the
/// usual wrapper keys and drop entries that do not parse.
pub fn extract_menu_items(body: &Value) -> Vec<MenuItem> {
    let list = if body.is_array() {
        Some(body)
    } else {
        ["products", "menu", "items"]
            .iter()
            .find_map(|key| body.get(key).filter(|v| v.is_array()))
    };
    match list {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Order id from the creation response, wherever the platform put it
pub fn extract_order_id(body: &Value) -> Option<i64> {
    let candidate = body
        .get("order_id")
        .or_else(|| body.get("id"))
        .or_else(|| body.get("order").and_then(|o| o.get("id")))?;
    match candidate {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
