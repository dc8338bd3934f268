//! OrderPulse Client
//!
//! REST-side plumbing for the probe: session bootstrap for each role and
//! order injection through the customer account.

pub mod error;
pub mod orders;
pub mod session;

pub use error::{ClientError, Result};
pub use orders::{
    extract_menu_items, extract_order_id, InjectedOrder, MenuItem, OrderInjector, OrderItem,
    OrderStub,
};
pub use session::{ApiClient, AuthSession, SessionSet};
