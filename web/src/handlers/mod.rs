//! HTTP request handlers.
//!
//! Organized by caller: shoppers (inventory, checkout), the payment provider
//! (webhooks) and operators (admin).

pub mod admin;
pub mod checkout;
pub mod health;
pub mod inventory;
pub mod webhooks;

pub use health::health_check;
