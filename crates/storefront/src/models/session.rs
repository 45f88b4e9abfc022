//! Session keys used by the storefront.
//!
//! The cart itself lives under a configurable key (see
//! [`crate::config::CartConfig`]); the keys here are fixed.

/// Session keys for checkout state.
pub mod keys {
    /// Key for the order awaiting payment, set after a successful checkout.
    pub const PENDING_ORDER_ID: &str = "order_id";
}
