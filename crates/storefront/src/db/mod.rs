//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `stitchline`
//!
//! ## Tables (schema `storefront`)
//!
//! - `product` - Catalog products (read-only here; owned by the catalog service)
//! - `orders` - Order headers with payment status
//! - `order_lines` - Immutable price-at-purchase lines
//!
//! Sessions (including the cart) live in `tower_sessions.session`.
//!
//! # Collaborator seams
//!
//! Route handlers and services talk to storage through the [`Catalog`] and
//! [`OrderStore`] traits. `PostgreSQL` implementations live in [`catalog`] and
//! [`orders`]; [`memory`] provides in-process implementations for tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p stitchline-cli -- migrate
//! ```

pub mod catalog;
pub mod memory;
pub mod orders;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use stitchline_core::{OrderId, OrderStatus, ProductId};

use crate::models::{NewOrder, Order, Product};

pub use catalog::PgCatalog;
pub use memory::{MemoryCatalog, MemoryOrderStore};
pub use orders::PgOrderStore;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., unknown product on an order line).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Storage rejected or failed the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Read-only product lookup.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up one product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup itself fails; a missing product
    /// is `Ok(None)`.
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Look up several products at once. Missing ids are simply absent from
    /// the returned map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails.
    async fn get_many(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError>;
}

/// Durable order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order header and all of its lines as one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if anything fails; nothing is persisted then.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Load an order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Move an order from `from` to `to`, only if its status is still `from`.
    ///
    /// Moving to [`OrderStatus::Paid`] also sets `paid` and records
    /// `gateway_reference_id` when given. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the update fails.
    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        gateway_reference_id: Option<&str>,
    ) -> Result<bool, RepositoryError>;

    /// Check that storage is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if it is not.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
