//! In-process [`Catalog`] and [`OrderStore`] implementations.
//!
//! Used by unit and integration tests so handlers and services can run
//! without a database. The order store honours the same contract as
//! [`PgOrderStore`](super::PgOrderStore): whole-order atomic creation and
//! compare-and-set status transitions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use stitchline_core::{OrderId, OrderLineId, OrderStatus, ProductId};

use super::{Catalog, OrderStore, RepositoryError};
use crate::models::{NewOrder, Order, OrderLine, Product};

/// Catalog backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl MemoryCatalog {
    /// Create a catalog holding `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products.into_iter().map(|p| (p.id, p)).collect();
        Self {
            products: Arc::new(RwLock::new(products)),
        }
    }

    /// Add or replace a product (e.g. to simulate a price change).
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    /// Drop a product from the catalog.
    pub async fn remove(&self, id: ProductId) {
        self.products.write().await.remove(&id);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn get_many(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

#[derive(Debug, Default)]
struct Orders {
    by_id: BTreeMap<OrderId, Order>,
    next_order_id: i32,
    next_line_id: i32,
}

/// Order store backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<Mutex<Orders>>,
    fail_after_lines: Option<usize>,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose line writes fail once `lines` lines of an order have
    /// been written. The partially written order is discarded, as a rolled
    /// back transaction would be.
    #[must_use]
    pub fn failing_after(lines: usize) -> Self {
        Self {
            fail_after_lines: Some(lines),
            ..Self::default()
        }
    }

    /// Number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.orders.lock().await.by_id.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.lock().await;

        // Work on copies of the counters; they are only published on commit.
        let mut next_line_id = orders.next_line_id;
        let mut lines = Vec::with_capacity(order.lines.len());
        for (written, line) in order.lines.iter().enumerate() {
            if self.fail_after_lines.is_some_and(|limit| written >= limit) {
                return Err(RepositoryError::Unavailable(format!(
                    "line write {} failed",
                    written + 1
                )));
            }
            next_line_id += 1;
            lines.push(OrderLine {
                id: OrderLineId::new(next_line_id),
                product_id: line.product_id,
                size: line.size.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
            });
        }

        let id = OrderId::new(orders.next_order_id + 1);
        let created = Order {
            id,
            customer: order.customer.clone(),
            paid: false,
            status: OrderStatus::Pending,
            gateway_reference_id: None,
            created_at: Utc::now(),
            lines,
        };

        orders.next_order_id += 1;
        orders.next_line_id = next_line_id;
        orders.by_id.insert(id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.lock().await.by_id.get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        gateway_reference_id: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.by_id.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != from {
            return Ok(false);
        }

        order.status = to;
        if to == OrderStatus::Paid {
            order.paid = true;
        }
        if let Some(reference) = gateway_reference_id {
            order.gateway_reference_id = Some(reference.to_owned());
        }
        Ok(true)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
