//! Order repository for database operations.
//!
//! Order headers and lines are written in a single transaction; status changes
//! are compare-and-set updates keyed on the current status, so concurrent
//! webhook deliveries for the same order cannot interleave.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use stitchline_core::{Email, OrderId, OrderLineId, OrderStatus, ProductId, VariantLabel};

use super::{OrderStore, RepositoryError};
use crate::models::{CustomerDetails, NewOrder, Order, OrderLine};

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    first_name: String,
    last_name: String,
    email: Email,
    address: String,
    postal_code: String,
    city: String,
    paid: bool,
    status: OrderStatus,
    gateway_reference_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Order {
        Order {
            id: self.id,
            customer: CustomerDetails {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                address: self.address,
                postal_code: self.postal_code,
                city: self.city,
            },
            paid: self.paid,
            status: self.status,
            gateway_reference_id: self.gateway_reference_id,
            created_at: self.created_at,
            lines,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: OrderLineId,
    product_id: ProductId,
    size: String,
    unit_price: Decimal,
    quantity: i32,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = RepositoryError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let size = VariantLabel::parse(&row.size).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid size on order line {}: {e}", row.id))
        })?;
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative quantity on order line {}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            size,
            unit_price: row.unit_price,
            quantity,
        })
    }
}

const ORDER_COLUMNS: &str = "id, first_name, last_name, email, address, postal_code, city, \
     paid, status, gateway_reference_id, created_at";

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(lines = order.lines.len()))]
    async fn create_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.orders
                (first_name, last_name, email, address, postal_code, city)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.customer.first_name)
        .bind(&order.customer.last_name)
        .bind(&order.customer.email)
        .bind(&order.customer.address)
        .bind(&order.customer.postal_code)
        .bind(&order.customer.city)
        .fetch_one(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| RepositoryError::Conflict("line quantity out of range".to_owned()))?;

            let row = sqlx::query_as::<_, OrderLineRow>(
                r"
                INSERT INTO storefront.order_lines
                    (order_id, product_id, size, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, product_id, size, unit_price, quantity
                ",
            )
            .bind(header.id)
            .bind(line.product_id)
            .bind(line.size.as_str())
            .bind(line.unit_price)
            .bind(quantity)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict(format!(
                        "product {} does not exist",
                        line.product_id
                    ));
                }
                RepositoryError::Database(e)
            })?;

            lines.push(OrderLine::try_from(row)?);
        }

        // Dropping `tx` on any early return above rolls the whole order back.
        tx.commit().await?;

        Ok(header.into_order(lines))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let header = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, OrderLineRow>(
            r"
            SELECT id, product_id, size, unit_price, quantity
            FROM storefront.order_lines
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(OrderLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(header.into_order(lines)))
    }

    #[instrument(skip(self))]
    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        gateway_reference_id: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $3,
                paid = paid OR $4,
                gateway_reference_id = COALESCE($5, gateway_reference_id),
                updated_at = now()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(to == OrderStatus::Paid)
        .bind(gateway_reference_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
