//! Applies verified payment callbacks to orders.

use stitchline_core::{OrderId, OrderStatus, PaymentStatus};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::webhook::{PayloadError, PayloadValue, WebhookPayload};
use crate::db::{OrderStore, RepositoryError};

/// Compare-and-set attempts before giving up on a contended order.
const MAX_ATTEMPTS: usize = 3;

/// Errors from reconciling a callback.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The callback names an order this store never created.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The fields of a verified callback this service interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    /// Gateway payment id, if sent.
    pub payment_id: Option<String>,
}

impl PaymentCallback {
    /// Extract the callback fields from a payload.
    ///
    /// `order_id` may arrive as a string or a number.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if `order_id` or `payment_status` is missing
    /// or unusable.
    pub fn from_payload(payload: &WebhookPayload) -> Result<Self, PayloadError> {
        let order_id = payload
            .get_text("order_id")
            .ok_or(PayloadError::MissingField("order_id"))?
            .trim()
            .parse::<OrderId>()
            .map_err(|e| PayloadError::InvalidField {
                field: "order_id",
                reason: e.to_string(),
            })?;

        let status = match payload.get("payment_status") {
            Some(PayloadValue::String(status)) => PaymentStatus::parse(status),
            Some(_) => {
                return Err(PayloadError::InvalidField {
                    field: "payment_status",
                    reason: "expected a string".to_owned(),
                });
            }
            None => return Err(PayloadError::MissingField("payment_status")),
        };

        Ok(Self {
            order_id,
            status,
            payment_id: payload.get_text("payment_id").map(str::to_owned),
        })
    }
}

/// What a callback did to its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Transitioned { from: OrderStatus, to: OrderStatus },
    Unchanged { status: OrderStatus },
}

/// Drives the order state machine from payment callbacks.
pub struct OrderReconciler<'a> {
    orders: &'a dyn OrderStore,
}

impl<'a> OrderReconciler<'a> {
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore) -> Self {
        Self { orders }
    }

    /// Apply a verified callback.
    ///
    /// The new status is a function of the current status and the callback
    /// status only, and it is written with a conditional update on the
    /// current status. Redelivered or stale callbacks therefore leave the
    /// order as it is.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::OrderNotFound`] for an unknown order, or
    /// [`ReconcileError::Repository`] if storage fails.
    #[instrument(skip(self, callback), fields(order_id = %callback.order_id, payment_status = ?callback.status))]
    pub async fn apply(
        &self,
        callback: &PaymentCallback,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        for _ in 0..MAX_ATTEMPTS {
            let order = self
                .orders
                .get_order(callback.order_id)
                .await?
                .ok_or(ReconcileError::OrderNotFound(callback.order_id))?;

            let Some(target) = order.status.apply(callback.status) else {
                info!(status = %order.status, "Callback leaves order unchanged");
                return Ok(ReconcileOutcome::Unchanged {
                    status: order.status,
                });
            };

            let reference = match target {
                OrderStatus::Paid => callback.payment_id.as_deref(),
                _ => None,
            };
            if self
                .orders
                .transition_status(order.id, order.status, target, reference)
                .await?
            {
                info!(from = %order.status, to = %target, "Order status updated");
                return Ok(ReconcileOutcome::Transitioned {
                    from: order.status,
                    to: target,
                });
            }
            // Another delivery moved the order first; re-read and re-decide.
        }

        warn!("Order status kept changing underneath the callback");
        Err(ReconcileError::Repository(RepositoryError::Conflict(
            format!("order {} is contended", callback.order_id),
        )))
    }
}
