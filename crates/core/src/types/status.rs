//! Order status and the payment gateway statuses that drive it.
//!
//! The order state machine is deliberately small:
//!
//! ```text
//! pending ──(confirmed | finished)──▶ paid       (terminal)
//!    │
//!    └─────(failed | expired)───────▶ cancelled  (terminal)
//! ```
//!
//! Every other gateway status is an intermediate processor state that leaves
//! the order untouched. [`OrderStatus::apply`] is a total function of
//! `(current status, gateway status)`, which is what makes duplicate and
//! out-of-order webhook deliveries harmless.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout, awaiting payment.
    #[default]
    Pending,
    /// Payment confirmed by the gateway.
    Paid,
    /// Payment failed or the invoice expired.
    Cancelled,
}

impl OrderStatus {
    /// Whether no further gateway callback may change this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// The status an order moves to when `payment` is reported, if any.
    ///
    /// Returns `None` when the order must stay as it is: it is already
    /// terminal, or the gateway status is intermediate.
    #[must_use]
    pub const fn apply(self, payment: PaymentStatus) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        match payment {
            PaymentStatus::Confirmed | PaymentStatus::Finished => Some(Self::Paid),
            PaymentStatus::Failed | PaymentStatus::Expired => Some(Self::Cancelled),
            PaymentStatus::Waiting
            | PaymentStatus::Confirming
            | PaymentStatus::Sending
            | PaymentStatus::PartiallyPaid
            | PaymentStatus::Refunded
            | PaymentStatus::Unrecognized => None,
        }
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status reported by the gateway in an IPN callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    /// Any status this system does not know about.
    #[serde(other)]
    Unrecognized,
}

impl PaymentStatus {
    /// Parse a gateway status string; unknown values map to `Unrecognized`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "waiting" => Self::Waiting,
            "confirming" => Self::Confirming,
            "confirmed" => Self::Confirmed,
            "sending" => Self::Sending,
            "partially_paid" => Self::PartiallyPaid,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            "expired" => Self::Expired,
            _ => Self::Unrecognized,
        }
    }
}
