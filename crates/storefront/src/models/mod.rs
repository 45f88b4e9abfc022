//! Domain models for the storefront.
//!
//! Orders and their lines are owned by this service. Products belong to the
//! catalog, which is an external collaborator: the storefront only reads a
//! product's price and availability.

pub mod session;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stitchline_core::{Email, OrderId, OrderLineId, OrderStatus, ProductId, VariantLabel};

pub use session::keys as session_keys;

/// A catalog product as seen by the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    /// Current catalog price; the cart snapshots it on first add.
    pub price: Decimal,
    pub in_stock: bool,
}

/// Error returned when checkout contact/shipping fields are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct InvalidCustomer {
    pub field: &'static str,
    pub reason: String,
}

/// Contact and shipping details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub address: String,
    pub postal_code: String,
    pub city: String,
}

/// Raw checkout form, as submitted by the browser.
///
/// Absent fields deserialize as empty so [`CustomerForm::validate`] reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomerForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
}

impl CustomerForm {
    /// Validate the form into [`CustomerDetails`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCustomer`] naming the first invalid field.
    pub fn validate(self) -> Result<CustomerDetails, InvalidCustomer> {
        let email = Email::parse(&self.email).map_err(|e| InvalidCustomer {
            field: "email",
            reason: e.to_string(),
        })?;

        Ok(CustomerDetails {
            first_name: required("first_name", &self.first_name, 50)?,
            last_name: required("last_name", &self.last_name, 50)?,
            email,
            address: required("address", &self.address, 250)?,
            postal_code: required("postal_code", &self.postal_code, 20)?,
            city: required("city", &self.city, 100)?,
        })
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, InvalidCustomer> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InvalidCustomer {
            field,
            reason: "is required".to_owned(),
        });
    }
    if value.chars().count() > max {
        return Err(InvalidCustomer {
            field,
            reason: format!("must be at most {max} characters"),
        });
    }
    Ok(value.to_owned())
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: CustomerDetails,
    pub paid: bool,
    pub status: OrderStatus,
    /// The gateway's payment id, recorded when payment is confirmed.
    pub gateway_reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Total cost, always derived from the immutable lines.
    #[must_use]
    pub fn total_cost(&self) -> Decimal {
        self.lines.iter().map(OrderLine::total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// An immutable order line with its price-at-purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub size: VariantLabel,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderLine {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// An order about to be committed: header plus every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer: CustomerDetails,
    pub lines: Vec<NewOrderLine>,
}

/// A line of a [`NewOrder`], copied from a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub size: VariantLabel,
    pub unit_price: Decimal,
    pub quantity: u32,
}
