//! Cart to order materialization.

use thiserror::Error;
use tracing::{info, instrument};

use crate::cart::Cart;
use crate::db::{OrderStore, RepositoryError};
use crate::models::{CustomerDetails, InvalidCustomer, NewOrder, NewOrderLine, Order};

/// Errors from placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing is staged in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Contact or shipping fields are invalid.
    #[error(transparent)]
    InvalidCustomer(#[from] InvalidCustomer),

    /// The order could not be written. Nothing was persisted.
    #[error("could not save order: {0}")]
    Repository(#[from] RepositoryError),
}

/// Turns a cart into a durable order.
pub struct OrderMaterializer<'a> {
    orders: &'a dyn OrderStore,
}

impl<'a> OrderMaterializer<'a> {
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore) -> Self {
        Self { orders }
    }

    /// Commit the cart's lines as one new pending order.
    ///
    /// The cart is cleared only after the order header and every line have
    /// been committed. On any error the cart is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] when the cart holds no units, or
    /// [`CheckoutError::Repository`] when the write fails.
    #[instrument(skip_all, fields(lines = cart.len()))]
    pub async fn place_order(
        &self,
        cart: &mut Cart,
        customer: CustomerDetails,
    ) -> Result<Order, CheckoutError> {
        if cart.total_quantity() == 0 {
            return Err(CheckoutError::EmptyCart);
        }

        let new_order = NewOrder {
            customer,
            lines: cart
                .lines()
                .map(|line| NewOrderLine {
                    product_id: line.product_id,
                    size: line.variant_label.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                })
                .collect(),
        };

        let order = self.orders.create_order(&new_order).await?;
        cart.clear();

        info!(
            order_id = %order.id,
            total = %order.total_cost(),
            lines = order.lines.len(),
            "Order created"
        );
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use stitchline_core::{Email, OrderStatus, ProductId};

    use super::*;
    use crate::cart::AddMode;
    use crate::db::MemoryOrderStore;

    fn customer() -> CustomerDetails {
        CustomerDetails {
            first_name: "Grace".to_owned(),
            last_name: "Hopper".to_owned(),
            email: Email::parse("grace@example.com").unwrap(),
            address: "1 Harbor Rd".to_owned(),
            postal_code: "02139".to_owned(),
            city: "Arlington".to_owned(),
        }
    }

    fn two_line_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "M", 2, dec!(19.99), AddMode::Merge)
            .unwrap();
        cart.add(ProductId::new(2), "L", 1, dec!(45.50), AddMode::Merge)
            .unwrap();
        cart
    }

    #[tokio::test]
    async fn test_two_lines_become_one_order() {
        let store = MemoryOrderStore::new();
        let mut cart = two_line_cart();
        let expected_total = cart.total_price();

        let order = OrderMaterializer::new(&store)
            .place_order(&mut cart, customer())
            .await
            .unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_cost(), expected_total);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.paid);
        assert_eq!(order.lines[0].size.as_str(), "M");
        assert!(cart.is_empty());
        assert!(cart.is_dirty());
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let store = MemoryOrderStore::new();
        let mut cart = Cart::new();

        let result = OrderMaterializer::new(&store)
            .place_order(&mut cart, customer())
            .await;

        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_cart_untouched() {
        let store = MemoryOrderStore::failing_after(1);
        let mut cart = two_line_cart();
        let before = cart.clone();

        let result = OrderMaterializer::new(&store)
            .place_order(&mut cart, customer())
            .await;

        assert!(matches!(result, Err(CheckoutError::Repository(_))));
        assert_eq!(cart, before);
        assert_eq!(store.order_count().await, 0);
    }
}
