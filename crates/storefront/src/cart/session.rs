//! Session persistence for [`Cart`].

use tower_sessions::Session;
use tracing::warn;

use super::{Cart, CartError, CartRecord};

/// A [`Cart`] bound to the session it was loaded from.
///
/// Concurrent requests from the same session are last-writer-wins on the
/// whole record.
#[derive(Debug)]
pub struct SessionCart {
    session: Session,
    key: String,
    cart: Cart,
}

impl SessionCart {
    /// Load the cart stored under `key`.
    ///
    /// A missing, unparsable or other-version record yields an empty cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if the session store cannot be read.
    pub async fn load(session: Session, key: impl Into<String>) -> Result<Self, CartError> {
        let key = key.into();
        let cart = match session.get_value(&key).await? {
            None => Cart::new(),
            Some(value) => serde_json::from_value::<CartRecord>(value)
                .map_err(|e| CartError::UnsupportedRecord(e.to_string()))
                .and_then(Cart::from_record)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Discarding unusable cart record");
                    Cart::new()
                }),
        };

        Ok(Self { session, key, cart })
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    pub const fn cart_mut(&mut self) -> &mut Cart {
        &mut self.cart
    }

    /// Persist the cart if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if the write fails.
    pub async fn save(&mut self) -> Result<(), CartError> {
        if !self.cart.is_dirty() {
            return Ok(());
        }
        self.session
            .insert(&self.key, self.cart.to_record())
            .await?;
        self.cart.mark_clean();
        Ok(())
    }

    /// Empty the cart and persist the empty state.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if the write fails.
    pub async fn clear(&mut self) -> Result<(), CartError> {
        self.cart.clear();
        self.save().await
    }
}
