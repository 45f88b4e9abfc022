//! Per-session shopping cart.
//!
//! [`Cart`] is a plain, size-bounded map from [`VariantKey`] to [`CartLine`].
//! It knows nothing about HTTP or storage; [`SessionCart`] loads and saves it
//! as a versioned record inside the shopper's session.
//!
//! Each line keeps the unit price seen on the first add. Later adds to the
//! same line never refresh it from the catalog.

mod session;

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stitchline_core::{KeyError, ProductId, VariantKey, VariantLabel};

use crate::models::Product;

pub use session::SessionCart;

/// Maximum number of distinct lines in one cart.
pub const MAX_LINES: usize = 50;

/// Maximum units of a single variant.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Current persisted record version.
pub const RECORD_VERSION: u32 = 1;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Variant key or label failed validation.
    #[error("malformed key: {0}")]
    MalformedKey(#[from] KeyError),

    /// Quantities must be positive.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// A single line would exceed the unit limit.
    #[error("at most {max} units per item")]
    QuantityLimit { max: u32 },

    /// The cart already holds the maximum number of lines.
    #[error("cart cannot hold more than {max} items")]
    Full { max: usize },

    /// A persisted record could not be used.
    #[error("unusable cart record: {0}")]
    UnsupportedRecord(String),

    /// Session storage failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// How [`Cart::add`] combines a quantity with an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Add to the existing quantity.
    #[default]
    Merge,
    /// Replace the existing quantity.
    Replace,
}

/// A caller's requested quantity change for an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartUpdate {
    Remove,
    SetQuantity(u32),
}

impl CartUpdate {
    /// Interpret a submitted quantity. Anything at or below zero means remove.
    #[must_use]
    pub fn from_requested(quantity: i64) -> Self {
        if quantity <= 0 {
            return Self::Remove;
        }
        Self::SetQuantity(u32::try_from(quantity).unwrap_or(u32::MAX))
    }
}

/// One staged variant with its price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_label: VariantLabel,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartLine {
    /// The line's key.
    #[must_use]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.product_id, self.variant_label.clone())
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A cart line joined against the catalog for display.
#[derive(Debug, Clone, Copy)]
pub struct CartItem<'a> {
    pub line: &'a CartLine,
    /// `None` when the product has left the catalog.
    pub product: Option<&'a Product>,
}

/// Serialized form of a cart inside the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRecord {
    pub version: u32,
    pub lines: Vec<CartLine>,
}

/// A shopper's staged line items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: BTreeMap<VariantKey, CartLine>,
    dirty: bool,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `quantity` units of a variant.
    ///
    /// A new line snapshots `unit_price`; an existing line keeps its own.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] for an invalid label, a zero quantity or a bound
    /// violation. The cart is unchanged on error.
    pub fn add(
        &mut self,
        product_id: ProductId,
        variant_label: &str,
        quantity: u32,
        unit_price: Decimal,
        mode: AddMode,
    ) -> Result<(), CartError> {
        let label = VariantLabel::parse(variant_label)?;
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let key = VariantKey::new(product_id, label);
        let current = self.lines.get(&key).map(|line| line.quantity);
        if current.is_none() && self.lines.len() >= MAX_LINES {
            return Err(CartError::Full { max: MAX_LINES });
        }

        let target = match (mode, current) {
            (AddMode::Merge, Some(existing)) => existing.saturating_add(quantity),
            _ => quantity,
        };
        if target > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityLimit {
                max: MAX_LINE_QUANTITY,
            });
        }

        self.lines
            .entry(key)
            .or_insert_with_key(|key| CartLine {
                product_id,
                variant_label: key.label().clone(),
                quantity: 0,
                unit_price,
            })
            .quantity = target;
        self.dirty = true;
        Ok(())
    }

    /// Apply a caller's update to an existing line.
    ///
    /// Returns whether a line was touched; updating an absent key does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::QuantityLimit`] if the new quantity is too large.
    pub fn update(&mut self, key: &VariantKey, update: CartUpdate) -> Result<bool, CartError> {
        match update {
            CartUpdate::Remove => Ok(self.remove(key)),
            CartUpdate::SetQuantity(quantity) => {
                let Some(line) = self.lines.get(key) else {
                    return Ok(false);
                };
                let (product_id, price) = (line.product_id, line.unit_price);
                self.add(
                    product_id,
                    key.label().as_str(),
                    quantity,
                    price,
                    AddMode::Replace,
                )?;
                Ok(true)
            }
        }
    }

    /// Remove a line. Returns whether it was present.
    pub fn remove(&mut self, key: &VariantKey) -> bool {
        let removed = self.lines.remove(key).is_some();
        self.dirty |= removed;
        removed
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.dirty = true;
    }

    /// Look up one line.
    #[must_use]
    pub fn get(&self, key: &VariantKey) -> Option<&CartLine> {
        self.lines.get(key)
    }

    /// Lines in key order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> + Clone {
        self.lines.values()
    }

    /// Lines joined against `products`, in key order.
    ///
    /// Products missing from the map yield items with `product: None`.
    pub fn items<'a>(
        &'a self,
        products: &'a HashMap<ProductId, Product>,
    ) -> impl Iterator<Item = CartItem<'a>> + Clone {
        self.lines.values().map(|line| CartItem {
            line,
            product: products.get(&line.product_id),
        })
    }

    /// Distinct products referenced by the cart.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<_> = self.lines.values().map(|line| line.product_id).collect();
        ids.dedup();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines.values().map(|line| line.quantity).sum()
    }

    /// Exact sum of `unit_price * quantity` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lines.values().map(CartLine::total).sum()
    }

    /// Whether the cart changed since it was loaded or last saved.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) const fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Snapshot for persistence.
    #[must_use]
    pub fn to_record(&self) -> CartRecord {
        CartRecord {
            version: RECORD_VERSION,
            lines: self.lines.values().cloned().collect(),
        }
    }

    /// Rebuild a cart from a persisted record, re-checking every bound.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnsupportedRecord`] for another version or any
    /// line that would not have been accepted by [`Cart::add`].
    pub fn from_record(record: CartRecord) -> Result<Self, CartError> {
        if record.version != RECORD_VERSION {
            return Err(CartError::UnsupportedRecord(format!(
                "version {}",
                record.version
            )));
        }
        if record.lines.len() > MAX_LINES {
            return Err(CartError::UnsupportedRecord(format!(
                "{} lines",
                record.lines.len()
            )));
        }

        let mut lines = BTreeMap::new();
        for line in record.lines {
            if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
                return Err(CartError::UnsupportedRecord(format!(
                    "quantity {}",
                    line.quantity
                )));
            }
            if lines.insert(line.key(), line).is_some() {
                return Err(CartError::UnsupportedRecord("duplicate line".to_owned()));
            }
        }

        Ok(Self {
            lines,
            dirty: false,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn key(product: i32, label: &str) -> VariantKey {
        VariantKey::new(ProductId::new(product), VariantLabel::parse(label).unwrap())
    }

    fn product(id: i32, price: Decimal) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            price,
            in_stock: true,
        }
    }

    #[test]
    fn test_repeated_adds_sum_and_keep_first_price() {
        let mut cart = Cart::new();
        let id = ProductId::new(7);
        for (quantity, price) in [(1, dec!(10.00)), (2, dec!(12.50)), (4, dec!(8.00))] {
            cart.add(id, "M", quantity, price, AddMode::Merge).unwrap();
        }

        let line = cart.get(&key(7, "M")).unwrap();
        assert_eq!(line.quantity, 7);
        assert_eq!(line.unit_price, dec!(10.00));
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_replace_overrides_quantity() {
        let mut cart = Cart::new();
        let id = ProductId::new(7);
        cart.add(id, "M", 5, dec!(10.00), AddMode::Merge).unwrap();
        cart.add(id, "M", 2, dec!(99.00), AddMode::Replace).unwrap();

        let line = cart.get(&key(7, "M")).unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.unit_price, dec!(10.00));
    }

    #[test]
    fn test_non_positive_update_removes() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "S", 3, dec!(5.00), AddMode::Merge)
            .unwrap();

        assert_eq!(CartUpdate::from_requested(0), CartUpdate::Remove);
        assert_eq!(CartUpdate::from_requested(-4), CartUpdate::Remove);
        assert_eq!(CartUpdate::from_requested(3), CartUpdate::SetQuantity(3));

        assert!(
            cart.update(&key(1, "S"), CartUpdate::from_requested(-1))
                .unwrap()
        );
        assert!(cart.is_empty());
        assert_eq!(cart.lines().count(), 0);
    }

    #[test]
    fn test_update_sets_quantity_on_existing_line_only() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "S", 3, dec!(5.00), AddMode::Merge)
            .unwrap();

        assert!(
            cart.update(&key(1, "S"), CartUpdate::SetQuantity(8))
                .unwrap()
        );
        assert_eq!(cart.get(&key(1, "S")).unwrap().quantity, 8);
        assert!(
            !cart
                .update(&key(2, "S"), CartUpdate::SetQuantity(8))
                .unwrap()
        );
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "S", 1, dec!(5.00), AddMode::Merge)
            .unwrap();
        cart.mark_clean();
        let before = cart.clone();

        assert!(!cart.remove(&key(2, "S")));
        assert_eq!(cart, before);
        assert!(!cart.is_dirty());
    }

    #[test]
    fn test_removed_key_never_iterated() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "S", 1, dec!(5.00), AddMode::Merge)
            .unwrap();
        cart.add(ProductId::new(1), "L", 1, dec!(5.00), AddMode::Merge)
            .unwrap();
        cart.remove(&key(1, "S"));

        let keys: Vec<_> = cart.lines().map(CartLine::key).collect();
        assert_eq!(keys, vec![key(1, "L")]);
    }

    #[test]
    fn test_total_price_is_exact() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "M", 3, dec!(19.99), AddMode::Merge)
            .unwrap();

        assert_eq!(cart.total_price(), dec!(59.97));
        let cents = (cart.total_price() * dec!(100)).normalize();
        assert_eq!(cents, dec!(5997));
    }

    #[test]
    fn test_total_price_across_lines() {
        let mut cart = Cart::new();
        for (product, label) in [(1, "S"), (2, "M"), (3, "L")] {
            cart.add(
                ProductId::new(product),
                label,
                3,
                dec!(19.99),
                AddMode::Merge,
            )
            .unwrap();
        }
        cart.add(ProductId::new(4), "XS", 1, dec!(0.10), AddMode::Merge)
            .unwrap();

        assert_eq!(cart.total_price(), dec!(180.01));
        assert_eq!(cart.total_quantity(), 10);
    }

    #[test]
    fn test_rejects_bad_input_without_change() {
        let mut cart = Cart::new();
        let id = ProductId::new(1);

        assert!(matches!(
            cart.add(id, "M", 0, dec!(1), AddMode::Merge),
            Err(CartError::InvalidQuantity)
        ));
        assert!(matches!(
            cart.add(id, "X-L", 1, dec!(1), AddMode::Merge),
            Err(CartError::MalformedKey(_))
        ));
        cart.add(id, "M", 98, dec!(1), AddMode::Merge).unwrap();
        assert!(matches!(
            cart.add(id, "M", 2, dec!(1), AddMode::Merge),
            Err(CartError::QuantityLimit { .. })
        ));
        assert_eq!(cart.get(&key(1, "M")).unwrap().quantity, 98);
    }

    #[test]
    fn test_line_limit() {
        let mut cart = Cart::new();
        for i in 1..=50 {
            cart.add(ProductId::new(i), "M", 1, dec!(1), AddMode::Merge)
                .unwrap();
        }
        assert!(matches!(
            cart.add(ProductId::new(51), "M", 1, dec!(1), AddMode::Merge),
            Err(CartError::Full { max: 50 })
        ));
        // Existing lines can still grow.
        cart.add(ProductId::new(1), "M", 1, dec!(1), AddMode::Merge)
            .unwrap();
    }

    #[test]
    fn test_items_tolerate_missing_products() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), "M", 1, dec!(5.00), AddMode::Merge)
            .unwrap();
        cart.add(ProductId::new(2), "M", 1, dec!(5.00), AddMode::Merge)
            .unwrap();
        let products = HashMap::from([(ProductId::new(1), product(1, dec!(6.00)))]);

        let items = cart.items(&products);
        let resolved: Vec<_> = items.clone().map(|item| item.product.is_some()).collect();
        assert_eq!(resolved, vec![true, false]);
        // Restartable: a second pass sees the same lines.
        assert_eq!(items.count(), 2);
    }

    #[test]
    fn test_record_round_trip_and_version_check() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(3), "L", 2, dec!(50.00), AddMode::Merge)
            .unwrap();

        let restored = Cart::from_record(cart.to_record()).unwrap();
        assert_eq!(restored.total_price(), dec!(100.00));
        assert!(!restored.is_dirty());

        let mut legacy = cart.to_record();
        legacy.version = 0;
        assert!(matches!(
            Cart::from_record(legacy),
            Err(CartError::UnsupportedRecord(_))
        ));
    }
}
