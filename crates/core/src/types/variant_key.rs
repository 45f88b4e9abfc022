//! Composite cart line identity: product id plus size/variant label.
//!
//! A [`VariantKey`] travels through URLs as `<productId>-<variantLabel>`
//! (for example `12-XL`), so encoding and decoding must round-trip exactly.
//! Labels may not contain the separator, which keeps the split unambiguous.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::{ParseIdError, ProductId};

/// Separator between the product id and the variant label.
pub const SEPARATOR: char = '-';

/// Errors produced when building or decoding a variant key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key has no separator.
    #[error("variant key {0:?} has no '-' separator")]
    MissingSeparator(String),
    /// The product id segment is not a canonical positive integer.
    #[error("variant key has an invalid product id: {0}")]
    InvalidProductId(#[from] ParseIdError),
    /// The label is empty after trimming.
    #[error("variant label cannot be empty")]
    EmptyLabel,
    /// The label exceeds the maximum length.
    #[error("variant label must be at most {max} characters")]
    LabelTooLong {
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// The label contains the separator or a control character.
    #[error("variant label {0:?} contains a reserved character")]
    ReservedCharacter(String),
}

/// A validated size or variant label such as `M` or `42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariantLabel(String);

impl VariantLabel {
    /// Maximum label length in characters.
    pub const MAX_LENGTH: usize = 50;

    /// Parse a label, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the label is empty, too long, or contains the
    /// separator or a control character.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KeyError::EmptyLabel);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(KeyError::LabelTooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if trimmed.chars().any(|c| c == SEPARATOR || c.is_control()) {
            return Err(KeyError::ReservedCharacter(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VariantLabel {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VariantLabel> for String {
    fn from(label: VariantLabel) -> Self {
        label.0
    }
}

/// Cart line key combining a product and one of its variants.
///
/// ```
/// use stitchline_core::{ProductId, VariantKey, VariantLabel};
///
/// let key = VariantKey::new(ProductId::new(12), VariantLabel::parse("XL").unwrap());
/// assert_eq!(key.to_string(), "12-XL");
/// assert_eq!("12-XL".parse::<VariantKey>().unwrap(), key);
/// assert!("12".parse::<VariantKey>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariantKey {
    product_id: ProductId,
    label: VariantLabel,
}

impl VariantKey {
    /// Build a key from already-validated parts.
    #[must_use]
    pub const fn new(product_id: ProductId, label: VariantLabel) -> Self {
        Self { product_id, label }
    }

    /// Encode raw parts, validating the label.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the label is not a valid [`VariantLabel`].
    pub fn encode(product_id: ProductId, label: &str) -> Result<String, KeyError> {
        Ok(Self::new(product_id, VariantLabel::parse(label)?).to_string())
    }

    /// The product half of the key.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// The variant half of the key.
    #[must_use]
    pub const fn label(&self) -> &VariantLabel {
        &self.label
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.product_id, self.label)
    }
}

impl FromStr for VariantKey {
    type Err = KeyError;

    /// Split on the first separator; the product segment must be a canonical id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (product, label) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| KeyError::MissingSeparator(s.to_owned()))?;
        let product_id = product.parse::<ProductId>()?;
        let label = VariantLabel::parse(label)?;
        Ok(Self { product_id, label })
    }
}

impl TryFrom<String> for VariantKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VariantKey> for String {
    fn from(key: VariantKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(id: i32, label: &str) -> VariantKey {
        VariantKey::new(ProductId::new(id), VariantLabel::parse(label).unwrap())
    }

    #[test]
    fn test_encode_joins_with_separator() {
        assert_eq!(VariantKey::encode(ProductId::new(7), "M").unwrap(), "7-M");
        assert_eq!(key(120, "42").to_string(), "120-42");
    }

    #[test]
    fn test_encode_rejects_separator_in_label() {
        assert_eq!(
            VariantKey::encode(ProductId::new(7), "X-Large"),
            Err(KeyError::ReservedCharacter("X-Large".to_owned()))
        );
    }

    #[test]
    fn test_decode_splits_on_first_separator() {
        let decoded: VariantKey = "15-One Size".parse().unwrap();
        assert_eq!(decoded.product_id(), ProductId::new(15));
        assert_eq!(decoded.label().as_str(), "One Size");
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            "15M".parse::<VariantKey>(),
            Err(KeyError::MissingSeparator(_))
        ));
        assert!(matches!(
            "abc-M".parse::<VariantKey>(),
            Err(KeyError::InvalidProductId(_))
        ));
        assert!(matches!(
            "-M".parse::<VariantKey>(),
            Err(KeyError::InvalidProductId(_))
        ));
        assert_eq!("15-".parse::<VariantKey>(), Err(KeyError::EmptyLabel));
        // A second separator lands in the label, which cannot contain one.
        assert!(matches!(
            "15-X-L".parse::<VariantKey>(),
            Err(KeyError::ReservedCharacter(_))
        ));
    }

    #[test]
    fn test_label_limits() {
        assert!(VariantLabel::parse(&"S".repeat(VariantLabel::MAX_LENGTH)).is_ok());
        assert_eq!(
            VariantLabel::parse(&"S".repeat(VariantLabel::MAX_LENGTH + 1)),
            Err(KeyError::LabelTooLong {
                max: VariantLabel::MAX_LENGTH
            })
        );
        assert!(VariantLabel::parse("M\n").is_ok());
        assert!(VariantLabel::parse("M\u{0}L").is_err());
        assert_eq!(VariantLabel::parse("  L ").unwrap().as_str(), "L");
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&key(3, "S")).unwrap();
        assert_eq!(json, "\"3-S\"");
        let back: VariantKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key(3, "S"));
        assert!(serde_json::from_str::<VariantKey>("\"nope\"").is_err());
    }
}
