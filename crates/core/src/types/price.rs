//! Type-safe price representation using decimal arithmetic.
//!
//! Money never passes through floating point inside the system. The only
//! conversion to `f64` happens at the payment gateway boundary, whose JSON
//! API expects a number.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// The amount in minor units, or `None` if it has sub-cent precision.
    #[must_use]
    pub fn cents(&self) -> Option<i64> {
        let scaled = self.amount.checked_mul(Decimal::ONE_HUNDRED)?;
        if scaled.fract().is_zero() {
            i64::try_from(scaled).ok()
        } else {
            None
        }
    }

    /// Format for display (e.g., `$19.99`).
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{}{:.2}",
            self.currency_code.symbol(),
            self.amount.round_dp(2)
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

/// Error returned for an unsupported currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported currency code: {0}")]
pub struct UnknownCurrency(pub String);

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Lowercase code as used by the payment gateway (`usd`).
    #[must_use]
    pub const fn gateway_code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            _ => Err(UnknownCurrency(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_cents_is_integer_exact() {
        let total = dec!(19.99) * dec!(3);
        assert_eq!(Price::new(total, CurrencyCode::USD).cents(), Some(5997));
        assert_eq!(Price::new(dec!(100), CurrencyCode::USD).cents(), Some(10000));
    }

    #[test]
    fn test_cents_rejects_fractional_cents() {
        assert_eq!(Price::new(dec!(1.005), CurrencyCode::USD).cents(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::new(dec!(100), CurrencyCode::USD).display(), "$100.00");
        assert_eq!(Price::new(dec!(19.9), CurrencyCode::EUR).to_string(), "€19.90");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("usd".parse::<CurrencyCode>(), Ok(CurrencyCode::USD));
        assert_eq!(" GBP ".parse::<CurrencyCode>(), Ok(CurrencyCode::GBP));
        assert!("btc".parse::<CurrencyCode>().is_err());
        assert_eq!(CurrencyCode::USD.gateway_code(), "usd");
    }
}
