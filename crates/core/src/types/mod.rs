//! Core types for Stitchline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod status;
pub mod variant_key;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price, UnknownCurrency};
pub use status::*;
pub use variant_key::{KeyError, VariantKey, VariantLabel};
