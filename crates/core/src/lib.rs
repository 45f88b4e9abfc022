//! Stitchline Core - Shared domain types.
//!
//! This crate provides the types shared by the Stitchline components:
//! - `storefront` - Cart, checkout and payment reconciliation service
//! - `cli` - Command-line tools for migrations
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The order state machine lives here so the
//! reconciliation rules can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, variant keys, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
