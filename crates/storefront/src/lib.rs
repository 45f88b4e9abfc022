//! Stitchline storefront library.
//!
//! Session cart, checkout into durable orders, and payment through an
//! external crypto payment gateway with signed webhook reconciliation.
//! The binary in `main.rs` wires these modules to `PostgreSQL`; tests drive
//! the same router with in-memory collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod state;
