//! Payment gateway integration.
//!
//! - [`gateway`] requests invoices from the processor.
//! - [`webhook`] authenticates the processor's IPN callbacks.
//! - [`reconcile`] applies authenticated callbacks to the order state machine.

pub mod gateway;
pub mod reconcile;
pub mod webhook;

pub use gateway::{GatewayClient, GatewayError, Invoice, InvoiceRequest};
pub use reconcile::{OrderReconciler, PaymentCallback, ReconcileError, ReconcileOutcome};
pub use webhook::{
    PayloadError, PayloadValue, SIGNATURE_HEADER, SignatureError, WebhookPayload, WebhookVerifier,
};
