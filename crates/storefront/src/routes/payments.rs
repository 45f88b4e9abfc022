//! Payment route handlers.
//!
//! `GET /payments/process` sends the shopper to the gateway's invoice page;
//! the gateway reports the outcome to `POST /payments/webhook`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use stitchline_core::{OrderId, OrderStatus};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::session_keys;
use crate::payments::{
    OrderReconciler, PaymentCallback, ReconcileOutcome, SIGNATURE_HEADER, WebhookPayload,
};
use crate::state::AppState;

/// Create an invoice for the session's order and redirect to it.
#[instrument(skip(state, session))]
pub async fn process(State(state): State<AppState>, session: Session) -> Result<Response> {
    let Some(order_id) = session
        .get::<OrderId>(session_keys::PENDING_ORDER_ID)
        .await?
    else {
        return Ok(Redirect::to("/cart").into_response());
    };

    let Some(order) = state.orders().get_order(order_id).await? else {
        warn!(%order_id, "Session references a missing order");
        session
            .remove_value(session_keys::PENDING_ORDER_ID)
            .await?;
        return Ok(Redirect::to("/cart").into_response());
    };

    match order.status {
        OrderStatus::Paid => {
            return Ok(Redirect::to(&format!("/orders/{}", order.id)).into_response());
        }
        OrderStatus::Cancelled => return Ok(Redirect::to("/payments/failed").into_response()),
        OrderStatus::Pending => {}
    }

    let request = state
        .gateway()
        .invoice_request(order.id, order.total_cost());
    let invoice = state.gateway().create_invoice(&request).await?;

    info!(%order_id, invoice_id = %invoice.id, "Redirecting to invoice");
    Ok(Redirect::to(invoice.invoice_url.as_str()).into_response())
}

/// Landing page after a completed payment.
pub async fn success() -> &'static str {
    "Thank you! Your payment is being confirmed and your order will update shortly."
}

/// Landing page after a cancelled or failed payment.
pub async fn failed() -> &'static str {
    "Your payment was not completed. You can try again from your order."
}

/// IPN callback from the payment gateway.
///
/// Nothing is read from the payload until its signature verifies.
#[instrument(skip(state, headers, body))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str> {
    let payload = WebhookPayload::from_json(&body)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.verifier().verify(&payload, signature)?;

    let callback = PaymentCallback::from_payload(&payload)?;
    let outcome = OrderReconciler::new(state.orders())
        .apply(&callback)
        .await?;

    match outcome {
        ReconcileOutcome::Transitioned { from, to } => {
            info!(order_id = %callback.order_id, %from, %to, "Payment callback applied");
        }
        ReconcileOutcome::Unchanged { status } => {
            info!(
                order_id = %callback.order_id,
                %status,
                payment_status = ?callback.status,
                "Payment callback recorded"
            );
        }
    }

    Ok("OK")
}
