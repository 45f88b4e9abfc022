//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (order storage)
//!
//! # Cart (session-backed)
//! GET  /cart                   - Cart contents
//! POST /cart/add               - Add to cart
//! POST /cart/update/{item_id}  - Set quantity (<= 0 removes)
//! POST /cart/remove/{item_id}  - Remove item
//! GET  /cart/count             - Cart count badge
//!
//! # Orders
//! POST /orders/create          - Place order from cart, continue to payment
//! GET  /orders/{id}            - Order confirmation
//!
//! # Payments
//! GET  /payments/process       - Create invoice, redirect to gateway
//! GET  /payments/success       - Gateway success landing page
//! GET  /payments/failed        - Gateway cancel landing page
//! POST /payments/webhook       - Gateway IPN callback
//! ```

pub mod cart;
pub mod health;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    extract::Request,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update/{item_id}", post(cart::update))
        .route("/remove/{item_id}", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(orders::create))
        .route("/{id}", get(orders::show))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/process", get(payments::process))
        .route("/success", get(payments::success))
        .route("/failed", get(payments::failed))
        .route("/webhook", post(payments::webhook))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
}

/// Build the application router with sessions, request ids and tracing.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    routes()
        .layer(session_layer)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
