//! Order route handlers.

use axum::{
    Form, Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use stitchline_core::{OrderId, OrderStatus, ProductId};
use tower_sessions::Session;
use tracing::{error, info, instrument};

use crate::cart::SessionCart;
use crate::checkout::{CheckoutError, OrderMaterializer};
use crate::error::{AppError, Result};
use crate::models::{CustomerForm, Order, session_keys};
use crate::routes::cart::load_cart;
use crate::state::AppState;

/// Order line for the confirmation view.
#[derive(Debug, Serialize)]
pub struct OrderLineView {
    pub product_id: ProductId,
    pub size: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

/// Order confirmation.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub status: OrderStatus,
    pub paid: bool,
    pub first_name: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
    pub total_quantity: u32,
    pub total: Decimal,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            paid: order.paid,
            first_name: order.customer.first_name.clone(),
            created_at: order.created_at,
            lines: order
                .lines
                .iter()
                .map(|line| OrderLineView {
                    product_id: line.product_id,
                    size: line.size.to_string(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                    total: line.total(),
                })
                .collect(),
            total_quantity: order.total_quantity(),
            total: order.total_cost(),
        }
    }
}

/// Place an order from the session's cart.
///
/// An empty cart sends the shopper back to the catalog. On success the order
/// id is kept in the session for the payment step.
#[instrument(skip(state, session, form))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CustomerForm>,
) -> Result<Response> {
    let mut cart = load_cart(&state, session.clone()).await?;
    if cart.cart().total_quantity() == 0 {
        return Ok(Redirect::to("/products").into_response());
    }

    let customer = form
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let order = match OrderMaterializer::new(state.orders())
        .place_order(cart.cart_mut(), customer)
        .await
    {
        Ok(order) => order,
        Err(CheckoutError::EmptyCart) => return Ok(Redirect::to("/products").into_response()),
        Err(e) => return Err(e.into()),
    };

    // The order is committed; from here a session failure must name it
    if let Err(e) = remember_order(&mut cart, &session, order.id).await {
        error!(order_id = %order.id, error = %e, "Order committed but session update failed");
        return Err(e);
    }

    info!(order_id = %order.id, "Checkout complete, continuing to payment");
    Ok(Redirect::to("/payments/process").into_response())
}

/// Empty the stored cart and record the pending order, writing through to the store.
async fn remember_order(cart: &mut SessionCart, session: &Session, id: OrderId) -> Result<()> {
    cart.save().await?;
    session.insert(session_keys::PENDING_ORDER_ID, id).await?;
    session.save().await?;
    Ok(())
}

/// Order confirmation for the session's own order.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>> {
    let not_found = || AppError::NotFound(format!("order {id}"));

    let owned = session
        .get::<OrderId>(session_keys::PENDING_ORDER_ID)
        .await?
        .is_some_and(|session_id| session_id == id);
    if !owned {
        return Err(not_found());
    }

    let order = state.orders().get_order(id).await?.ok_or_else(not_found)?;
    Ok(Json(OrderView::from(&order)))
}
