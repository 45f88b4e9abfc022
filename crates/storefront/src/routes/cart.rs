//! Cart route handlers.
//!
//! The cart lives in the session under the configured key. Item ids in paths
//! are variant keys (`<product id>-<size>`); a malformed or unknown key turns
//! the request into a logged no-op.

use axum::{
    Form, Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stitchline_core::{Price, ProductId, VariantKey};
use tower_sessions::Session;
use tracing::{debug, instrument, warn};

use crate::cart::{AddMode, Cart, CartError, CartUpdate, SessionCart};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

/// One cart line as rendered for the shopper.
#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub key: String,
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// `None` when the product has left the catalog.
    pub product_name: Option<String>,
    pub update_url: String,
    pub remove_url: String,
}

/// Full cart contents.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total_quantity: u32,
    pub total_price: Decimal,
    /// Total in minor units; `None` only for a sub-cent total.
    pub total_cents: Option<i64>,
    /// Total formatted in the store currency, e.g. `$59.97`.
    pub total_display: String,
}

/// Cart totals returned after a mutation.
#[derive(Debug, Serialize)]
pub struct CartSummary {
    pub total_quantity: u32,
    pub total_price: Decimal,
}

impl From<&Cart> for CartSummary {
    fn from(cart: &Cart) -> Self {
        Self {
            total_quantity: cart.total_quantity(),
            total_price: cart.total_price(),
        }
    }
}

/// Badge count.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u32,
}

/// Form data for adding to cart.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub size: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Form data for updating a line. Zero or negative removes it.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub quantity: i64,
}

/// Load the session's cart.
pub(crate) async fn load_cart(state: &AppState, session: Session) -> Result<SessionCart> {
    Ok(SessionCart::load(session, state.config().cart.session_key.as_str()).await?)
}

/// Absorb client-input cart errors; only storage failures propagate.
fn absorb(result: std::result::Result<(), CartError>, action: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(CartError::Session(e)) => Err(AppError::Session(e)),
        Err(e) => {
            warn!(error = %e, action, "Ignoring cart request");
            Ok(())
        }
    }
}

async fn render(state: &AppState, cart: &Cart) -> Result<CartView> {
    let products = state.catalog().get_many(&cart.product_ids()).await?;

    let items = cart
        .items(&products)
        .map(|item| {
            let key = item.line.key().to_string();
            let path_key = urlencoding::encode(&key).into_owned();
            CartItemView {
                product_id: item.line.product_id,
                size: item.line.variant_label.to_string(),
                quantity: item.line.quantity,
                unit_price: item.line.unit_price,
                line_total: item.line.total(),
                product_name: item.product.map(|p| p.name.clone()),
                update_url: format!("/cart/update/{path_key}"),
                remove_url: format!("/cart/remove/{path_key}"),
                key,
            }
        })
        .collect();

    let total = Price::new(cart.total_price(), state.config().payments.currency);
    Ok(CartView {
        items,
        total_quantity: cart.total_quantity(),
        total_price: total.amount,
        total_cents: total.cents(),
        total_display: total.display(),
    })
}

/// Display cart contents.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = load_cart(&state, session).await?;
    Ok(Json(render(&state, cart.cart()).await?))
}

/// Add item to cart.
///
/// The product's current catalog price becomes the line's price snapshot.
#[instrument(skip(state, session, form), fields(product_id = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Json<CartSummary>> {
    let product = state
        .catalog()
        .get_by_id(form.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", form.product_id)))?;

    let mut cart = load_cart(&state, session).await?;

    if product.in_stock {
        absorb(
            cart.cart_mut().add(
                product.id,
                &form.size,
                form.quantity,
                product.price,
                AddMode::Merge,
            ),
            "add",
        )?;
        let product_id = product.id.to_string();
        add_breadcrumb(
            "cart",
            "Added item",
            Some(&[("product_id", product_id.as_str()), ("size", form.size.as_str())][..]),
        );
    } else {
        warn!("Ignoring add of out-of-stock product");
    }

    cart.save().await?;
    Ok(Json(CartSummary::from(cart.cart())))
}

/// Change a line's quantity.
#[instrument(skip(state, session, form))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<String>,
    Form(form): Form<UpdateCartForm>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&state, session).await?;

    match item_id.parse::<VariantKey>() {
        Ok(key) => {
            let update = CartUpdate::from_requested(form.quantity);
            absorb(
                cart.cart_mut().update(&key, update).map(|touched| {
                    if !touched {
                        debug!("Update for item not in cart");
                    }
                }),
                "update",
            )?;
            cart.save().await?;
        }
        Err(e) => warn!(error = %e, "Ignoring update with malformed item id"),
    }

    Ok(Json(render(&state, cart.cart()).await?))
}

/// Remove a line.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<String>,
) -> Result<Json<CartView>> {
    let mut cart = load_cart(&state, session).await?;

    match item_id.parse::<VariantKey>() {
        Ok(key) => {
            cart.cart_mut().remove(&key);
            cart.save().await?;
        }
        Err(e) => warn!(error = %e, "Ignoring remove with malformed item id"),
    }

    Ok(Json(render(&state, cart.cart()).await?))
}

/// Cart count badge.
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> Result<Json<CartCount>> {
    let cart = load_cart(&state, session).await?;
    Ok(Json(CartCount {
        count: cart.cart().total_quantity(),
    }))
}
