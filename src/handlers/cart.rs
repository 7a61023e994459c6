use crate::handlers::common::{message_response, success_response, validate_input};
use crate::{auth::CurrentUser, errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart_items))
        .route("/items", post(add_to_cart))
        .route("/items/:product_id", put(update_cart_item_quantity))
        .route("/items/:product_id", delete(remove_from_cart))
        .route("/clear", post(clear_cart))
}

#[derive(Debug, Serialize)]
struct CartContents {
    items: Vec<crate::services::cart::CartLineView>,
    total: Decimal,
}

/// List the cart lines with product snapshots and the live total
async fn get_cart_items(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state.services.cart.list_lines(identity.user_id).await?;
    let total = items.iter().map(|line| line.subtotal).sum();
    Ok(success_response(CartContents { items, total }))
}

#[derive(Debug, Deserialize, Validate)]
struct AddToCartRequest {
    product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Add a product to the cart, incrementing quantity when already present
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    state
        .services
        .cart
        .add_item(identity.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(message_response("Item added to cart"))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

/// Overwrite a line's quantity; zero or less removes the line
async fn update_cart_item_quantity(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .set_quantity(identity.user_id, product_id, payload.quantity)
        .await?;
    Ok(message_response("Cart updated"))
}

/// Remove a line; succeeds even when it was never there
async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .remove_item(identity.user_id, product_id)
        .await?;
    Ok(message_response("Item removed"))
}

/// Delete every line of the buyer's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.cart.clear(identity.user_id).await?;
    Ok(message_response("Cart cleared"))
}
