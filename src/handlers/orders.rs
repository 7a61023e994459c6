use crate::handlers::common::{created_response, success_response};
use crate::{
    auth::CurrentUser, errors::ServiceError, services::orders::OrderCommitInput, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
}

/// Commit an order from a cart snapshot and a captured payment reference.
/// Re-posting the same payment reference returns the same order id.
async fn create_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<OrderCommitInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order_id = state
        .services
        .orders
        .commit(identity.user_id, payload)
        .await?;
    Ok(created_response(json!({ "order_id": order_id })))
}

/// Fetch one of the buyer's orders for confirmation display
async fn get_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .orders
        .get_order(identity.user_id, order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
    Ok(success_response(view))
}
