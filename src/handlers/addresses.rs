use crate::handlers::common::{created_response, message_response, success_response};
use crate::{
    auth::CurrentUser, errors::ServiceError, services::addresses::AddressInput, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for address endpoints
pub fn address_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_addresses))
        .route("/", post(save_shipping_address))
        .route("/:id", put(update_address))
        .route("/:id", delete(delete_address))
}

/// List the buyer's addresses, street ascending
async fn list_addresses(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state.services.addresses.list(identity.user_id).await?;
    Ok(success_response(addresses))
}

/// Save a shipping address, reusing an identical existing one
async fn save_shipping_address(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let address_id = state
        .services
        .addresses
        .save(identity.user_id, payload)
        .await?;
    Ok(created_response(json!({ "address_id": address_id })))
}

/// Update an owned address in place
async fn update_address(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(address_id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .addresses
        .update(identity.user_id, address_id, payload)
        .await?;
    Ok(message_response("Address updated"))
}

/// Delete an owned address
async fn delete_address(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(address_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .addresses
        .delete(identity.user_id, address_id)
        .await?;
    Ok(message_response("Address deleted"))
}
