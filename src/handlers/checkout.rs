use crate::handlers::common::{created_response, success_response};
use crate::{
    auth::CurrentUser,
    errors::ServiceError,
    services::{addresses::AddressInput, payments::CardDetails},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(begin_checkout))
        .route("/:id/shipping", post(submit_shipping))
        .route("/:id/payment-intent", post(create_payment_intent))
        .route("/:id/payment", post(submit_payment))
}

/// Start a checkout session over the current cart
async fn begin_checkout(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.checkout.begin(&identity).await?;
    Ok(created_response(session))
}

/// Submit the shipping form; unlocks the payment step
async fn submit_shipping(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let address_id = state
        .services
        .checkout
        .submit_shipping(&identity, session_id, payload)
        .await?;
    Ok(success_response(json!({ "address_id": address_id })))
}

/// Create a payment intent sized to the live cart total
async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let intent = state
        .services
        .checkout
        .create_intent(&identity, session_id)
        .await?;
    Ok(success_response(intent))
}

/// Confirm the payment; on success the order is committed and the cart
/// cleared
async fn submit_payment(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CardDetails>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .submit_payment(&identity, session_id, payload)
        .await?;
    Ok(success_response(outcome))
}
