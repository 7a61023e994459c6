//! Artisan Market API Library
//!
//! Backend for an artisan goods marketplace: cart management, shipping
//! addresses, payment authorization and the order commit pipeline.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{extract::FromRef, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthVerifier;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::services::{
    payments::PaymentProcessor, AddressService, CartService, CheckoutService, OrderCommitService,
    PaymentService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub auth: AuthVerifier,
    pub services: AppServices,
}

impl AppState {
    /// Wires the full service graph over a database connection and a
    /// payment processor. Tests pass a mock processor here.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let sender = Arc::new(event_sender.clone());

        let cart = Arc::new(CartService::new(
            db.clone(),
            sender.clone(),
            config.clone(),
        ));
        let addresses = Arc::new(AddressService::new(db.clone(), sender.clone()));
        let payments = Arc::new(PaymentService::new(
            cart.clone(),
            processor,
            sender.clone(),
            config.currency.clone(),
        ));
        let orders = Arc::new(OrderCommitService::new(db.clone(), sender));
        let checkout = Arc::new(CheckoutService::new(
            cart.clone(),
            addresses.clone(),
            payments.clone(),
            orders.clone(),
        ));

        let auth = AuthVerifier::new(&config.jwt_secret);

        Self {
            db,
            config,
            event_sender,
            auth,
            services: AppServices {
                cart,
                addresses,
                payments,
                orders,
                checkout,
            },
        }
    }
}

impl FromRef<Arc<AppState>> for AuthVerifier {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.auth.clone()
    }
}

/// Builds the full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/cart", handlers::cart::cart_routes())
        .nest("/api/v1/addresses", handlers::addresses::address_routes())
        .nest("/api/v1/checkout", handlers::checkout::checkout_routes())
        .nest("/api/v1/orders", handlers::orders::order_routes())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
