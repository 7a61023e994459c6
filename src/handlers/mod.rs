//! Buyer-facing HTTP surface.
//!
//! Every operation here resolves the caller's identity first, delegates to
//! a service, and answers in the `{success, message, data}` envelope.

pub mod addresses;
pub mod cart;
pub mod checkout;
pub mod common;
pub mod orders;

use crate::services::{
    AddressService, CartService, CheckoutService, OrderCommitService, PaymentService,
};
use std::sync::Arc;

/// Bundle of service handles shared through the application state.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub addresses: Arc<AddressService>,
    pub payments: Arc<PaymentService>,
    pub orders: Arc<OrderCommitService>,
    pub checkout: Arc<CheckoutService>,
}
