use crate::{
    auth::Identity,
    errors::ServiceError,
    services::{
        addresses::{AddressInput, AddressService},
        cart::CartService,
        orders::{CartLineSnapshot, OrderCommitInput, OrderCommitService},
        payments::{CardDetails, ConfirmationStatus, PaymentIntentView, PaymentService},
    },
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Where the buyer currently is in the checkout sequence. Stage gating is
/// a precondition, not a UI affordance; the order coordinator re-checks
/// its own preconditions independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    Shipping,
    Payment,
    Confirmation,
}

/// In-progress checkout state for one buyer session. Purely in-memory;
/// abandoning it before payment needs no cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub cart_id: Uuid,
    pub stage: CheckoutStage,
    pub address_id: Option<Uuid>,
    pub amount_minor: Option<i64>,
    #[serde(skip_serializing)]
    client_secret: Option<String>,
}

/// What a payment submission came to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentSubmitOutcome {
    /// Order committed and cart cleared.
    Completed { order_id: Uuid },
    /// The processor wants an interactive step; resubmit afterwards.
    RequiresAction { client_secret: String },
    /// Authorization failed; the buyer may resubmit without redoing the
    /// shipping step.
    Declined { reason: String },
    /// Payment was captured but the order could not be recorded. Surfaced
    /// with the processor reference so support can reconcile; never
    /// auto-retried.
    RecordingFailed {
        payment_reference: String,
        message: String,
    },
}

/// Checkout session controller.
///
/// Drives the buyer through shipping, payment, and confirmation, and only
/// invokes the order coordinator once every precondition is met.
pub struct CheckoutService {
    sessions: DashMap<Uuid, CheckoutSession>,
    cart_service: Arc<CartService>,
    address_service: Arc<AddressService>,
    payment_service: Arc<PaymentService>,
    order_service: Arc<OrderCommitService>,
}

impl CheckoutService {
    pub fn new(
        cart_service: Arc<CartService>,
        address_service: Arc<AddressService>,
        payment_service: Arc<PaymentService>,
        order_service: Arc<OrderCommitService>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            cart_service,
            address_service,
            payment_service,
            order_service,
        }
    }

    /// Starts a checkout session for the buyer's current cart. An empty
    /// cart cannot enter checkout.
    #[instrument(skip(self, identity), fields(buyer_id = %identity.user_id))]
    pub async fn begin(&self, identity: &Identity) -> Result<CheckoutSession, ServiceError> {
        let cart = self
            .cart_service
            .get_cart(identity.user_id)
            .await?
            .ok_or_else(|| ServiceError::InvalidOperation("Cart is empty".to_string()))?;

        let lines = self.cart_service.list_lines(identity.user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let session = CheckoutSession {
            id: Uuid::new_v4(),
            buyer_id: identity.user_id,
            cart_id: cart.id,
            stage: CheckoutStage::Shipping,
            address_id: None,
            amount_minor: None,
            client_secret: None,
        };
        self.sessions.insert(session.id, session.clone());

        info!(session_id = %session.id, "Checkout session started");
        Ok(session)
    }

    /// Persists the shipping address and unlocks the payment stage.
    #[instrument(skip(self, identity, input), fields(buyer_id = %identity.user_id))]
    pub async fn submit_shipping(
        &self,
        identity: &Identity,
        session_id: Uuid,
        input: AddressInput,
    ) -> Result<Uuid, ServiceError> {
        let session = self.session_for(identity, session_id)?;

        let address_id = self.address_service.save(identity.user_id, input).await?;

        self.sessions.insert(
            session.id,
            CheckoutSession {
                address_id: Some(address_id),
                stage: CheckoutStage::Payment,
                ..session
            },
        );
        Ok(address_id)
    }

    /// Creates a payment intent for the session. Unreachable until the
    /// shipping address has been saved.
    #[instrument(skip(self, identity), fields(buyer_id = %identity.user_id))]
    pub async fn create_intent(
        &self,
        identity: &Identity,
        session_id: Uuid,
    ) -> Result<PaymentIntentView, ServiceError> {
        let session = self.session_for(identity, session_id)?;
        if session.address_id.is_none() {
            return Err(ServiceError::MissingPrecondition(
                "Shipping address has not been saved".to_string(),
            ));
        }

        let intent = self.payment_service.create_intent(identity.user_id).await?;

        self.sessions.insert(
            session.id,
            CheckoutSession {
                amount_minor: Some(intent.amount_minor),
                client_secret: Some(intent.client_secret.clone()),
                ..session
            },
        );
        Ok(intent)
    }

    /// Confirms the payment and, on processor success, commits the order
    /// and clears the cart.
    ///
    /// Once the coordinator has been invoked the call runs to completion
    /// or explicit failure; money has already moved externally.
    #[instrument(skip(self, identity, card), fields(buyer_id = %identity.user_id))]
    pub async fn submit_payment(
        &self,
        identity: &Identity,
        session_id: Uuid,
        card: CardDetails,
    ) -> Result<PaymentSubmitOutcome, ServiceError> {
        let session = self.session_for(identity, session_id)?;
        let address_id = session.address_id.ok_or_else(|| {
            ServiceError::MissingPrecondition("Shipping address has not been saved".to_string())
        })?;
        let client_secret = session.client_secret.clone().ok_or_else(|| {
            ServiceError::MissingPrecondition("Payment intent has not been created".to_string())
        })?;
        let amount_minor = session.amount_minor.ok_or_else(|| {
            ServiceError::MissingPrecondition("Payment intent has not been created".to_string())
        })?;

        let confirm = self.payment_service.confirm(&client_secret, &card).await?;

        match confirm.status {
            ConfirmationStatus::RequiresAction => {
                Ok(PaymentSubmitOutcome::RequiresAction { client_secret })
            }
            ConfirmationStatus::Failed => Ok(PaymentSubmitOutcome::Declined {
                reason: confirm
                    .failure_reason
                    .unwrap_or_else(|| "Payment was declined".to_string()),
            }),
            ConfirmationStatus::Succeeded => {
                let lines: Vec<CartLineSnapshot> = self
                    .cart_service
                    .list_lines(identity.user_id)
                    .await?
                    .into_iter()
                    .map(|line| CartLineSnapshot {
                        product_id: line.product_id,
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                    })
                    .collect();

                let commit = self
                    .order_service
                    .commit(
                        identity.user_id,
                        OrderCommitInput {
                            lines,
                            address_id,
                            payment_reference: confirm.processor_reference.clone(),
                            amount_minor,
                        },
                    )
                    .await;

                match commit {
                    Ok(order_id) => {
                        // The order stands even if the cart sweep fails;
                        // a stale cart is recoverable, a lost order is not.
                        if let Err(e) = self.cart_service.clear(identity.user_id).await {
                            warn!(error = %e, %order_id, "Cart clear after commit failed");
                        }
                        self.sessions.insert(
                            session.id,
                            CheckoutSession {
                                stage: CheckoutStage::Confirmation,
                                ..session
                            },
                        );
                        Ok(PaymentSubmitOutcome::Completed { order_id })
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            payment_reference = %confirm.processor_reference,
                            "Order commit failed after captured payment"
                        );
                        Ok(PaymentSubmitOutcome::RecordingFailed {
                            payment_reference: confirm.processor_reference.clone(),
                            message: format!(
                                "Your payment was received but the order could not be recorded. \
                                 Please contact support and quote payment reference {}.",
                                confirm.processor_reference
                            ),
                        })
                    }
                }
            }
        }
    }

    /// Looks up a session the caller owns. Another buyer's session id
    /// behaves like a missing one.
    fn session_for(
        &self,
        identity: &Identity,
        session_id: Uuid,
    ) -> Result<CheckoutSession, ServiceError> {
        self.sessions
            .get(&session_id)
            .filter(|session| session.buyer_id == identity.user_id)
            .map(|session| session.clone())
            .ok_or_else(|| ServiceError::NotFound("Checkout session not found".to_string()))
    }
}
