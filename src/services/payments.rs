use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    services::cart::CartService,
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Final disposition of a confirmation attempt, as reported by the
/// processor. `RequiresAction` is terminal for the call but distinct from
/// failure: the buyer must complete an interactive step and resubmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Succeeded,
    RequiresAction,
    Failed,
}

/// A freshly created payment intent.
#[derive(Debug, Clone)]
pub struct ProcessorIntent {
    pub id: String,
    pub client_secret: String,
}

/// Result of a confirmation call against the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfirmation {
    pub id: String,
    pub status: ConfirmationStatus,
    pub amount_minor: i64,
    pub failure_message: Option<String>,
}

/// Tokenized card details from the presentation layer. Raw card data never
/// reaches this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub payment_method: String,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
}

/// External payment processor contract.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ProcessorIntent, ServiceError>;

    /// May involve user-interactive authentication on the processor side;
    /// callers must treat it as long-running.
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        card: &CardDetails,
    ) -> Result<ProcessorConfirmation, ServiceError>;
}

/// Payment authorization gateway.
///
/// Wraps the external processor: intent creation sized to the live cart,
/// minor-unit conversion, and confirmation-status interpretation.
#[derive(Clone)]
pub struct PaymentService {
    cart_service: Arc<CartService>,
    processor: Arc<dyn PaymentProcessor>,
    event_sender: Arc<EventSender>,
    currency: String,
}

/// What the presentation layer needs to render the payment form.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentView {
    pub client_secret: String,
    pub amount_minor: i64,
}

/// Interpreted outcome of a confirmation call.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub status: ConfirmationStatus,
    pub processor_reference: String,
    pub failure_reason: Option<String>,
}

impl PaymentService {
    pub fn new(
        cart_service: Arc<CartService>,
        processor: Arc<dyn PaymentProcessor>,
        event_sender: Arc<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            cart_service,
            processor,
            event_sender,
            currency,
        }
    }

    /// Creates a payment intent sized to the buyer's live cart total.
    ///
    /// The amount is re-derived from the stored cart on every call and
    /// converted with `round(total * 100)`; an empty or zero-value cart is
    /// rejected before any processor call is made.
    #[instrument(skip(self))]
    pub async fn create_intent(&self, buyer_id: Uuid) -> Result<PaymentIntentView, ServiceError> {
        let total = self.cart_service.cart_total(buyer_id).await?;
        let amount_minor = to_minor_units(total)?;
        if amount_minor <= 0 {
            return Err(ServiceError::InvalidAmount(
                "Cart total must be greater than zero".to_string(),
            ));
        }

        let mut metadata = HashMap::new();
        metadata.insert("buyer_id".to_string(), buyer_id.to_string());

        let intent = self
            .processor
            .create_payment_intent(amount_minor, &self.currency, metadata)
            .await?;

        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                buyer_id,
                amount_minor,
            })
            .await;

        info!(%buyer_id, amount_minor, intent_id = %intent.id, "Created payment intent");
        Ok(PaymentIntentView {
            client_secret: intent.client_secret,
            amount_minor,
        })
    }

    /// Delegates confirmation to the processor and interprets its answer.
    #[instrument(skip(self, client_secret, card))]
    pub async fn confirm(
        &self,
        client_secret: &str,
        card: &CardDetails,
    ) -> Result<ConfirmOutcome, ServiceError> {
        let confirmation = self
            .processor
            .confirm_card_payment(client_secret, card)
            .await?;

        Ok(ConfirmOutcome {
            status: confirmation.status,
            processor_reference: confirmation.id,
            failure_reason: confirmation.failure_message,
        })
    }
}

/// Converts a major-unit decimal total into minor currency units.
pub fn to_minor_units(total: Decimal) -> Result<i64, ServiceError> {
    (total * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidAmount(format!("amount out of range: {}", total)))
}

/// HTTP client for a Stripe-shaped processor REST API.
pub struct HttpPaymentProcessor {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    id: String,
    status: String,
    amount: i64,
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

impl HttpPaymentProcessor {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ProcessorIntent, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "processor returned {}: {}",
                status, body
            )));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor: {}", e)))?;

        Ok(ProcessorIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        card: &CardDetails,
    ) -> Result<ProcessorConfirmation, ServiceError> {
        let intent_id = intent_id_from_secret(client_secret).ok_or_else(|| {
            ServiceError::ValidationError("malformed payment client secret".to_string())
        })?;

        let form = vec![("payment_method".to_string(), card.payment_method.clone())];

        let response = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{}/confirm",
                self.base_url, intent_id
            ))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "processor returned {}: {}",
                status, body
            )));
        }

        let confirmed: ConfirmResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor: {}", e)))?;

        Ok(ProcessorConfirmation {
            status: map_processor_status(&confirmed.status),
            id: confirmed.id,
            amount_minor: confirmed.amount,
            failure_message: confirmed.last_payment_error.and_then(|e| e.message),
        })
    }
}

/// The processor's intent identifier is the prefix of its client secret.
fn intent_id_from_secret(client_secret: &str) -> Option<&str> {
    let (id, _) = client_secret.split_once("_secret")?;
    (!id.is_empty()).then_some(id)
}

fn map_processor_status(status: &str) -> ConfirmationStatus {
    match status {
        "succeeded" => ConfirmationStatus::Succeeded,
        "requires_action" | "requires_source_action" => ConfirmationStatus::RequiresAction,
        _ => ConfirmationStatus::Failed,
    }
}
