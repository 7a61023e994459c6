#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use artisan_market_api::{
    auth::Identity,
    config::AppConfig,
    db,
    entities::{
        address, cart, cart_item, order, order_item, payment_record, product, product_image,
    },
    errors::ServiceError,
    events::{self, EventSender},
    services::payments::{
        CardDetails, ConfirmationStatus, PaymentProcessor, ProcessorConfirmation, ProcessorIntent,
    },
    AppState,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Schema, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Scriptable in-memory stand-in for the external payment processor.
///
/// Every created intent is recorded; confirmations succeed unless an
/// outcome has been scripted for the intent's client secret.
pub struct MockProcessor {
    counter: AtomicU64,
    pub intents: Mutex<Vec<RecordedIntent>>,
    outcomes: Mutex<HashMap<String, (ConfirmationStatus, Option<String>)>>,
}

#[derive(Debug, Clone)]
pub struct RecordedIntent {
    pub id: String,
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            intents: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    /// Script the confirmation outcome for a client secret. Unscripted
    /// secrets confirm as `Succeeded`.
    pub fn script_outcome(
        &self,
        client_secret: &str,
        status: ConfirmationStatus,
        failure_message: Option<&str>,
    ) {
        self.outcomes.lock().unwrap().insert(
            client_secret.to_string(),
            (status, failure_message.map(|m| m.to_string())),
        );
    }

    pub fn intent_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ProcessorIntent, ServiceError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_mock_{}", n);
        let client_secret = format!("pi_mock_{}_secret_{}", n, n);

        self.intents.lock().unwrap().push(RecordedIntent {
            id: id.clone(),
            client_secret: client_secret.clone(),
            amount_minor,
            currency: currency.to_string(),
            metadata,
        });

        Ok(ProcessorIntent { id, client_secret })
    }

    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        _card: &CardDetails,
    ) -> Result<ProcessorConfirmation, ServiceError> {
        let intent = self
            .intents
            .lock()
            .unwrap()
            .iter()
            .find(|intent| intent.client_secret == client_secret)
            .cloned()
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("no such payment intent".to_string())
            })?;

        let (status, failure_message) = self
            .outcomes
            .lock()
            .unwrap()
            .get(client_secret)
            .cloned()
            .unwrap_or((ConfirmationStatus::Succeeded, None));

        Ok(ProcessorConfirmation {
            id: intent.id,
            status,
            amount_minor: intent.amount_minor,
            failure_message,
        })
    }
}

/// Test harness: application state over a throwaway SQLite database and a
/// mock payment processor.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub processor: Arc<MockProcessor>,
    db_file: PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file =
            std::env::temp_dir().join(format!("artisan_market_test_{}.db", Uuid::new_v4()));
        let _ = std::fs::remove_file(&db_file);

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "test_secret_key_for_testing_purposes_32".to_string(),
            "https://processor.invalid".to_string(),
        );
        // SQLite needs a single connection so every query sees the same file state.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let backend = pool.get_database_backend();
        let schema = Schema::new(backend);
        let tables = [
            schema.create_table_from_entity(product::Entity),
            schema.create_table_from_entity(product_image::Entity),
            schema.create_table_from_entity(cart::Entity),
            schema.create_table_from_entity(cart_item::Entity),
            schema.create_table_from_entity(address::Entity),
            schema.create_table_from_entity(order::Entity),
            schema.create_table_from_entity(order_item::Entity),
            schema.create_table_from_entity(payment_record::Entity),
        ];
        for stmt in &tables {
            pool.execute(backend.build(stmt))
                .await
                .expect("failed to create table");
        }

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let processor = Arc::new(MockProcessor::new());
        let state = Arc::new(AppState::build(
            Arc::new(pool),
            Arc::new(cfg),
            event_sender,
            processor.clone(),
        ));

        Self {
            state,
            processor,
            db_file,
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> axum::Router {
        artisan_market_api::app_router(self.state.clone())
    }

    pub fn buyer(&self) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "buyer@example.com".to_string(),
        }
    }

    pub fn token_for(&self, identity: &Identity) -> String {
        self.state
            .auth
            .issue(identity.user_id, &identity.email, chrono::Duration::hours(1))
            .expect("failed to issue test token")
    }

    /// Insert a product row; prices should use binary-exact cents so the
    /// SQLite round trip stays lossless.
    pub async fn seed_product(&self, name: &str, price: Decimal) -> Uuid {
        let now = Utc::now();
        let row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            artisan_id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(format!("{} description", name))),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = row.insert(&*self.state.db).await.expect("seed product");
        inserted.id
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}
