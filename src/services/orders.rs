use crate::{
    entities::{
        address, order, order_item, payment_record, Address, Order, OrderItem, PaymentRecord,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const PAYMENT_METHOD: &str = "external-processor";
const PAYMENT_STATUS_APPROVED: &str = "Approved";

/// One line of the cart snapshot handed to `commit`. The unit price is
/// the catalog price captured when the snapshot was taken; the coordinator
/// never re-queries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineSnapshot {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Everything `commit` needs besides the buyer identity.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCommitInput {
    pub lines: Vec<CartLineSnapshot>,
    pub address_id: Uuid,
    pub payment_reference: String,
    pub amount_minor: i64,
}

/// An order with its lines, for confirmation display.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Order commit coordinator.
///
/// The central state machine of a checkout attempt: preconditions are
/// checked before any write, the order header and its lines are written in
/// a single transaction, and the payment audit record is appended
/// best-effort afterwards. Duplicate invocations for the same processor
/// reference return the already-committed order instead of creating a
/// second one.
#[derive(Clone)]
pub struct OrderCommitService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderCommitService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Commits a checkout attempt into a durable order, returning the
    /// order id.
    ///
    /// External money movement has already happened by the time this runs,
    /// so the call must never be silently abandoned: every exit path is
    /// either a committed order or an explicit error.
    #[instrument(skip(self, input), fields(buyer_id = %buyer_id, payment_reference = %input.payment_reference))]
    pub async fn commit(
        &self,
        buyer_id: Uuid,
        input: OrderCommitInput,
    ) -> Result<Uuid, ServiceError> {
        validate_preconditions(&input)?;

        // The address must pre-exist and belong to the buyer.
        Address::find_by_id(input.address_id)
            .filter(address::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::MissingPrecondition(
                    "Shipping address does not exist for this buyer".to_string(),
                )
            })?;

        // Reuse guard: a client retry after a captured payment must not
        // produce a second order for the same processor reference.
        if let Some(existing) = PaymentRecord::find()
            .filter(payment_record::Column::ProcessorReference.eq(input.payment_reference.clone()))
            .one(&*self.db)
            .await?
        {
            info!(
                order_id = %existing.order_id,
                "Payment reference already committed; returning existing order"
            );
            return Ok(existing.order_id);
        }

        let order_id = Uuid::new_v4();
        let total = Decimal::from(input.amount_minor) / Decimal::from(100);
        let now = Utc::now();

        // Header and lines succeed or fail together; a partially written
        // order is never left visible.
        let txn = self.db.begin().await?;

        let header = order::ActiveModel {
            id: Set(order_id),
            buyer_id: Set(buyer_id),
            address_id: Set(input.address_id),
            total: Set(total),
            status: Set(order::OrderStatus::Paid),
            created_at: Set(now),
        };
        if let Err(e) = header.insert(&txn).await {
            let _ = txn.rollback().await;
            error!(error = %e, "Order header insert failed");
            return Err(ServiceError::OrderCreateFailed(e.to_string()));
        }

        for line in &input.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price_at_purchase: Set(line.unit_price),
            };
            if let Err(e) = item.insert(&txn).await {
                let _ = txn.rollback().await;
                error!(error = %e, %order_id, "Order line insert failed; attempt rolled back");
                return Err(ServiceError::OrderDetailFailed(e.to_string()));
            }
        }

        txn.commit()
            .await
            .map_err(|e| ServiceError::OrderCreateFailed(format!("commit failed: {}", e)))?;

        // Best-effort audit trail: the order stands even if this write
        // fails, but the failure is flagged for manual reconciliation.
        let record = payment_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            amount: Set(total),
            method: Set(PAYMENT_METHOD.to_string()),
            status: Set(PAYMENT_STATUS_APPROVED.to_string()),
            processor_reference: Set(input.payment_reference.clone()),
            created_at: Set(Utc::now()),
        };
        if let Err(e) = record.insert(&*self.db).await {
            warn!(error = %e, %order_id, "Payment record insert failed");
            self.event_sender
                .send_or_log(Event::PaymentRecordWriteFailed {
                    order_id,
                    reference: input.payment_reference.clone(),
                })
                .await;
        }

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(%order_id, total = %total, "Order committed");
        Ok(order_id)
    }

    /// Fetches one of the buyer's orders with its lines.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<OrderView>, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?;

        let order = match order {
            Some(order) => order,
            None => return Ok(None),
        };

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        Ok(Some(OrderView { order, items }))
    }
}

/// Fail-fast checks that run before any write. The address ownership check
/// needs the store and lives in `commit` itself.
fn validate_preconditions(input: &OrderCommitInput) -> Result<(), ServiceError> {
    if input.lines.is_empty() {
        return Err(ServiceError::MissingPrecondition(
            "Cart snapshot is empty".to_string(),
        ));
    }
    if input.lines.iter().any(|line| line.quantity < 1) {
        return Err(ServiceError::MissingPrecondition(
            "Cart snapshot contains a non-positive quantity".to_string(),
        ));
    }
    if input.payment_reference.trim().is_empty() {
        return Err(ServiceError::MissingPrecondition(
            "Payment reference is missing".to_string(),
        ));
    }
    if input.amount_minor <= 0 {
        return Err(ServiceError::MissingPrecondition(
            "Order amount must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn snapshot() -> Vec<CartLineSnapshot> {
        vec![CartLineSnapshot {
            product_id: Uuid::new_v4(),
            quantity: 2,
            unit_price: dec!(10.00),
        }]
    }

    fn input() -> OrderCommitInput {
        OrderCommitInput {
            lines: snapshot(),
            address_id: Uuid::new_v4(),
            payment_reference: "pi_test_123".to_string(),
            amount_minor: 2000,
        }
    }

    #[test]
    fn valid_input_passes_preconditions() {
        assert!(validate_preconditions(&input()).is_ok());
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        let mut bad = input();
        bad.lines.clear();
        assert_matches!(
            validate_preconditions(&bad),
            Err(ServiceError::MissingPrecondition(_))
        );
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let mut bad = input();
        bad.lines[0].quantity = 0;
        assert_matches!(
            validate_preconditions(&bad),
            Err(ServiceError::MissingPrecondition(_))
        );
    }

    #[test]
    fn blank_payment_reference_is_rejected() {
        let mut bad = input();
        bad.payment_reference = "   ".to_string();
        assert_matches!(
            validate_preconditions(&bad),
            Err(ServiceError::MissingPrecondition(_))
        );
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut bad = input();
        bad.amount_minor = 0;
        assert_matches!(
            validate_preconditions(&bad),
            Err(ServiceError::MissingPrecondition(_))
        );
    }

    #[test]
    fn total_is_minor_units_over_one_hundred() {
        let total = Decimal::from(2550i64) / Decimal::from(100);
        assert_eq!(total, dec!(25.50));
    }
}
