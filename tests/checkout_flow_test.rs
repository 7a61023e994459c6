mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend, EntityTrait, Set, Statement,
};

use artisan_market_api::{
    entities::{product, Order, OrderItem, PaymentRecord},
    errors::ServiceError,
    services::{
        addresses::AddressInput,
        checkout::PaymentSubmitOutcome,
        orders::{CartLineSnapshot, OrderCommitInput},
        payments::{CardDetails, ConfirmationStatus},
    },
};

fn shipping_form() -> AddressInput {
    AddressInput {
        recipient_name: "Maria Silva".to_string(),
        phone: None,
        street: "12 Kiln Lane".to_string(),
        city: "Asheville".to_string(),
        region: "NC".to_string(),
        postal_code: "28801".to_string(),
        country: "US".to_string(),
    }
}

fn card() -> CardDetails {
    CardDetails {
        payment_method: "pm_card_visa".to_string(),
        billing_name: Some("Maria Silva".to_string()),
        billing_email: Some("maria@example.com".to_string()),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn full_checkout_commits_order_and_clears_cart() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Walnut Serving Board", dec!(120.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();

    let intent = services
        .checkout
        .create_intent(&buyer, session.id)
        .await
        .unwrap();
    assert_eq!(intent.amount_minor, 12_000);

    let outcome = services
        .checkout
        .submit_payment(&buyer, session.id, card())
        .await
        .unwrap();
    let order_id = match outcome {
        PaymentSubmitOutcome::Completed { order_id } => order_id,
        other => panic!("expected completed checkout, got {:?}", other),
    };

    // Cart is empty afterwards.
    assert!(services.cart.list_lines(buyer.user_id).await.unwrap().is_empty());

    // Order carries the processor-derived total and the frozen line price.
    let view = services
        .orders
        .get_order(buyer.user_id, order_id)
        .await
        .unwrap()
        .expect("order should exist");
    assert_eq!(view.order.total, dec!(120.00));
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].price_at_purchase, dec!(120.00));
    assert_eq!(view.items[0].quantity, 1);

    // Audit record references the processor intent.
    let records = PaymentRecord::find().all(&*app.state.db).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, order_id);
    assert_eq!(records[0].processor_reference, "pi_mock_1");

    // Replaying the same payment reference returns the same order.
    let replay = services
        .orders
        .commit(
            buyer.user_id,
            OrderCommitInput {
                lines: vec![CartLineSnapshot {
                    product_id,
                    quantity: 1,
                    unit_price: dec!(120.00),
                }],
                address_id: view.order.address_id,
                payment_reference: "pi_mock_1".to_string(),
                amount_minor: 12_000,
            },
        )
        .await
        .unwrap();
    assert_eq!(replay, order_id);
    assert_eq!(Order::find().all(&*app.state.db).await.unwrap().len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn empty_cart_cannot_enter_checkout() {
    let app = TestApp::new().await;
    let buyer = app.buyer();

    let result = app.state.services.checkout.begin(&buyer).await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn zero_value_cart_never_reaches_the_processor() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Sample Swatch", dec!(0.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();

    let result = services.checkout.create_intent(&buyer, session.id).await;
    assert_matches!(result, Err(ServiceError::InvalidAmount(_)));
    assert_eq!(app.processor.intent_count(), 0);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn payment_intent_requires_a_saved_shipping_address() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();
    let session = services.checkout.begin(&buyer).await.unwrap();

    let result = services.checkout.create_intent(&buyer, session.id).await;
    assert_matches!(result, Err(ServiceError::MissingPrecondition(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn declined_payment_leaves_cart_and_creates_no_order() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 2).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();
    let intent = services
        .checkout
        .create_intent(&buyer, session.id)
        .await
        .unwrap();

    app.processor.script_outcome(
        &intent.client_secret,
        ConfirmationStatus::Failed,
        Some("Your card was declined."),
    );

    let outcome = services
        .checkout
        .submit_payment(&buyer, session.id, card())
        .await
        .unwrap();
    assert_matches!(
        outcome,
        PaymentSubmitOutcome::Declined { ref reason } if reason.as_str() == "Your card was declined."
    );

    assert_eq!(
        services.cart.list_lines(buyer.user_id).await.unwrap().len(),
        1
    );
    assert!(Order::find().all(&*app.state.db).await.unwrap().is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn requires_action_is_surfaced_without_committing() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();
    let intent = services
        .checkout
        .create_intent(&buyer, session.id)
        .await
        .unwrap();

    app.processor
        .script_outcome(&intent.client_secret, ConfirmationStatus::RequiresAction, None);

    let outcome = services
        .checkout
        .submit_payment(&buyer, session.id, card())
        .await
        .unwrap();
    assert_matches!(
        outcome,
        PaymentSubmitOutcome::RequiresAction { ref client_secret }
            if *client_secret == intent.client_secret
    );
    assert!(Order::find().all(&*app.state.db).await.unwrap().is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn another_buyers_session_behaves_like_a_missing_one() {
    let app = TestApp::new().await;
    let alice = app.buyer();
    let bob = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(alice.user_id, product_id, 1).await.unwrap();
    let session = services.checkout.begin(&alice).await.unwrap();

    let result = services
        .checkout
        .submit_shipping(&bob, session.id, shipping_form())
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn order_line_price_survives_a_later_catalog_change() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();
    services
        .checkout
        .create_intent(&buyer, session.id)
        .await
        .unwrap();
    let outcome = services
        .checkout
        .submit_payment(&buyer, session.id, card())
        .await
        .unwrap();
    let order_id = match outcome {
        PaymentSubmitOutcome::Completed { order_id } => order_id,
        other => panic!("expected completed checkout, got {:?}", other),
    };

    // Artisan raises the price afterwards.
    let row = product::Entity::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut row: product::ActiveModel = row.into();
    row.price = Set(dec!(99.00));
    row.update(&*app.state.db).await.unwrap();

    let items = OrderItem::find().all(&*app.state.db).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].order_id, order_id);
    assert_eq!(items[0].price_at_purchase, dec!(10.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn commit_rejects_an_address_the_buyer_does_not_own() {
    let app = TestApp::new().await;
    let alice = app.buyer();
    let bob = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let address_id = app
        .state
        .services
        .addresses
        .save(alice.user_id, shipping_form())
        .await
        .unwrap();

    let result = app
        .state
        .services
        .orders
        .commit(
            bob.user_id,
            OrderCommitInput {
                lines: vec![CartLineSnapshot {
                    product_id,
                    quantity: 1,
                    unit_price: dec!(10.00),
                }],
                address_id,
                payment_reference: "pi_mock_unowned".to_string(),
                amount_minor: 1000,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::MissingPrecondition(_)));
    assert!(Order::find().all(&*app.state.db).await.unwrap().is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn failed_order_write_is_rolled_back_and_reported_for_reconciliation() {
    let app = TestApp::new().await;
    let buyer = app.buyer();
    let product_id = app.seed_product("Clay Mug", dec!(10.00)).await;

    let services = &app.state.services;
    services.cart.add_item(buyer.user_id, product_id, 1).await.unwrap();

    let session = services.checkout.begin(&buyer).await.unwrap();
    services
        .checkout
        .submit_shipping(&buyer, session.id, shipping_form())
        .await
        .unwrap();
    services
        .checkout
        .create_intent(&buyer, session.id)
        .await
        .unwrap();

    // Sabotage the line table so the commit transaction cannot finish.
    app.state
        .db
        .execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "DROP TABLE order_items;".to_string(),
        ))
        .await
        .unwrap();

    let outcome = services
        .checkout
        .submit_payment(&buyer, session.id, card())
        .await
        .unwrap();

    match outcome {
        PaymentSubmitOutcome::RecordingFailed {
            payment_reference,
            message,
        } => {
            assert_eq!(payment_reference, "pi_mock_1");
            assert!(message.contains("pi_mock_1"));
        }
        other => panic!("expected recording failure, got {:?}", other),
    }

    // The header insert was rolled back with the failed line insert.
    assert!(Order::find().all(&*app.state.db).await.unwrap().is_empty());
    // The cart is untouched for the retry-with-support path.
    assert_eq!(
        services.cart.list_lines(buyer.user_id).await.unwrap().len(),
        1
    );
}
