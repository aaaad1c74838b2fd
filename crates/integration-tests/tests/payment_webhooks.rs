//! Webhook reconciliation against the full service stack.

use tableside_core::{MenuItemId, OrderId, OrderStatus, PaymentMethod, RestaurantId};
use tableside_server::error::AppError;
use tableside_server::notify::SentNotification;
use tableside_server::store::OrderStore;
use tableside_integration_tests::{
    CUSTOMER, PAD_THAI, THAI_CORNER, TestBackend, customer,
};

async fn place_card_order(backend: &TestBackend) -> OrderId {
    let caller = customer(CUSTOMER);
    backend
        .carts
        .add_item(
            &caller,
            RestaurantId::new(THAI_CORNER),
            MenuItemId::new(PAD_THAI),
            2,
        )
        .await
        .expect("add");
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::Card)
        .await
        .expect("place");
    placed.order.id
}

fn success_event(event_id: &str, order_id: OrderId) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": format!("pi_{order_id}"),
                "amount": 2598,
                "currency": "usd",
                "metadata": {
                    "order_id": order_id.to_string(),
                    "customer_email": format!("user{CUSTOMER}@example.com"),
                }
            }
        }
    })
    .to_string()
}

fn failure_event(event_id: &str, order_id: OrderId) -> String {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.payment_failed",
        "data": {
            "object": {
                "id": format!("pi_{order_id}"),
                "amount": 2598,
                "currency": "usd",
                "metadata": {
                    "order_id": order_id.to_string(),
                    "customer_email": format!("user{CUSTOMER}@example.com"),
                },
                "last_payment_error": {"message": "insufficient funds"}
            }
        }
    })
    .to_string()
}

async fn deliver(backend: &TestBackend, body: &str) -> Result<(), AppError> {
    let signature = backend.sign(body.as_bytes());
    backend
        .reconciler
        .handle_webhook(body.as_bytes(), Some(&signature))
        .await
}

#[tokio::test]
async fn successful_payment_places_the_order() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;

    deliver(&backend, &success_event("evt_1", order_id))
        .await
        .expect("webhook accepted");

    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Placed);

    let sent = backend.notifier.sent();
    assert!(sent.iter().any(|n| matches!(
        n,
        SentNotification::PaymentSuccess { order_id: id, .. } if *id == order_id
    )));
    assert!(sent.iter().any(|n| matches!(
        n,
        SentNotification::NewPaidOrder { order_id: id, restaurant_id }
            if *id == order_id && *restaurant_id == RestaurantId::new(THAI_CORNER)
    )));
}

#[tokio::test]
async fn duplicate_events_settle_once() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;
    let body = success_event("evt_dup", order_id);

    deliver(&backend, &body).await.expect("first delivery");
    deliver(&backend, &body).await.expect("redelivery");

    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Placed);

    // Exactly one round of notifications despite two deliveries.
    let successes = backend
        .notifier
        .sent()
        .iter()
        .filter(|n| matches!(n, SentNotification::PaymentSuccess { .. }))
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn redelivery_with_fresh_event_id_is_still_a_noop() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;

    deliver(&backend, &success_event("evt_a", order_id))
        .await
        .expect("first delivery");
    // The processor may re-emit under a new event ID; the order has already
    // left PENDING_PAYMENT, so nothing further happens.
    deliver(&backend, &success_event("evt_b", order_id))
        .await
        .expect("second delivery acknowledged");

    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Placed);

    let successes = backend
        .notifier
        .sent()
        .iter()
        .filter(|n| matches!(n, SentNotification::PaymentSuccess { .. }))
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn unsigned_and_tampered_payloads_rejected() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;
    let body = success_event("evt_1", order_id);

    let err = backend
        .reconciler
        .handle_webhook(body.as_bytes(), None)
        .await
        .expect_err("missing signature");
    assert!(matches!(err, AppError::SignatureInvalid(_)));

    // A signature over different bytes does not transfer.
    let other_signature = backend.sign(b"{}");
    let err = backend
        .reconciler
        .handle_webhook(body.as_bytes(), Some(&other_signature))
        .await
        .expect_err("tampered payload");
    assert!(matches!(err, AppError::SignatureInvalid(_)));

    // The order never moved.
    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert!(backend.notifier.sent().is_empty());
}

#[tokio::test]
async fn malformed_but_verified_payload_is_a_bad_request() {
    let backend = TestBackend::new();
    let err = deliver(&backend, "this is not json").await.expect_err("garbage");
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn unknown_types_and_missing_correlation_are_acknowledged() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;

    let unknown = serde_json::json!({
        "id": "evt_u",
        "type": "charge.refunded",
        "data": {
            "object": {
                "id": format!("pi_{order_id}"),
                "metadata": {"order_id": order_id.to_string()}
            }
        }
    })
    .to_string();
    deliver(&backend, &unknown).await.expect("unknown type is 200");

    let uncorrelated = r#"{"id": "evt_m", "type": "payment_intent.succeeded", "data": {"object": {"id": "pi_x", "metadata": {}}}}"#;
    deliver(&backend, uncorrelated)
        .await
        .expect("missing metadata is 200");

    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert!(backend.notifier.sent().is_empty());
}

#[tokio::test]
async fn failed_payment_fails_the_order() {
    let backend = TestBackend::new();
    let order_id = place_card_order(&backend).await;

    deliver(&backend, &failure_event("evt_f", order_id))
        .await
        .expect("webhook accepted");

    let order = backend
        .store
        .get_order(order_id)
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order.status, OrderStatus::Failed);
    assert!(order.failed_at.is_some());

    assert!(backend.notifier.sent().iter().any(|n| matches!(
        n,
        SentNotification::PaymentFailure { order_id: id, reason, .. }
            if *id == order_id && reason == "insufficient funds"
    )));
}

#[tokio::test]
async fn events_for_unknown_orders_are_acknowledged() {
    let backend = TestBackend::new();
    deliver(&backend, &success_event("evt_x", OrderId::new(424_242)))
        .await
        .expect("acknowledged, logged, dropped");
    assert!(backend.notifier.sent().is_empty());
}
