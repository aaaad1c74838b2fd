//! Order placement and lifecycle through the service layer.

use rust_decimal::dec;

use tableside_core::{
    MenuItemId, OrderAction, OrderStatus, PaymentMethod, Price, RestaurantId, UserId,
};
use tableside_server::error::AppError;
use tableside_server::notify::SentNotification;
use tableside_server::store::{OrderFilter, OrderStore};
use tableside_integration_tests::{
    ADMIN, CUSTOMER, OTHER_CUSTOMER, PAD_THAI, SPRING_ROLLS, STAFF_PIZZA, STAFF_THAI, THAI_CORNER,
    TestBackend, admin, customer, customer_without_email, staff,
};

async fn fill_thai_cart(backend: &TestBackend, caller: &tableside_core::CallerIdentity) {
    backend
        .carts
        .add_item(
            caller,
            RestaurantId::new(THAI_CORNER),
            MenuItemId::new(PAD_THAI),
            2,
        )
        .await
        .expect("add pad thai");
    backend
        .carts
        .add_item(
            caller,
            RestaurantId::new(THAI_CORNER),
            MenuItemId::new(SPRING_ROLLS),
            1,
        )
        .await
        .expect("add spring rolls");
}

#[tokio::test]
async fn on_delivery_order_places_immediately() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;

    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");

    assert_eq!(placed.order.status, OrderStatus::Placed);
    assert_eq!(placed.order.total_price.amount, dec!(31.48));
    assert_eq!(placed.order.lines.len(), 2);
    assert!(placed.payment.is_none());

    // The cart is consumed by placement.
    let cart = backend.carts.get_cart(&caller).await.expect("get cart");
    assert!(cart.is_empty());

    // The restaurant hears about it right away.
    assert!(matches!(
        backend.notifier.sent().as_slice(),
        [SentNotification::NewOrder { restaurant_id, .. }]
            if *restaurant_id == RestaurantId::new(THAI_CORNER)
    ));
}

#[tokio::test]
async fn card_order_waits_for_payment() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;

    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::Card)
        .await
        .expect("place");

    assert_eq!(placed.order.status, OrderStatus::PendingPayment);
    let payment = placed.payment.expect("card orders get an intent");
    assert_eq!(payment.id, format!("pi_{}", placed.order.id));

    // Amount is charged in minor units.
    assert_eq!(backend.gateway.created(), vec![(placed.order.id, 3148)]);

    // No restaurant notification until the payment settles.
    assert!(backend.notifier.sent().is_empty());
}

#[tokio::test]
async fn card_order_requires_email() {
    let backend = TestBackend::new();
    let caller = customer_without_email(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;

    let err = backend
        .orders
        .place_order(&caller, PaymentMethod::Card)
        .await
        .expect_err("no email on file");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Nothing committed; the cart is still intact.
    let cart = backend.carts.get_cart(&caller).await.expect("get cart");
    assert_eq!(cart.line_count(), 2);
}

#[tokio::test]
async fn empty_cart_cannot_be_placed() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);

    let err = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect_err("nothing to order");
    assert!(matches!(err, AppError::EmptyCart));
}

#[tokio::test]
async fn failed_placement_leaves_cart_intact() {
    let backend = TestBackend::with_failing_placement();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;

    let err = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect_err("storage refuses placement");
    assert!(matches!(err, AppError::Store(_)));

    let cart = backend.carts.get_cart(&caller).await.expect("get cart");
    assert_eq!(cart.line_count(), 2);
    assert_eq!(cart.total_price().amount, dec!(31.48));
}

#[tokio::test]
async fn intent_failure_marks_order_failed() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    backend.gateway.fail_next();

    let err = backend
        .orders
        .place_order(&caller, PaymentMethod::Card)
        .await
        .expect_err("processor refuses the intent");
    assert!(matches!(err, AppError::Payment(_)));

    // The order stays on file as FAILED rather than disappearing.
    let orders = backend
        .orders
        .list_my_orders(&caller, &OrderFilter::new())
        .await
        .expect("list");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
}

#[tokio::test]
async fn placed_orders_are_insulated_from_menu_edits() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;

    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");

    backend.menu.set_price(
        MenuItemId::new(PAD_THAI),
        Price::new(dec!(99.99), tableside_core::CurrencyCode::USD),
    );

    let order = backend
        .orders
        .get_order(&caller, placed.order.id)
        .await
        .expect("reload");
    assert_eq!(order.total_price.amount, dec!(31.48));
    assert_eq!(order.lines[0].unit_price.amount, dec!(12.99));
}

#[tokio::test]
async fn staff_drive_the_fulfillment_path() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let id = placed.order.id;
    let chef = staff(STAFF_THAI);

    let order = backend
        .orders
        .transition(&chef, id, OrderAction::Confirm)
        .await
        .expect("confirm");
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(order.confirmed_at.is_some());

    backend
        .orders
        .transition(&chef, id, OrderAction::MarkPreparing)
        .await
        .expect("preparing");
    backend
        .orders
        .transition(&chef, id, OrderAction::MarkReady)
        .await
        .expect("ready");
    let order = backend
        .orders
        .transition(&chef, id, OrderAction::MarkPickedUp)
        .await
        .expect("picked up");

    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.preparing_at.is_some());
    assert!(order.ready_at.is_some());
    assert!(order.delivered_at.is_some());
    assert!(order.out_for_delivery_at.is_none());
}

#[tokio::test]
async fn lifecycle_actions_enforce_the_staff_guard() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let id = placed.order.id;

    // The customer cannot confirm their own order.
    let err = backend
        .orders
        .transition(&caller, id, OrderAction::Confirm)
        .await
        .expect_err("customer is not staff");
    assert!(matches!(err, AppError::Forbidden(_)));

    // Staff of a different restaurant cannot either.
    let err = backend
        .orders
        .transition(&staff(STAFF_PIZZA), id, OrderAction::Confirm)
        .await
        .expect_err("wrong roster");
    assert!(matches!(err, AppError::Forbidden(_)));

    // Payment actions are never user-invocable, even for roster staff.
    let err = backend
        .orders
        .transition(&staff(STAFF_THAI), id, OrderAction::CapturePayment)
        .await
        .expect_err("processor-only action");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn repeated_transition_conflicts() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let chef = staff(STAFF_THAI);

    backend
        .orders
        .transition(&chef, placed.order.id, OrderAction::Confirm)
        .await
        .expect("first confirm");
    let err = backend
        .orders
        .transition(&chef, placed.order.id, OrderAction::Confirm)
        .await
        .expect_err("second confirm");
    assert!(matches!(err, AppError::IllegalOrderState(_)));
}

#[tokio::test]
async fn cancellation_windows_differ_by_actor() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    let chef = staff(STAFF_THAI);

    // Customer may cancel while PLACED.
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let order = backend
        .orders
        .cancel(&caller, placed.order.id)
        .await
        .expect("owner cancel");
    assert_eq!(order.status, OrderStatus::CancelledByUser);
    assert!(order.cancelled_at.is_some());

    // Once PREPARING, the customer's window has closed...
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    backend
        .orders
        .transition(&chef, placed.order.id, OrderAction::Confirm)
        .await
        .expect("confirm");
    backend
        .orders
        .transition(&chef, placed.order.id, OrderAction::MarkPreparing)
        .await
        .expect("preparing");
    let err = backend
        .orders
        .cancel(&caller, placed.order.id)
        .await
        .expect_err("too late for the customer");
    assert!(matches!(err, AppError::IllegalOrderState(_)));

    // ...but the restaurant can still pull it.
    let order = backend
        .orders
        .cancel(&chef, placed.order.id)
        .await
        .expect("restaurant cancel");
    assert_eq!(order.status, OrderStatus::CancelledByRestaurant);

    // Bystanders get nothing.
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let err = backend
        .orders
        .cancel(&customer(OTHER_CUSTOMER), placed.order.id)
        .await
        .expect_err("stranger cancel");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn order_visibility_follows_ownership_and_roster() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");
    let id = placed.order.id;

    assert!(backend.orders.get_order(&caller, id).await.is_ok());
    assert!(backend.orders.get_order(&staff(STAFF_THAI), id).await.is_ok());
    assert!(backend.orders.get_order(&admin(ADMIN), id).await.is_ok());

    let err = backend
        .orders
        .get_order(&customer(OTHER_CUSTOMER), id)
        .await
        .expect_err("not their order");
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = backend
        .orders
        .get_order(&caller, tableside_core::OrderId::new(9999))
        .await
        .expect_err("unknown order");
    assert!(matches!(err, AppError::OrderNotFound(_)));
}

#[tokio::test]
async fn listings_filter_and_paginate() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    let chef = staff(STAFF_THAI);

    for _ in 0..3 {
        fill_thai_cart(&backend, &caller).await;
        backend
            .orders
            .place_order(&caller, PaymentMethod::OnDelivery)
            .await
            .expect("place");
    }
    // Advance one of them so a status filter has something to split on.
    let first_id = backend
        .orders
        .list_my_orders(&caller, &OrderFilter::new())
        .await
        .expect("list")
        .last()
        .map(|o| o.id)
        .expect("oldest order");
    backend
        .orders
        .transition(&chef, first_id, OrderAction::Confirm)
        .await
        .expect("confirm");

    let placed_only = backend
        .orders
        .list_my_orders(
            &caller,
            &OrderFilter {
                status: Some(OrderStatus::Placed),
                ..OrderFilter::new()
            },
        )
        .await
        .expect("filtered list");
    assert_eq!(placed_only.len(), 2);

    let page2 = backend
        .orders
        .list_my_orders(
            &caller,
            &OrderFilter {
                page: 2,
                per_page: 2,
                ..OrderFilter::new()
            },
        )
        .await
        .expect("page 2");
    assert_eq!(page2.len(), 1);

    // The restaurant sees the same orders through its own scope.
    let incoming = backend
        .orders
        .list_restaurant_orders(&chef, RestaurantId::new(THAI_CORNER), &OrderFilter::new())
        .await
        .expect("restaurant list");
    assert_eq!(incoming.len(), 3);

    // Admins may read any restaurant's queue; other staff may not.
    assert!(
        backend
            .orders
            .list_restaurant_orders(
                &admin(ADMIN),
                RestaurantId::new(THAI_CORNER),
                &OrderFilter::new()
            )
            .await
            .is_ok()
    );
    let err = backend
        .orders
        .list_restaurant_orders(
            &staff(STAFF_PIZZA),
            RestaurantId::new(THAI_CORNER),
            &OrderFilter::new(),
        )
        .await
        .expect_err("wrong roster");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn admins_may_list_another_customers_history() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");

    let listed = backend
        .orders
        .list_orders_for(&admin(ADMIN), UserId::new(CUSTOMER), &OrderFilter::new())
        .await
        .expect("admin list");
    assert_eq!(listed.len(), 1);

    let err = backend
        .orders
        .list_orders_for(
            &customer(OTHER_CUSTOMER),
            UserId::new(CUSTOMER),
            &OrderFilter::new(),
        )
        .await
        .expect_err("stranger");
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn orders_survive_as_audit_records() {
    let backend = TestBackend::new();
    let caller = customer(CUSTOMER);
    fill_thai_cart(&backend, &caller).await;
    let placed = backend
        .orders
        .place_order(&caller, PaymentMethod::OnDelivery)
        .await
        .expect("place");

    backend
        .orders
        .cancel(&caller, placed.order.id)
        .await
        .expect("cancel");

    // Cancelled orders remain queryable through the store.
    let stored = backend
        .store
        .get_order(placed.order.id)
        .await
        .expect("store read")
        .expect("still there");
    assert_eq!(stored.status, OrderStatus::CancelledByUser);
}
