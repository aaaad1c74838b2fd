//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness check
//! GET  /health/ready                    - Readiness check (store connectivity)
//!
//! # Cart (acts on the caller's own cart)
//! GET    /cart                          - Current cart (empty if none)
//! POST   /cart/items                    - Add a menu item
//! PATCH  /cart/items/{menu_item_id}     - Change a line's quantity
//! DELETE /cart/items/{menu_item_id}     - Remove a line
//! DELETE /cart                          - Clear the cart
//!
//! # Orders
//! POST /orders                          - Place an order from the cart
//! GET  /orders                          - Caller's order history (admins: ?customer_id=)
//! GET  /orders/{id}                     - One order
//! GET  /restaurants/{id}/orders         - Restaurant's orders (staff)
//!
//! # Lifecycle (staff unless noted)
//! POST /orders/{id}/confirm             - PLACED -> CONFIRMED
//! POST /orders/{id}/preparing           - CONFIRMED -> PREPARING
//! POST /orders/{id}/ready               - PREPARING -> READY_FOR_PICKUP
//! POST /orders/{id}/out-for-delivery    - READY_FOR_PICKUP -> OUT_FOR_DELIVERY
//! POST /orders/{id}/picked-up           - READY_FOR_PICKUP -> DELIVERED
//! POST /orders/{id}/delivered           - OUT_FOR_DELIVERY -> DELIVERED
//! POST /orders/{id}/cancel              - Owner or staff, per policy
//!
//! # Webhooks (signature-authenticated, no user identity)
//! POST /webhooks/payments               - Payment processor events
//! ```

pub mod cart;
pub mod orders;
pub mod webhooks;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{menu_item_id}",
            delete(cart::remove_item).patch(cart::update_quantity),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::place_order).get(orders::list_my_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/confirm", post(orders::confirm))
        .route("/orders/{id}/preparing", post(orders::mark_preparing))
        .route("/orders/{id}/ready", post(orders::mark_ready))
        .route("/orders/{id}/out-for-delivery", post(orders::mark_out_for_delivery))
        .route("/orders/{id}/picked-up", post(orders::mark_picked_up))
        .route("/orders/{id}/delivered", post(orders::complete_delivery))
        .route("/orders/{id}/cancel", post(orders::cancel))
        .route(
            "/restaurants/{restaurant_id}/orders",
            get(orders::list_restaurant_orders),
        )
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(webhooks::payment_events))
}

/// Create the complete application router (health endpoints excluded).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(cart_routes())
        .merge(order_routes())
        .merge(webhook_routes())
}
