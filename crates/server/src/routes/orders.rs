//! Order route handlers.
//!
//! Orders serialize as their domain shape (lines, totals, status, per-step
//! timestamps); the status vocabulary on the wire is the SCREAMING_SNAKE
//! form of [`tableside_core::OrderStatus`].

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tableside_core::{Order, OrderAction, OrderId, OrderStatus, PaymentMethod, RestaurantId, UserId};

use crate::error::Result;
use crate::middleware::Identity;
use crate::state::AppState;
use crate::store::OrderFilter;

/// Page size cap for listings.
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize, Default)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// What the client needs to finish a card payment.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub order: Order,
    pub payment: Option<PaymentView>,
}

/// Listing filters; all optional and independently combinable.
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    /// Platform admins may list another customer's history.
    pub customer_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    fn into_filter(self) -> OrderFilter {
        let defaults = OrderFilter::new();
        OrderFilter {
            status: self.status,
            from: self.from,
            to: self.to,
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page: self
                .per_page
                .unwrap_or(defaults.per_page)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

/// `POST /orders`
pub async fn place_order(
    State(state): State<AppState>,
    Identity(caller): Identity,
    body: Option<Json<PlaceOrderRequest>>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let placed = state
        .orders()
        .place_order(&caller, request.payment_method)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PlacedOrderResponse {
            order: placed.order,
            payment: placed.payment.map(|p| PaymentView {
                intent_id: p.id,
                client_secret: p.client_secret,
            }),
        }),
    ))
}

/// `GET /orders`
pub async fn list_my_orders(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>> {
    let customer_id = query.customer_id.unwrap_or(caller.user_id);
    let orders = state
        .orders()
        .list_orders_for(&caller, customer_id, &query.into_filter())
        .await?;
    Ok(Json(orders))
}

/// `GET /orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get_order(&caller, id).await?))
}

/// `GET /restaurants/{restaurant_id}/orders`
pub async fn list_restaurant_orders(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(restaurant_id): Path<RestaurantId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>> {
    let orders = state
        .orders()
        .list_restaurant_orders(&caller, restaurant_id, &query.into_filter())
        .await?;
    Ok(Json(orders))
}

async fn transition(
    state: &AppState,
    caller: &tableside_core::CallerIdentity,
    id: OrderId,
    action: OrderAction,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().transition(caller, id, action).await?))
}

/// `POST /orders/{id}/confirm`
pub async fn confirm(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::Confirm).await
}

/// `POST /orders/{id}/preparing`
pub async fn mark_preparing(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::MarkPreparing).await
}

/// `POST /orders/{id}/ready`
pub async fn mark_ready(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::MarkReady).await
}

/// `POST /orders/{id}/out-for-delivery`
pub async fn mark_out_for_delivery(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::MarkOutForDelivery).await
}

/// `POST /orders/{id}/picked-up`
pub async fn mark_picked_up(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::MarkPickedUp).await
}

/// `POST /orders/{id}/delivered`
pub async fn complete_delivery(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    transition(&state, &caller, id, OrderAction::CompleteDelivery).await
}

/// `POST /orders/{id}/cancel`
///
/// Resolves to a customer or restaurant cancellation based on who is
/// calling; the service owns that policy.
pub async fn cancel(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().cancel(&caller, id).await?))
}
