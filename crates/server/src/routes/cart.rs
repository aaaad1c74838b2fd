//! Cart route handlers.
//!
//! All cart endpoints act on the authenticated caller's own cart; there is
//! no way to address another customer's cart from this surface.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use tableside_core::{Cart, MenuItemId, Price, RestaurantId};

use crate::error::Result;
use crate::middleware::Identity;
use crate::state::AppState;

/// One cart line as the API returns it.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
}

/// The cart's bound restaurant.
#[derive(Debug, Serialize)]
pub struct RestaurantView {
    pub id: RestaurantId,
    pub name: String,
}

/// Cart response body.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub restaurant: Option<RestaurantView>,
    pub lines: Vec<CartLineView>,
    pub total_price: Price,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            restaurant: cart.restaurant().map(|r| RestaurantView {
                id: r.id,
                name: r.name.clone(),
            }),
            lines: cart
                .lines()
                .map(|l| CartLineView {
                    menu_item_id: l.menu_item_id,
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    line_total: l.line_total(),
                })
                .collect(),
            total_price: cart.total_price(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub restaurant_id: RestaurantId,
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
}

/// Add response; `reset` reports the cross-restaurant cart reset.
#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    #[serde(flatten)]
    pub cart: CartView,
    pub reset: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// `POST /cart/items`
pub async fn add_item(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<AddItemResponse>> {
    let (cart, outcome) = state
        .carts()
        .add_item(
            &caller,
            request.restaurant_id,
            request.menu_item_id,
            request.quantity,
        )
        .await?;
    Ok(Json(AddItemResponse {
        cart: CartView::from(&cart),
        reset: outcome.reset,
    }))
}

/// `GET /cart`
pub async fn get_cart(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<CartView>> {
    let cart = state.carts().get_cart(&caller).await?;
    Ok(Json(CartView::from(&cart)))
}

/// `PATCH /cart/items/{menu_item_id}`
pub async fn update_quantity(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(menu_item_id): Path<MenuItemId>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>> {
    let cart = state
        .carts()
        .set_quantity(&caller, menu_item_id, request.quantity)
        .await?;
    Ok(Json(CartView::from(&cart)))
}

/// `DELETE /cart/items/{menu_item_id}`
pub async fn remove_item(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(menu_item_id): Path<MenuItemId>,
) -> Result<Json<CartView>> {
    let cart = state.carts().remove_item(&caller, menu_item_id).await?;
    Ok(Json(CartView::from(&cart)))
}

/// `DELETE /cart`
pub async fn clear_cart(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<StatusCode> {
    state.carts().clear(&caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
