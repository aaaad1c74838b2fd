//! Menu lookup port.
//!
//! The menu catalog is owned by another service; this module consumes it as
//! a read-only capability returning denormalized item details. Production
//! uses [`HttpMenuClient`]; tests and dev use [`StaticMenu`].

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use tableside_core::{MenuItemId, MenuSnapshot, Price, RestaurantId};

/// Errors from the menu catalog service.
#[derive(Debug, Error)]
pub enum MenuError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Details for a single menu item, as the catalog returns them.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuItemDetails {
    pub id: MenuItemId,
    pub name: String,
    pub price: Price,
    pub restaurant_id: RestaurantId,
    pub restaurant_name: String,
    pub available: bool,
}

impl MenuItemDetails {
    /// Snapshot for the cart aggregate.
    #[must_use]
    pub fn snapshot(&self) -> MenuSnapshot {
        MenuSnapshot {
            menu_item_id: self.id,
            name: self.name.clone(),
            unit_price: self.price,
            restaurant_id: self.restaurant_id,
            restaurant_name: self.restaurant_name.clone(),
        }
    }
}

/// Read-only menu item lookup.
#[async_trait]
pub trait MenuLookup: Send + Sync {
    /// Fetch a menu item scoped to a restaurant.
    ///
    /// Returns `Ok(None)` when the item does not exist in that restaurant's
    /// menu; availability is reported, not filtered, so callers can
    /// distinguish "missing" from "unavailable".
    async fn get_menu_item(
        &self,
        menu_item_id: MenuItemId,
        restaurant_id: RestaurantId,
    ) -> Result<Option<MenuItemDetails>, MenuError>;
}

/// HTTP client against the menu catalog service.
#[derive(Clone)]
pub struct HttpMenuClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMenuClient {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl MenuLookup for HttpMenuClient {
    async fn get_menu_item(
        &self,
        menu_item_id: MenuItemId,
        restaurant_id: RestaurantId,
    ) -> Result<Option<MenuItemDetails>, MenuError> {
        let url = format!(
            "{}/restaurants/{restaurant_id}/menu-items/{menu_item_id}",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(MenuError::Api { status, message });
        }

        let details: MenuItemDetails = response
            .json()
            .await
            .map_err(|e| MenuError::Parse(e.to_string()))?;
        Ok(Some(details))
    }
}

/// Fixed in-memory menu for tests and local development.
///
/// Items sit behind a lock so tests can edit prices through a shared
/// handle and assert that placed orders are insulated from the change.
#[derive(Debug, Default)]
pub struct StaticMenu {
    items: std::sync::RwLock<Vec<MenuItemDetails>>,
}

impl StaticMenu {
    #[must_use]
    pub fn new(items: Vec<MenuItemDetails>) -> Self {
        Self {
            items: std::sync::RwLock::new(items),
        }
    }

    /// Replace an item's price, simulating a later menu edit.
    pub fn set_price(&self, menu_item_id: MenuItemId, price: Price) {
        let mut items = self.items.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        for item in items.iter_mut() {
            if item.id == menu_item_id {
                item.price = price;
            }
        }
    }

    /// Flip an item's availability flag.
    pub fn set_available(&self, menu_item_id: MenuItemId, available: bool) {
        let mut items = self.items.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        for item in items.iter_mut() {
            if item.id == menu_item_id {
                item.available = available;
            }
        }
    }
}

#[async_trait]
impl MenuLookup for StaticMenu {
    async fn get_menu_item(
        &self,
        menu_item_id: MenuItemId,
        restaurant_id: RestaurantId,
    ) -> Result<Option<MenuItemDetails>, MenuError> {
        let items = self.items.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(items
            .iter()
            .find(|i| i.id == menu_item_id && i.restaurant_id == restaurant_id)
            .cloned())
    }
}
