//! Cart service.
//!
//! Wraps the cart aggregate with menu validation and persistence. A
//! customer who has never touched their cart still gets a well-formed empty
//! one back; "no cart row" is a storage detail, not an API state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use tableside_core::{AddOutcome, Cart, CartError, CallerIdentity, MenuItemId, RestaurantId, UserId};

use crate::error::{AppError, Result};
use crate::menu::MenuLookup;
use crate::store::Storage;

/// Per-customer mutation locks. Every cart write is a read-modify-write
/// against the store; without mutual exclusion two concurrent mutations read
/// the same snapshot and the later upsert drops the earlier one.
#[derive(Default)]
struct CartLocks {
    map: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl CartLocks {
    async fn acquire(&self, owner: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.map.lock().await;
            Arc::clone(map.entry(owner).or_default())
        };
        lock.lock_owned().await
    }
}

/// Manages customers' draft carts.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Storage>,
    menu: Arc<dyn MenuLookup>,
    locks: Arc<CartLocks>,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn Storage>, menu: Arc<dyn MenuLookup>) -> Self {
        Self {
            store,
            menu,
            locks: Arc::new(CartLocks::default()),
        }
    }

    /// Add a menu item to the caller's cart.
    ///
    /// The item is validated against the live menu at add-time; its name and
    /// price are snapshotted into the cart line. Adding from a restaurant
    /// other than the cart's bound one resets the cart first, which the
    /// returned [`AddOutcome`] reports.
    pub async fn add_item(
        &self,
        caller: &CallerIdentity,
        restaurant_id: RestaurantId,
        menu_item_id: MenuItemId,
        quantity: u32,
    ) -> Result<(Cart, AddOutcome)> {
        let details = self
            .menu
            .get_menu_item(menu_item_id, restaurant_id)
            .await?
            .ok_or(AppError::ItemUnavailable(menu_item_id))?;

        if !details.available {
            return Err(AppError::ItemUnavailable(menu_item_id));
        }
        // The lookup is restaurant-scoped, but the port is external; never
        // trust its routing over the snapshot it returned.
        if details.restaurant_id != restaurant_id {
            return Err(AppError::RestaurantMismatch);
        }

        let _guard = self.locks.acquire(caller.user_id).await;
        let mut cart = self
            .store
            .get_cart(caller.user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(caller.user_id));

        let outcome = cart
            .add_item(&details.snapshot(), quantity)
            .map_err(map_cart_error)?;
        if outcome.reset {
            tracing::info!(
                user_id = %caller.user_id,
                restaurant_id = %restaurant_id,
                "Cart reset on cross-restaurant add"
            );
        }

        self.store.upsert_cart(&cart).await?;
        Ok((cart, outcome))
    }

    /// The caller's cart; an empty one if none is stored.
    pub async fn get_cart(&self, caller: &CallerIdentity) -> Result<Cart> {
        Ok(self
            .store
            .get_cart(caller.user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(caller.user_id)))
    }

    /// Replace the quantity of an existing cart line.
    pub async fn set_quantity(
        &self,
        caller: &CallerIdentity,
        menu_item_id: MenuItemId,
        quantity: u32,
    ) -> Result<Cart> {
        let _guard = self.locks.acquire(caller.user_id).await;
        let mut cart = self
            .store
            .get_cart(caller.user_id)
            .await?
            .ok_or(AppError::CartNotFound)?;

        cart.set_quantity(menu_item_id, quantity)
            .map_err(map_cart_error)?;
        self.store.upsert_cart(&cart).await?;
        Ok(cart)
    }

    /// Remove a line from the caller's cart.
    pub async fn remove_item(
        &self,
        caller: &CallerIdentity,
        menu_item_id: MenuItemId,
    ) -> Result<Cart> {
        let _guard = self.locks.acquire(caller.user_id).await;
        let mut cart = self
            .store
            .get_cart(caller.user_id)
            .await?
            .ok_or(AppError::CartNotFound)?;

        cart.remove_line(menu_item_id).map_err(map_cart_error)?;
        if cart.is_empty() {
            self.store.delete_cart(caller.user_id).await?;
        } else {
            self.store.upsert_cart(&cart).await?;
        }
        Ok(cart)
    }

    /// Drop the caller's cart entirely. Idempotent.
    pub async fn clear(&self, caller: &CallerIdentity) -> Result<()> {
        let _guard = self.locks.acquire(caller.user_id).await;
        self.store.delete_cart(caller.user_id).await?;
        Ok(())
    }
}

fn map_cart_error(err: CartError) -> AppError {
    match err {
        CartError::LineNotFound(id) => AppError::LineNotFound(id),
        CartError::InvalidQuantity => AppError::InvalidQuantity,
    }
}
