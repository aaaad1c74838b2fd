//! The cart aggregate.
//!
//! A cart is a customer's pending, uncommitted selection of menu items for
//! exactly one restaurant. All mutation goes through the methods here so the
//! two cart invariants hold everywhere:
//!
//! 1. Every line belongs to the cart's bound restaurant. Adding an item from
//!    a different restaurant resets the cart first - a deliberate policy, not
//!    silent merging.
//! 2. `total_price` is always the recomputed sum of line totals; it is never
//!    assigned independently.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CurrencyCode, MenuItemId, Price, RestaurantId, UserId};

/// Cart mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The referenced line is not in the cart.
    #[error("menu item {0} is not in the cart")]
    LineNotFound(MenuItemId),

    /// Quantities must be at least 1; removal is a dedicated operation.
    #[error("quantity must be at least 1")]
    InvalidQuantity,
}

/// Denormalized menu item data captured at add-time.
///
/// This is the shape the Menu Lookup port returns; the cart snapshots name
/// and price from it so later menu edits never alter a pending cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSnapshot {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub unit_price: Price,
    pub restaurant_id: RestaurantId,
    pub restaurant_name: String,
}

/// One line in a cart, keyed by menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub menu_item_id: MenuItemId,
    /// Name snapshot taken when the line was added.
    pub name: String,
    pub quantity: u32,
    /// Price snapshot taken when the line was added.
    pub unit_price: Price,
}

impl CartLine {
    /// The line total: `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// The restaurant a cart is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartRestaurant {
    pub id: RestaurantId,
    pub name: String,
}

/// A customer's cart. One cart per customer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    owner: UserId,
    /// `None` means the cart is unset (no lines, no restaurant binding).
    restaurant: Option<CartRestaurant>,
    lines: BTreeMap<MenuItemId, CartLine>,
    total_price: Price,
}

/// Outcome of [`Cart::add_item`], so callers can observe the reset policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// True when the cart was bound to a different restaurant and was
    /// cleared before the new line was added.
    pub reset: bool,
}

impl Cart {
    /// A well-formed empty cart: zero lines, no restaurant, zero total.
    #[must_use]
    pub fn empty(owner: UserId) -> Self {
        Self {
            owner,
            restaurant: None,
            lines: BTreeMap::new(),
            total_price: Price::zero(CurrencyCode::default()),
        }
    }

    /// Reconstruct a cart from stored parts, recomputing the total.
    ///
    /// Used by store backends when loading; the persisted total is ignored
    /// in favor of the recomputed sum.
    #[must_use]
    pub fn from_parts(
        owner: UserId,
        restaurant: Option<CartRestaurant>,
        lines: Vec<CartLine>,
    ) -> Self {
        let mut cart = Self {
            owner,
            restaurant,
            lines: lines.into_iter().map(|l| (l.menu_item_id, l)).collect(),
            total_price: Price::zero(CurrencyCode::default()),
        };
        if cart.lines.is_empty() {
            cart.restaurant = None;
        }
        cart.recompute_total();
        cart
    }

    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub const fn restaurant(&self) -> Option<&CartRestaurant> {
        self.restaurant.as_ref()
    }

    /// Lines in menu-item order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    #[must_use]
    pub fn line(&self, menu_item_id: MenuItemId) -> Option<&CartLine> {
        self.lines.get(&menu_item_id)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub const fn total_price(&self) -> Price {
        self.total_price
    }

    /// Add an item, merging quantity into an existing line for the same
    /// menu item.
    ///
    /// If the cart is bound to a different restaurant than the item, the
    /// cart is reset (all lines cleared, restaurant rebound) before the new
    /// line is added; the returned [`AddOutcome`] reports this.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] when `quantity` is zero.
    pub fn add_item(&mut self, item: &MenuSnapshot, quantity: u32) -> Result<AddOutcome, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let reset = match &self.restaurant {
            Some(bound) if bound.id != item.restaurant_id => {
                self.lines.clear();
                true
            }
            _ => false,
        };

        if reset || self.restaurant.is_none() {
            self.restaurant = Some(CartRestaurant {
                id: item.restaurant_id,
                name: item.restaurant_name.clone(),
            });
        }

        self.lines
            .entry(item.menu_item_id)
            .and_modify(|line| line.quantity = line.quantity.saturating_add(quantity))
            .or_insert_with(|| CartLine {
                menu_item_id: item.menu_item_id,
                name: item.name.clone(),
                quantity,
                unit_price: item.unit_price,
            });

        self.recompute_total();
        Ok(AddOutcome { reset })
    }

    /// Replace the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for zero (use
    /// [`Cart::remove_line`]) and [`CartError::LineNotFound`] when the item
    /// is not in the cart.
    pub fn set_quantity(&mut self, menu_item_id: MenuItemId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let line = self
            .lines
            .get_mut(&menu_item_id)
            .ok_or(CartError::LineNotFound(menu_item_id))?;
        line.quantity = quantity;
        self.recompute_total();
        Ok(())
    }

    /// Remove a line. If this empties the cart, the restaurant binding is
    /// cleared too (the cart becomes unset, not empty-with-stale-restaurant).
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] when the item is not in the cart.
    pub fn remove_line(&mut self, menu_item_id: MenuItemId) -> Result<(), CartError> {
        self.lines
            .remove(&menu_item_id)
            .ok_or(CartError::LineNotFound(menu_item_id))?;
        if self.lines.is_empty() {
            self.restaurant = None;
        }
        self.recompute_total();
        Ok(())
    }

    fn recompute_total(&mut self) {
        // Restaurant exclusivity guarantees a single currency per cart.
        let currency = self
            .lines
            .values()
            .next()
            .map_or_else(CurrencyCode::default, |l| l.unit_price.currency_code);
        let amount: Decimal = self.lines.values().map(|l| l.line_total().amount).sum();
        self.total_price = Price::new(amount, currency);
    }
}
