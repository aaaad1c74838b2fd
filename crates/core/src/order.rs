//! The order aggregate.
//!
//! An order is the record of a committed transaction: its lines and total
//! are an immutable snapshot of the cart at placement time, insulated from
//! later menu price changes. Only the status (and its per-transition
//! timestamps) mutate, and only through the lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::Cart;
use crate::status::OrderStatus;
use crate::types::{MenuItemId, OrderId, Price, RestaurantId, UserId};

/// Order construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Orders can only be created from a non-empty cart.
    #[error("cart is empty")]
    EmptyCart,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card via the payment processor; the order waits in `PENDING_PAYMENT`
    /// until the processor's asynchronous confirmation.
    #[default]
    Card,
    /// Pay at pickup or on delivery; the order is placed immediately.
    OnDelivery,
}

impl PaymentMethod {
    /// The status a freshly placed order starts in.
    #[must_use]
    pub const fn initial_status(self) -> OrderStatus {
        match self {
            Self::Card => OrderStatus::PendingPayment,
            Self::OnDelivery => OrderStatus::Placed,
        }
    }
}

/// One line of an order. Immutable once the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_item_id: MenuItemId,
    /// Name snapshot at commit time.
    pub name: String,
    pub quantity: u32,
    /// Price snapshot at commit time.
    pub unit_price: Price,
    pub line_total: Price,
}

/// An order ready to be persisted; the store assigns the ID and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub lines: Vec<OrderLine>,
    pub total_price: Price,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Snapshot a non-empty cart into a new order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyCart`] when the cart has no lines.
    pub fn from_cart(cart: &Cart, payment_method: PaymentMethod) -> Result<Self, OrderError> {
        let restaurant = cart.restaurant().ok_or(OrderError::EmptyCart)?;
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let lines = cart
            .lines()
            .map(|l| OrderLine {
                menu_item_id: l.menu_item_id,
                name: l.name.clone(),
                quantity: l.quantity,
                unit_price: l.unit_price,
                line_total: l.line_total(),
            })
            .collect();

        Ok(Self {
            customer_id: cart.owner(),
            restaurant_id: restaurant.id,
            lines,
            total_price: cart.total_price(),
            status: payment_method.initial_status(),
        })
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub lines: Vec<OrderLine>,
    pub total_price: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub preparing_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub out_for_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Record a status change, stamping the matching timestamp field.
    ///
    /// Each timestamp is set at most once; the caller (the lifecycle engine
    /// via the store's compare-and-set) guarantees the transition itself is
    /// legal.
    pub fn record_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        let slot = match status {
            OrderStatus::Confirmed => Some(&mut self.confirmed_at),
            OrderStatus::Preparing => Some(&mut self.preparing_at),
            OrderStatus::ReadyForPickup => Some(&mut self.ready_at),
            OrderStatus::OutForDelivery => Some(&mut self.out_for_delivery_at),
            OrderStatus::Delivered => Some(&mut self.delivered_at),
            OrderStatus::CancelledByUser | OrderStatus::CancelledByRestaurant => {
                Some(&mut self.cancelled_at)
            }
            OrderStatus::Failed => Some(&mut self.failed_at),
            // Creation time covers PENDING_PAYMENT and entry into PLACED.
            OrderStatus::PendingPayment | OrderStatus::Placed => None,
        };
        if let Some(slot) = slot
            && slot.is_none()
        {
            *slot = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::MenuSnapshot;
    use crate::types::CurrencyCode;
    use rust_decimal::dec;

    fn cart_with_lines() -> Cart {
        let mut cart = Cart::empty(UserId::new(5));
        cart.add_item(
            &MenuSnapshot {
                menu_item_id: MenuItemId::new(101),
                name: "pad thai".to_owned(),
                unit_price: Price::new(dec!(12.99), CurrencyCode::USD),
                restaurant_id: RestaurantId::new(1),
                restaurant_name: "thai corner".to_owned(),
            },
            2,
        )
        .expect("add");
        cart.add_item(
            &MenuSnapshot {
                menu_item_id: MenuItemId::new(102),
                name: "spring rolls".to_owned(),
                unit_price: Price::new(dec!(5.50), CurrencyCode::USD),
                restaurant_id: RestaurantId::new(1),
                restaurant_name: "thai corner".to_owned(),
            },
            1,
        )
        .expect("add");
        cart
    }

    #[test]
    fn test_from_cart_snapshots_lines() {
        let cart = cart_with_lines();
        let order = NewOrder::from_cart(&cart, PaymentMethod::OnDelivery).expect("non-empty");

        assert_eq!(order.customer_id, UserId::new(5));
        assert_eq!(order.restaurant_id, RestaurantId::new(1));
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_price.amount, dec!(31.48));
        assert_eq!(order.status, OrderStatus::Placed);

        let total: rust_decimal::Decimal = order.lines.iter().map(|l| l.line_total.amount).sum();
        assert_eq!(order.total_price.amount, total);
    }

    #[test]
    fn test_card_orders_start_pending_payment() {
        let cart = cart_with_lines();
        let order = NewOrder::from_cart(&cart, PaymentMethod::Card).expect("non-empty");
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[test]
    fn test_from_empty_cart_rejected() {
        let cart = Cart::empty(UserId::new(5));
        assert_eq!(
            NewOrder::from_cart(&cart, PaymentMethod::Card),
            Err(OrderError::EmptyCart)
        );
    }

    #[test]
    fn test_record_status_stamps_once() {
        let cart = cart_with_lines();
        let new = NewOrder::from_cart(&cart, PaymentMethod::OnDelivery).expect("non-empty");
        let t0 = Utc::now();
        let mut order = Order {
            id: OrderId::new(1),
            customer_id: new.customer_id,
            restaurant_id: new.restaurant_id,
            lines: new.lines,
            total_price: new.total_price,
            status: new.status,
            created_at: t0,
            confirmed_at: None,
            preparing_at: None,
            ready_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
            failed_at: None,
        };

        let t1 = t0 + chrono::Duration::seconds(10);
        order.record_status(OrderStatus::Confirmed, t1);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.confirmed_at, Some(t1));

        // A second stamp never overwrites the first.
        let t2 = t1 + chrono::Duration::seconds(10);
        order.record_status(OrderStatus::Confirmed, t2);
        assert_eq!(order.confirmed_at, Some(t1));
    }
}
