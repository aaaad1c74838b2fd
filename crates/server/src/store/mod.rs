//! Cart and order persistence.
//!
//! Both stores are keyed, read-modify-write surfaces: carts by customer,
//! orders by order ID. The contract every backend must honor:
//!
//! - each read-modify-write cycle is atomic per key;
//! - [`Storage::place_order`] persists the order and clears the cart as one
//!   unit - if order persistence fails the cart is untouched;
//! - [`OrderStore::transition`] is a compare-and-set on the status column,
//!   so two racers on the same order cannot both succeed;
//! - orders are never deleted (audit trail).
//!
//! Backends: [`memory::MemoryStore`] for dev and tests,
//! [`postgres::PgStore`] for production. Service logic must not know which
//! backs it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tableside_core::{Cart, NewOrder, Order, OrderId, OrderStatus, RestaurantId, UserId};

/// Store operation failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// A status compare-and-set found a different current status.
    ///
    /// Surfaced by [`OrderStore::transition`] when another actor moved the
    /// order first; the lifecycle engine maps this to its Guard 1 failure.
    #[error("order {order_id} is {actual}, not {expected}")]
    StaleStatus {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a domain value.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Optional, independently combinable order list filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Restrict to one status.
    pub status: Option<OrderStatus>,
    /// Closed date range start (inclusive), on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Closed date range end (inclusive), on `created_at`.
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: u32,
    /// Page size; callers cap this before it reaches the store.
    pub per_page: u32,
}

impl OrderFilter {
    /// Default pagination: first page, 20 per page.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: None,
            from: None,
            to: None,
            page: 1,
            per_page: 20,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Whether an order passes the status/date filters (pagination aside).
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(from) = self.from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to
            && order.created_at > to
        {
            return false;
        }
        true
    }
}

/// Who the order list is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Orders belonging to one customer.
    Customer(UserId),
    /// Orders belonging to one restaurant.
    Restaurant(RestaurantId),
}

/// Keyed persistence for cart aggregates: one cart per customer identity.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load a customer's cart, if any.
    async fn get_cart(&self, owner: UserId) -> Result<Option<Cart>, StoreError>;

    /// Insert or replace a customer's cart.
    async fn upsert_cart(&self, cart: &Cart) -> Result<(), StoreError>;

    /// Delete a customer's cart. Deleting a nonexistent cart is a no-op.
    async fn delete_cart(&self, owner: UserId) -> Result<(), StoreError>;
}

/// Persistence and query surface for order aggregates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Compare-and-set the order's status, stamping the transition
    /// timestamp for `next`.
    ///
    /// Fails with [`StoreError::StaleStatus`] when the stored status is not
    /// `expected`; exactly one of two concurrent racers succeeds.
    async fn transition(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, StoreError>;

    /// List orders for a scope, newest first, with optional filters.
    async fn list_orders(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError>;
}

/// Combined storage surface, adding the one cross-store operation.
#[async_trait]
pub trait Storage: CartStore + OrderStore {
    /// Persist `order` and clear the customer's cart as a single unit.
    ///
    /// The store assigns the order ID and `created_at`. If persistence
    /// fails, the cart must remain intact.
    async fn place_order(&self, customer: UserId, order: NewOrder) -> Result<Order, StoreError>;
}
