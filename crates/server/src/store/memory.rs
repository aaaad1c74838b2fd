//! In-memory store backend.
//!
//! Carts and orders live in maps behind a single async mutex, which gives
//! every read-modify-write cycle (and the order-placement pair) the
//! atomicity the store contract requires. Used by tests and local dev;
//! production runs [`super::postgres::PgStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tableside_core::{Cart, NewOrder, Order, OrderId, OrderStatus, UserId};

use super::{CartStore, OrderScope, OrderFilter, OrderStore, Storage, StoreError};

#[derive(Default)]
struct Inner {
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    next_order_id: i64,
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_cart(&self, owner: UserId) -> Result<Option<Cart>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.carts.get(&owner).cloned())
    }

    async fn upsert_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.carts.insert(cart.owner(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, owner: UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.carts.remove(&owner);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if order.status != expected {
            return Err(StoreError::StaleStatus {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        order.record_status(next, at);
        Ok(order.clone())
    }

    async fn list_orders(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| match scope {
                OrderScope::Customer(customer) => o.customer_id == customer,
                OrderScope::Restaurant(restaurant) => o.restaurant_id == restaurant,
            })
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();

        // Newest first, stable on ID for same-instant orders.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.per_page).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn place_order(&self, customer: UserId, order: NewOrder) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().await;

        inner.next_order_id += 1;
        let id = OrderId::new(inner.next_order_id);
        let persisted = Order {
            id,
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            lines: order.lines,
            total_price: order.total_price,
            status: order.status,
            created_at: Utc::now(),
            confirmed_at: None,
            preparing_at: None,
            ready_at: None,
            out_for_delivery_at: None,
            delivered_at: None,
            cancelled_at: None,
            failed_at: None,
        };

        // One lock covers both effects, so the pair is atomic.
        inner.orders.insert(id, persisted.clone());
        inner.carts.remove(&customer);

        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;
    use tableside_core::{
        CurrencyCode, MenuItemId, MenuSnapshot, PaymentMethod, Price, RestaurantId,
    };

    fn sample_cart(owner: i64) -> Cart {
        let mut cart = Cart::empty(UserId::new(owner));
        cart.add_item(
            &MenuSnapshot {
                menu_item_id: MenuItemId::new(101),
                name: "ramen".to_owned(),
                unit_price: Price::new(dec!(11.00), CurrencyCode::USD),
                restaurant_id: RestaurantId::new(1),
                restaurant_name: "noodle bar".to_owned(),
            },
            1,
        )
        .expect("add");
        cart
    }

    #[tokio::test]
    async fn test_cart_roundtrip() {
        let store = MemoryStore::new();
        let owner = UserId::new(1);
        assert!(store.get_cart(owner).await.expect("get").is_none());

        let cart = sample_cart(1);
        store.upsert_cart(&cart).await.expect("upsert");
        assert_eq!(store.get_cart(owner).await.expect("get"), Some(cart));

        store.delete_cart(owner).await.expect("delete");
        assert!(store.get_cart(owner).await.expect("get").is_none());
        // Deleting again is a no-op, not an error.
        store.delete_cart(owner).await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn test_place_order_clears_cart() {
        let store = MemoryStore::new();
        let cart = sample_cart(1);
        store.upsert_cart(&cart).await.expect("upsert");

        let new_order = NewOrder::from_cart(&cart, PaymentMethod::OnDelivery).expect("non-empty");
        let order = store
            .place_order(UserId::new(1), new_order)
            .await
            .expect("place");

        assert_eq!(order.status, OrderStatus::Placed);
        assert!(store.get_cart(UserId::new(1)).await.expect("get").is_none());
        assert_eq!(
            store.get_order(order.id).await.expect("get"),
            Some(order)
        );
    }

    #[tokio::test]
    async fn test_transition_cas_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let cart = sample_cart(1);
        let new_order = NewOrder::from_cart(&cart, PaymentMethod::OnDelivery).expect("non-empty");
        let order = store
            .place_order(UserId::new(1), new_order)
            .await
            .expect("place");

        let confirmed = store
            .transition(order.id, OrderStatus::Placed, OrderStatus::Confirmed, Utc::now())
            .await
            .expect("first transition");
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        // The same CAS again observes CONFIRMED, not PLACED.
        let err = store
            .transition(order.id, OrderStatus::Placed, OrderStatus::Confirmed, Utc::now())
            .await
            .expect_err("second transition must fail");
        assert!(matches!(
            err,
            StoreError::StaleStatus {
                actual: OrderStatus::Confirmed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_paginates() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let cart = sample_cart(1);
            let new_order =
                NewOrder::from_cart(&cart, PaymentMethod::OnDelivery).expect("non-empty");
            let order = store
                .place_order(UserId::new(1), new_order)
                .await
                .expect("place");
            if i == 0 {
                store
                    .transition(order.id, OrderStatus::Placed, OrderStatus::Confirmed, Utc::now())
                    .await
                    .expect("confirm");
            }
        }

        let all = store
            .list_orders(OrderScope::Customer(UserId::new(1)), &OrderFilter::new())
            .await
            .expect("list");
        assert_eq!(all.len(), 3);

        let confirmed_only = store
            .list_orders(
                OrderScope::Customer(UserId::new(1)),
                &OrderFilter {
                    status: Some(OrderStatus::Confirmed),
                    ..OrderFilter::new()
                },
            )
            .await
            .expect("list");
        assert_eq!(confirmed_only.len(), 1);

        let page2 = store
            .list_orders(
                OrderScope::Customer(UserId::new(1)),
                &OrderFilter {
                    page: 2,
                    per_page: 2,
                    ..OrderFilter::new()
                },
            )
            .await
            .expect("list");
        assert_eq!(page2.len(), 1);

        let other_customer = store
            .list_orders(OrderScope::Customer(UserId::new(9)), &OrderFilter::new())
            .await
            .expect("list");
        assert!(other_customer.is_empty());
    }
}
