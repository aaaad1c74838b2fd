//! Integration test harness for Tableside.
//!
//! Wires the real service layer to in-memory ports: [`MemoryStore`] for
//! persistence, [`StaticMenu`] for the catalog, [`StaticRoster`] for staff,
//! [`RecordingNotifier`] for notifications, and a stub payment gateway.
//! Webhook payloads are signed with the same HMAC scheme production
//! verifies, so the whole reconciliation path runs for real.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use tableside_core::{
    CallerIdentity, Cart, CurrencyCode, MenuItemId, NewOrder, Order, OrderId, Price, RestaurantId,
    Role, UserId,
};
use tableside_server::menu::{MenuItemDetails, StaticMenu};
use tableside_server::notify::RecordingNotifier;
use tableside_server::payments::signature::HmacSignatureVerifier;
use tableside_server::payments::{PaymentError, PaymentGateway, PaymentIntent};
use tableside_server::services::{CartService, OrderService, PaymentReconciler};
use tableside_server::staff::StaticRoster;
use tableside_server::store::memory::MemoryStore;
use tableside_server::store::{CartStore, OrderFilter, OrderScope, OrderStore, Storage, StoreError};

/// Webhook signing secret shared between the harness and its verifier.
pub const WEBHOOK_SECRET: &[u8] = b"whsec_it_8831aa02ffd947";

/// Fixed clock for deterministic signature tolerance checks.
#[must_use]
pub fn fixed_now() -> i64 {
    1_700_000_000
}

/// Payment gateway stub. Succeeds by default; flip [`Self::fail_next`] to
/// simulate the processor refusing the intent.
#[derive(Debug, Default)]
pub struct StubGateway {
    fail: AtomicBool,
    created: Mutex<Vec<(OrderId, i64)>>,
}

impl StubGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Intents created so far, as `(order_id, amount_minor)` pairs.
    #[must_use]
    pub fn created(&self) -> Vec<(OrderId, i64)> {
        self.created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        _currency: CurrencyCode,
        order_id: OrderId,
        _customer_email: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 402,
                message: "card declined at intent creation".to_owned(),
            });
        }
        self.created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((order_id, amount_minor));
        Ok(PaymentIntent {
            id: format!("pi_{order_id}"),
            client_secret: format!("pi_{order_id}_secret"),
        })
    }
}

/// Storage decorator whose `place_order` always fails, for asserting that a
/// failed placement leaves the cart untouched.
pub struct FailingPlacement {
    inner: Arc<MemoryStore>,
}

impl FailingPlacement {
    #[must_use]
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CartStore for FailingPlacement {
    async fn get_cart(&self, owner: UserId) -> Result<Option<Cart>, StoreError> {
        self.inner.get_cart(owner).await
    }

    async fn upsert_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.inner.upsert_cart(cart).await
    }

    async fn delete_cart(&self, owner: UserId) -> Result<(), StoreError> {
        self.inner.delete_cart(owner).await
    }
}

#[async_trait]
impl OrderStore for FailingPlacement {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.get_order(id).await
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: tableside_core::OrderStatus,
        next: tableside_core::OrderStatus,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Order, StoreError> {
        self.inner.transition(id, expected, next, at).await
    }

    async fn list_orders(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        self.inner.list_orders(scope, filter).await
    }
}

#[async_trait]
impl Storage for FailingPlacement {
    async fn place_order(&self, _customer: UserId, _order: NewOrder) -> Result<Order, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

/// Storage decorator that pauses after every cart read, widening the window
/// between a read and the write that follows it so interleavings that are
/// rare in production happen reliably under test.
pub struct DelayedCartReads {
    inner: Arc<MemoryStore>,
}

impl DelayedCartReads {
    #[must_use]
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CartStore for DelayedCartReads {
    async fn get_cart(&self, owner: UserId) -> Result<Option<Cart>, StoreError> {
        let cart = self.inner.get_cart(owner).await?;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(cart)
    }

    async fn upsert_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.inner.upsert_cart(cart).await
    }

    async fn delete_cart(&self, owner: UserId) -> Result<(), StoreError> {
        self.inner.delete_cart(owner).await
    }
}

#[async_trait]
impl OrderStore for DelayedCartReads {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.get_order(id).await
    }

    async fn transition(
        &self,
        id: OrderId,
        expected: tableside_core::OrderStatus,
        next: tableside_core::OrderStatus,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Order, StoreError> {
        self.inner.transition(id, expected, next, at).await
    }

    async fn list_orders(
        &self,
        scope: OrderScope,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        self.inner.list_orders(scope, filter).await
    }
}

#[async_trait]
impl Storage for DelayedCartReads {
    async fn place_order(&self, customer: UserId, order: NewOrder) -> Result<Order, StoreError> {
        self.inner.place_order(customer, order).await
    }
}

/// Everything a test needs, wired together.
pub struct TestBackend {
    pub store: Arc<MemoryStore>,
    pub menu: Arc<StaticMenu>,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<StubGateway>,
    pub verifier: HmacSignatureVerifier,
    pub carts: CartService,
    pub orders: OrderService,
    pub reconciler: PaymentReconciler,
}

impl TestBackend {
    /// Build a backend over the default menu and roster fixtures.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage_roster(Arc::new(MemoryStore::new()), default_roster())
    }

    /// Build a backend with a custom storage front (the [`MemoryStore`] is
    /// still reachable for direct assertions).
    #[must_use]
    pub fn with_failing_placement() -> Self {
        let memory = Arc::new(MemoryStore::new());
        let mut backend = Self::with_storage_roster(Arc::clone(&memory), default_roster());
        let failing: Arc<dyn Storage> = Arc::new(FailingPlacement::new(Arc::clone(&memory)));
        let menu: Arc<dyn tableside_server::menu::MenuLookup> = backend.menu.clone();
        let gateway: Arc<dyn PaymentGateway> = backend.gateway.clone();
        let notifier: Arc<dyn tableside_server::notify::NotificationSink> =
            backend.notifier.clone();
        backend.carts = CartService::new(Arc::clone(&failing), menu);
        backend.orders = OrderService::new(failing, Arc::new(default_roster()), gateway, notifier);
        backend
    }

    /// Build a backend whose storage dawdles between a cart read and the
    /// write that follows it.
    #[must_use]
    pub fn with_delayed_cart_reads() -> Self {
        let memory = Arc::new(MemoryStore::new());
        let mut backend = Self::with_storage_roster(Arc::clone(&memory), default_roster());
        let delayed: Arc<dyn Storage> = Arc::new(DelayedCartReads::new(memory));
        backend.carts = CartService::new(delayed, backend.menu.clone());
        backend
    }

    fn with_storage_roster(store: Arc<MemoryStore>, roster: StaticRoster) -> Self {
        let menu = Arc::new(default_menu());
        let notifier = Arc::new(RecordingNotifier::new());
        let gateway = Arc::new(StubGateway::new());
        let roster = Arc::new(roster);
        let verifier = HmacSignatureVerifier::with_clock(WEBHOOK_SECRET.to_vec(), fixed_now);

        let storage: Arc<dyn Storage> = store.clone();
        let menu_port: Arc<dyn tableside_server::menu::MenuLookup> = menu.clone();
        let gateway_port: Arc<dyn PaymentGateway> = gateway.clone();
        let notifier_port: Arc<dyn tableside_server::notify::NotificationSink> = notifier.clone();

        let carts = CartService::new(Arc::clone(&storage), menu_port);
        let orders = OrderService::new(
            Arc::clone(&storage),
            roster,
            gateway_port,
            Arc::clone(&notifier_port),
        );
        let reconciler = PaymentReconciler::new(
            Arc::new(HmacSignatureVerifier::with_clock(
                WEBHOOK_SECRET.to_vec(),
                fixed_now,
            )),
            storage,
            notifier_port,
        );

        Self {
            store,
            menu,
            notifier,
            gateway,
            verifier,
            carts,
            orders,
            reconciler,
        }
    }

    /// Sign `payload` the way the processor would.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> String {
        self.verifier.sign(payload, fixed_now())
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

// Fixture IDs, shared by the test suites.

pub const CUSTOMER: i64 = 10;
pub const OTHER_CUSTOMER: i64 = 11;
pub const STAFF_THAI: i64 = 20;
pub const STAFF_PIZZA: i64 = 21;
pub const ADMIN: i64 = 30;

pub const THAI_CORNER: i64 = 1;
pub const PIZZA_PLACE: i64 = 2;

pub const PAD_THAI: i64 = 101;
pub const SPRING_ROLLS: i64 = 102;
pub const SOLD_OUT_CURRY: i64 = 103;
pub const MARGHERITA: i64 = 201;

fn default_menu() -> StaticMenu {
    StaticMenu::new(vec![
        item(PAD_THAI, "pad thai", "12.99", THAI_CORNER, "thai corner", true),
        item(SPRING_ROLLS, "spring rolls", "5.50", THAI_CORNER, "thai corner", true),
        item(SOLD_OUT_CURRY, "green curry", "11.00", THAI_CORNER, "thai corner", false),
        item(MARGHERITA, "margherita", "9.00", PIZZA_PLACE, "pizza place", true),
    ])
}

fn default_roster() -> StaticRoster {
    StaticRoster::new(vec![
        (UserId::new(STAFF_THAI), RestaurantId::new(THAI_CORNER)),
        (UserId::new(STAFF_PIZZA), RestaurantId::new(PIZZA_PLACE)),
    ])
}

fn item(
    id: i64,
    name: &str,
    price: &str,
    restaurant_id: i64,
    restaurant_name: &str,
    available: bool,
) -> MenuItemDetails {
    MenuItemDetails {
        id: MenuItemId::new(id),
        name: name.to_owned(),
        price: Price::new(
            price.parse::<Decimal>().expect("fixture price"),
            CurrencyCode::USD,
        ),
        restaurant_id: RestaurantId::new(restaurant_id),
        restaurant_name: restaurant_name.to_owned(),
        available,
    }
}

/// A customer identity with a verified email.
#[must_use]
pub fn customer(user_id: i64) -> CallerIdentity {
    CallerIdentity::new(
        UserId::new(user_id),
        Some(format!("user{user_id}@example.com")),
        [Role::Customer],
    )
}

/// A customer identity without an email on file.
#[must_use]
pub fn customer_without_email(user_id: i64) -> CallerIdentity {
    CallerIdentity::new(UserId::new(user_id), None, [Role::Customer])
}

/// A restaurant staff identity.
#[must_use]
pub fn staff(user_id: i64) -> CallerIdentity {
    CallerIdentity::new(UserId::new(user_id), None, [Role::RestaurantStaff])
}

/// A platform admin identity.
#[must_use]
pub fn admin(user_id: i64) -> CallerIdentity {
    CallerIdentity::new(UserId::new(user_id), None, [Role::PlatformAdmin])
}
