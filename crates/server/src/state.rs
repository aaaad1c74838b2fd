//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::services::{CartService, OrderService, PaymentReconciler};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; holds configuration and the service layer.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    carts: CartService,
    orders: OrderService,
    reconciler: PaymentReconciler,
    /// Present only with the Postgres backend; used by the readiness probe.
    pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        carts: CartService,
        orders: OrderService,
        reconciler: PaymentReconciler,
        pool: Option<PgPool>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                carts,
                orders,
                reconciler,
                pool,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn reconciler(&self) -> &PaymentReconciler {
        &self.inner.reconciler
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
