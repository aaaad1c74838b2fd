//! Tableside - multi-tenant restaurant ordering backend.
//!
//! This binary serves the ordering API on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON API
//! - `PostgreSQL` for carts and orders (in-memory store for dev/tests)
//! - Menu catalog, staff roster, and notification dispatch consumed as
//!   sibling HTTP services
//! - Payment processor integrated via payment intents plus a
//!   signature-verified webhook for asynchronous reconciliation
//!
//! # Security
//!
//! Authentication happens at the API gateway; this service trusts the
//! identity headers it injects. The webhook endpoint authenticates by
//! HMAC payload signature instead.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tableside_server::config::{ServerConfig, StoreBackend};
use tableside_server::menu::HttpMenuClient;
use tableside_server::notify::HttpNotifier;
use tableside_server::payments::HttpPaymentGateway;
use tableside_server::payments::signature::HmacSignatureVerifier;
use tableside_server::services::{CartService, OrderService, PaymentReconciler};
use tableside_server::staff::HttpStaffDirectory;
use tableside_server::state::AppState;
use tableside_server::store::memory::MemoryStore;
use tableside_server::store::postgres::PgStore;
use tableside_server::store::Storage;
use tableside_server::{db, routes};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Initialize tracing with EnvFilter and Sentry integration
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tableside_server=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Select and initialize the store backend
    let (store, pool): (Arc<dyn Storage>, Option<sqlx::PgPool>) = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .expect("TABLESIDE_DATABASE_URL is required for the postgres store");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");

            let store = PgStore::new(pool.clone());
            store.migrate().await.expect("Failed to run migrations");

            (Arc::new(store), Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; all data is lost on restart");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    // Wire up the external service ports
    let menu = Arc::new(HttpMenuClient::new(&config.menu_service_url));
    let staff = Arc::new(HttpStaffDirectory::new(&config.staff_service_url));
    let notifier = Arc::new(HttpNotifier::new(&config.notify_service_url));
    let gateway = Arc::new(HttpPaymentGateway::new(&config.payments));
    let verifier = Arc::new(HmacSignatureVerifier::new(
        config.payments.webhook_secret_bytes(),
    ));

    // Build the service layer and application state
    let carts = CartService::new(Arc::clone(&store), menu);
    let orders = OrderService::new(Arc::clone(&store), staff, gateway, notifier.clone());
    let reconciler = PaymentReconciler::new(verifier, Arc::clone(&store), notifier);
    let state = AppState::new(config.clone(), carts, orders, reconciler, pool);

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record("latency_ms", u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    // Start server
    let addr = config.socket_addr();
    tracing::info!("tableside listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK. The in-memory store is
/// always ready.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.pool() {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => StatusCode::OK,
            Err(_) => StatusCode::SERVICE_UNAVAILABLE,
        },
        None => StatusCode::OK,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
