//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-class errors to
//! Sentry before responding to the client. All route handlers and services
//! return `Result<T, AppError>`. The variants map 1:1 onto the error
//! taxonomy the HTTP layer exposes, so every distinguishable outcome gets
//! its own status code and message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tableside_core::{IllegalTransition, MenuItemId, OrderId};

use crate::menu::MenuError;
use crate::notify::NotifyError;
use crate::payments::PaymentError;
use crate::payments::signature::SignatureError;
use crate::staff::StaffError;
use crate::store::StoreError;

/// Application-level error type for the ordering backend.
#[derive(Debug, Error)]
pub enum AppError {
    /// The menu item does not exist or is flagged unavailable.
    #[error("menu item {0} is unavailable")]
    ItemUnavailable(MenuItemId),

    /// The item belongs to a different restaurant than requested.
    #[error("menu item belongs to a different restaurant")]
    RestaurantMismatch,

    /// No cart exists for the customer.
    #[error("cart not found")]
    CartNotFound,

    /// The referenced line is not in the cart.
    #[error("menu item {0} is not in the cart")]
    LineNotFound(MenuItemId),

    /// Quantities must be at least 1.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Orders can only be placed from a non-empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// The order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Attempted transition from a state that does not permit it.
    #[error(transparent)]
    IllegalOrderState(#[from] IllegalTransition),

    /// Authorization or ownership failure.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller identity headers missing or unparseable.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Inbound webhook failed its authenticity check.
    #[error("invalid signature: {0}")]
    SignatureInvalid(#[from] SignatureError),

    /// Bad request from client.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Menu catalog call failed.
    #[error("menu service error: {0}")]
    Menu(#[from] MenuError),

    /// Staff roster call failed.
    #[error("staff service error: {0}")]
    Staff(#[from] StaffError),

    /// Payment processor call failed.
    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Notification dispatch failed. Only ever logged, never surfaced by
    /// the services; present so `?` composes in helpers.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),
}

impl AppError {
    /// Whether this error should be captured to Sentry.
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Menu(_) | Self::Staff(_) | Self::Payment(_) | Self::Notify(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::ItemUnavailable(_)
            | Self::RestaurantMismatch
            | Self::InvalidQuantity
            | Self::EmptyCart
            | Self::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::CartNotFound | Self::LineNotFound(_) | Self::OrderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::IllegalOrderState(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) | Self::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::Store(StoreError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Menu(_) | Self::Staff(_) | Self::Payment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    fn message(&self) -> String {
        match self {
            Self::Store(StoreError::OrderNotFound(id)) => format!("order {id} not found"),
            Self::Store(_) | Self::Notify(_) => "internal server error".to_owned(),
            Self::Menu(_) => "menu service unavailable".to_owned(),
            Self::Staff(_) => "staff service unavailable".to_owned(),
            Self::Payment(_) => "payment service unavailable".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status_code();
        let body = Json(json!({ "error": self.message() }));
        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
