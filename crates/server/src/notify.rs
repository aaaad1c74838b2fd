//! Notification sink port.
//!
//! Delivery (email, push, SMS) is another service's job; this side only
//! fires requests at it. Everything here is fire-and-forget by contract: a
//! notification failure is logged and must never roll back order state.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use tableside_core::{OrderId, Price, RestaurantId};

/// Errors from the notification dispatch service.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Fire-and-forget notification dispatch.
///
/// No return value is relied upon beyond logging; callers swallow errors.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Tell the customer their payment went through.
    async fn payment_success_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<(), NotifyError>;

    /// Tell the restaurant a paid order is waiting.
    async fn new_paid_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        customer_email: &str,
        total: Price,
    ) -> Result<(), NotifyError>;

    /// Tell the customer their payment failed.
    async fn payment_failure_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        reason: &str,
    ) -> Result<(), NotifyError>;

    /// Tell the restaurant a new (not yet paid) order arrived.
    async fn new_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        total: Price,
    ) -> Result<(), NotifyError>;
}

/// HTTP client against the notification dispatch service.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NotifyRequest<'a> {
    PaymentSuccess {
        order_id: OrderId,
        email: &'a str,
        amount_minor: i64,
        currency: &'a str,
    },
    NewPaidOrder {
        order_id: OrderId,
        restaurant_id: RestaurantId,
        customer_email: &'a str,
        total: Price,
    },
    PaymentFailure {
        order_id: OrderId,
        email: &'a str,
        reason: &'a str,
    },
    NewOrder {
        order_id: OrderId,
        restaurant_id: RestaurantId,
        total: Price,
    },
}

impl HttpNotifier {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn dispatch(&self, request: &NotifyRequest<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/notifications", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, message });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    async fn payment_success_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(&NotifyRequest::PaymentSuccess {
            order_id,
            email,
            amount_minor,
            currency,
        })
        .await
    }

    async fn new_paid_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        customer_email: &str,
        total: Price,
    ) -> Result<(), NotifyError> {
        self.dispatch(&NotifyRequest::NewPaidOrder {
            order_id,
            restaurant_id,
            customer_email,
            total,
        })
        .await
    }

    async fn payment_failure_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        reason: &str,
    ) -> Result<(), NotifyError> {
        self.dispatch(&NotifyRequest::PaymentFailure {
            order_id,
            email,
            reason,
        })
        .await
    }

    async fn new_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        total: Price,
    ) -> Result<(), NotifyError> {
        self.dispatch(&NotifyRequest::NewOrder {
            order_id,
            restaurant_id,
            total,
        })
        .await
    }
}

/// Records every dispatch for assertion; used by tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<SentNotification>>,
}

/// A recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    PaymentSuccess { order_id: OrderId, email: String },
    NewPaidOrder { order_id: OrderId, restaurant_id: RestaurantId },
    PaymentFailure { order_id: OrderId, email: String, reason: String },
    NewOrder { order_id: OrderId, restaurant_id: RestaurantId },
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, notification: SentNotification) {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification);
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn payment_success_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        _amount_minor: i64,
        _currency: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::PaymentSuccess {
            order_id,
            email: email.to_owned(),
        });
        Ok(())
    }

    async fn new_paid_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        _customer_email: &str,
        _total: Price,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::NewPaidOrder {
            order_id,
            restaurant_id,
        });
        Ok(())
    }

    async fn payment_failure_to_customer(
        &self,
        order_id: OrderId,
        email: &str,
        reason: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::PaymentFailure {
            order_id,
            email: email.to_owned(),
            reason: reason.to_owned(),
        });
        Ok(())
    }

    async fn new_order_to_restaurant(
        &self,
        order_id: OrderId,
        restaurant_id: RestaurantId,
        _total: Price,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::NewOrder {
            order_id,
            restaurant_id,
        });
        Ok(())
    }
}
