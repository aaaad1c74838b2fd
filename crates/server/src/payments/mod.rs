//! Payment processor integration.
//!
//! - [`PaymentGateway`] creates payment intents (the synchronous half);
//! - [`signature`] verifies inbound webhook authenticity;
//! - [`events`] models the processor's asynchronous event payloads.
//!
//! The intent carries `order_id` and `customer_email` as opaque metadata.
//! That metadata round-trip is the only link between the synchronous
//! creation call and the asynchronous confirmation; losing it strands the
//! order in `PENDING_PAYMENT` permanently.

pub mod events;
pub mod signature;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use tableside_core::{CurrencyCode, OrderId};

use crate::config::PaymentsConfig;

/// The processor's minimum chargeable amount, in minor units.
pub const MINIMUM_CHARGE_MINOR_UNITS: i64 = 50;

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Amount is below the processor's minimum chargeable unit.
    #[error("amount {amount_minor} is below the minimum charge of {MINIMUM_CHARGE_MINOR_UNITS}")]
    AmountBelowMinimum { amount_minor: i64 },

    /// The order total could not be expressed in minor units.
    #[error("order total cannot be converted to minor units")]
    UnrepresentableAmount,
}

/// An authorized-but-not-yet-settled charge with the external processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    /// Processor-side intent ID.
    pub id: String,
    /// Opaque handle the client app completes the payment with.
    pub client_secret: String,
}

/// Creates payment authorization requests against the processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for an order.
    ///
    /// `order_id` and `customer_email` MUST land in the intent's metadata
    /// so the asynchronous event can be correlated back.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        order_id: OrderId,
        customer_email: &str,
    ) -> Result<PaymentIntent, PaymentError>;
}

/// HTTP client against a Stripe-shaped payment intents API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for HttpPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentGateway")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpPaymentGateway {
    #[must_use]
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            secret_key: config.secret_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, customer_email), fields(order_id = %order_id))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        order_id: OrderId,
        customer_email: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        if amount_minor < MINIMUM_CHARGE_MINOR_UNITS {
            return Err(PaymentError::AmountBelowMinimum { amount_minor });
        }

        let params = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.code().to_lowercase()),
            ("metadata[order_id]", order_id.to_string()),
            ("metadata[customer_email]", customer_email.to_owned()),
            ("receipt_email", customer_email.to_owned()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api { status, message });
        }

        let intent: PaymentIntent = response.json().await?;
        tracing::debug!(intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }
}
