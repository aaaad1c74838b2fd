//! Asynchronous payment event payloads.
//!
//! The processor posts JSON envelopes like:
//!
//! ```json
//! {
//!   "id": "evt_1Nxyz",
//!   "type": "payment_intent.succeeded",
//!   "data": {
//!     "object": {
//!       "id": "pi_3Mabc",
//!       "amount": 3148,
//!       "currency": "usd",
//!       "metadata": { "order_id": "42", "customer_email": "a@b.c" }
//!     }
//!   }
//! }
//! ```
//!
//! Parsing is deliberately tolerant: unknown `type` values and missing
//! optional fields deserialize fine, so the processor adding event types
//! never breaks the webhook.

use std::collections::HashMap;

use serde::Deserialize;

use tableside_core::OrderId;

/// Raw event envelope as posted by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Processor-assigned event ID; the dedup key.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: IntentObject,
}

/// The payment intent embedded in the event.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// A recognized, correlated payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        payment_reference: String,
        order_id: OrderId,
        customer_email: Option<String>,
        amount_minor: i64,
        currency: String,
    },
    Failed {
        payment_reference: String,
        order_id: OrderId,
        customer_email: Option<String>,
        reason: String,
    },
}

/// Why an envelope did not produce a [`PaymentEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unprocessable {
    /// Event type we do not handle; ignored for forward compatibility.
    UnrecognizedType(String),
    /// Correlation metadata absent or unparseable - an integration defect,
    /// not a transient failure. Logged and dropped, never retried.
    MissingCorrelation,
}

impl EventEnvelope {
    /// Extract the internal order ID from intent metadata.
    fn order_id(&self) -> Option<OrderId> {
        self.data
            .object
            .metadata
            .get("order_id")
            .and_then(|raw| raw.parse().ok())
    }

    fn customer_email(&self) -> Option<String> {
        self.data.object.metadata.get("customer_email").cloned()
    }

    /// Classify the envelope into a dispatchable event.
    ///
    /// # Errors
    ///
    /// Returns [`Unprocessable`] for unknown event types and for events
    /// whose correlation metadata is missing or garbled.
    pub fn classify(&self) -> Result<PaymentEvent, Unprocessable> {
        match self.kind.as_str() {
            "payment_intent.succeeded" => {
                let order_id = self.order_id().ok_or(Unprocessable::MissingCorrelation)?;
                Ok(PaymentEvent::Succeeded {
                    payment_reference: self.data.object.id.clone(),
                    order_id,
                    customer_email: self.customer_email(),
                    amount_minor: self.data.object.amount,
                    currency: self.data.object.currency.clone(),
                })
            }
            "payment_intent.payment_failed" => {
                let order_id = self.order_id().ok_or(Unprocessable::MissingCorrelation)?;
                let reason = self
                    .data
                    .object
                    .last_payment_error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "payment declined".to_owned());
                Ok(PaymentEvent::Failed {
                    payment_reference: self.data.object.id.clone(),
                    order_id,
                    customer_email: self.customer_email(),
                    reason,
                })
            }
            other => Err(Unprocessable::UnrecognizedType(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(kind: &str, metadata: &str) -> EventEnvelope {
        let raw = format!(
            r#"{{
                "id": "evt_1",
                "type": "{kind}",
                "data": {{
                    "object": {{
                        "id": "pi_1",
                        "amount": 3148,
                        "currency": "usd",
                        "metadata": {metadata}
                    }}
                }}
            }}"#
        );
        serde_json::from_str(&raw).expect("valid envelope")
    }

    #[test]
    fn test_succeeded_event_classified() {
        let env = envelope(
            "payment_intent.succeeded",
            r#"{"order_id": "42", "customer_email": "a@b.c"}"#,
        );
        let event = env.classify().expect("recognized");
        assert_eq!(
            event,
            PaymentEvent::Succeeded {
                payment_reference: "pi_1".to_owned(),
                order_id: OrderId::new(42),
                customer_email: Some("a@b.c".to_owned()),
                amount_minor: 3148,
                currency: "usd".to_owned(),
            }
        );
    }

    #[test]
    fn test_failed_event_default_reason() {
        let env = envelope("payment_intent.payment_failed", r#"{"order_id": "42"}"#);
        match env.classify().expect("recognized") {
            PaymentEvent::Failed { reason, .. } => assert_eq!(reason, "payment declined"),
            other @ PaymentEvent::Succeeded { .. } => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let env = envelope("charge.refunded", r#"{"order_id": "42"}"#);
        assert_eq!(
            env.classify(),
            Err(Unprocessable::UnrecognizedType("charge.refunded".to_owned()))
        );
    }

    #[test]
    fn test_missing_metadata_is_uncorrelatable() {
        let env = envelope("payment_intent.succeeded", "{}");
        assert_eq!(env.classify(), Err(Unprocessable::MissingCorrelation));

        let garbled = envelope("payment_intent.succeeded", r#"{"order_id": "not-a-number"}"#);
        assert_eq!(garbled.classify(), Err(Unprocessable::MissingCorrelation));
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let raw = r#"{
            "id": "evt_2",
            "type": "payment_intent.succeeded",
            "api_version": "2024-06-20",
            "data": {
                "object": {
                    "id": "pi_2",
                    "amount": 100,
                    "currency": "usd",
                    "metadata": {"order_id": "7"},
                    "some_new_field": {"nested": true}
                }
            }
        }"#;
        let env: EventEnvelope = serde_json::from_str(raw).expect("tolerant parse");
        assert!(env.classify().is_ok());
    }
}
