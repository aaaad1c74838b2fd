//! Payment event reconciliation.
//!
//! The processor's webhook is the only path that moves a card order out of
//! `PENDING_PAYMENT`. Processing order, strictest rejection first:
//!
//! 1. verify the signature (unverified payloads are never parsed further);
//! 2. parse the envelope (garbage from a verified sender is a 400);
//! 3. drop duplicates by event ID;
//! 4. classify and dispatch.
//!
//! Everything past verification and parsing answers 200: the processor
//! retries non-2xx responses, and retrying an event we have chosen to drop
//! (unknown type, missing correlation, already-transitioned order) only
//! burns both sides' time. The event-ID cache is best effort; the store's
//! compare-and-set is the authoritative duplicate guard, with a repeated
//! capture surfacing as a stale status we then ignore.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;

use tableside_core::{Order, OrderAction, OrderId};

use crate::error::{AppError, Result};
use crate::notify::NotificationSink;
use crate::payments::events::{EventEnvelope, PaymentEvent, Unprocessable};
use crate::payments::signature::SignatureVerifier;
use crate::store::{Storage, StoreError};

/// How long processed event IDs are remembered.
const EVENT_ID_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Reconciles asynchronous payment events onto order state.
#[derive(Clone)]
pub struct PaymentReconciler {
    verifier: Arc<dyn SignatureVerifier>,
    store: Arc<dyn Storage>,
    notifier: Arc<dyn NotificationSink>,
    seen_events: Cache<String, ()>,
}

impl PaymentReconciler {
    #[must_use]
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        store: Arc<dyn Storage>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            verifier,
            store,
            notifier,
            seen_events: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(EVENT_ID_TTL)
                .build(),
        }
    }

    /// Handle one raw webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SignatureInvalid`] for unverifiable payloads and
    /// [`AppError::BadRequest`] for verified-but-malformed ones. All other
    /// outcomes are `Ok`, acknowledged to the processor.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<()> {
        self.verifier.verify(payload, signature)?;

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|err| AppError::BadRequest(format!("malformed event payload: {err}")))?;

        if self.seen_events.contains_key(&envelope.id) {
            tracing::info!(event_id = %envelope.id, "Duplicate payment event dropped");
            return Ok(());
        }
        self.seen_events.insert(envelope.id.clone(), ()).await;

        match envelope.classify() {
            Ok(event) => self.dispatch(event).await,
            Err(Unprocessable::UnrecognizedType(kind)) => {
                tracing::debug!(event_id = %envelope.id, kind = %kind, "Unhandled event type ignored");
            }
            Err(Unprocessable::MissingCorrelation) => {
                tracing::error!(
                    event_id = %envelope.id,
                    kind = %envelope.kind,
                    "Payment event has no usable order correlation"
                );
            }
        }
        Ok(())
    }

    async fn dispatch(&self, event: PaymentEvent) {
        match event {
            PaymentEvent::Succeeded {
                payment_reference,
                order_id,
                customer_email,
                amount_minor,
                currency,
            } => {
                tracing::info!(order_id = %order_id, reference = %payment_reference, "Payment succeeded");
                let Some(order) = self.capture(order_id, OrderAction::CapturePayment).await else {
                    return;
                };
                if let Some(email) = &customer_email {
                    if let Err(err) = self
                        .notifier
                        .payment_success_to_customer(order_id, email, amount_minor, &currency)
                        .await
                    {
                        tracing::error!(order_id = %order_id, error = %err, "Customer notification failed");
                    }
                }
                if let Err(err) = self
                    .notifier
                    .new_paid_order_to_restaurant(
                        order_id,
                        order.restaurant_id,
                        customer_email.as_deref().unwrap_or_default(),
                        order.total_price,
                    )
                    .await
                {
                    tracing::error!(order_id = %order_id, error = %err, "Restaurant notification failed");
                }
            }
            PaymentEvent::Failed {
                payment_reference,
                order_id,
                customer_email,
                reason,
            } => {
                tracing::warn!(
                    order_id = %order_id,
                    reference = %payment_reference,
                    reason = %reason,
                    "Payment failed"
                );
                if self.capture(order_id, OrderAction::FailPayment).await.is_none() {
                    return;
                }
                if let Some(email) = &customer_email
                    && let Err(err) = self
                        .notifier
                        .payment_failure_to_customer(order_id, email, &reason)
                        .await
                {
                    tracing::error!(order_id = %order_id, error = %err, "Customer notification failed");
                }
            }
        }
    }

    /// Apply a payment action, treating every non-applicable case as a
    /// settled no-op. Returns the transitioned order when state changed.
    async fn capture(&self, order_id: OrderId, action: OrderAction) -> Option<Order> {
        let order = match self.store.get_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(order_id = %order_id, "Payment event for unknown order");
                return None;
            }
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "Order load failed during reconciliation");
                return None;
            }
        };

        let Ok(next) = order.status.apply(action) else {
            // Already moved on, most likely a redelivered event.
            tracing::debug!(
                order_id = %order_id,
                status = %order.status,
                action = ?action,
                "Payment event not applicable, ignoring"
            );
            return None;
        };

        match self
            .store
            .transition(order_id, order.status, next, Utc::now())
            .await
        {
            Ok(updated) => {
                tracing::info!(order_id = %order_id, to = %updated.status, "Payment reconciled");
                Some(updated)
            }
            Err(StoreError::StaleStatus { actual, .. }) => {
                tracing::info!(
                    order_id = %order_id,
                    status = %actual,
                    "Lost reconciliation race, event already applied"
                );
                None
            }
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "Order transition failed during reconciliation");
                None
            }
        }
    }
}
