//! Webhook route handlers.
//!
//! Webhooks authenticate by payload signature, not user identity; the
//! identity extractor is deliberately absent here. The raw body bytes are
//! verified exactly as received, before any JSON parsing.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::error::Result;
use crate::state::AppState;

/// Header carrying the payment processor's payload signature.
const SIGNATURE_HEADER: &str = "payment-signature";

/// `POST /webhooks/payments`
pub async fn payment_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.reconciler().handle_webhook(&body, signature).await?;
    Ok(StatusCode::OK)
}
