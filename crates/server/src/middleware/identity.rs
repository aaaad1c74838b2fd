//! Caller identity extractors.
//!
//! Authentication happens at the API gateway in front of this service. The
//! gateway strips any client-supplied identity headers and injects its own,
//! so these headers are trusted as-is:
//!
//! - `X-User-Id` - numeric user ID (required)
//! - `X-User-Roles` - comma-separated role names (required, may be empty)
//! - `X-User-Email` - verified email address (optional)

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use tableside_core::{CallerIdentity, Role, UserId};

use crate::error::AppError;

const USER_ID_HEADER: &str = "x-user-id";
const ROLES_HEADER: &str = "x-user-roles";
const EMAIL_HEADER: &str = "x-user-email";

/// Extractor that requires an authenticated caller.
///
/// Rejects with 401 when the gateway identity headers are absent or
/// unparseable.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Identity(caller): Identity) -> impl IntoResponse {
///     format!("user {}", caller.user_id)
/// }
/// ```
pub struct Identity(pub CallerIdentity);

fn parse_identity(headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let user_id: UserId = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing identity headers".to_owned()))?
        .parse()
        .map_err(|_| AppError::Unauthorized("malformed user ID".to_owned()))?;

    let roles = headers
        .get(ROLES_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing roles header".to_owned()))?
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse::<Role>)
        .collect::<Result<_, _>>()
        .map_err(|_| AppError::Unauthorized("unknown role".to_owned()))?;

    let email = headers
        .get(EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    Ok(CallerIdentity {
        user_id,
        email,
        roles,
    })
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_identity(&parts.headers).map(Self)
    }
}
