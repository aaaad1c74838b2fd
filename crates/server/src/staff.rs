//! Restaurant staff roster port.
//!
//! Restaurant administration (and its admin roster) lives in another
//! service; the lifecycle engine only needs one question answered: is this
//! user on the given restaurant's roster?

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use tableside_core::{RestaurantId, UserId};

/// Errors from the staff roster service.
#[derive(Debug, Error)]
pub enum StaffError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Restaurant roster membership lookup.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    /// Whether `user_id` is on `restaurant_id`'s staff roster.
    async fn is_staff_of(
        &self,
        user_id: UserId,
        restaurant_id: RestaurantId,
    ) -> Result<bool, StaffError>;
}

/// HTTP client against the restaurant administration service.
#[derive(Clone)]
pub struct HttpStaffDirectory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct MembershipResponse {
    member: bool,
}

impl HttpStaffDirectory {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl StaffDirectory for HttpStaffDirectory {
    async fn is_staff_of(
        &self,
        user_id: UserId,
        restaurant_id: RestaurantId,
    ) -> Result<bool, StaffError> {
        let url = format!(
            "{}/restaurants/{restaurant_id}/staff/{user_id}",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StaffError::Api { status, message });
        }

        let body: MembershipResponse = response.json().await?;
        Ok(body.member)
    }
}

/// Fixed in-memory roster for tests and local development.
#[derive(Debug, Default)]
pub struct StaticRoster {
    members: Vec<(UserId, RestaurantId)>,
}

impl StaticRoster {
    #[must_use]
    pub const fn new(members: Vec<(UserId, RestaurantId)>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl StaffDirectory for StaticRoster {
    async fn is_staff_of(
        &self,
        user_id: UserId,
        restaurant_id: RestaurantId,
    ) -> Result<bool, StaffError> {
        Ok(self.members.contains(&(user_id, restaurant_id)))
    }
}
