//! Caller identity as resolved by the upstream auth gateway.
//!
//! Tableside never handles credentials. Every request arrives with an
//! already-authenticated identity (user ID, optional email, role set) and
//! the core only performs authorization-by-role and ownership checks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Roles a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End customer placing orders.
    Customer,
    /// Restaurant staff advancing fulfillment.
    RestaurantStaff,
    /// Platform operator with cross-tenant access.
    PlatformAdmin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::RestaurantStaff => write!(f, "restaurant_staff"),
            Self::PlatformAdmin => write!(f, "platform_admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "customer" => Ok(Self::Customer),
            "restaurant_staff" => Ok(Self::RestaurantStaff),
            "platform_admin" => Ok(Self::PlatformAdmin),
            other => Err(format!("invalid role: {other}")),
        }
    }
}

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Authenticated user ID.
    pub user_id: UserId,
    /// Email, when the gateway forwards one (needed for payment receipts).
    pub email: Option<String>,
    /// Roles granted to this caller.
    pub roles: HashSet<Role>,
}

impl CallerIdentity {
    /// Create an identity with the given roles.
    #[must_use]
    pub fn new(user_id: UserId, email: Option<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            email,
            roles: roles.into_iter().collect(),
        }
    }

    /// Whether the caller holds the given role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the caller is a platform admin.
    #[must_use]
    pub fn is_platform_admin(&self) -> bool {
        self.has_role(Role::PlatformAdmin)
    }

    /// Whether the caller may act on behalf of `customer_id`.
    ///
    /// True for the customer themselves and for platform admins.
    #[must_use]
    pub fn can_act_for(&self, customer_id: UserId) -> bool {
        self.user_id == customer_id || self.is_platform_admin()
    }
}
