//! The order lifecycle state machine.
//!
//! Statuses form a forward-only graph; every legal move is listed in one
//! transition table so the whole graph is auditable and testable as data.
//!
//! ```text
//! PENDING_PAYMENT ─▶ PLACED ─▶ CONFIRMED ─▶ PREPARING ─▶ READY_FOR_PICKUP
//!                                                          │          │
//!                                                          ▼          ▼
//!                                              OUT_FOR_DELIVERY ─▶ DELIVERED
//! ```
//!
//! `CANCELLED_BY_USER`, `CANCELLED_BY_RESTAURANT`, and `FAILED` are terminal
//! states reachable per the cancellation policy below. Transitions are
//! deliberately non-idempotent: repeating one fails with
//! [`IllegalTransition`], because a repeated state-changing call signals a
//! client or integration bug that must surface rather than be absorbed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created for a card payment; awaiting the processor's confirmation.
    PendingPayment,
    /// Committed and visible to the restaurant.
    Placed,
    /// Accepted by the restaurant.
    Confirmed,
    /// In the kitchen.
    Preparing,
    /// Ready for pickup or courier handoff.
    ReadyForPickup,
    /// With the courier.
    OutForDelivery,
    /// Handed to the customer (picked up or delivered).
    Delivered,
    /// Cancelled by the customer.
    CancelledByUser,
    /// Cancelled by the restaurant.
    CancelledByRestaurant,
    /// Payment failed or the order was otherwise abandoned.
    Failed,
}

impl OrderStatus {
    /// Whether this status permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::CancelledByUser | Self::CancelledByRestaurant | Self::Failed
        )
    }

    /// Apply an action, returning the successor status.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] when the action is not legal from the
    /// current status, naming current vs. expected.
    pub fn apply(self, action: OrderAction) -> Result<Self, IllegalTransition> {
        if action.allowed_from().contains(&self) {
            Ok(action.target())
        } else {
            Err(IllegalTransition {
                current: self,
                action,
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Placed => "PLACED",
            Self::Confirmed => "CONFIRMED",
            Self::Preparing => "PREPARING",
            Self::ReadyForPickup => "READY_FOR_PICKUP",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::CancelledByUser => "CANCELLED_BY_USER",
            Self::CancelledByRestaurant => "CANCELLED_BY_RESTAURANT",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "PLACED" => Ok(Self::Placed),
            "CONFIRMED" => Ok(Self::Confirmed),
            "PREPARING" => Ok(Self::Preparing),
            "READY_FOR_PICKUP" => Ok(Self::ReadyForPickup),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED_BY_USER" => Ok(Self::CancelledByUser),
            "CANCELLED_BY_RESTAURANT" => Ok(Self::CancelledByRestaurant),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("invalid order status: {other}")),
        }
    }
}

/// Actions that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    /// Restaurant accepts the order.
    Confirm,
    /// Kitchen starts on the order.
    MarkPreparing,
    /// Order is ready for pickup or courier handoff.
    MarkReady,
    /// Courier takes the order.
    MarkOutForDelivery,
    /// Customer collects the order at the counter.
    MarkPickedUp,
    /// Courier hands the order over.
    CompleteDelivery,
    /// Payment processor confirmed the charge.
    CapturePayment,
    /// Payment processor reported a failed charge.
    FailPayment,
    /// Customer cancels their own order.
    CancelByUser,
    /// Restaurant cancels the order.
    CancelByRestaurant,
}

impl OrderAction {
    /// Statuses this action is legal from.
    #[must_use]
    pub const fn allowed_from(self) -> &'static [OrderStatus] {
        use OrderStatus as S;
        match self {
            Self::Confirm => &[S::Placed],
            Self::MarkPreparing => &[S::Confirmed],
            Self::MarkReady => &[S::Preparing],
            Self::MarkOutForDelivery => &[S::ReadyForPickup],
            // Picked-up and delivery-completion both resolve to DELIVERED.
            Self::MarkPickedUp => &[S::ReadyForPickup],
            Self::CompleteDelivery => &[S::OutForDelivery],
            Self::CapturePayment | Self::FailPayment => &[S::PendingPayment],
            Self::CancelByUser => &[S::Placed, S::Confirmed],
            Self::CancelByRestaurant => {
                &[S::Placed, S::Confirmed, S::Preparing, S::ReadyForPickup]
            }
        }
    }

    /// The status this action moves the order to.
    #[must_use]
    pub const fn target(self) -> OrderStatus {
        match self {
            Self::Confirm => OrderStatus::Confirmed,
            Self::MarkPreparing => OrderStatus::Preparing,
            Self::MarkReady => OrderStatus::ReadyForPickup,
            Self::MarkOutForDelivery => OrderStatus::OutForDelivery,
            Self::MarkPickedUp | Self::CompleteDelivery => OrderStatus::Delivered,
            Self::CapturePayment => OrderStatus::Placed,
            Self::FailPayment => OrderStatus::Failed,
            Self::CancelByUser => OrderStatus::CancelledByUser,
            Self::CancelByRestaurant => OrderStatus::CancelledByRestaurant,
        }
    }

    /// Whether this action requires the restaurant-staff guard.
    ///
    /// Payment actions are driven by the reconciler, not an end-user role;
    /// cancellations carry their own ownership policy.
    #[must_use]
    pub const fn requires_staff(self) -> bool {
        matches!(
            self,
            Self::Confirm
                | Self::MarkPreparing
                | Self::MarkReady
                | Self::MarkOutForDelivery
                | Self::MarkPickedUp
                | Self::CompleteDelivery
                | Self::CancelByRestaurant
        )
    }
}

/// Attempted transition from a state that does not permit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal order state: {current} does not permit {action:?} (expected one of {:?})", action.allowed_from())]
pub struct IllegalTransition {
    /// The order's actual status at the time of the attempt.
    pub current: OrderStatus,
    /// The rejected action.
    pub action: OrderAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [OrderStatus; 10] = [
        OrderStatus::PendingPayment,
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::ReadyForPickup,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::CancelledByUser,
        OrderStatus::CancelledByRestaurant,
        OrderStatus::Failed,
    ];

    const ALL_ACTIONS: [OrderAction; 10] = [
        OrderAction::Confirm,
        OrderAction::MarkPreparing,
        OrderAction::MarkReady,
        OrderAction::MarkOutForDelivery,
        OrderAction::MarkPickedUp,
        OrderAction::CompleteDelivery,
        OrderAction::CapturePayment,
        OrderAction::FailPayment,
        OrderAction::CancelByUser,
        OrderAction::CancelByRestaurant,
    ];

    #[test]
    fn test_forward_path_to_delivery() {
        let mut status = OrderStatus::Placed;
        for action in [
            OrderAction::Confirm,
            OrderAction::MarkPreparing,
            OrderAction::MarkReady,
            OrderAction::MarkOutForDelivery,
            OrderAction::CompleteDelivery,
        ] {
            status = status.apply(action).expect("legal forward transition");
        }
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn test_pickup_path_to_delivery() {
        let status = OrderStatus::ReadyForPickup
            .apply(OrderAction::MarkPickedUp)
            .expect("pickup is legal from READY_FOR_PICKUP");
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn test_payment_capture_enters_placed() {
        assert_eq!(
            OrderStatus::PendingPayment.apply(OrderAction::CapturePayment),
            Ok(OrderStatus::Placed)
        );
        assert_eq!(
            OrderStatus::PendingPayment.apply(OrderAction::FailPayment),
            Ok(OrderStatus::Failed)
        );
    }

    #[test]
    fn test_repeated_transition_rejected() {
        let confirmed = OrderStatus::Placed
            .apply(OrderAction::Confirm)
            .expect("first confirm succeeds");
        let err = confirmed
            .apply(OrderAction::Confirm)
            .expect_err("second confirm must fail");
        assert_eq!(err.current, OrderStatus::Confirmed);
        assert_eq!(err.action, OrderAction::Confirm);
    }

    #[test]
    fn test_terminal_states_permit_nothing() {
        for status in ALL_STATUSES {
            if !status.is_terminal() {
                continue;
            }
            for action in ALL_ACTIONS {
                assert!(
                    status.apply(action).is_err(),
                    "{status} should not permit {action:?}"
                );
            }
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        // Ordinal position along the forward graph; terminal states last.
        fn rank(status: OrderStatus) -> u8 {
            match status {
                OrderStatus::PendingPayment => 0,
                OrderStatus::Placed => 1,
                OrderStatus::Confirmed => 2,
                OrderStatus::Preparing => 3,
                OrderStatus::ReadyForPickup => 4,
                OrderStatus::OutForDelivery => 5,
                OrderStatus::Delivered
                | OrderStatus::CancelledByUser
                | OrderStatus::CancelledByRestaurant
                | OrderStatus::Failed => 6,
            }
        }

        for status in ALL_STATUSES {
            for action in ALL_ACTIONS {
                if let Ok(next) = status.apply(action) {
                    assert!(
                        rank(next) > rank(status),
                        "{status} -> {next} via {action:?} moves backward"
                    );
                }
            }
        }
    }

    #[test]
    fn test_cancellation_policy_windows() {
        assert!(OrderStatus::Placed.apply(OrderAction::CancelByUser).is_ok());
        assert!(OrderStatus::Confirmed.apply(OrderAction::CancelByUser).is_ok());
        assert!(OrderStatus::Preparing.apply(OrderAction::CancelByUser).is_err());

        assert!(
            OrderStatus::ReadyForPickup
                .apply(OrderAction::CancelByRestaurant)
                .is_ok()
        );
        assert!(
            OrderStatus::OutForDelivery
                .apply(OrderAction::CancelByRestaurant)
                .is_err()
        );
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in ALL_STATUSES {
            let parsed: OrderStatus = status.to_string().parse().expect("roundtrip");
            assert_eq!(parsed, status);
        }
    }
}
