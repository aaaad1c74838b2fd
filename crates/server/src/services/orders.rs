//! Order placement and lifecycle engine.
//!
//! Two guards protect every lifecycle transition:
//!
//! 1. the state machine itself (illegal moves fail with 409), enforced
//!    twice: optimistically in memory, then authoritatively by the store's
//!    compare-and-set, so two racers on the same order cannot both win;
//! 2. the actor policy: kitchen-side actions need the restaurant-staff role
//!    plus roster membership at the order's restaurant; customer
//!    cancellation needs ownership.

use std::sync::Arc;

use chrono::Utc;

use tableside_core::{
    CallerIdentity, NewOrder, Order, OrderAction, OrderError, OrderId, PaymentMethod,
    RestaurantId, Role, UserId,
};

use crate::error::{AppError, Result};
use crate::notify::NotificationSink;
use crate::payments::{PaymentError, PaymentGateway, PaymentIntent};
use crate::staff::StaffDirectory;
use crate::store::{OrderFilter, OrderScope, Storage, StoreError};

/// A freshly placed order, with the payment intent when one was created.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// Present for card payments; the client completes the charge with it.
    pub payment: Option<PaymentIntent>,
}

/// Places orders and drives them through the lifecycle.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Storage>,
    staff: Arc<dyn StaffDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
}

impl OrderService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Storage>,
        staff: Arc<dyn StaffDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            staff,
            gateway,
            notifier,
        }
    }

    /// Commit the caller's cart into an order.
    ///
    /// The order snapshots the cart's lines and total; the cart is cleared
    /// in the same storage unit, so a persistence failure leaves the cart
    /// intact. Card orders start in `PENDING_PAYMENT` with a payment intent
    /// created against the processor; pay-on-delivery orders are `PLACED`
    /// immediately and the restaurant is notified.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn place_order(
        &self,
        caller: &CallerIdentity,
        payment_method: PaymentMethod,
    ) -> Result<PlacedOrder> {
        let cart = self
            .store
            .get_cart(caller.user_id)
            .await?
            .ok_or(AppError::EmptyCart)?;

        // Card charges need a receipt destination before anything commits.
        let email = match payment_method {
            PaymentMethod::Card => Some(caller.email.clone().ok_or_else(|| {
                AppError::BadRequest("a verified email is required for card payments".to_owned())
            })?),
            PaymentMethod::OnDelivery => None,
        };

        let new_order = NewOrder::from_cart(&cart, payment_method).map_err(|err| match err {
            OrderError::EmptyCart => AppError::EmptyCart,
        })?;

        let order = self.store.place_order(caller.user_id, new_order).await?;
        tracing::info!(order_id = %order.id, status = %order.status, "Order placed");

        let payment = match (payment_method, email) {
            (PaymentMethod::Card, Some(email)) => {
                Some(self.create_intent_or_fail(&order, &email).await?)
            }
            _ => {
                if let Err(err) = self
                    .notifier
                    .new_order_to_restaurant(order.id, order.restaurant_id, order.total_price)
                    .await
                {
                    tracing::error!(order_id = %order.id, error = %err, "Restaurant notification failed");
                }
                None
            }
        };

        Ok(PlacedOrder { order, payment })
    }

    /// Create the payment intent for a just-persisted card order.
    ///
    /// The order is already committed (and the cart cleared) at this point;
    /// if the processor refuses the intent, the order is moved to `FAILED`
    /// rather than deleted, keeping the audit trail.
    async fn create_intent_or_fail(&self, order: &Order, email: &str) -> Result<PaymentIntent> {
        let intent = match order.total_price.minor_units() {
            Some(amount_minor) => {
                self.gateway
                    .create_intent(
                        amount_minor,
                        order.total_price.currency_code,
                        order.id,
                        email,
                    )
                    .await
            }
            None => Err(PaymentError::UnrepresentableAmount),
        };

        match intent {
            Ok(intent) => Ok(intent),
            Err(err) => {
                tracing::error!(order_id = %order.id, error = %err, "Payment intent creation failed");
                if let Err(store_err) = self
                    .store
                    .transition(order.id, order.status, OrderAction::FailPayment.target(), Utc::now())
                    .await
                {
                    tracing::error!(order_id = %order.id, error = %store_err, "Failed to mark order FAILED");
                }
                Err(err.into())
            }
        }
    }

    /// Apply a lifecycle action on behalf of `caller`.
    ///
    /// Payment actions are not accepted here; they belong to the
    /// reconciler, which runs with processor authority, not a user role.
    pub async fn transition(
        &self,
        caller: &CallerIdentity,
        order_id: OrderId,
        action: OrderAction,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;

        match action {
            OrderAction::CapturePayment | OrderAction::FailPayment => {
                return Err(AppError::Forbidden(
                    "payment transitions are processor-driven".to_owned(),
                ));
            }
            OrderAction::CancelByUser => {
                if !caller.can_act_for(order.customer_id) {
                    return Err(AppError::Forbidden("not your order".to_owned()));
                }
            }
            _ => self.require_staff_of(caller, order.restaurant_id).await?,
        }

        self.apply(&order, action).await
    }

    /// Cancel an order, resolving which cancellation applies to the caller.
    ///
    /// The order's owner cancels as the customer; roster staff of the
    /// order's restaurant cancel as the restaurant. The two have different
    /// windows and different terminal states.
    pub async fn cancel(&self, caller: &CallerIdentity, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;

        let action = if caller.can_act_for(order.customer_id) {
            OrderAction::CancelByUser
        } else if self.is_staff_of(caller, order.restaurant_id).await? {
            OrderAction::CancelByRestaurant
        } else {
            return Err(AppError::Forbidden("not your order".to_owned()));
        };

        self.apply(&order, action).await
    }

    /// Fetch one order, visible to its owner, the restaurant's staff, and
    /// platform admins.
    pub async fn get_order(&self, caller: &CallerIdentity, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if caller.can_act_for(order.customer_id)
            || self.is_staff_of(caller, order.restaurant_id).await?
        {
            Ok(order)
        } else {
            Err(AppError::Forbidden("not your order".to_owned()))
        }
    }

    /// The caller's own order history, newest first.
    pub async fn list_my_orders(
        &self,
        caller: &CallerIdentity,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>> {
        self.list_orders_for(caller, caller.user_id, filter).await
    }

    /// A customer's order history; platform admins may list any customer's.
    pub async fn list_orders_for(
        &self,
        caller: &CallerIdentity,
        customer_id: UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>> {
        if !caller.can_act_for(customer_id) {
            return Err(AppError::Forbidden("not your order history".to_owned()));
        }
        Ok(self
            .store
            .list_orders(OrderScope::Customer(customer_id), filter)
            .await?)
    }

    /// A restaurant's incoming orders, for its staff and platform admins.
    pub async fn list_restaurant_orders(
        &self,
        caller: &CallerIdentity,
        restaurant_id: RestaurantId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>> {
        if !caller.is_platform_admin() && !self.is_staff_of(caller, restaurant_id).await? {
            return Err(AppError::Forbidden(
                "not on this restaurant's roster".to_owned(),
            ));
        }
        Ok(self
            .store
            .list_orders(OrderScope::Restaurant(restaurant_id), filter)
            .await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))
    }

    /// Validate the move in memory, then let the store's compare-and-set
    /// settle any race. A concurrent winner surfaces as the same 409 the
    /// in-memory check would have produced.
    async fn apply(&self, order: &Order, action: OrderAction) -> Result<Order> {
        let next = order.status.apply(action)?;
        match self
            .store
            .transition(order.id, order.status, next, Utc::now())
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    order_id = %updated.id,
                    from = %order.status,
                    to = %updated.status,
                    "Order transitioned"
                );
                Ok(updated)
            }
            Err(StoreError::StaleStatus { actual, .. }) => Err(AppError::IllegalOrderState(
                tableside_core::IllegalTransition {
                    current: actual,
                    action,
                },
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Both halves of the staff guard: the role and the roster.
    async fn is_staff_of(
        &self,
        caller: &CallerIdentity,
        restaurant_id: RestaurantId,
    ) -> Result<bool> {
        if !caller.has_role(Role::RestaurantStaff) {
            return Ok(false);
        }
        Ok(self.staff.is_staff_of(caller.user_id, restaurant_id).await?)
    }

    async fn require_staff_of(
        &self,
        caller: &CallerIdentity,
        restaurant_id: RestaurantId,
    ) -> Result<()> {
        if self.is_staff_of(caller, restaurant_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "not on this restaurant's roster".to_owned(),
            ))
        }
    }
}
