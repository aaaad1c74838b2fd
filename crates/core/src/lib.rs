//! Tableside Core - Shared domain library.
//!
//! This crate provides the domain model used across all Tableside components:
//! - `server` - Ordering backend (carts, orders, payment reconciliation)
//! - `integration-tests` - End-to-end scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure domain logic - no I/O, no
//! database access, no HTTP clients. Everything here is deterministic and
//! unit-testable without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, and caller identity
//! - [`cart`] - The cart aggregate and its mutation rules
//! - [`order`] - The immutable-lines order aggregate
//! - [`status`] - The order lifecycle state machine as a transition table

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod status;
pub mod types;

pub use cart::{AddOutcome, Cart, CartError, CartLine, CartRestaurant, MenuSnapshot};
pub use order::{NewOrder, Order, OrderError, OrderLine, PaymentMethod};
pub use status::{IllegalTransition, OrderAction, OrderStatus};
pub use types::*;
