//! Business logic services.
//!
//! Services sit between the HTTP routes and the ports (store, menu, staff,
//! payments, notifications). Routes do parsing and shaping only; every
//! authorization decision and invariant lives here.

pub mod cart;
pub mod orders;
pub mod reconciler;

pub use cart::CartService;
pub use orders::{OrderService, PlacedOrder};
pub use reconciler::PaymentReconciler;
