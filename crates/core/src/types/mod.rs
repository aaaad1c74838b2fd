//! Core types for Tableside.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod identity;
pub mod price;

pub use id::*;
pub use identity::{CallerIdentity, Role};
pub use price::{CurrencyCode, Price};
