//! Tableside server library.
//!
//! This crate provides the ordering backend as a library, allowing it to be
//! tested and reused by the integration-tests crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod middleware;
pub mod notify;
pub mod payments;
pub mod routes;
pub mod services;
pub mod staff;
pub mod state;
pub mod store;
