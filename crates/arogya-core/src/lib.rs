//! Core types and trait definitions for the Arogya payment ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod audit;
pub mod engine;
pub mod error;
pub mod payment;
pub mod plan;
pub mod store;

pub use error::{Error, Result};
