//! SQLite backend for the Arogya payment ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Because every write for a
//! given payment goes through the same serialised connection, the
//! compare-and-swap semantics required by the ledger trait fall out of
//! single-call transactions.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
