//! Payment-processor callback codec for Arogya.
//!
//! Validates the X-VERIFY checksum on server-to-server callbacks and
//! decodes the base64 envelope into a typed
//! [`arogya_core::engine::GatewayEvent`]. This crate is pure — no HTTP, no
//! storage — so the signature scheme can be exercised in isolation.

pub mod callback;
pub mod error;
pub mod signature;

pub use callback::decode_callback;
pub use error::{Error, Result};
pub use signature::{compute_x_verify, verify_x_verify};

use serde::Deserialize;

/// Shared-secret material for the processor integration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
  /// Salt key issued by the processor.
  pub salt_key:   String,
  /// Index of the salt key, appended to every checksum after `###`.
  pub salt_index: u8,
}
