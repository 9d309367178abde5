//! X-VERIFY checksum computation and validation.
//!
//! The processor signs every server-to-server callback with
//! `sha256(base64_response + salt_key)` in lowercase hex, suffixed with
//! `###` and the salt index. The same construction is used when calling
//! the processor's APIs, so both directions share this module.

use sha2::{Digest, Sha256};

use crate::{GatewayConfig, error::Error, error::Result};

/// Compute the X-VERIFY value for `base64_payload`.
pub fn compute_x_verify(base64_payload: &str, config: &GatewayConfig) -> String {
  let mut hasher = Sha256::new();
  hasher.update(base64_payload.as_bytes());
  hasher.update(config.salt_key.as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{digest}###{}", config.salt_index)
}

/// Validate a received X-VERIFY header against `base64_payload`.
///
/// Fails closed: any mismatch — wrong digest, wrong salt index, malformed
/// header — is [`Error::InvalidSignature`]. The digests are compared in
/// constant time so the check leaks nothing about the expected value.
pub fn verify_x_verify(
  header: &str,
  base64_payload: &str,
  config: &GatewayConfig,
) -> Result<()> {
  let expected = compute_x_verify(base64_payload, config);
  if constant_time_eq(header.as_bytes(), expected.as_bytes()) {
    Ok(())
  } else {
    Err(Error::InvalidSignature)
  }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut diff = 0u8;
  for (x, y) in a.iter().zip(b.iter()) {
    diff |= x ^ y;
  }
  diff == 0
}
