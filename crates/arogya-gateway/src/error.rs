//! Error type for `arogya-gateway`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The X-VERIFY header does not match the payload. Nothing in the
  /// payload may be trusted.
  #[error("callback signature verification failed")]
  InvalidSignature,

  #[error("missing X-VERIFY header")]
  MissingSignature,

  #[error("malformed callback envelope: {0}")]
  Envelope(#[from] serde_json::Error),

  #[error("callback payload is not valid base64: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("callback payload is not valid UTF-8")]
  Utf8,

  #[error("callback payload missing field: {0}")]
  MissingField(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
