//! Error types for `arogya-core`.

use thiserror::Error;

use crate::payment::PaymentId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown plan: {0:?}")]
  UnknownPlan(String),

  #[error("{0}")]
  Validation(String),

  #[error("no resolvable identity for this request")]
  Unauthenticated,

  #[error("payment not found: {0}")]
  PaymentNotFound(PaymentId),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A payment was marked verified but the entitlement write failed.
  /// The applied flag is still unset, so retrying the same transition
  /// completes the activation. Must be alerted on, never swallowed.
  #[error("entitlement apply failed for payment {payment_id}: {source}")]
  EntitlementApplyFailed {
    payment_id: PaymentId,
    #[source]
    source:     Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
