//! Payment ledger row types.
//!
//! A payment is one claimed payment attempt. Rows are created by intake (or
//! by the gateway callback path), mutated exactly once by the verification
//! engine, and never deleted — they are financial records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::Plan;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Globally-unique, non-guessable payment identifier. Serves as the
/// idempotency key for every verification call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
  /// Generate a fresh identifier, e.g. `PAY_9f2c…`.
  pub fn generate() -> Self {
    Self(format!("PAY_{}", Uuid::new_v4().simple()))
  }

  pub fn from_string(s: String) -> Self { Self(s) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Truncated form safe to show to end users.
  pub fn display_short(&self) -> String {
    if self.0.len() <= 12 {
      self.0.clone()
    } else {
      format!("{}…", &self.0[..12])
    }
  }
}

impl std::fmt::Display for PaymentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Generate the merchant-side transaction identifier stored on the row at
/// intake time. The payment processor echoes it back in its callback, which
/// is how an asynchronous notification is correlated to a ledger row.
pub fn generate_merchant_txn_id() -> String {
  format!("TXN_{}", Uuid::new_v4().simple())
}

/// Opaque pointer to an uploaded proof artifact in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofReference(pub String);

impl ProofReference {
  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Status & actor ──────────────────────────────────────────────────────────

/// Payment lifecycle status. `Verified` and `Rejected` are terminal: once
/// reached, no further transition is permitted and re-applying the same
/// transition is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Verified,
  Rejected,
}

impl PaymentStatus {
  pub fn is_terminal(&self) -> bool { !matches!(self, Self::Pending) }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Verified => "verified",
      Self::Rejected => "rejected",
    }
  }
}

/// Who triggered a verification decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
  /// A human administrator acting through the review panel.
  Admin,
  /// The payment processor, via an authenticated callback.
  Gateway,
}

impl Actor {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Admin => "admin",
      Self::Gateway => "gateway",
    }
  }
}

// ─── Payment ─────────────────────────────────────────────────────────────────

/// One row per claimed payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
  pub payment_id:      PaymentId,
  pub plan:            Plan,
  /// Canonical price for `plan` at intake time, in whole rupees.
  /// Server-computed; a client-supplied amount is never stored.
  pub amount:          u32,
  pub phone:           String,
  pub user_email:      String,
  /// Merchant-side transaction id echoed back by gateway callbacks.
  pub merchant_txn_id: String,
  /// Human-readable reference carried on the UPI payment request.
  pub transaction_note: Option<String>,
  /// Present for the manual proof-upload flow; absent for gateway rows.
  pub proof:           Option<ProofReference>,
  pub status:          PaymentStatus,
  pub created_at:      DateTime<Utc>,
  pub verified_at:     Option<DateTime<Utc>>,
  pub verified_by:     Option<Actor>,
  pub notes:           Option<String>,
  /// Set once the entitlement upsert for a verified payment has committed.
  /// Checked before and set with the account write, which makes the verify
  /// transition retryable without ever double-applying credits.
  pub entitlement_applied: bool,
}

// ─── NewPayment ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::LedgerStore::create_payment`].
/// `status` and `created_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewPayment {
  pub payment_id:       PaymentId,
  pub plan:             Plan,
  pub amount:           u32,
  pub phone:            String,
  pub user_email:       String,
  pub merchant_txn_id:  String,
  pub transaction_note: Option<String>,
  pub proof:            Option<ProofReference>,
}
