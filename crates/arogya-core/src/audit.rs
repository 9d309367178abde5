//! Append-only audit trail types.
//!
//! Every payment status mutation attempt is recorded here — including no-op
//! duplicates and callbacks rejected before they reached any ledger row —
//! so a dispute can always be reconstructed after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payment::{Actor, PaymentId, PaymentStatus};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// What happened. The variant name serves as the `event` discriminant stored
/// in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
  /// A pending row was created by intake.
  Submitted,
  /// A payment verified and its entitlement was applied.
  Activated,
  /// A pending payment was rejected.
  Rejected,
  /// A transition was requested on an already-terminal payment.
  DuplicateTransition,
  /// The entitlement write failed after the payment was marked verified.
  ApplyFailed,
  /// A callback failed signature verification.
  InvalidSignature,
  /// An authentic callback was acknowledged but not acted upon.
  IgnoredEvent,
}

impl AuditKind {
  /// The discriminant string stored in the `event` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Submitted => "submitted",
      Self::Activated => "activated",
      Self::Rejected => "rejected",
      Self::DuplicateTransition => "duplicate_transition",
      Self::ApplyFailed => "apply_failed",
      Self::InvalidSignature => "invalid_signature",
      Self::IgnoredEvent => "ignored_event",
    }
  }
}

// ─── AuditEvent ──────────────────────────────────────────────────────────────

/// An immutable record of one mutation attempt. Once written, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
  pub audit_id:    Uuid,
  /// Absent for events with no ledger row (e.g. a forged callback).
  pub payment_id:  Option<PaymentId>,
  pub kind:        AuditKind,
  pub old_status:  Option<PaymentStatus>,
  pub new_status:  Option<PaymentStatus>,
  pub actor:       Option<Actor>,
  /// Freeform context for forensics (plan, amounts, error strings…).
  pub data:        serde_json::Value,
  pub recorded_at: DateTime<Utc>,
}

// ─── NewAuditEvent ───────────────────────────────────────────────────────────

/// Input to [`crate::store::LedgerStore::append_audit`].
/// `audit_id` and `recorded_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
  pub payment_id: Option<PaymentId>,
  pub kind:       AuditKind,
  pub old_status: Option<PaymentStatus>,
  pub new_status: Option<PaymentStatus>,
  pub actor:      Option<Actor>,
  pub data:       serde_json::Value,
}

impl NewAuditEvent {
  /// Convenience constructor with all optional fields cleared.
  pub fn new(payment_id: Option<PaymentId>, kind: AuditKind) -> Self {
    Self {
      payment_id,
      kind,
      old_status: None,
      new_status: None,
      actor: None,
      data: serde_json::Value::Null,
    }
  }
}
