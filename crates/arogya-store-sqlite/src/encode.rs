//! Conversions between domain types and their SQLite column encodings.
//!
//! Timestamps are stored as RFC 3339 UTC strings, enums as lowercase
//! discriminants, and structured audit data as JSON text.

use arogya_core::{
  account::{SubscriptionStatus, UserAccount},
  audit::{AuditEvent, AuditKind},
  payment::{Actor, Payment, PaymentId, PaymentStatus, ProofReference},
  plan::{Credits, Plan},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn decode_dt_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enum discriminants ──────────────────────────────────────────────────────

pub fn decode_plan(s: &str) -> Result<Plan> {
  Plan::parse(s).map_err(|_| Error::Decode(format!("unknown plan {s:?}")))
}

pub fn decode_status(s: &str) -> Result<PaymentStatus> {
  match s {
    "pending" => Ok(PaymentStatus::Pending),
    "verified" => Ok(PaymentStatus::Verified),
    "rejected" => Ok(PaymentStatus::Rejected),
    other => Err(Error::Decode(format!("unknown payment status {other:?}"))),
  }
}

pub fn decode_actor(s: &str) -> Result<Actor> {
  match s {
    "admin" => Ok(Actor::Admin),
    "gateway" => Ok(Actor::Gateway),
    other => Err(Error::Decode(format!("unknown actor {other:?}"))),
  }
}

pub fn decode_subscription_status(s: &str) -> Result<SubscriptionStatus> {
  match s {
    "free" => Ok(SubscriptionStatus::Free),
    "active" => Ok(SubscriptionStatus::Active),
    "expired" => Ok(SubscriptionStatus::Expired),
    other => Err(Error::Decode(format!("unknown subscription status {other:?}"))),
  }
}

pub fn decode_audit_kind(s: &str) -> Result<AuditKind> {
  match s {
    "submitted" => Ok(AuditKind::Submitted),
    "activated" => Ok(AuditKind::Activated),
    "rejected" => Ok(AuditKind::Rejected),
    "duplicate_transition" => Ok(AuditKind::DuplicateTransition),
    "apply_failed" => Ok(AuditKind::ApplyFailed),
    "invalid_signature" => Ok(AuditKind::InvalidSignature),
    "ignored_event" => Ok(AuditKind::IgnoredEvent),
    other => Err(Error::Decode(format!("unknown audit event {other:?}"))),
  }
}

// ─── Row structs ─────────────────────────────────────────────────────────────

/// A `payments` row as it comes off the wire, before decoding.
pub struct RawPayment {
  pub payment_id:          String,
  pub plan:                String,
  pub amount:              i64,
  pub phone:               String,
  pub user_email:          String,
  pub merchant_txn_id:     String,
  pub transaction_note:    Option<String>,
  pub proof_path:          Option<String>,
  pub status:              String,
  pub created_at:          String,
  pub verified_at:         Option<String>,
  pub verified_by:         Option<String>,
  pub notes:               Option<String>,
  pub entitlement_applied: bool,
}

impl RawPayment {
  pub fn into_payment(self) -> Result<Payment> {
    Ok(Payment {
      payment_id:          PaymentId::from_string(self.payment_id),
      plan:                decode_plan(&self.plan)?,
      amount:              u32::try_from(self.amount).map_err(|_| {
        Error::Decode(format!("amount {} out of range", self.amount))
      })?,
      phone:               self.phone,
      user_email:          self.user_email,
      merchant_txn_id:     self.merchant_txn_id,
      transaction_note:    self.transaction_note,
      proof:               self.proof_path.map(ProofReference),
      status:              decode_status(&self.status)?,
      created_at:          decode_dt(&self.created_at)?,
      verified_at:         decode_dt_opt(self.verified_at)?,
      verified_by:         self.verified_by.as_deref().map(decode_actor).transpose()?,
      notes:               self.notes,
      entitlement_applied: self.entitlement_applied,
    })
  }
}

/// An `accounts` row before decoding.
pub struct RawAccount {
  pub email:      String,
  pub name:       String,
  pub phone:      Option<String>,
  pub plan:       String,
  pub status:     String,
  pub credits:    i64,
  pub expires_at: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawAccount {
  pub fn into_account(self) -> Result<UserAccount> {
    Ok(UserAccount {
      email:      self.email,
      name:       self.name,
      phone:      self.phone,
      plan:       decode_plan(&self.plan)?,
      status:     decode_subscription_status(&self.status)?,
      credits:    Credits(self.credits),
      expires_at: decode_dt_opt(self.expires_at)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// A `payment_audit` row before decoding.
pub struct RawAuditEvent {
  pub audit_id:    String,
  pub payment_id:  Option<String>,
  pub event:       String,
  pub old_status:  Option<String>,
  pub new_status:  Option<String>,
  pub actor:       Option<String>,
  pub event_data:  String,
  pub recorded_at: String,
}

impl RawAuditEvent {
  pub fn into_event(self) -> Result<AuditEvent> {
    Ok(AuditEvent {
      audit_id:    Uuid::parse_str(&self.audit_id)?,
      payment_id:  self.payment_id.map(PaymentId::from_string),
      kind:        decode_audit_kind(&self.event)?,
      old_status:  self.old_status.as_deref().map(decode_status).transpose()?,
      new_status:  self.new_status.as_deref().map(decode_status).transpose()?,
      actor:       self.actor.as_deref().map(decode_actor).transpose()?,
      data:        serde_json::from_str(&self.event_data)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
