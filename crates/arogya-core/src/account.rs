//! User accounts and the entitlement read model.
//!
//! Entitlement fields on an account are written only through
//! [`crate::store::LedgerStore::apply_entitlement`]; every other component
//! reads them via the resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  payment::Payment,
  plan::{Credits, Plan, grant_validity},
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Free,
  Active,
  Expired,
}

impl SubscriptionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Free => "free",
      Self::Active => "active",
      Self::Expired => "expired",
    }
  }
}

// ─── UserAccount ─────────────────────────────────────────────────────────────

/// A user record keyed by the contact handle owned by the authentication
/// collaborator. Created lazily — either on first authenticated access with
/// free defaults, or by the verification engine when a payment verifies
/// before the application ever saw the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
  pub email:      String,
  pub name:       String,
  pub phone:      Option<String>,
  pub plan:       Plan,
  pub status:     SubscriptionStatus,
  pub credits:    Credits,
  pub expires_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── Entitlement ─────────────────────────────────────────────────────────────

/// The effective `{plan, status, credits, expiry}` for an identity — the
/// answer the rest of the application consults before gating feature access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
  pub plan:       Plan,
  pub status:     SubscriptionStatus,
  pub credits:    Credits,
  pub expires_at: Option<DateTime<Utc>>,
}

impl Entitlement {
  /// The safe default returned for identities with no account row. The
  /// resolver never creates a row on the read path.
  pub fn free_default() -> Self {
    Self {
      plan:       Plan::Free,
      status:     SubscriptionStatus::Active,
      credits:    Plan::Free.credit_grant(),
      expires_at: None,
    }
  }

  pub fn from_account(account: &UserAccount) -> Self {
    Self {
      plan:       account.plan,
      status:     account.status,
      credits:    account.credits,
      expires_at: account.expires_at,
    }
  }
}

// ─── EntitlementGrant ────────────────────────────────────────────────────────

/// The absolute entitlement written when a payment verifies.
///
/// Values overwrite whatever the account held before: a repeat purchase
/// resets the credit balance and the 30-day window rather than stacking
/// onto the remainder. This is a deliberate product policy, not an
/// accumulation bug — see DESIGN.md.
#[derive(Debug, Clone)]
pub struct EntitlementGrant {
  pub email:      String,
  /// Fallback display name for accounts created by the grant itself.
  pub name:       String,
  pub phone:      Option<String>,
  pub plan:       Plan,
  pub credits:    Credits,
  pub expires_at: DateTime<Utc>,
}

impl EntitlementGrant {
  /// Build the grant a verified `payment` earns, expiring 30 days from
  /// `now`.
  pub fn for_payment(payment: &Payment, now: DateTime<Utc>) -> Self {
    let name = payment
      .user_email
      .split('@')
      .next()
      .unwrap_or(payment.user_email.as_str())
      .to_string();

    let phone = if payment.phone.is_empty() {
      None
    } else {
      Some(payment.phone.clone())
    };

    Self {
      email: payment.user_email.clone(),
      name,
      phone,
      plan: payment.plan,
      credits: payment.plan.credit_grant(),
      expires_at: now + grant_validity(),
    }
  }
}
