//! Subscription plans and the static price / credit-grant tables.
//!
//! The tables here are configuration, not data: the server computes every
//! amount from the plan and never trusts a client-supplied price.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How long a verified payment's entitlement remains active, in days.
pub const GRANT_VALIDITY_DAYS: i64 = 30;

/// The entitlement window granted by a verified payment.
pub fn grant_validity() -> Duration { Duration::days(GRANT_VALIDITY_DAYS) }

// ─── Plan ────────────────────────────────────────────────────────────────────

/// A named subscription tier with a fixed price and credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
  Free,
  Basic,
  Premium,
}

impl Plan {
  /// Parse the plan identifier submitted at the boundary.
  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "free" => Ok(Self::Free),
      "basic" => Ok(Self::Basic),
      "premium" => Ok(Self::Premium),
      other => Err(Error::UnknownPlan(other.to_string())),
    }
  }

  /// The identifier string stored in the `plan` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Free => "free",
      Self::Basic => "basic",
      Self::Premium => "premium",
    }
  }

  /// Capitalised name shown to users.
  pub fn display_name(&self) -> &'static str {
    match self {
      Self::Free => "Free",
      Self::Basic => "Basic",
      Self::Premium => "Premium",
    }
  }

  /// Canonical price in whole rupees. Every Payment row stores this value,
  /// whatever the client claimed to have paid.
  pub fn price(&self) -> u32 {
    match self {
      Self::Free => 0,
      Self::Basic => 299,
      Self::Premium => 599,
    }
  }

  /// The same price in paise — the unit the payment processor reports.
  pub fn price_paise(&self) -> u64 { u64::from(self.price()) * 100 }

  /// The credit allowance applied when a payment for this plan verifies.
  pub fn credit_grant(&self) -> Credits {
    match self {
      Self::Free => Credits(5),
      Self::Basic => Credits(25),
      Self::Premium => Credits::UNLIMITED,
    }
  }

  /// Reverse price lookup, used when a processor callback arrives for a
  /// transaction the intake flow never recorded.
  pub fn from_price_paise(paise: u64) -> Option<Self> {
    [Self::Free, Self::Basic, Self::Premium]
      .into_iter()
      .find(|p| p.price_paise() == paise)
  }
}

impl std::fmt::Display for Plan {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Credits ─────────────────────────────────────────────────────────────────

/// Consumable allowance of consultations. `-1` denotes unlimited, which is
/// only ever granted by the premium plan.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(pub i64);

impl Credits {
  pub const UNLIMITED: Credits = Credits(-1);

  pub fn is_unlimited(&self) -> bool { self.0 == -1 }
}

impl std::fmt::Display for Credits {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.is_unlimited() {
      f.write_str("unlimited")
    } else {
      write!(f, "{}", self.0)
    }
  }
}
