//! Integration tests for `SqliteStore` and the verification engine against
//! an in-memory database.

use std::sync::Arc;

use arogya_core::{
  Error as CoreError,
  account::SubscriptionStatus,
  audit::AuditKind,
  engine::{
    CallbackDisposition, GatewayEvent, IntakeRequest, TargetStatus,
    VerificationEngine,
  },
  payment::{Actor, PaymentId, PaymentStatus, ProofReference},
  plan::{Credits, Plan},
  store::{LedgerStore, ProofStore, StatusWrite},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn engine() -> VerificationEngine<SqliteStore> {
  VerificationEngine::new(Arc::new(store().await))
}

/// In-memory proof store that never fails.
struct MemProofs;

impl ProofStore for MemProofs {
  type Error = std::convert::Infallible;

  async fn store_proof(
    &self,
    file_name: &str,
    _bytes: &[u8],
  ) -> Result<ProofReference, Self::Error> {
    Ok(ProofReference(format!("mem/{file_name}")))
  }
}

/// Proof store whose writes always fail, for intake-ordering tests.
struct FailingProofs;

impl ProofStore for FailingProofs {
  type Error = std::io::Error;

  async fn store_proof(
    &self,
    _file_name: &str,
    _bytes: &[u8],
  ) -> Result<ProofReference, Self::Error> {
    Err(std::io::Error::other("blob store unavailable"))
  }
}

fn intake(plan: &str) -> IntakeRequest {
  IntakeRequest {
    plan_id:         plan.into(),
    phone:           "+911234567890".into(),
    proof_file_name: "upi-screenshot.png".into(),
    proof_bytes:     vec![0xff, 0xd8, 0xff],
  }
}

async fn submit(
  engine: &VerificationEngine<SqliteStore>,
  plan: &str,
  email: &str,
) -> arogya_core::payment::Payment {
  engine
    .submit(&MemProofs, intake(plan), Some(email))
    .await
    .expect("submit")
}

// ─── Intake ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_creates_pending_payment_with_canonical_amount() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;

  assert_eq!(payment.plan, Plan::Basic);
  assert_eq!(payment.amount, 299);
  assert_eq!(payment.status, PaymentStatus::Pending);
  assert_eq!(payment.user_email, "asha@example.com");
  assert!(payment.proof.is_some());
  assert!(payment.merchant_txn_id.starts_with("TXN_"));
  assert!(!payment.entitlement_applied);

  let trail = e.ledger().audit_for_payment(&payment.payment_id).await.unwrap();
  assert_eq!(trail.len(), 1);
  assert_eq!(trail[0].kind, AuditKind::Submitted);
  assert_eq!(trail[0].data["source"], "manual");
}

#[tokio::test]
async fn submit_without_identity_is_rejected() {
  let e = engine().await;
  let err = e.submit(&MemProofs, intake("basic"), None).await.unwrap_err();
  assert!(matches!(err, CoreError::Unauthenticated));
}

#[tokio::test]
async fn submit_rejects_unknown_plan() {
  let e = engine().await;
  let err = e
    .submit(&MemProofs, intake("platinum"), Some("asha@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::UnknownPlan(p) if p == "platinum"));
}

#[tokio::test]
async fn submit_rejects_blank_phone_and_empty_proof() {
  let e = engine().await;

  let mut req = intake("basic");
  req.phone = "   ".into();
  let err = e
    .submit(&MemProofs, req, Some("asha@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  let mut req = intake("basic");
  req.proof_bytes = Vec::new();
  let err = e
    .submit(&MemProofs, req, Some("asha@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn proof_store_failure_leaves_no_ledger_row() {
  let e = engine().await;
  let err = e
    .submit(&FailingProofs, intake("basic"), Some("asha@example.com"))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Storage(_)));

  let all = e.ledger().list_payments(None).await.unwrap();
  assert!(all.is_empty());
}

// ─── Verify / reject ─────────────────────────────────────────────────────────

#[tokio::test]
async fn verify_applies_entitlement() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;

  let outcome = e
    .transition(&payment.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();
  assert!(!outcome.is_noop());

  let payment = outcome.payment();
  assert_eq!(payment.status, PaymentStatus::Verified);
  assert_eq!(payment.verified_by, Some(Actor::Admin));
  assert!(payment.verified_at.is_some());
  assert!(payment.entitlement_applied);

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .expect("account created");
  assert_eq!(account.plan, Plan::Basic);
  assert_eq!(account.status, SubscriptionStatus::Active);
  assert_eq!(account.credits, Credits(25));
  assert_eq!(account.name, "asha");
  let expires = account.expires_at.expect("expiry set");
  let days = (expires - chrono::Utc::now()).num_days();
  assert!((29..=30).contains(&days), "expiry {days} days out");
}

#[tokio::test]
async fn repeated_verify_is_a_noop_with_one_activation() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  let id = payment.payment_id.clone();

  let first = e
    .transition(&id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();
  assert!(!first.is_noop());

  let second = e
    .transition(&id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();
  assert!(second.is_noop());
  assert_eq!(second.payment().status, PaymentStatus::Verified);

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.credits, Credits(25));

  let trail = e.ledger().audit_for_payment(&id).await.unwrap();
  let activated = trail.iter().filter(|ev| ev.kind == AuditKind::Activated);
  let duplicates = trail
    .iter()
    .filter(|ev| ev.kind == AuditKind::DuplicateTransition);
  assert_eq!(activated.count(), 1);
  assert_eq!(duplicates.count(), 1);
}

#[tokio::test]
async fn repeat_purchase_overwrites_credits() {
  let e = engine().await;

  let p1 = submit(&e, "basic", "asha@example.com").await;
  e.transition(&p1.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();

  let p2 = submit(&e, "premium", "asha@example.com").await;
  e.transition(&p2.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.plan, Plan::Premium);
  assert!(account.credits.is_unlimited());

  // A later basic purchase resets to 25 — never 25 plus a remainder.
  let p3 = submit(&e, "basic", "asha@example.com").await;
  e.transition(&p3.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.plan, Plan::Basic);
  assert_eq!(account.credits, Credits(25));
}

#[tokio::test]
async fn reject_never_touches_the_account() {
  let e = engine().await;
  let payment = submit(&e, "premium", "ravi@example.com").await;

  let outcome = e
    .transition(&payment.payment_id, TargetStatus::Rejected, Actor::Admin)
    .await
    .unwrap();
  assert!(!outcome.is_noop());
  assert_eq!(outcome.payment().status, PaymentStatus::Rejected);

  assert!(e.ledger().get_account("ravi@example.com").await.unwrap().is_none());

  let trail = e.ledger().audit_for_payment(&payment.payment_id).await.unwrap();
  assert!(trail.iter().any(|ev| ev.kind == AuditKind::Rejected));
}

#[tokio::test]
async fn terminal_status_is_monotonic() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  let id = payment.payment_id.clone();

  e.transition(&id, TargetStatus::Rejected, Actor::Admin)
    .await
    .unwrap();

  // A verify after a reject must not resurrect the payment.
  let outcome = e
    .transition(&id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();
  assert!(outcome.is_noop());
  assert_eq!(outcome.payment().status, PaymentStatus::Rejected);
  assert!(e.ledger().get_account("asha@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn transition_unknown_payment_errors() {
  let e = engine().await;
  let id = PaymentId::generate();
  let err = e
    .transition(&id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::PaymentNotFound(p) if p == id));
}

#[tokio::test]
async fn concurrent_verifies_apply_the_grant_once() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  let id = payment.payment_id.clone();

  let (a, b) = tokio::join!(
    e.transition(&id, TargetStatus::Verified, Actor::Admin),
    e.transition(&id, TargetStatus::Verified, Actor::Admin),
  );
  a.unwrap();
  b.unwrap();

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.credits, Credits(25));

  let trail = e.ledger().audit_for_payment(&id).await.unwrap();
  let activated = trail.iter().filter(|ev| ev.kind == AuditKind::Activated);
  assert_eq!(activated.count(), 1);
}

#[tokio::test]
async fn racing_retries_on_an_unapplied_row_log_both_attempts() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  let id = payment.payment_id.clone();

  // Leave the row verified but unapplied, as if an earlier verify failed
  // between the status write and the account write.
  e.ledger()
    .transition_status(&id, PaymentStatus::Verified, Actor::Admin, None)
    .await
    .unwrap()
    .unwrap();

  let (a, b) = tokio::join!(
    e.transition(&id, TargetStatus::Verified, Actor::Admin),
    e.transition(&id, TargetStatus::Verified, Actor::Admin),
  );
  let a = a.unwrap();
  let b = b.unwrap();

  // One retry completed the activation, the other changed nothing.
  assert_eq!(a.is_noop() as u8 + b.is_noop() as u8, 1);

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.credits, Credits(25));

  // Both attempts are on the trail: one activation, one duplicate.
  let trail = e.ledger().audit_for_payment(&id).await.unwrap();
  let activated = trail
    .iter()
    .filter(|ev| ev.kind == AuditKind::Activated)
    .count();
  let duplicates = trail
    .iter()
    .filter(|ev| ev.kind == AuditKind::DuplicateTransition)
    .count();
  assert_eq!(activated, 1);
  assert_eq!(duplicates, 1);
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_defaults_to_free_without_creating_a_row() {
  let e = engine().await;

  let ent = e.resolve("nobody@example.com").await.unwrap();
  assert_eq!(ent.plan, Plan::Free);
  assert_eq!(ent.status, SubscriptionStatus::Active);
  assert_eq!(ent.credits, Credits(5));
  assert!(ent.expires_at.is_none());

  assert!(
    e.ledger()
      .get_account("nobody@example.com")
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn resolve_reflects_activation() {
  let e = engine().await;
  let payment = submit(&e, "premium", "asha@example.com").await;
  e.transition(&payment.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();

  let ent = e.resolve("asha@example.com").await.unwrap();
  assert_eq!(ent.plan, Plan::Premium);
  assert_eq!(ent.status, SubscriptionStatus::Active);
  assert!(ent.credits.is_unlimited());
  assert!(ent.expires_at.is_some());
}

// ─── Gateway events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn gateway_success_event_verifies_the_payment() {
  let e = engine().await;
  let payment = e
    .initiate("basic", "+911234567890", Some("asha@example.com"))
    .await
    .unwrap();

  let disposition = e
    .handle_gateway_event(GatewayEvent::PaymentSucceeded {
      merchant_txn_id: payment.merchant_txn_id.clone(),
      gateway_txn_id:  "T2408".into(),
      amount_paise:    29900,
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Verified);

  let stored = e
    .ledger()
    .get_payment(&payment.payment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, PaymentStatus::Verified);
  assert_eq!(stored.verified_by, Some(Actor::Gateway));

  let account = e
    .ledger()
    .get_account("asha@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(account.plan, Plan::Basic);
}

#[tokio::test]
async fn gateway_redelivery_is_already_settled() {
  let e = engine().await;
  let payment = e
    .initiate("basic", "+911234567890", Some("asha@example.com"))
    .await
    .unwrap();

  let event = GatewayEvent::PaymentSucceeded {
    merchant_txn_id: payment.merchant_txn_id.clone(),
    gateway_txn_id:  "T2408".into(),
    amount_paise:    29900,
  };

  let first = e.handle_gateway_event(event.clone()).await.unwrap();
  assert_eq!(first, CallbackDisposition::Verified);

  let second = e.handle_gateway_event(event).await.unwrap();
  assert_eq!(second, CallbackDisposition::AlreadySettled);
}

#[tokio::test]
async fn gateway_event_for_unknown_transaction_creates_and_verifies_a_row() {
  let e = engine().await;

  let disposition = e
    .handle_gateway_event(GatewayEvent::PaymentSucceeded {
      merchant_txn_id: "TXN_never_seen".into(),
      gateway_txn_id:  "T2408".into(),
      amount_paise:    29900,
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Verified);

  // The settled payment was not lost: a row exists, verified by the
  // gateway, with the plan recovered from the canonical price table.
  let all = e.ledger().list_payments(None).await.unwrap();
  assert_eq!(all.len(), 1);
  let payment = &all[0];
  assert_eq!(payment.plan, Plan::Basic);
  assert_eq!(payment.amount, 299);
  assert_eq!(payment.merchant_txn_id, "TXN_never_seen");
  assert_eq!(payment.status, PaymentStatus::Verified);
  assert_eq!(payment.verified_by, Some(Actor::Gateway));
  assert!(payment.user_email.is_empty());
  assert!(payment.proof.is_none());

  let trail = e.ledger().audit_for_payment(&payment.payment_id).await.unwrap();
  assert!(trail.iter().any(|ev| {
    ev.kind == AuditKind::Submitted && ev.data["source"] == "gateway_callback"
  }));
  assert!(trail.iter().any(|ev| ev.kind == AuditKind::Activated));
}

#[tokio::test]
async fn gateway_event_with_no_canonical_amount_is_ignored_and_audited() {
  let e = engine().await;

  // 12345 paise maps to no plan, so no row can be reconstructed.
  let disposition = e
    .handle_gateway_event(GatewayEvent::PaymentSucceeded {
      merchant_txn_id: "TXN_unknown".into(),
      gateway_txn_id:  "T2408".into(),
      amount_paise:    12345,
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Ignored);
  assert!(e.ledger().list_payments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_amount_mismatch_is_ignored() {
  let e = engine().await;
  let payment = e
    .initiate("basic", "+911234567890", Some("asha@example.com"))
    .await
    .unwrap();

  let disposition = e
    .handle_gateway_event(GatewayEvent::PaymentSucceeded {
      merchant_txn_id: payment.merchant_txn_id.clone(),
      gateway_txn_id:  "T2408".into(),
      amount_paise:    59900,
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Ignored);

  let stored = e
    .ledger()
    .get_payment(&payment.payment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, PaymentStatus::Pending);

  let trail = e.ledger().audit_for_payment(&payment.payment_id).await.unwrap();
  assert!(trail.iter().any(|ev| ev.kind == AuditKind::IgnoredEvent));
}

#[tokio::test]
async fn gateway_failure_event_rejects_the_payment() {
  let e = engine().await;
  let payment = e
    .initiate("premium", "+911234567890", Some("ravi@example.com"))
    .await
    .unwrap();

  let disposition = e
    .handle_gateway_event(GatewayEvent::PaymentFailed {
      merchant_txn_id: payment.merchant_txn_id.clone(),
      gateway_txn_id:  Some("T2408".into()),
      code:            "PAYMENT_DECLINED".into(),
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Rejected);

  let stored = e
    .ledger()
    .get_payment(&payment.payment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, PaymentStatus::Rejected);
  assert!(e.ledger().get_account("ravi@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn unrecognized_gateway_event_is_ignored() {
  let e = engine().await;
  let disposition = e
    .handle_gateway_event(GatewayEvent::Unrecognized {
      code: "PAYMENT_PENDING".into(),
    })
    .await
    .unwrap();
  assert_eq!(disposition, CallbackDisposition::Ignored);
}

// ─── Store-level behaviour ───────────────────────────────────────────────────

#[tokio::test]
async fn transition_status_is_a_compare_and_swap() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  let s = e.ledger();

  let first = s
    .transition_status(
      &payment.payment_id,
      PaymentStatus::Verified,
      Actor::Admin,
      None,
    )
    .await
    .unwrap()
    .unwrap();
  assert!(matches!(first, StatusWrite::Applied(_)));

  let second = s
    .transition_status(
      &payment.payment_id,
      PaymentStatus::Rejected,
      Actor::Admin,
      None,
    )
    .await
    .unwrap()
    .unwrap();
  let StatusWrite::AlreadyTerminal(p) = second else {
    panic!("second write must not apply");
  };
  assert_eq!(p.status, PaymentStatus::Verified);
}

#[tokio::test]
async fn list_pending_is_ordered_by_creation() {
  let e = engine().await;
  let first = submit(&e, "basic", "a@example.com").await;
  let second = submit(&e, "premium", "b@example.com").await;
  e.transition(&second.payment_id, TargetStatus::Rejected, Actor::Admin)
    .await
    .unwrap();
  let third = submit(&e, "basic", "c@example.com").await;

  let pending = e
    .ledger()
    .list_payments(Some(PaymentStatus::Pending))
    .await
    .unwrap();
  assert_eq!(pending.len(), 2);
  assert_eq!(pending[0].payment_id, first.payment_id);
  assert_eq!(pending[1].payment_id, third.payment_id);

  let all = e.ledger().list_payments(None).await.unwrap();
  assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn audit_trail_round_trips_structured_data() {
  let e = engine().await;
  let payment = submit(&e, "basic", "asha@example.com").await;
  e.transition(&payment.payment_id, TargetStatus::Verified, Actor::Admin)
    .await
    .unwrap();

  let trail = e.ledger().audit_for_payment(&payment.payment_id).await.unwrap();
  assert_eq!(trail.len(), 2);

  assert_eq!(trail[0].kind, AuditKind::Submitted);
  assert_eq!(trail[0].data["plan"], "basic");
  assert_eq!(trail[0].data["amount"], 299);

  assert_eq!(trail[1].kind, AuditKind::Activated);
  assert_eq!(trail[1].actor, Some(Actor::Admin));
  assert_eq!(trail[1].old_status, Some(PaymentStatus::Pending));
  assert_eq!(trail[1].new_status, Some(PaymentStatus::Verified));
  assert_eq!(trail[1].data["credits"], 25);
}

#[tokio::test]
async fn audit_for_unknown_payment_is_empty() {
  let s = store().await;
  let trail = s.audit_for_payment(&PaymentId::generate()).await.unwrap();
  assert!(trail.is_empty());
}
