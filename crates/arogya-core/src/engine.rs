//! The verification engine — intake, the pending→terminal state machine,
//! entitlement application, and the read-side resolver.
//!
//! Identity is always an explicit parameter into these operations, never
//! ambient state; authorization (e.g. "is this caller an admin") is the
//! boundary layer's job and is never re-derived here.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::{
  account::{Entitlement, EntitlementGrant},
  audit::{AuditKind, NewAuditEvent},
  error::{Error, Result},
  payment::{
    Actor, NewPayment, Payment, PaymentId, PaymentStatus,
    generate_merchant_txn_id,
  },
  plan::Plan,
  store::{EntitlementApply, LedgerStore, ProofStore, StatusWrite},
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// A claimed payment submitted through the manual proof-upload flow.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
  pub plan_id:         String,
  pub phone:           String,
  pub proof_file_name: String,
  pub proof_bytes:     Vec<u8>,
}

/// Terminal state a transition drives toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
  Verified,
  Rejected,
}

impl TargetStatus {
  fn as_payment_status(self) -> PaymentStatus {
    match self {
      Self::Verified => PaymentStatus::Verified,
      Self::Rejected => PaymentStatus::Rejected,
    }
  }
}

/// An authenticated, decoded notification from the payment processor.
/// Signature verification happens upstream, in `arogya-gateway` — by the
/// time an event reaches the engine it is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
  PaymentSucceeded {
    merchant_txn_id: String,
    gateway_txn_id:  String,
    amount_paise:    u64,
  },
  PaymentFailed {
    merchant_txn_id: String,
    gateway_txn_id:  Option<String>,
    code:            String,
  },
  Unrecognized {
    code: String,
  },
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`VerificationEngine::transition`]: either the transition was
/// applied now, or the payment was already terminal and nothing changed.
/// The no-op is success, not an error — a retried admin click or redelivered
/// webhook must observe the same final state as the first call.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
  Applied(Payment),
  Noop(Payment),
}

impl TransitionOutcome {
  pub fn payment(&self) -> &Payment {
    match self {
      Self::Applied(p) | Self::Noop(p) => p,
    }
  }

  pub fn is_noop(&self) -> bool { matches!(self, Self::Noop(_)) }
}

/// What the engine did with a gateway callback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
  /// The referenced payment transitioned to `verified`.
  Verified,
  /// The referenced payment transitioned to `rejected`.
  Rejected,
  /// The referenced payment was already terminal; nothing changed.
  AlreadySettled,
  /// Acknowledged but not acted upon (unrecognized event, unknown
  /// transaction, unmappable amount). An audit row records the details.
  Ignored,
}

impl CallbackDisposition {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Verified => "verified",
      Self::Rejected => "rejected",
      Self::AlreadySettled => "already settled",
      Self::Ignored => "ignored",
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The payment verification engine.
///
/// Cloning is cheap — the ledger handle is reference-counted.
#[derive(Clone)]
pub struct VerificationEngine<S> {
  ledger: Arc<S>,
}

impl<S: LedgerStore> VerificationEngine<S> {
  pub fn new(ledger: Arc<S>) -> Self { Self { ledger } }

  /// Direct access to the underlying ledger, for read-only listings.
  pub fn ledger(&self) -> &S { &self.ledger }

  // ── Intake ────────────────────────────────────────────────────────────

  /// Accept a claimed payment from the manual proof-upload flow and create
  /// a `pending` ledger row.
  ///
  /// The amount is computed from the plan's canonical price table; any
  /// client-supplied figure is ignored. The proof artifact is persisted
  /// first — a blob-store failure leaves no ledger row behind.
  pub async fn submit<P: ProofStore>(
    &self,
    proofs: &P,
    req: IntakeRequest,
    identity: Option<&str>,
  ) -> Result<Payment> {
    let email = identity.ok_or(Error::Unauthenticated)?;
    let plan = Plan::parse(&req.plan_id)?;

    if req.phone.trim().is_empty() {
      return Err(Error::Validation("contact phone is required".into()));
    }
    if req.proof_bytes.is_empty() {
      return Err(Error::Validation("payment proof is required".into()));
    }

    let proof = proofs
      .store_proof(&req.proof_file_name, &req.proof_bytes)
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?;

    let payment_id = PaymentId::generate();
    let note = format!(
      "Arogya-{}-{}",
      plan.as_str(),
      Utc::now().timestamp_millis()
    );

    let payment = self
      .ledger
      .create_payment(NewPayment {
        payment_id:       payment_id.clone(),
        plan,
        amount:           plan.price(),
        phone:            req.phone.trim().to_string(),
        user_email:       email.to_string(),
        merchant_txn_id:  generate_merchant_txn_id(),
        transaction_note: Some(note),
        proof:            Some(proof),
      })
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?;

    let mut event =
      NewAuditEvent::new(Some(payment_id), AuditKind::Submitted);
    event.new_status = Some(PaymentStatus::Pending);
    event.data = json!({
      "plan": plan.as_str(),
      "amount": payment.amount,
      "source": "manual",
    });
    self.audit(event).await;

    Ok(payment)
  }

  /// Create a `pending` row for a gateway-initiated payment, before the
  /// user is redirected to the processor. The returned row carries the
  /// merchant transaction id the processor will echo back in its callback.
  pub async fn initiate(
    &self,
    plan_id: &str,
    phone: &str,
    identity: Option<&str>,
  ) -> Result<Payment> {
    let email = identity.ok_or(Error::Unauthenticated)?;
    let plan = Plan::parse(plan_id)?;

    let payment_id = PaymentId::generate();
    let payment = self
      .ledger
      .create_payment(NewPayment {
        payment_id:       payment_id.clone(),
        plan,
        amount:           plan.price(),
        phone:            phone.trim().to_string(),
        user_email:       email.to_string(),
        merchant_txn_id:  generate_merchant_txn_id(),
        transaction_note: None,
        proof:            None,
      })
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?;

    let mut event =
      NewAuditEvent::new(Some(payment_id), AuditKind::Submitted);
    event.new_status = Some(PaymentStatus::Pending);
    event.data = json!({
      "plan": plan.as_str(),
      "amount": payment.amount,
      "source": "gateway",
      "merchant_txn_id": payment.merchant_txn_id,
    });
    self.audit(event).await;

    Ok(payment)
  }

  /// Create the row for a settled payment intake never recorded. The
  /// callback carries no user identity, so the row is unattributed until
  /// reconciliation assigns it one; the merchant transaction id preserves
  /// the link back to the processor.
  async fn create_from_callback(
    &self,
    plan: Plan,
    merchant_txn_id: &str,
    gateway_txn_id: &str,
  ) -> Result<Payment> {
    let payment_id = PaymentId::generate();
    let payment = self
      .ledger
      .create_payment(NewPayment {
        payment_id:       payment_id.clone(),
        plan,
        amount:           plan.price(),
        phone:            String::new(),
        user_email:       String::new(),
        merchant_txn_id:  merchant_txn_id.to_string(),
        transaction_note: None,
        proof:            None,
      })
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?;

    let mut event =
      NewAuditEvent::new(Some(payment_id), AuditKind::Submitted);
    event.new_status = Some(PaymentStatus::Pending);
    event.actor = Some(Actor::Gateway);
    event.data = json!({
      "plan": plan.as_str(),
      "amount": payment.amount,
      "source": "gateway_callback",
      "merchant_txn_id": merchant_txn_id,
      "gateway_txn_id": gateway_txn_id,
    });
    self.audit(event).await;

    Ok(payment)
  }

  // ── State machine ─────────────────────────────────────────────────────

  /// Drive a payment from `pending` into a terminal status.
  ///
  /// Idempotent: if the payment is already terminal, the existing state is
  /// returned as a [`TransitionOutcome::Noop`] and no entitlement is
  /// re-applied, though the duplicate attempt itself is still audited. The
  /// one exception is a verified row whose entitlement write failed
  /// mid-flight — a repeated verify completes that work.
  pub async fn transition(
    &self,
    id: &PaymentId,
    target: TargetStatus,
    actor: Actor,
  ) -> Result<TransitionOutcome> {
    let target_status = target.as_payment_status();
    let notes = match target {
      TargetStatus::Verified => {
        format!("payment verified by {}", actor.as_str())
      }
      TargetStatus::Rejected => {
        format!("payment rejected by {}", actor.as_str())
      }
    };

    let write = self
      .ledger
      .transition_status(id, target_status, actor, Some(notes))
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?
      .ok_or_else(|| Error::PaymentNotFound(id.clone()))?;

    match write {
      StatusWrite::Applied(payment) => match target {
        TargetStatus::Rejected => {
          // No entitlement was granted, so there is nothing to roll back
          // and the account is never touched.
          let mut event =
            NewAuditEvent::new(Some(payment.payment_id.clone()), AuditKind::Rejected);
          event.old_status = Some(PaymentStatus::Pending);
          event.new_status = Some(PaymentStatus::Rejected);
          event.actor = Some(actor);
          self.audit(event).await;
          Ok(TransitionOutcome::Applied(payment))
        }
        TargetStatus::Verified => {
          let (payment, _) = self.apply_grant(payment, actor).await?;
          Ok(TransitionOutcome::Applied(payment))
        }
      },
      StatusWrite::AlreadyTerminal(payment) => {
        if payment.status == PaymentStatus::Verified
          && target == TargetStatus::Verified
          && !payment.entitlement_applied
        {
          // Verified-but-unapplied: an earlier verify marked the row but
          // failed before the account write. Finish the job — unless a
          // concurrent retry got there first, in which case this attempt
          // changed nothing.
          let (payment, applied) = self.apply_grant(payment, actor).await?;
          return Ok(if applied {
            TransitionOutcome::Applied(payment)
          } else {
            TransitionOutcome::Noop(payment)
          });
        }

        let mut event = NewAuditEvent::new(
          Some(payment.payment_id.clone()),
          AuditKind::DuplicateTransition,
        );
        event.old_status = Some(payment.status);
        event.new_status = Some(payment.status);
        event.actor = Some(actor);
        event.data = json!({ "requested": target_status.as_str() });
        self.audit(event).await;

        Ok(TransitionOutcome::Noop(payment))
      }
    }
  }

  /// Steps two and three of the verify transition: build the grant, upsert
  /// the account, and set the applied flag — one store transaction, so
  /// concurrent racers apply it exactly once. The returned flag is `true`
  /// when this call won the claim.
  async fn apply_grant(
    &self,
    payment: Payment,
    actor: Actor,
  ) -> Result<(Payment, bool)> {
    let grant = EntitlementGrant::for_payment(&payment, Utc::now());

    let apply = match self
      .ledger
      .apply_entitlement(&payment.payment_id, &grant)
      .await
    {
      Ok(Some(apply)) => apply,
      Ok(None) => {
        return Err(Error::PaymentNotFound(payment.payment_id.clone()));
      }
      Err(e) => {
        // The payment is marked verified but the account write failed. The
        // applied flag is still unset, so a retry of the same transition
        // finishes the activation; record the failure loudly for alerting.
        let mut event = NewAuditEvent::new(
          Some(payment.payment_id.clone()),
          AuditKind::ApplyFailed,
        );
        event.old_status = Some(PaymentStatus::Pending);
        event.new_status = Some(PaymentStatus::Verified);
        event.actor = Some(actor);
        event.data = json!({ "error": e.to_string() });
        self.audit(event).await;

        return Err(Error::EntitlementApplyFailed {
          payment_id: payment.payment_id.clone(),
          source:     Box::new(e),
        });
      }
    };

    let won_claim = match apply {
      EntitlementApply::Applied(account) => {
        let mut event = NewAuditEvent::new(
          Some(payment.payment_id.clone()),
          AuditKind::Activated,
        );
        event.old_status = Some(PaymentStatus::Pending);
        event.new_status = Some(PaymentStatus::Verified);
        event.actor = Some(actor);
        event.data = json!({
          "email": account.email,
          "plan": account.plan.as_str(),
          "credits": account.credits,
          "expires_at": account.expires_at,
        });
        self.audit(event).await;
        true
      }
      EntitlementApply::AlreadyApplied => {
        // A concurrent caller won the claim; its audit row covers the
        // activation. This attempt is still logged.
        let mut event = NewAuditEvent::new(
          Some(payment.payment_id.clone()),
          AuditKind::DuplicateTransition,
        );
        event.old_status = Some(PaymentStatus::Verified);
        event.new_status = Some(PaymentStatus::Verified);
        event.actor = Some(actor);
        event.data =
          json!({ "requested": "verified", "reason": "grant already applied" });
        self.audit(event).await;
        false
      }
    };

    // Re-read so callers observe the committed flag.
    let payment = self
      .ledger
      .get_payment(&payment.payment_id)
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?
      .ok_or_else(|| Error::PaymentNotFound(payment.payment_id.clone()))?;
    Ok((payment, won_claim))
  }

  // ── Resolver ──────────────────────────────────────────────────────────

  /// What plan/credits does this identity currently have?
  ///
  /// Never fails on an absent account: the free-tier default is returned
  /// and no row is created — the read path stays side-effect-free.
  pub async fn resolve(&self, identity: &str) -> Result<Entitlement> {
    let account = self
      .ledger
      .get_account(identity)
      .await
      .map_err(|e| Error::Storage(Box::new(e)))?;

    Ok(
      account
        .as_ref()
        .map(Entitlement::from_account)
        .unwrap_or_else(Entitlement::free_default),
    )
  }

  // ── Gateway callbacks ─────────────────────────────────────────────────

  /// Act on an authenticated processor notification.
  ///
  /// Success and failure events map onto the same state machine as admin
  /// decisions, keyed by the merchant transaction id stored at intake. A
  /// settled payment intake never recorded is reconstructed from the
  /// callback rather than dropped. Everything else is acknowledged (so the
  /// processor stops retrying) and recorded in the audit trail.
  pub async fn handle_gateway_event(
    &self,
    event: GatewayEvent,
  ) -> Result<CallbackDisposition> {
    match event {
      GatewayEvent::PaymentSucceeded {
        merchant_txn_id,
        gateway_txn_id,
        amount_paise,
      } => {
        let payment = self
          .ledger
          .find_by_merchant_txn(&merchant_txn_id)
          .await
          .map_err(|e| Error::Storage(Box::new(e)))?;

        let payment = match payment {
          Some(payment) => payment,
          None => {
            // Intake never saw this transaction. A settled payment must
            // not be lost, so create the row from the callback itself —
            // the plan is recoverable from the canonical price table. An
            // amount matching no plan cannot be mapped; record it for
            // manual reconciliation.
            let Some(plan) = Plan::from_price_paise(amount_paise) else {
              let mut event =
                NewAuditEvent::new(None, AuditKind::IgnoredEvent);
              event.actor = Some(Actor::Gateway);
              event.data = json!({
                "reason": "amount matches no canonical plan price",
                "merchant_txn_id": merchant_txn_id,
                "gateway_txn_id": gateway_txn_id,
                "amount_paise": amount_paise,
              });
              self.audit(event).await;
              return Ok(CallbackDisposition::Ignored);
            };
            self
              .create_from_callback(plan, &merchant_txn_id, &gateway_txn_id)
              .await?
          }
        };

        if amount_paise != payment.plan.price_paise() {
          // The processor settled a different amount than the plan costs.
          // Do not activate anything on a mismatched settlement.
          let mut event = NewAuditEvent::new(
            Some(payment.payment_id.clone()),
            AuditKind::IgnoredEvent,
          );
          event.actor = Some(Actor::Gateway);
          event.data = json!({
            "reason": "settled amount does not match plan price",
            "expected_paise": payment.plan.price_paise(),
            "amount_paise": amount_paise,
            "gateway_txn_id": gateway_txn_id,
          });
          self.audit(event).await;
          return Ok(CallbackDisposition::Ignored);
        }

        let outcome = self
          .transition(&payment.payment_id, TargetStatus::Verified, Actor::Gateway)
          .await?;
        Ok(match outcome {
          TransitionOutcome::Applied(_) => CallbackDisposition::Verified,
          TransitionOutcome::Noop(_) => CallbackDisposition::AlreadySettled,
        })
      }

      GatewayEvent::PaymentFailed {
        merchant_txn_id,
        gateway_txn_id,
        code,
      } => {
        let payment = self
          .ledger
          .find_by_merchant_txn(&merchant_txn_id)
          .await
          .map_err(|e| Error::Storage(Box::new(e)))?;

        let Some(payment) = payment else {
          let mut event =
            NewAuditEvent::new(None, AuditKind::IgnoredEvent);
          event.actor = Some(Actor::Gateway);
          event.data = json!({
            "reason": "no payment matches merchant transaction id",
            "merchant_txn_id": merchant_txn_id,
            "gateway_txn_id": gateway_txn_id,
            "code": code,
          });
          self.audit(event).await;
          return Ok(CallbackDisposition::Ignored);
        };

        let outcome = self
          .transition(&payment.payment_id, TargetStatus::Rejected, Actor::Gateway)
          .await?;
        Ok(match outcome {
          TransitionOutcome::Applied(_) => CallbackDisposition::Rejected,
          TransitionOutcome::Noop(_) => CallbackDisposition::AlreadySettled,
        })
      }

      GatewayEvent::Unrecognized { code } => {
        let mut event = NewAuditEvent::new(None, AuditKind::IgnoredEvent);
        event.actor = Some(Actor::Gateway);
        event.data = json!({ "reason": "unrecognized event code", "code": code });
        self.audit(event).await;
        Ok(CallbackDisposition::Ignored)
      }
    }
  }

  /// Record a callback that was rejected or ignored before reaching any
  /// ledger row (bad signature, malformed payload).
  pub async fn record_unmatched_callback(
    &self,
    kind: AuditKind,
    data: serde_json::Value,
  ) {
    let mut event = NewAuditEvent::new(None, kind);
    event.actor = Some(Actor::Gateway);
    event.data = data;
    self.audit(event).await;
  }

  // ── Audit helper ──────────────────────────────────────────────────────

  /// Append to the audit trail. A logging failure is reported through
  /// tracing, never propagated — auditing must not fail the caller's
  /// primary operation.
  async fn audit(&self, input: NewAuditEvent) {
    if let Err(e) = self.ledger.append_audit(input).await {
      tracing::warn!(error = %e, "audit append failed");
    }
  }
}
