//! The `LedgerStore` and `ProofStore` traits.
//!
//! `LedgerStore` is implemented by storage backends (e.g.
//! `arogya-store-sqlite`). Higher layers (`arogya-api`, `arogya-cli`)
//! depend on these abstractions, not on any concrete backend.

use std::future::Future;

use crate::{
  account::{EntitlementGrant, UserAccount},
  audit::{AuditEvent, NewAuditEvent},
  payment::{
    Actor, NewPayment, Payment, PaymentId, PaymentStatus, ProofReference,
  },
};

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// Outcome of the status compare-and-swap in
/// [`LedgerStore::transition_status`].
#[derive(Debug, Clone)]
pub enum StatusWrite {
  /// The payment was `pending` and is now in the target status.
  Applied(Payment),
  /// The payment was already terminal; nothing changed. Carries the row as
  /// it stands so callers can report the existing state.
  AlreadyTerminal(Payment),
}

/// Outcome of the entitlement check-and-apply transaction in
/// [`LedgerStore::apply_entitlement`].
#[derive(Debug, Clone)]
pub enum EntitlementApply {
  /// This caller won the claim; the account now reflects the grant.
  Applied(UserAccount),
  /// The grant for this payment was already applied by an earlier call.
  AlreadyApplied,
}

// ─── LedgerStore ─────────────────────────────────────────────────────────────

/// Abstraction over the durable payment ledger.
///
/// Implementations must make `transition_status` and `apply_entitlement`
/// atomic per payment row: two concurrent calls for the same `payment_id`
/// must serialise such that exactly one observes the pending state (or the
/// unapplied flag). A plain read-then-write without isolation is a race.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Payments ──────────────────────────────────────────────────────────

  /// Persist a new payment with status `pending`. `created_at` is set by
  /// the store.
  fn create_payment(
    &self,
    input: NewPayment,
  ) -> impl Future<Output = Result<Payment, Self::Error>> + Send + '_;

  /// Retrieve a payment by id. Returns `None` if not found.
  fn get_payment<'a>(
    &'a self,
    id: &'a PaymentId,
  ) -> impl Future<Output = Result<Option<Payment>, Self::Error>> + Send + 'a;

  /// Locate the payment carrying this merchant-side transaction id —
  /// the correlation key for gateway callbacks.
  fn find_by_merchant_txn<'a>(
    &'a self,
    merchant_txn_id: &'a str,
  ) -> impl Future<Output = Result<Option<Payment>, Self::Error>> + Send + 'a;

  /// List payments, optionally filtered by status, ordered by creation
  /// time ascending.
  fn list_payments(
    &self,
    status: Option<PaymentStatus>,
  ) -> impl Future<Output = Result<Vec<Payment>, Self::Error>> + Send + '_;

  // ── State machine writes ──────────────────────────────────────────────

  /// Compare-and-swap the payment out of `pending` into `target`, setting
  /// `verified_at`/`verified_by`/`notes` in the same write.
  ///
  /// Returns `None` when no payment with `id` exists.
  fn transition_status<'a>(
    &'a self,
    id: &'a PaymentId,
    target: PaymentStatus,
    actor: Actor,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Option<StatusWrite>, Self::Error>> + Send + 'a;

  /// Apply `grant` to the target account and set the payment's
  /// `entitlement_applied` flag, all in one transaction. The account row is
  /// created if absent — exactly one row results even under concurrent
  /// identical calls.
  ///
  /// Returns `None` when no payment with `id` exists.
  fn apply_entitlement<'a>(
    &'a self,
    id: &'a PaymentId,
    grant: &'a EntitlementGrant,
  ) -> impl Future<Output = Result<Option<EntitlementApply>, Self::Error>> + Send + 'a;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Retrieve an account by email. Returns `None` if not found; the read
  /// path never creates rows.
  fn get_account<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + 'a;

  // ── Audit trail ───────────────────────────────────────────────────────

  /// Append an audit event. `audit_id` and `recorded_at` are set by the
  /// store.
  fn append_audit(
    &self,
    input: NewAuditEvent,
  ) -> impl Future<Output = Result<AuditEvent, Self::Error>> + Send + '_;

  /// All audit events referencing `id`, oldest first.
  fn audit_for_payment<'a>(
    &'a self,
    id: &'a PaymentId,
  ) -> impl Future<Output = Result<Vec<AuditEvent>, Self::Error>> + Send + 'a;
}

// ─── ProofStore ──────────────────────────────────────────────────────────────

/// Abstraction over the blob store holding uploaded proof artifacts.
pub trait ProofStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist the uploaded artifact and return a retrievable reference.
  fn store_proof<'a>(
    &'a self,
    file_name: &'a str,
    bytes: &'a [u8],
  ) -> impl Future<Output = Result<ProofReference, Self::Error>> + Send + 'a;
}
