//! [`SqliteStore`] — the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use arogya_core::{
  account::{EntitlementGrant, UserAccount},
  audit::{AuditEvent, NewAuditEvent},
  payment::{Actor, NewPayment, Payment, PaymentId, PaymentStatus},
  store::{EntitlementApply, LedgerStore, StatusWrite},
};

use crate::{
  Error, Result,
  encode::{RawAccount, RawAuditEvent, RawPayment, encode_dt},
  schema::SCHEMA,
};

const PAYMENT_COLUMNS: &str = "payment_id, plan, amount, phone, user_email, \
   merchant_txn_id, transaction_note, proof_path, status, created_at, \
   verified_at, verified_by, notes, entitlement_applied";

const ACCOUNT_COLUMNS: &str =
  "email, name, phone, plan, status, credits, expires_at, created_at, updated_at";

fn payment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPayment> {
  Ok(RawPayment {
    payment_id:          row.get(0)?,
    plan:                row.get(1)?,
    amount:              row.get(2)?,
    phone:               row.get(3)?,
    user_email:          row.get(4)?,
    merchant_txn_id:     row.get(5)?,
    transaction_note:    row.get(6)?,
    proof_path:          row.get(7)?,
    status:              row.get(8)?,
    created_at:          row.get(9)?,
    verified_at:         row.get(10)?,
    verified_by:         row.get(11)?,
    notes:               row.get(12)?,
    entitlement_applied: row.get(13)?,
  })
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAccount> {
  Ok(RawAccount {
    email:      row.get(0)?,
    name:       row.get(1)?,
    phone:      row.get(2)?,
    plan:       row.get(3)?,
    status:     row.get(4)?,
    credits:    row.get(5)?,
    expires_at: row.get(6)?,
    created_at: row.get(7)?,
    updated_at: row.get(8)?,
  })
}

fn query_payment(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawPayment>> {
  conn
    .query_row(
      &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ?1"),
      rusqlite::params![id],
      payment_from_row,
    )
    .optional()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The Arogya payment ledger backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All calls
/// for one store run on the same connection thread, which is what makes the
/// compare-and-swap and claim transactions below serialise correctly.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a ledger at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory ledger — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Payments ──────────────────────────────────────────────────────────────

  async fn create_payment(&self, input: NewPayment) -> Result<Payment> {
    let payment = Payment {
      payment_id:          input.payment_id,
      plan:                input.plan,
      amount:              input.amount,
      phone:               input.phone,
      user_email:          input.user_email,
      merchant_txn_id:     input.merchant_txn_id,
      transaction_note:    input.transaction_note,
      proof:               input.proof,
      status:              PaymentStatus::Pending,
      created_at:          Utc::now(),
      verified_at:         None,
      verified_by:         None,
      notes:               None,
      entitlement_applied: false,
    };

    let id_str     = payment.payment_id.as_str().to_owned();
    let plan_str   = payment.plan.as_str().to_owned();
    let amount     = i64::from(payment.amount);
    let phone      = payment.phone.clone();
    let email      = payment.user_email.clone();
    let txn_id     = payment.merchant_txn_id.clone();
    let note       = payment.transaction_note.clone();
    let proof_path = payment.proof.as_ref().map(|p| p.as_str().to_owned());
    let status_str = payment.status.as_str().to_owned();
    let at_str     = encode_dt(payment.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO payments (
             payment_id, plan, amount, phone, user_email,
             merchant_txn_id, transaction_note, proof_path, status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str, plan_str, amount, phone, email, txn_id, note, proof_path,
            status_str, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(payment)
  }

  async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
    let id_str = id.as_str().to_owned();

    let raw: Option<RawPayment> = self
      .conn
      .call(move |conn| Ok(query_payment(conn, &id_str)?))
      .await?;

    raw.map(RawPayment::into_payment).transpose()
  }

  async fn find_by_merchant_txn(
    &self,
    merchant_txn_id: &str,
  ) -> Result<Option<Payment>> {
    let txn = merchant_txn_id.to_owned();

    let raw: Option<RawPayment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments WHERE merchant_txn_id = ?1"
              ),
              rusqlite::params![txn],
              payment_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPayment::into_payment).transpose()
  }

  async fn list_payments(
    &self,
    status: Option<PaymentStatus>,
  ) -> Result<Vec<Payment>> {
    let status_str = status.map(|s| s.as_str().to_owned());

    let raws: Vec<RawPayment> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(s) = status_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE status = ?1 ORDER BY created_at ASC"
          ))?;
          stmt
            .query_map(rusqlite::params![s], payment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at ASC"
          ))?;
          stmt
            .query_map([], payment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPayment::into_payment).collect()
  }

  // ── State machine writes ──────────────────────────────────────────────────

  async fn transition_status(
    &self,
    id: &PaymentId,
    target: PaymentStatus,
    actor: Actor,
    notes: Option<String>,
  ) -> Result<Option<StatusWrite>> {
    let id_str     = id.as_str().to_owned();
    let target_str = target.as_str().to_owned();
    let actor_str  = actor.as_str().to_owned();
    let at_str     = encode_dt(Utc::now());

    // Guarded UPDATE: only a pending row matches, so of any number of
    // concurrent transitions exactly one observes changed == 1. The
    // follow-up SELECT runs in the same connection call, before any other
    // caller's statements can interleave.
    let (applied, raw): (bool, Option<RawPayment>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE payments
           SET status = ?1, verified_at = ?2, verified_by = ?3, notes = ?4
           WHERE payment_id = ?5 AND status = 'pending'",
          rusqlite::params![target_str, at_str, actor_str, notes, id_str],
        )?;
        let raw = query_payment(conn, &id_str)?;
        Ok((changed > 0, raw))
      })
      .await?;

    let Some(raw) = raw else { return Ok(None) };
    let payment = raw.into_payment()?;

    Ok(Some(if applied {
      StatusWrite::Applied(payment)
    } else {
      StatusWrite::AlreadyTerminal(payment)
    }))
  }

  async fn apply_entitlement(
    &self,
    id: &PaymentId,
    grant: &EntitlementGrant,
  ) -> Result<Option<EntitlementApply>> {
    let id_str      = id.as_str().to_owned();
    let email       = grant.email.clone();
    let name        = grant.name.clone();
    let phone       = grant.phone.clone();
    let plan_str    = grant.plan.as_str().to_owned();
    let credits     = grant.credits.0;
    let expires_str = encode_dt(grant.expires_at);
    let now_str     = encode_dt(Utc::now());

    // Outer Option: does the payment exist. Inner Option: Some(account) when
    // this call won the claim, None when the flag was already set.
    let outcome: Option<Option<RawAccount>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let flag: Option<bool> = tx
          .query_row(
            "SELECT entitlement_applied FROM payments WHERE payment_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?;

        let Some(already_applied) = flag else {
          return Ok(None);
        };
        if already_applied {
          return Ok(Some(None));
        }

        // Absolute overwrite: a repeat purchase resets plan, credits and
        // the expiry window. Name and any existing phone are preserved.
        tx.execute(
          "INSERT INTO accounts (
             email, name, phone, plan, status, credits, expires_at,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?7)
           ON CONFLICT(email) DO UPDATE SET
             phone      = COALESCE(accounts.phone, excluded.phone),
             plan       = excluded.plan,
             status     = excluded.status,
             credits    = excluded.credits,
             expires_at = excluded.expires_at,
             updated_at = excluded.updated_at",
          rusqlite::params![
            email, name, phone, plan_str, credits, expires_str, now_str,
          ],
        )?;

        tx.execute(
          "UPDATE payments SET entitlement_applied = 1 WHERE payment_id = ?1",
          rusqlite::params![id_str],
        )?;

        let account = tx.query_row(
          &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
          rusqlite::params![email],
          account_from_row,
        )?;

        tx.commit()?;
        Ok(Some(Some(account)))
      })
      .await?;

    match outcome {
      None => Ok(None),
      Some(None) => Ok(Some(EntitlementApply::AlreadyApplied)),
      Some(Some(raw)) => {
        Ok(Some(EntitlementApply::Applied(raw.into_account()?)))
      }
    }
  }

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn get_account(&self, email: &str) -> Result<Option<UserAccount>> {
    let email = email.to_owned();

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
              rusqlite::params![email],
              account_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  // ── Audit trail ───────────────────────────────────────────────────────────

  async fn append_audit(&self, input: NewAuditEvent) -> Result<AuditEvent> {
    let event = AuditEvent {
      audit_id:    Uuid::new_v4(),
      payment_id:  input.payment_id,
      kind:        input.kind,
      old_status:  input.old_status,
      new_status:  input.new_status,
      actor:       input.actor,
      data:        input.data,
      recorded_at: Utc::now(),
    };

    let audit_id_str = event.audit_id.to_string();
    let payment_id   = event.payment_id.as_ref().map(|p| p.as_str().to_owned());
    let kind_str     = event.kind.as_str().to_owned();
    let old_str      = event.old_status.map(|s| s.as_str().to_owned());
    let new_str      = event.new_status.map(|s| s.as_str().to_owned());
    let actor_str    = event.actor.map(|a| a.as_str().to_owned());
    let data_str     = event.data.to_string();
    let at_str       = encode_dt(event.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO payment_audit (
             audit_id, payment_id, event, old_status, new_status, actor,
             event_data, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            audit_id_str, payment_id, kind_str, old_str, new_str, actor_str,
            data_str, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  async fn audit_for_payment(&self, id: &PaymentId) -> Result<Vec<AuditEvent>> {
    let id_str = id.as_str().to_owned();

    let raws: Vec<RawAuditEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, payment_id, event, old_status, new_status, actor,
                  event_data, recorded_at
           FROM payment_audit
           WHERE payment_id = ?1
           ORDER BY recorded_at ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawAuditEvent {
              audit_id:    row.get(0)?,
              payment_id:  row.get(1)?,
              event:       row.get(2)?,
              old_status:  row.get(3)?,
              new_status:  row.get(4)?,
              actor:       row.get(5)?,
              event_data:  row.get(6)?,
              recorded_at: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEvent::into_event).collect()
  }
}
