//! Admin review endpoints, all behind Basic auth.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/admin/payments` | Pending by default; `?status=` filters |
//! | `POST` | `/api/admin/payments/{id}/verify` | Idempotent |
//! | `POST` | `/api/admin/payments/{id}/reject` | Idempotent |
//! | `GET`  | `/api/admin/payments/{id}/audit` | Full trail, oldest first |

use arogya_core::{
  audit::AuditEvent,
  engine::{TargetStatus, TransitionOutcome},
  payment::{Actor, Payment, PaymentId, PaymentStatus},
  store::LedgerStore,
};
use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, auth::AdminAuth, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<PaymentStatus>,
}

/// `GET /api/admin/payments[?status=<status>]` — defaults to the pending
/// review queue, oldest first.
pub async fn list<S>(
  _auth: AdminAuth,
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Payment>>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let status = params.status.unwrap_or(PaymentStatus::Pending);
  let payments = state
    .engine
    .ledger()
    .list_payments(Some(status))
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))?;
  Ok(Json(payments))
}

// ─── Verify / reject ─────────────────────────────────────────────────────────

async fn decide<S>(
  state: &AppState<S>,
  id: String,
  target: TargetStatus,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let id = PaymentId::from_string(id);
  let outcome = state.engine.transition(&id, target, Actor::Admin).await?;

  let message = match &outcome {
    TransitionOutcome::Applied(p) if p.status == PaymentStatus::Verified => {
      "Payment verified and subscription activated."
    }
    TransitionOutcome::Applied(_) => "Payment rejected.",
    TransitionOutcome::Noop(_) => "Payment was already settled; no change.",
  };

  Ok(Json(json!({
    "success": true,
    "message": message,
    "status": outcome.payment().status,
    "noop": outcome.is_noop(),
    "payment": outcome.payment(),
  })))
}

/// `POST /api/admin/payments/{id}/verify`
pub async fn verify<S>(
  _auth: AdminAuth,
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  decide(&state, id, TargetStatus::Verified).await
}

/// `POST /api/admin/payments/{id}/reject`
pub async fn reject<S>(
  _auth: AdminAuth,
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  decide(&state, id, TargetStatus::Rejected).await
}

// ─── Audit trail ─────────────────────────────────────────────────────────────

/// `GET /api/admin/payments/{id}/audit` — 404 for unknown payments.
pub async fn audit<S>(
  _auth: AdminAuth,
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<AuditEvent>>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let id = PaymentId::from_string(id);
  let ledger = state.engine.ledger();

  ledger
    .get_payment(&id)
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("payment {id} not found")))?;

  let trail = ledger
    .audit_for_payment(&id)
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))?;
  Ok(Json(trail))
}
