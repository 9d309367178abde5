//! Payment intake handlers.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/payments` | Multipart `planId`/`phone`/`paymentProof` |
//! | `POST` | `/api/payments/initiate` | JSON `{plan_id, phone}`, gateway flow |

use arogya_core::{engine::IntakeRequest, payment::Payment, store::LedgerStore};
use axum::{
  Json,
  extract::{Multipart, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, auth::Identity, error::ApiError};

/// `POST /api/payments` — the manual proof-upload flow.
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let mut plan_id: Option<String> = None;
  let mut phone: Option<String> = None;
  let mut proof_file_name: Option<String> = None;
  let mut proof_bytes: Option<Vec<u8>> = None;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::BadRequest(format!("malformed multipart: {e}")))?
  {
    let name = field.name().unwrap_or_default().to_string();
    match name.as_str() {
      "planId" => {
        plan_id = Some(field.text().await.map_err(|e| {
          ApiError::BadRequest(format!("cannot read planId: {e}"))
        })?);
      }
      "phone" => {
        phone = Some(field.text().await.map_err(|e| {
          ApiError::BadRequest(format!("cannot read phone: {e}"))
        })?);
      }
      "paymentProof" => {
        proof_file_name = Some(
          field.file_name().unwrap_or("proof").to_string(),
        );
        proof_bytes = Some(
          field
            .bytes()
            .await
            .map_err(|e| {
              ApiError::BadRequest(format!("cannot read paymentProof: {e}"))
            })?
            .to_vec(),
        );
      }
      _ => {}
    }
  }

  let req = IntakeRequest {
    plan_id:         plan_id
      .ok_or_else(|| ApiError::BadRequest("planId is required".into()))?,
    phone:           phone
      .ok_or_else(|| ApiError::BadRequest("phone is required".into()))?,
    proof_file_name: proof_file_name
      .ok_or_else(|| ApiError::BadRequest("paymentProof is required".into()))?,
    proof_bytes:     proof_bytes.unwrap_or_default(),
  };

  let payment = state
    .engine
    .submit(state.proofs.as_ref(), req, identity.as_deref())
    .await?;

  tracing::info!(
    payment_id = %payment.payment_id,
    plan = %payment.plan,
    "payment submitted"
  );

  Ok((
    StatusCode::CREATED,
    Json(json!({
      "success": true,
      "payment_id": payment.payment_id,
      "amount": payment.amount,
      "message": "Payment submitted. Your subscription activates after verification.",
    })),
  ))
}

// ─── Gateway-flow initiation ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InitiateBody {
  pub plan_id: String,
  pub phone:   String,
}

/// `POST /api/payments/initiate` — create the pending row for a
/// processor-driven payment. The client hands the returned
/// `merchant_txn_id` to the processor SDK; the callback settles the row.
pub async fn initiate<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
  Json(body): Json<InitiateBody>,
) -> Result<(StatusCode, Json<Payment>), ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let payment = state
    .engine
    .initiate(&body.plan_id, &body.phone, identity.as_deref())
    .await?;

  tracing::info!(
    payment_id = %payment.payment_id,
    merchant_txn_id = %payment.merchant_txn_id,
    "gateway payment initiated"
  );

  Ok((StatusCode::CREATED, Json(payment)))
}
