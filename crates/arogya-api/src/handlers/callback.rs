//! `POST /api/gateway/callback` — the payment-processor notification
//! endpoint.
//!
//! Fails closed on checksum problems: a missing or invalid `X-VERIFY`
//! returns 401 and mutates nothing, though the attempt is audited.
//! Authentic events that cannot be acted upon are acknowledged with 200 so
//! the processor stops redelivering.

use arogya_core::{audit::AuditKind, store::LedgerStore};
use arogya_gateway::{decode_callback, error::Error as GatewayError};
use axum::{Json, extract::State, http::HeaderMap};
use serde_json::{Value, json};

use crate::{AppState, error::ApiError};

/// Header carrying the processor's checksum.
pub const X_VERIFY: &str = "x-verify";

pub async fn handle<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  body: String,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let Some(x_verify) = headers.get(X_VERIFY).and_then(|v| v.to_str().ok())
  else {
    tracing::warn!("callback without X-VERIFY header");
    state
      .engine
      .record_unmatched_callback(
        AuditKind::InvalidSignature,
        json!({ "error": GatewayError::MissingSignature.to_string() }),
      )
      .await;
    return Err(ApiError::InvalidSignature);
  };

  let event = match decode_callback(&body, x_verify, &state.gateway) {
    Ok(event) => event,
    Err(e @ (GatewayError::InvalidSignature | GatewayError::MissingSignature)) => {
      tracing::warn!(error = %e, "callback failed signature validation");
      state
        .engine
        .record_unmatched_callback(
          AuditKind::InvalidSignature,
          json!({ "error": e.to_string() }),
        )
        .await;
      return Err(ApiError::InvalidSignature);
    }
    Err(e) => {
      // Authentic signature over a payload we cannot decode — record and
      // reject as malformed.
      tracing::warn!(error = %e, "callback payload cannot be decoded");
      state
        .engine
        .record_unmatched_callback(
          AuditKind::IgnoredEvent,
          json!({ "error": e.to_string() }),
        )
        .await;
      return Err(ApiError::BadRequest(format!("malformed callback: {e}")));
    }
  };

  let disposition = state.engine.handle_gateway_event(event).await?;
  tracing::info!(disposition = disposition.as_str(), "gateway callback handled");

  Ok(Json(json!({
    "success": true,
    "disposition": disposition.as_str(),
  })))
}
