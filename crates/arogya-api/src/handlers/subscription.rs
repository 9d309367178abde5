//! `GET /api/subscription` — the entitlement resolver endpoint.

use arogya_core::store::LedgerStore;
use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::{AppState, auth::Identity, error::ApiError};

/// Returns the caller's effective entitlement. Identities without an
/// account row get the free default; no row is created by this read.
pub async fn get<S>(
  State(state): State<AppState<S>>,
  identity: Identity,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let email = identity.as_deref().ok_or(ApiError::Unauthenticated)?;
  let entitlement = state.engine.resolve(email).await?;
  Ok(Json(json!({ "subscription": entitlement })))
}
