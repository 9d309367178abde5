//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Admin Basic-auth failure. Carries a `WWW-Authenticate` challenge.
  #[error("unauthorized")]
  Unauthorized,

  /// No user identity on a request that requires one.
  #[error("authentication required")]
  Unauthenticated,

  /// Gateway callback failed checksum validation.
  #[error("invalid signature")]
  InvalidSignature,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<arogya_core::Error> for ApiError {
  fn from(e: arogya_core::Error) -> Self {
    use arogya_core::Error as E;
    match e {
      E::UnknownPlan(p) => ApiError::BadRequest(format!("unknown plan {p:?}")),
      E::Validation(msg) => ApiError::BadRequest(msg),
      E::Unauthenticated => ApiError::Unauthenticated,
      E::PaymentNotFound(id) => {
        ApiError::NotFound(format!("payment {id} not found"))
      }
      e @ (E::Storage(_)
      | E::EntitlementApplyFailed { .. }
      | E::Serialization(_)) => ApiError::Internal(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "success": false, "message": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"arogya-admin\""),
        );
        return res;
      }
      ApiError::Unauthenticated => {
        (StatusCode::UNAUTHORIZED, "authentication required".to_string())
      }
      ApiError::InvalidSignature => {
        (StatusCode::UNAUTHORIZED, "invalid signature".to_string())
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "success": false, "message": message })))
      .into_response()
  }
}
