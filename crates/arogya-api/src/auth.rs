//! Request authentication.
//!
//! Two separate schemes live here. Admin endpoints use HTTP Basic auth
//! verified against an argon2 PHC hash. User endpoints trust the
//! `x-user-email` header stamped by the fronting authentication layer —
//! this service never manages user sessions itself.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use arogya_core::store::LedgerStore;
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::{AppState, error::ApiError};

/// Header carrying the authenticated user's identity, set by the fronting
/// auth layer.
pub const USER_HEADER: &str = "x-user-email";

/// Credentials accepted as valid for the admin endpoints.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Verify admin Basic-auth credentials directly from headers.
pub fn verify_auth(
  headers: &HeaderMap,
  config: &AuthConfig,
) -> Result<(), ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) =
    creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  if username != config.username {
    return Err(ApiError::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(())
}

/// Zero-size marker: present in a handler means the request carried valid
/// admin credentials.
pub struct AdminAuth;

impl<S> FromRequestParts<AppState<S>> for AdminAuth
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth)?;
    Ok(AdminAuth)
  }
}

/// The caller's identity as asserted by the fronting auth layer, or `None`
/// when the header is absent. The engine decides whether an anonymous call
/// is acceptable.
pub struct Identity(pub Option<String>);

impl Identity {
  pub fn as_deref(&self) -> Option<&str> { self.0.as_deref() }
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  type Rejection = std::convert::Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let email = parts
      .headers
      .get(USER_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(|s| s.trim().to_ascii_lowercase())
      .filter(|s| !s.is_empty());
    Ok(Identity(email))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use rand_core::OsRng;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    AuthConfig { username: "admin".into(), password_hash: hash }
  }

  fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
      axum::http::header::AUTHORIZATION,
      value.parse().unwrap(),
    );
    headers
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn correct_credentials() {
    let cfg = config("secret");
    let headers = headers_with(&basic("admin", "secret"));
    assert!(verify_auth(&headers, &cfg).is_ok());
  }

  #[test]
  fn wrong_password() {
    let cfg = config("secret");
    let headers = headers_with(&basic("admin", "wrong"));
    assert!(matches!(
      verify_auth(&headers, &cfg),
      Err(ApiError::Unauthorized)
    ));
  }

  #[test]
  fn wrong_username() {
    let cfg = config("secret");
    let headers = headers_with(&basic("root", "secret"));
    assert!(matches!(
      verify_auth(&headers, &cfg),
      Err(ApiError::Unauthorized)
    ));
  }

  #[test]
  fn missing_header() {
    let cfg = config("secret");
    assert!(matches!(
      verify_auth(&HeaderMap::new(), &cfg),
      Err(ApiError::Unauthorized)
    ));
  }

  #[test]
  fn invalid_base64() {
    let cfg = config("secret");
    let headers = headers_with("Basic !!!not-base64!!!");
    assert!(matches!(
      verify_auth(&headers, &cfg),
      Err(ApiError::Unauthorized)
    ));
  }
}
