//! HTTP layer for the Arogya payment service.
//!
//! Exposes an axum [`Router`] over any [`LedgerStore`]: payment intake,
//! the admin review surface, the processor callback endpoint, and the
//! subscription query. User identity arrives via the `x-user-email` header
//! from the fronting auth layer; admin endpoints use Basic auth.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod proof;

pub use error::ApiError;
pub use proof::FsProofStore;

use std::{path::PathBuf, sync::Arc};

use arogya_core::{engine::VerificationEngine, store::LedgerStore};
use arogya_gateway::GatewayConfig;
use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with an
/// `AROGYA`-prefixed environment overlay.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  pub upload_dir:          PathBuf,
  pub admin_username:      String,
  pub admin_password_hash: String,
  pub gateway_salt_key:    String,
  pub gateway_salt_index:  u8,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: LedgerStore> {
  pub engine:  VerificationEngine<S>,
  pub proofs:  Arc<FsProofStore>,
  pub auth:    Arc<AuthConfig>,
  pub gateway: Arc<GatewayConfig>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the payment service.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: LedgerStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    // User surface
    .route("/api/payments",            post(handlers::intake::submit::<S>))
    .route("/api/payments/initiate",   post(handlers::intake::initiate::<S>))
    .route("/api/subscription",        get(handlers::subscription::get::<S>))
    // Admin surface
    .route("/api/admin/payments",      get(handlers::admin::list::<S>))
    .route(
      "/api/admin/payments/{id}/verify",
      post(handlers::admin::verify::<S>),
    )
    .route(
      "/api/admin/payments/{id}/reject",
      post(handlers::admin::reject::<S>),
    )
    .route(
      "/api/admin/payments/{id}/audit",
      get(handlers::admin::audit::<S>),
    )
    // Processor callbacks
    .route("/api/gateway/callback",    post(handlers::callback::handle::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use arogya_gateway::compute_x_verify;
  use arogya_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use serde_json::Value;
  use tower::ServiceExt as _;

  const BOUNDARY: &str = "X-AROGYA-TEST-BOUNDARY";

  fn gateway_config() -> GatewayConfig {
    GatewayConfig {
      salt_key:   "test-salt-key".into(),
      salt_index: 1,
    }
  }

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    let upload_dir = std::env::temp_dir().join(format!(
      "arogya-api-test-{}",
      uuid::Uuid::new_v4().simple()
    ));
    let proofs = FsProofStore::new(&upload_dir);
    proofs.ensure_dir().await.unwrap();

    AppState {
      engine:  VerificationEngine::new(Arc::new(store)),
      proofs:  Arc::new(proofs),
      auth:    Arc::new(AuthConfig {
        username:      "admin".to_string(),
        password_hash: hash,
      }),
      gateway: Arc::new(gateway_config()),
    }
  }

  fn basic_auth(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn oneshot_raw(
    state:   AppState<SqliteStore>,
    method:  &str,
    uri:     &str,
    headers: Vec<(&str, &str)>,
    body:    Vec<u8>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body)).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  /// Hand-rolled multipart body for the intake endpoint.
  fn intake_body(plan: &str, phone: &str, proof: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [("planId", plan), ("phone", phone)] {
      body.extend_from_slice(
        format!(
          "--{BOUNDARY}\r\nContent-Disposition: form-data; \
           name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .as_bytes(),
      );
    }
    body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; \
         name=\"paymentProof\"; filename=\"upi.png\"\r\n\
         Content-Type: image/png\r\n\r\n"
      )
      .as_bytes(),
    );
    body.extend_from_slice(proof);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
  }

  fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
  }

  async fn submit_payment(
    state: AppState<SqliteStore>,
    plan: &str,
    email: &str,
  ) -> Value {
    let ct = multipart_content_type();
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/payments",
      vec![("content-type", ct.as_str()), ("x-user-email", email)],
      intake_body(plan, "+911234567890", b"\xff\xd8\xff"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
  }

  // ── Intake ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn intake_creates_pending_payment() {
    let state = make_state("secret").await;
    let body = submit_payment(state, "basic", "asha@example.com").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["amount"], 299);
    assert!(
      body["payment_id"].as_str().unwrap().starts_with("PAY_"),
      "payment_id: {}",
      body["payment_id"]
    );
  }

  #[tokio::test]
  async fn intake_without_identity_returns_401() {
    let state = make_state("secret").await;
    let ct = multipart_content_type();
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/payments",
      vec![("content-type", ct.as_str())],
      intake_body("basic", "+911234567890", b"proof"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn intake_with_unknown_plan_returns_400() {
    let state = make_state("secret").await;
    let ct = multipart_content_type();
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/payments",
      vec![
        ("content-type", ct.as_str()),
        ("x-user-email", "asha@example.com"),
      ],
      intake_body("platinum", "+911234567890", b"proof"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Admin auth ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_endpoints_require_basic_auth() {
    let state = make_state("secret").await;
    let resp = oneshot_raw(
      state.clone(),
      "GET",
      "/api/admin/payments",
      vec![],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = basic_auth("admin", "wrong");
    let resp = oneshot_raw(
      state,
      "GET",
      "/api/admin/payments",
      vec![("authorization", wrong.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Verify / reject flows ───────────────────────────────────────────────

  #[tokio::test]
  async fn verify_flow_end_to_end() {
    let state = make_state("secret").await;
    let auth = basic_auth("admin", "secret");

    let submitted =
      submit_payment(state.clone(), "basic", "asha@example.com").await;
    let payment_id = submitted["payment_id"].as_str().unwrap().to_string();

    // It shows up in the pending queue.
    let resp = oneshot_raw(
      state.clone(),
      "GET",
      "/api/admin/payments",
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let queue = json_body(resp).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["payment_id"], payment_id.as_str());

    // Verify it.
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/api/admin/payments/{payment_id}/verify"),
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "verified");
    assert_eq!(body["noop"], false);

    // Subscription reflects the activation.
    let resp = oneshot_raw(
      state.clone(),
      "GET",
      "/api/subscription",
      vec![("x-user-email", "asha@example.com")],
      Vec::new(),
    )
    .await;
    let sub = json_body(resp).await["subscription"].clone();
    assert_eq!(sub["plan"], "basic");
    assert_eq!(sub["status"], "active");
    assert_eq!(sub["credits"], 25);

    // Re-verifying is an idempotent no-op.
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/api/admin/payments/{payment_id}/verify"),
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["noop"], true);
    assert_eq!(body["status"], "verified");

    // The audit trail shows exactly one activation.
    let resp = oneshot_raw(
      state,
      "GET",
      &format!("/api/admin/payments/{payment_id}/audit"),
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let trail = json_body(resp).await;
    let activations = trail
      .as_array()
      .unwrap()
      .iter()
      .filter(|ev| ev["kind"] == "activated")
      .count();
    assert_eq!(activations, 1, "trail: {trail}");
  }

  #[tokio::test]
  async fn reject_flow_leaves_account_on_free_tier() {
    let state = make_state("secret").await;
    let auth = basic_auth("admin", "secret");

    let submitted =
      submit_payment(state.clone(), "premium", "ravi@example.com").await;
    let payment_id = submitted["payment_id"].as_str().unwrap();

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/api/admin/payments/{payment_id}/reject"),
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "rejected");

    let resp = oneshot_raw(
      state,
      "GET",
      "/api/subscription",
      vec![("x-user-email", "ravi@example.com")],
      Vec::new(),
    )
    .await;
    let sub = json_body(resp).await["subscription"].clone();
    assert_eq!(sub["plan"], "free");
    assert_eq!(sub["credits"], 5);
  }

  #[tokio::test]
  async fn verify_unknown_payment_returns_404() {
    let state = make_state("secret").await;
    let auth = basic_auth("admin", "secret");
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/admin/payments/PAY_doesnotexist/verify",
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  // ── Subscription ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn subscription_without_identity_returns_401() {
    let state = make_state("secret").await;
    let resp =
      oneshot_raw(state, "GET", "/api/subscription", vec![], Vec::new()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn subscription_defaults_to_free() {
    let state = make_state("secret").await;
    let resp = oneshot_raw(
      state,
      "GET",
      "/api/subscription",
      vec![("x-user-email", "nobody@example.com")],
      Vec::new(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let sub = json_body(resp).await["subscription"].clone();
    assert_eq!(sub["plan"], "free");
    assert_eq!(sub["status"], "active");
    assert_eq!(sub["credits"], 5);
    assert_eq!(sub["expires_at"], Value::Null);
  }

  // ── Gateway callbacks ───────────────────────────────────────────────────

  fn signed_callback(payload: &str) -> (Vec<u8>, String) {
    let encoded = B64.encode(payload);
    let x_verify = compute_x_verify(&encoded, &gateway_config());
    let body = serde_json::json!({ "response": encoded }).to_string();
    (body.into_bytes(), x_verify)
  }

  #[tokio::test]
  async fn callback_without_signature_returns_401() {
    let state = make_state("secret").await;
    let (body, _) = signed_callback(r#"{"code":"PAYMENT_SUCCESS"}"#);
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/gateway/callback",
      vec![("content-type", "application/json")],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn callback_with_invalid_signature_mutates_nothing() {
    let state = make_state("secret").await;

    // A pending payment exists; a forged success callback for it must not
    // verify it.
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/payments/initiate",
      vec![
        ("content-type", "application/json"),
        ("x-user-email", "asha@example.com"),
      ],
      br#"{"plan_id":"basic","phone":"+911234567890"}"#.to_vec(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let payment = json_body(resp).await;
    let txn = payment["merchant_txn_id"].as_str().unwrap();

    let forged = B64.encode(format!(
      r#"{{"code":"PAYMENT_SUCCESS","data":{{"merchantTransactionId":"{txn}","transactionId":"T1","amount":29900}}}}"#
    ));
    let body =
      serde_json::json!({ "response": forged }).to_string().into_bytes();

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/gateway/callback",
      vec![
        ("content-type", "application/json"),
        ("x-verify", "deadbeef###1"),
      ],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = oneshot_raw(
      state,
      "GET",
      "/api/subscription",
      vec![("x-user-email", "asha@example.com")],
      Vec::new(),
    )
    .await;
    let sub = json_body(resp).await["subscription"].clone();
    assert_eq!(sub["plan"], "free", "forged callback must not activate");
  }

  #[tokio::test]
  async fn signed_success_callback_verifies_payment() {
    let state = make_state("secret").await;

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/payments/initiate",
      vec![
        ("content-type", "application/json"),
        ("x-user-email", "asha@example.com"),
      ],
      br#"{"plan_id":"premium","phone":"+911234567890"}"#.to_vec(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let payment = json_body(resp).await;
    let txn = payment["merchant_txn_id"].as_str().unwrap();

    let (body, x_verify) = signed_callback(&format!(
      r#"{{"code":"PAYMENT_SUCCESS","data":{{"merchantTransactionId":"{txn}","transactionId":"T900","amount":59900}}}}"#
    ));
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/gateway/callback",
      vec![
        ("content-type", "application/json"),
        ("x-verify", x_verify.as_str()),
      ],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack = json_body(resp).await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["disposition"], "verified");

    let resp = oneshot_raw(
      state,
      "GET",
      "/api/subscription",
      vec![("x-user-email", "asha@example.com")],
      Vec::new(),
    )
    .await;
    let sub = json_body(resp).await["subscription"].clone();
    assert_eq!(sub["plan"], "premium");
    assert_eq!(sub["credits"], -1);
  }

  #[tokio::test]
  async fn signed_callback_for_unknown_transaction_creates_the_row() {
    let state = make_state("secret").await;
    let auth = basic_auth("admin", "secret");

    // A canonical amount lets the row be reconstructed and verified.
    let (body, x_verify) = signed_callback(
      r#"{"code":"PAYMENT_SUCCESS","data":{"merchantTransactionId":"TXN_ghost","transactionId":"T1","amount":29900}}"#,
    );
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/gateway/callback",
      vec![
        ("content-type", "application/json"),
        ("x-verify", x_verify.as_str()),
      ],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack = json_body(resp).await;
    assert_eq!(ack["disposition"], "verified");

    let resp = oneshot_raw(
      state,
      "GET",
      "/api/admin/payments?status=verified",
      vec![("authorization", auth.as_str())],
      Vec::new(),
    )
    .await;
    let verified = json_body(resp).await;
    assert_eq!(verified.as_array().unwrap().len(), 1);
    assert_eq!(verified[0]["merchant_txn_id"], "TXN_ghost");
    assert_eq!(verified[0]["plan"], "basic");
  }

  #[tokio::test]
  async fn signed_callback_with_unmappable_amount_is_acknowledged() {
    let state = make_state("secret").await;
    let (body, x_verify) = signed_callback(
      r#"{"code":"PAYMENT_SUCCESS","data":{"merchantTransactionId":"TXN_ghost","transactionId":"T1","amount":12345}}"#,
    );
    let resp = oneshot_raw(
      state,
      "POST",
      "/api/gateway/callback",
      vec![
        ("content-type", "application/json"),
        ("x-verify", x_verify.as_str()),
      ],
      body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack = json_body(resp).await;
    assert_eq!(ack["disposition"], "ignored");
  }
}
