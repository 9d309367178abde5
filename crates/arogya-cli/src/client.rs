//! Async HTTP client wrapping the Arogya admin API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use arogya_core::{audit::AuditEvent, payment::Payment};
use reqwest::Client;
use serde_json::Value;

/// Connection settings for the admin API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
}

/// Async HTTP client for the admin review endpoints.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api/admin{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.basic_auth(&self.config.username, Some(&self.config.password))
  }

  /// `GET /api/admin/payments` — the pending review queue, oldest first.
  pub async fn list_pending(&self) -> Result<Vec<Payment>> {
    let resp = self
      .auth(self.client.get(self.url("/payments")))
      .send()
      .await
      .context("GET /payments failed")?;

    if !resp.status().is_success() {
      return Err(anyhow!("GET /payments → {}", resp.status()));
    }
    resp.json().await.context("deserialising payments")
  }

  /// `POST /api/admin/payments/{id}/verify`
  pub async fn verify(&self, payment_id: &str) -> Result<Value> {
    self.decide(payment_id, "verify").await
  }

  /// `POST /api/admin/payments/{id}/reject`
  pub async fn reject(&self, payment_id: &str) -> Result<Value> {
    self.decide(payment_id, "reject").await
  }

  async fn decide(&self, payment_id: &str, action: &str) -> Result<Value> {
    let resp = self
      .auth(
        self
          .client
          .post(self.url(&format!("/payments/{payment_id}/{action}"))),
      )
      .send()
      .await
      .with_context(|| format!("POST /{action} failed"))?;

    if !resp.status().is_success() {
      return Err(anyhow!("POST /{action} → {}", resp.status()));
    }
    resp.json().await.context("deserialising decision response")
  }

  /// `GET /api/admin/payments/{id}/audit`
  pub async fn audit(&self, payment_id: &str) -> Result<Vec<AuditEvent>> {
    let resp = self
      .auth(
        self
          .client
          .get(self.url(&format!("/payments/{payment_id}/audit"))),
      )
      .send()
      .await
      .context("GET /audit failed")?;

    if !resp.status().is_success() {
      return Err(anyhow!("GET /audit → {}", resp.status()));
    }
    resp.json().await.context("deserialising audit trail")
  }
}
