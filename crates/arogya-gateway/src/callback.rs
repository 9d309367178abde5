//! Callback envelope decoding and event classification.
//!
//! Server-to-server callbacks arrive as `{"response": "<base64 JSON>"}`
//! with the checksum in the `X-VERIFY` header computed over the base64
//! string. Only after the checksum passes is the payload decoded.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;

use arogya_core::engine::GatewayEvent;

use crate::{
  GatewayConfig,
  error::{Error, Result},
  signature::verify_x_verify,
};

// ─── Wire shapes ─────────────────────────────────────────────────────────────

/// Outer envelope of a server-to-server callback.
#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
  response: String,
}

/// Decoded inner payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload {
  code: String,
  #[serde(default)]
  data: Option<CallbackData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackData {
  merchant_transaction_id: String,
  #[serde(default)]
  transaction_id: Option<String>,
  /// Settled amount in paise.
  #[serde(default)]
  amount: Option<u64>,
}

// ─── Event codes ─────────────────────────────────────────────────────────────

const CODE_SUCCESS: &str = "PAYMENT_SUCCESS";
const FAILURE_CODES: &[&str] =
  &["PAYMENT_ERROR", "PAYMENT_DECLINED", "TIMED_OUT", "PAYMENT_CANCELLED"];

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Verify `x_verify` against the raw request `body`, then decode and
/// classify the callback into a [`GatewayEvent`].
///
/// The signature is checked before any payload field is parsed, so a forged
/// body can never influence control flow beyond the rejection itself.
pub fn decode_callback(
  body: &str,
  x_verify: &str,
  config: &GatewayConfig,
) -> Result<GatewayEvent> {
  let envelope: CallbackEnvelope = serde_json::from_str(body)?;
  verify_x_verify(x_verify, &envelope.response, config)?;
  classify(&envelope.response)
}

fn classify(base64_payload: &str) -> Result<GatewayEvent> {
  let raw = B64.decode(base64_payload)?;
  let text = std::str::from_utf8(&raw).map_err(|_| Error::Utf8)?;
  let payload: CallbackPayload = serde_json::from_str(text)?;

  if payload.code == CODE_SUCCESS {
    let data = payload.data.ok_or(Error::MissingField("data"))?;
    let gateway_txn_id = data
      .transaction_id
      .ok_or(Error::MissingField("data.transactionId"))?;
    let amount_paise =
      data.amount.ok_or(Error::MissingField("data.amount"))?;
    return Ok(GatewayEvent::PaymentSucceeded {
      merchant_txn_id: data.merchant_transaction_id,
      gateway_txn_id,
      amount_paise,
    });
  }

  if FAILURE_CODES.contains(&payload.code.as_str()) {
    let data = payload.data.ok_or(Error::MissingField("data"))?;
    return Ok(GatewayEvent::PaymentFailed {
      merchant_txn_id: data.merchant_transaction_id,
      gateway_txn_id:  data.transaction_id,
      code:            payload.code,
    });
  }

  Ok(GatewayEvent::Unrecognized { code: payload.code })
}
