//! Inbound webhook authentication.
//!
//! Every delivery carries `X-OUTBOUND-TOKEN`: the hex HMAC-SHA256 of the raw
//! request body under the webhook's shared secret. A delivery of type
//! `verification` is the subscription handshake: the endpoint echoes the
//! challenge as `{"response": <challenge>}` and signs that response body
//! with the same secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-OUTBOUND-TOKEN";
pub const VERIFICATION_TYPE: &str = "verification";

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `provided_signature` (hex) against the HMAC of the exact raw body.
///
/// The comparison is constant-time. A signature that is not valid hex never matches.
pub fn verify(raw_body: &[u8], provided_signature: &str, shared_secret: &str) -> bool {
    let Ok(provided) = hex::decode(provided_signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(shared_secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Reply to a verification delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Exact bytes to send as the response body.
    pub body: String,
    /// Value for the `X-OUTBOUND-TOKEN` response header.
    pub signature: String,
}

/// Builds the challenge echo and signs the serialized response body.
pub fn answer_challenge(challenge: &str, shared_secret: &str) -> HandshakeResponse {
    let body = json!({ "response": challenge }).to_string();
    let signature = sign(body.as_bytes(), shared_secret);

    HandshakeResponse { body, signature }
}

/// An accepted delivery, forwarded into the workflow as an opaque payload.
#[derive(Clone, Debug, Serialize)]
pub struct WebhookDelivery {
    pub delivery_id: Uuid,
    pub identity_id: String,
    pub delivery_type: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Result of processing one inbound delivery.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// Verification handshake; reply with the body and signature header.
    Handshake(HandshakeResponse),
    /// Signature checked; forward the payload.
    Accepted(WebhookDelivery),
    /// Signature missing or wrong. Nothing is forwarded.
    Rejected(String),
    /// Body could not be parsed or has no type.
    Malformed(String),
}

/// Validates deliveries for all webhook endpoints.
///
/// Signature checks are strict unless a delivery type is listed in
/// `bypass_delivery_types`, in which case a mismatch is logged and the
/// delivery is still accepted. `verification` deliveries are never bypassed.
/// The signature is checked over the raw body before anything is parsed, so
/// with an empty bypass list an unsigned body is never decoded.
#[derive(Clone, Debug, Default)]
pub struct WebhookVerifier {
    bypass_delivery_types: HashSet<String>,
}

impl WebhookVerifier {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn with_bypass<I, S>(delivery_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bypass_delivery_types = delivery_types
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| t != VERIFICATION_TYPE)
            .collect();
        Self {
            bypass_delivery_types,
        }
    }

    pub fn process(
        &self,
        identity_id: &str,
        content_type: Option<&str>,
        raw_body: &[u8],
        provided_signature: Option<&str>,
        shared_secret: &str,
    ) -> WebhookOutcome {
        let signature_ok = provided_signature
            .map(|sig| verify(raw_body, sig, shared_secret))
            .unwrap_or(false);

        // Unsigned bodies are only parsed when a bypass could admit them
        if !signature_ok && self.bypass_delivery_types.is_empty() {
            warn!(
                identity = %identity_id,
                has_signature = provided_signature.is_some(),
                "Webhook signature rejected"
            );
            return rejected();
        }

        let payload = match parse_payload(content_type, raw_body) {
            Ok(payload) => payload,
            Err(reason) if signature_ok => return WebhookOutcome::Malformed(reason),
            Err(_) => return rejected(),
        };

        let delivery_type = match payload.get("type").and_then(Value::as_str) {
            Some(delivery_type) => delivery_type.to_string(),
            None if signature_ok => {
                return WebhookOutcome::Malformed("delivery has no 'type'".to_string())
            }
            None => return rejected(),
        };

        if !signature_ok {
            if !self.bypass_delivery_types.contains(&delivery_type) {
                warn!(
                    identity = %identity_id,
                    delivery_type = %delivery_type,
                    has_signature = provided_signature.is_some(),
                    "Webhook signature rejected"
                );
                return rejected();
            }
            warn!(
                identity = %identity_id,
                delivery_type = %delivery_type,
                "Webhook signature mismatch tolerated by bypass list"
            );
        }

        if delivery_type == VERIFICATION_TYPE {
            let Some(challenge) = payload.get("challenge").and_then(Value::as_str) else {
                return WebhookOutcome::Malformed("verification without 'challenge'".to_string());
            };
            debug!(identity = %identity_id, "Answering webhook verification challenge");
            return WebhookOutcome::Handshake(answer_challenge(challenge, shared_secret));
        }

        WebhookOutcome::Accepted(WebhookDelivery {
            delivery_id: Uuid::now_v7(),
            identity_id: identity_id.to_string(),
            delivery_type,
            payload,
            received_at: Utc::now(),
        })
    }
}

fn rejected() -> WebhookOutcome {
    WebhookOutcome::Rejected(format!("missing or invalid {} header", SIGNATURE_HEADER))
}

/// Decodes a JSON or form-encoded body into a JSON value.
pub fn parse_payload(content_type: Option<&str>, raw_body: &[u8]) -> Result<Value, String> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw_body)
            .map_err(|e| format!("invalid form body: {}", e))?;
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Ok(Value::Object(map));
    }

    serde_json::from_slice(raw_body).map_err(|e| format!("invalid JSON body: {}", e))
}
