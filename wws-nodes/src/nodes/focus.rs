//! Adds a `message-focus` annotation to an existing message.

use crate::node::{require_str, Node};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use wws_connect::app::ApplicationFacade;
use wws_connect::executor::ApiRequest;

#[derive(Default)]
pub struct FocusNode;

impl FocusNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for FocusNode {
    fn name(&self) -> &str {
        "wws-focus"
    }

    /// Input: `spaceId`, `messageId`, `phrase` (required) and optionally
    /// `lens`, `category`, `actions`, `confidence`, `payload`, `start`, `end`.
    async fn on_input(&self, app: &ApplicationFacade, input: Value) -> Result<Value> {
        let space_id = require_str(&input, "spaceId")?;
        let message_id = require_str(&input, "messageId")?;
        let phrase = require_str(&input, "phrase")?;

        let mut annotation = json!({
            "type": "message-focus",
            "version": 1,
            "phrase": phrase,
            "lens": input.get("lens").and_then(Value::as_str).unwrap_or("Opportunity"),
            "category": input.get("category").and_then(Value::as_str).unwrap_or(""),
            "confidence": input.get("confidence").and_then(Value::as_f64).unwrap_or(1.0),
            "hidden": false,
        });
        for field in ["actions", "payload", "start", "end"] {
            if let Some(value) = input.get(field) {
                annotation[field] = value.clone();
            }
        }

        let uri = format!(
            "/v1/spaces/{}/messages/{}/annotations",
            urlencoding::encode(space_id),
            urlencoding::encode(message_id)
        );
        debug!(identity = %app.id(), message_id = %message_id, "Adding focus annotation");

        let response = app
            .wws_request(ApiRequest::post(uri).json(&annotation)?, None)
            .await?;
        Ok(response.json()?)
    }
}
