//! Sends an app message with a `generic` annotation to a space.
//!
//! Input:
//! ```json
//! { "spaceId": "...", "text": "...", "title": "...", "color": "#6CB7FB",
//!   "actor": { "name": "...", "avatar": "...", "url": "..." } }
//! ```
//! Only `spaceId` and `text` are required.

use crate::node::{require_str, Node};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use wws_connect::app::ApplicationFacade;
use wws_connect::executor::ApiRequest;

pub const DEFAULT_COLOR: &str = "#6CB7FB";

#[derive(Serialize)]
struct AppMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    version: f32,
    annotations: Vec<GenericAnnotation<'a>>,
}

#[derive(Serialize)]
struct GenericAnnotation<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    version: f32,
    color: &'a str,
    title: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    actor: Option<&'a Value>,
}

#[derive(Default)]
pub struct MessageNode;

impl MessageNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for MessageNode {
    fn name(&self) -> &str {
        "wws-message"
    }

    async fn on_input(&self, app: &ApplicationFacade, input: Value) -> Result<Value> {
        let space_id = require_str(&input, "spaceId")?;
        let text = require_str(&input, "text")?;

        let message = AppMessage {
            kind: "appMessage",
            version: 1.0,
            annotations: vec![GenericAnnotation {
                kind: "generic",
                version: 1.0,
                color: input
                    .get("color")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_COLOR),
                title: input.get("title").and_then(Value::as_str).unwrap_or(""),
                text,
                actor: input.get("actor").filter(|a| a.is_object()),
            }],
        };

        let uri = format!("/v1/spaces/{}/messages", urlencoding::encode(space_id));
        debug!(identity = %app.id(), space_id = %space_id, "Sending app message");

        let response = app
            .wws_request(ApiRequest::post(uri).json(&message)?, None)
            .await?;
        Ok(response.json()?)
    }
}
