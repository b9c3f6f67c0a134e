use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use wws_connect::app::ApplicationFacade;

/// A workflow node backed by the platform API.
///
/// Nodes are stateless. The identity, its token and the reauthentication
/// cycle all live in the facade passed to `on_input`.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique node type name, e.g. `"wws-message"`.
    fn name(&self) -> &str;

    /// Handles one input message and returns the node's output message.
    ///
    /// Errors from the facade are returned as-is inside the `anyhow::Error`,
    /// so callers can downcast to [`wws_connect::Error`] and tell credential
    /// failures from rejected requests.
    async fn on_input(&self, app: &ApplicationFacade, input: Value) -> Result<Value>;
}

/// Reads a required non-empty string field from a node input.
pub fn require_str<'a>(input: &'a Value, field: &str) -> Result<&'a str> {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("input is missing '{}'", field))
}
