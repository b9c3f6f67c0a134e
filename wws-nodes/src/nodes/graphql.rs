use crate::node::{require_str, Node};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use wws_connect::app::ApplicationFacade;

/// Runs `input.query` (with optional `input.variables`) and outputs the `data` object.
#[derive(Default)]
pub struct GraphqlNode;

impl GraphqlNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for GraphqlNode {
    fn name(&self) -> &str {
        "wws-graphql"
    }

    async fn on_input(&self, app: &ApplicationFacade, input: Value) -> Result<Value> {
        let query = require_str(&input, "query")?;
        let variables = input.get("variables").filter(|v| !v.is_null()).cloned();

        Ok(app.graphql(query, variables).await?)
    }
}
