//! Node registry: looks nodes up by type name and dispatches inputs.

use crate::nodes::{FocusNode, GraphqlNode, MessageNode};
use crate::Node;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use wws_connect::app::ApplicationFacade;

pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Registry with every built-in node.
    pub fn with_builtin_nodes() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MessageNode::new()));
        registry.register(Arc::new(FocusNode::new()));
        registry.register(Arc::new(GraphqlNode::new()));
        registry
    }

    /// Adds a node, replacing any node with the same name.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        self.nodes.insert(node.name().to_string(), node);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the named node against `app`.
    pub async fn dispatch(&self, name: &str, app: &ApplicationFacade, input: Value) -> Result<Value> {
        let node = self
            .get(name)
            .ok_or_else(|| anyhow!("unknown node type '{}'", name))?;

        debug!(node = %name, identity = %app.id(), "Dispatching node input");
        node.on_input(app, input).await
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtin_nodes()
    }
}
