//! Workflow glue nodes for the workspace-messaging platform.
//!
//! Each node receives a JSON input message and calls the platform through an
//! [`ApplicationFacade`](wws_connect::app::ApplicationFacade), which owns the
//! identity's token and retries once on 401.
//!
//! ```text
//! workflow message (JSON)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Node (implements trait)            │
//! │  - Validate input                        │
//! │  - Build the API request                 │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       ApplicationFacade                  │
//! │  - Bearer token, refresh on 401          │
//! └─────────────────────────────────────────┘
//!          ↓
//!     Platform API
//! ```
//!
//! # Creating a Node
//!
//! ```no_run
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use wws_connect::app::ApplicationFacade;
//! use wws_nodes::Node;
//!
//! struct WhoAmI;
//!
//! #[async_trait]
//! impl Node for WhoAmI {
//!     fn name(&self) -> &str {
//!         "wws-whoami"
//!     }
//!
//!     async fn on_input(&self, app: &ApplicationFacade, _input: Value) -> Result<Value> {
//!         Ok(app.graphql("query { me { id displayName } }", None).await?)
//!     }
//! }
//! ```

mod node;
pub mod nodes;
pub mod registry;

pub use node::{require_str, Node};
pub use registry::NodeRegistry;
