//! Built-in nodes.

pub mod focus;
pub mod graphql;
pub mod message;

pub use focus::FocusNode;
pub use graphql::GraphqlNode;
pub use message::MessageNode;
