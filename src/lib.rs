// Error taxonomy
pub mod error;

// Service configuration (TOML + env overrides)
pub mod config;

// Credential records, token stores and encryption at rest
pub mod credentials;

// OAuth2 grants against the platform's authorization server
pub mod oauth;

// Bearer-authenticated API calls with transparent reauthentication
pub mod executor;

// Inbound webhook signatures and verification handshake
pub mod webhook;

// Per-identity facade and registry
pub mod app;

// HTTP management and webhook endpoints
pub mod api;

// Admin bearer tokens
pub mod auth;

pub use error::{Error, Result};
