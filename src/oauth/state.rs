//! CSRF state tokens for the authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Bytes of entropy per state token.
pub const CSRF_STATE_BYTES: usize = 24;

/// Generates a random URL-safe state token.
pub fn generate_csrf_state() -> String {
    let mut bytes = [0u8; CSRF_STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
