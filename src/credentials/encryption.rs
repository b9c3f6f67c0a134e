//! AES-256-GCM sealing of serialized credential records.
//!
//! The master key is 32 bytes, supplied base64-encoded through
//! `WWS_ENCRYPTION_KEY`. Every write gets a fresh random nonce.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const KEY_SIZE: usize = 32;

/// 96-bit GCM nonce
const NONCE_SIZE: usize = 12;

/// Decodes a base64 master key and checks it is exactly 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Encryption key is not valid base64")?;

    if key_bytes.len() != KEY_SIZE {
        bail!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        );
    }

    Ok(key_bytes)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        bail!("Encryption key must be {} bytes", KEY_SIZE);
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Seals `plaintext`, returning `(ciphertext, nonce)`, both base64-encoded.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<(String, String)> {
    let cipher = cipher_for(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok((BASE64.encode(sealed), BASE64.encode(nonce)))
}

/// Opens a value produced by [`encrypt`]. Fails on a wrong key, a wrong
/// nonce or tampered ciphertext.
pub fn decrypt(ciphertext: &str, nonce: &str, key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let sealed = BASE64
        .decode(ciphertext)
        .context("Failed to decode ciphertext")?;
    let nonce_bytes = BASE64.decode(nonce).context("Failed to decode nonce")?;

    if nonce_bytes.len() != NONCE_SIZE {
        bail!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        );
    }

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted record): {}", e))
}
