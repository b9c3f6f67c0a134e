//! Encrypted credential record storage using SQLite.

use super::{encryption, CredentialRecord, TokenStore};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credential_records (
///     identity_id TEXT PRIMARY KEY,
///     record TEXT NOT NULL,        -- Encrypted JSON CredentialRecord
///     record_nonce TEXT NOT NULL,
///     created_at TEXT NOT NULL,    -- ISO 8601
///     updated_at TEXT NOT NULL     -- ISO 8601
/// );
/// ```
///
/// The connection is wrapped in a `Mutex`; each call is one statement, so a
/// `put` replaces the record atomically.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl SqliteTokenStore {
    /// Creates or opens a store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credential_records (
                identity_id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                record_nonce TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credential_records table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store connection lock poisoned"))
    }
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, identity_id: &str) -> Result<Option<CredentialRecord>> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT record, record_nonce FROM credential_records WHERE identity_id = ?1",
                params![identity_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read credential record")?;

        let Some((sealed, nonce)) = row else {
            return Ok(None);
        };

        let plaintext = encryption::decrypt(&sealed, &nonce, &self.encryption_key)
            .context("Failed to decrypt credential record")?;
        let record = serde_json::from_slice(&plaintext)
            .context("Stored credential record is malformed")?;

        Ok(Some(record))
    }

    fn put(&self, identity_id: &str, record: &CredentialRecord) -> Result<()> {
        let plaintext = serde_json::to_vec(record).context("Failed to serialize record")?;
        let (sealed, nonce) = encryption::encrypt(&plaintext, &self.encryption_key)
            .context("Failed to encrypt credential record")?;

        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO credential_records (identity_id, record, record_nonce, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                ON CONFLICT(identity_id) DO UPDATE SET
                    record = excluded.record,
                    record_nonce = excluded.record_nonce,
                    updated_at = excluded.updated_at
                "#,
                params![identity_id, sealed, nonce, now],
            )
            .context("Failed to store credential record")?;

        Ok(())
    }

    fn delete(&self, identity_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM credential_records WHERE identity_id = ?1",
                params![identity_id],
            )
            .context("Failed to delete credential record")?;

        Ok(rows_affected > 0)
    }

    fn list_identities(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT identity_id FROM credential_records ORDER BY identity_id")
            .context("Failed to prepare query")?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(ids)
    }
}
