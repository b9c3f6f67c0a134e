//! In-memory token store. Used when no encryption key is configured, and in tests.

use super::{CredentialRecord, TokenStore};
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryTokenStore {
    records: DashMap<String, CredentialRecord>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, identity_id: &str) -> anyhow::Result<Option<CredentialRecord>> {
        Ok(self.records.get(identity_id).map(|r| r.value().clone()))
    }

    fn put(&self, identity_id: &str, record: &CredentialRecord) -> anyhow::Result<()> {
        self.records.insert(identity_id.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, identity_id: &str) -> anyhow::Result<bool> {
        Ok(self.records.remove(identity_id).is_some())
    }

    fn list_identities(&self) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
