//! In-memory store for tests and ephemeral sessions.

use std::collections::BTreeMap;

use super::{KvStore, StoreError};

/// A [`KvStore`] over a plain map, with an optional byte budget so tests can
/// exercise capacity failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Vec<u8>>,
    capacity_bytes: Option<u64>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store refusing writes once total stored bytes would exceed `budget`.
    #[must_use]
    pub fn with_capacity_limit(budget: u64) -> Self {
        Self {
            values: BTreeMap::new(),
            capacity_bytes: Some(budget),
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if let Some(budget) = self.capacity_bytes {
            let existing = self.values.get(key).map_or(0, Vec::len) as u64;
            let projected = self.approximate_size_bytes() - existing + value.len() as u64;
            if projected > budget {
                return Err(StoreError::Capacity(format!(
                    "{projected} bytes exceeds budget of {budget}"
                )));
            }
        }
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }

    fn approximate_size_bytes(&self) -> u64 {
        self.values.values().map(|v| v.len() as u64).sum()
    }
}
