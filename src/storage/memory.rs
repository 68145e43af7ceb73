use serde_json::Value;
use std::collections::BTreeMap;

use super::Storage;
use crate::error::{PersistError, PersistResult};

/// Storage backed by an in-process map
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: BTreeMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn set(&mut self, key: &str, document: &Value) -> PersistResult<()> {
        if key.is_empty() {
            return Err(PersistError::InvalidArgument(
                "storage key must not be empty".to_string(),
            ));
        }
        self.documents.insert(key.to_string(), document.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> PersistResult<Value> {
        self.documents
            .get(key)
            .cloned()
            .ok_or_else(|| PersistError::KeyNotFound(key.to_string()))
    }

    fn contains_key(&self, key: &str) -> bool {
        self.documents.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> PersistResult<bool> {
        Ok(self.documents.remove(key).is_some())
    }

    fn keys(&self) -> PersistResult<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }
}
