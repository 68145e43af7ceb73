//! Keyed document storage
//!
//! The registry persists one document per slot (plus a small preferences
//! document) through the [`Storage`] trait. The core makes no assumption
//! about the backend: a directory of JSON files, an in-memory map, a cloud
//! blob store or an embedded database all satisfy the contract.
//!
//! - `file`: [`FileStorage`], one `<key>.json` file per key
//! - `memory`: [`MemoryStorage`], a plain map used by tests and tools

pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PersistError, PersistResult};

pub use file::FileStorage;
pub use memory::MemoryStorage;

pub trait Storage {
    /// Stores `document` under `key`, replacing any previous document
    fn set(&mut self, key: &str, document: &Value) -> PersistResult<()>;

    /// Fails with `KeyNotFound` when nothing is stored under `key`
    fn get(&self, key: &str) -> PersistResult<Value>;

    fn contains_key(&self, key: &str) -> bool;

    /// Returns true if a document was removed
    fn remove(&mut self, key: &str) -> PersistResult<bool>;

    fn keys(&self) -> PersistResult<Vec<String>>;
}

/// Reads and decodes the document under `key`
pub fn get_as<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> PersistResult<T> {
    let document = storage.get(key)?;
    serde_json::from_value(document)
        .map_err(|e| PersistError::CorruptedData(format!("document '{}': {}", key, e)))
}

/// Keys become file names, so they are restricted to a safe character set
pub(crate) fn validate_key(key: &str) -> PersistResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(PersistError::InvalidArgument(format!(
            "invalid storage key '{}'",
            key
        )))
    }
}
