//! Key/value bag holding one object's saved fields
//!
//! Values are stored as JSON documents and decoded on demand into whatever
//! type the caller asks for. A stored value is a snapshot taken at `set`
//! time, so later changes to the source value are never observed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{PersistError, PersistResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateContainer {
    state: Map<String, Value>,
}

impl StateContainer {
    pub fn new() -> Self {
        StateContainer { state: Map::new() }
    }

    /// Stores `value` under `key`, overwriting anything already there
    ///
    /// Fails with `InvalidArgument` for an empty key or a value that
    /// serializes to `null`.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> PersistResult<()> {
        if key.is_empty() {
            return Err(PersistError::InvalidArgument(
                "container key must not be empty".to_string(),
            ));
        }

        let document = serde_json::to_value(value)?;
        if document.is_null() {
            return Err(PersistError::InvalidArgument(format!(
                "value for key '{}' is null",
                key
            )));
        }

        self.state.insert(key.to_string(), document);
        Ok(())
    }

    /// Decodes the value under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> PersistResult<T> {
        let document = self
            .state
            .get(key)
            .ok_or_else(|| PersistError::KeyNotFound(key.to_string()))?;

        T::deserialize(document).map_err(|source| PersistError::TypeMismatch {
            key: key.to_string(),
            source,
        })
    }

    /// Like [`StateContainer::get`], but absence or a type mismatch yields `None`
    pub fn try_get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .and_then(|document| T::deserialize(document).ok())
    }

    /// Raw stored document for `key`
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Returns true if something was removed
    pub fn remove(&mut self, key: &str) -> bool {
        self.state.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.state.clear();
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.state.keys().map(String::as_str)
    }

    /// Current document snapshot
    pub fn save(&self) -> Value {
        Value::Object(self.state.clone())
    }

    /// Replaces the whole container with `document`
    ///
    /// Nothing is merged: keys absent from `document` are gone afterwards.
    pub fn load(&mut self, document: Value) -> PersistResult<()> {
        match document {
            Value::Object(map) => {
                self.state = map;
                Ok(())
            }
            Value::Null => Err(PersistError::InvalidArgument(
                "cannot load a container from null".to_string(),
            )),
            other => Err(PersistError::InvalidArgument(format!(
                "container document must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
