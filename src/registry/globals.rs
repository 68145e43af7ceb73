//! Global primitive variables
//!
//! Each variable is its own game state entry (`IVar-<key>`, `FVar-<key>`,
//! `SVar-<key>`) in the `"Global"` context. Unlike the state container,
//! these accessors never fail: without an active slot, or when the stored
//! value is missing or of another type, getters return the caller's default
//! and setters do nothing, with a warning logged where it points at a bug.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::StateRegistry;
use crate::identity::Identifier;

pub const GLOBAL_CONTEXT: &str = "Global";

const INT_PREFIX: &str = "IVar-";
const FLOAT_PREFIX: &str = "FVar-";
const STRING_PREFIX: &str = "SVar-";

impl StateRegistry {
    fn has_active_slot(&self, action: &str) -> bool {
        if self.active_slot.get().is_none() {
            log::warn!("{} failed: no save slot is active, select one with set_slot", action);
            return false;
        }
        true
    }

    fn set_global<T: Serialize>(&self, action: &str, prefix: &str, key: &str, value: T) {
        if !self.has_active_slot(action) {
            return;
        }

        match serde_json::to_value(value) {
            Ok(value) => self.game_state.borrow_mut().set(
                Identifier::new(format!("{}{}", prefix, key)),
                value,
                GLOBAL_CONTEXT,
            ),
            Err(e) => log::warn!("{} failed for '{}': {}", action, key, e),
        }
    }

    fn get_global<T: DeserializeOwned>(&self, action: &str, prefix: &str, key: &str, default: T) -> T {
        if !self.has_active_slot(action) {
            return default;
        }

        let id = Identifier::new(format!("{}{}", prefix, key));
        let state = self.game_state.borrow();
        let Some(value) = state.try_get_value(&id) else {
            return default;
        };

        match T::deserialize(value) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{} failed for '{}': {}", action, key, e);
                default
            }
        }
    }

    pub fn set_int(&self, key: &str, value: i64) {
        self.set_global("set_int", INT_PREFIX, key, value);
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_global("get_int", INT_PREFIX, key, default)
    }

    pub fn set_float(&self, key: &str, value: f64) {
        self.set_global("set_float", FLOAT_PREFIX, key, value);
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get_global("get_float", FLOAT_PREFIX, key, default)
    }

    pub fn set_string(&self, key: &str, value: &str) {
        self.set_global("set_string", STRING_PREFIX, key, value);
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_global("get_string", STRING_PREFIX, key, default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SaveSettings;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_no_active_slot_returns_default() {
        let registry = StateRegistry::new(SaveSettings::default(), MemoryStorage::new());
        registry.set_int("x", 42);
        assert_eq!(registry.get_int("x", -7), -7);
        assert!(registry.game_state().is_empty());
    }

    #[test]
    fn test_globals_round_trip() {
        let registry = StateRegistry::new(SaveSettings::default(), MemoryStorage::new());
        registry.set_slot(0).unwrap();

        registry.set_int("x", 42);
        registry.set_float("speed", 1.5);
        registry.set_string("name", "Ada");

        assert_eq!(registry.get_int("x", -7), 42);
        assert_eq!(registry.get_float("speed", 0.0), 1.5);
        assert_eq!(registry.get_string("name", "?"), "Ada");
        assert_eq!(registry.get_int("missing", -7), -7);
        assert_eq!(
            registry.game_state().context_of(&Identifier::new("IVar-x")),
            Some(GLOBAL_CONTEXT)
        );
    }

    #[test]
    fn test_prefixes_keep_types_apart() {
        let registry = StateRegistry::new(SaveSettings::default(), MemoryStorage::new());
        registry.set_slot(0).unwrap();

        registry.set_string("x", "text");
        assert_eq!(registry.get_int("x", -1), -1);
        assert_eq!(registry.wipe_context(GLOBAL_CONTEXT), 1);
        assert_eq!(registry.get_string("x", "gone"), "gone");
    }
}
