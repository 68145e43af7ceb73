//! Save slots
//!
//! Slot `n` is stored under `settings.slot_key(n)`. Only one slot is active
//! at a time; its game state lives in memory and reaches storage only on an
//! explicit write or a configured auto-save trigger.

use chrono::{DateTime, Local};
use serde_json::json;
use std::time::Duration;

use super::{RegistryEvent, StateRegistry};
use crate::error::{PersistError, PersistResult};
use crate::state::{GameState, GameStateDocument};
use crate::storage::get_as;

/// Storage key of the side-channel preferences document
pub const PREFERENCES_KEY: &str = "preferences";

/// Options of [`StateRegistry::set_slot_with`]
///
/// `None` policies fall back to the registry's [`SaveSettings`](crate::settings::SaveSettings).
#[derive(Debug, Default)]
pub struct SlotSwitch {
    pub reload_saveables: bool,
    /// Use this state instead of the one stored for the slot
    pub explicit_state: Option<GameState>,
    pub auto_save: Option<bool>,
    pub clean_runtime_instances: Option<bool>,
}

impl SlotSwitch {
    /// Switch that reloads every live saveable from the new slot
    pub fn reload() -> Self {
        SlotSwitch {
            reload_saveables: true,
            ..Default::default()
        }
    }
}

impl StateRegistry {
    /// Currently active slot, `None` before the first switch
    pub fn active_slot(&self) -> Option<usize> {
        self.active_slot.get()
    }

    fn check_slot(&self, slot: usize) -> PersistResult<()> {
        if slot >= self.settings.max_slots {
            return Err(PersistError::OutOfRange {
                slot,
                max: self.settings.max_slots,
            });
        }
        Ok(())
    }

    /// Switches slots and reloads every live saveable, using the configured
    /// auto-save and cleanup policies
    pub fn set_slot(&self, slot: usize) -> PersistResult<()> {
        self.set_slot_with(slot, SlotSwitch::reload())
    }

    /// Makes `slot` the active slot
    ///
    /// Order of effects:
    /// 1. the current slot is written to storage (auto-save policy)
    /// 2. runtime instances are destroyed (cleanup policy)
    /// 3. `SlotChanging` fires and the new game state is swapped in
    /// 4. live saveables are reloaded (if requested), then reset so
    ///    load-once objects re-arm for the new slot
    /// 5. the slot is remembered as the last used one and `SlotChanged` fires
    ///
    /// Selecting the already active slot without an explicit state is a
    /// no-op.
    pub fn set_slot_with(&self, slot: usize, switch: SlotSwitch) -> PersistResult<()> {
        self.check_slot(slot)?;

        let previous = self.active_slot.get();
        if previous == Some(slot) && switch.explicit_state.is_none() {
            log::warn!("Slot {} is already active", slot);
            return Ok(());
        }

        let next_state = match switch.explicit_state {
            Some(state) => state,
            None => self
                .read_slot(slot)?
                .unwrap_or_else(|| GameState::new(self.settings.game_version)),
        };

        let auto_save = switch
            .auto_save
            .unwrap_or(self.settings.auto_save_on_slot_switch);
        if auto_save && previous.is_some() {
            self.write_active_save_to_disk()?;
        }

        let clean = switch
            .clean_runtime_instances
            .unwrap_or(self.settings.clean_runtime_instances_on_slot_switch);
        if clean {
            for manager in self.instance_managers() {
                manager.borrow_mut().destroy_all_objects()?;
            }
        }

        self.emit(RegistryEvent::SlotChanging {
            from: previous,
            to: slot,
        });

        *self.game_state.borrow_mut() = next_state;
        self.active_slot.set(Some(slot));
        self.since_autosave.set(Duration::ZERO);
        log::info!("Switched to save slot {}", slot);

        if switch.reload_saveables {
            self.load_state()?;
        }
        self.reset_saveables();

        if let Err(e) = self.remember_last_slot(slot) {
            log::warn!("Failed to remember last used slot: {}", e);
        }

        self.emit(RegistryEvent::SlotChanged(slot));
        Ok(())
    }

    /// Reads and validates a stored slot; `None` if the slot is unused
    fn read_slot(&self, slot: usize) -> PersistResult<Option<GameState>> {
        let key = self.settings.slot_key(slot);
        let storage = self.storage.borrow();
        if !storage.contains_key(&key) {
            return Ok(None);
        }

        let document: GameStateDocument = get_as(&**storage, &key)?;
        if document.metadata.version > self.settings.game_version {
            return Err(PersistError::InvalidVersion {
                found: document.metadata.version,
                supported: self.settings.game_version,
            });
        }

        Ok(Some(GameState::from_document(document)))
    }

    /// Synchronizes every live saveable, then writes the active slot
    ///
    /// The write only starts after synchronization returned, so a state
    /// still being mutated is never persisted. Without an active slot this
    /// logs a warning and does nothing.
    pub fn write_active_save_to_disk(&self) -> PersistResult<()> {
        let Some(slot) = self.active_slot.get() else {
            log::warn!("Write to disk skipped: no save slot is active");
            return Ok(());
        };

        self.synchronize_state()?;

        self.emit(RegistryEvent::WritingToDisk(slot));
        let document = self.game_state.borrow_mut().to_document();
        let document = serde_json::to_value(document)?;
        self.storage
            .borrow_mut()
            .set(&self.settings.slot_key(slot), &document)?;
        self.since_autosave.set(Duration::ZERO);
        log::info!("Wrote save slot {}", slot);
        self.emit(RegistryEvent::WrittenToDisk(slot));
        Ok(())
    }

    /// Replaces the in-memory state of the active slot with the stored one
    pub fn load_active_save_from_disk(&self, reload_saveables: bool) -> PersistResult<()> {
        let Some(slot) = self.active_slot.get() else {
            log::warn!("Load from disk skipped: no save slot is active");
            return Ok(());
        };

        let state = self
            .read_slot(slot)?
            .unwrap_or_else(|| GameState::new(self.settings.game_version));
        *self.game_state.borrow_mut() = state;

        if reload_saveables {
            self.load_state()?;
        }
        Ok(())
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.settings.max_slots
            && self
                .storage
                .borrow()
                .contains_key(&self.settings.slot_key(slot))
    }

    /// Slots that have a stored save, ascending
    pub fn used_slots(&self) -> PersistResult<Vec<usize>> {
        let keys = self.storage.borrow().keys()?;
        let mut slots: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.settings.slot_from_key(key))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        Ok(slots)
    }

    /// First slot without a stored save
    pub fn available_slot(&self) -> Option<usize> {
        (0..self.settings.max_slots).find(|slot| !self.is_slot_used(*slot))
    }

    pub fn has_unused_slots(&self) -> bool {
        self.available_slot().is_some()
    }

    /// Deletes a stored slot
    ///
    /// Deleting the active slot also discards its in-memory state and leaves
    /// no slot active.
    pub fn delete_save(&self, slot: usize) -> PersistResult<bool> {
        self.check_slot(slot)?;

        let removed = self
            .storage
            .borrow_mut()
            .remove(&self.settings.slot_key(slot))?;

        if self.active_slot.get() == Some(slot) {
            self.active_slot.set(None);
            *self.game_state.borrow_mut() = GameState::new(self.settings.game_version);
        }

        log::info!("Deleted save slot {}", slot);
        Ok(removed)
    }

    /// Copies slot `from` into slot `to`
    ///
    /// The active slot is copied from memory (without synchronizing). The
    /// active slot cannot be the target, its in-memory state would diverge
    /// from storage.
    pub fn copy_save(&self, from: usize, to: usize) -> PersistResult<()> {
        self.check_slot(from)?;
        self.check_slot(to)?;

        if from == to {
            return Ok(());
        }
        if self.active_slot.get() == Some(to) {
            return Err(PersistError::InvalidArgument(format!(
                "cannot copy over the active slot {}",
                to
            )));
        }

        let document = if self.active_slot.get() == Some(from) {
            serde_json::to_value(self.game_state.borrow_mut().to_document())?
        } else {
            let key = self.settings.slot_key(from);
            if !self.storage.borrow().contains_key(&key) {
                return Err(PersistError::KeyNotFound(key));
            }
            self.storage.borrow().get(&key)?
        };

        self.storage
            .borrow_mut()
            .set(&self.settings.slot_key(to), &document)?;
        log::info!("Copied save slot {} to {}", from, to);
        Ok(())
    }

    /// Creation time of a slot; the active slot answers from memory
    pub fn save_creation_time(&self, slot: usize) -> PersistResult<Option<DateTime<Local>>> {
        if self.active_slot.get() == Some(slot) {
            return Ok(self.game_state.borrow().created_at());
        }
        Ok(self.read_slot(slot)?.and_then(|state| state.created_at()))
    }

    pub fn save_time_played(&self, slot: usize) -> PersistResult<Option<Duration>> {
        if self.active_slot.get() == Some(slot) {
            return Ok(Some(self.game_state.borrow().time_played()));
        }
        Ok(self.read_slot(slot)?.map(|state| state.time_played()))
    }

    pub fn save_version(&self, slot: usize) -> PersistResult<Option<i32>> {
        if self.active_slot.get() == Some(slot) {
            return Ok(Some(self.game_state.borrow().game_version()));
        }

        let key = self.settings.slot_key(slot);
        let storage = self.storage.borrow();
        if !storage.contains_key(&key) {
            return Ok(None);
        }
        let document: GameStateDocument = get_as(&**storage, &key)?;
        Ok(Some(document.metadata.version))
    }

    /// Slot selected most recently, as remembered in the preferences document
    pub fn last_used_slot(&self) -> Option<usize> {
        let storage = self.storage.borrow();
        if !storage.contains_key(PREFERENCES_KEY) {
            return None;
        }

        match storage.get(PREFERENCES_KEY) {
            Ok(preferences) => preferences
                .get("last_slot")
                .and_then(|slot| slot.as_u64())
                .map(|slot| slot as usize)
                .filter(|slot| *slot < self.settings.max_slots),
            Err(e) => {
                log::warn!("Unreadable preferences: {}", e);
                None
            }
        }
    }

    fn remember_last_slot(&self, slot: usize) -> PersistResult<()> {
        self.storage
            .borrow_mut()
            .set(PREFERENCES_KEY, &json!({ "last_slot": slot }))
    }

    /// Selects the startup slot
    ///
    /// With `load_default_slot_on_start` the configured default slot is
    /// loaded, otherwise the last used slot if one is remembered. Returns
    /// the selected slot.
    pub fn start(&self) -> PersistResult<Option<usize>> {
        let slot = if self.settings.load_default_slot_on_start {
            Some(self.settings.default_slot)
        } else {
            self.last_used_slot()
        };

        if let Some(slot) = slot {
            self.set_slot(slot)?;
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identifier;
    use crate::settings::SaveSettings;
    use crate::storage::{MemoryStorage, Storage};
    use std::rc::Rc;

    fn registry() -> Rc<StateRegistry> {
        StateRegistry::new(SaveSettings::default(), MemoryStorage::new())
    }

    #[test]
    fn test_out_of_range_slot() {
        let registry = registry();
        let err = registry.set_slot(10).unwrap_err();
        assert!(matches!(err, PersistError::OutOfRange { slot: 10, max: 10 }));
        assert_eq!(registry.active_slot(), None);
    }

    #[test]
    fn test_same_slot_is_a_no_op() {
        let registry = registry();
        registry.set_slot(2).unwrap();
        registry.set_int("x", 5);
        registry.set_slot(2).unwrap();
        assert_eq!(registry.get_int("x", 0), 5);
    }

    #[test]
    fn test_write_and_read_back() {
        let registry = registry();
        registry.set_slot(0).unwrap();
        registry.set_string("name", "Ada");
        registry.write_active_save_to_disk().unwrap();
        assert!(registry.is_slot_used(0));

        registry.set_slot(1).unwrap();
        assert_eq!(registry.get_string("name", ""), "");

        registry.set_slot(0).unwrap();
        assert_eq!(registry.get_string("name", ""), "Ada");
    }

    #[test]
    fn test_used_and_available_slots() {
        let registry = registry();
        assert_eq!(registry.available_slot(), Some(0));

        registry.set_slot(0).unwrap();
        registry.write_active_save_to_disk().unwrap();
        registry.set_slot(2).unwrap();
        registry.write_active_save_to_disk().unwrap();

        assert_eq!(registry.used_slots().unwrap(), vec![0, 2]);
        assert_eq!(registry.available_slot(), Some(1));
    }

    #[test]
    fn test_delete_active_save() {
        let registry = registry();
        registry.set_slot(0).unwrap();
        registry.set_int("x", 1);
        registry.write_active_save_to_disk().unwrap();

        assert!(registry.delete_save(0).unwrap());
        assert!(!registry.is_slot_used(0));
        assert_eq!(registry.active_slot(), None);
        assert!(registry.game_state().is_empty());
    }

    #[test]
    fn test_copy_save() {
        let registry = registry();
        registry.set_slot(0).unwrap();
        registry.set_int("coins", 12);

        registry.copy_save(0, 3).unwrap();
        assert!(registry.is_slot_used(3));
        assert!(registry.copy_save(5, 4).is_err());
        assert!(registry.copy_save(3, 0).is_err());

        registry.set_slot(3).unwrap();
        assert_eq!(registry.get_int("coins", 0), 12);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut storage = MemoryStorage::new();
        let mut future = GameState::new(7);
        storage
            .set("slot0", &serde_json::to_value(future.to_document()).unwrap())
            .unwrap();

        let registry = StateRegistry::new(SaveSettings::default(), storage);
        let err = registry.set_slot(0).unwrap_err();
        assert!(matches!(err, PersistError::InvalidVersion { found: 7, supported: 1 }));
        assert_eq!(registry.active_slot(), None);
        assert_eq!(registry.save_version(0).unwrap(), Some(7));
    }

    #[test]
    fn test_corrupted_slot() {
        let mut storage = MemoryStorage::new();
        storage.set("slot0", &json!({ "not": "a save" })).unwrap();

        let registry = StateRegistry::new(SaveSettings::default(), storage);
        assert!(matches!(registry.set_slot(0), Err(PersistError::CorruptedData(_))));
    }

    #[test]
    fn test_slot_metadata() {
        let registry = registry();
        assert_eq!(registry.save_time_played(4).unwrap(), None);
        assert_eq!(registry.save_version(4).unwrap(), None);

        registry.set_slot(4).unwrap();
        registry.write_active_save_to_disk().unwrap();
        let created = registry.save_creation_time(4).unwrap();
        assert!(created.is_some());

        registry.set_slot(5).unwrap();
        assert_eq!(
            registry.save_creation_time(4).unwrap().map(|t| t.timestamp()),
            created.map(|t| t.timestamp())
        );
        assert_eq!(registry.save_version(4).unwrap(), Some(1));
    }

    #[test]
    fn test_explicit_state() {
        let registry = registry();
        let mut state = GameState::new(1);
        state.set(Identifier::new("IVar-level"), json!(3), "Global");

        registry
            .set_slot_with(
                1,
                SlotSwitch {
                    explicit_state: Some(state),
                    ..SlotSwitch::reload()
                },
            )
            .unwrap();
        assert_eq!(registry.get_int("level", 0), 3);
    }

    #[test]
    fn test_start_uses_last_slot() {
        let registry = registry();
        assert_eq!(registry.start().unwrap(), None);

        registry.set_slot(6).unwrap();
        assert_eq!(registry.last_used_slot(), Some(6));
    }

    #[test]
    fn test_start_with_default_slot() {
        let settings = SaveSettings {
            load_default_slot_on_start: true,
            default_slot: 2,
            ..SaveSettings::default()
        };
        let registry = StateRegistry::new(settings, MemoryStorage::new());
        assert_eq!(registry.start().unwrap(), Some(2));
        assert_eq!(registry.active_slot(), Some(2));
    }

    #[test]
    fn test_slot_events() {
        let registry = registry();
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let captured = Rc::clone(&seen);
        registry.subscribe(move |_, event| match event {
            RegistryEvent::StateSynchronizing
            | RegistryEvent::StateSynchronized
            | RegistryEvent::StateLoading
            | RegistryEvent::StateLoaded => {}
            other => captured.borrow_mut().push(*other),
        });

        registry.set_slot(0).unwrap();
        registry.set_slot(1).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                RegistryEvent::SlotChanging { from: None, to: 0 },
                RegistryEvent::SlotChanged(0),
                RegistryEvent::WritingToDisk(0),
                RegistryEvent::WrittenToDisk(0),
                RegistryEvent::SlotChanging { from: Some(0), to: 1 },
                RegistryEvent::SlotChanged(1),
            ]
        );
    }
}
