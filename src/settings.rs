//! Save system configuration
//!
//! Settings are plain serde data so a game can ship them as a JSON file next
//! to its other configuration. Every field has a default, and a partial file
//! only overrides the fields it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PersistResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Number of usable slots; valid slot indices are `0..max_slots`
    pub max_slots: usize,
    /// Storage key prefix, slot 3 is stored under `"{prefix}3"`
    pub slot_key_prefix: String,
    /// Version written into every game state's metadata
    pub game_version: i32,
    /// Synchronize and write the current slot before switching away
    pub auto_save_on_slot_switch: bool,
    /// Destroy spawned runtime instances before switching slots
    pub clean_runtime_instances_on_slot_switch: bool,
    pub auto_save_on_exit: bool,
    pub save_on_interval: bool,
    pub save_interval_secs: u64,
    pub track_time_played: bool,
    pub load_default_slot_on_start: bool,
    pub default_slot: usize,
    /// Pretty-print JSON files (human-readable, debuggable)
    pub pretty_print: bool,
}

impl Default for SaveSettings {
    fn default() -> Self {
        SaveSettings {
            max_slots: 10,
            slot_key_prefix: "slot".to_string(),
            game_version: 1,
            auto_save_on_slot_switch: true,
            clean_runtime_instances_on_slot_switch: true,
            auto_save_on_exit: true,
            save_on_interval: false,
            save_interval_secs: 300, // 5 minutes
            track_time_played: true,
            load_default_slot_on_start: false,
            default_slot: 0,
            pretty_print: true,
        }
    }
}

impl SaveSettings {
    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> PersistResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)?;
        let settings: SaveSettings = serde_json::from_str(&json)?;
        Ok(settings)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn slot_key(&self, slot: usize) -> String {
        format!("{}{}", self.slot_key_prefix, slot)
    }

    /// Parses a storage key back into a slot index
    pub fn slot_from_key(&self, key: &str) -> Option<usize> {
        key.strip_prefix(self.slot_key_prefix.as_str())
            .and_then(|rest| rest.parse().ok())
            .filter(|slot| *slot < self.max_slots)
    }
}

/// Per-user directory where save files live
///
/// Uses the platform data directory when available, `./saves` otherwise.
pub fn default_save_directory(app_name: &str) -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join(app_name).join("saves"))
        .unwrap_or_else(|| PathBuf::from("./saves"))
}
