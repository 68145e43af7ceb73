//! Frame-driven bookkeeping
//!
//! The host calls [`StateRegistry::tick`] once per simulation step with the
//! elapsed time. Play time and the interval auto-save timer accumulate here
//! instead of in a background task. Scene and quit signals from the host
//! also land here.

use std::time::Duration;

use super::StateRegistry;
use crate::error::PersistResult;

impl StateRegistry {
    /// Advances play time and runs the interval auto-save when due
    ///
    /// Returns true when an auto-save was written this tick. Nothing
    /// accumulates while no slot is active.
    pub fn tick(&self, delta: Duration) -> PersistResult<bool> {
        if self.active_slot.get().is_none() {
            return Ok(false);
        }

        if self.settings.track_time_played {
            self.game_state.borrow_mut().add_time_played(delta);
        }

        if !self.settings.save_on_interval {
            return Ok(false);
        }

        let elapsed = self.since_autosave.get() + delta;
        if elapsed < self.settings.save_interval() {
            self.since_autosave.set(elapsed);
            return Ok(false);
        }

        log::info!("Interval auto-save");
        self.write_active_save_to_disk()?;
        Ok(true)
    }

    /// Time since the last write of the active slot, as seen by [`StateRegistry::tick`]
    pub fn time_since_autosave(&self) -> Duration {
        self.since_autosave.get()
    }

    /// Host signal: the application is shutting down
    ///
    /// From now on runtime instances being destroyed keep their saved state.
    /// Writes the active slot when `auto_save_on_exit` is set.
    pub fn on_application_quitting(&self) -> PersistResult<()> {
        self.quitting.set(true);

        if self.settings.auto_save_on_exit {
            self.write_active_save_to_disk()?;
        }
        Ok(())
    }

    pub fn is_application_quitting(&self) -> bool {
        self.quitting.get()
    }

    /// Host signal: a scene finished loading
    ///
    /// Returns false when a scene with the same name is already loaded.
    pub fn on_scene_loaded(&self, scene: &str) -> bool {
        let mut scenes = self.scenes.borrow_mut();
        let count = scenes.entry(scene.to_string()).or_insert(0);
        *count += 1;

        if *count > 1 {
            log::warn!("Scene '{}' is loaded {} times", scene, count);
            return false;
        }
        log::debug!("Scene '{}' loaded", scene);
        true
    }

    /// Host signal: a scene was unloaded
    pub fn on_scene_unloaded(&self, scene: &str) {
        let mut scenes = self.scenes.borrow_mut();
        match scenes.get_mut(scene) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                scenes.remove(scene);
                log::debug!("Scene '{}' unloaded", scene);
            }
            None => log::warn!("Unload of scene '{}' which was never loaded", scene),
        }
    }

    pub fn is_scene_loaded(&self, scene: &str) -> bool {
        self.scenes.borrow().contains_key(scene)
    }
}
