//! State registry: the coordinator between live saveables and the game state
//!
//! The registry owns the active [`GameState`] and a weak list of every live
//! [`Saveable`](crate::saveable::Saveable). It pulls state out of saveables
//! on synchronization, pushes it back on load, and manages which save slot
//! the game state belongs to.
//!
//! # Architecture
//!
//! - `mod.rs`: registration and the synchronize / load passes
//! - `events`: lifecycle events broadcast around bulk passes
//! - `slots`: slot switching, disk I/O and slot metadata
//! - `globals`: primitive global variables stored in the `"Global"` context
//! - `scheduler`: per-frame tick (play time, interval auto-save), scene and
//!   quit signals
//!
//! There is no process-wide instance. Every saveable and runtime instance
//! manager is handed the registry it belongs to, so tests can run several
//! independent registries side by side.
//!
//! # Reentrancy
//!
//! All state lives behind `Cell` / `RefCell` and every method takes `&self`:
//! event handlers and saveables call back into the registry while a pass is
//! running. No registry borrow is held while a saveable or handler runs.

pub mod events;
pub mod globals;
pub mod scheduler;
pub mod slots;

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::component::{ComponentIdTable, SaveableComponent};
use crate::error::{PersistError, PersistResult};
use crate::identity::Identifier;
use crate::instances::SceneInstanceManager;
use crate::saveable::{SaveableRef, WeakSaveableRef, describe, same_saveable};
use crate::settings::SaveSettings;
use crate::state::GameState;
use crate::storage::Storage;

pub use events::{EventHandler, ListenerId, RegistryEvent};
pub use slots::SlotSwitch;

use events::EventBus;

/// Clears the synchronizing flag when dropped, including on early return
struct SyncGuard<'a>(&'a Cell<bool>);

impl<'a> SyncGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        SyncGuard(flag)
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct StateRegistry {
    settings: SaveSettings,
    storage: RefCell<Box<dyn Storage>>,
    game_state: RefCell<GameState>,
    active_slot: Cell<Option<usize>>,
    saveables: RefCell<Vec<WeakSaveableRef>>,
    instance_managers: RefCell<Vec<Weak<RefCell<SceneInstanceManager>>>>,
    listeners: EventBus,
    component_ids: RefCell<ComponentIdTable>,
    synchronizing: Cell<bool>,
    ignoring_sync: Cell<bool>,
    quitting: Cell<bool>,
    scenes: RefCell<HashMap<String, usize>>,
    since_autosave: Cell<Duration>,
}

impl StateRegistry {
    pub fn new(settings: SaveSettings, storage: impl Storage + 'static) -> Rc<Self> {
        let game_state = GameState::new(settings.game_version);

        Rc::new(StateRegistry {
            settings,
            storage: RefCell::new(Box::new(storage)),
            game_state: RefCell::new(game_state),
            active_slot: Cell::new(None),
            saveables: RefCell::new(Vec::new()),
            instance_managers: RefCell::new(Vec::new()),
            listeners: EventBus::default(),
            component_ids: RefCell::new(ComponentIdTable::with_builtins()),
            synchronizing: Cell::new(false),
            ignoring_sync: Cell::new(false),
            quitting: Cell::new(false),
            scenes: RefCell::new(HashMap::new()),
            since_autosave: Cell::new(Duration::ZERO),
        })
    }

    pub fn settings(&self) -> &SaveSettings {
        &self.settings
    }

    /// Read access to the active game state
    pub fn game_state(&self) -> Ref<'_, GameState> {
        self.game_state.borrow()
    }

    pub fn component_ids(&self) -> Ref<'_, ComponentIdTable> {
        self.component_ids.borrow()
    }

    /// Registers the stable base id of a component type
    pub fn register_component_id<C: SaveableComponent>(
        &self,
        base_id: &'static str,
    ) -> PersistResult<()> {
        self.component_ids.borrow_mut().register::<C>(base_id)
    }

    pub fn subscribe(&self, handler: impl Fn(&StateRegistry, &RegistryEvent) + 'static) -> ListenerId {
        self.listeners.subscribe(Rc::new(handler))
    }

    pub fn unsubscribe(&self, listener: ListenerId) -> bool {
        self.listeners.unsubscribe(listener)
    }

    fn emit(&self, event: RegistryEvent) {
        self.listeners.emit(self, event);
    }

    pub fn is_synchronizing(&self) -> bool {
        self.synchronizing.get()
    }

    pub fn is_ignoring_state_synchronization(&self) -> bool {
        self.ignoring_sync.get()
    }

    /// While set, single-saveable saves are dropped
    ///
    /// Used during scene transitions so objects of the unloading scene do
    /// not overwrite state that was just loaded for the next one.
    pub fn set_ignore_state_synchronization(&self, ignore: bool) {
        self.ignoring_sync.set(ignore);
    }

    fn ensure_not_synchronizing(&self, operation: &'static str) -> PersistResult<()> {
        if self.synchronizing.get() {
            return Err(PersistError::InvalidOperationDuringSync(operation));
        }
        Ok(())
    }

    pub fn is_registered(&self, saveable: &SaveableRef) -> bool {
        self.saveables
            .borrow()
            .iter()
            .any(|weak| same_saveable(weak, saveable))
    }

    /// Number of tracked saveables, including ones not yet pruned
    pub fn registered_count(&self) -> usize {
        self.saveables.borrow().len()
    }

    /// Starts tracking `saveable`, loading its stored state if `auto_load`
    ///
    /// A stored entry the saveable rejects is logged; the saveable stays
    /// registered and overwrites the entry on its next save.
    pub fn register_saveable(&self, saveable: &SaveableRef, auto_load: bool) -> PersistResult<()> {
        self.ensure_not_synchronizing("register a saveable")?;

        if self.is_registered(saveable) {
            return Err(PersistError::DuplicateRegistration(describe(saveable)));
        }

        self.saveables.borrow_mut().push(Rc::downgrade(saveable));
        log::debug!("Registered saveable {}", describe(saveable));

        if auto_load {
            if let Err(e) = self.load_saveable(saveable) {
                log::error!(
                    "Failed to load stored state of {}: {}",
                    describe(saveable),
                    e
                );
            }
        }
        Ok(())
    }

    /// Stops tracking `saveable`, saving it one last time if `auto_save`
    ///
    /// Returns false when it was not registered.
    pub fn unregister_saveable(&self, saveable: &SaveableRef, auto_save: bool) -> PersistResult<bool> {
        self.ensure_not_synchronizing("unregister a saveable")?;

        let position = self
            .saveables
            .borrow()
            .iter()
            .position(|weak| same_saveable(weak, saveable));
        let Some(position) = position else {
            return Ok(false);
        };

        if auto_save {
            self.save_saveable(saveable)?;
        }

        self.saveables.borrow_mut().remove(position);
        log::debug!("Unregistered saveable {}", describe(saveable));
        Ok(true)
    }

    /// Writes one saveable's state into the game state
    pub fn save_saveable(&self, saveable: &SaveableRef) -> PersistResult<()> {
        if self.ignoring_sync.get() {
            return Ok(());
        }

        let (id, context, document) = {
            let mut saveable = saveable.borrow_mut();
            let document = saveable.save()?;
            (saveable.id(), saveable.context(), document)
        };

        self.game_state.borrow_mut().set(id, document, context);
        Ok(())
    }

    /// Applies the stored state of one saveable; false if nothing is stored
    pub fn load_saveable(&self, saveable: &SaveableRef) -> PersistResult<bool> {
        let id = saveable.borrow().id();
        let document = self.game_state.borrow().try_get_value(&id).cloned();

        match document {
            Some(document) => {
                saveable.borrow_mut().load(document)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes one saveable's stored state; true if there was any
    pub fn wipe_saveable(&self, saveable: &SaveableRef) -> bool {
        let id = saveable.borrow().id();
        self.wipe_id(&id)
    }

    pub fn wipe_id(&self, id: &Identifier) -> bool {
        self.game_state.borrow_mut().remove(id)
    }

    /// Removes every stored entry tagged with `context`
    pub fn wipe_context(&self, context: &str) -> usize {
        let removed = self.game_state.borrow_mut().remove_context(context);
        log::debug!("Wiped {} entries of context '{}'", removed, context);
        removed
    }

    /// Live saveables in registration order; dangling entries are pruned
    fn live_saveables(&self) -> Vec<SaveableRef> {
        let mut saveables = self.saveables.borrow_mut();
        let mut live = Vec::with_capacity(saveables.len());

        saveables.retain(|weak| match weak.upgrade() {
            Some(saveable) => {
                live.push(saveable);
                true
            }
            None => {
                log::warn!("Pruning saveable that was dropped without being unregistered");
                false
            }
        });

        live
    }

    /// Writes every live saveable into the game state
    ///
    /// Registration changes are rejected until the pass returns, including
    /// from `StateSynchronizing` handlers. The first failing saveable aborts
    /// the pass and its error is returned; the guard is released either way.
    pub fn synchronize_state(&self) -> PersistResult<()> {
        self.ensure_not_synchronizing("synchronize state")?;

        {
            let _guard = SyncGuard::enter(&self.synchronizing);
            self.emit(RegistryEvent::StateSynchronizing);

            for saveable in self.live_saveables() {
                if let Err(e) = self.save_saveable(&saveable) {
                    log::error!(
                        "Failed to synchronize saveable {}: {}",
                        describe(&saveable),
                        e
                    );
                    return Err(e);
                }
            }
        }

        self.emit(RegistryEvent::StateSynchronized);
        Ok(())
    }

    /// Pushes the game state into every live saveable that has an entry
    ///
    /// A saveable that rejects its entry is logged and skipped; the others
    /// still load.
    pub fn load_state(&self) -> PersistResult<()> {
        self.emit(RegistryEvent::StateLoading);

        for saveable in self.live_saveables() {
            if let Err(e) = self.load_saveable(&saveable) {
                log::error!("Failed to load saveable {}: {}", describe(&saveable), e);
            }
        }

        self.emit(RegistryEvent::StateLoaded);
        Ok(())
    }

    /// Clears load history of every live saveable
    fn reset_saveables(&self) {
        for saveable in self.live_saveables() {
            saveable.borrow_mut().reset_state();
        }
    }

    /// Tracks a runtime instance manager so slot switches can clean it up
    pub fn register_instance_manager(&self, manager: &Rc<RefCell<SceneInstanceManager>>) {
        let mut managers = self.instance_managers.borrow_mut();
        managers.retain(|weak| weak.strong_count() > 0);
        if !managers.iter().any(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(manager))) {
            managers.push(Rc::downgrade(manager));
        }
    }

    pub(crate) fn instance_managers(&self) -> Vec<Rc<RefCell<SceneInstanceManager>>> {
        self.instance_managers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}
