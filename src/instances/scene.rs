//! Per-scene runtime instance manager
//!
//! Objects spawned at runtime (dropped items, placed buildings, ...) do not
//! exist when a scene is loaded from scratch, so their state alone cannot
//! be applied. The manager remembers one [`SpawnRecord`] per spawned object
//! and is itself a saveable: its document is the list of records. On load
//! it respawns every recorded object that is not already alive, fixing the
//! saved identifier onto it before the object registers, so the object then
//! finds its own state under that identifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use super::resolver::{AssetResolver, AssetSource, ComponentLayout};
use crate::component::{ComponentRef, SaveableComponent};
use crate::error::{PersistError, PersistResult};
use crate::identity::{GuidIdentity, Identifier, IdentityProvider};
use crate::registry::StateRegistry;
use crate::saveable::{Saveable, SaveableHandle, SaveableObject, SaveableRef};

/// What is needed to respawn one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub source: AssetSource,
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub guid: String,
}

/// Persisted document of a manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnData {
    pub spawns: Vec<SpawnRecord>,
}

/// A live spawned object
///
/// Owns the components; the object's saveable only references them.
pub struct RuntimeInstance {
    record: SpawnRecord,
    handle: SaveableHandle,
    components: Vec<ComponentRef>,
}

impl RuntimeInstance {
    pub fn record(&self) -> &SpawnRecord {
        &self.record
    }

    pub fn handle(&self) -> &SaveableHandle {
        &self.handle
    }

    pub fn components(&self) -> &[ComponentRef] {
        &self.components
    }
}

pub struct SceneInstanceManager {
    scene: String,
    id: Identifier,
    registry: Rc<StateRegistry>,
    resolver: Rc<RefCell<dyn AssetResolver>>,
    instances: BTreeMap<Identifier, RuntimeInstance>,
    loaded_ids: HashSet<Identifier>,
    changes_made: usize,
    last_save: Option<Value>,
}

impl SceneInstanceManager {
    /// Creates the manager of `scene` and registers it with `registry`
    ///
    /// Registration loads the manager's stored records right away, so
    /// objects spawned in an earlier session are respawned here.
    pub fn create(
        scene: &str,
        registry: &Rc<StateRegistry>,
        resolver: Rc<RefCell<dyn AssetResolver>>,
    ) -> PersistResult<Rc<RefCell<Self>>> {
        if scene.is_empty() {
            return Err(PersistError::InvalidArgument(
                "scene name must not be empty".to_string(),
            ));
        }

        let manager = Rc::new(RefCell::new(SceneInstanceManager {
            scene: scene.to_string(),
            id: Identifier::new(format!("RuntimeInstances-{}", scene)),
            registry: Rc::clone(registry),
            resolver,
            instances: BTreeMap::new(),
            loaded_ids: HashSet::new(),
            changes_made: 0,
            last_save: None,
        }));

        registry.register_instance_manager(&manager);
        let saveable: SaveableRef = manager.clone();
        registry.register_saveable(&saveable, true)?;

        Ok(manager)
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.instances.contains_key(id)
    }

    pub fn instance_ids(&self) -> Vec<Identifier> {
        self.instances.keys().cloned().collect()
    }

    pub fn instance(&self, id: &Identifier) -> Option<&RuntimeInstance> {
        self.instances.get(id)
    }

    /// Runs `f` on the first component of type `C` of instance `id`
    pub fn with_component<C, R>(&self, id: &Identifier, f: impl FnOnce(&mut C) -> R) -> Option<R>
    where
        C: SaveableComponent,
    {
        let instance = self.instances.get(id)?;
        for component in &instance.components {
            let mut component = component.borrow_mut();
            if let Some(typed) = component.as_any_mut().downcast_mut::<C>() {
                return Some(f(typed));
            }
        }
        None
    }

    /// Spawns a new instance of `asset_id` in this scene
    ///
    /// The object gets a fresh identifier before it registers, so it never
    /// picks up state stored for another object.
    pub fn instantiate(&mut self, asset_id: &str, source: AssetSource) -> PersistResult<Identifier> {
        let instance = self.spawn(asset_id, source, GuidIdentity::new())?;
        let id = instance.handle.id();

        self.loaded_ids.insert(id.clone());
        self.instances.insert(id.clone(), instance);
        self.changes_made += 1;

        log::debug!("Spawned '{}' as {} in '{}'", asset_id, id, self.scene);
        Ok(id)
    }

    /// Resolves and activates one object with the given identity
    fn spawn(
        &self,
        asset_id: &str,
        source: AssetSource,
        identity: GuidIdentity,
    ) -> PersistResult<RuntimeInstance> {
        let prefab = self.resolver.borrow().resolve(asset_id, source)?;
        let fresh = prefab.instantiate();

        // Every fragment is attached before activation registers and loads
        let mut object = SaveableObject::new(identity, self.scene.as_str()).load_once(fresh.load_once);
        let components = match fresh.layout {
            ComponentLayout::Configured(components) => {
                for (fragment_id, component) in &components {
                    object = object.with_erased_component(fragment_id.as_str(), component);
                }
                components.into_iter().map(|(_, component)| component).collect()
            }
            ComponentLayout::Unconfigured(components) => {
                log::warn!(
                    "Asset '{}' has no configured saveable components; scanning at spawn time is slower and ties saved data to component order",
                    asset_id
                );
                let table = self.registry.component_ids();
                for (index, component) in components.iter().enumerate() {
                    let fragment_id = table.dynamic_id(&*component.borrow(), index);
                    object = object.with_erased_component(fragment_id, component);
                }
                components
            }
        };

        let handle = object.activate(&self.registry)?;

        Ok(RuntimeInstance {
            record: SpawnRecord {
                source,
                asset_id: asset_id.to_string(),
                guid: handle.id().to_string(),
            },
            handle,
            components,
        })
    }

    /// Destroys a spawned instance from game logic
    ///
    /// Its saved state is wiped, unless the application is quitting, in
    /// which case the state is kept (and refreshed) for the next session.
    /// Returns false if `id` is not an instance of this scene.
    pub fn destroy(&mut self, id: &Identifier) -> PersistResult<bool> {
        if self.registry.is_synchronizing() {
            return Err(PersistError::InvalidOperationDuringSync(
                "destroy a runtime instance",
            ));
        }

        let Some(instance) = self.instances.remove(id) else {
            return Ok(false);
        };
        self.loaded_ids.remove(id);
        self.changes_made += 1;

        let keep_data = self.registry.is_application_quitting();
        if !keep_data {
            instance.handle.wipe();
        }
        instance.handle.destroy(keep_data)?;

        log::debug!("Destroyed runtime instance {} in '{}'", id, self.scene);
        Ok(true)
    }

    /// Destroys every spawned instance without touching their saved state
    ///
    /// Used before the registry swaps in another slot.
    pub fn destroy_all_objects(&mut self) -> PersistResult<()> {
        let instances = std::mem::take(&mut self.instances);
        self.loaded_ids.clear();
        if !instances.is_empty() {
            self.changes_made += 1;
        }

        for (_, instance) in instances {
            instance.handle.destroy(false)?;
        }
        Ok(())
    }

    /// Unregisters every instance, saving each one last time
    ///
    /// Used when the scene unloads: the objects go away but their state
    /// stays in the game state.
    pub fn release_instances(&mut self) -> PersistResult<()> {
        let instances = std::mem::take(&mut self.instances);
        self.loaded_ids.clear();

        for (_, instance) in instances {
            instance.handle.destroy(true)?;
        }
        Ok(())
    }

    fn spawn_data(&self) -> SpawnData {
        SpawnData {
            spawns: self
                .instances
                .values()
                .map(|instance| instance.record.clone())
                .collect(),
        }
    }

    fn respawn(&mut self, record: SpawnRecord) {
        let id = Identifier::new(record.guid.as_str());
        if self.loaded_ids.contains(&id) {
            return;
        }

        if !id.is_guid() {
            log::error!(
                "Unknown guid '{}' for asset '{}' in '{}'",
                record.guid,
                record.asset_id,
                self.scene
            );
            return;
        }

        // The id must be final before the object registers and loads
        let mut identity = GuidIdentity::new();
        identity.set_id(id.clone());

        self.loaded_ids.insert(id.clone());
        match self.spawn(&record.asset_id, record.source, identity) {
            Ok(instance) => {
                self.instances.insert(id, instance);
            }
            Err(e) => {
                self.loaded_ids.remove(&id);
                log::error!(
                    "Unable to respawn {} (asset '{}' from {:?}) in '{}': {}",
                    id,
                    record.asset_id,
                    record.source,
                    self.scene,
                    e
                );
            }
        }
    }
}

impl Saveable for SceneInstanceManager {
    fn id(&self) -> Identifier {
        self.id.clone()
    }

    fn context(&self) -> String {
        self.scene.clone()
    }

    fn save(&mut self) -> PersistResult<Value> {
        if self.changes_made == 0 {
            if let Some(cached) = &self.last_save {
                return Ok(cached.clone());
            }
        }

        let document = serde_json::to_value(self.spawn_data())?;
        self.changes_made = 0;
        self.last_save = Some(document.clone());
        Ok(document)
    }

    fn load(&mut self, document: Value) -> PersistResult<()> {
        let data: SpawnData = serde_json::from_value(document).map_err(|e| {
            PersistError::CorruptedData(format!("spawn records of '{}': {}", self.scene, e))
        })?;

        for record in data.spawns {
            self.respawn(record);
        }

        // Records may now differ from what was last saved
        self.last_save = None;
        Ok(())
    }
}
