//! Runtime instances: objects spawned while the game runs
//!
//! - `resolver`: [`AssetResolver`] / [`Prefab`], how an asset id becomes a
//!   fresh object
//! - `scene`: [`SceneInstanceManager`], spawn records and respawning for
//!   one scene
//!
//! [`RuntimeInstances`] keeps one manager per loaded scene and routes spawn
//! and destroy calls to the right one.

pub mod resolver;
pub mod scene;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{PersistError, PersistResult};
use crate::identity::Identifier;
use crate::registry::StateRegistry;
use crate::saveable::SaveableRef;

pub use resolver::{AssetResolver, AssetSource, ComponentLayout, Prefab, PrefabInstance, PrefabLibrary};
pub use scene::{RuntimeInstance, SceneInstanceManager, SpawnData, SpawnRecord};

pub struct RuntimeInstances {
    registry: Rc<StateRegistry>,
    resolver: Rc<RefCell<dyn AssetResolver>>,
    managers: HashMap<String, Rc<RefCell<SceneInstanceManager>>>,
    active_scene: Option<String>,
}

impl RuntimeInstances {
    pub fn new(registry: &Rc<StateRegistry>, resolver: Rc<RefCell<dyn AssetResolver>>) -> Self {
        RuntimeInstances {
            registry: Rc::clone(registry),
            resolver,
            managers: HashMap::new(),
            active_scene: None,
        }
    }

    pub fn resolver(&self) -> &Rc<RefCell<dyn AssetResolver>> {
        &self.resolver
    }

    /// Host signal: `scene` finished loading
    ///
    /// Creates the scene's manager, which respawns the objects recorded for
    /// it. The first loaded scene becomes the active one.
    pub fn on_scene_loaded(&mut self, scene: &str) -> PersistResult<()> {
        if !self.registry.on_scene_loaded(scene) || self.managers.contains_key(scene) {
            log::error!(
                "Scene '{}' is already loaded; duplicate scenes are not supported by runtime instances",
                scene
            );
            return Ok(());
        }

        let manager = SceneInstanceManager::create(scene, &self.registry, Rc::clone(&self.resolver))?;
        self.managers.insert(scene.to_string(), manager);

        if self.active_scene.is_none() {
            self.active_scene = Some(scene.to_string());
        }
        Ok(())
    }

    /// Host signal: `scene` was unloaded
    ///
    /// The manager saves its records and is unregistered; its objects are
    /// released with their state saved.
    pub fn on_scene_unloaded(&mut self, scene: &str) -> PersistResult<()> {
        self.registry.on_scene_unloaded(scene);

        let Some(manager) = self.managers.remove(scene) else {
            return Ok(());
        };

        let saveable: SaveableRef = manager.clone();
        self.registry.unregister_saveable(&saveable, true)?;
        manager.borrow_mut().release_instances()?;

        if self.active_scene.as_deref() == Some(scene) {
            self.active_scene = None;
        }
        Ok(())
    }

    /// Scene that spawns go to when no scene is named
    pub fn set_active_scene(&mut self, scene: &str) -> PersistResult<()> {
        if !self.managers.contains_key(scene) {
            return Err(PersistError::InvalidArgument(format!(
                "scene '{}' is not loaded",
                scene
            )));
        }
        self.active_scene = Some(scene.to_string());
        Ok(())
    }

    pub fn active_scene(&self) -> Option<&str> {
        self.active_scene.as_deref()
    }

    pub fn manager(&self, scene: &str) -> Option<&Rc<RefCell<SceneInstanceManager>>> {
        self.managers.get(scene)
    }

    /// Spawns `asset_id` into `scene`, or into the active scene
    pub fn instantiate(
        &self,
        asset_id: &str,
        source: AssetSource,
        scene: Option<&str>,
    ) -> PersistResult<Identifier> {
        let scene = scene
            .or(self.active_scene.as_deref())
            .ok_or_else(|| PersistError::InvalidArgument("no scene is loaded".to_string()))?;

        let manager = self.managers.get(scene).ok_or_else(|| {
            PersistError::InvalidArgument(format!("scene '{}' is not loaded", scene))
        })?;

        manager.borrow_mut().instantiate(asset_id, source)
    }

    /// Destroys a spawned instance, whichever scene it lives in
    pub fn destroy(&self, id: &Identifier) -> PersistResult<bool> {
        for manager in self.managers.values() {
            if manager.borrow().contains(id) {
                return manager.borrow_mut().destroy(id);
            }
        }
        Ok(false)
    }

    /// Scene the instance `id` lives in
    pub fn scene_of(&self, id: &Identifier) -> Option<&str> {
        self.managers
            .iter()
            .find(|(_, manager)| manager.borrow().contains(id))
            .map(|(scene, _)| scene.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{SaveVisibility, erase, shared};
    use crate::settings::SaveSettings;
    use crate::storage::MemoryStorage;

    fn setup() -> RuntimeInstances {
        let registry = StateRegistry::new(SaveSettings::default(), MemoryStorage::new());
        let library = PrefabLibrary::new().with_resource("Key", || {
            PrefabInstance::configured(vec![(
                "visibility".to_string(),
                erase(&shared(SaveVisibility::default())),
            )])
        });
        RuntimeInstances::new(&registry, Rc::new(RefCell::new(library)))
    }

    #[test]
    fn test_instantiate_needs_a_scene() {
        let instances = setup();
        let err = instances
            .instantiate("Key", AssetSource::Resources, None)
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidArgument(_)));
    }

    #[test]
    fn test_spawn_into_active_and_named_scene() {
        let mut instances = setup();
        instances.on_scene_loaded("Level1").unwrap();
        instances.on_scene_loaded("Level2").unwrap();
        assert_eq!(instances.active_scene(), Some("Level1"));

        let a = instances.instantiate("Key", AssetSource::Resources, None).unwrap();
        let b = instances
            .instantiate("Key", AssetSource::Resources, Some("Level2"))
            .unwrap();

        assert_eq!(instances.scene_of(&a), Some("Level1"));
        assert_eq!(instances.scene_of(&b), Some("Level2"));
        assert!(instances.destroy(&b).unwrap());
        assert_eq!(instances.scene_of(&b), None);
    }

    #[test]
    fn test_duplicate_scene_load_keeps_first_manager() {
        let mut instances = setup();
        instances.on_scene_loaded("Level1").unwrap();
        let id = instances.instantiate("Key", AssetSource::Resources, None).unwrap();

        instances.on_scene_loaded("Level1").unwrap();
        assert_eq!(instances.scene_of(&id), Some("Level1"));
    }

    #[test]
    fn test_unload_saves_records() {
        let mut instances = setup();
        instances.on_scene_loaded("Level1").unwrap();
        let id = instances.instantiate("Key", AssetSource::Resources, None).unwrap();

        instances.on_scene_unloaded("Level1").unwrap();
        assert!(instances.manager("Level1").is_none());

        let registry = Rc::clone(&instances.registry);
        let state = registry.game_state();
        let records = state
            .try_get_value(&Identifier::new("RuntimeInstances-Level1"))
            .cloned()
            .unwrap();
        let data: SpawnData = serde_json::from_value(records).unwrap();
        assert_eq!(data.spawns.len(), 1);
        assert_eq!(data.spawns[0].guid, id.to_string());
        assert!(state.contains_id(&id));
    }
}
