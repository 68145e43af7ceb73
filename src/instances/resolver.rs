//! Asset resolution for runtime instances
//!
//! A spawn record only stores `(source, asset id, guid)`. Respawning needs
//! something that turns the asset id back into a fresh object: a [`Prefab`].
//! The host provides prefabs through an [`AssetResolver`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

use crate::component::ComponentRef;
use crate::error::{PersistError, PersistResult};

/// Where an asset id is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetSource {
    /// Assets shipped with the game, known before anything runs
    Resources,
    /// Assets registered at runtime with [`AssetResolver::register_asset`]
    Registered,
}

/// How the components of a fresh instance are addressed
pub enum ComponentLayout {
    /// Components with explicit, stable fragment ids
    Configured(Vec<(String, ComponentRef)>),
    /// Components without ids; they are discovered at spawn time and get
    /// order-derived ids
    Unconfigured(Vec<ComponentRef>),
}

/// A freshly built, not yet activated object
pub struct PrefabInstance {
    pub layout: ComponentLayout,
    pub load_once: bool,
}

impl PrefabInstance {
    pub fn configured(components: Vec<(String, ComponentRef)>) -> Self {
        PrefabInstance {
            layout: ComponentLayout::Configured(components),
            load_once: false,
        }
    }

    pub fn unconfigured(components: Vec<ComponentRef>) -> Self {
        PrefabInstance {
            layout: ComponentLayout::Unconfigured(components),
            load_once: false,
        }
    }

    pub fn with_load_once(mut self, load_once: bool) -> Self {
        self.load_once = load_once;
        self
    }
}

/// Builds new instances of one asset
pub trait Prefab {
    fn instantiate(&self) -> PrefabInstance;
}

impl<F> Prefab for F
where
    F: Fn() -> PrefabInstance,
{
    fn instantiate(&self) -> PrefabInstance {
        self()
    }
}

pub trait AssetResolver {
    /// Fails with `AssetResolution` when the asset is unknown
    fn resolve(&self, asset_id: &str, source: AssetSource) -> PersistResult<Rc<dyn Prefab>>;

    /// Makes `prefab` resolvable under `asset_id` from [`AssetSource::Registered`]
    fn register_asset(&mut self, asset_id: &str, prefab: Rc<dyn Prefab>);
}

/// Map-backed resolver
#[derive(Default)]
pub struct PrefabLibrary {
    resources: HashMap<String, Rc<dyn Prefab>>,
    registered: HashMap<String, Rc<dyn Prefab>>,
}

impl PrefabLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shipped asset
    pub fn with_resource(mut self, asset_id: &str, prefab: impl Prefab + 'static) -> Self {
        self.resources.insert(asset_id.to_string(), Rc::new(prefab));
        self
    }
}

impl AssetResolver for PrefabLibrary {
    fn resolve(&self, asset_id: &str, source: AssetSource) -> PersistResult<Rc<dyn Prefab>> {
        if asset_id.is_empty() {
            return Err(PersistError::InvalidArgument(
                "asset id must not be empty".to_string(),
            ));
        }

        let assets = match source {
            AssetSource::Resources => &self.resources,
            AssetSource::Registered => &self.registered,
        };

        assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| PersistError::AssetResolution {
                asset: asset_id.to_string(),
                origin: source,
                reason: "no such asset".to_string(),
            })
    }

    fn register_asset(&mut self, asset_id: &str, prefab: Rc<dyn Prefab>) {
        self.registered.insert(asset_id.to_string(), prefab);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{SaveVisibility, erase, shared};

    fn lamp() -> PrefabInstance {
        PrefabInstance::configured(vec![(
            "visibility".to_string(),
            erase(&shared(SaveVisibility::default())),
        )])
    }

    #[test]
    fn test_resolve_by_source() {
        let mut library = PrefabLibrary::new().with_resource("Lamp", lamp);
        library.register_asset("DroppedLamp", Rc::new(lamp));

        assert!(library.resolve("Lamp", AssetSource::Resources).is_ok());
        assert!(library.resolve("DroppedLamp", AssetSource::Registered).is_ok());

        let err = library
            .resolve("Lamp", AssetSource::Registered)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PersistError::AssetResolution { origin: AssetSource::Registered, .. }
        ));
    }

    #[test]
    fn test_prefab_builds_fresh_components() {
        let library = PrefabLibrary::new().with_resource("Lamp", lamp);
        let prefab = library.resolve("Lamp", AssetSource::Resources).unwrap();

        let (ComponentLayout::Configured(a), ComponentLayout::Configured(b)) =
            (prefab.instantiate().layout, prefab.instantiate().layout)
        else {
            panic!("expected configured layouts");
        };
        assert!(!Rc::ptr_eq(&a[0].1, &b[0].1));
    }

    #[test]
    fn test_asset_source_serializes_by_name() {
        assert_eq!(
            serde_json::to_value(AssetSource::Registered).unwrap(),
            serde_json::json!("Registered")
        );
    }
}
