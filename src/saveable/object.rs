//! Saveable aggregate: one object, many component fragments
//!
//! A [`SaveableObject`] owns an identity and an ordered table of
//! `fragment id -> component`. On save it asks each component for its
//! fragment and stores it in a scratch [`StateContainer`] under the
//! fragment id; on load it hands each component the fragment stored under
//! its id.
//!
//! # Lifecycle
//!
//! - Uninitialized: a `SaveableObject` being configured. Nothing is
//!   registered yet, so its identity may still be changed freely.
//! - Active: [`SaveableObject::activate`] validates the fragment table,
//!   registers with the registry (unless manual) and returns a
//!   [`SaveableHandle`].
//! - Destroyed: [`SaveableHandle::destroy`] unregisters, optionally saving
//!   one last time.
//!
//! A handle that is simply dropped leaves a dangling registry entry which
//! the registry prunes on its next pass; its latest state is not saved.

use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::component::ids::unique_id;
use crate::component::{ComponentRef, SaveableComponent, WeakComponentRef};
use crate::error::{PersistError, PersistResult};
use crate::identity::{GuidIdentity, Identifier, IdentityProvider};
use crate::registry::StateRegistry;
use crate::state::StateContainer;

use super::{Saveable, SaveableRef};

struct ComponentSlot {
    id: String,
    component: WeakComponentRef,
}

pub struct SaveableObject {
    identity: Box<dyn IdentityProvider>,
    context: String,
    components: Vec<ComponentSlot>,
    container: StateContainer,
    manual_save_load: bool,
    load_once: bool,
    has_loaded: bool,
    has_state_reset: bool,
}

impl SaveableObject {
    pub fn new(identity: impl IdentityProvider + 'static, context: impl Into<String>) -> Self {
        SaveableObject {
            identity: Box::new(identity),
            context: context.into(),
            components: Vec::new(),
            container: StateContainer::new(),
            manual_save_load: false,
            load_once: false,
            has_loaded: false,
            has_state_reset: false,
        }
    }

    /// Object with a fresh random GUID identity
    pub fn with_guid(context: impl Into<String>) -> Self {
        Self::new(GuidIdentity::new(), context)
    }

    /// Adds a component under an explicit, stable fragment id
    pub fn with_component<C: SaveableComponent>(
        self,
        fragment_id: impl Into<String>,
        component: &Rc<RefCell<C>>,
    ) -> Self {
        let erased: ComponentRef = component.clone();
        self.with_erased_component(fragment_id, &erased)
    }

    pub fn with_erased_component(
        mut self,
        fragment_id: impl Into<String>,
        component: &ComponentRef,
    ) -> Self {
        self.components.push(ComponentSlot {
            id: fragment_id.into(),
            component: Rc::downgrade(component),
        });
        self
    }

    /// Adds a component under its base id, made unique if already taken
    pub fn with_derived_component<C: SaveableComponent>(
        self,
        component: &Rc<RefCell<C>>,
        registry: &StateRegistry,
    ) -> Self {
        let base = registry.component_ids().base_id(&*component.borrow());
        let fragment_id = unique_id(&base, |candidate| self.has_fragment(candidate));
        self.with_component(fragment_id, component)
    }

    /// Keep the first loaded state and ignore later loads (persistent objects)
    pub fn load_once(mut self, load_once: bool) -> Self {
        self.load_once = load_once;
        self
    }

    /// Opt out of automatic registration and synchronization
    pub fn manual_save_load(mut self, manual: bool) -> Self {
        self.manual_save_load = manual;
        self
    }

    pub fn identity_mut(&mut self) -> &mut dyn IdentityProvider {
        self.identity.as_mut()
    }

    pub fn is_manual(&self) -> bool {
        self.manual_save_load
    }

    pub fn is_load_once(&self) -> bool {
        self.load_once
    }

    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    pub fn has_fragment(&self, fragment_id: &str) -> bool {
        self.components.iter().any(|slot| slot.id == fragment_id)
    }

    pub fn fragment_ids(&self) -> Vec<String> {
        self.components.iter().map(|slot| slot.id.clone()).collect()
    }

    /// Scratch container holding the last saved or loaded fragments
    pub fn container(&self) -> &StateContainer {
        &self.container
    }

    /// Checks the fragment table: ids must be non-empty and unique
    pub fn validate(&self) -> PersistResult<()> {
        for (index, slot) in self.components.iter().enumerate() {
            if slot.id.is_empty() {
                return Err(PersistError::InvalidArgument(format!(
                    "component #{} of {} has an empty fragment id",
                    index,
                    self.identity.stable_id()
                )));
            }
            if self.components[..index].iter().any(|other| other.id == slot.id) {
                return Err(PersistError::InvalidArgument(format!(
                    "fragment id '{}' is used twice on {}",
                    slot.id,
                    self.identity.stable_id()
                )));
            }
        }
        Ok(())
    }

    /// Validates, then registers with `registry` unless manual
    ///
    /// Registration loads any state already stored under this object's id,
    /// so the identity must be final before activation.
    pub fn activate(self, registry: &Rc<StateRegistry>) -> PersistResult<SaveableHandle> {
        self.validate()?;

        let manual = self.manual_save_load;
        let handle = SaveableHandle {
            object: Rc::new(RefCell::new(self)),
            registry: Rc::clone(registry),
        };

        if !manual {
            registry.register_saveable(&handle.as_saveable(), true)?;
        }

        Ok(handle)
    }

    fn attach(&mut self, fragment_id: String, component: &ComponentRef) -> PersistResult<()> {
        if fragment_id.is_empty() {
            return Err(PersistError::InvalidArgument(
                "fragment id must not be empty".to_string(),
            ));
        }
        if self.has_fragment(&fragment_id) {
            return Err(PersistError::InvalidArgument(format!(
                "fragment id '{}' already exists on {}",
                fragment_id,
                self.identity.stable_id()
            )));
        }

        self.components.push(ComponentSlot {
            id: fragment_id,
            component: Rc::downgrade(component),
        });
        Ok(())
    }

    fn prune(&mut self, stale: &[String]) {
        if stale.is_empty() {
            return;
        }
        self.components.retain(|slot| !stale.contains(&slot.id));
    }
}

impl Saveable for SaveableObject {
    fn id(&self) -> Identifier {
        self.identity.stable_id()
    }

    fn context(&self) -> String {
        self.context.clone()
    }

    fn save(&mut self) -> PersistResult<Value> {
        let mut stale = Vec::new();

        for slot in &self.components {
            let Some(component) = slot.component.upgrade() else {
                log::warn!(
                    "Failed to save component '{}' of {}: component was destroyed",
                    slot.id,
                    self.identity.stable_id()
                );
                stale.push(slot.id.clone());
                continue;
            };

            let Ok(mut component) = component.try_borrow_mut() else {
                log::error!(
                    "Failed to save component '{}' of {}: component is borrowed elsewhere",
                    slot.id,
                    self.identity.stable_id()
                );
                continue;
            };

            if !self.has_state_reset && !component.should_save() {
                continue;
            }

            if let Err(e) = component.save_into(&mut self.container, &slot.id) {
                log::error!(
                    "Failed to save component '{}' of {}: {}",
                    slot.id,
                    self.identity.stable_id(),
                    e
                );
            }
        }

        self.prune(&stale);
        self.has_state_reset = false;
        Ok(self.container.save())
    }

    fn load(&mut self, document: Value) -> PersistResult<()> {
        if self.load_once && self.has_loaded {
            log::debug!(
                "Skipping load of {}: already loaded once",
                self.identity.stable_id()
            );
            return Ok(());
        }

        self.container.load(document)?;
        self.has_loaded = true;

        let mut stale = Vec::new();

        for slot in &self.components {
            let Some(component) = slot.component.upgrade() else {
                log::warn!(
                    "Failed to load component '{}' of {}: component was destroyed",
                    slot.id,
                    self.identity.stable_id()
                );
                stale.push(slot.id.clone());
                continue;
            };

            let Ok(mut component) = component.try_borrow_mut() else {
                log::error!(
                    "Failed to load component '{}' of {}: component is borrowed elsewhere",
                    slot.id,
                    self.identity.stable_id()
                );
                continue;
            };

            if let Err(e) = component.load_from(&self.container, &slot.id) {
                log::error!(
                    "Failed to load component '{}' of {}: {}",
                    slot.id,
                    self.identity.stable_id(),
                    e
                );
            }
        }

        self.prune(&stale);
        Ok(())
    }

    fn reset_state(&mut self) {
        self.load_once = false;
        self.has_loaded = false;
        self.has_state_reset = true;
    }
}

/// An activated saveable object
///
/// Carries the registry it was activated with, so follow-up operations
/// (adding components, targeted save/load, destruction) reach the same
/// registry.
pub struct SaveableHandle {
    object: Rc<RefCell<SaveableObject>>,
    registry: Rc<StateRegistry>,
}

impl SaveableHandle {
    pub fn id(&self) -> Identifier {
        self.object.borrow().id()
    }

    pub fn context(&self) -> String {
        self.object.borrow().context()
    }

    pub fn is_manual(&self) -> bool {
        self.object.borrow().is_manual()
    }

    pub fn object(&self) -> Ref<'_, SaveableObject> {
        self.object.borrow()
    }

    pub fn object_mut(&self) -> RefMut<'_, SaveableObject> {
        self.object.borrow_mut()
    }

    /// The object as the registry sees it
    pub fn as_saveable(&self) -> SaveableRef {
        self.object.clone()
    }

    pub fn registry(&self) -> &Rc<StateRegistry> {
        &self.registry
    }

    /// Adds a component after activation under an explicit id
    ///
    /// With `reload`, the object is reloaded from the registry so the new
    /// component picks up data already stored under `fragment_id`.
    pub fn add_component<C: SaveableComponent>(
        &self,
        fragment_id: impl Into<String>,
        component: &Rc<RefCell<C>>,
        reload: bool,
    ) -> PersistResult<()> {
        let erased: ComponentRef = component.clone();
        self.object
            .borrow_mut()
            .attach(fragment_id.into(), &erased)?;

        if reload {
            self.reload()?;
        }
        Ok(())
    }

    /// Adds components discovered at runtime, then reloads
    ///
    /// Ids are derived from scan order (`Dyn-<base id>-<index>`). Reordering
    /// the components between a save and a load binds stored data to the
    /// wrong component; prefer [`SaveableHandle::add_component`] with
    /// explicit ids.
    pub fn scan_add_components(&self, components: &[ComponentRef]) -> PersistResult<()> {
        {
            let table = self.registry.component_ids();
            let mut object = self.object.borrow_mut();
            for (index, component) in components.iter().enumerate() {
                let fragment_id = table.dynamic_id(&*component.borrow(), index);
                object.attach(fragment_id, component)?;
            }
        }

        self.reload()?;
        Ok(())
    }

    /// Makes the next save ignore change gating and re-arms loading
    pub fn reset_state(&self) {
        self.object.borrow_mut().reset_state();
    }

    /// Writes this object's state into the registry's game state
    pub fn save(&self) -> PersistResult<()> {
        self.registry.save_saveable(&self.as_saveable())
    }

    /// Loads this object's state from the registry's game state
    ///
    /// Returns false when nothing is stored for it.
    pub fn reload(&self) -> PersistResult<bool> {
        self.registry.load_saveable(&self.as_saveable())
    }

    /// Removes this object's stored state
    pub fn wipe(&self) -> bool {
        self.registry.wipe_saveable(&self.as_saveable())
    }

    /// Unregisters from the registry, saving one last time if `auto_save`
    ///
    /// Manual objects are never registered; for them `auto_save` still
    /// writes the final state.
    pub fn destroy(self, auto_save: bool) -> PersistResult<bool> {
        if self.is_manual() {
            if auto_save {
                self.save()?;
            }
            return Ok(false);
        }

        self.registry
            .unregister_saveable(&self.as_saveable(), auto_save)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{SavePosition, SaveVisibility, erase, shared};
    use crate::settings::SaveSettings;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    /// Component that records what it was asked to do
    struct Marker {
        value: Option<String>,
        loaded: Option<String>,
        dirty: bool,
    }

    impl Marker {
        fn new(value: &str) -> Rc<RefCell<Self>> {
            shared(Marker {
                value: Some(value.to_string()),
                loaded: None,
                dirty: true,
            })
        }
    }

    impl SaveableComponent for Marker {
        type Data = String;

        fn save(&mut self) -> Option<String> {
            self.dirty = false;
            self.value.clone()
        }

        fn load(&mut self, data: String) {
            self.loaded = Some(data.clone());
            self.value = Some(data);
        }

        fn on_save_condition(&self) -> bool {
            self.dirty
        }
    }

    fn object_with(markers: &[(&str, &Rc<RefCell<Marker>>)]) -> SaveableObject {
        markers
            .iter()
            .fold(SaveableObject::with_guid("Level1"), |object, (id, marker)| {
                object.with_component(*id, marker)
            })
    }

    #[test]
    fn test_save_collects_fragments_by_id() {
        let a = Marker::new("alpha");
        let b = Marker::new("beta");
        let mut object = object_with(&[("a", &a), ("b", &b)]);

        let document = object.save().unwrap();
        assert_eq!(document, json!({ "a": "alpha", "b": "beta" }));
    }

    #[test]
    fn test_round_trip_after_reset() {
        let position = shared(SavePosition::new([1.0, 2.0, 3.0]));
        let visibility = shared(SaveVisibility { visible: false });
        let mut object = SaveableObject::with_guid("Level1")
            .with_component("position", &position)
            .with_component("visibility", &visibility);

        let saved = object.save().unwrap();

        position.borrow_mut().position = [9.0, 9.0, 9.0];
        visibility.borrow_mut().visible = true;
        object.load(saved.clone()).unwrap();
        assert_eq!(position.borrow().position, [1.0, 2.0, 3.0]);
        assert!(!visibility.borrow().visible);

        object.reset_state();
        assert_eq!(object.save().unwrap(), saved);
    }

    #[test]
    fn test_on_save_condition_gates_and_reset_bypasses() {
        let a = Marker::new("first");
        let mut object = object_with(&[("a", &a)]);
        object.save().unwrap();

        // Clean component: new value is not picked up
        a.borrow_mut().value = Some("second".to_string());
        assert_eq!(object.save().unwrap(), json!({ "a": "first" }));

        object.reset_state();
        assert_eq!(object.save().unwrap(), json!({ "a": "second" }));

        // Reset only applies to one save
        a.borrow_mut().value = Some("third".to_string());
        assert_eq!(object.save().unwrap(), json!({ "a": "second" }));
    }

    #[test]
    fn test_null_fragment_is_isolated() {
        let f1 = Marker::new("one");
        let f2 = Marker::new("two");
        let f3 = Marker::new("three");
        let mut object = object_with(&[("f1", &f1), ("f2", &f2), ("f3", &f3)]);
        object.save().unwrap();

        f2.borrow_mut().value = None;
        f2.borrow_mut().dirty = true;
        let document = object.save().unwrap();

        assert_eq!(document["f1"], json!("one"));
        assert_eq!(document["f3"], json!("three"));
        assert_eq!(object.container().get::<String>("f2").unwrap(), "two");
    }

    #[test]
    fn test_load_once() {
        let a = Marker::new("initial");
        let mut object = object_with(&[("a", &a)]).load_once(true);

        object.load(json!({ "a": "from first save" })).unwrap();
        object.load(json!({ "a": "from second save" })).unwrap();

        assert_eq!(a.borrow().value.as_deref(), Some("from first save"));
        assert!(object.has_loaded());
    }

    #[test]
    fn test_reset_rearms_loading() {
        let a = Marker::new("initial");
        let mut object = object_with(&[("a", &a)]).load_once(true);
        object.load(json!({ "a": "first" })).unwrap();

        object.reset_state();
        assert!(!object.has_loaded());
        object.load(json!({ "a": "second" })).unwrap();
        assert_eq!(a.borrow().value.as_deref(), Some("second"));
    }

    #[test]
    fn test_missing_fragment_keeps_current_state() {
        let a = Marker::new("default");
        let mut object = object_with(&[("a", &a)]);

        object.load(json!({ "something_else": 1 })).unwrap();
        assert_eq!(a.borrow().value.as_deref(), Some("default"));
        assert!(a.borrow().loaded.is_none());
    }

    #[test]
    fn test_type_mismatch_skips_only_that_fragment() {
        let a = Marker::new("a");
        let b = Marker::new("b");
        let mut object = object_with(&[("a", &a), ("b", &b)]);

        object.load(json!({ "a": 42, "b": "restored" })).unwrap();
        assert_eq!(a.borrow().value.as_deref(), Some("a"));
        assert_eq!(b.borrow().value.as_deref(), Some("restored"));
    }

    #[test]
    fn test_destroyed_component_is_pruned() {
        let a = Marker::new("a");
        let b = Marker::new("b");
        let mut object = object_with(&[("a", &a), ("b", &b)]);
        drop(b);

        let document = object.save().unwrap();
        assert_eq!(document, json!({ "a": "a" }));
        assert_eq!(object.fragment_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn test_load_replaces_container() {
        let a = Marker::new("a");
        let mut object = object_with(&[("a", &a)]);
        object.save().unwrap();

        object.load(json!({ "other": true })).unwrap();
        assert!(!object.container().contains_key("a"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let a = Marker::new("a");
        let b = Marker::new("b");
        let object = object_with(&[("same", &a), ("same", &b)]);
        assert!(matches!(object.validate(), Err(PersistError::InvalidArgument(_))));

        let object = object_with(&[("", &a)]);
        assert!(object.validate().is_err());
    }

    #[test]
    fn test_rejected_document_keeps_load_once_armed() {
        let a = Marker::new("initial");
        let mut object = object_with(&[("a", &a)]).load_once(true);

        assert!(object.load(json!(5)).is_err());
        assert!(!object.has_loaded());

        object.load(json!({ "a": "restored" })).unwrap();
        assert_eq!(a.borrow().value.as_deref(), Some("restored"));
    }

    fn registry() -> Rc<StateRegistry> {
        StateRegistry::new(SaveSettings::default(), MemoryStorage::new())
    }

    #[test]
    fn test_add_component_picks_up_stored_fragment() {
        let registry = registry();
        let original = Marker::new("stored");
        let handle = SaveableObject::new(GuidIdentity::with_id("door"), "Level1")
            .with_component("hinge", &original)
            .activate(&registry)
            .unwrap();
        handle.save().unwrap();
        handle.destroy(false).unwrap();

        let handle = SaveableObject::new(GuidIdentity::with_id("door"), "Level1")
            .activate(&registry)
            .unwrap();
        let late = Marker::new("fresh");
        handle.add_component("hinge", &late, true).unwrap();
        assert_eq!(late.borrow().value.as_deref(), Some("stored"));

        let quiet = Marker::new("untouched");
        handle.add_component("lock", &quiet, false).unwrap();
        assert!(quiet.borrow().loaded.is_none());
        assert!(handle.add_component("hinge", &quiet, false).is_err());
    }

    #[test]
    fn test_scan_assigns_order_derived_ids() {
        let registry = registry();
        let near = shared(SaveVisibility { visible: false });
        let far = shared(SaveVisibility { visible: true });
        let handle = SaveableObject::new(GuidIdentity::with_id("lamps"), "Level1")
            .activate(&registry)
            .unwrap();

        handle
            .scan_add_components(&[erase(&near), erase(&far)])
            .unwrap();
        assert_eq!(
            handle.object().fragment_ids(),
            vec!["Dyn-visibility-0".to_string(), "Dyn-visibility-1".to_string()]
        );

        handle.save().unwrap();
        assert_eq!(
            registry.game_state().try_get_value(&Identifier::new("lamps")),
            Some(&json!({ "Dyn-visibility-0": false, "Dyn-visibility-1": true }))
        );
    }

    #[test]
    fn test_derived_ids_are_unique() {
        let registry = registry();
        let a = shared(SavePosition::default());
        let b = shared(SavePosition::default());
        let object = SaveableObject::with_guid("Level1")
            .with_derived_component(&a, &registry)
            .with_derived_component(&b, &registry);

        let ids = object.fragment_ids();
        assert_eq!(ids[0], "position");
        assert!(ids[1].starts_with("position-"));
        assert!(object.validate().is_ok());
    }

    #[test]
    fn test_attach_rejects_existing_id() {
        let a = Marker::new("a");
        let b = erase(&Marker::new("b"));
        let mut object = object_with(&[("a", &a)]);

        assert!(object.attach("a".to_string(), &b).is_err());
        assert!(object.attach("b".to_string(), &b).is_ok());
    }
}
