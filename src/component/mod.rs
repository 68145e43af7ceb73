//! Saveable component protocol
//!
//! A saveable component is one leaf behavior of an object (its position, its
//! visibility, an inventory, ...) that can produce and consume its own
//! fragment of the object's state.
//!
//! # Architecture
//!
//! - [`SaveableComponent`]: the typed trait game code implements. The data
//!   type is an associated type, so a component can never hand back data of
//!   a different type than the one it loads.
//! - [`DynSaveableComponent`]: the type-erased form the aggregate stores,
//!   blanket-implemented for every `SaveableComponent`.
//! - `ids`: the static type → base id table used when ids are derived
//!   instead of configured.
//! - `builtin`: ready-made position / rotation / scale / visibility /
//!   inventory components.
//!
//! Components are shared as `Rc<RefCell<_>>`. Game code keeps the strong
//! handle; aggregates only keep a weak one, so a component dropped by game
//! code is detected as stale on the next save or load.

pub mod builtin;
pub mod ids;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{PersistError, PersistResult};
use crate::state::StateContainer;

pub use builtin::{
    ItemInfo, SaveInventory, SavePosition, SaveRotation, SaveScale, SaveVisibility,
};
pub use ids::ComponentIdTable;

/// Trait for components that contribute a fragment to their object's state
///
/// # Example
///
/// ```ignore
/// impl SaveableComponent for Health {
///     type Data = f32;
///
///     fn save(&mut self) -> Option<f32> {
///         Some(self.current)
///     }
///
///     fn load(&mut self, data: f32) {
///         self.current = data;
///     }
/// }
/// ```
pub trait SaveableComponent: 'static {
    type Data: Serialize + DeserializeOwned;

    /// Captures the current state
    ///
    /// Must only read state. Returning `None` is treated as an authoring
    /// error: it is logged and the previously stored fragment is kept.
    fn save(&mut self) -> Option<Self::Data>;

    fn load(&mut self, data: Self::Data);

    /// Gates `save` during a normal sync so unchanged components can skip
    /// serialization. Ignored for the first save after a state reset.
    fn on_save_condition(&self) -> bool {
        true
    }
}

/// Type-erased view of a [`SaveableComponent`]
pub trait DynSaveableComponent {
    /// Saves into `container` under `fragment_id`
    fn save_into(&mut self, container: &mut StateContainer, fragment_id: &str)
    -> PersistResult<()>;

    /// Loads from `container`; returns false when nothing is stored under
    /// `fragment_id`
    fn load_from(&mut self, container: &StateContainer, fragment_id: &str) -> PersistResult<bool>;

    fn should_save(&self) -> bool;

    fn component_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: SaveableComponent> DynSaveableComponent for C {
    fn save_into(
        &mut self,
        container: &mut StateContainer,
        fragment_id: &str,
    ) -> PersistResult<()> {
        let data = SaveableComponent::save(self).ok_or_else(|| PersistError::NullSaveData {
            fragment: fragment_id.to_string(),
        })?;
        container.set(fragment_id, &data)
    }

    fn load_from(&mut self, container: &StateContainer, fragment_id: &str) -> PersistResult<bool> {
        if !container.contains_key(fragment_id) {
            return Ok(false);
        }

        let data: C::Data = container.get(fragment_id)?;
        SaveableComponent::load(self, data);
        Ok(true)
    }

    fn should_save(&self) -> bool {
        SaveableComponent::on_save_condition(self)
    }

    fn component_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Strong handle to a type-erased component
pub type ComponentRef = Rc<RefCell<dyn DynSaveableComponent>>;

/// Weak handle held by aggregates
pub type WeakComponentRef = Weak<RefCell<dyn DynSaveableComponent>>;

/// Wraps a component into the shared handle aggregates attach to
pub fn shared<C: SaveableComponent>(component: C) -> Rc<RefCell<C>> {
    Rc::new(RefCell::new(component))
}

/// Erases a typed handle
pub fn erase<C: SaveableComponent>(component: &Rc<RefCell<C>>) -> ComponentRef {
    component.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
        saves: u32,
    }

    impl SaveableComponent for Counter {
        type Data = u32;

        fn save(&mut self) -> Option<u32> {
            self.saves += 1;
            Some(self.value)
        }

        fn load(&mut self, data: u32) {
            self.value = data;
        }
    }

    struct Broken;

    impl SaveableComponent for Broken {
        type Data = String;

        fn save(&mut self) -> Option<String> {
            None
        }

        fn load(&mut self, _data: String) {}
    }

    #[test]
    fn test_erased_save_and_load() {
        let mut container = StateContainer::new();
        let mut counter = Counter { value: 5, saves: 0 };

        counter.save_into(&mut container, "counter").unwrap();
        assert_eq!(container.get::<u32>("counter").unwrap(), 5);
        assert_eq!(counter.saves, 1);

        let mut other = Counter { value: 0, saves: 0 };
        assert!(other.load_from(&container, "counter").unwrap());
        assert_eq!(other.value, 5);
    }

    #[test]
    fn test_absent_fragment_is_not_an_error() {
        let container = StateContainer::new();
        let mut counter = Counter { value: 9, saves: 0 };
        assert!(!counter.load_from(&container, "counter").unwrap());
        assert_eq!(counter.value, 9);
    }

    #[test]
    fn test_wrong_stored_type_is_a_mismatch() {
        let mut container = StateContainer::new();
        container.set("counter", "not a number").unwrap();
        let mut counter = Counter { value: 9, saves: 0 };

        let err = counter.load_from(&container, "counter").unwrap_err();
        assert!(matches!(err, PersistError::TypeMismatch { .. }));
        assert_eq!(counter.value, 9);
    }

    #[test]
    fn test_null_save_data() {
        let mut container = StateContainer::new();
        let err = Broken.save_into(&mut container, "broken").unwrap_err();
        assert!(matches!(err, PersistError::NullSaveData { fragment } if fragment == "broken"));
        assert!(container.is_empty());
    }

    #[test]
    fn test_erase_keeps_type_identity() {
        let counter = shared(Counter { value: 1, saves: 0 });
        let erased = erase(&counter);
        assert_eq!(erased.borrow().component_type(), TypeId::of::<Counter>());
        assert!(erased.borrow().type_name().ends_with("Counter"));
    }
}
