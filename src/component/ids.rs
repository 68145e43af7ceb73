//! Static table of component base ids
//!
//! Fragment ids are the addresses component data is stored under, so they
//! must survive type renames. Games register a short, stable base id per
//! component type at startup; unregistered types fall back to their short
//! type name.

use std::any::TypeId;
use std::collections::HashMap;

use super::{DynSaveableComponent, SaveableComponent};
use super::builtin::{SaveInventory, SavePosition, SaveRotation, SaveScale, SaveVisibility};
use crate::error::{PersistError, PersistResult};

/// Length of the uuid suffix appended to make a derived id unique
const UNIQUE_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct ComponentIdTable {
    ids: HashMap<TypeId, &'static str>,
}

impl ComponentIdTable {
    pub fn new() -> Self {
        ComponentIdTable {
            ids: HashMap::new(),
        }
    }

    /// Table with the built-in components pre-registered
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.ids.insert(TypeId::of::<SavePosition>(), "position");
        table.ids.insert(TypeId::of::<SaveRotation>(), "rotation");
        table.ids.insert(TypeId::of::<SaveScale>(), "scale");
        table.ids.insert(TypeId::of::<SaveVisibility>(), "visibility");
        table.ids.insert(TypeId::of::<SaveInventory>(), "inventory");
        table
    }

    /// Registers the base id of component type `C`
    ///
    /// Re-registering the same id is allowed; changing a type's id is not,
    /// because data saved under the old id would be orphaned.
    pub fn register<C: SaveableComponent>(&mut self, base_id: &'static str) -> PersistResult<()> {
        if base_id.is_empty() {
            return Err(PersistError::InvalidArgument(
                "component base id must not be empty".to_string(),
            ));
        }

        match self.ids.get(&TypeId::of::<C>()) {
            Some(existing) if *existing != base_id => Err(PersistError::InvalidArgument(format!(
                "component {} already registered as '{}'",
                std::any::type_name::<C>(),
                existing
            ))),
            _ => {
                self.ids.insert(TypeId::of::<C>(), base_id);
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.ids.contains_key(&type_id)
    }

    /// Base id of a component: its registered id, else its short type name
    ///
    /// Not unique: two components of the same type share a base id.
    pub fn base_id(&self, component: &dyn DynSaveableComponent) -> String {
        match self.ids.get(&component.component_type()) {
            Some(id) => id.to_string(),
            None => short_type_name(component.type_name()).to_string(),
        }
    }

    /// Id for the `index`-th component found by a runtime scan
    ///
    /// Depends on scan order; see [`crate::saveable::SaveableHandle::scan_add_components`].
    pub fn dynamic_id(&self, component: &dyn DynSaveableComponent, index: usize) -> String {
        format!("Dyn-{}-{}", self.base_id(component), index)
    }
}

/// Makes `base` unique by appending a short uuid chunk while `is_taken`
pub fn unique_id(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut id = base.to_string();
    while id.is_empty() || is_taken(&id) {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        id = format!("{}-{}", base, &suffix[..UNIQUE_SUFFIX_LEN]);
    }
    id
}

/// `a::b::Foo<c::Bar>` -> `Foo`
fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}
