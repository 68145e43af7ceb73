//! Ready-made saveable components
//!
//! These are thin data holders: the host copies its engine state into them
//! (or reads it back out) and the save system takes care of the rest.

use serde::{Deserialize, Serialize};

use super::SaveableComponent;
use crate::error::{PersistError, PersistResult};

pub type Vec3 = [f32; 3];
pub type Quat = [f32; 4];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionData {
    pub position: Vec3,
}

/// Saves a world position, skipping the save while it hasn't moved
#[derive(Debug, Clone, Default)]
pub struct SavePosition {
    pub position: Vec3,
    last_saved: Option<Vec3>,
}

impl SavePosition {
    pub fn new(position: Vec3) -> Self {
        SavePosition {
            position,
            last_saved: None,
        }
    }
}

impl SaveableComponent for SavePosition {
    type Data = PositionData;

    fn save(&mut self) -> Option<PositionData> {
        self.last_saved = Some(self.position);
        Some(PositionData {
            position: self.position,
        })
    }

    fn load(&mut self, data: PositionData) {
        self.position = data.position;
        self.last_saved = Some(data.position);
    }

    fn on_save_condition(&self) -> bool {
        self.last_saved != Some(self.position)
    }
}

/// Saves an orientation quaternion `[x, y, z, w]`
#[derive(Debug, Clone)]
pub struct SaveRotation {
    pub rotation: Quat,
    last_saved: Option<Quat>,
}

impl SaveRotation {
    pub fn new(rotation: Quat) -> Self {
        SaveRotation {
            rotation,
            last_saved: None,
        }
    }
}

impl Default for SaveRotation {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0, 1.0]) // identity
    }
}

impl SaveableComponent for SaveRotation {
    type Data = Quat;

    fn save(&mut self) -> Option<Quat> {
        self.last_saved = Some(self.rotation);
        Some(self.rotation)
    }

    fn load(&mut self, data: Quat) {
        self.rotation = data;
        self.last_saved = Some(data);
    }

    fn on_save_condition(&self) -> bool {
        self.last_saved != Some(self.rotation)
    }
}

#[derive(Debug, Clone)]
pub struct SaveScale {
    pub scale: Vec3,
    last_saved: Option<Vec3>,
}

impl SaveScale {
    pub fn new(scale: Vec3) -> Self {
        SaveScale {
            scale,
            last_saved: None,
        }
    }
}

impl Default for SaveScale {
    fn default() -> Self {
        Self::new([1.0, 1.0, 1.0])
    }
}

impl SaveableComponent for SaveScale {
    type Data = Vec3;

    fn save(&mut self) -> Option<Vec3> {
        self.last_saved = Some(self.scale);
        Some(self.scale)
    }

    fn load(&mut self, data: Vec3) {
        self.scale = data;
        self.last_saved = Some(data);
    }

    fn on_save_condition(&self) -> bool {
        self.last_saved != Some(self.scale)
    }
}

/// Saves whether an object is shown
#[derive(Debug, Clone)]
pub struct SaveVisibility {
    pub visible: bool,
}

impl Default for SaveVisibility {
    fn default() -> Self {
        SaveVisibility { visible: true }
    }
}

impl SaveableComponent for SaveVisibility {
    type Data = bool;

    fn save(&mut self) -> Option<bool> {
        Some(self.visible)
    }

    fn load(&mut self, data: bool) {
        self.visible = data;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub name: String,
    pub count: u32,
}

/// Named item counts
#[derive(Debug, Clone, Default)]
pub struct SaveInventory {
    items: Vec<ItemInfo>,
}

impl SaveInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ItemInfo] {
        &self.items
    }

    pub fn add_item(&mut self, name: &str, count: u32) {
        match self.items.iter_mut().find(|item| item.name == name) {
            Some(item) => item.count += count,
            None => self.items.push(ItemInfo {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Removes `count` items, failing without changes if there are fewer
    pub fn remove_item(&mut self, name: &str, count: u32) -> PersistResult<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.name == name)
            .ok_or_else(|| PersistError::InvalidArgument(format!("no item named '{}'", name)))?;

        if item.count < count {
            return Err(PersistError::InvalidArgument(format!(
                "cannot remove {} '{}', only {} held",
                count, name, item.count
            )));
        }

        item.count -= count;
        Ok(())
    }

    pub fn has_item(&self, name: &str, count: u32) -> bool {
        self.items
            .iter()
            .any(|item| item.name == name && item.count >= count)
    }
}

impl SaveableComponent for SaveInventory {
    type Data = Vec<ItemInfo>;

    fn save(&mut self) -> Option<Vec<ItemInfo>> {
        Some(self.items.clone())
    }

    fn load(&mut self, data: Vec<ItemInfo>) {
        self.items = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_skips_unchanged() {
        let mut position = SavePosition::new([1.0, 2.0, 3.0]);
        assert!(position.on_save_condition());

        position.save();
        assert!(!position.on_save_condition());

        position.position[0] = 5.0;
        assert!(position.on_save_condition());
    }

    #[test]
    fn test_loaded_position_counts_as_saved() {
        let mut position = SavePosition::default();
        position.load(PositionData {
            position: [4.0, 0.0, 0.0],
        });
        assert_eq!(position.position, [4.0, 0.0, 0.0]);
        assert!(!position.on_save_condition());
    }

    #[test]
    fn test_rotation_and_scale_defaults() {
        assert_eq!(SaveRotation::default().rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(SaveScale::default().scale, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_inventory_stacking() {
        let mut inventory = SaveInventory::new();
        inventory.add_item("key", 1);
        inventory.add_item("key", 2);
        inventory.add_item("coin", 10);

        assert_eq!(inventory.items().len(), 2);
        assert!(inventory.has_item("key", 3));
        assert!(!inventory.has_item("key", 4));
    }

    #[test]
    fn test_inventory_remove_checks_count() {
        let mut inventory = SaveInventory::new();
        inventory.add_item("coin", 2);

        assert!(inventory.remove_item("coin", 3).is_err());
        assert!(inventory.has_item("coin", 2)); // unchanged

        inventory.remove_item("coin", 2).unwrap();
        assert!(!inventory.has_item("coin", 1));
        assert!(inventory.remove_item("gem", 1).is_err());
    }
}
