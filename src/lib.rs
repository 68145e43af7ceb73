//! Scene object persistence
//!
//! Stateful objects come and go while a game runs. This crate tracks them by
//! stable identity, gathers their state into one versioned document per save
//! slot, and reconstitutes it later, respawning objects that were created at
//! runtime before their state is applied.
//!
//! # Layout
//!
//! - [`state`]: the per-object [`StateContainer`] and the per-slot [`GameState`]
//! - [`component`]: leaf behaviors that save one fragment each
//! - [`saveable`]: [`SaveableObject`], one object made of fragments
//! - [`registry`]: [`StateRegistry`], synchronization, slots, global variables
//! - [`instances`]: respawning of runtime-spawned objects per scene
//! - [`storage`]: where slot documents are written

pub mod component;
pub mod error;
pub mod identity;
pub mod instances;
pub mod registry;
pub mod saveable;
pub mod settings;
pub mod state;
pub mod storage;

pub use component::{ComponentIdTable, ComponentRef, SaveableComponent, erase, shared};
pub use error::{PersistError, PersistResult};
pub use identity::{FragmentAddress, GuidIdentity, Identifier, IdentityProvider};
pub use instances::{AssetResolver, AssetSource, PrefabInstance, PrefabLibrary, RuntimeInstances};
pub use registry::{RegistryEvent, SlotSwitch, StateRegistry};
pub use saveable::{Saveable, SaveableHandle, SaveableObject};
pub use settings::SaveSettings;
pub use state::{GameState, StateContainer};
pub use storage::{FileStorage, MemoryStorage, Storage};
