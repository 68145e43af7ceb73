//! Saveables: the units the registry synchronizes
//!
//! Anything the [`StateRegistry`](crate::registry::StateRegistry) tracks
//! implements [`Saveable`]. The usual implementation is
//! [`SaveableObject`], which multiplexes the fragments of its components
//! into one document; the per-scene runtime instance manager is another.

pub mod object;

use serde_json::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::PersistResult;
use crate::identity::Identifier;

pub use object::{SaveableHandle, SaveableObject};

/// Trait for anything that stores one document in the game state
pub trait Saveable {
    fn id(&self) -> Identifier;

    /// Context the stored entry is tagged with (usually the scene name)
    fn context(&self) -> String;

    /// Produces the document to store under [`Saveable::id`]
    fn save(&mut self) -> PersistResult<Value>;

    /// Applies a previously stored document
    fn load(&mut self, document: Value) -> PersistResult<()>;

    /// Forgets load history so the next slot is applied as if fresh
    fn reset_state(&mut self) {}
}

pub type SaveableRef = Rc<RefCell<dyn Saveable>>;
pub type WeakSaveableRef = Weak<RefCell<dyn Saveable>>;

/// Identity comparison that ignores vtable pointers
pub(crate) fn same_saveable(weak: &WeakSaveableRef, strong: &SaveableRef) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), Rc::as_ptr(strong))
}

/// Best-effort id for log messages; the saveable may be mid-borrow
pub(crate) fn describe(saveable: &SaveableRef) -> String {
    saveable
        .try_borrow()
        .map(|s| s.id().to_string())
        .unwrap_or_else(|_| "<busy saveable>".to_string())
}
