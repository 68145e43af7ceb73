//! Registry lifecycle events
//!
//! Handlers receive the registry itself, so a participant can hook into a
//! bulk pass (e.g. persist extra state right before synchronization).
//! Handlers run synchronously in subscription order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::StateRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A bulk synchronization is about to start; registration is already locked
    StateSynchronizing,
    /// Every live saveable has been written into the game state
    StateSynchronized,
    StateLoading,
    StateLoaded,
    /// The active slot is about to change
    SlotChanging { from: Option<usize>, to: usize },
    SlotChanged(usize),
    WritingToDisk(usize),
    WrittenToDisk(usize),
}

pub type EventHandler = Rc<dyn Fn(&StateRegistry, &RegistryEvent)>;

/// Handle returned by [`StateRegistry::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct EventBus {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(ListenerId, EventHandler)>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, handler));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(listener, _)| *listener != id);
        handlers.len() != before
    }

    /// Handlers may (un)subscribe while the event is being delivered; those
    /// changes apply from the next event on
    pub(crate) fn emit(&self, registry: &StateRegistry, event: RegistryEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();

        for handler in handlers {
            handler(registry, &event);
        }
    }
}
