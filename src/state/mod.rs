//! Saved-state data structures
//!
//! - `container`: per-object key/value bag ([`StateContainer`])
//! - `game_state`: the versioned per-slot document ([`GameState`])

pub mod container;
pub mod game_state;

pub use container::StateContainer;
pub use game_state::{GameState, GameStateDocument, MetaData, StateEntry};
