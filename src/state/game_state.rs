//! The top-level saved document of one slot
//!
//! A [`GameState`] maps object identifiers to `(context, document)` pairs
//! and carries slot metadata (version, creation time, play time). It is only
//! mutated by the registry; storage sees it through [`GameStateDocument`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{PersistError, PersistResult};
use crate::identity::{FragmentAddress, Identifier};

/// One stored object: the context it belongs to (usually a scene name) and
/// its state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub context: String,
    pub data: Value,
}

/// Metadata block as written to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub version: i32,
    pub created_at: String,
    pub play_time: String,
}

/// Persisted layout of a game state
///
/// ```json
/// { "metadata": { "version": 1, "createdAt": "...", "playTime": "0:05:12.250" },
///   "entries": { "<id>": { "context": "Level1", "data": { ... } } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateDocument {
    pub metadata: MetaData,
    pub entries: BTreeMap<Identifier, StateEntry>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameState {
    game_version: i32,
    created_at: Option<DateTime<Local>>,
    time_played: Duration,
    entries: BTreeMap<Identifier, StateEntry>,
}

impl GameState {
    pub fn new(game_version: i32) -> Self {
        GameState {
            game_version,
            ..Default::default()
        }
    }

    pub fn game_version(&self) -> i32 {
        self.game_version
    }

    /// Creation time, assigned the first time the state is written
    pub fn created_at(&self) -> Option<DateTime<Local>> {
        self.created_at
    }

    pub fn time_played(&self) -> Duration {
        self.time_played
    }

    pub fn add_time_played(&mut self, delta: Duration) {
        self.time_played += delta;
    }

    pub fn contains_id(&self, id: &Identifier) -> bool {
        self.entries.contains_key(id)
    }

    /// Stores `data` for `id`, replacing any previous entry
    pub fn set(&mut self, id: Identifier, data: Value, context: impl Into<String>) {
        self.entries.insert(
            id,
            StateEntry {
                context: context.into(),
                data,
            },
        );
    }

    pub fn get(&self, id: &Identifier) -> PersistResult<&Value> {
        self.try_get_value(id)
            .ok_or_else(|| PersistError::KeyNotFound(id.to_string()))
    }

    pub fn try_get_value(&self, id: &Identifier) -> Option<&Value> {
        self.entries.get(id).map(|entry| &entry.data)
    }

    pub fn context_of(&self, id: &Identifier) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.context.as_str())
    }

    /// Stored document of a single fragment
    pub fn fragment(&self, address: &FragmentAddress) -> Option<&Value> {
        self.try_get_value(&address.object)
            .and_then(|data| data.get(&address.fragment))
    }

    pub fn remove(&mut self, id: &Identifier) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Removes every entry tagged with `context`, returning how many went
    pub fn remove_context(&mut self, context: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.context != context);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Identifier> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Identifier, &StateEntry)> {
        self.entries.iter()
    }

    /// Builds the persisted form, stamping the creation time on first write
    pub fn to_document(&mut self) -> GameStateDocument {
        let created_at = *self.created_at.get_or_insert_with(Local::now);

        GameStateDocument {
            metadata: MetaData {
                version: self.game_version,
                created_at: created_at.to_rfc3339(),
                play_time: format_play_time(self.time_played),
            },
            entries: self.entries.clone(),
        }
    }

    /// Rebuilds a game state from storage
    ///
    /// Unparseable metadata strings fall back to "unknown creation time" and
    /// zero play time.
    pub fn from_document(document: GameStateDocument) -> Self {
        let GameStateDocument { metadata, entries } = document;

        let created_at = match DateTime::parse_from_rfc3339(&metadata.created_at) {
            Ok(parsed) => Some(parsed.with_timezone(&Local)),
            Err(e) => {
                log::warn!(
                    "Unreadable save creation time '{}': {}",
                    metadata.created_at,
                    e
                );
                None
            }
        };

        let time_played = parse_play_time(&metadata.play_time).unwrap_or_else(|| {
            log::warn!("Unreadable play time '{}'", metadata.play_time);
            Duration::ZERO
        });

        GameState {
            game_version: metadata.version,
            created_at,
            time_played,
            entries,
        }
    }
}

/// Formats a duration as `H:MM:SS.mmm`
pub fn format_play_time(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{}:{:02}:{:02}.{:03}",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        duration.subsec_millis()
    )
}

/// Parses the `H:MM:SS.mmm` format written by [`format_play_time`]
pub fn parse_play_time(text: &str) -> Option<Duration> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let mut state = GameState::new(1);
        let id = Identifier::new("player");
        state.set(id.clone(), json!({ "hp": 3 }), "Level1");

        assert!(state.contains_id(&id));
        assert_eq!(state.get(&id).unwrap(), &json!({ "hp": 3 }));
        assert_eq!(state.context_of(&id), Some("Level1"));

        assert!(state.remove(&id));
        assert!(!state.remove(&id));
        assert!(matches!(state.get(&id), Err(PersistError::KeyNotFound(_))));
    }

    #[test]
    fn test_single_entry_per_id() {
        let mut state = GameState::new(1);
        state.set(Identifier::new("a"), json!(1), "Level1");
        state.set(Identifier::new("a"), json!(2), "Level2");

        assert_eq!(state.len(), 1);
        assert_eq!(state.context_of(&Identifier::new("a")), Some("Level2"));
    }

    #[test]
    fn test_remove_context() {
        let mut state = GameState::new(1);
        state.set(Identifier::new("a"), json!(1), "Level1");
        state.set(Identifier::new("b"), json!(2), "Level1");
        state.set(Identifier::new("c"), json!(3), "Global");

        assert_eq!(state.remove_context("Level1"), 2);
        assert_eq!(state.len(), 1);
        assert_eq!(state.remove_context("Level1"), 0);
    }

    #[test]
    fn test_fragment_address_lookup() {
        let mut state = GameState::new(1);
        state.set(
            Identifier::new("door"),
            json!({ "visibility": false, "position": { "position": [1.0, 2.0, 0.0] } }),
            "Level1",
        );

        let address = FragmentAddress::new("door", "visibility");
        assert_eq!(state.fragment(&address), Some(&json!(false)));
        assert_eq!(state.fragment(&FragmentAddress::new("door", "scale")), None);
    }

    #[test]
    fn test_document_stamps_creation_time_once() {
        let mut state = GameState::new(2);
        assert!(state.created_at().is_none());

        let first = state.to_document();
        let second = state.to_document();
        assert_eq!(first.metadata.created_at, second.metadata.created_at);
        assert_eq!(first.metadata.version, 2);
    }

    #[test]
    fn test_document_round_trip_keeps_metadata() {
        let mut state = GameState::new(4);
        state.add_time_played(Duration::from_millis(3_723_500));
        state.set(Identifier::new("a"), json!({ "x": 1 }), "Level1");

        let json = serde_json::to_value(state.to_document()).unwrap();
        assert_eq!(json["metadata"]["playTime"], json!("1:02:03.500"));

        let document: GameStateDocument = serde_json::from_value(json).unwrap();
        let restored = GameState::from_document(document);

        assert_eq!(restored.game_version(), 4);
        assert_eq!(restored.time_played(), Duration::from_millis(3_723_500));
        assert_eq!(
            restored.created_at().map(|t| t.timestamp()),
            state.created_at().map(|t| t.timestamp())
        );
        assert_eq!(restored.try_get_value(&Identifier::new("a")), Some(&json!({ "x": 1 })));
    }

    #[test]
    fn test_bad_metadata_falls_back() {
        let document = GameStateDocument {
            metadata: MetaData {
                version: 1,
                created_at: "yesterday".to_string(),
                play_time: "a while".to_string(),
            },
            entries: BTreeMap::new(),
        };

        let state = GameState::from_document(document);
        assert!(state.created_at().is_none());
        assert_eq!(state.time_played(), Duration::ZERO);
    }

    #[test]
    fn test_parse_play_time_rejects_garbage() {
        assert_eq!(parse_play_time("0:00:01.250"), Some(Duration::from_millis(1250)));
        assert_eq!(parse_play_time("1:75:00"), None);
        assert_eq!(parse_play_time("1:00"), None);
        assert_eq!(parse_play_time("1:00:00:00"), None);
    }
}
