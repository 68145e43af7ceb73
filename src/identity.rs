//! Stable object identity
//!
//! Every saveable object is addressed by an [`Identifier`] supplied by an
//! [`IdentityProvider`]. The provider is the host's concern (editor-assigned
//! GUIDs, asset-backed ids, ...); [`GuidIdentity`] is the default random
//! UUID implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, stable identifier of a saveable object
///
/// Usually the canonical text form of a 128-bit GUID, but any non-empty
/// string is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Identifier(id.into())
    }

    /// Creates a fresh random (version 4) identifier
    pub fn random() -> Self {
        Identifier(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the identifier is a well-formed, non-nil UUID
    pub fn is_guid(&self) -> bool {
        Uuid::parse_str(&self.0)
            .map(|uuid| !uuid.is_nil())
            .unwrap_or(false)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Identifier::new(id)
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Identifier(id)
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Identifier(uuid.to_string())
    }
}

/// Address of a single component fragment inside a game state
///
/// Objects are keyed by [`Identifier`]; inside an object's document each
/// fragment is keyed by its fragment id. The pair is the canonical address
/// of a stored fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentAddress {
    pub object: Identifier,
    pub fragment: String,
}

impl FragmentAddress {
    pub fn new(object: impl Into<Identifier>, fragment: impl Into<String>) -> Self {
        FragmentAddress {
            object: object.into(),
            fragment: fragment.into(),
        }
    }
}

impl fmt::Display for FragmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object, self.fragment)
    }
}

/// Supplies the stable id of one object
///
/// Implemented by the host. The runtime instance manager relies on
/// [`IdentityProvider::set_id`] to re-apply a saved id onto a respawned
/// object before that object registers itself.
pub trait IdentityProvider {
    fn stable_id(&self) -> Identifier;

    /// Replaces the current id with a freshly generated one
    fn regenerate_id(&mut self);

    fn set_id(&mut self, id: Identifier);
}

/// Random-UUID identity, generated once on construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidIdentity {
    id: Identifier,
}

impl GuidIdentity {
    pub fn new() -> Self {
        GuidIdentity {
            id: Identifier::random(),
        }
    }

    pub fn with_id(id: impl Into<Identifier>) -> Self {
        GuidIdentity { id: id.into() }
    }
}

impl Default for GuidIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for GuidIdentity {
    fn stable_id(&self) -> Identifier {
        self.id.clone()
    }

    fn regenerate_id(&mut self) {
        self.id = Identifier::random();
    }

    fn set_id(&mut self, id: Identifier) {
        self.id = id;
    }
}
