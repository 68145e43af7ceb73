//! Error types for the persistence core
//!
//! Errors fall into three groups:
//! - Configuration errors (duplicate registration, registering while a bulk
//!   sync is running, slot out of range, empty keys) are returned straight to
//!   the caller.
//! - Data errors (null save data, type mismatches) are returned by the
//!   low-level containers but logged and isolated per fragment by the
//!   aggregate that owns them.
//! - Storage errors (I/O, serialization, version) come from the storage
//!   backends and slot management.

use thiserror::Error;

use crate::instances::AssetSource;

pub type PersistResult<T> = Result<T, PersistError>;

#[derive(Debug, Error)]
pub enum PersistError {
    /// Caller passed an empty key, a null value or a malformed document
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no value stored under key '{0}'")]
    KeyNotFound(String),

    /// Stored value exists but cannot decode as the requested type
    #[error("value under key '{key}' has an unexpected type: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("saveable '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Registration changes are rejected while a bulk synchronization runs
    #[error("cannot {0} while state is synchronizing")]
    InvalidOperationDuringSync(&'static str),

    #[error("slot {slot} is out of range (0..{max})")]
    OutOfRange { slot: usize, max: usize },

    #[error("cannot resolve asset '{asset}' from {origin:?}: {reason}")]
    AssetResolution {
        asset: String,
        origin: AssetSource,
        reason: String,
    },

    /// A component produced no data during save
    #[error("component '{fragment}' returned no save data")]
    NullSaveData { fragment: String },

    #[error("save version {found} is newer than supported version {supported}")]
    InvalidVersion { found: i32, supported: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupted save data: {0}")]
    CorruptedData(String),
}

impl PersistError {
    /// True for the errors a caller made by misusing the API
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PersistError::InvalidArgument(_)
                | PersistError::DuplicateRegistration(_)
                | PersistError::InvalidOperationDuringSync(_)
                | PersistError::OutOfRange { .. }
        )
    }
}
