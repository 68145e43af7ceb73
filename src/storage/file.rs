//! Directory-of-JSON-files storage
//!
//! Each key maps to `<directory>/<key>.json`. Writes go through a temporary
//! file that is renamed over the target, so a crash mid-write leaves the
//! previous save intact.

use serde_json::Value;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{Storage, validate_key};
use crate::error::{PersistError, PersistResult};

const EXTENSION: &str = "json";

pub struct FileStorage {
    directory: PathBuf,
    pretty: bool,
}

impl FileStorage {
    /// Creates a storage rooted at `directory`, creating it if needed
    pub fn new(directory: impl AsRef<Path>) -> PersistResult<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            fs::create_dir_all(&directory)?;
        }

        Ok(FileStorage {
            directory,
            pretty: true,
        })
    }

    /// Pretty JSON is readable and debuggable, compact JSON is smaller
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, key: &str) -> PersistResult<PathBuf> {
        validate_key(key)?;
        Ok(self.directory.join(format!("{}.{}", key, EXTENSION)))
    }
}

impl Storage for FileStorage {
    fn set(&mut self, key: &str, document: &Value) -> PersistResult<()> {
        let path = self.path_for(key)?;
        let json = if self.pretty {
            serde_json::to_string_pretty(document)?
        } else {
            serde_json::to_string(document)?
        };

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;

        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> PersistResult<Value> {
        let path = self.path_for(key)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistError::KeyNotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&json)
            .map_err(|e| PersistError::CorruptedData(format!("{}: {}", path.display(), e)))
    }

    fn contains_key(&self, key: &str) -> bool {
        self.path_for(key).map(|path| path.is_file()).unwrap_or(false)
    }

    fn remove(&mut self, key: &str) -> PersistResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> PersistResult<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) == Some(EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
