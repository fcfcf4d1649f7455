//! Key-value backends that hold persisted tokens.
//!
//! `TokenStore` only needs string get/set/remove, so the backing storage is
//! a small trait with three implementations:
//! - `MemoryStore`: process-local map
//! - `FileStore`: a JSON object in the cache directory
//! - `KeyringStore`: one OS keychain entry per key (macOS Keychain, Windows
//!   Credential Manager, Linux kernel keyutils)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::warn;

/// Keychain service name for `KeyringStore` entries.
pub const KEYRING_SERVICE: &str = "ecotrack";

/// Token file name in the cache directory.
pub const TOKENS_FILE: &str = "tokens.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain operation failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// JSON object on disk, re-read on every access so separate processes see
/// each other's writes.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store `tokens.json` inside the given cache directory.
    pub fn in_dir(cache_dir: &Path) -> Self {
        Self::new(cache_dir.join(TOKENS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load for a write. A corrupt file is replaced rather than blocking
    /// every later write.
    fn load_for_write(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.load() {
            Err(StorageError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "Token file is corrupt, overwriting");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;

        // Write a sibling file and rename it over, so readers never see a
        // half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.load() {
            Ok(mut entries) => {
                if entries.remove(key).is_some() {
                    self.save(&entries)?;
                }
                Ok(())
            }
            Err(StorageError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "Token file is corrupt, removing it");
                self.save(&BTreeMap::new())
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// KeyringStore
// ============================================================================

pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir()
            .join(format!("ecotrack-test-{}-{}-{}", name, std::process::id(), nanos))
            .join(TOKENS_FILE)
    }

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("accessToken").unwrap(), None);

        store.set("accessToken", "A1").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("A1"));

        store.remove("accessToken").unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);

        // Removing again is fine
        store.remove("accessToken").unwrap();
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let path = temp_path("persist");

        let first = FileStore::new(&path);
        first.set("accessToken", "A1").unwrap();
        first.set("refreshToken", "R1").unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.get("accessToken").unwrap().as_deref(), Some("A1"));
        assert_eq!(second.get("refreshToken").unwrap().as_deref(), Some("R1"));

        second.remove("accessToken").unwrap();
        second.remove("refreshToken").unwrap();
        assert!(!path.exists(), "empty store should delete its file");

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_file_store_missing_file_reads_empty() {
        let store = FileStore::new(temp_path("missing"));
        assert_eq!(store.get("accessToken").unwrap(), None);
        store.remove("accessToken").unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("accessToken"), Err(StorageError::Corrupt(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_store_recovers_from_truncated_file() {
        let path = temp_path("truncated");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"accessToken": "A"#).unwrap();

        let store = FileStore::new(&path);
        store.remove("refreshToken").unwrap();
        assert!(!path.exists(), "corrupt file should be dropped on remove");

        std::fs::write(&path, r#"{"accessToken": "A"#).unwrap();
        store.set("accessToken", "A1").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("A1"));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_token_store_heals_corrupt_file() {
        let path = temp_path("heal");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"accessToken": "A"#).unwrap();

        let tokens = TokenStore::new(Arc::new(FileStore::new(&path)));
        tokens.clear();
        tokens.write("A1", Some("R1"));

        assert_eq!(tokens.access().as_deref(), Some("A1"));
        assert_eq!(tokens.refresh().as_deref(), Some("R1"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_keyring_store_round_trip() {
        let store = KeyringStore::with_service("ecotrack-test-round-trip");
        // Hosts without a reachable keychain refuse the write outright
        if let Err(e) = store.set("accessToken", "A1") {
            eprintln!("skipping keychain round trip: {}", e);
            return;
        }

        let read = store.get("accessToken");
        let _ = store.remove("accessToken");

        assert_eq!(read.unwrap().as_deref(), Some("A1"));
        assert_eq!(store.get("accessToken").unwrap(), None);
    }
}
