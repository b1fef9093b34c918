//! Session and local key-value storage
//!
//! The browser gives the front end two string-keyed stores: session storage
//! (scoped to the tab) and local storage (persistent). [`KeyValueStore`]
//! abstracts both so the auth state can be tested in memory and persisted
//! to disk by the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Session-storage key for the current access token
pub const SESSION_TOKEN_KEY: &str = "kubex:apiToken";
/// Session-storage key for the JSON-encoded user summary
pub const SESSION_USER_KEY: &str = "kubex:user";
/// Session-storage key for the refresh token handed out at sign-in
pub const SESSION_REFRESH_KEY: &str = "kubex:refreshToken";
/// Local-storage key of the UI locale (owned by the presentation layer)
pub const LOCAL_LOCALE_KEY: &str = "kubex-locale";
/// Local-storage key of the UI theme (owned by the presentation layer)
pub const LOCAL_THEME_KEY: &str = "kubex-theme";

/// A string-keyed store with browser storage semantics
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> crate::Result<()>;

    fn remove(&self, key: &str) -> crate::Result<()>;
}

/// In-memory store, lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> crate::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk. Every write goes through to the
/// file; the file and its parent directory are created on first write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                crate::PortalError::Storage(format!("Corrupt store {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Opened store {:?} with {} entries", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> crate::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> crate::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}

/// The two storage scopes the front end sees
#[derive(Clone)]
pub struct BrowserStorage {
    pub session: Arc<dyn KeyValueStore>,
    pub local: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for BrowserStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserStorage").finish_non_exhaustive()
    }
}

impl BrowserStorage {
    pub fn new(session: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { session, local }
    }

    /// Both scopes in memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Open each scope from a file when a path is given, else keep it in memory
    pub fn open(session_path: Option<&Path>, local_path: Option<&Path>) -> crate::Result<Self> {
        Ok(Self::new(open_scope(session_path)?, open_scope(local_path)?))
    }
}

fn open_scope(path: Option<&Path>) -> crate::Result<Arc<dyn KeyValueStore>> {
    Ok(match path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    })
}
