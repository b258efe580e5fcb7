//! Durable key/value backends for the credential store
//!
//! A backend applies a batch of changes as one unit: either every change in
//! the batch is durable when `apply` returns `Ok`, or none of them is visible.
//! `CredentialStore` relies on this to write both tokens together.
//!
//! `FileStore` keeps a JSON object on disk, written with temp-file + rename so
//! a crash mid-write leaves the previous file intact. `MemoryStore` is the
//! non-durable backend used for fresh per-test stores.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One mutation in a batch passed to `KeyValueStore::apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StoreChange {
    pub fn set(key: &str, value: &str) -> Self {
        StoreChange::Set {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }

    pub fn remove(key: &str) -> Self {
        StoreChange::Remove {
            key: key.to_owned(),
        }
    }
}

/// Injected persistence medium for session tokens.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Apply all changes atomically and durably.
    fn apply(&self, changes: Vec<StoreChange>) -> BoxFuture<'_, Result<()>>;
}

fn apply_changes(map: &mut HashMap<String, String>, changes: Vec<StoreChange>) {
    for change in changes {
        match change {
            StoreChange::Set { key, value } => {
                map.insert(key, value);
            }
            StoreChange::Remove { key } => {
                map.remove(&key);
            }
        }
    }
}

/// In-process backend with no durability.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing entries (simulates values persisted by a previous run).
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn apply(&self, changes: Vec<StoreChange>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            apply_changes(&mut entries, changes);
            Ok(())
        })
    }
}

/// JSON-file backend.
///
/// The file holds a flat `{"key": "value"}` object. The Mutex serializes
/// writers; the in-memory copy is replaced only after the rename succeeds.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (logged-out cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded credential file");
            entries
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn apply(&self, changes: Vec<StoreChange>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let mut next = entries.clone();
            apply_changes(&mut next, changes);
            write_atomic(&self.path, &next).await?;
            *entries = next;
            Ok(())
        })
    }
}

/// Write the entries to `path` atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("credential path has no parent directory".into())),
    };

    // Unique per write so stores sharing a directory never clobber each other
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}",
        uuid::Uuid::new_v4().as_simple()
    ));

    if let Err(e) = replace_with(&tmp_path, path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

async fn replace_with(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))
}
