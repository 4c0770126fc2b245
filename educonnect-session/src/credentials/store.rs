//! Credential persistence.
//!
//! A store holds at most one credential pair. Reads are served from memory.
//! A write reaches memory only once the backing medium has accepted it. A
//! clear updates memory first, so it is visible to the next `read()` even if
//! removing the file fails.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::types::{Credential, StoredCredential};
use crate::error::CredentialError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current credential, or `None` when unauthenticated.
    async fn read(&self) -> Option<Credential>;

    /// Replace the current credential (last write wins).
    async fn write(&self, credential: &Credential) -> Result<(), CredentialError>;

    /// Forget the current credential.
    async fn clear(&self) -> Result<(), CredentialError>;
}

/// Process-local store without durability.
#[derive(Default)]
pub struct MemoryCredentialStore {
    current: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    async fn write(&self, credential: &Credential) -> Result<(), CredentialError> {
        *self.current.write() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        *self.current.write() = None;
        Ok(())
    }
}

/// JSON file store that survives process restarts.
///
/// The document holds the `accessToken` and `refreshToken` keys. Writes go to
/// a sibling temp file that is renamed over the target.
pub struct FileCredentialStore {
    path: PathBuf,
    current: RwLock<Option<Credential>>,
    /// Serializes file operations so memory and file change in the same order.
    io_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialStore {
    /// Open the store, loading any credential persisted by a previous run.
    ///
    /// A missing file means unauthenticated. An unreadable document is
    /// treated the same way and gets replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let current = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoredCredential>(&bytes) {
                Ok(stored) => stored.into_credential(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring malformed credential file");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        debug!(
            path = %path.display(),
            authenticated = current.is_some(),
            "Opened credential store"
        );

        Ok(Self {
            path,
            current: RwLock::new(current),
            io_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    async fn write(&self, credential: &Credential) -> Result<(), CredentialError> {
        let _io = self.io_lock.lock().await;

        let bytes = serde_json::to_vec_pretty(&StoredCredential::from(credential))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        *self.current.write() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        let _io = self.io_lock.lock().await;
        *self.current.write() = None;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
