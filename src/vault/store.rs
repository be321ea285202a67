//! Secure key/value storage backends

use crate::error::SessionError;
use crate::utils::crypto::{decrypt_data, derive_encryption_key, encrypt_data, ENCRYPTION_KEY_SIZE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Confidential key/value capability the credential vault is built on
///
/// Each call is atomic on its own; multi-key atomicity is the vault's job.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value, `None` if the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Remove a value; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// Process-local store; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// On-disk document; every value is sealed individually
#[derive(Serialize, Deserialize, Default)]
struct StoreDocument {
    version: u32,
    entries: BTreeMap<String, String>,
}

const DOCUMENT_VERSION: u32 = 1;

/// Encrypted single-file store
///
/// Values are sealed with AES-256-GCM under a key derived from the
/// configured secret. The file is replaced atomically (temp file + rename)
/// and is readable by its owner only.
pub struct FileStore {
    path: PathBuf,
    key: [u8; ENCRYPTION_KEY_SIZE],
    io_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, secret: &str) -> Self {
        Self {
            path: path.into(),
            key: derive_encryption_key(secret.as_bytes()),
            io_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument, SessionError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => return Err(storage_error("read", &self.path, &e)),
        };

        let document: StoreDocument = serde_json::from_str(&contents)
            .map_err(|e| storage_error("parse", &self.path, &e))?;
        if document.version != DOCUMENT_VERSION {
            return Err(SessionError::Storage(format!(
                "unsupported vault version {} in {}",
                document.version,
                self.path.display()
            )));
        }
        Ok(document)
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create directory for", &self.path, &e))?;
        }

        let contents = serde_json::to_vec(document)
            .map_err(|e| storage_error("serialize", &self.path, &e))?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents)
            .await
            .map_err(|e| storage_error("write", &temp_path, &e))?;
        restrict_permissions(&temp_path).await?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| storage_error("replace", &self.path, &e))
    }
}

#[async_trait]
impl SecureStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.io_lock.lock().await;
        let document = self.read_document().await?;

        document
            .entries
            .get(key)
            .map(|sealed| {
                decrypt_data::<String>(sealed, &self.key).map_err(|e| {
                    SessionError::Storage(format!("cannot unseal '{key}': {e}"))
                })
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read_document().await?;

        let sealed = encrypt_data(&value, &self.key)
            .map_err(|e| SessionError::Storage(format!("cannot seal '{key}': {e}")))?;
        document.version = DOCUMENT_VERSION;
        document.entries.insert(key.to_string(), sealed);
        self.write_document(&document).await
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read_document().await?;

        if document.entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_document(&document).await
    }
}

fn storage_error(action: &str, path: &Path, err: &dyn std::fmt::Display) -> SessionError {
    SessionError::Storage(format!("cannot {action} {}: {err}", path.display()))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), SessionError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| storage_error("restrict permissions on", path, &e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), SessionError> {
    Ok(())
}
