//! Versioned local storage.
//!
//! All client state lives as JSON records in one directory, keyed by file
//! name. Writes go through a temp file and rename so a crash never leaves
//! a half-written record. The directory carries a schema version; any
//! mismatch drops the whole store rather than risk misreading records
//! written by another layout.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ClientError;

/// Storage schema version. Bumping it invalidates every existing store.
pub const STORE_VERSION: u32 = 1;

const VERSION_FILE: &str = "version";

/// A directory of JSON records with atomic writes.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open the store at `root`, creating it if needed.
    ///
    /// A store written under a different schema version is deleted and
    /// recreated empty.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let root = root.into();
        let version_path = root.join(VERSION_FILE);
        let stored: Option<u32> = match tokio::fs::read_to_string(&version_path).await {
            Ok(text) => text.trim().parse().ok(),
            Err(_) => None,
        };

        if stored != Some(STORE_VERSION) {
            if stored.is_some() {
                tracing::info!(
                    stored = ?stored,
                    current = STORE_VERSION,
                    "dropping local store after schema change"
                );
            }
            match tokio::fs::remove_dir_all(&root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tokio::fs::create_dir_all(&root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o700)).await?;
        }

        let store = Self { root };
        if stored != Some(STORE_VERSION) {
            store
                .write_atomic(VERSION_FILE, STORE_VERSION.to_string().as_bytes())
                .await?;
        }
        Ok(store)
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a record atomically.
    pub async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), ClientError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(name, &bytes).await
    }

    /// Read a record. Missing and malformed records both read as `None`;
    /// a record that cannot be parsed is worthless either way.
    pub async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ClientError> {
        let path = self.root.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(name, error = %e, "discarding malformed record");
                Ok(None)
            }
        }
    }

    /// Delete a record. Deleting a missing record is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), ClientError> {
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), ClientError> {
        let tmp = self.root.join(format!("{name}.tmp"));
        let path = self.root.join(name);
        tokio::fs::write(&tmp, bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
