//! ALFA Vault Engine - Secure Key Store
//!
//! The three-method contract the engine persists key material through, plus
//! an in-memory backend and a development file backend.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Key storage collaborator.
///
/// Platform keystores, TPMs and HSMs implement this. Failures surface as
/// [`VaultError::StorageUnavailable`] and are never retried by the engine.
pub trait SecureKeyStore: Send + Sync {
    /// Store `key` under `tag`; `true` if the tag was previously absent
    fn put(&self, tag: &str, key: &[u8]) -> VaultResult<bool>;

    /// Fetch the bytes under `tag`
    fn get(&self, tag: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>>;

    /// Remove `tag`; `true` if something was removed
    fn delete(&self, tag: &str) -> VaultResult<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMORY BACKEND
// ═══════════════════════════════════════════════════════════════════════════

/// Process-local store; entries are zeroized when replaced or removed
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn put(&self, tag: &str, key: &[u8]) -> VaultResult<bool> {
        let previous = self
            .entries
            .write()
            .insert(tag.to_string(), Zeroizing::new(key.to_vec()));
        Ok(previous.is_none())
    }

    fn get(&self, tag: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.entries.read().get(tag).cloned())
    }

    fn delete(&self, tag: &str) -> VaultResult<bool> {
        Ok(self.entries.write().remove(tag).is_some())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE BACKEND
// ═══════════════════════════════════════════════════════════════════════════

/// One file per tag under a root directory.
///
/// Development backend only: it offers no protection beyond filesystem
/// permissions. Writes go through a synced temp file and a rename; deletes
/// overwrite the file with zeros first.
pub struct FileKeyStore {
    root: PathBuf,
}

impl FileKeyStore {
    /// Create new FileKeyStore rooted at `root`
    pub fn new(root: &Path) -> VaultResult<Self> {
        fs::create_dir_all(root).map_err(storage_err)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tags may contain anything, so file names are hex
    fn path_for(&self, tag: &str) -> PathBuf {
        self.root.join(format!("{}.key", hex::encode(tag.as_bytes())))
    }

    fn wipe(path: &Path) -> std::io::Result<()> {
        let size = fs::metadata(path)?.len() as usize;
        if size > 0 {
            let mut file = OpenOptions::new().write(true).open(path)?;
            let zeros = vec![0u8; size.min(1024 * 1024)];
            let mut remaining = size;
            while remaining > 0 {
                let chunk = remaining.min(zeros.len());
                file.write_all(&zeros[..chunk])?;
                remaining -= chunk;
            }
            file.sync_all()?;
        }
        fs::remove_file(path)
    }
}

impl SecureKeyStore for FileKeyStore {
    fn put(&self, tag: &str, key: &[u8]) -> VaultResult<bool> {
        let path = self.path_for(tag);
        let fresh = !path.exists();
        let temp = path.with_extension("tmp");

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(key)?;
            file.sync_all()?;
            fs::rename(&temp, &path)
        };
        write().map_err(storage_err)?;

        tracing::debug!(file = %path.display(), "stored key material");
        Ok(fresh)
    }

    fn get(&self, tag: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        match fs::read(self.path_for(tag)) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn delete(&self, tag: &str) -> VaultResult<bool> {
        let path = self.path_for(tag);
        if !path.exists() {
            return Ok(false);
        }
        Self::wipe(&path).map_err(storage_err)?;
        Ok(true)
    }
}

fn storage_err(e: std::io::Error) -> VaultError {
    VaultError::StorageUnavailable(e.to_string())
}
