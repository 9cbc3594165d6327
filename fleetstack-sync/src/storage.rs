//! Artifact storage: the [`FileStorage`] interface and a local-directory
//! implementation.
//!
//! ## `LocalStorage::store_file` — write protocol
//!
//! 1. Reject names that would escape the stack folder.
//! 2. SHA-256 hash the new content.
//! 3. Hash the file already on disk, if any → skip if identical.
//! 4. Write to `<path>.fleetstack.tmp`.
//! 5. Rename to final path (atomic on POSIX).

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, StorageError};

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped — content matches what is already on disk.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Where stack artifacts live. Folders are keyed by stack id.
pub trait FileStorage {
    /// Directory holding `folder`'s files.
    fn folder_path(&self, folder: &str) -> PathBuf;

    fn store_file(
        &self,
        folder: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<WriteResult, StorageError>;

    fn read_file(&self, folder: &str, file_name: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove a directory and everything below it. A missing directory is
    /// not an error.
    fn remove_directory(&self, path: &Path) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Local storage
// ---------------------------------------------------------------------------

/// [`FileStorage`] rooted at a local directory, normally
/// `~/.fleetstack/edge_stacks`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_path(&self, folder: &str, file_name: &str) -> Result<PathBuf, StorageError> {
        check_name(folder)?;
        check_name(file_name)?;
        Ok(self.root.join(folder).join(file_name))
    }
}

impl FileStorage for LocalStorage {
    fn folder_path(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    fn store_file(
        &self,
        folder: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<WriteResult, StorageError> {
        let path = self.file_path(folder, file_name)?;
        let tmp = PathBuf::from(format!("{}.fleetstack.tmp", path.display()));
        atomic_write_with_tmp(&path, content, &tmp)
    }

    fn read_file(&self, folder: &str, file_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.file_path(folder, file_name)?;
        std::fs::read(&path).map_err(|e| io_err(path, e))
    }

    fn remove_directory(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed artifact directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        }
    }
}

/// Names must be a single relative component (sub-directories allowed, no
/// `..`, no absolute paths).
fn check_name(name: &str) -> Result<(), StorageError> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

fn digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &[u8],
    tmp: &Path,
) -> Result<WriteResult, StorageError> {
    let new_digest = digest(content);
    match std::fs::read(path) {
        Ok(existing) if digest(&existing) == new_digest => {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(path, e)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
