//! Persistence interface and the YAML file-backed store.
//!
//! # Storage layout
//!
//! See [`crate::paths`]. Every record lives in its own YAML file (mode `0600`)
//! and is written with the `.tmp` sibling + `rename` pattern, so a reader never
//! observes a half-written record.
//!
//! # API pattern
//!
//! [`FileStore::open_at`] takes an explicit home and is what tests use with
//! `TempDir`; [`FileStore::open`] derives home from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, RecordKind, StoreError};
use crate::paths;
use crate::types::{
    Endpoint, EndpointId, EndpointRelation, PendingSync, RelationConfig, Stack, StackId,
};

// ---------------------------------------------------------------------------
// 1. Interface
// ---------------------------------------------------------------------------

/// Record-level persistence used by the update pipeline.
pub trait DataStore {
    fn stack(&self, id: StackId) -> Result<Stack, StoreError>;

    /// Read-modify-write a stack under the store's lock and return the
    /// committed record.
    fn update_stack_with<F>(&self, id: StackId, mutate: F) -> Result<Stack, StoreError>
    where
        F: FnOnce(&mut Stack);

    fn endpoint(&self, id: EndpointId) -> Result<Endpoint, StoreError>;

    fn endpoint_relation(&self, id: EndpointId) -> Result<EndpointRelation, StoreError>;

    /// Every relation record, ordered by endpoint id.
    fn endpoint_relations(&self) -> Result<Vec<EndpointRelation>, StoreError>;

    /// Compare-and-swap write: succeeds only if the stored revision still
    /// equals `relation.revision`. Returns the record as stored, with its
    /// revision bumped.
    fn update_endpoint_relation(
        &self,
        relation: &EndpointRelation,
    ) -> Result<EndpointRelation, StoreError>;

    /// Snapshot of endpoints, endpoint groups and edge groups.
    fn relation_config(&self) -> Result<RelationConfig, StoreError>;

    fn pending_sync(&self, stack: StackId) -> Result<Option<PendingSync>, StoreError>;

    fn save_pending_sync(&self, pending: &PendingSync) -> Result<(), StoreError>;

    fn clear_pending_sync(&self, stack: StackId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// 2. File store
// ---------------------------------------------------------------------------

/// [`DataStore`] backed by YAML files under `<home>/.fleetstack/`.
#[derive(Debug)]
pub struct FileStore {
    home: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store rooted at `home`, creating record directories (mode
    /// `0700`) if they do not yet exist.
    pub fn open_at(home: &Path) -> Result<FileStore, StoreError> {
        for dir in [
            paths::fleetstack_root(home),
            paths::stacks_dir(home),
            paths::relations_dir(home),
            paths::journal_dir(home),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
                set_dir_permissions(&dir)?;
            }
        }
        Ok(FileStore {
            home: home.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<FileStore, StoreError> {
        FileStore::open_at(&home()?)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Insert or replace a stack record wholesale. Used by the creation flow
    /// and fixtures; updates go through [`DataStore::update_stack_with`].
    pub fn save_stack(&self, stack: &Stack) -> Result<(), StoreError> {
        let _guard = self.guard();
        write_record(&paths::stack_path(&self.home, stack.id), stack)
    }

    /// All stacks, ordered by id.
    pub fn list_stacks(&self) -> Result<Vec<Stack>, StoreError> {
        let mut stacks: Vec<Stack> = list_records(&paths::stacks_dir(&self.home))?;
        stacks.sort_by_key(|s| s.id);
        Ok(stacks)
    }

    /// Replace the fleet snapshot (endpoints and groups).
    pub fn save_fleet(&self, config: &RelationConfig) -> Result<(), StoreError> {
        let _guard = self.guard();
        write_record(&paths::fleet_path(&self.home), config)
    }

    /// Create an empty relation record for a newly registered endpoint.
    ///
    /// Idempotent: an existing record is returned unchanged.
    pub fn register_endpoint(&self, id: EndpointId) -> Result<EndpointRelation, StoreError> {
        let _guard = self.guard();
        let path = paths::relation_path(&self.home, id);
        if let Some(existing) = read_record(&path)? {
            return Ok(existing);
        }
        let relation = EndpointRelation::new(id);
        write_record(&path, &relation)?;
        Ok(relation)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DataStore for FileStore {
    fn stack(&self, id: StackId) -> Result<Stack, StoreError> {
        read_record(&paths::stack_path(&self.home, id))?
            .ok_or_else(|| StoreError::not_found(RecordKind::Stack, id))
    }

    fn update_stack_with<F>(&self, id: StackId, mutate: F) -> Result<Stack, StoreError>
    where
        F: FnOnce(&mut Stack),
    {
        let _guard = self.guard();
        let path = paths::stack_path(&self.home, id);
        let mut stack: Stack =
            read_record(&path)?.ok_or_else(|| StoreError::not_found(RecordKind::Stack, id))?;
        mutate(&mut stack);
        stack.id = id;
        write_record(&path, &stack)?;
        Ok(stack)
    }

    fn endpoint(&self, id: EndpointId) -> Result<Endpoint, StoreError> {
        self.relation_config()?
            .endpoints
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::not_found(RecordKind::Endpoint, id))
    }

    fn endpoint_relation(&self, id: EndpointId) -> Result<EndpointRelation, StoreError> {
        read_record(&paths::relation_path(&self.home, id))?
            .ok_or_else(|| StoreError::not_found(RecordKind::EndpointRelation, id))
    }

    fn endpoint_relations(&self) -> Result<Vec<EndpointRelation>, StoreError> {
        let mut relations: Vec<EndpointRelation> =
            list_records(&paths::relations_dir(&self.home))?;
        relations.sort_by_key(|r| r.endpoint_id);
        Ok(relations)
    }

    fn update_endpoint_relation(
        &self,
        relation: &EndpointRelation,
    ) -> Result<EndpointRelation, StoreError> {
        let _guard = self.guard();
        let id = relation.endpoint_id;
        let path = paths::relation_path(&self.home, id);
        let current: EndpointRelation = read_record(&path)?
            .ok_or_else(|| StoreError::not_found(RecordKind::EndpointRelation, id))?;
        if current.revision != relation.revision {
            return Err(StoreError::RevisionConflict {
                endpoint: id,
                expected: relation.revision,
                found: current.revision,
            });
        }
        let mut stored = relation.clone();
        stored.revision = current.revision + 1;
        write_record(&path, &stored)?;
        Ok(stored)
    }

    fn relation_config(&self) -> Result<RelationConfig, StoreError> {
        Ok(read_record(&paths::fleet_path(&self.home))?.unwrap_or_default())
    }

    fn pending_sync(&self, stack: StackId) -> Result<Option<PendingSync>, StoreError> {
        read_record(&paths::journal_path(&self.home, stack))
    }

    fn save_pending_sync(&self, pending: &PendingSync) -> Result<(), StoreError> {
        let _guard = self.guard();
        write_record(&paths::journal_path(&self.home, pending.stack_id), pending)
    }

    fn clear_pending_sync(&self, stack: StackId) -> Result<(), StoreError> {
        let _guard = self.guard();
        let path = paths::journal_path(&self.home, stack);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

/// Load a YAML record; `Ok(None)` when the file does not exist.
fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Load every `*.yaml` record in `dir`; a missing directory yields no records.
fn list_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".yaml"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(record) = read_record(&entry.path())? {
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
