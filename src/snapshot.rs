//! Snapshot store - immutable, rollback-capable configuration generations
//!
//! A thin bookkeeping layer over a [`TransactionalStore`], the atomic
//! commit/rollback primitive (ostree on a real host, a rename-based
//! directory store here). Commit is all-or-nothing: the candidate is staged
//! beside the generations, handed to the store, and only then does the
//! `current` pointer swap. Any failure leaves the prior snapshot intact and
//! cleans the candidate up. Snapshots are never mutated, only superseded.

use crate::engine::generation::GenerationState;
use crate::model::ConfigurationModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const GENERATIONS_DIR: &str = "generations";
const CURRENT_POINTER: &str = "current";
const MODEL_FILE: &str = "model.json";
const METADATA_FILE: &str = "metadata.json";

/// Snapshot-store failure; the prior snapshot is always left intact
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("could not stage snapshot candidate: {0}")]
    Stage(#[source] io::Error),

    #[error("snapshot store rejected the candidate: {0}")]
    Store(String),

    #[error("could not update current pointer: {0}")]
    Pointer(#[source] io::Error),

    #[error("snapshot `{0}` not found")]
    NotFound(String),

    #[error("corrupt snapshot record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("snapshot store I/O: {0}")]
    Io(#[from] io::Error),
}

/// Which changes a generation applied live and which it deferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub state: GenerationState,
    pub live_applied: Vec<String>,
    pub deferred: Vec<String>,
    /// Relative paths of the artifacts generated for this model
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationMetadata {
    pub fn new(state: GenerationState, live_applied: Vec<String>, deferred: Vec<String>) -> Self {
        Self {
            state,
            live_applied,
            deferred,
            artifacts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// One committed configuration generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub model: ConfigurationModel,
    pub metadata: GenerationMetadata,
    pub parent_id: Option<String>,
}

/// Outcome of a rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreResult {
    pub restored: String,
    pub previous: Option<String>,
}

/// The atomic commit/rollback primitive (external collaborator)
pub trait TransactionalStore: Send + Sync {
    /// Promote a staged candidate directory to generation `id`, atomically
    fn commit(&self, staged: &Path, id: &str) -> Result<(), CommitError>;

    /// Make generation `id` restorable as the current deployment
    fn restore(&self, id: &str) -> Result<(), CommitError>;
}

/// Rename-based store: promotion is a single directory rename
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl TransactionalStore for DirStore {
    fn commit(&self, staged: &Path, id: &str) -> Result<(), CommitError> {
        let target = self.root.join(id);
        fs::rename(staged, &target).map_err(|err| CommitError::Store(err.to_string()))
    }

    fn restore(&self, id: &str) -> Result<(), CommitError> {
        if self.root.join(id).is_dir() {
            Ok(())
        } else {
            Err(CommitError::NotFound(id.to_string()))
        }
    }
}

/// Bookkeeping over the generations directory and the current pointer
pub struct SnapshotStore {
    root: PathBuf,
    store: Box<dyn TransactionalStore>,
}

impl SnapshotStore {
    /// Open (and create) the store at `root` with the rename-based backend
    pub fn open(root: &Path) -> Result<Self, CommitError> {
        let generations = root.join(GENERATIONS_DIR);
        fs::create_dir_all(&generations)?;
        Ok(Self {
            root: root.to_path_buf(),
            store: Box::new(DirStore::new(generations)),
        })
    }

    /// Open with a custom transactional backend
    pub fn with_store(root: &Path, store: Box<dyn TransactionalStore>) -> Result<Self, CommitError> {
        fs::create_dir_all(root.join(GENERATIONS_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            store,
        })
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(CURRENT_POINTER)
    }

    /// Commit a new generation; returns its id
    pub fn commit(
        &self,
        model: &ConfigurationModel,
        metadata: GenerationMetadata,
    ) -> Result<String, CommitError> {
        let rendered_model = serde_json::to_string_pretty(model)?;
        let digest = blake3::hash(rendered_model.as_bytes());
        let id = format!("gen-{:04}-{}", self.next_sequence()?, &digest.to_hex()[..8]);

        let snapshot = Snapshot {
            id: id.clone(),
            model: model.clone(),
            metadata,
            parent_id: self.current_id()?,
        };

        // Stage the full candidate before the store sees it
        let staged = self.generations_dir().join(format!(".candidate-{id}"));
        let stage = || -> Result<(), io::Error> {
            fs::create_dir_all(&staged)?;
            fs::write(staged.join(MODEL_FILE), &rendered_model)?;
            fs::write(
                staged.join(METADATA_FILE),
                serde_json::to_string_pretty(&snapshot)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?,
            )?;
            Ok(())
        };
        if let Err(err) = stage() {
            let _ = fs::remove_dir_all(&staged);
            return Err(CommitError::Stage(err));
        }

        if let Err(err) = self.store.commit(&staged, &id) {
            let _ = fs::remove_dir_all(&staged);
            return Err(err);
        }

        if let Err(err) = self.write_pointer(&id) {
            // The pointer still names the prior generation; drop the orphan
            let _ = fs::remove_dir_all(self.generations_dir().join(&id));
            return Err(err);
        }

        log::info!("committed snapshot {id}");
        Ok(id)
    }

    /// Restore a prior generation through the transactional store
    pub fn rollback(&self, id: &str) -> Result<RestoreResult, CommitError> {
        let snapshot = self.get(id)?;
        self.store.restore(&snapshot.id)?;

        let previous = self.current_id()?;
        self.write_pointer(&snapshot.id)?;

        log::info!("rolled back to snapshot {id}");
        Ok(RestoreResult {
            restored: snapshot.id,
            previous,
        })
    }

    /// All committed generations, oldest first
    pub fn list(&self) -> Result<Vec<Snapshot>, CommitError> {
        let mut ids: Vec<String> = Vec::new();
        for dir_entry in fs::read_dir(self.generations_dir())? {
            let name = dir_entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with("gen-") {
                ids.push(name);
            }
        }
        ids.sort();

        ids.iter().map(|id| self.get(id)).collect()
    }

    pub fn get(&self, id: &str) -> Result<Snapshot, CommitError> {
        let path = self.generations_dir().join(id).join(METADATA_FILE);
        if !path.is_file() {
            return Err(CommitError::NotFound(id.to_string()));
        }
        let snapshot = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(snapshot)
    }

    pub fn current_id(&self) -> Result<Option<String>, CommitError> {
        match fs::read_to_string(self.pointer_path()) {
            Ok(id) => Ok(Some(id.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CommitError::Io(err)),
        }
    }

    pub fn current(&self) -> Result<Option<Snapshot>, CommitError> {
        match self.current_id()? {
            Some(id) => Ok(Some(self.get(&id)?)),
            None => Ok(None),
        }
    }

    fn next_sequence(&self) -> Result<u32, CommitError> {
        let mut max = 0;
        for dir_entry in fs::read_dir(self.generations_dir())? {
            let name = dir_entry?.file_name().to_string_lossy().into_owned();
            if let Some(sequence) = name
                .strip_prefix("gen-")
                .and_then(|rest| rest.split('-').next())
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                max = max.max(sequence);
            }
        }
        Ok(max + 1)
    }

    /// Swap the pointer through a staged file so readers never see a torn write
    fn write_pointer(&self, id: &str) -> Result<(), CommitError> {
        let staged = self.root.join(".current.tmp");
        fs::write(&staged, id).map_err(CommitError::Pointer)?;
        fs::rename(&staged, self.pointer_path()).map_err(CommitError::Pointer)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn model(hostname: &str) -> ConfigurationModel {
        ConfigurationModel::from_toml_str(&format!("[identity]\nhostname = \"{hostname}\"\n"))
            .unwrap()
    }

    fn metadata() -> GenerationMetadata {
        GenerationMetadata::new(GenerationState::Committed, vec![], vec![])
    }

    #[test]
    fn test_commit_and_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let id = store.commit(&model("host"), metadata()).unwrap();
        assert!(id.starts_with("gen-0001-"));

        let current = store.current().unwrap().unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.model.identity.hostname, "host");
        assert_eq!(current.parent_id, None);
    }

    #[test]
    fn test_history_is_chronological_with_parent_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let first = store.commit(&model("one"), metadata()).unwrap();
        let second = store.commit(&model("two"), metadata()).unwrap();

        let history = store.list().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first);
        assert_eq!(history[1].id, second);
        assert_eq!(history[1].parent_id.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_rollback_restores_prior_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let first = store.commit(&model("one"), metadata()).unwrap();
        let second = store.commit(&model("two"), metadata()).unwrap();

        let result = store.rollback(&first).unwrap();
        assert_eq!(result.restored, first);
        assert_eq!(result.previous.as_deref(), Some(second.as_str()));

        let current = store.current().unwrap().unwrap();
        assert_eq!(current.model, model("one"));
        // History is append-only; nothing was deleted
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_rollback_to_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.commit(&model("one"), metadata()).unwrap();

        let result = store.rollback("gen-9999-deadbeef");
        assert!(matches!(result, Err(CommitError::NotFound(_))));
    }

    /// A store whose commit primitive always fails
    struct BrokenStore;

    impl TransactionalStore for BrokenStore {
        fn commit(&self, _staged: &Path, _id: &str) -> Result<(), CommitError> {
            Err(CommitError::Store("disk full".to_string()))
        }

        fn restore(&self, _id: &str) -> Result<(), CommitError> {
            Err(CommitError::Store("disk full".to_string()))
        }
    }

    #[test]
    fn test_failed_commit_leaves_prior_snapshot_intact() {
        let dir = tempfile::tempdir().unwrap();

        let good = SnapshotStore::open(dir.path()).unwrap();
        let first = good.commit(&model("one"), metadata()).unwrap();

        let broken = SnapshotStore::with_store(dir.path(), Box::new(BrokenStore)).unwrap();
        let result = broken.commit(&model("two"), metadata());
        assert!(matches!(result, Err(CommitError::Store(_))));

        // Prior snapshot untouched, candidate cleaned up
        let current = good.current().unwrap().unwrap();
        assert_eq!(current.id, first);
        assert_eq!(good.list().unwrap().len(), 1);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join(GENERATIONS_DIR))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".candidate"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
