//! Host-level reconciliation lease
//!
//! Exactly one diff+apply+commit may be in flight per host. The lease is an
//! exclusively-locked file; a second apply attempt fails fast instead of
//! interleaving.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LEASE_FILE: &str = "apply.lease";

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("another reconciliation is already in flight (lease held at {})", .0.display())]
    Held(PathBuf),

    #[error("could not acquire reconciliation lease: {0}")]
    Io(#[from] io::Error),
}

/// Held for the duration of one reconciliation; released on drop
pub struct ApplyLease {
    file: File,
    path: PathBuf,
}

impl ApplyLease {
    /// Acquire the lease under `state_dir`, failing if it is already held
    pub fn acquire(state_dir: &Path) -> Result<Self, LeaseError> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(LEASE_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::debug!("acquired apply lease at {}", path.display());
                Ok(Self { file, path })
            }
            Err(err)
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(LeaseError::Held(path))
            }
            Err(err) => Err(LeaseError::Io(err)),
        }
    }
}

impl Drop for ApplyLease {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(&self.file) {
            log::warn!("could not release apply lease at {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();

        let lease = ApplyLease::acquire(dir.path()).unwrap();
        let second = ApplyLease::acquire(dir.path());
        assert!(matches!(second, Err(LeaseError::Held(_))));

        drop(lease);
        ApplyLease::acquire(dir.path()).unwrap();
    }
}
