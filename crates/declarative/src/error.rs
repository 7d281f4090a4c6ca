//! Error types for the reconciliation core

use thiserror::Error;

/// Errors from applying a single change on the host
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Command ran past its explicit timeout; treated as a normal failure
    #[error("command `{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// Command exited non-zero
    #[error("command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Command could not be spawned at all
    #[error("could not spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A shared resource (package database, service manager) was locked
    #[error("resource busy: {0}")]
    Busy(String),

    /// An automation action referenced a secret the store does not hold
    #[error("secret `{0}` not found")]
    MissingSecret(String),

    /// The change entry referenced an entity missing from both models
    #[error("no entity for change `{0}`")]
    UnknownEntity(String),

    #[error("{0}")]
    Other(String),
}

/// Transient failures are retried with backoff; persistent ones are not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Persistent,
}

impl ExecutionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Busy(_) => FailureKind::Transient,
            Self::CommandFailed { stderr, .. } if looks_transient(stderr) => {
                FailureKind::Transient
            }
            _ => FailureKind::Persistent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.failure_kind() == FailureKind::Transient
    }
}

/// Lock contention and network hiccups surface as command stderr, not as
/// structured exit codes, so the classification is textual.
fn looks_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    ["lock", "temporarily unavailable", "timed out", "connection", "network"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Errors from loading a classification policy file
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("domain `{0}` listed as both live and reboot")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = ExecutionError::Timeout {
            command: "dnf install htop".into(),
            timeout_secs: 30,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_lock_contention_is_transient() {
        let err = ExecutionError::CommandFailed {
            command: "dnf install htop".into(),
            stderr: "waiting for process with pid 4223 holding the RPM lock".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::Transient);
    }

    #[test]
    fn test_plain_failure_is_persistent() {
        let err = ExecutionError::CommandFailed {
            command: "useradd alice".into(),
            stderr: "useradd: UID 1000 is not unique".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::Persistent);
    }

    #[test]
    fn test_missing_secret_is_persistent() {
        assert_eq!(
            ExecutionError::MissingSecret("deploy_token".into()).failure_kind(),
            FailureKind::Persistent
        );
    }
}
