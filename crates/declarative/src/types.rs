//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

/// Configuration domain a change belongs to
///
/// Domains are the granularity of classification and of apply ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Identity,
    Repositories,
    Packages,
    Users,
    Services,
    Network,
    Security,
    Storage,
    Desktop,
    Boot,
    Automation,
}

impl Domain {
    /// Every domain, in declaration order
    pub const ALL: [Self; 11] = [
        Self::Identity,
        Self::Repositories,
        Self::Packages,
        Self::Users,
        Self::Services,
        Self::Network,
        Self::Security,
        Self::Storage,
        Self::Desktop,
        Self::Boot,
        Self::Automation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Repositories => "repositories",
            Self::Packages => "packages",
            Self::Users => "users",
            Self::Services => "services",
            Self::Network => "network",
            Self::Security => "security",
            Self::Storage => "storage",
            Self::Desktop => "desktop",
            Self::Boot => "boot",
            Self::Automation => "automation",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a change can be enacted on a running host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Safe to apply without a restart
    LiveApplicable,
    /// Only takes effect after a restart; never attempted live
    RequiresReboot,
}

/// The shape of a single difference between two models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One keyed difference between the old and the new model
///
/// Entities are matched by stable identity (package name, service name,
/// mount point), never by position. `old`/`new` carry rendered values for
/// reporting; the apply layer looks the typed entities up in the models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub domain: Domain,
    pub key: String,
    pub kind: ChangeKind,
    pub old: Option<String>,
    pub new: Option<String>,
    pub classification: Classification,
    /// A failing critical change rolls the whole batch back
    pub critical: bool,
}

impl ChangeEntry {
    /// Stable identifier, e.g. `packages/htop`
    pub fn id(&self) -> String {
        format!("{}/{}", self.domain, self.key)
    }

    pub fn is_live(&self) -> bool {
        self.classification == Classification::LiveApplicable
    }
}

/// All differences between two models, in diff order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn push(&mut self, entry: ChangeEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries safe to apply on the running host
    pub fn live(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(|e| e.is_live())
    }

    /// Entries that must wait for a restart
    pub fn deferred(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(|e| !e.is_live())
    }

    pub fn for_domain(&self, domain: Domain) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(move |e| e.domain == domain)
    }
}

/// Result of applying a single change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Change was applied on the host
    Applied,
    /// Pre-check found the host already converged
    NoChange,
    /// Reboot-required, recorded without being attempted
    Deferred,
    /// Apply failed; the item was restored to its last-known-good state
    RolledBack { error: String },
    /// Apply failed and the rollback failed too
    Failed { error: String },
    /// Not attempted (dry run, or an aborted batch)
    Skipped { reason: String },
}

/// A change that failed during apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChange {
    pub id: String,
    pub error: String,
    /// Whether the single-item rollback restored last-known-good state
    pub rolled_back: bool,
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub applied: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedChange>,
    pub deferred: Vec<String>,
    pub skipped: Vec<String>,
    /// Applied entries that were undone by a critical batch rollback
    pub rolled_back: Vec<String>,
    /// A critical change failed and the batch was abandoned
    pub aborted: bool,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }

    pub fn total(&self) -> usize {
        self.applied.len()
            + self.unchanged.len()
            + self.failed.len()
            + self.deferred.len()
            + self.skipped.len()
            + self.rolled_back.len()
    }

    pub(crate) fn record(&mut self, id: String, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied.push(id),
            ApplyOutcome::NoChange => self.unchanged.push(id),
            ApplyOutcome::Deferred => self.deferred.push(id),
            ApplyOutcome::RolledBack { error } => self.failed.push(FailedChange {
                id,
                error: error.clone(),
                rolled_back: true,
            }),
            ApplyOutcome::Failed { error } => self.failed.push(FailedChange {
                id,
                error: error.clone(),
                rolled_back: false,
            }),
            ApplyOutcome::Skipped { .. } => self.skipped.push(id),
        }
    }
}

/// Options for the apply engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Don't make changes, just report what would happen
    pub dry_run: bool,
    /// Bounded parallelism within one apply stage
    pub jobs: usize,
    /// Upper bound on time spent retrying one transient failure
    pub retry_max_elapsed_secs: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            retry_max_elapsed_secs: 10,
        }
    }
}

/// Output from a host command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: Domain, key: &str, classification: Classification) -> ChangeEntry {
        ChangeEntry {
            domain,
            key: key.to_string(),
            kind: ChangeKind::Added,
            old: None,
            new: Some("x".to_string()),
            classification,
            critical: false,
        }
    }

    #[test]
    fn test_change_entry_id() {
        let e = entry(Domain::Packages, "htop", Classification::LiveApplicable);
        assert_eq!(e.id(), "packages/htop");
    }

    #[test]
    fn test_change_set_partitions() {
        let mut set = ChangeSet::default();
        set.push(entry(Domain::Packages, "htop", Classification::LiveApplicable));
        set.push(entry(Domain::Boot, "kernel_params", Classification::RequiresReboot));

        assert_eq!(set.live().count(), 1);
        assert_eq!(set.deferred().count(), 1);
        assert_eq!(set.for_domain(Domain::Packages).count(), 1);
    }

    #[test]
    fn test_execution_result_record() {
        let mut result = ExecutionResult::default();
        result.record("packages/htop".into(), &ApplyOutcome::Applied);
        result.record(
            "services/sshd".into(),
            &ApplyOutcome::RolledBack {
                error: "boom".into(),
            },
        );

        assert_eq!(result.applied, vec!["packages/htop"]);
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].rolled_back);
        assert!(!result.is_success());
    }

    #[test]
    fn test_domain_display_names() {
        assert_eq!(Domain::Repositories.to_string(), "repositories");
        assert_eq!(Domain::ALL.len(), 11);
    }
}
