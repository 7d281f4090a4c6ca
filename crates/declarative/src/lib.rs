//! # Declarative
//!
//! The reconciliation core for declarative host configuration.
//!
//! This crate provides the abstractions for turning the difference between
//! two configuration models into a classified change set, and for applying
//! the live-safe subset of that change set to a running host.
//!
//! ## Core Concepts
//!
//! - **ChangeSet**: keyed, per-domain differences between an old and a new
//!   model, each entry classified live-applicable or reboot-required
//! - **PolicyTable**: the single source of truth for classification,
//!   inspectable and overridable from a policy file
//! - **ChangeHandler**: something that can pre-check, apply, and roll back
//!   one change on the host
//! - **apply_changes**: staged executor with bounded parallelism, transient
//!   retry, per-item rollback, and critical batch rollback
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     apply_changes, ChangeEntry, ChangeHandler, ChangeSet, EngineOptions,
//!     ExecutionError, PolicyTable,
//! };
//!
//! struct LogHandler;
//!
//! impl ChangeHandler for LogHandler {
//!     fn apply(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
//!         println!("applying {}", entry.id());
//!         Ok(())
//!     }
//!
//!     fn rollback(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
//!         println!("rolling back {}", entry.id());
//!         Ok(())
//!     }
//! }
//!
//! let changes = ChangeSet::default();
//! let result = apply_changes(&changes, &[], &LogHandler, &EngineOptions::default(), &|_, _| {});
//! assert!(result.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! External collaborators are reached through traits so the crate stays free
//! of process-spawning and secret-handling code:
//!
//! - [`CommandRunner`]: synchronous subprocess invocation with an explicit
//!   timeout
//! - [`SecretSource`]: credential lookups for automation actions

pub mod context;
pub mod error;
pub mod executor;
pub mod policy;
pub mod types;

// Re-export main types at crate root
pub use context::{CommandRunner, SecretSource, StaticSecrets};
pub use error::{ExecutionError, FailureKind, PolicyError};
pub use executor::{apply_changes, ChangeHandler};
pub use policy::PolicyTable;
pub use types::{
    ApplyOutcome, ChangeEntry, ChangeKind, ChangeSet, Classification, CommandOutput, Domain,
    EngineOptions, ExecutionResult, FailedChange,
};
