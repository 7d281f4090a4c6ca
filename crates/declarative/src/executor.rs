//! Apply engine - staged ordering, bounded parallelism, per-item rollback
//!
//! Stages are strict barriers: every entry of a stage finishes before the
//! next stage starts. Within a stage, entries run in a bounded rayon pool.
//! Reboot-required entries are recorded as deferred without ever being
//! attempted.

use crate::error::ExecutionError;
use crate::types::{
    ApplyOutcome, ChangeEntry, ChangeSet, Domain, EngineOptions, ExecutionResult, FailedChange,
};
use backoff::ExponentialBackoff;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Something that can pre-check, apply, and roll back one change
///
/// Implementations look the typed entities up in the old/new models and
/// drive the host's managers through a [`crate::CommandRunner`].
pub trait ChangeHandler: Send + Sync {
    /// Whether the host still needs this change
    ///
    /// A pre-check error is not fatal; the change is applied anyway and
    /// judged by its own result.
    fn needs_apply(&self, entry: &ChangeEntry) -> Result<bool, ExecutionError> {
        let _ = entry;
        Ok(true)
    }

    /// Converge the host for this one change
    fn apply(&self, entry: &ChangeEntry) -> Result<(), ExecutionError>;

    /// Restore the item to its last-known-good state after a failed apply
    fn rollback(&self, entry: &ChangeEntry) -> Result<(), ExecutionError>;
}

/// Apply the live subset of a change set in dependency order
///
/// `stages` lists domains whose entries must be complete before the next
/// stage begins; domains sharing a stage run interleaved in the pool. Live
/// domains missing from `stages` are appended as trailing stages in
/// declaration order, so nothing is silently dropped.
pub fn apply_changes(
    changes: &ChangeSet,
    stages: &[Vec<Domain>],
    handler: &dyn ChangeHandler,
    opts: &EngineOptions,
    progress: &(dyn Fn(&ChangeEntry, &ApplyOutcome) + Sync),
) -> ExecutionResult {
    let mut result = ExecutionResult::default();

    for entry in changes.deferred() {
        progress(entry, &ApplyOutcome::Deferred);
        result.record(entry.id(), &ApplyOutcome::Deferred);
    }

    let batches = build_batches(changes, stages);

    let aborted = AtomicBool::new(false);
    let applied_log: Mutex<Vec<ChangeEntry>> = Mutex::new(Vec::new());

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
    {
        Ok(pool) => pool,
        Err(err) => {
            result.aborted = true;
            result.failed.push(FailedChange {
                id: "engine".to_string(),
                error: format!("could not create apply thread pool: {err}"),
                rolled_back: false,
            });
            return result;
        }
    };

    for (stage_index, batch) in batches.iter().enumerate() {
        let outcomes: Mutex<Vec<(ChangeEntry, ApplyOutcome)>> = Mutex::new(Vec::new());

        pool.install(|| {
            batch.par_iter().for_each(|entry| {
                let outcome = if aborted.load(Ordering::SeqCst) {
                    ApplyOutcome::Skipped {
                        reason: "batch aborted".to_string(),
                    }
                } else {
                    apply_one(handler, entry, opts)
                };

                if outcome == ApplyOutcome::Applied {
                    lock_unpoisoned(&applied_log).push((*entry).clone());
                }
                if entry.critical
                    && matches!(
                        outcome,
                        ApplyOutcome::Failed { .. } | ApplyOutcome::RolledBack { .. }
                    )
                {
                    log::error!("critical change {} failed, aborting batch", entry.id());
                    aborted.store(true, Ordering::SeqCst);
                }

                progress(entry, &outcome);
                lock_unpoisoned(&outcomes).push(((*entry).clone(), outcome));
            });
        });

        for (entry, outcome) in into_unpoisoned(outcomes) {
            result.record(entry.id(), &outcome);
        }

        if aborted.load(Ordering::SeqCst) {
            // Later stages never start; their entries are reported, not dropped
            let skipped = ApplyOutcome::Skipped {
                reason: "batch aborted".to_string(),
            };
            for later in &batches[stage_index + 1..] {
                for entry in later {
                    progress(entry, &skipped);
                    result.record(entry.id(), &skipped);
                }
            }
            break;
        }
    }

    if aborted.load(Ordering::SeqCst) {
        result.aborted = true;
        rollback_batch(handler, into_unpoisoned(applied_log), &mut result);
    }

    result
}

/// Group live entries into ordered batches
fn build_batches<'a>(changes: &'a ChangeSet, stages: &[Vec<Domain>]) -> Vec<Vec<&'a ChangeEntry>> {
    let covered: BTreeSet<Domain> = stages.iter().flatten().copied().collect();

    let mut plan: Vec<Vec<Domain>> = stages.to_vec();
    for domain in Domain::ALL {
        if !covered.contains(&domain) && changes.for_domain(domain).any(ChangeEntry::is_live) {
            plan.push(vec![domain]);
        }
    }

    plan.into_iter()
        .map(|domains| {
            changes
                .entries
                .iter()
                .filter(|e| e.is_live() && domains.contains(&e.domain))
                .collect::<Vec<_>>()
        })
        .filter(|batch| !batch.is_empty())
        .collect()
}

/// Pre-check, apply with transient retry, roll the single item back on failure
fn apply_one(handler: &dyn ChangeHandler, entry: &ChangeEntry, opts: &EngineOptions) -> ApplyOutcome {
    match handler.needs_apply(entry) {
        Ok(false) => return ApplyOutcome::NoChange,
        Ok(true) => {}
        Err(err) => log::debug!("pre-check for {} failed ({err}), applying anyway", entry.id()),
    }

    if opts.dry_run {
        return ApplyOutcome::Skipped {
            reason: "Dry run".to_string(),
        };
    }

    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(2),
        max_elapsed_time: Some(Duration::from_secs(opts.retry_max_elapsed_secs)),
        ..ExponentialBackoff::default()
    };

    let attempt = || {
        handler.apply(entry).map_err(|err| {
            if err.is_transient() {
                log::debug!("transient failure for {}: {err}", entry.id());
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })
    };

    match backoff::retry(policy, attempt) {
        Ok(()) => ApplyOutcome::Applied,
        Err(backoff_err) => {
            let err = match backoff_err {
                backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
            };
            let error = err.to_string();
            match handler.rollback(entry) {
                Ok(()) => ApplyOutcome::RolledBack { error },
                Err(rollback_err) => ApplyOutcome::Failed {
                    error: format!("{error}; rollback failed: {rollback_err}"),
                },
            }
        }
    }
}

/// Undo every applied entry of an aborted batch, most recent first
fn rollback_batch(
    handler: &dyn ChangeHandler,
    mut applied: Vec<ChangeEntry>,
    result: &mut ExecutionResult,
) {
    applied.reverse();
    for entry in applied {
        let id = entry.id();
        result.applied.retain(|a| a != &id);
        match handler.rollback(&entry) {
            Ok(()) => result.rolled_back.push(id),
            Err(err) => {
                log::error!("batch rollback of {id} failed: {err}");
                result.failed.push(FailedChange {
                    id,
                    error: format!("batch rollback failed: {err}"),
                    rolled_back: false,
                });
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn into_unpoisoned<T>(mutex: Mutex<T>) -> T {
    match mutex.into_inner() {
        Ok(value) => value,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, Classification};
    use std::sync::atomic::AtomicUsize;

    fn entry(domain: Domain, key: &str, live: bool, critical: bool) -> ChangeEntry {
        ChangeEntry {
            domain,
            key: key.to_string(),
            kind: ChangeKind::Added,
            old: None,
            new: Some("x".to_string()),
            classification: if live {
                Classification::LiveApplicable
            } else {
                Classification::RequiresReboot
            },
            critical,
        }
    }

    fn stages() -> Vec<Vec<Domain>> {
        vec![
            vec![Domain::Repositories],
            vec![Domain::Packages],
            vec![Domain::Users],
            vec![Domain::Services],
        ]
    }

    /// Handler that fails configured keys and records every call
    #[derive(Default)]
    struct ScriptedHandler {
        fail_keys: Vec<String>,
        transient_failures: AtomicUsize,
        applied: Mutex<Vec<String>>,
        rolled_back: Mutex<Vec<String>>,
    }

    impl ChangeHandler for ScriptedHandler {
        fn apply(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ExecutionError::Busy("rpm lock held".into()));
            }
            if self.fail_keys.contains(&entry.key) {
                return Err(ExecutionError::CommandFailed {
                    command: format!("apply {}", entry.key),
                    stderr: "no such entity".into(),
                });
            }
            lock_unpoisoned(&self.applied).push(entry.key.clone());
            Ok(())
        }

        fn rollback(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
            lock_unpoisoned(&self.rolled_back).push(entry.key.clone());
            Ok(())
        }
    }

    #[test]
    fn test_live_applied_and_reboot_deferred() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Packages, "htop", true, false));
        changes.push(entry(Domain::Desktop, "environment", false, false));

        let handler = ScriptedHandler::default();
        let result = apply_changes(
            &changes,
            &stages(),
            &handler,
            &EngineOptions::default(),
            &|_, _| {},
        );

        assert_eq!(result.applied, vec!["packages/htop"]);
        assert_eq!(result.deferred, vec!["desktop/environment"]);
        assert!(result.is_success());
        // The deferred change never reached the handler
        assert_eq!(lock_unpoisoned(&handler.applied).len(), 1);
    }

    #[test]
    fn test_persistent_failure_rolls_back_item_only() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Packages, "htop", true, false));
        changes.push(entry(Domain::Packages, "ghost", true, false));

        let handler = ScriptedHandler {
            fail_keys: vec!["ghost".into()],
            ..Default::default()
        };
        let result = apply_changes(
            &changes,
            &stages(),
            &handler,
            &EngineOptions::default(),
            &|_, _| {},
        );

        assert_eq!(result.applied, vec!["packages/htop"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, "packages/ghost");
        assert!(result.failed[0].rolled_back);
        assert!(!result.aborted);
        assert_eq!(*lock_unpoisoned(&handler.rolled_back), vec!["ghost".to_string()]);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Packages, "htop", true, false));

        let handler = ScriptedHandler {
            transient_failures: AtomicUsize::new(1),
            ..Default::default()
        };
        let opts = EngineOptions {
            jobs: 1,
            ..Default::default()
        };
        let result = apply_changes(&changes, &stages(), &handler, &opts, &|_, _| {});

        assert_eq!(result.applied, vec!["packages/htop"]);
        assert!(result.failed.is_empty());
    }

    #[test]
    fn test_critical_failure_rolls_back_batch() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Repositories, "updates", true, false));
        changes.push(entry(Domain::Packages, "ghost", true, true));
        changes.push(entry(Domain::Services, "sshd", true, false));

        let handler = ScriptedHandler {
            fail_keys: vec!["ghost".into()],
            ..Default::default()
        };
        let result = apply_changes(
            &changes,
            &stages(),
            &handler,
            &EngineOptions::default(),
            &|_, _| {},
        );

        assert!(result.aborted);
        assert!(result.applied.is_empty());
        assert_eq!(result.rolled_back, vec!["repositories/updates"]);
        // The later stage never ran
        assert_eq!(result.skipped, vec!["services/sshd"]);
        assert!(lock_unpoisoned(&handler.applied).iter().all(|k| k == "updates"));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Packages, "htop", true, false));

        let handler = ScriptedHandler::default();
        let opts = EngineOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = apply_changes(&changes, &stages(), &handler, &opts, &|_, _| {});

        assert_eq!(result.skipped, vec!["packages/htop"]);
        assert!(lock_unpoisoned(&handler.applied).is_empty());
    }

    #[test]
    fn test_uncovered_live_domain_gets_trailing_stage() {
        let mut changes = ChangeSet::default();
        changes.push(entry(Domain::Network, "dns", true, false));

        let handler = ScriptedHandler::default();
        let result = apply_changes(
            &changes,
            &stages(),
            &handler,
            &EngineOptions::default(),
            &|_, _| {},
        );

        assert_eq!(result.applied, vec!["network/dns"]);
    }
}
