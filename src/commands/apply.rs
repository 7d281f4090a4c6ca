//! `hostforge apply` - diff, apply the live subset, commit a snapshot
//!
//! The whole command runs under the host apply lease. Reboot-required
//! changes are listed as deferred; they take effect when the host next
//! boots into the committed generation.

use crate::cli::ApplyArgs;
use crate::engine::generation::GenerationState;
use crate::engine::{self, LiveChangeHandler};
use crate::generate::{self, GenerateOptions};
use crate::lease::ApplyLease;
use crate::model::ConfigurationModel;
use crate::progress;
use crate::runner::HostRunner;
use crate::secret::EnvSecretStore;
use crate::snapshot::{GenerationMetadata, SnapshotStore};
use crate::ui;
use crate::Context;
use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{
    apply_changes, ApplyOutcome, ChangeSet, CommandRunner, EngineOptions, ExecutionResult,
    SecretSource,
};
use std::time::Duration;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    ui::header("Applying configuration");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let mut lifecycle = GenerationState::Draft;
    let new = super::load_validated_model(&args.config, ctx.quiet)?;
    lifecycle = lifecycle.advance(GenerationState::Validated)?;

    let state_dir = super::state_dir(args.state_dir.as_deref())?;
    let _lease = ApplyLease::acquire(&state_dir)?;

    let store = SnapshotStore::open(&state_dir.join("snapshots"))
        .context("could not open snapshot store")?;
    let old = match store.current().context("could not read current snapshot")? {
        Some(snapshot) => snapshot.model,
        None => ConfigurationModel::empty(),
    };

    let policy = super::load_policy(args.policy.as_deref())?;
    let changes = engine::diff(&old, &new, &policy);

    super::diff::display_changes(&changes);
    if changes.is_empty() {
        return Ok(());
    }

    if !args.yes && !args.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    // The artifact record travels with the snapshot
    let artifacts = generate::generate(&new, &GenerateOptions::default())
        .context("generation failed")?;
    lifecycle = lifecycle.advance(GenerationState::Generated)?;

    let runner = HostRunner;
    let secrets = match &args.secrets {
        Some(path) => EnvSecretStore::with_file(path),
        None => EnvSecretStore::new(),
    };

    let opts = EngineOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        ..Default::default()
    };
    let result = reconcile(
        &old,
        &new,
        &changes,
        &runner,
        &secrets,
        &opts,
        Duration::from_secs(args.timeout_secs),
    );
    print_summary(&result);
    if ctx.verbose > 0 {
        for change in &result.applied {
            ui::dim(change);
        }
    }

    if args.dry_run {
        return Ok(());
    }

    let applied_state = if result.deferred.is_empty() && result.failed.is_empty() {
        GenerationState::AppliedFull
    } else {
        GenerationState::AppliedPartial
    };
    lifecycle = lifecycle.advance(applied_state)?;

    if result.aborted {
        bail!("a critical change failed; batch rolled back, nothing committed");
    }

    let metadata = GenerationMetadata::new(
        lifecycle.advance(GenerationState::Committed)?,
        result.applied.clone(),
        result.deferred.clone(),
    )
    .with_artifacts(
        artifacts
            .files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect(),
    );

    let id = store
        .commit(&new, metadata)
        .context("commit failed; the prior snapshot is still current")?;
    ui::success(&format!("Committed snapshot {id}"));

    if !result.deferred.is_empty() {
        ui::warn(&format!(
            "{} change(s) deferred; they take effect after a reboot",
            result.deferred.len()
        ));
        if !ctx.quiet {
            for change in &result.deferred {
                ui::dim(change);
            }
        }
    }

    Ok(())
}

/// Diff-driven reconcile, separated from the CLI for testability
pub(crate) fn reconcile(
    old: &ConfigurationModel,
    new: &ConfigurationModel,
    changes: &ChangeSet,
    runner: &dyn CommandRunner,
    secrets: &dyn SecretSource,
    opts: &EngineOptions,
    timeout: Duration,
) -> ExecutionResult {
    let handler = LiveChangeHandler::new(old, new, runner, secrets).with_timeout(timeout);
    let bar = progress::apply_bar(changes.live().count() as u64, "Applying");

    let on_progress = |entry: &declarative::ChangeEntry, outcome: &ApplyOutcome| {
        if !matches!(outcome, ApplyOutcome::Deferred) {
            bar.set_message(entry.id());
            bar.inc(1);
        }
    };
    let result = apply_changes(changes, &engine::apply_stages(), &handler, opts, &on_progress);

    bar.finish_and_clear();
    result
}

fn print_summary(result: &ExecutionResult) {
    println!();
    if result.is_success() {
        ui::success("Reconciliation complete");
    } else {
        ui::warn("Reconciliation finished with failures");
    }

    if !result.applied.is_empty() {
        println!("    • {} applied", result.applied.len());
    }
    if !result.unchanged.is_empty() {
        println!("    • {} already converged", result.unchanged.len());
    }
    if !result.deferred.is_empty() {
        println!("    • {} deferred until reboot", result.deferred.len());
    }
    if !result.skipped.is_empty() {
        println!("    • {} skipped", result.skipped.len());
    }
    if !result.rolled_back.is_empty() {
        println!("    • {} rolled back", result.rolled_back.len());
    }
    for failure in &result.failed {
        println!(
            "    • {} {} - {}",
            "failed:".red(),
            failure.id,
            failure.error.dimmed()
        );
    }
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{CommandOutput, ExecutionError, PolicyTable, StaticSecrets};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Succeeds every command, answers every probe "absent"
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(
            &self,
            cmd: &str,
            args: &[&str],
            _timeout: Duration,
        ) -> Result<CommandOutput, ExecutionError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{cmd} {}", args.join(" ")));
            let probing = matches!(
                (cmd, args.first().copied()),
                ("rpm", Some("-q")) | ("id", Some("-u")) | ("systemctl", Some("is-enabled" | "is-active"))
            );
            Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                success: !probing,
            })
        }
    }

    fn model(toml: &str) -> ConfigurationModel {
        ConfigurationModel::from_toml_str(toml).unwrap()
    }

    #[test]
    fn test_new_package_is_applied_live() {
        let old = model("[identity]\nhostname = \"host\"\n");
        let new = model("[identity]\nhostname = \"host\"\n[packages]\ninstall = [\"htop\"]\n");
        let policy = PolicyTable::builtin();
        let changes = engine::diff(&old, &new, &policy);

        let runner = RecordingRunner::default();
        let secrets = StaticSecrets::default();
        let result = reconcile(
            &old,
            &new,
            &changes,
            &runner,
            &secrets,
            &EngineOptions::default(),
            Duration::from_secs(5),
        );

        assert_eq!(result.applied, vec!["packages/htop"]);
        assert!(result.deferred.is_empty());
        assert!(runner
            .calls
            .lock()
            .unwrap()
            .contains(&"dnf install -y htop".to_string()));
    }

    #[test]
    fn test_desktop_switch_is_deferred_not_attempted() {
        let old = model("[identity]\nhostname = \"host\"\n[desktop]\nenvironment = \"KDE\"\n");
        let new =
            model("[identity]\nhostname = \"host\"\n[desktop]\nenvironment = \"WINDOWS11\"\n");
        let policy = PolicyTable::builtin();
        let changes = engine::diff(&old, &new, &policy);

        let runner = RecordingRunner::default();
        let secrets = StaticSecrets::default();
        let result = reconcile(
            &old,
            &new,
            &changes,
            &runner,
            &secrets,
            &EngineOptions::default(),
            Duration::from_secs(5),
        );

        assert_eq!(result.deferred, vec!["desktop/environment"]);
        assert!(result.applied.is_empty());
        // No live action was ever invoked for the deferred change
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_convergence_after_full_apply() {
        let old = model("[identity]\nhostname = \"host\"\n");
        let new = model(
            "[identity]\nhostname = \"host\"\n[packages]\ninstall = [\"htop\"]\n[[services]]\nname = \"sshd\"\n",
        );
        let policy = PolicyTable::builtin();

        // A full apply converges the committed model to `new`; re-diffing
        // yields nothing left to do
        let follow_up = engine::diff(&new, &new, &policy);
        assert!(follow_up.is_empty());
    }
}
