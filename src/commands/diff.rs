//! `hostforge diff` - classified differences against the committed snapshot

use crate::cli::DiffArgs;
use crate::engine;
use crate::model::ConfigurationModel;
use crate::snapshot::SnapshotStore;
use crate::ui;
use crate::Context;
use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{ChangeKind, ChangeSet, Classification};
use std::collections::BTreeMap;

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<()> {
    ui::header("Configuration Diff");

    let new = super::load_validated_model(&args.config, ctx.quiet)?;
    let policy = super::load_policy(args.policy.as_deref())?;

    let state_dir = super::state_dir(args.state_dir.as_deref())?;
    let store = SnapshotStore::open(&state_dir.join("snapshots"))
        .context("could not open snapshot store")?;
    let old = match store.current().context("could not read current snapshot")? {
        Some(snapshot) => snapshot.model,
        None => {
            ui::info("No committed snapshot; diffing against an unconfigured host");
            ConfigurationModel::empty()
        }
    };

    let changes = engine::diff(&old, &new, &policy);
    display_changes(&changes);

    Ok(())
}

/// Grouped, classified change listing shared by diff and apply
pub fn display_changes(changes: &ChangeSet) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes - host already matches", "✓".green());
        return;
    }

    let mut by_domain: BTreeMap<&str, Vec<&declarative::ChangeEntry>> = BTreeMap::new();
    for entry in &changes.entries {
        by_domain.entry(entry.domain.as_str()).or_default().push(entry);
    }

    for (domain, entries) in &by_domain {
        ui::section(domain);
        for entry in entries {
            let symbol = match entry.kind {
                ChangeKind::Added => "+".green(),
                ChangeKind::Removed => "-".red(),
                ChangeKind::Modified => "~".yellow(),
            };
            let classification = match entry.classification {
                Classification::LiveApplicable => "live".green(),
                Classification::RequiresReboot => "reboot".red(),
            };
            let detail = match (&entry.old, &entry.new) {
                (Some(old), Some(new)) => format!("{old} → {new}"),
                (None, Some(new)) => new.clone(),
                (Some(old), None) => old.clone(),
                (None, None) => String::new(),
            };
            println!(
                "  {} {:<28} [{}] {}",
                symbol,
                entry.key,
                classification,
                detail.dimmed()
            );
        }
    }

    let live = changes.live().count();
    let deferred = changes.len() - live;
    println!();
    println!(
        "  {} changes ({} live-applicable, {} deferred until reboot)",
        changes.len().to_string().bold(),
        live.to_string().green(),
        deferred.to_string().red()
    );
}
