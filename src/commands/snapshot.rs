//! `hostforge snapshot` - list, show, and roll back generations

use crate::cli::SnapshotCommand;
use crate::snapshot::SnapshotStore;
use crate::ui;
use crate::Context;
use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use std::path::Path;

pub fn run(ctx: &Context, cmd: SnapshotCommand) -> Result<()> {
    match cmd {
        SnapshotCommand::List { state_dir } => list(ctx, state_dir.as_deref()),
        SnapshotCommand::Rollback { id, state_dir } => rollback(ctx, &id, state_dir.as_deref()),
        SnapshotCommand::Show { id, state_dir } => show(ctx, &id, state_dir.as_deref()),
    }
}

fn open_store(state_dir: Option<&Path>) -> Result<SnapshotStore> {
    let state_dir = super::state_dir(state_dir)?;
    SnapshotStore::open(&state_dir.join("snapshots")).context("could not open snapshot store")
}

fn list(_ctx: &Context, state_dir: Option<&Path>) -> Result<()> {
    ui::header("Snapshots");

    let store = open_store(state_dir)?;
    let current = store.current_id()?;
    let snapshots = store.list()?;

    if snapshots.is_empty() {
        ui::info("No committed snapshots yet");
        return Ok(());
    }

    for snapshot in snapshots {
        let marker = if Some(&snapshot.id) == current.as_ref() {
            "→".cyan().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {} {} {} {} live, {} deferred",
            marker,
            snapshot.id.bold(),
            snapshot
                .metadata
                .created_at
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed(),
            snapshot.metadata.live_applied.len(),
            snapshot.metadata.deferred.len(),
        );
    }

    Ok(())
}

fn rollback(_ctx: &Context, id: &str, state_dir: Option<&Path>) -> Result<()> {
    ui::header("Rolling back");

    let store = open_store(state_dir)?;
    let result = store
        .rollback(id)
        .with_context(|| format!("could not roll back to {id}"))?;

    ui::success(&format!("Restored snapshot {}", result.restored));
    if let Some(previous) = result.previous {
        ui::dim(&format!("superseded {previous}"));
    }
    ui::warn("Reboot-required settings of the restored generation apply on next boot");

    Ok(())
}

fn show(ctx: &Context, id: &str, state_dir: Option<&Path>) -> Result<()> {
    let store = open_store(state_dir)?;
    let snapshot = store.get(id)?;

    ui::header(&snapshot.id);
    ui::kv("created", &snapshot.metadata.created_at.to_rfc3339());
    let state = if snapshot.metadata.state.is_terminal() {
        format!("{} (terminal)", snapshot.metadata.state)
    } else {
        snapshot.metadata.state.to_string()
    };
    ui::kv("state", &state);
    ui::kv("hostname", &snapshot.model.identity.hostname);
    ui::kv(
        "parent",
        snapshot.parent_id.as_deref().unwrap_or("(none)"),
    );

    if !ctx.quiet {
        if !snapshot.metadata.live_applied.is_empty() {
            ui::section("Applied live");
            for change in &snapshot.metadata.live_applied {
                ui::dim(change);
            }
        }
        if !snapshot.metadata.deferred.is_empty() {
            ui::section("Deferred");
            for change in &snapshot.metadata.deferred {
                ui::dim(change);
            }
        }
    }

    Ok(())
}
