//! CLI command implementations

pub mod apply;
pub mod compile;
pub mod diff;
pub mod policy;
pub mod snapshot;
pub mod validate;

use crate::model::{ConfigurationModel, ParseError};
use crate::ui;
use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::PolicyTable;
use std::path::{Path, PathBuf};

/// State directory for snapshots and the apply lease
pub fn state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("hostforge"))
}

/// Parse and validate a config file; errors are aggregated and fatal
pub fn load_validated_model(config: &Path, quiet: bool) -> Result<ConfigurationModel> {
    let source = std::fs::read_to_string(config)
        .with_context(|| format!("Could not read config file: {}", config.display()))?;

    let model = match ConfigurationModel::from_toml_str(&source) {
        Ok(model) => model,
        Err(ParseError::Toml(err)) => {
            ui::error(&format!("parse error: {err}"));
            bail!("could not parse {}", config.display());
        }
    };

    let report = crate::validate::validate(&model);
    if !quiet {
        for warning in &report.warnings {
            ui::warn(&format!(
                "{}.{}: {}",
                warning.domain, warning.field, warning.message
            ));
        }
    }
    if !report.is_ok() {
        for error in &report.errors {
            ui::error(&error.to_string());
        }
        bail!(
            "validation failed with {} error(s), generation blocked",
            report.errors.len()
        );
    }

    Ok(model)
}

/// Load the classification policy, built-in unless a file overrides it
pub fn load_policy(file: Option<&Path>) -> Result<PolicyTable> {
    match file {
        None => Ok(PolicyTable::builtin()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read policy file: {}", path.display()))?;
            PolicyTable::from_toml_str(&content)
                .with_context(|| format!("Invalid policy file: {}", path.display()))
        }
    }
}
