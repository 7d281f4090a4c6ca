//! `hostforge validate` - report errors and warnings without generating

use crate::model::ConfigurationModel;
use crate::ui;
use crate::validate;
use crate::Context;
use anyhow::{Context as AnyhowContext, Result, bail};
use std::path::Path;

pub fn run(_ctx: &Context, config: &Path) -> Result<()> {
    ui::header("Validating configuration");

    let source = std::fs::read_to_string(config)
        .with_context(|| format!("Could not read config file: {}", config.display()))?;
    let model = match ConfigurationModel::from_toml_str(&source) {
        Ok(model) => model,
        Err(err) => {
            ui::error(&err.to_string());
            bail!("could not parse {}", config.display());
        }
    };

    let report = validate::validate(&model);

    for warning in &report.warnings {
        ui::warn(&format!(
            "{}.{}: {}",
            warning.domain, warning.field, warning.message
        ));
    }
    for error in &report.errors {
        ui::error(&error.to_string());
    }

    if report.is_ok() {
        ui::success(&format!(
            "{} is valid ({} warning(s))",
            config.display(),
            report.warnings.len()
        ));
        Ok(())
    } else {
        bail!("{} error(s) found", report.errors.len());
    }
}
