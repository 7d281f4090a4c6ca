//! `hostforge policy` - inspect the live/reboot classification table

use crate::cli::PolicyArgs;
use crate::ui;
use crate::Context;
use anyhow::Result;
use colored::Colorize;
use declarative::Classification;

pub fn run(_ctx: &Context, args: &PolicyArgs) -> Result<()> {
    ui::header("Classification policy");

    let table = super::load_policy(args.file.as_deref())?;
    for (domain, classification, critical) in table.entries() {
        let kind = match classification {
            Classification::LiveApplicable => "live".green(),
            Classification::RequiresReboot => "reboot".red(),
        };
        let marker = if critical { " critical".yellow().to_string() } else { String::new() };
        println!("  {:<14} {}{}", domain.as_str(), kind, marker);
    }

    if args.file.is_none() {
        println!();
        ui::dim("built-in defaults; override with --file policy.toml");
    }

    Ok(())
}
