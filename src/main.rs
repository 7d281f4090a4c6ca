mod cli;
mod commands;
mod engine;
mod generate;
mod lease;
mod model;
mod progress;
mod runner;
mod secret;
mod snapshot;
mod ui;
mod validate;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Compile(args) => commands::compile::run(&ctx, &args),
        Command::Validate { config } => commands::validate::run(&ctx, &config),
        Command::Diff(args) => commands::diff::run(&ctx, &args),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Snapshot(cmd) => commands::snapshot::run(&ctx, cmd),
        Command::Policy(args) => commands::policy::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "hostforge", &mut io::stdout());
            Ok(())
        }
    }
}
