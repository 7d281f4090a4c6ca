//! `hostforge compile` - validate, generate, write artifacts

use crate::cli::CompileArgs;
use crate::generate::{self, GenerateOptions, Target};
use crate::progress;
use crate::ui;
use crate::Context;
use anyhow::{Context as AnyhowContext, Result};

pub fn run(ctx: &Context, args: &CompileArgs) -> Result<()> {
    ui::header("Compiling configuration");

    let model = super::load_validated_model(&args.config, ctx.quiet)?;

    let targets = if args.targets.is_empty() {
        Target::ALL.to_vec()
    } else {
        args.targets.clone()
    };
    let opts = GenerateOptions {
        targets,
        continue_on_error: args.keep_going,
    };

    let bar = progress::spinner("Generating artifacts...");
    let result = generate::generate(&model, &opts);
    bar.finish_and_clear();

    let written = result
        .context("generation failed")?
        .write_to(&args.output)
        .context("could not write artifacts")?;

    ui::success(&format!(
        "Generated {} artifacts for {}",
        written.len(),
        model.identity.hostname
    ));
    if !ctx.quiet {
        for path in &written {
            ui::dim(&path.display().to_string());
        }
    }

    Ok(())
}
