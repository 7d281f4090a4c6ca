//! Documentation emitter - a README for the generated artifact set

use super::desktop;
use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, PackageAction};
use std::fmt::Write as _;

pub struct DocsEmitter;

impl Emitter for DocsEmitter {
    fn name(&self) -> &'static str {
        "docs"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let mut s = String::new();
        let _ = writeln!(s, "# {}", model.identity.hostname);
        if let Some(pretty) = &model.identity.pretty_name {
            let _ = writeln!(s, "\n{pretty}");
        }
        let _ = writeln!(s, "\nGenerated host configuration. Review before deploying.");

        let _ = writeln!(s, "\n## Summary\n");
        let _ = writeln!(s, "- Timezone: {}", model.identity.timezone);
        let installs = model
            .packages
            .iter()
            .filter(|p| p.action == PackageAction::Install)
            .count();
        let removes = model.packages.len() - installs;
        let _ = writeln!(s, "- Packages: {installs} installed, {removes} removed");
        let _ = writeln!(s, "- Services: {}", model.services.len());
        let _ = writeln!(s, "- Users: {}", model.users.len());
        let _ = writeln!(s, "- Repositories: {}", model.repositories.len());
        match desktop::profile(model.desktop.environment) {
            Some(profile) => {
                let _ = writeln!(
                    s,
                    "- Desktop: {} ({} session)",
                    model.desktop.environment.as_str(),
                    profile.session()
                );
            }
            None => {
                let _ = writeln!(s, "- Desktop: headless");
            }
        }

        let _ = writeln!(s, "\n## Deploying\n");
        let _ = writeln!(s, "```sh");
        let _ = writeln!(s, "sudo scripts/deploy.sh");
        let _ = writeln!(s, "```");
        let _ = writeln!(
            s,
            "\nOr compose an immutable tree with `ostree/build-ostree.sh`, or run\n`ansible-playbook ansible/site.yml` against the host."
        );

        Ok(vec![Artifact::text("docs/README.md", s)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readme_summarizes_model() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "workstation"
            pretty_name = "Dev Workstation"

            [packages]
            install = ["htop", "zsh"]
            remove = ["nano"]

            [desktop]
            environment = "MACOS"
            "#,
        )
        .unwrap();

        let files = DocsEmitter.emit(&model).unwrap();
        let readme = &files[0].contents;

        assert!(readme.starts_with("# workstation"));
        assert!(readme.contains("Dev Workstation"));
        assert!(readme.contains("2 installed, 1 removed"));
        assert!(readme.contains("gnome-macos"));
    }
}
