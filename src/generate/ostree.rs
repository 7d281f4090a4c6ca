//! ostree compose emitter
//!
//! A manifest the versioned-filesystem tool can compose into a deployable
//! tree, plus the build script that drives it.

use super::desktop;
use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, PackageAction, RepositoryKind};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Serialize)]
struct ComposeManifest {
    #[serde(rename = "ref")]
    tree_ref: String,
    repos: Vec<String>,
    packages: Vec<String>,
    #[serde(rename = "remove-from-packages", skip_serializing_if = "Vec::is_empty")]
    remove: Vec<String>,
}

pub struct OstreeEmitter;

impl Emitter for OstreeEmitter {
    fn name(&self) -> &'static str {
        "ostree"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let mut packages: Vec<String> = model
            .packages
            .iter()
            .filter(|p| p.action == PackageAction::Install)
            .map(|p| p.name.clone())
            .collect();
        if let Some(profile) = desktop::profile(model.desktop.environment) {
            packages.extend(profile.packages().iter().map(ToString::to_string));
        }
        packages.sort();
        packages.dedup();

        let manifest = ComposeManifest {
            tree_ref: format!("hostforge/{}/x86_64/standard", model.identity.hostname),
            repos: model
                .repositories
                .iter()
                .filter(|r| r.kind == RepositoryKind::Package)
                .map(|r| r.name.clone())
                .collect(),
            packages,
            remove: model
                .packages
                .iter()
                .filter(|p| p.action == PackageAction::Remove)
                .map(|p| p.name.clone())
                .collect(),
        };

        let rendered =
            serde_json::to_string_pretty(&manifest).map_err(|err| GenerationError::Emitter {
                emitter: self.name(),
                reason: err.to_string(),
            })?;

        let mut script = String::from(
            "#!/usr/bin/env bash\n# Compose the ostree for this host\nset -euo pipefail\n\ncd \"$(dirname \"$0\")\"\n\n",
        );
        let _ = writeln!(script, "REPO=${{1:-/srv/ostree/repo}}");
        let _ = writeln!(script, "ostree --repo=\"$REPO\" init --mode=archive || true");
        let _ = writeln!(
            script,
            "rpm-ostree compose tree --repo=\"$REPO\" manifest.json"
        );
        let _ = writeln!(
            script,
            "ostree --repo=\"$REPO\" summary -u"
        );

        Ok(vec![
            Artifact::text("ostree/manifest.json", rendered + "\n"),
            Artifact::script("ostree/build-ostree.sh", script),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_includes_desktop_packages() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [packages]
            install = ["htop"]

            [desktop]
            environment = "KDE"
            "#,
        )
        .unwrap();

        let files = OstreeEmitter.emit(&model).unwrap();
        let manifest = files
            .iter()
            .find(|f| f.path.ends_with("manifest.json"))
            .unwrap();

        assert!(manifest.contents.contains("\"ref\": \"hostforge/host/x86_64/standard\""));
        assert!(manifest.contents.contains("htop"));
        assert!(manifest.contents.contains("plasma-desktop"));
    }

    #[test]
    fn test_package_list_is_sorted() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [packages]
            install = ["zsh", "bat", "htop"]
            "#,
        )
        .unwrap();

        let files = OstreeEmitter.emit(&model).unwrap();
        let manifest = &files[0].contents;
        let bat = manifest.find("\"bat\"").unwrap();
        let htop = manifest.find("\"htop\"").unwrap();
        let zsh = manifest.find("\"zsh\"").unwrap();
        assert!(bat < htop && htop < zsh);
    }
}
