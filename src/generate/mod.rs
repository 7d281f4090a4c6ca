//! Generator - multi-format emitters producing deterministic artifacts
//!
//! Each output format is an independent [`Emitter`]; the orchestrator runs
//! the requested subset. Determinism is a hard contract: the same model and
//! target set must produce byte-identical artifacts, because diffing and
//! auditing depend on it. No emitter reads the clock or the environment.

use crate::model::ConfigurationModel;
use clap::ValueEnum;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod ansible;
pub mod desktop;
pub mod docker;
pub mod docs;
pub mod json;
pub mod ostree;
pub mod scripts;
pub mod systemd;
pub mod yaml;

/// Per-emitter or I/O failure during generation
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("emitter `{emitter}` failed: {reason}")]
    Emitter { emitter: &'static str, reason: String },

    #[error("{} emitters failed: {}", failures.len(), render_failures(failures))]
    Multiple { failures: Vec<(String, String)> },

    #[error("could not write `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn render_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(emitter, reason)| format!("{emitter}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One generated file, relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
    pub executable: bool,
}

impl Artifact {
    pub fn text(path: &str, contents: String) -> Self {
        Self {
            path: PathBuf::from(path),
            contents,
            executable: false,
        }
    }

    pub fn script(path: &str, contents: String) -> Self {
        Self {
            path: PathBuf::from(path),
            contents,
            executable: true,
        }
    }
}

/// Output formats an operator can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum Target {
    Json,
    Yaml,
    Scripts,
    Systemd,
    Ansible,
    Docker,
    Ostree,
    Docs,
}

impl Target {
    pub const ALL: [Self; 8] = [
        Self::Json,
        Self::Yaml,
        Self::Scripts,
        Self::Systemd,
        Self::Ansible,
        Self::Docker,
        Self::Ostree,
        Self::Docs,
    ];
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Scripts => "scripts",
            Self::Systemd => "systemd",
            Self::Ansible => "ansible",
            Self::Docker => "docker",
            Self::Ostree => "ostree",
            Self::Docs => "docs",
        };
        f.write_str(name)
    }
}

/// A single-output-format artifact generator
pub trait Emitter: Send + Sync {
    fn name(&self) -> &'static str;

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError>;
}

fn emitter_for(target: Target) -> Box<dyn Emitter> {
    match target {
        Target::Json => Box::new(json::JsonEmitter),
        Target::Yaml => Box::new(yaml::YamlEmitter),
        Target::Scripts => Box::new(scripts::ScriptEmitter),
        Target::Systemd => Box::new(systemd::SystemdEmitter),
        Target::Ansible => Box::new(ansible::AnsibleEmitter),
        Target::Docker => Box::new(docker::DockerEmitter),
        Target::Ostree => Box::new(ostree::OstreeEmitter),
        Target::Docs => Box::new(docs::DocsEmitter),
    }
}

/// Options for one generation run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub targets: Vec<Target>,
    /// Collect every emitter failure instead of aborting on the first
    pub continue_on_error: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            targets: Target::ALL.to_vec(),
            continue_on_error: false,
        }
    }
}

/// The artifact set of one successful generation
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub files: Vec<Artifact>,
}

impl GenerationResult {
    /// Write every artifact under `dir`, returning the paths written
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, GenerationError> {
        let mut written = Vec::with_capacity(self.files.len());
        for artifact in &self.files {
            let path = dir.join(&artifact.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| GenerationError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&path, &artifact.contents).map_err(|source| GenerationError::Io {
                path: path.clone(),
                source,
            })?;

            #[cfg(unix)]
            if artifact.executable {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(
                    |source| GenerationError::Io {
                        path: path.clone(),
                        source,
                    },
                )?;
            }

            written.push(path);
        }
        Ok(written)
    }
}

/// Run the requested emitters over the model
///
/// Aborts on the first emitter failure unless `continue_on_error` is set,
/// in which case every failure is collected and reported together.
pub fn generate(
    model: &ConfigurationModel,
    opts: &GenerateOptions,
) -> Result<GenerationResult, GenerationError> {
    use rayon::prelude::*;

    let mut targets = opts.targets.clone();
    targets.sort();
    targets.dedup();

    // Emitters are pure over the model, so they run in parallel; the
    // collected artifacts are re-sorted for byte-stable output
    let outcomes: Vec<(Target, Result<Vec<Artifact>, GenerationError>)> = targets
        .par_iter()
        .map(|&target| {
            let emitter = emitter_for(target);
            log::debug!("running emitter {}", emitter.name());
            (target, emitter.emit(model))
        })
        .collect();

    let mut files = Vec::new();
    let mut failures = Vec::new();
    for (target, outcome) in outcomes {
        match outcome {
            Ok(mut artifacts) => files.append(&mut artifacts),
            Err(err) if opts.continue_on_error => {
                failures.push((target.to_string(), err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }

    if !failures.is_empty() {
        return Err(GenerationError::Multiple { failures });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(GenerationResult { files })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfigurationModel;

    fn model() -> ConfigurationModel {
        ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "workstation"
            timezone = "Europe/Lisbon"

            [packages]
            install = ["htop"]

            [[services]]
            name = "sshd"

            [desktop]
            environment = "KDE"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_generation_is_deterministic() {
        let model = model();
        let opts = GenerateOptions::default();

        let first = generate(&model, &opts).unwrap();
        let second = generate(&model, &opts).unwrap();

        assert_eq!(first.files.len(), second.files.len());
        for (a, b) in first.files.iter().zip(second.files.iter()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.contents, b.contents, "{} differs between runs", a.path.display());
        }
    }

    #[test]
    fn test_full_target_set_layout() {
        let result = generate(&model(), &GenerateOptions::default()).unwrap();
        let paths: Vec<String> = result
            .files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect();

        for expected in [
            "json/config.json",
            "yaml/config.yaml",
            "scripts/deploy.sh",
            "scripts/packages.sh",
            "ansible/site.yml",
            "docker/Dockerfile",
            "ostree/manifest.json",
            "ostree/build-ostree.sh",
            "docs/README.md",
        ] {
            assert!(paths.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_subset_of_targets() {
        let opts = GenerateOptions {
            targets: vec![Target::Json],
            continue_on_error: false,
        };
        let result = generate(&model(), &opts).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].path, PathBuf::from("json/config.json"));
    }

    #[test]
    fn test_package_script_contains_package_name() {
        let opts = GenerateOptions {
            targets: vec![Target::Scripts],
            continue_on_error: false,
        };
        let result = generate(&model(), &opts).unwrap();
        let script = result
            .files
            .iter()
            .find(|f| f.path == PathBuf::from("scripts/packages.sh"))
            .expect("packages script");
        assert!(script.contents.contains("htop"));
        assert!(script.executable);
    }

    #[test]
    fn test_write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate(&model(), &GenerateOptions::default()).unwrap();
        let written = result.write_to(dir.path()).unwrap();

        assert_eq!(written.len(), result.files.len());
        assert!(dir.path().join("json/config.json").exists());
    }
}
