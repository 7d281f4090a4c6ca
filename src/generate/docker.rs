//! Container build file emitter
//!
//! A rough container rendition of the model, useful for smoke-testing the
//! package set and users without touching a host.

use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, PackageAction};
use std::fmt::Write as _;

const BASE_IMAGE: &str = "fedora:41";

pub struct DockerEmitter;

impl Emitter for DockerEmitter {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let mut s = String::new();
        let _ = writeln!(s, "FROM {BASE_IMAGE}");
        let _ = writeln!(s, "LABEL org.hostforge.hostname=\"{}\"", model.identity.hostname);
        s.push('\n');

        let installs: Vec<&str> = model
            .packages
            .iter()
            .filter(|p| p.action == PackageAction::Install)
            .map(|p| p.name.as_str())
            .collect();
        if !installs.is_empty() {
            let _ = writeln!(
                s,
                "RUN dnf install -y {} && dnf clean all",
                installs.join(" ")
            );
        }

        for user in &model.users {
            let uid = user
                .uid
                .map(|uid| format!("-u {uid} "))
                .unwrap_or_default();
            let _ = writeln!(s, "RUN useradd -m {}-s {} {}", uid, user.shell, user.name);
        }

        for service in model.services.iter().filter(|svc| svc.enabled) {
            for (key, value) in &service.environment {
                let _ = writeln!(s, "ENV {key}={value}");
            }
            let _ = writeln!(s, "RUN systemctl enable {} || true", service.name);
        }

        s.push('\n');
        let _ = writeln!(s, "CMD [\"/sbin/init\"]");

        Ok(vec![Artifact::text("docker/Dockerfile", s)])
    }
}
