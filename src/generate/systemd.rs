//! systemd unit emitter
//!
//! Declared services get drop-in overrides (environment, restart policy);
//! their base units belong to the packages that ship them. Automation
//! workflows become oneshot units owned by this tool.

use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, RestartPolicy, ServiceSpec};
use std::fmt::Write as _;

pub struct SystemdEmitter;

impl Emitter for SystemdEmitter {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let mut files = Vec::new();

        for service in &model.services {
            if let Some(contents) = override_unit(service) {
                files.push(Artifact::text(
                    &format!("systemd/{}.service.d/override.conf", service.name),
                    contents,
                ));
            }
        }

        for workflow in &model.automation {
            let mut unit = String::new();
            let _ = writeln!(unit, "[Unit]");
            let _ = writeln!(unit, "Description=hostforge workflow {}", workflow.name);
            let _ = writeln!(unit, "\n[Service]");
            let _ = writeln!(unit, "Type=oneshot");
            for action in &workflow.actions {
                let _ = writeln!(unit, "ExecStart={}", action.command);
            }
            let _ = writeln!(unit, "\n[Install]");
            let _ = writeln!(unit, "WantedBy=multi-user.target");

            files.push(Artifact::text(
                &format!("systemd/hostforge-{}.service", workflow.name),
                unit,
            ));
        }

        Ok(files)
    }
}

fn override_unit(service: &ServiceSpec) -> Option<String> {
    if service.environment.is_empty() && service.restart_policy.is_none() {
        return None;
    }

    let mut contents = String::from("[Service]\n");
    for (key, value) in &service.environment {
        let _ = writeln!(contents, "Environment=\"{key}={value}\"");
    }
    if let Some(policy) = service.restart_policy {
        let restart = match policy {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::No => "no",
        };
        let _ = writeln!(contents, "Restart={restart}");
    }
    Some(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_carries_environment_and_restart() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [[services]]
            name = "postgresql"
            restart_policy = "on-failure"

            [services.environment]
            PGDATA = "/var/lib/pgsql/data"
            "#,
        )
        .unwrap();

        let files = SystemdEmitter.emit(&model).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].path.to_string_lossy(),
            "systemd/postgresql.service.d/override.conf"
        );
        assert!(files[0].contents.contains("Environment=\"PGDATA=/var/lib/pgsql/data\""));
        assert!(files[0].contents.contains("Restart=on-failure"));
    }

    #[test]
    fn test_workflow_becomes_oneshot_unit() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [[automation]]
            name = "nightly-backup"

            [[automation.actions]]
            name = "dump"
            command = "/usr/local/bin/backup.sh"
            "#,
        )
        .unwrap();

        let files = SystemdEmitter.emit(&model).unwrap();
        assert_eq!(
            files[0].path.to_string_lossy(),
            "systemd/hostforge-nightly-backup.service"
        );
        assert!(files[0].contents.contains("Type=oneshot"));
        assert!(files[0].contents.contains("ExecStart=/usr/local/bin/backup.sh"));
    }

    #[test]
    fn test_plain_service_emits_nothing() {
        let model = ConfigurationModel::from_toml_str(
            "[identity]\nhostname = \"host\"\n[[services]]\nname = \"sshd\"\n",
        )
        .unwrap();

        let files = SystemdEmitter.emit(&model).unwrap();
        assert!(files.is_empty());
    }
}
