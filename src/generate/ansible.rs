//! Ansible playbook emitter
//!
//! One `site.yml` covering the whole model, task order matching the deploy
//! script's dependency order. Secret references become vault-style lookups
//! rather than inline values.

use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, PackageAction};
use serde_yaml::{Mapping, Value};

pub struct AnsibleEmitter;

impl Emitter for AnsibleEmitter {
    fn name(&self) -> &'static str {
        "ansible"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let mut tasks: Vec<Value> = Vec::new();

        tasks.push(task(
            "Set hostname",
            "ansible.builtin.hostname",
            [("name", str_value(&model.identity.hostname))],
        ));
        tasks.push(task(
            "Set timezone",
            "community.general.timezone",
            [("name", str_value(&model.identity.timezone))],
        ));

        for repo in &model.repositories {
            tasks.push(task(
                &format!("Configure repository {}", repo.name),
                "ansible.builtin.yum_repository",
                [
                    ("name", str_value(&repo.name)),
                    ("description", str_value(&repo.name)),
                    ("baseurl", str_value(&repo.url)),
                    ("gpgcheck", Value::Bool(repo.gpg_check)),
                ],
            ));
        }

        let installs: Vec<Value> = model
            .packages
            .iter()
            .filter(|p| p.action == PackageAction::Install)
            .map(|p| str_value(&p.name))
            .collect();
        if !installs.is_empty() {
            tasks.push(task(
                "Install packages",
                "ansible.builtin.dnf",
                [
                    ("name", Value::Sequence(installs)),
                    ("state", str_value("present")),
                ],
            ));
        }

        let removes: Vec<Value> = model
            .packages
            .iter()
            .filter(|p| p.action == PackageAction::Remove)
            .map(|p| str_value(&p.name))
            .collect();
        if !removes.is_empty() {
            tasks.push(task(
                "Remove packages",
                "ansible.builtin.dnf",
                [
                    ("name", Value::Sequence(removes)),
                    ("state", str_value("absent")),
                ],
            ));
        }

        for user in &model.users {
            let mut fields = vec![
                ("name", str_value(&user.name)),
                ("shell", str_value(&user.shell)),
                ("groups", str_value(&user.groups.join(","))),
            ];
            if let Some(uid) = user.uid {
                fields.push(("uid", Value::Number(uid.into())));
            }
            tasks.push(task(
                &format!("Create user {}", user.name),
                "ansible.builtin.user",
                fields,
            ));
        }

        for service in &model.services {
            tasks.push(task(
                &format!("Manage service {}", service.name),
                "ansible.builtin.systemd_service",
                [
                    ("name", str_value(&service.name)),
                    ("enabled", Value::Bool(service.enabled)),
                    (
                        "state",
                        str_value(if service.enabled { "started" } else { "stopped" }),
                    ),
                ],
            ));
        }

        for workflow in &model.automation {
            for action in &workflow.actions {
                let mut fields = vec![("cmd", str_value(&action.command))];
                if let Some(secret) = &action.secret {
                    fields.push((
                        "environment",
                        str_value(&format!(
                            "{{{{ lookup('community.hashi_vault.vault_read', '{secret}') }}}}"
                        )),
                    ));
                }
                tasks.push(task(
                    &format!("Workflow {} - {}", workflow.name, action.name),
                    "ansible.builtin.command",
                    fields,
                ));
            }
        }

        let mut play = Mapping::new();
        play.insert(
            str_value("name"),
            str_value(&format!("Converge {}", model.identity.hostname)),
        );
        play.insert(str_value("hosts"), str_value("all"));
        play.insert(str_value("become"), Value::Bool(true));
        play.insert(str_value("tasks"), Value::Sequence(tasks));

        let document = Value::Sequence(vec![Value::Mapping(play)]);
        let rendered = serde_yaml::to_string(&document).map_err(|err| GenerationError::Emitter {
            emitter: self.name(),
            reason: err.to_string(),
        })?;

        Ok(vec![Artifact::text("ansible/site.yml", format!("---\n{rendered}"))])
    }
}

fn str_value(s: &str) -> Value {
    Value::String(s.to_string())
}

fn task(
    name: &str,
    module: &str,
    fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> Value {
    let mut module_args = Mapping::new();
    for (key, value) in fields {
        module_args.insert(str_value(key), value);
    }

    let mut mapping = Mapping::new();
    mapping.insert(str_value("name"), str_value(name));
    mapping.insert(str_value(module), Value::Mapping(module_args));
    Value::Mapping(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playbook_round_trips_and_orders_tasks() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [packages]
            install = ["htop"]

            [[repositories]]
            name = "updates"
            url = "https://mirror.example.com"

            [[services]]
            name = "sshd"
            "#,
        )
        .unwrap();

        let files = AnsibleEmitter.emit(&model).unwrap();
        assert_eq!(files[0].path.to_string_lossy(), "ansible/site.yml");

        let contents = &files[0].contents;
        let parsed: Value = serde_yaml::from_str(contents).unwrap();
        assert!(parsed.is_sequence());

        let repo_pos = contents.find("Configure repository").unwrap();
        let install_pos = contents.find("Install packages").unwrap();
        let service_pos = contents.find("Manage service").unwrap();
        assert!(repo_pos < install_pos);
        assert!(install_pos < service_pos);
    }
}
