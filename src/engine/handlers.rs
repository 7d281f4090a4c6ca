//! Live change handler - converges single changes through the host's managers
//!
//! All host mutation goes through a [`CommandRunner`], so the handler is
//! testable without touching the machine. Entities are looked up in the
//! old/new models by the change entry's stable key.
//!
//! Removal semantics: packages carry an explicit `remove` action in the
//! model, so a package entry disappearing from the model merely stops
//! managing it. Users, services, and repositories have no remove action;
//! disappearing from the model removes them from the host.

use crate::model::{
    ConfigurationModel, PackageAction, PackageSpec, RepositoryKind, RepositorySpec, SelinuxMode,
    ServiceSpec, UserSpec,
};
use declarative::{
    ChangeEntry, ChangeHandler, ChangeKind, CommandRunner, Domain, ExecutionError, SecretSource,
};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LiveChangeHandler<'a> {
    old: &'a ConfigurationModel,
    new: &'a ConfigurationModel,
    runner: &'a dyn CommandRunner,
    secrets: &'a dyn SecretSource,
    timeout: Duration,
}

impl<'a> LiveChangeHandler<'a> {
    pub fn new(
        old: &'a ConfigurationModel,
        new: &'a ConfigurationModel,
        runner: &'a dyn CommandRunner,
        secrets: &'a dyn SecretSource,
    ) -> Self {
        Self {
            old,
            new,
            runner,
            secrets,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, cmd: &str, args: &[&str]) -> Result<(), ExecutionError> {
        self.runner.run_ok(cmd, args, self.timeout)
    }

    fn probe(&self, cmd: &str, args: &[&str]) -> bool {
        self.runner.probe(cmd, args, self.timeout)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    fn apply_identity(&self, key: &str, value: &str) -> Result<(), ExecutionError> {
        match key {
            "hostname" => self.run("hostnamectl", &["set-hostname", value]),
            "pretty_name" => self.run("hostnamectl", &["set-hostname", "--pretty", value]),
            "timezone" => self.run("timedatectl", &["set-timezone", value]),
            "locale" => {
                let lang = format!("LANG={value}");
                self.run("localectl", &["set-locale", lang.as_str()])
            }
            other => Err(ExecutionError::UnknownEntity(format!("identity/{other}"))),
        }
    }

    // ------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------

    fn package_installed(&self, name: &str) -> bool {
        self.probe("rpm", &["-q", name])
    }

    fn converge_package(&self, spec: &PackageSpec) -> Result<(), ExecutionError> {
        match spec.action {
            PackageAction::Install => {
                let target = match &spec.version {
                    Some(version) => format!("{}-{}", spec.name, version),
                    None => spec.name.clone(),
                };
                self.run("dnf", &["install", "-y", target.as_str()])
            }
            PackageAction::Remove => self.run("dnf", &["remove", "-y", spec.name.as_str()]),
        }
    }

    fn invert_package(&self, spec: &PackageSpec) -> Result<(), ExecutionError> {
        match spec.action {
            PackageAction::Install => self.run("dnf", &["remove", "-y", spec.name.as_str()]),
            PackageAction::Remove => self.run("dnf", &["install", "-y", spec.name.as_str()]),
        }
    }

    // ------------------------------------------------------------------
    // Repositories
    // ------------------------------------------------------------------

    fn add_repository(&self, spec: &RepositorySpec) -> Result<(), ExecutionError> {
        match &spec.kind {
            RepositoryKind::Package => {
                self.run("dnf", &["config-manager", "--add-repo", spec.url.as_str()])
            }
            RepositoryKind::Ostree { branches } => {
                let mut args = vec!["remote", "add", "--if-not-exists"];
                if !spec.gpg_check {
                    args.push("--no-gpg-verify");
                }
                args.push(&spec.name);
                args.push(&spec.url);
                for branch in branches {
                    args.push(branch);
                }
                self.run("ostree", &args)
            }
        }
    }

    fn remove_repository(&self, spec: &RepositorySpec) -> Result<(), ExecutionError> {
        match &spec.kind {
            RepositoryKind::Package => {
                self.run("dnf", &["config-manager", "--set-disabled", spec.name.as_str()])
            }
            RepositoryKind::Ostree { .. } => {
                self.run("ostree", &["remote", "delete", spec.name.as_str()])
            }
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    fn user_exists(&self, name: &str) -> bool {
        self.probe("id", &["-u", name])
    }

    fn create_user(&self, spec: &UserSpec) -> Result<(), ExecutionError> {
        for group in &spec.groups {
            self.run("groupadd", &["-f", group])?;
        }

        let uid = spec.uid.map(|uid| uid.to_string());
        let home = spec
            .home_dir
            .as_deref()
            .map(|home| shellexpand::tilde(home).into_owned());
        let mut args = vec!["-m", "-s", spec.shell.as_str()];
        if let Some(uid) = &uid {
            args.push("-u");
            args.push(uid);
        }
        if let Some(home) = &home {
            args.push("-d");
            args.push(home);
        }
        args.push(&spec.name);
        self.run("useradd", &args)?;

        if !spec.groups.is_empty() {
            let groups = spec.groups.join(",");
            self.run("usermod", &["-aG", groups.as_str(), spec.name.as_str()])?;
        }
        Ok(())
    }

    fn update_user(&self, spec: &UserSpec) -> Result<(), ExecutionError> {
        let mut args = vec!["-s".to_string(), spec.shell.clone()];
        if let Some(uid) = spec.uid {
            args.push("-u".to_string());
            args.push(uid.to_string());
        }
        if let Some(home) = &spec.home_dir {
            args.push("-d".to_string());
            args.push(home.clone());
        }
        if !spec.groups.is_empty() {
            for group in &spec.groups {
                self.run("groupadd", &["-f", group])?;
            }
            args.push("-aG".to_string());
            args.push(spec.groups.join(","));
        }
        args.push(spec.name.clone());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run("usermod", &arg_refs)
    }

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    fn service_converged(&self, spec: &ServiceSpec) -> bool {
        let enabled = self.probe("systemctl", &["is-enabled", "--quiet", spec.name.as_str()]);
        let active = self.probe("systemctl", &["is-active", "--quiet", spec.name.as_str()]);
        if spec.enabled {
            enabled && active
        } else {
            !enabled && !active
        }
    }

    fn converge_service(&self, spec: &ServiceSpec, restart: bool) -> Result<(), ExecutionError> {
        if spec.enabled {
            self.run("systemctl", &["enable", "--now", spec.name.as_str()])?;
            if restart {
                self.run("systemctl", &["restart", spec.name.as_str()])?;
            }
            Ok(())
        } else {
            self.run("systemctl", &["disable", "--now", spec.name.as_str()])
        }
    }

    fn disable_service(&self, name: &str) -> Result<(), ExecutionError> {
        self.run("systemctl", &["disable", "--now", name])
    }

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------

    fn apply_dns(&self, servers: &[String]) -> Result<(), ExecutionError> {
        let script = if servers.is_empty() {
            "rm -f /etc/systemd/resolved.conf.d/hostforge.conf && systemctl restart systemd-resolved"
                .to_string()
        } else {
            format!(
                "mkdir -p /etc/systemd/resolved.conf.d && printf '[Resolve]\\nDNS={}\\n' > /etc/systemd/resolved.conf.d/hostforge.conf && systemctl restart systemd-resolved",
                servers.join(" ")
            )
        };
        self.run("bash", &["-c", script.as_str()])
    }

    fn apply_interface(&self, model: &ConfigurationModel, name: &str) -> Result<(), ExecutionError> {
        let Some(interface) = model.network.interfaces.iter().find(|i| i.name == name) else {
            // Interface left the model; drop its unit
            let script = format!(
                "rm -f /etc/systemd/network/10-{name}.network && systemctl restart systemd-networkd"
            );
            return self.run("bash", &["-c", script.as_str()]);
        };

        let body = if interface.dhcp {
            "DHCP=yes".to_string()
        } else {
            let mut body = format!(
                "Address={}",
                interface.address.as_deref().unwrap_or_default()
            );
            if let Some(gateway) = &interface.gateway {
                body.push_str(&format!("\\nGateway={gateway}"));
            }
            body
        };
        let script = format!(
            "printf '[Match]\\nName={name}\\n\\n[Network]\\n{body}\\n' > /etc/systemd/network/10-{name}.network && systemctl restart systemd-networkd"
        );
        self.run("bash", &["-c", script.as_str()])
    }

    // ------------------------------------------------------------------
    // Security / Storage / Desktop / Boot (live only under policy override)
    // ------------------------------------------------------------------

    fn apply_security(&self, model: &ConfigurationModel, key: &str) -> Result<(), ExecutionError> {
        match key {
            "selinux" => match model.security.selinux {
                SelinuxMode::Enforcing => self.run("setenforce", &["1"]),
                SelinuxMode::Permissive => self.run("setenforce", &["0"]),
                SelinuxMode::Disabled => Err(ExecutionError::Other(
                    "disabling selinux needs a reboot".to_string(),
                )),
            },
            "firewall_enabled" => {
                if model.security.firewall_enabled {
                    self.run("systemctl", &["enable", "--now", "firewalld"])
                } else {
                    self.run("systemctl", &["disable", "--now", "firewalld"])
                }
            }
            "ssh_password_auth" => {
                let value = if model.security.ssh_password_auth { "yes" } else { "no" };
                let script = format!(
                    "sed -i 's/^#\\?PasswordAuthentication .*/PasswordAuthentication {value}/' /etc/ssh/sshd_config && systemctl reload sshd"
                );
                self.run("bash", &["-c", script.as_str()])
            }
            other => Err(ExecutionError::UnknownEntity(format!("security/{other}"))),
        }
    }

    fn apply_mount(&self, model: &ConfigurationModel, point: &str) -> Result<(), ExecutionError> {
        match model.mount(point) {
            Some(mount) => {
                let options = if mount.options.is_empty() {
                    "defaults".to_string()
                } else {
                    mount.options.join(",")
                };
                self.run("mkdir", &["-p", point])?;
                self.run(
                    "mount",
                    &["-t", mount.fs_type.as_str(), "-o", options.as_str(), mount.device.as_str(), point],
                )
            }
            None => self.run("umount", &[point]),
        }
    }

    fn apply_desktop(&self, model: &ConfigurationModel) -> Result<(), ExecutionError> {
        match crate::generate::desktop::profile(model.desktop.environment) {
            Some(profile) => {
                let mut args = vec!["install", "-y"];
                args.extend(profile.packages().iter().copied());
                self.run("dnf", &args)?;
                self.run("systemctl", &["enable", profile.display_manager()])
            }
            None => Ok(()),
        }
    }

    fn apply_boot(&self, model: &ConfigurationModel, key: &str) -> Result<(), ExecutionError> {
        match key {
            "kernel_params" => {
                let params = model.boot.kernel_params.join(" ");
                let args_flag = format!("--args={params}");
                self.run("grubby", &["--update-kernel=ALL", args_flag.as_str()])
            }
            "timeout_secs" => {
                let script = format!(
                    "sed -i 's/^GRUB_TIMEOUT=.*/GRUB_TIMEOUT={}/' /etc/default/grub && grub2-mkconfig -o /boot/grub2/grub.cfg",
                    model.boot.timeout_secs
                );
                self.run("bash", &["-c", script.as_str()])
            }
            "default_entry" => match &model.boot.default_entry {
                Some(entry) => self.run("grub2-set-default", &[entry.as_str()]),
                None => Ok(()),
            },
            other => Err(ExecutionError::UnknownEntity(format!("boot/{other}"))),
        }
    }

    // ------------------------------------------------------------------
    // Automation
    // ------------------------------------------------------------------

    /// Workflows run on their own trigger; applying one pre-flights its
    /// secret references so a broken credential surfaces now, not at 3am.
    fn apply_workflow(&self, name: &str) -> Result<(), ExecutionError> {
        let workflow = self
            .new
            .workflow(name)
            .ok_or_else(|| ExecutionError::UnknownEntity(format!("automation/{name}")))?;
        for action in &workflow.actions {
            if let Some(secret) = &action.secret {
                self.secrets.require(secret)?;
            }
        }
        Ok(())
    }

    fn interface_key(key: &str) -> Option<&str> {
        key.strip_prefix("interface:")
    }

    fn mount_key(key: &str) -> Option<&str> {
        key.strip_prefix("mount:")
    }
}

impl ChangeHandler for LiveChangeHandler<'_> {
    fn needs_apply(&self, entry: &ChangeEntry) -> Result<bool, ExecutionError> {
        match entry.domain {
            Domain::Packages => {
                if entry.kind == ChangeKind::Removed {
                    return Ok(false);
                }
                let spec = self
                    .new
                    .package(&entry.key)
                    .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                Ok(match spec.action {
                    PackageAction::Install => !self.package_installed(&spec.name),
                    PackageAction::Remove => self.package_installed(&spec.name),
                })
            }
            Domain::Services => match (entry.kind, self.new.service(&entry.key)) {
                (ChangeKind::Removed, _) => Ok(true),
                (_, Some(spec)) if entry.kind == ChangeKind::Added => {
                    Ok(!self.service_converged(spec))
                }
                _ => Ok(true),
            },
            Domain::Users => match entry.kind {
                ChangeKind::Added => Ok(!self.user_exists(&entry.key)),
                ChangeKind::Removed => Ok(self.user_exists(&entry.key)),
                ChangeKind::Modified => Ok(true),
            },
            _ => Ok(true),
        }
    }

    fn apply(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
        match entry.domain {
            Domain::Identity => {
                self.apply_identity(&entry.key, entry.new.as_deref().unwrap_or_default())
            }
            Domain::Repositories => match entry.kind {
                ChangeKind::Removed => {
                    let spec = self
                        .old
                        .repository(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.remove_repository(spec)
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    let spec = self
                        .new
                        .repository(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    if entry.kind == ChangeKind::Modified
                        && let Some(previous) = self.old.repository(&entry.key)
                    {
                        self.remove_repository(previous)?;
                    }
                    self.add_repository(spec)
                }
            },
            Domain::Packages => match entry.kind {
                // No longer managed; the host keeps whatever it has
                ChangeKind::Removed => Ok(()),
                ChangeKind::Added | ChangeKind::Modified => {
                    let spec = self
                        .new
                        .package(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.converge_package(spec)
                }
            },
            Domain::Users => match entry.kind {
                ChangeKind::Added => {
                    let spec = self
                        .new
                        .user(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.create_user(spec)
                }
                ChangeKind::Modified => {
                    let spec = self
                        .new
                        .user(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.update_user(spec)
                }
                ChangeKind::Removed => self.run("userdel", &[entry.key.as_str()]),
            },
            Domain::Services => match entry.kind {
                ChangeKind::Removed => self.disable_service(&entry.key),
                ChangeKind::Added | ChangeKind::Modified => {
                    let spec = self
                        .new
                        .service(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.converge_service(spec, entry.kind == ChangeKind::Modified)
                }
            },
            Domain::Network => {
                if entry.key == "dns" {
                    self.apply_dns(&self.new.network.dns)
                } else if let Some(name) = Self::interface_key(&entry.key) {
                    self.apply_interface(self.new, name)
                } else {
                    Err(ExecutionError::UnknownEntity(entry.id()))
                }
            }
            Domain::Security => self.apply_security(self.new, &entry.key),
            Domain::Storage => match Self::mount_key(&entry.key) {
                Some(point) => self.apply_mount(self.new, point),
                None => Err(ExecutionError::UnknownEntity(entry.id())),
            },
            Domain::Desktop => self.apply_desktop(self.new),
            Domain::Boot => self.apply_boot(self.new, &entry.key),
            Domain::Automation => self.apply_workflow(&entry.key),
        }
    }

    fn rollback(&self, entry: &ChangeEntry) -> Result<(), ExecutionError> {
        match entry.domain {
            Domain::Identity => match &entry.old {
                Some(old) => self.apply_identity(&entry.key, old),
                None => Ok(()),
            },
            Domain::Repositories => match entry.kind {
                ChangeKind::Added => {
                    let spec = self
                        .new
                        .repository(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.remove_repository(spec)
                }
                ChangeKind::Removed | ChangeKind::Modified => {
                    let spec = self
                        .old
                        .repository(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.add_repository(spec)
                }
            },
            Domain::Packages => match (entry.kind, self.old.package(&entry.key)) {
                (ChangeKind::Removed, _) => Ok(()),
                (_, Some(previous)) => self.converge_package(previous),
                (_, None) => {
                    let spec = self
                        .new
                        .package(&entry.key)
                        .ok_or_else(|| ExecutionError::UnknownEntity(entry.id()))?;
                    self.invert_package(spec)
                }
            },
            Domain::Users => match (entry.kind, self.old.user(&entry.key)) {
                (ChangeKind::Added, _) => self.run("userdel", &[entry.key.as_str()]),
                (_, Some(previous)) => {
                    if self.user_exists(&previous.name) {
                        self.update_user(previous)
                    } else {
                        self.create_user(previous)
                    }
                }
                (_, None) => Ok(()),
            },
            Domain::Services => match (entry.kind, self.old.service(&entry.key)) {
                (ChangeKind::Added, _) => self.disable_service(&entry.key),
                (_, Some(previous)) => self.converge_service(previous, true),
                (_, None) => Ok(()),
            },
            Domain::Network => {
                if entry.key == "dns" {
                    self.apply_dns(&self.old.network.dns)
                } else if let Some(name) = Self::interface_key(&entry.key) {
                    self.apply_interface(self.old, name)
                } else {
                    Ok(())
                }
            }
            Domain::Security => self.apply_security(self.old, &entry.key),
            Domain::Storage => match Self::mount_key(&entry.key) {
                Some(point) => self.apply_mount(self.old, point),
                None => Ok(()),
            },
            Domain::Desktop => self.apply_desktop(self.old),
            Domain::Boot => self.apply_boot(self.old, &entry.key),
            Domain::Automation => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
