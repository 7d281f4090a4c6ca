//! Shell script emitter - one script per configured domain plus deploy.sh
//!
//! Scripts are idempotent where the underlying tool allows it (guarded
//! useradd, fstab grep-before-append) and always emitted in the same order
//! with the same text for the same model.

use super::desktop;
use super::{Artifact, Emitter, GenerationError};
use crate::model::{ConfigurationModel, PackageAction, RepositoryKind, SelinuxMode};
use std::fmt::Write as _;

pub struct ScriptEmitter;

impl Emitter for ScriptEmitter {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn emit(&self, model: &ConfigurationModel) -> Result<Vec<Artifact>, GenerationError> {
        let sections: Vec<(&'static str, Option<String>)> = vec![
            ("identity", Some(identity_script(model))),
            ("repositories", repositories_script(model)),
            ("packages", packages_script(model)),
            ("users", users_script(model)),
            ("network", network_script(model)),
            ("security", Some(security_script(model))),
            ("storage", storage_script(model)),
            ("services", services_script(model)),
            ("desktop", desktop_script(model)),
            ("boot", boot_script(model)),
        ];

        let mut files = Vec::new();
        let mut order = Vec::new();
        for (name, body) in sections {
            if let Some(body) = body {
                files.push(Artifact::script(&format!("scripts/{name}.sh"), body));
                order.push(name);
            }
        }
        files.push(Artifact::script("scripts/deploy.sh", deploy_script(&order)));

        Ok(files)
    }
}

fn header(title: &str) -> String {
    format!("#!/usr/bin/env bash\n# {title}\nset -euo pipefail\n\n")
}

fn identity_script(model: &ConfigurationModel) -> String {
    let identity = &model.identity;
    let mut s = header("System identity");
    let _ = writeln!(s, "hostnamectl set-hostname '{}'", identity.hostname);
    if let Some(pretty) = &identity.pretty_name {
        let _ = writeln!(s, "hostnamectl set-hostname --pretty '{pretty}'");
    }
    let _ = writeln!(s, "timedatectl set-timezone '{}'", identity.timezone);
    if !identity.locale.is_empty() {
        let _ = writeln!(s, "localectl set-locale LANG='{}'", identity.locale);
    }
    s
}

fn repositories_script(model: &ConfigurationModel) -> Option<String> {
    if model.repositories.is_empty() {
        return None;
    }
    let mut s = header("Package and ostree repositories");
    for repo in &model.repositories {
        match &repo.kind {
            RepositoryKind::Package => {
                let _ = writeln!(s, "cat > /etc/yum.repos.d/{}.repo <<'EOF'", repo.name);
                let _ = writeln!(s, "[{}]", repo.name);
                let _ = writeln!(s, "name={}", repo.name);
                let _ = writeln!(s, "baseurl={}", repo.url);
                let _ = writeln!(s, "enabled=1");
                let _ = writeln!(s, "gpgcheck={}", u8::from(repo.gpg_check));
                let _ = writeln!(s, "EOF");
            }
            RepositoryKind::Ostree { branches } => {
                let gpg = if repo.gpg_check { "" } else { " --no-gpg-verify" };
                let _ = writeln!(
                    s,
                    "ostree remote add --if-not-exists{gpg} {} {} {}",
                    repo.name,
                    repo.url,
                    branches.join(" ")
                );
            }
        }
        s.push('\n');
    }
    Some(s)
}

fn packages_script(model: &ConfigurationModel) -> Option<String> {
    if model.packages.is_empty() {
        return None;
    }
    let mut s = header("Package management");

    let installs: Vec<String> = model
        .packages
        .iter()
        .filter(|p| p.action == PackageAction::Install)
        .map(|p| match &p.version {
            Some(version) => format!("{}-{}", p.name, version),
            None => p.name.clone(),
        })
        .collect();
    if !installs.is_empty() {
        let _ = writeln!(s, "dnf install -y {}", installs.join(" "));
    }

    let removes: Vec<&str> = model
        .packages
        .iter()
        .filter(|p| p.action == PackageAction::Remove)
        .map(|p| p.name.as_str())
        .collect();
    if !removes.is_empty() {
        let _ = writeln!(s, "dnf remove -y {}", removes.join(" "));
    }

    Some(s)
}

fn users_script(model: &ConfigurationModel) -> Option<String> {
    if model.users.is_empty() {
        return None;
    }
    let mut s = header("Users and groups");
    for user in &model.users {
        for group in &user.groups {
            let _ = writeln!(s, "getent group '{group}' >/dev/null || groupadd '{group}'");
        }
        let mut add = format!("useradd -m -s '{}'", user.shell);
        if let Some(uid) = user.uid {
            let _ = write!(add, " -u {uid}");
        }
        if let Some(home) = &user.home_dir {
            let _ = write!(add, " -d '{home}'");
        }
        let _ = writeln!(
            s,
            "id -u '{name}' >/dev/null 2>&1 || {add} '{name}'",
            name = user.name
        );
        if !user.groups.is_empty() {
            let _ = writeln!(s, "usermod -aG '{}' '{}'", user.groups.join(","), user.name);
        }
        s.push('\n');
    }
    Some(s)
}

fn network_script(model: &ConfigurationModel) -> Option<String> {
    let network = &model.network;
    if network.dns.is_empty() && network.interfaces.is_empty() {
        return None;
    }
    let mut s = header("Network configuration");

    if !network.dns.is_empty() {
        let _ = writeln!(s, "mkdir -p /etc/systemd/resolved.conf.d");
        let _ = writeln!(s, "cat > /etc/systemd/resolved.conf.d/hostforge.conf <<'EOF'");
        let _ = writeln!(s, "[Resolve]");
        let _ = writeln!(s, "DNS={}", network.dns.join(" "));
        let _ = writeln!(s, "EOF");
        s.push('\n');
    }

    for interface in &network.interfaces {
        let _ = writeln!(
            s,
            "cat > /etc/systemd/network/10-{}.network <<'EOF'",
            interface.name
        );
        let _ = writeln!(s, "[Match]");
        let _ = writeln!(s, "Name={}", interface.name);
        let _ = writeln!(s, "\n[Network]");
        if interface.dhcp {
            let _ = writeln!(s, "DHCP=yes");
        } else if let Some(address) = &interface.address {
            let _ = writeln!(s, "Address={address}");
            if let Some(gateway) = &interface.gateway {
                let _ = writeln!(s, "Gateway={gateway}");
            }
        }
        let _ = writeln!(s, "EOF");
        s.push('\n');
    }

    let _ = writeln!(s, "systemctl restart systemd-networkd systemd-resolved");
    Some(s)
}

fn security_script(model: &ConfigurationModel) -> String {
    let security = &model.security;
    let mut s = header("Security posture");

    let mode = security.selinux.as_str();
    let _ = writeln!(
        s,
        "sed -i 's/^SELINUX=.*/SELINUX={mode}/' /etc/selinux/config"
    );
    if security.selinux != SelinuxMode::Disabled {
        let enforce = u8::from(security.selinux == SelinuxMode::Enforcing);
        let _ = writeln!(s, "setenforce {enforce} || true");
    }
    s.push('\n');

    if security.firewall_enabled {
        let _ = writeln!(s, "systemctl enable --now firewalld");
    } else {
        let _ = writeln!(s, "systemctl disable --now firewalld");
    }
    s.push('\n');

    let value = if security.ssh_password_auth { "yes" } else { "no" };
    let _ = writeln!(
        s,
        "sed -i 's/^#\\?PasswordAuthentication .*/PasswordAuthentication {value}/' /etc/ssh/sshd_config"
    );
    let _ = writeln!(s, "systemctl reload sshd || true");

    s
}

fn storage_script(model: &ConfigurationModel) -> Option<String> {
    if model.storage.mounts.is_empty() {
        return None;
    }
    let mut s = header("Storage mounts");
    for mount in &model.storage.mounts {
        let options = if mount.options.is_empty() {
            "defaults".to_string()
        } else {
            mount.options.join(",")
        };
        let line = format!(
            "{} {} {} {} 0 0",
            mount.device, mount.mount_point, mount.fs_type, options
        );
        let _ = writeln!(s, "mkdir -p '{}'", mount.mount_point);
        let _ = writeln!(
            s,
            "grep -qF '{} ' /etc/fstab || echo '{line}' >> /etc/fstab",
            mount.mount_point
        );
    }
    let _ = writeln!(s, "\nsystemctl daemon-reload");
    let _ = writeln!(s, "mount -a");
    Some(s)
}

fn services_script(model: &ConfigurationModel) -> Option<String> {
    if model.services.is_empty() {
        return None;
    }
    let mut s = header("Service management");
    for service in &model.services {
        if service.enabled {
            let _ = writeln!(s, "systemctl enable --now '{}'", service.name);
        } else {
            let _ = writeln!(s, "systemctl disable --now '{}'", service.name);
        }
    }
    Some(s)
}

fn desktop_script(model: &ConfigurationModel) -> Option<String> {
    let profile = desktop::profile(model.desktop.environment)?;
    let mut s = header("Desktop environment");
    let _ = writeln!(s, "dnf install -y {}", profile.packages().join(" "));
    let _ = writeln!(s, "systemctl enable '{}'", profile.display_manager());
    for line in profile.setup_lines(model.desktop.theme.as_deref()) {
        let _ = writeln!(s, "{line}");
    }
    Some(s)
}

fn boot_script(model: &ConfigurationModel) -> Option<String> {
    let boot = &model.boot;
    if boot.kernel_params.is_empty() && boot.default_entry.is_none() {
        return None;
    }
    let mut s = header("Boot configuration");
    if !boot.kernel_params.is_empty() {
        let _ = writeln!(
            s,
            "grubby --update-kernel=ALL --args='{}'",
            boot.kernel_params.join(" ")
        );
    }
    let _ = writeln!(
        s,
        "sed -i 's/^GRUB_TIMEOUT=.*/GRUB_TIMEOUT={}/' /etc/default/grub",
        boot.timeout_secs
    );
    if let Some(entry) = &boot.default_entry {
        let _ = writeln!(s, "grub2-set-default '{entry}'");
    }
    let _ = writeln!(s, "grub2-mkconfig -o /boot/grub2/grub.cfg");
    Some(s)
}

fn deploy_script(order: &[&str]) -> String {
    let mut s = header("Top-level deploy - runs domain scripts in dependency order");
    let _ = writeln!(s, "cd \"$(dirname \"$0\")\"\n");
    let _ = writeln!(s, "steps=({})", order.join(" "));
    s.push_str(
        "\nfor step in \"${steps[@]}\"; do\n    echo \"==> ${step}\"\n    bash \"${step}.sh\"\ndone\n\necho \"==> deploy complete\"\n",
    );
    s
}

// ============================================================================
// Tests
// ============================================================================
