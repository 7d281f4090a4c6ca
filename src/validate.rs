//! Validator - independent per-domain rule sets with aggregated reporting
//!
//! Every domain is checked even when an earlier one fails; errors are
//! collected, never short-circuited. Errors block generation, warnings are
//! surfaced and generation proceeds. Validation never mutates the model.

use crate::model::{
    ConfigurationModel, DesktopEnvironment, PackageAction, RepositoryKind, SelinuxMode,
};
use declarative::Domain;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use thiserror::Error;

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid hostname regex")
});

static USER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid user name regex"));

static SERVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.@-]+$").expect("valid service name regex"));

/// Timezone areas accepted in `Area/City` identifiers
const TZ_AREAS: &[&str] = &[
    "Africa",
    "America",
    "Antarctica",
    "Asia",
    "Atlantic",
    "Australia",
    "Etc",
    "Europe",
    "Indian",
    "Pacific",
];

/// A semantic violation; fatal for generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{domain}.{field}: {reason}")]
pub struct ValidationError {
    pub domain: Domain,
    pub field: String,
    pub reason: String,
}

/// Surfaced to the operator; generation proceeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub domain: Domain,
    pub field: String,
    pub message: String,
}

/// Aggregated outcome of one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, domain: Domain, field: &str, reason: String) {
        self.errors.push(ValidationError {
            domain,
            field: field.to_string(),
            reason,
        });
    }

    fn warn(&mut self, domain: Domain, field: &str, message: String) {
        self.warnings.push(ValidationWarning {
            domain,
            field: field.to_string(),
            message,
        });
    }
}

/// Run every domain rule set over the model
pub fn validate(model: &ConfigurationModel) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_identity(model, &mut report);
    check_packages(model, &mut report);
    check_services(model, &mut report);
    check_users(model, &mut report);
    check_repositories(model, &mut report);
    check_network(model, &mut report);
    check_security(model, &mut report);
    check_storage(model, &mut report);
    check_desktop(model, &mut report);
    check_boot(model, &mut report);
    check_automation(model, &mut report);

    report
}

fn check_identity(model: &ConfigurationModel, report: &mut ValidationReport) {
    let hostname = &model.identity.hostname;
    if hostname.is_empty() {
        report.error(Domain::Identity, "hostname", "hostname is empty".to_string());
    } else if !HOSTNAME_RE.is_match(hostname) {
        report.error(
            Domain::Identity,
            "hostname",
            format!(
                "`{hostname}` is not a valid hostname: only letters, digits, and interior hyphens are allowed"
            ),
        );
    }

    let timezone = &model.identity.timezone;
    let valid_tz = timezone == "UTC"
        || timezone
            .split_once('/')
            .is_some_and(|(area, city)| TZ_AREAS.contains(&area) && !city.is_empty());
    if !valid_tz {
        report.error(
            Domain::Identity,
            "timezone",
            format!("`{timezone}` is not a known timezone identifier"),
        );
    }

    if model.identity.locale.is_empty() {
        report.warn(
            Domain::Identity,
            "locale",
            "locale is empty, the host default will apply".to_string(),
        );
    }
}

fn check_packages(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut by_name: BTreeMap<&str, BTreeSet<PackageAction>> = BTreeMap::new();
    let mut seen: BTreeSet<(&str, PackageAction)> = BTreeSet::new();

    for package in &model.packages {
        if package.name.is_empty() {
            report.error(Domain::Packages, "name", "package with empty name".to_string());
            continue;
        }
        if !seen.insert((package.name.as_str(), package.action)) {
            report.warn(
                Domain::Packages,
                &package.name,
                "listed more than once".to_string(),
            );
        }
        by_name
            .entry(package.name.as_str())
            .or_default()
            .insert(package.action);

        if package.action == PackageAction::Remove && package.version.is_some() {
            report.warn(
                Domain::Packages,
                &package.name,
                "version is ignored for removals".to_string(),
            );
        }
    }

    for (name, actions) in by_name {
        if actions.len() > 1 {
            report.error(
                Domain::Packages,
                name,
                format!("package `{name}` appears in both install and remove"),
            );
        }
    }
}

fn check_services(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for service in &model.services {
        if !SERVICE_NAME_RE.is_match(&service.name) {
            report.error(
                Domain::Services,
                &service.name,
                format!("`{}` is not a valid service name", service.name),
            );
        }
        if !seen.insert(service.name.as_str()) {
            report.error(
                Domain::Services,
                &service.name,
                format!("service `{}` is declared twice", service.name),
            );
        }
        for key in service.environment.keys() {
            if key.is_empty() || key.contains(['=', ' ']) {
                report.error(
                    Domain::Services,
                    &service.name,
                    format!("invalid environment variable name `{key}`"),
                );
            }
        }
    }
}

fn check_users(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut names = BTreeSet::new();
    let mut uids: BTreeMap<u32, &str> = BTreeMap::new();

    for user in &model.users {
        if !USER_NAME_RE.is_match(&user.name) {
            report.error(
                Domain::Users,
                &user.name,
                format!("`{}` is not a valid user name", user.name),
            );
        }
        if !names.insert(user.name.as_str()) {
            report.error(
                Domain::Users,
                &user.name,
                format!("user `{}` is declared twice", user.name),
            );
        }
        if let Some(uid) = user.uid {
            if let Some(other) = uids.insert(uid, &user.name) {
                report.error(
                    Domain::Users,
                    &user.name,
                    format!("uid {uid} is already assigned to `{other}`"),
                );
            }
            if uid < 1000 {
                report.warn(
                    Domain::Users,
                    &user.name,
                    format!("uid {uid} is in the system range"),
                );
            }
        }
        if !user.shell.starts_with('/') {
            report.error(
                Domain::Users,
                &user.name,
                format!("shell `{}` is not an absolute path", user.shell),
            );
        }
        if let Some(home) = &user.home_dir
            && !home.starts_with('/')
            && !home.starts_with('~')
        {
            report.error(
                Domain::Users,
                &user.name,
                format!("home directory `{home}` is not an absolute path"),
            );
        }
    }
}

fn check_repositories(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for repo in &model.repositories {
        if !seen.insert(repo.name.as_str()) {
            report.error(
                Domain::Repositories,
                &repo.name,
                format!("repository `{}` is declared twice", repo.name),
            );
        }
        let scheme_ok = ["https://", "http://", "file://"]
            .iter()
            .any(|scheme| repo.url.starts_with(scheme));
        if !scheme_ok {
            report.error(
                Domain::Repositories,
                &repo.name,
                format!("url `{}` has an unsupported scheme", repo.url),
            );
        }
        if !repo.gpg_check {
            report.warn(
                Domain::Repositories,
                &repo.name,
                "signature checking is disabled".to_string(),
            );
        }
        if let RepositoryKind::Ostree { branches } = &repo.kind
            && branches.is_empty()
        {
            report.error(
                Domain::Repositories,
                &repo.name,
                "ostree repository without branches".to_string(),
            );
        }
    }
}

fn check_network(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for interface in &model.network.interfaces {
        if !seen.insert(interface.name.as_str()) {
            report.error(
                Domain::Network,
                &interface.name,
                format!("interface `{}` is declared twice", interface.name),
            );
        }
        if !interface.dhcp && interface.address.is_none() {
            report.error(
                Domain::Network,
                &interface.name,
                "static interface without an address".to_string(),
            );
        }
        if interface.dhcp && interface.address.is_some() {
            report.warn(
                Domain::Network,
                &interface.name,
                "address is ignored while dhcp is enabled".to_string(),
            );
        }
    }
    for server in &model.network.dns {
        if !server.chars().all(|c| c.is_ascii_hexdigit() || ".:".contains(c)) {
            report.warn(
                Domain::Network,
                "dns",
                format!("`{server}` does not look like an IP address"),
            );
        }
    }
}

fn check_security(model: &ConfigurationModel, report: &mut ValidationReport) {
    if model.security.ssh_password_auth && model.security.selinux != SelinuxMode::Enforcing {
        report.warn(
            Domain::Security,
            "ssh_password_auth",
            "password authentication with selinux not enforcing".to_string(),
        );
    }
    if !model.security.firewall_enabled {
        report.warn(
            Domain::Security,
            "firewall_enabled",
            "firewall is disabled".to_string(),
        );
    }
}

fn check_storage(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut points = BTreeSet::new();
    for mount in &model.storage.mounts {
        if mount.device.is_empty() {
            report.error(
                Domain::Storage,
                &mount.mount_point,
                "mount without a device".to_string(),
            );
        }
        if !mount.mount_point.starts_with('/') {
            report.error(
                Domain::Storage,
                &mount.mount_point,
                format!("mount point `{}` is not absolute", mount.mount_point),
            );
        }
        if !points.insert(mount.mount_point.as_str()) {
            report.error(
                Domain::Storage,
                &mount.mount_point,
                format!("mount point `{}` is declared twice", mount.mount_point),
            );
        }
    }
}

fn check_desktop(model: &ConfigurationModel, report: &mut ValidationReport) {
    if model.desktop.environment == DesktopEnvironment::Headless && model.desktop.theme.is_some() {
        report.warn(
            Domain::Desktop,
            "theme",
            "theme has no effect on a headless host".to_string(),
        );
    }
}

fn check_boot(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for param in &model.boot.kernel_params {
        if param.contains(char::is_whitespace) {
            report.error(
                Domain::Boot,
                "kernel_params",
                format!("kernel parameter `{param}` contains whitespace"),
            );
        }
        if !seen.insert(param.as_str()) {
            report.warn(
                Domain::Boot,
                "kernel_params",
                format!("kernel parameter `{param}` is repeated"),
            );
        }
    }
    if model.boot.timeout_secs > 300 {
        report.warn(
            Domain::Boot,
            "timeout_secs",
            format!("boot timeout of {}s is unusually long", model.boot.timeout_secs),
        );
    }
}

fn check_automation(model: &ConfigurationModel, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    for workflow in &model.automation {
        if !seen.insert(workflow.name.as_str()) {
            report.error(
                Domain::Automation,
                &workflow.name,
                format!("workflow `{}` is declared twice", workflow.name),
            );
        }
        if workflow.actions.is_empty() {
            report.warn(
                Domain::Automation,
                &workflow.name,
                "workflow has no actions".to_string(),
            );
        }
        for action in &workflow.actions {
            if action.command.trim().is_empty() {
                report.error(
                    Domain::Automation,
                    &workflow.name,
                    format!("action `{}` has an empty command", action.name),
                );
            }
            if let Some(secret) = &action.secret
                && (secret.is_empty() || secret.contains(char::is_whitespace))
            {
                report.error(
                    Domain::Automation,
                    &workflow.name,
                    format!("action `{}` references an invalid secret key", action.name),
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigurationModel, PackageSpec};

    fn minimal(hostname: &str) -> ConfigurationModel {
        ConfigurationModel::from_toml_str(&format!(
            "[identity]\nhostname = \"{hostname}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_valid_model_is_clean() {
        let report = validate(&minimal("workstation"));
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_underscore_hostname_rejected() {
        let report = validate(&minimal("my_host"));
        assert!(!report.is_ok());
        let error = &report.errors[0];
        assert_eq!(error.domain, Domain::Identity);
        assert!(error.to_string().contains("my_host"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut model = minimal("host");
        model.identity.timezone = "Moon/Tycho".to_string();
        let report = validate(&model);
        assert!(report.errors.iter().any(|e| e.field == "timezone"));
    }

    #[test]
    fn test_install_remove_conflict_names_package() {
        let mut model = minimal("host");
        model.packages.push(PackageSpec::install("htop"));
        model.packages.push(PackageSpec::remove("htop"));

        let report = validate(&model);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].reason.contains("htop"));
        assert!(report.errors[0].reason.contains("install and remove"));
    }

    #[test]
    fn test_duplicate_uid_rejected() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [[users]]
            name = "alice"
            uid = 1000

            [[users]]
            name = "bob"
            uid = 1000
            "#,
        )
        .unwrap();

        let report = validate(&model);
        assert!(report.errors.iter().any(|e| e.reason.contains("1000")));
    }

    #[test]
    fn test_all_domains_checked_despite_failures() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "bad_host"

            [packages]
            install = ["htop"]
            remove = ["htop"]

            [[storage.mounts]]
            device = ""
            mount_point = "relative/path"
            "#,
        )
        .unwrap();

        let report = validate(&model);
        let domains: std::collections::BTreeSet<_> =
            report.errors.iter().map(|e| e.domain).collect();
        assert!(domains.contains(&Domain::Identity));
        assert!(domains.contains(&Domain::Packages));
        assert!(domains.contains(&Domain::Storage));
    }

    #[test]
    fn test_validation_does_not_mutate_model() {
        let mut model = minimal("host");
        model.packages.push(PackageSpec::install("htop"));
        model.packages.push(PackageSpec::remove("htop"));
        let before = model.clone();

        let _ = validate(&model);
        assert_eq!(model, before);
    }

    #[test]
    fn test_warnings_do_not_block() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "host"

            [security]
            firewall_enabled = false
            "#,
        )
        .unwrap();

        let report = validate(&model);
        assert!(report.is_ok());
        assert!(!report.warnings.is_empty());
    }
}
