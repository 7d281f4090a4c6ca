//! Configuration model - the immutable typed description of one host
//!
//! The TOML front end is lowered into the model by [`ConfigurationModel::from_toml_str`];
//! semantic invariants live in the validator, not in serde. A malformed
//! source aborts immediately and produces no partial model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Malformed declarative source
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed source: {0}")]
    Toml(#[from] toml::de::Error),
}

// ============================================================================
// Root Aggregate
// ============================================================================

/// One host's desired state, immutable once constructed
///
/// Consumed read-only by the validator, the generators, and the change
/// detector. Collections keep source order; maps are ordered so that
/// serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationModel {
    pub identity: SystemIdentity,
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub repositories: Vec<RepositorySpec>,
    #[serde(default)]
    pub desktop: DesktopSpec,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub security: SecuritySpec,
    #[serde(default)]
    pub storage: StorageSpec,
    #[serde(default)]
    pub boot: BootSpec,
    #[serde(default)]
    pub automation: Vec<AutomationWorkflowSpec>,
}

impl ConfigurationModel {
    /// Lower a declarative TOML source into a model
    pub fn from_toml_str(content: &str) -> Result<Self, ParseError> {
        let doc: SourceDoc = toml::from_str(content)?;
        Ok(doc.lower())
    }

    /// The model of an unconfigured host; diffing a first config against it
    /// reports everything as new
    pub fn empty() -> Self {
        Self {
            identity: SystemIdentity {
                hostname: String::new(),
                timezone: default_timezone(),
                locale: default_locale(),
                pretty_name: None,
            },
            packages: Vec::new(),
            services: Vec::new(),
            users: Vec::new(),
            repositories: Vec::new(),
            desktop: DesktopSpec::default(),
            network: NetworkSpec::default(),
            security: SecuritySpec::default(),
            storage: StorageSpec::default(),
            boot: BootSpec::default(),
            automation: Vec::new(),
        }
    }

    pub fn package(&self, name: &str) -> Option<&PackageSpec> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn user(&self, name: &str) -> Option<&UserSpec> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn repository(&self, name: &str) -> Option<&RepositorySpec> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn mount(&self, mount_point: &str) -> Option<&MountSpec> {
        self.storage.mounts.iter().find(|m| m.mount_point == mount_point)
    }

    pub fn workflow(&self, name: &str) -> Option<&AutomationWorkflowSpec> {
        self.automation.iter().find(|w| w.name == name)
    }
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIdentity {
    pub hostname: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub pretty_name: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en_US.UTF-8".to_string()
}

// ============================================================================
// Packages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    Install,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub action: PackageAction,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn install(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action: PackageAction::Install,
            group: None,
            version: None,
        }
    }

    pub fn remove(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action: PackageAction::Remove,
            group: None,
            version: None,
        }
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub home_dir: Option<String>,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

// ============================================================================
// Repositories
// ============================================================================

/// Package repository or versioned-filesystem remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepositoryKind {
    Package,
    Ostree { branches: Vec<String> },
}

impl Default for RepositoryKind {
    fn default() -> Self {
        Self::Package
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub gpg_check: bool,
    #[serde(flatten)]
    pub kind: RepositoryKind,
}

// ============================================================================
// Desktop
// ============================================================================

/// Closed set of desktop personalities
///
/// Each variant has its own strategy module under `generate::desktop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesktopEnvironment {
    #[default]
    Headless,
    Kde,
    Windows11,
    Macos,
}

impl DesktopEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Headless => "HEADLESS",
            Self::Kde => "KDE",
            Self::Windows11 => "WINDOWS11",
            Self::Macos => "MACOS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesktopSpec {
    #[serde(default)]
    pub environment: DesktopEnvironment,
    #[serde(default)]
    pub theme: Option<String>,
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub dhcp: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

// ============================================================================
// Security
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelinuxMode {
    #[default]
    Enforcing,
    Permissive,
    Disabled,
}

impl SelinuxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enforcing => "enforcing",
            Self::Permissive => "permissive",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySpec {
    #[serde(default)]
    pub selinux: SelinuxMode,
    #[serde(default = "default_true")]
    pub firewall_enabled: bool,
    #[serde(default)]
    pub ssh_password_auth: bool,
}

impl Default for SecuritySpec {
    fn default() -> Self {
        Self {
            selinux: SelinuxMode::default(),
            firewall_enabled: true,
            ssh_password_auth: false,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageSpec {
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSpec {
    pub device: String,
    pub mount_point: String,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_fs_type() -> String {
    "ext4".to_string()
}

// ============================================================================
// Boot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootSpec {
    #[serde(default)]
    pub kernel_params: Vec<String>,
    #[serde(default = "default_boot_timeout")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub default_entry: Option<String>,
}

impl Default for BootSpec {
    fn default() -> Self {
        Self {
            kernel_params: Vec::new(),
            timeout_secs: default_boot_timeout(),
            default_entry: None,
        }
    }
}

fn default_boot_timeout() -> u32 {
    5
}

// ============================================================================
// Automation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationWorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub actions: Vec<AutomationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAction {
    pub name: String,
    pub command: String,
    /// Key looked up in the secret store at apply time
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Source Front End
// ============================================================================

/// The raw TOML shape, lowered into the model
///
/// Only packages differ from the model layout: the source groups them as
/// `install`/`remove` lists, the model keeps one keyed collection.
#[derive(Debug, Deserialize)]
struct SourceDoc {
    identity: SystemIdentity,
    #[serde(default)]
    packages: PackagesSection,
    #[serde(default)]
    services: Vec<ServiceSpec>,
    #[serde(default)]
    users: Vec<UserSpec>,
    #[serde(default)]
    repositories: Vec<SourceRepository>,
    #[serde(default)]
    desktop: DesktopSpec,
    #[serde(default)]
    network: NetworkSpec,
    #[serde(default)]
    security: SecuritySpec,
    #[serde(default)]
    storage: StorageSpec,
    #[serde(default)]
    boot: BootSpec,
    #[serde(default)]
    automation: Vec<AutomationWorkflowSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct PackagesSection {
    #[serde(default)]
    install: Vec<PackageItem>,
    #[serde(default)]
    remove: Vec<String>,
}

/// A package either as a bare name or with version/group detail
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PackageItem {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        group: Option<String>,
    },
}

/// Source shape of a repository; the `type` tag defaults to `package`,
/// which a flattened tagged enum cannot express on its own
#[derive(Debug, Deserialize)]
struct SourceRepository {
    name: String,
    url: String,
    #[serde(default = "default_true")]
    gpg_check: bool,
    #[serde(rename = "type", default)]
    kind: SourceRepositoryType,
    #[serde(default)]
    branches: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SourceRepositoryType {
    #[default]
    Package,
    Ostree,
}

impl SourceRepository {
    fn lower(self) -> RepositorySpec {
        let kind = match self.kind {
            SourceRepositoryType::Package => RepositoryKind::Package,
            SourceRepositoryType::Ostree => RepositoryKind::Ostree {
                branches: self.branches,
            },
        };
        RepositorySpec {
            name: self.name,
            url: self.url,
            gpg_check: self.gpg_check,
            kind,
        }
    }
}

impl SourceDoc {
    fn lower(self) -> ConfigurationModel {
        let mut packages = Vec::new();
        for item in self.packages.install {
            packages.push(match item {
                PackageItem::Name(name) => PackageSpec::install(&name),
                PackageItem::Detailed {
                    name,
                    version,
                    group,
                } => PackageSpec {
                    name,
                    action: PackageAction::Install,
                    group,
                    version,
                },
            });
        }
        for name in self.packages.remove {
            packages.push(PackageSpec::remove(&name));
        }

        ConfigurationModel {
            identity: self.identity,
            packages,
            services: self.services,
            users: self.users,
            repositories: self
                .repositories
                .into_iter()
                .map(SourceRepository::lower)
                .collect(),
            desktop: self.desktop,
            network: self.network,
            security: self.security,
            storage: self.storage,
            boot: self.boot,
            automation: self.automation,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[identity]
hostname = "workstation"
timezone = "Europe/Lisbon"

[packages]
install = ["htop", { name = "postgresql", version = "16", group = "database" }]
remove = ["nano"]

[[services]]
name = "sshd"
enabled = true

[[services]]
name = "postgresql"
enabled = true
restart_policy = "on-failure"

[services.environment]
PGDATA = "/var/lib/pgsql/data"

[[users]]
name = "alice"
uid = 1000
groups = ["wheel"]

[[repositories]]
name = "updates"
url = "https://mirror.example.com/updates"

[[repositories]]
name = "os"
url = "https://ostree.example.com/repo"
type = "ostree"
branches = ["stable", "testing"]

[desktop]
environment = "KDE"
theme = "breeze-dark"

[network]
dns = ["10.0.0.1"]

[[network.interfaces]]
name = "eth0"
dhcp = false
address = "10.0.0.5/24"
gateway = "10.0.0.1"

[security]
selinux = "enforcing"
firewall_enabled = true

[[storage.mounts]]
device = "/dev/vdb1"
mount_point = "/data"
fs_type = "xfs"

[boot]
kernel_params = ["quiet", "splash"]
timeout_secs = 3

[[automation]]
name = "nightly-backup"
trigger = "daily"

[[automation.actions]]
name = "dump"
command = "pg_dumpall -f /backup/all.sql"
secret = "backup_token"
"#;

    fn sample_model() -> ConfigurationModel {
        ConfigurationModel::from_toml_str(SAMPLE).expect("sample config should parse")
    }

    #[test]
    fn test_parse_sample() {
        let model = sample_model();

        assert_eq!(model.identity.hostname, "workstation");
        assert_eq!(model.identity.locale, "en_US.UTF-8");
        assert_eq!(model.packages.len(), 3);
        assert_eq!(model.package("htop").unwrap().action, PackageAction::Install);
        assert_eq!(
            model.package("postgresql").unwrap().version.as_deref(),
            Some("16")
        );
        assert_eq!(model.package("nano").unwrap().action, PackageAction::Remove);
        assert_eq!(model.services.len(), 2);
        assert_eq!(model.users[0].shell, "/bin/bash");
        assert_eq!(model.desktop.environment, DesktopEnvironment::Kde);
        assert_eq!(model.storage.mounts[0].fs_type, "xfs");
        assert_eq!(model.automation[0].actions[0].secret.as_deref(), Some("backup_token"));
    }

    #[test]
    fn test_repository_kinds() {
        let model = sample_model();

        assert_eq!(model.repository("updates").unwrap().kind, RepositoryKind::Package);
        match &model.repository("os").unwrap().kind {
            RepositoryKind::Ostree { branches } => assert_eq!(branches.len(), 2),
            RepositoryKind::Package => panic!("expected ostree repository"),
        }
        assert!(model.repository("updates").unwrap().gpg_check);
    }

    #[test]
    fn test_malformed_source_is_fatal() {
        let result = ConfigurationModel::from_toml_str("identity = nonsense [");
        assert!(matches!(result, Err(ParseError::Toml(_))));
    }

    #[test]
    fn test_minimal_source_gets_defaults() {
        let model = ConfigurationModel::from_toml_str(
            r#"
            [identity]
            hostname = "minimal"
            "#,
        )
        .unwrap();

        assert_eq!(model.identity.timezone, "UTC");
        assert!(model.packages.is_empty());
        assert_eq!(model.desktop.environment, DesktopEnvironment::Headless);
        assert!(model.security.firewall_enabled);
        assert_eq!(model.boot.timeout_secs, 5);
    }

    #[test]
    fn test_model_roundtrips_through_json() {
        let model = sample_model();
        let json = serde_json::to_string(&model).unwrap();
        let back: ConfigurationModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model, back);
    }
}
