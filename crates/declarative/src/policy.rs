//! Classification policy - the single source of truth for live vs reboot
//!
//! Which domains can be reconciled on a running host is an operational
//! decision, not something inferred per call site. The built-in table holds
//! the defaults; a policy file can override individual domains and mark
//! domains critical.

use crate::error::PolicyError;
use crate::types::{Classification, Domain};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Domain -> classification map plus the critical set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    classifications: BTreeMap<Domain, Classification>,
    critical: BTreeSet<Domain>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Override file shape:
///
/// ```toml
/// live = ["storage"]
/// reboot = ["repositories"]
/// critical = ["identity", "packages"]
/// ```
#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    live: Vec<Domain>,
    #[serde(default)]
    reboot: Vec<Domain>,
    #[serde(default)]
    critical: Vec<Domain>,
}

impl PolicyTable {
    /// The built-in defaults
    ///
    /// Anything the host's managers can reconfigure in place is live;
    /// desktop sessions, boot entries, filesystem layout, and security
    /// posture wait for a restart. Adding a repository is live-safe: it
    /// only affects subsequent installs.
    pub fn builtin() -> Self {
        let mut classifications = BTreeMap::new();
        for domain in Domain::ALL {
            let classification = match domain {
                Domain::Identity
                | Domain::Repositories
                | Domain::Packages
                | Domain::Users
                | Domain::Services
                | Domain::Network
                | Domain::Automation => Classification::LiveApplicable,
                Domain::Security | Domain::Storage | Domain::Desktop | Domain::Boot => {
                    Classification::RequiresReboot
                }
            };
            classifications.insert(domain, classification);
        }

        let mut critical = BTreeSet::new();
        critical.insert(Domain::Identity);

        Self {
            classifications,
            critical,
        }
    }

    /// Built-in defaults with the given file's overrides merged on top
    pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = toml::from_str(content)?;

        for domain in &file.live {
            if file.reboot.contains(domain) {
                return Err(PolicyError::Conflict(domain.to_string()));
            }
        }

        let mut table = Self::builtin();
        for domain in file.live {
            table
                .classifications
                .insert(domain, Classification::LiveApplicable);
        }
        for domain in file.reboot {
            table
                .classifications
                .insert(domain, Classification::RequiresReboot);
        }
        if !file.critical.is_empty() {
            table.critical = file.critical.into_iter().collect();
        }

        Ok(table)
    }

    pub fn classify(&self, domain: Domain) -> Classification {
        // Every domain is seeded in builtin(), so the lookup cannot miss
        self.classifications
            .get(&domain)
            .copied()
            .unwrap_or(Classification::RequiresReboot)
    }

    pub fn is_critical(&self, domain: Domain) -> bool {
        self.critical.contains(&domain)
    }

    /// Rows for `policy show`, in domain order
    pub fn entries(&self) -> impl Iterator<Item = (Domain, Classification, bool)> + '_ {
        Domain::ALL
            .into_iter()
            .map(|d| (d, self.classify(d), self.is_critical(d)))
    }

    /// Render the table as TOML-ish text for inspection
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (domain, classification, critical) in self.entries() {
            let kind = match classification {
                Classification::LiveApplicable => "live",
                Classification::RequiresReboot => "reboot",
            };
            let marker = if critical { " (critical)" } else { "" };
            let _ = writeln!(out, "{domain} = {kind}{marker}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = PolicyTable::builtin();
        assert_eq!(
            table.classify(Domain::Packages),
            Classification::LiveApplicable
        );
        assert_eq!(
            table.classify(Domain::Repositories),
            Classification::LiveApplicable
        );
        assert_eq!(table.classify(Domain::Desktop), Classification::RequiresReboot);
        assert_eq!(table.classify(Domain::Boot), Classification::RequiresReboot);
        assert!(table.is_critical(Domain::Identity));
        assert!(!table.is_critical(Domain::Packages));
    }

    #[test]
    fn test_override_file() {
        let table = PolicyTable::from_toml_str(
            r#"
            live = ["storage"]
            reboot = ["repositories"]
            critical = ["packages"]
            "#,
        )
        .unwrap();

        assert_eq!(table.classify(Domain::Storage), Classification::LiveApplicable);
        assert_eq!(
            table.classify(Domain::Repositories),
            Classification::RequiresReboot
        );
        assert!(table.is_critical(Domain::Packages));
        assert!(!table.is_critical(Domain::Identity));
    }

    #[test]
    fn test_conflicting_override_rejected() {
        let result = PolicyTable::from_toml_str(
            r#"
            live = ["boot"]
            reboot = ["boot"]
            "#,
        );
        assert!(matches!(result, Err(PolicyError::Conflict(d)) if d == "boot"));
    }

    #[test]
    fn test_render_lists_every_domain() {
        let rendered = PolicyTable::builtin().render();
        for domain in Domain::ALL {
            assert!(rendered.contains(domain.as_str()));
        }
    }
}
