//! Change detection - diff two models into a classified change set
//!
//! Entities are matched by stable identity, never by position. An entity
//! whose non-key fields changed is a Modification, not a Remove plus an
//! Add. Classification comes from the policy table alone.

use crate::model::ConfigurationModel;
use declarative::{ChangeEntry, ChangeKind, ChangeSet, Domain, PolicyTable};
use serde::Serialize;
use std::collections::BTreeMap;

/// Compute the classified differences from `old` to `new`
pub fn diff(
    old: &ConfigurationModel,
    new: &ConfigurationModel,
    policy: &PolicyTable,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    diff_field(
        &mut changes,
        policy,
        Domain::Identity,
        "hostname",
        &old.identity.hostname,
        &new.identity.hostname,
    );
    diff_field(
        &mut changes,
        policy,
        Domain::Identity,
        "timezone",
        &old.identity.timezone,
        &new.identity.timezone,
    );
    diff_field(
        &mut changes,
        policy,
        Domain::Identity,
        "locale",
        &old.identity.locale,
        &new.identity.locale,
    );
    diff_optional_field(
        &mut changes,
        policy,
        Domain::Identity,
        "pretty_name",
        old.identity.pretty_name.as_deref(),
        new.identity.pretty_name.as_deref(),
    );

    diff_keyed(
        &mut changes,
        policy,
        Domain::Repositories,
        &old.repositories,
        &new.repositories,
        |r| &r.name,
    );
    diff_keyed(
        &mut changes,
        policy,
        Domain::Packages,
        &old.packages,
        &new.packages,
        |p| &p.name,
    );
    diff_keyed(&mut changes, policy, Domain::Users, &old.users, &new.users, |u| {
        &u.name
    });
    diff_keyed(
        &mut changes,
        policy,
        Domain::Services,
        &old.services,
        &new.services,
        |s| &s.name,
    );

    diff_field(
        &mut changes,
        policy,
        Domain::Network,
        "dns",
        &old.network.dns.join(","),
        &new.network.dns.join(","),
    );
    diff_keyed_with(
        &mut changes,
        policy,
        Domain::Network,
        &old.network.interfaces,
        &new.network.interfaces,
        |i| &i.name,
        |name| format!("interface:{name}"),
    );

    diff_field(
        &mut changes,
        policy,
        Domain::Security,
        "selinux",
        old.security.selinux.as_str(),
        new.security.selinux.as_str(),
    );
    diff_field(
        &mut changes,
        policy,
        Domain::Security,
        "firewall_enabled",
        &old.security.firewall_enabled.to_string(),
        &new.security.firewall_enabled.to_string(),
    );
    diff_field(
        &mut changes,
        policy,
        Domain::Security,
        "ssh_password_auth",
        &old.security.ssh_password_auth.to_string(),
        &new.security.ssh_password_auth.to_string(),
    );

    diff_keyed_with(
        &mut changes,
        policy,
        Domain::Storage,
        &old.storage.mounts,
        &new.storage.mounts,
        |m| &m.mount_point,
        |point| format!("mount:{point}"),
    );

    diff_field(
        &mut changes,
        policy,
        Domain::Desktop,
        "environment",
        old.desktop.environment.as_str(),
        new.desktop.environment.as_str(),
    );
    diff_optional_field(
        &mut changes,
        policy,
        Domain::Desktop,
        "theme",
        old.desktop.theme.as_deref(),
        new.desktop.theme.as_deref(),
    );

    diff_field(
        &mut changes,
        policy,
        Domain::Boot,
        "kernel_params",
        &old.boot.kernel_params.join(" "),
        &new.boot.kernel_params.join(" "),
    );
    diff_field(
        &mut changes,
        policy,
        Domain::Boot,
        "timeout_secs",
        &old.boot.timeout_secs.to_string(),
        &new.boot.timeout_secs.to_string(),
    );
    diff_optional_field(
        &mut changes,
        policy,
        Domain::Boot,
        "default_entry",
        old.boot.default_entry.as_deref(),
        new.boot.default_entry.as_deref(),
    );

    diff_keyed(
        &mut changes,
        policy,
        Domain::Automation,
        &old.automation,
        &new.automation,
        |w| &w.name,
    );

    changes
}

fn entry(
    policy: &PolicyTable,
    domain: Domain,
    key: String,
    kind: ChangeKind,
    old: Option<String>,
    new: Option<String>,
) -> ChangeEntry {
    ChangeEntry {
        domain,
        key,
        kind,
        old,
        new,
        classification: policy.classify(domain),
        critical: policy.is_critical(domain),
    }
}

fn diff_field(
    changes: &mut ChangeSet,
    policy: &PolicyTable,
    domain: Domain,
    key: &str,
    old: &str,
    new: &str,
) {
    if old != new {
        changes.push(entry(
            policy,
            domain,
            key.to_string(),
            ChangeKind::Modified,
            Some(old.to_string()),
            Some(new.to_string()),
        ));
    }
}

fn diff_optional_field(
    changes: &mut ChangeSet,
    policy: &PolicyTable,
    domain: Domain,
    key: &str,
    old: Option<&str>,
    new: Option<&str>,
) {
    let kind = match (old, new) {
        (None, Some(_)) => ChangeKind::Added,
        (Some(_), None) => ChangeKind::Removed,
        (Some(a), Some(b)) if a != b => ChangeKind::Modified,
        _ => return,
    };
    changes.push(entry(
        policy,
        domain,
        key.to_string(),
        kind,
        old.map(ToString::to_string),
        new.map(ToString::to_string),
    ));
}

fn diff_keyed<T: PartialEq + Serialize>(
    changes: &mut ChangeSet,
    policy: &PolicyTable,
    domain: Domain,
    old_items: &[T],
    new_items: &[T],
    key: impl Fn(&T) -> &str,
) {
    diff_keyed_with(changes, policy, domain, old_items, new_items, key, |k| {
        k.to_string()
    });
}

fn diff_keyed_with<T: PartialEq + Serialize>(
    changes: &mut ChangeSet,
    policy: &PolicyTable,
    domain: Domain,
    old_items: &[T],
    new_items: &[T],
    key: impl Fn(&T) -> &str,
    entry_key: impl Fn(&str) -> String,
) {
    let old_by_key: BTreeMap<&str, &T> = old_items.iter().map(|item| (key(item), item)).collect();
    let new_by_key: BTreeMap<&str, &T> = new_items.iter().map(|item| (key(item), item)).collect();

    for item in new_items {
        let k = key(item);
        match old_by_key.get(k) {
            None => changes.push(entry(
                policy,
                domain,
                entry_key(k),
                ChangeKind::Added,
                None,
                Some(render(item)),
            )),
            Some(previous) if *previous != item => changes.push(entry(
                policy,
                domain,
                entry_key(k),
                ChangeKind::Modified,
                Some(render(*previous)),
                Some(render(item)),
            )),
            Some(_) => {}
        }
    }

    for item in old_items {
        let k = key(item);
        if !new_by_key.contains_key(k) {
            changes.push(entry(
                policy,
                domain,
                entry_key(k),
                ChangeKind::Removed,
                Some(render(item)),
                None,
            ));
        }
    }
}

/// Compact rendering of an entity for reporting
fn render<T: Serialize>(item: &T) -> String {
    serde_json::to_string(item).unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
