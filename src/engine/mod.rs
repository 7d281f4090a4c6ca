//! Reconciliation engine
//!
//! 1. Diffing - compute a classified change set between two models
//! 2. Ordering - fixed cross-domain dependency stages
//! 3. Applying - the live handler drives host managers through a runner

pub mod differ;
pub mod generation;
pub mod handlers;

use declarative::Domain;

pub use differ::diff;
pub use handlers::LiveChangeHandler;

/// Cross-domain apply order
///
/// Repositories before the packages that come from them, packages before
/// the services that need their binaries, users before the services that
/// run as them. Domains sharing a stage are independent and may interleave
/// in the worker pool.
pub fn apply_stages() -> Vec<Vec<Domain>> {
    vec![
        vec![Domain::Identity],
        vec![Domain::Repositories],
        vec![Domain::Packages],
        vec![Domain::Users],
        vec![Domain::Network, Domain::Security],
        vec![Domain::Services, Domain::Automation],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_has_repos_before_packages_before_services() {
        let stages = apply_stages();
        let position = |domain: Domain| {
            stages
                .iter()
                .position(|stage| stage.contains(&domain))
                .unwrap()
        };

        assert!(position(Domain::Repositories) < position(Domain::Packages));
        assert!(position(Domain::Packages) < position(Domain::Services));
        assert!(position(Domain::Users) < position(Domain::Services));
    }
}
