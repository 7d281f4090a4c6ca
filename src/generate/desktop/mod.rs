//! Desktop personality strategies
//!
//! The desktop environment is a closed tagged variant; each variant gets
//! its own strategy module behind the common [`DesktopProfile`] interface.
//! Emitters consume the profile, never the variant directly.

use crate::model::DesktopEnvironment;

pub mod kde;
pub mod macos;
pub mod windows11;

/// What a desktop variant contributes to the generated artifacts
pub trait DesktopProfile: Send + Sync {
    /// Session name used in scripts and docs
    fn session(&self) -> &'static str;

    /// Packages the variant needs installed
    fn packages(&self) -> &'static [&'static str];

    /// Display manager service to enable
    fn display_manager(&self) -> &'static str;

    /// Extra setup lines for the desktop script, in order
    fn setup_lines(&self, theme: Option<&str>) -> Vec<String>;
}

/// Resolve the strategy for a variant; headless hosts have none
pub fn profile(environment: DesktopEnvironment) -> Option<Box<dyn DesktopProfile>> {
    match environment {
        DesktopEnvironment::Headless => None,
        DesktopEnvironment::Kde => Some(Box::new(kde::KdeProfile)),
        DesktopEnvironment::Windows11 => Some(Box::new(windows11::Windows11Profile)),
        DesktopEnvironment::Macos => Some(Box::new(macos::MacosProfile)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_has_no_profile() {
        assert!(profile(DesktopEnvironment::Headless).is_none());
    }

    #[test]
    fn test_every_variant_has_a_display_manager() {
        for env in [
            DesktopEnvironment::Kde,
            DesktopEnvironment::Windows11,
            DesktopEnvironment::Macos,
        ] {
            let profile = profile(env).unwrap();
            assert!(!profile.display_manager().is_empty());
            assert!(!profile.packages().is_empty());
        }
    }
}
