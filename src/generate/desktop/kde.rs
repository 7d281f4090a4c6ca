//! KDE Plasma personality

use super::DesktopProfile;

pub struct KdeProfile;

impl DesktopProfile for KdeProfile {
    fn session(&self) -> &'static str {
        "plasma"
    }

    fn packages(&self) -> &'static [&'static str] {
        &[
            "plasma-desktop",
            "plasma-workspace",
            "konsole",
            "dolphin",
            "sddm",
        ]
    }

    fn display_manager(&self) -> &'static str {
        "sddm"
    }

    fn setup_lines(&self, theme: Option<&str>) -> Vec<String> {
        let mut lines = vec![
            "systemctl set-default graphical.target".to_string(),
        ];
        if let Some(theme) = theme {
            lines.push(format!("lookandfeeltool --apply '{theme}' || true"));
        }
        lines
    }
}
