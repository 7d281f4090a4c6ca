//! Windows 11 style personality
//!
//! A KDE base skinned to a centered-taskbar, rounded-corner layout.

use super::DesktopProfile;

pub struct Windows11Profile;

impl DesktopProfile for Windows11Profile {
    fn session(&self) -> &'static str {
        "plasma-win11"
    }

    fn packages(&self) -> &'static [&'static str] {
        &[
            "plasma-desktop",
            "plasma-workspace",
            "latte-dock",
            "kvantum",
            "sddm",
        ]
    }

    fn display_manager(&self) -> &'static str {
        "sddm"
    }

    fn setup_lines(&self, theme: Option<&str>) -> Vec<String> {
        let mut lines = vec![
            "systemctl set-default graphical.target".to_string(),
            "lookandfeeltool --apply 'com.github.win11-shell' || true".to_string(),
        ];
        if let Some(theme) = theme {
            lines.push(format!("kvantummanager --set '{theme}' || true"));
        }
        lines
    }
}
