//! macOS style personality
//!
//! GNOME with a dock and global-menu layout.

use super::DesktopProfile;

pub struct MacosProfile;

impl DesktopProfile for MacosProfile {
    fn session(&self) -> &'static str {
        "gnome-macos"
    }

    fn packages(&self) -> &'static [&'static str] {
        &[
            "gnome-shell",
            "gnome-tweaks",
            "gnome-shell-extension-dash-to-dock",
            "gdm",
        ]
    }

    fn display_manager(&self) -> &'static str {
        "gdm"
    }

    fn setup_lines(&self, theme: Option<&str>) -> Vec<String> {
        let mut lines = vec![
            "systemctl set-default graphical.target".to_string(),
            "gnome-extensions enable dash-to-dock@micxgx.gmail.com || true".to_string(),
        ];
        if let Some(theme) = theme {
            lines.push(format!(
                "gsettings set org.gnome.desktop.interface gtk-theme '{theme}' || true"
            ));
        }
        lines
    }
}
