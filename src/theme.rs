use ratatui::style::Color;
use tracing::warn;

pub const DEFAULT_THEME: &str = "default";

/// Colours used by every panel of the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub bg: Color,
    pub panel_bg: Color,
    pub panel_focused_bg: Color,
    pub panel_selected_bg: Color,
    pub border_idle: Color,
    pub border_focused: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub text_disabled: Color,
    pub accent: Color,
    pub like: Color,
    pub success: Color,
    pub error: Color,
}

impl Palette {
    pub const DARK: Palette = Palette {
        bg: Color::Rgb(30, 30, 46),
        panel_bg: Color::Rgb(24, 24, 36),
        panel_focused_bg: Color::Rgb(49, 50, 68),
        panel_selected_bg: Color::Rgb(69, 71, 90),
        border_idle: Color::Rgb(49, 50, 68),
        border_focused: Color::Rgb(137, 180, 250),
        text_primary: Color::Rgb(205, 214, 244),
        text_secondary: Color::Rgb(166, 173, 200),
        text_disabled: Color::Rgb(108, 112, 134),
        accent: Color::Rgb(137, 180, 250),
        like: Color::Rgb(243, 139, 168),
        success: Color::Rgb(166, 227, 161),
        error: Color::Rgb(243, 139, 168),
    };

    pub const LIGHT: Palette = Palette {
        bg: Color::Rgb(239, 241, 245),
        panel_bg: Color::Rgb(230, 233, 239),
        panel_focused_bg: Color::Rgb(204, 208, 218),
        panel_selected_bg: Color::Rgb(188, 192, 204),
        border_idle: Color::Rgb(172, 176, 190),
        border_focused: Color::Rgb(30, 102, 245),
        text_primary: Color::Rgb(76, 79, 105),
        text_secondary: Color::Rgb(92, 95, 119),
        text_disabled: Color::Rgb(140, 143, 161),
        accent: Color::Rgb(30, 102, 245),
        like: Color::Rgb(210, 15, 57),
        success: Color::Rgb(64, 160, 43),
        error: Color::Rgb(210, 15, 57),
    };

    /// Sticks to the 16 basic colours for terminals without truecolor.
    pub const MONO: Palette = Palette {
        bg: Color::Reset,
        panel_bg: Color::Reset,
        panel_focused_bg: Color::DarkGray,
        panel_selected_bg: Color::DarkGray,
        border_idle: Color::Gray,
        border_focused: Color::White,
        text_primary: Color::White,
        text_secondary: Color::Gray,
        text_disabled: Color::DarkGray,
        accent: Color::Cyan,
        like: Color::Red,
        success: Color::Green,
        error: Color::Red,
    };

    pub fn named(name: &str) -> Option<Palette> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "dark" => Some(Self::DARK),
            "light" => Some(Self::LIGHT),
            "mono" | "ansi" => Some(Self::MONO),
            _ => None,
        }
    }

    /// Resolves the configured theme, falling back to the dark palette.
    pub fn from_theme(name: &str) -> Palette {
        Self::named(name).unwrap_or_else(|| {
            warn!(theme = %name, "unknown theme; using default");
            Self::DARK
        })
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::DARK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!(Palette::named("Light"), Some(Palette::LIGHT));
        assert_eq!(Palette::named(" mono "), Some(Palette::MONO));
        assert_eq!(Palette::named(DEFAULT_THEME), Some(Palette::DARK));
        assert_eq!(Palette::named("dracula"), None);
    }

    #[test]
    fn unknown_theme_falls_back_to_dark() {
        assert_eq!(Palette::from_theme("dracula"), Palette::DARK);
        assert_eq!(Palette::from_theme("light").bg, Color::Rgb(239, 241, 245));
    }
}
