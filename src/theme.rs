use std::fs;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;
use tracing::warn;

use crate::config::BadgeStyle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub bg: Color,
    pub panel_bg: Color,
    pub highlight_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub active_fg: Color,
    pub success_fg: Color,
    pub info_fg: Color,
    pub warning_fg: Color,
    pub error_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            bg: Color::Rgb(30, 30, 30),
            panel_bg: Color::Rgb(44, 44, 44),
            highlight_bg: Color::Rgb(62, 68, 82),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(150, 150, 150),
            active_fg: Color::Rgb(255, 255, 255),
            success_fg: Color::Rgb(120, 200, 120),
            info_fg: Color::Rgb(110, 170, 230),
            warning_fg: Color::Rgb(230, 190, 90),
            error_fg: Color::Rgb(230, 100, 100),
        }
    }

    pub fn light() -> Self {
        Self {
            bg: Color::Rgb(250, 250, 250),
            panel_bg: Color::Rgb(238, 238, 238),
            highlight_bg: Color::Rgb(205, 220, 240),
            status_bg: Color::Rgb(225, 225, 225),
            text_fg: Color::Rgb(30, 30, 30),
            muted_fg: Color::Rgb(110, 110, 110),
            active_fg: Color::Rgb(0, 0, 0),
            success_fg: Color::Rgb(30, 130, 50),
            info_fg: Color::Rgb(30, 90, 170),
            warning_fg: Color::Rgb(170, 110, 0),
            error_fg: Color::Rgb(190, 40, 40),
        }
    }

    /// `"dark"`, `"light"`, or a theme file path relative to `config_dir`.
    pub fn resolve(name: &str, config_dir: &Path) -> Self {
        match name.trim() {
            "" | "dark" => Self::dark(),
            "light" => Self::light(),
            path => Self::load_or_default(config_dir.join(path)),
        }
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    warn!(path = %path_ref.display(), error = %err, "failed to parse theme file, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path_ref.display(), error = %err, "failed to read theme file, using defaults");
                Self::default()
            }
        }
    }

    /// Colors missing from the file fall back to the preset named by `base`.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let base = match cfg.base.as_deref() {
            Some("light") => Self::light(),
            _ => Self::dark(),
        };
        let colors = cfg.colors;
        let pick = |value: Option<RgbToml>, fallback: Color| value.map_or(fallback, |rgb| rgb.to_color());
        Ok(Self {
            bg: pick(colors.bg, base.bg),
            panel_bg: pick(colors.panel_bg, base.panel_bg),
            highlight_bg: pick(colors.highlight_bg, base.highlight_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            active_fg: pick(colors.active_fg, base.active_fg),
            success_fg: pick(colors.success_fg, base.success_fg),
            info_fg: pick(colors.info_fg, base.info_fg),
            warning_fg: pick(colors.warning_fg, base.warning_fg),
            error_fg: pick(colors.error_fg, base.error_fg),
        })
    }

    pub fn badge_color(&self, style: BadgeStyle) -> Color {
        match style {
            BadgeStyle::Success => self.success_fg,
            BadgeStyle::Info => self.info_fg,
            BadgeStyle::Warning => self.warning_fg,
            BadgeStyle::Error => self.error_fg,
            BadgeStyle::Muted => self.muted_fg,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    base: Option<String>,
    #[serde(default)]
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
struct ThemeColorsToml {
    bg: Option<RgbToml>,
    panel_bg: Option<RgbToml>,
    highlight_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    active_fg: Option<RgbToml>,
    success_fg: Option<RgbToml>,
    info_fg: Option<RgbToml>,
    warning_fg: Option<RgbToml>,
    error_fg: Option<RgbToml>,
}

#[derive(Debug, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(&self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
