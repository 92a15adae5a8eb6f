//! crates/reading_session_core/src/settings.rs
//!
//! Display preferences for the reader and the stylesheet derived from them.
//!
//! Every setting is a validated value drawn from a fixed set of options, so a
//! `ReaderSettings` is always complete and always renderable. The serialized
//! shape matches the record browsers keep under the `reader_settings` key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const FONT_SIZE_OPTIONS: [u8; 6] = [14, 16, 18, 20, 22, 24];

pub const LINE_HEIGHT_OPTIONS: [f64; 4] = [1.4, 1.6, 1.8, 2.0];

pub const FONT_OPTIONS: [FontFamily; 6] = FontFamily::ALL;

/// Raised when a value falls outside the supported options.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Unsupported font size: {0}px")]
    FontSize(u8),
    #[error("Unsupported line height: {0}")]
    LineHeight(f64),
    #[error("Unsupported font family: {0}")]
    FontFamily(String),
    #[error("Unsupported theme: {0}")]
    Theme(String),
}

//=========================================================================================
// Individual Settings
//=========================================================================================

/// Body text size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FontSize(u8);

impl FontSize {
    pub const DEFAULT: FontSize = FontSize(18);

    pub fn new(px: u8) -> Result<Self, SettingsError> {
        if FONT_SIZE_OPTIONS.contains(&px) {
            Ok(Self(px))
        } else {
            Err(SettingsError::FontSize(px))
        }
    }

    pub fn px(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for FontSize {
    type Error = SettingsError;

    fn try_from(px: u8) -> Result<Self, Self::Error> {
        Self::new(px)
    }
}

impl From<FontSize> for u8 {
    fn from(size: FontSize) -> Self {
        size.0
    }
}

/// Line height as a multiple of the font size, kept in tenths so that values
/// compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct LineHeight(u8);

impl LineHeight {
    pub const DEFAULT: LineHeight = LineHeight(16);

    pub fn new(value: f64) -> Result<Self, SettingsError> {
        if !value.is_finite() || !(1.0..=3.0).contains(&value) {
            return Err(SettingsError::LineHeight(value));
        }
        let scaled = value * 10.0;
        let tenths = scaled.round();
        if (scaled - tenths).abs() > 1e-6 {
            return Err(SettingsError::LineHeight(value));
        }
        let tenths = tenths as u8;
        let supported = LINE_HEIGHT_OPTIONS
            .iter()
            .any(|option| (option * 10.0).round() as u8 == tenths);
        if supported {
            Ok(Self(tenths))
        } else {
            Err(SettingsError::LineHeight(value))
        }
    }

    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn value(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl TryFrom<f64> for LineHeight {
    type Error = SettingsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LineHeight> for f64 {
    fn from(height: LineHeight) -> Self {
        height.value()
    }
}

impl fmt::Display for LineHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// The typefaces offered in the settings panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Georgia,
    #[serde(rename = "EB Garamond")]
    EbGaramond,
    #[serde(rename = "Crimson Pro")]
    CrimsonPro,
    #[serde(rename = "Libre Baskerville")]
    LibreBaskerville,
    Arial,
    #[serde(rename = "Times New Roman")]
    TimesNewRoman,
}

impl FontFamily {
    pub const ALL: [FontFamily; 6] = [
        FontFamily::Georgia,
        FontFamily::EbGaramond,
        FontFamily::CrimsonPro,
        FontFamily::LibreBaskerville,
        FontFamily::Arial,
        FontFamily::TimesNewRoman,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FontFamily::Georgia => "Georgia",
            FontFamily::EbGaramond => "EB Garamond",
            FontFamily::CrimsonPro => "Crimson Pro",
            FontFamily::LibreBaskerville => "Libre Baskerville",
            FontFamily::Arial => "Arial",
            FontFamily::TimesNewRoman => "Times New Roman",
        }
    }
}

impl FromStr for FontFamily {
    type Err = SettingsError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.name() == name)
            .ok_or_else(|| SettingsError::FontFamily(name.to_string()))
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Page colour scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Sepia,
    Dark,
}

/// Background and text colour pair for a theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeColors {
    pub background: &'static str,
    pub color: &'static str,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Light, Theme::Sepia, Theme::Dark];

    pub fn colors(self) -> ThemeColors {
        match self {
            Theme::Light => ThemeColors {
                background: "#ffffff",
                color: "#000000",
            },
            // Parchment background with the site's primary ink colour.
            Theme::Sepia => ThemeColors {
                background: "#f5f1e8",
                color: "#2c1810",
            },
            Theme::Dark => ThemeColors {
                background: "#1a1a1a",
                color: "#e0e0e0",
            },
        }
    }

    pub fn link_color(self) -> &'static str {
        match self {
            Theme::Dark => "#60a5fa",
            Theme::Light | Theme::Sepia => "#3b82f6",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Sepia => "sepia",
            Theme::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = SettingsError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|theme| theme.name() == name)
            .ok_or_else(|| SettingsError::Theme(name.to_string()))
    }
}

//=========================================================================================
// ReaderSettings
//=========================================================================================

/// A complete set of display preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSettings {
    pub font_size: FontSize,
    pub font_family: FontFamily,
    pub line_height: LineHeight,
    pub theme: Theme,
}

impl Default for ReaderSettings {
    /// Serif type on sepia, tuned for long-form prose.
    fn default() -> Self {
        Self {
            font_size: FontSize::DEFAULT,
            font_family: FontFamily::Georgia,
            line_height: LineHeight::DEFAULT,
            theme: Theme::Sepia,
        }
    }
}

impl ReaderSettings {
    /// Overlays a persisted record on top of `self`, one field at a time.
    ///
    /// Unknown keys and values outside the supported options are skipped, so
    /// the result is always fully populated.
    pub fn merged_with(mut self, stored: &Value) -> Self {
        let Some(fields) = stored.as_object() else {
            warn!("Persisted reader settings are not a JSON object; ignoring them.");
            return self;
        };

        for (key, value) in fields {
            let applied = match key.as_str() {
                "fontSize" => serde_json::from_value::<FontSize>(value.clone())
                    .map(|font_size| self.font_size = font_size),
                "fontFamily" => serde_json::from_value::<FontFamily>(value.clone())
                    .map(|font_family| self.font_family = font_family),
                "lineHeight" => serde_json::from_value::<LineHeight>(value.clone())
                    .map(|line_height| self.line_height = line_height),
                "theme" => serde_json::from_value::<Theme>(value.clone())
                    .map(|theme| self.theme = theme),
                _ => {
                    debug!(field = %key, "Ignoring unknown reader setting.");
                    continue;
                }
            };
            if let Err(e) = applied {
                warn!(field = %key, error = %e, "Ignoring invalid persisted reader setting.");
            }
        }
        self
    }
}

//=========================================================================================
// DisplayStyle
//=========================================================================================

/// The stylesheet a rendering engine applies as the document's default theme.
///
/// Engines replace their default style wholesale with this value, never merge
/// into it, so applying the same style twice leaves the same result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayStyle {
    pub background: &'static str,
    pub color: &'static str,
    pub font_size_px: u8,
    pub font_family: FontFamily,
    pub line_height: LineHeight,
    pub paragraph_margin: &'static str,
    pub link_color: &'static str,
}

impl DisplayStyle {
    pub fn from_settings(settings: &ReaderSettings) -> Self {
        let colors = settings.theme.colors();
        Self {
            background: colors.background,
            color: colors.color,
            font_size_px: settings.font_size.px(),
            font_family: settings.font_family,
            line_height: settings.line_height,
            paragraph_margin: "0.5em",
            link_color: settings.theme.link_color(),
        }
    }

    pub fn to_css(&self) -> String {
        format!(
            "body {{ background: {}; color: {}; font-size: {}px; font-family: \"{}\"; line-height: {}; }}\n\
             p {{ margin-top: {margin}; margin-bottom: {margin}; }}\n\
             a {{ color: {}; }}\n",
            self.background,
            self.color,
            self.font_size_px,
            self.font_family,
            self.line_height,
            self.link_color,
            margin = self.paragraph_margin,
        )
    }
}
