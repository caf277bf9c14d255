//! Theme and font settings delivered by the host.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BODY_FONT: &str = "San Francisco";
pub const DEFAULT_CODE_FONT: &str = "SF Mono";

/// Name older hosts used for the platform default body font.
const LEGACY_SYSTEM_FONT: &str = "System Default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Follow the host's color scheme.
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn is_dark(self, system_prefers_dark: bool) -> bool {
        match self {
            Self::System => system_prefers_dark,
            Self::Light => false,
            Self::Dark => true,
        }
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("unknown theme `{other}`, expected system, light or dark")),
        }
    }
}

/// Settings payload as hosts send it, including the legacy `font` key.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    theme: Option<ThemeMode>,
    #[serde(alias = "body-font")]
    body_font: Option<String>,
    #[serde(alias = "body-font-size")]
    body_font_size: Option<u32>,
    #[serde(alias = "code-font")]
    code_font: Option<String>,
    #[serde(alias = "code-font-size")]
    code_font_size: Option<u32>,
    font: Option<String>,
}

/// Display settings applied around every render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSettings")]
pub struct Settings {
    pub theme: ThemeMode,
    pub body_font: String,
    /// Pixels; `None` keeps the stylesheet default.
    pub body_font_size: Option<u32>,
    pub code_font: String,
    pub code_font_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: ThemeMode::System,
            body_font: DEFAULT_BODY_FONT.to_string(),
            body_font_size: None,
            code_font: DEFAULT_CODE_FONT.to_string(),
            code_font_size: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        let legacy_font = non_empty(raw.font).map(|font| {
            if font == LEGACY_SYSTEM_FONT {
                DEFAULT_BODY_FONT.to_string()
            } else {
                font
            }
        });

        Self {
            theme: raw.theme.unwrap_or_default(),
            body_font: non_empty(raw.body_font)
                .or(legacy_font)
                .unwrap_or_else(|| DEFAULT_BODY_FONT.to_string()),
            body_font_size: raw.body_font_size.filter(|size| *size > 0),
            code_font: non_empty(raw.code_font).unwrap_or_else(|| DEFAULT_CODE_FONT.to_string()),
            code_font_size: raw.code_font_size.filter(|size| *size > 0),
        }
    }
}

/// Quote a font family for CSS, dropping characters that could end the
/// declaration or open a comment.
fn css_font_family(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !matches!(c, '"' | '\\' | ';' | '{' | '}' | '<' | '>' | '/' | '*') && !c.is_control()
        })
        .collect();
    format!("\"{}\"", cleaned.trim())
}

impl Settings {
    /// `:root` custom properties for the page.
    ///
    /// # Example
    ///
    /// ```
    /// use markpane_core::Settings;
    ///
    /// let css = Settings::default().css_variables();
    /// assert!(css.contains("--body-font: \"San Francisco\", -apple-system, sans-serif;"));
    /// ```
    pub fn css_variables(&self) -> String {
        let mut css = String::from(":root {\n");
        css.push_str(&format!(
            "  --body-font: {}, -apple-system, sans-serif;\n",
            css_font_family(&self.body_font)
        ));
        css.push_str(&format!(
            "  --code-font: {}, ui-monospace, monospace;\n",
            css_font_family(&self.code_font)
        ));
        if let Some(size) = self.body_font_size {
            css.push_str(&format!("  --body-font-size: {size}px;\n"));
        }
        if let Some(size) = self.code_font_size {
            css.push_str(&format!("  --code-font-size: {size}px;\n"));
        }
        css.push('}');
        css
    }
}
