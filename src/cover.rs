//! Cover-page generator: themed markup blocks prepended to the HTML buffer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverTheme {
    #[default]
    Modern,
    Light,
    Gradient,
    Minimal,
}

impl CoverTheme {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modern" => Some(CoverTheme::Modern),
            "light" => Some(CoverTheme::Light),
            "gradient" => Some(CoverTheme::Gradient),
            "minimal" => Some(CoverTheme::Minimal),
            _ => None,
        }
    }
}

impl std::fmt::Display for CoverTheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CoverTheme::Modern => "modern",
            CoverTheme::Light => "light",
            CoverTheme::Gradient => "gradient",
            CoverTheme::Minimal => "minimal",
        };
        write!(f, "{s}")
    }
}

/// Text shown on the cover. Blank fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverPage {
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

impl CoverPage {
    pub const DEFAULT_TITLE: &'static str = "My Project";
    pub const DEFAULT_SUBTITLE: &'static str = "A Web Application";

    /// Build a cover, substituting defaults for blank fields.
    pub fn new(title: &str, subtitle: &str, author: &str, default_author: &str) -> Self {
        fn or_default(value: &str, fallback: &str) -> String {
            if value.trim().is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        }
        Self {
            title: or_default(title, Self::DEFAULT_TITLE),
            subtitle: or_default(subtitle, Self::DEFAULT_SUBTITLE),
            author: or_default(author, default_author),
        }
    }

    /// Markup for the given theme. Values are inserted verbatim.
    pub fn render(&self, theme: CoverTheme) -> String {
        let (background, color, heading, sub, rule, footer) = match theme {
            CoverTheme::Modern => (
                "linear-gradient(135deg, #1a1a2e 0%, #16213e 100%)",
                "white",
                "font-size: 3em; margin-bottom: 20px; color: #00bfff;",
                "font-size: 1.5em; color: #a0a0a0; margin-bottom: 40px;",
                "1px solid rgba(255,255,255,0.1)",
                "color: #666;",
            ),
            CoverTheme::Light => (
                "white",
                "#333",
                "font-size: 3em; margin-bottom: 20px; color: #0078d4;",
                "font-size: 1.5em; color: #666; margin-bottom: 40px;",
                "2px solid #0078d4",
                "color: #999;",
            ),
            CoverTheme::Gradient => (
                "linear-gradient(135deg, #667eea 0%, #764ba2 100%)",
                "white",
                "font-size: 3.5em; margin-bottom: 20px; text-shadow: 0 4px 20px rgba(0,0,0,0.3);",
                "font-size: 1.8em; margin-bottom: 40px; opacity: 0.9;",
                "1px solid rgba(255,255,255,0.3)",
                "opacity: 0.7;",
            ),
            CoverTheme::Minimal => return self.render_minimal(),
        };
        format!(
            r#"<!-- Cover Page -->
<div style="min-height: 100vh; display: flex; align-items: center; justify-content: center; background: {background}; color: {color}; padding: 40px; text-align: center;">
    <div style="max-width: 800px;">
        <h1 style="{heading}">{title}</h1>
        <p style="{sub}">{subtitle}</p>
        <div style="margin-top: 60px; padding-top: 40px; border-top: {rule};">
            <p style="{footer}">Developed by {author}</p>
        </div>
    </div>
</div>
"#,
            title = self.title,
            subtitle = self.subtitle,
            author = self.author,
        )
    }

    fn render_minimal(&self) -> String {
        format!(
            r#"<!-- Cover Page -->
<div style="min-height: 100vh; display: flex; align-items: center; justify-content: center; background: #f5f5f5; color: #333; padding: 40px; text-align: center;">
    <div style="max-width: 600px;">
        <h1 style="font-size: 2.5em; margin-bottom: 10px; font-weight: 300; letter-spacing: 2px;">{title}</h1>
        <p style="font-size: 1em; color: #999; margin-bottom: 50px; letter-spacing: 1px;">{subtitle}</p>
        <p style="color: #666; font-size: 0.9em;">{author}</p>
    </div>
</div>
"#,
            title = self.title,
            subtitle = self.subtitle.to_uppercase(),
            author = self.author,
        )
    }
}
