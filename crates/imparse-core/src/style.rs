// SPDX-License-Identifier: AGPL-3.0-or-later
//! Style configuration consumed by the HTML renderer and the height estimator
//!
//! A configuration is a flat set of named slots. Hosts send it as JSON (or ship
//! it as a TOML theme file); any slot they leave out takes the value of the
//! light preset.

use crate::traits::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Visual parameters for rendering. Colors are CSS color strings, sizes are px.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Base font size
    pub font_size: f32,
    /// Code font size
    pub code_font_size: f32,
    pub font_family: String,
    pub code_font_family: String,
    pub text_color: String,
    pub background_color: String,
    pub link_color: String,
    pub code_background_color: String,
    pub code_text_color: String,
    /// h1..h6; missing entries fall back to `text_color`
    pub heading_colors: Vec<String>,
    pub paragraph_spacing: f32,
    pub list_item_spacing: f32,
    pub code_block_padding: f32,
    pub code_block_border_radius: f32,
    pub table_cell_padding: f32,
    pub table_border_color: String,
    pub table_header_background: String,
    pub blockquote_border_width: f32,
    pub blockquote_border_color: String,
    pub blockquote_text_color: String,
    pub image_border_radius: f32,
    pub image_margin: f32,
    pub mention_background: String,
    pub mention_text_color: String,
    pub hr_color: String,
    /// Line height multiplier
    pub line_height: f32,
    /// 0 disables the limit
    pub max_content_width: f32,
    pub content_padding: f32,
    pub diagram_text_color: String,
    pub diagram_background_color: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            code_font_size: 14.0,
            font_family: "-apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif".to_string(),
            code_font_family: "'SF Mono', Monaco, Consolas, 'Courier New', monospace".to_string(),
            text_color: "#333333".to_string(),
            background_color: "#ffffff".to_string(),
            link_color: "#007AFF".to_string(),
            code_background_color: "#f4f4f4".to_string(),
            code_text_color: "#333333".to_string(),
            heading_colors: vec!["#333333".to_string(); 6],
            paragraph_spacing: 16.0,
            list_item_spacing: 8.0,
            code_block_padding: 16.0,
            code_block_border_radius: 8.0,
            table_cell_padding: 8.0,
            table_border_color: "#dddddd".to_string(),
            table_header_background: "#f4f4f4".to_string(),
            blockquote_border_width: 4.0,
            blockquote_border_color: "#dddddd".to_string(),
            blockquote_text_color: "#666666".to_string(),
            image_border_radius: 8.0,
            image_margin: 16.0,
            mention_background: "#E3F2FD".to_string(),
            mention_text_color: "#1976D2".to_string(),
            hr_color: "#dddddd".to_string(),
            line_height: 1.6,
            max_content_width: 800.0,
            content_padding: 20.0,
            diagram_text_color: "#333333".to_string(),
            diagram_background_color: "#ffffff".to_string(),
        }
    }
}

impl StyleConfig {
    /// Dark preset
    pub fn dark() -> Self {
        Self {
            text_color: "#f2f2f7".to_string(),
            background_color: "#1c1c1e".to_string(),
            link_color: "#0A84FF".to_string(),
            code_background_color: "#2c2c2e".to_string(),
            code_text_color: "#f2f2f7".to_string(),
            heading_colors: vec!["#f2f2f7".to_string(); 6],
            table_border_color: "#3a3a3c".to_string(),
            table_header_background: "#2c2c2e".to_string(),
            blockquote_border_color: "#3a3a3c".to_string(),
            blockquote_text_color: "#a1a1a6".to_string(),
            mention_background: "#1e3a5f".to_string(),
            mention_text_color: "#64b5f6".to_string(),
            hr_color: "#3a3a3c".to_string(),
            diagram_text_color: "#f2f2f7".to_string(),
            diagram_background_color: "#1c1c1e".to_string(),
            ..Default::default()
        }
    }

    /// Parse a full or partial JSON override
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::StyleConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an optional override: absent means the light preset
    pub fn resolve(json: Option<&str>) -> Result<Self> {
        match json {
            Some(json) => Self::from_json(json),
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML theme file body
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EngineError::StyleConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML theme file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Color for heading `level` (1-based)
    pub fn heading_color(&self, level: u8) -> &str {
        let index = usize::from(level.clamp(1, 6)) - 1;
        self.heading_colors
            .get(index)
            .map(String::as_str)
            .unwrap_or(&self.text_color)
    }

    /// Reject values that cannot be spliced safely into inline `style` attributes
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("font_size", self.font_size),
            ("code_font_size", self.code_font_size),
            ("paragraph_spacing", self.paragraph_spacing),
            ("list_item_spacing", self.list_item_spacing),
            ("code_block_padding", self.code_block_padding),
            ("code_block_border_radius", self.code_block_border_radius),
            ("table_cell_padding", self.table_cell_padding),
            ("blockquote_border_width", self.blockquote_border_width),
            ("image_border_radius", self.image_border_radius),
            ("image_margin", self.image_margin),
            ("line_height", self.line_height),
            ("max_content_width", self.max_content_width),
            ("content_padding", self.content_padding),
        ];
        for (name, value) in sizes {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::StyleConfig(format!(
                    "{name} must be a finite, non-negative number"
                )));
            }
        }
        if self.font_size == 0.0 || self.line_height == 0.0 {
            return Err(EngineError::StyleConfig(
                "font_size and line_height must be positive".to_string(),
            ));
        }

        let colors = [
            ("text_color", &self.text_color),
            ("background_color", &self.background_color),
            ("link_color", &self.link_color),
            ("code_background_color", &self.code_background_color),
            ("code_text_color", &self.code_text_color),
            ("table_border_color", &self.table_border_color),
            ("table_header_background", &self.table_header_background),
            ("blockquote_border_color", &self.blockquote_border_color),
            ("blockquote_text_color", &self.blockquote_text_color),
            ("mention_background", &self.mention_background),
            ("mention_text_color", &self.mention_text_color),
            ("hr_color", &self.hr_color),
            ("diagram_text_color", &self.diagram_text_color),
            ("diagram_background_color", &self.diagram_background_color),
        ];
        for (name, value) in colors {
            check_css_value(name, value, is_color_char)?;
        }
        for value in &self.heading_colors {
            check_css_value("heading_colors", value, is_color_char)?;
        }
        check_css_value("font_family", &self.font_family, is_font_char)?;
        check_css_value("code_font_family", &self.code_font_family, is_font_char)?;
        Ok(())
    }
}

/// Whether a color string is safe to splice into a `style` attribute
pub(crate) fn is_safe_color(value: &str) -> bool {
    !value.trim().is_empty() && value.chars().all(is_color_char)
}

fn is_color_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '#' | '(' | ')' | ',' | '.' | '%' | ' ' | '-')
}

fn is_font_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | ',' | '-' | '_' | '\'')
}

fn check_css_value(name: &str, value: &str, allowed: fn(char) -> bool) -> Result<()> {
    if value.trim().is_empty() || !value.chars().all(allowed) {
        return Err(EngineError::StyleConfig(format!(
            "{name} has an unsupported value {value:?}"
        )));
    }
    Ok(())
}
