// SPDX-License-Identifier: AGPL-3.0-or-later
//! IMParse Core - rich-text parsing and rendering for chat-style UIs
//!
//! This crate provides:
//! - A unified AST that Markdown and editor deltas both parse into
//! - An HTML renderer driven by a themable style configuration
//! - Formula rendering through KaTeX (HTML and SVG)
//! - A Mermaid front end that validates diagrams and wraps them for mermaid.js
//! - A height estimator for sizing host views before rendering
//! - C ABI exports for iOS, Android and web hosts

pub mod ast;
pub mod diagram;
pub mod formats;
pub mod height;
pub mod math;
pub mod style;
pub mod traits;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use ast::{Block, Document, Inline, SourceFormat};
pub use formats::{DeltaParser, HtmlRenderer, MarkdownParser};
pub use height::HeightEstimator;
pub use style::StyleConfig;
pub use traits::{EngineError, ErrorCode, ParseConfig, Parser, ParserExt, Renderer, Result};

/// Parse Markdown with the default configuration
pub fn parse_markdown(input: &str) -> Result<Document> {
    MarkdownParser::new().parse(input, &ParseConfig::default())
}

/// Parse Markdown bytes, failing on invalid UTF-8
pub fn parse_markdown_bytes(input: &[u8]) -> Result<Document> {
    MarkdownParser::new().parse_bytes(input, &ParseConfig::default())
}

/// Parse a delta (`{"ops":[…]}` or a bare op array)
pub fn parse_delta(input: &str) -> Result<Document> {
    DeltaParser::new().parse(input, &ParseConfig::default())
}

pub fn serialize_ast(doc: &Document) -> Result<String> {
    serde_json::to_string(doc).map_err(|e| EngineError::Serialization(e.to_string()))
}

pub fn deserialize_ast(json: &str) -> Result<Document> {
    serde_json::from_str(json).map_err(EngineError::InvalidAst)
}

pub fn markdown_to_html(input: &str) -> Result<String> {
    markdown_to_html_with_config(input, None)
}

/// Render Markdown with an optional JSON style override
pub fn markdown_to_html_with_config(input: &str, config_json: Option<&str>) -> Result<String> {
    let style = StyleConfig::resolve(config_json)?;
    let doc = parse_markdown(input)?;
    HtmlRenderer::new(style).render(&doc)
}

pub fn delta_to_html(input: &str) -> Result<String> {
    delta_to_html_with_config(input, None)
}

/// Render a delta with an optional JSON style override
pub fn delta_to_html_with_config(input: &str, config_json: Option<&str>) -> Result<String> {
    let style = StyleConfig::resolve(config_json)?;
    let doc = parse_delta(input)?;
    HtmlRenderer::new(style).render(&doc)
}

pub fn math_to_html(formula: &str, display: bool) -> Result<String> {
    math::render_html(formula, display)
}

pub fn math_to_svg(formula: &str, display: bool) -> Result<String> {
    math::render_svg(formula, display)
}

/// Standalone mermaid.js page themed from two hex colors
pub fn mermaid_to_html(source: &str, text_color: &str, background_color: &str) -> Result<String> {
    diagram::render_page(source, text_color, background_color)
}

/// Estimated height of an AST given as JSON, using the default style metrics
pub fn calculate_ast_height(ast_json: &str, width: f32) -> Result<f32> {
    let doc = deserialize_ast(ast_json)?;
    Ok(HeightEstimator::default().document(&doc, width))
}

pub fn estimate_height(doc: &Document, width: f32, style: &StyleConfig) -> f32 {
    HeightEstimator::new(style).document(doc, width)
}
