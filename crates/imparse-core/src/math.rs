// SPDX-License-Identifier: AGPL-3.0-or-later
//! Formula typesetting through KaTeX
//!
//! The `katex` crate runs the KaTeX renderer in an embedded JS engine, one
//! per thread. HTML output expects the KaTeX stylesheet on the host. The SVG
//! form embeds the same markup in a `foreignObject` and sizes the image from
//! the strut heights KaTeX writes into its output.

use crate::formats::html::escape_html;
use crate::traits::{EngineError, Result};
use katex::{Opts, OutputType};
use std::fmt::Write;

/// Average advance of a glyph in em, used to size the SVG viewport
const GLYPH_WIDTH: f32 = 0.6;

/// Space around the formula inside the SVG, in em
const PADDING: f32 = 0.2;

fn opts(display: bool) -> Opts {
    let mut opts = Opts::default();
    opts.set_display_mode(display);
    opts.set_output_type(OutputType::Html);
    opts.set_throw_on_error(true);
    opts
}

fn typeset(formula: &str, display: bool) -> Result<String> {
    katex::render_with_opts(formula, opts(display)).map_err(|e| math_error(formula, e))
}

/// Render a formula as an HTML fragment
#[tracing::instrument(level = "debug", skip_all, fields(len = formula.len()))]
pub fn render_html(formula: &str, display: bool) -> Result<String> {
    let html = typeset(formula, display)?;
    Ok(if display {
        format!("<div class=\"imparse-math imparse-math-display\">{html}</div>")
    } else {
        format!("<span class=\"imparse-math\">{html}</span>")
    })
}

/// Render a formula as a standalone SVG image
#[tracing::instrument(level = "debug", skip_all, fields(len = formula.len()))]
pub fn render_svg(formula: &str, display: bool) -> Result<String> {
    let html = typeset(formula, display)?;

    let px = if display { 20.0 } else { 16.0 };
    let (height, depth) = strut_metrics(&html);
    let width = (visible_glyphs(&html).max(1) as f32 * GLYPH_WIDTH + 2.0 * PADDING) * px;
    let height = (height.max(1.0) + 2.0 * PADDING) * px;
    let style = if display {
        "display:block;margin:0.5em auto;".to_string()
    } else {
        format!("vertical-align:{:.2}px;", -(depth + PADDING) * px)
    };

    let mut out = String::with_capacity(html.len() + 512);
    let _ = write!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"imparse-math\" width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"0 0 {width:.2} {height:.2}\" overflow=\"visible\" role=\"img\" aria-label=\"{}\" style=\"{style}\">",
        escape_html(formula)
    );
    let _ = write!(
        out,
        "<foreignObject x=\"0\" y=\"0\" width=\"100%\" height=\"100%\"><div xmlns=\"http://www.w3.org/1999/xhtml\" style=\"font-size:{px}px;padding:{PADDING}em;line-height:normal;color:currentColor;\">{html}</div></foreignObject></svg>"
    );
    Ok(out)
}

/// Map a KaTeX failure onto the engine error. Parse errors carry the
/// 1-based character position of the offending token.
fn math_error(formula: &str, error: katex::Error) -> EngineError {
    match error {
        katex::Error::JsExecError(detail) => {
            let message = detail
                .find("KaTeX parse error:")
                .map_or(detail.as_str(), |at| &detail[at..])
                .trim()
                .to_string();
            tracing::debug!(%message, "formula rejected");
            EngineError::Math {
                offset: error_offset(formula, &message),
                message,
            }
        }
        other => EngineError::Internal(format!("math engine: {other}")),
    }
}

fn error_offset(formula: &str, message: &str) -> usize {
    let position = message
        .split("at position ")
        .nth(1)
        .map(|rest| rest.chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse::<usize>().ok());

    match position {
        Some(position) => formula
            .char_indices()
            .nth(position.saturating_sub(1))
            .map_or(formula.len(), |(at, _)| at),
        None if message.contains("end of input") => formula.len(),
        None => 0,
    }
}

/// Tallest strut (height + depth) and its depth, both in em
fn strut_metrics(html: &str) -> (f32, f32) {
    let mut height = 0.0_f32;
    let mut depth = 0.0_f32;
    for (at, _) in html.match_indices("class=\"strut\" style=\"") {
        let style = &html[at + "class=\"strut\" style=\"".len()..];
        let style = style.split('"').next().unwrap_or_default();
        let strut = em_value(style, "height:").unwrap_or(0.0);
        if strut > height {
            height = strut;
            depth = em_value(style, "vertical-align:").map_or(0.0, |v| -v);
        }
    }
    (height, depth.max(0.0))
}

fn em_value(style: &str, property: &str) -> Option<f32> {
    let rest = &style[style.find(property)? + property.len()..];
    rest[..rest.find("em")?].trim().parse().ok()
}

/// Characters outside tags, counting an entity as one
fn visible_glyphs(html: &str) -> usize {
    let mut count = 0;
    let mut in_tag = false;
    let mut in_entity = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            '&' => {
                in_entity = true;
                count += 1;
            }
            ';' if in_entity => in_entity = false,
            _ if in_entity => {}
            c if c.is_whitespace() || c == '\u{200b}' => {}
            _ => count += 1,
        }
    }
    count
}
