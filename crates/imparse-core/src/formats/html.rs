// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTML renderer
//!
//! Produces a self-contained fragment: every element carries its presentation
//! as an inline `style` attribute built from the [`StyleConfig`] slots, so the
//! host can drop the output into any web view without a stylesheet.

use crate::ast::{Block, ColumnAlignment, Document, Inline, ListItem, ListKind, TableRow};
use crate::style::{is_safe_color, StyleConfig};
use crate::traits::{Renderer, Result};
use crate::{diagram, math};
use std::fmt::Write;

/// Renders a [`Document`] to an HTML fragment
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    style: StyleConfig,
}

impl HtmlRenderer {
    pub fn new(style: StyleConfig) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }
}

impl Renderer for HtmlRenderer {
    #[tracing::instrument(level = "debug", skip_all, fields(blocks = doc.content.len()))]
    fn render(&self, doc: &Document) -> Result<String> {
        let style = &self.style;
        style.validate()?;

        let mut output = String::new();
        let _ = write!(
            output,
            "<div class=\"imparse-document\" style=\"font-family:{};font-size:{}px;line-height:{};color:{};background-color:{};padding:{}px;",
            escape_html(&style.font_family),
            style.font_size,
            style.line_height,
            style.text_color,
            style.background_color,
            style.content_padding,
        );
        if style.max_content_width > 0.0 {
            let _ = write!(output, "max-width:{}px;margin:0 auto;", style.max_content_width);
        }
        output.push_str("\">");

        for block in &doc.content {
            render_block(&mut output, block, style);
        }

        output.push_str("</div>");
        Ok(output)
    }
}

/// Escape text for element content and attribute values
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

pub(crate) fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '\0' => out.push('\u{fffd}'),
            _ => out.push(c),
        }
    }
}

/// Neutralize script-capable URL schemes. `data:` is only kept for images.
fn safe_url(url: &str, image: bool) -> &str {
    let scheme: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    let blocked = scheme.starts_with("javascript:")
        || scheme.starts_with("vbscript:")
        || (scheme.starts_with("data:") && !(image && scheme.starts_with("data:image/")));
    if blocked {
        tracing::debug!("neutralized unsafe url scheme");
        "#"
    } else {
        url
    }
}

fn heading_size(level: u8) -> &'static str {
    match level {
        1 => "2em",
        2 => "1.5em",
        3 => "1.25em",
        4 => "1.1em",
        5 => "1em",
        _ => "0.9em",
    }
}

fn render_block(output: &mut String, block: &Block, style: &StyleConfig) {
    match block {
        Block::Paragraph { content } => {
            let _ = write!(output, "<p style=\"margin:0 0 {}px 0;\">", style.paragraph_spacing);
            render_inlines(output, content, style);
            output.push_str("</p>\n");
        }

        Block::Heading { level, content } => {
            let level = (*level).clamp(1, 6);
            let _ = write!(
                output,
                "<h{level} style=\"font-size:{};font-weight:600;line-height:1.25;margin:1em 0 0.5em 0;color:{};\">",
                heading_size(level),
                style.heading_color(level),
            );
            render_inlines(output, content, style);
            let _ = writeln!(output, "</h{level}>");
        }

        Block::List { kind, start, items } => render_list(output, *kind, *start, items, style),

        Block::CodeBlock { language, content } => {
            let _ = write!(
                output,
                "<pre style=\"background-color:{};color:{};padding:{}px;border-radius:{}px;overflow-x:auto;margin:0 0 {}px 0;\"><code",
                style.code_background_color,
                style.code_text_color,
                style.code_block_padding,
                style.code_block_border_radius,
                style.paragraph_spacing,
            );
            if let Some(language) = language {
                let _ = write!(output, " class=\"language-{}\"", escape_html(language));
            }
            let _ = write!(
                output,
                " style=\"font-family:{};font-size:{}px;\">",
                escape_html(&style.code_font_family),
                style.code_font_size,
            );
            escape_into(output, content);
            output.push_str("</code></pre>\n");
        }

        Block::BlockQuote { content } => {
            let _ = write!(
                output,
                "<blockquote style=\"border-left:{}px solid {};padding-left:16px;margin:0 0 {}px 0;color:{};\">",
                style.blockquote_border_width,
                style.blockquote_border_color,
                style.paragraph_spacing,
                style.blockquote_text_color,
            );
            for child in content {
                render_block(output, child, style);
            }
            output.push_str("</blockquote>\n");
        }

        Block::ThematicBreak => {
            let _ = writeln!(
                output,
                "<hr style=\"border:none;border-top:1px solid {};margin:1.5em 0;\">",
                style.hr_color
            );
        }

        Block::Table {
            alignments,
            header,
            rows,
        } => {
            let _ = write!(
                output,
                "<table style=\"width:100%;border-collapse:collapse;margin:0 0 {}px 0;\">",
                style.paragraph_spacing
            );
            if let Some(header) = header {
                output.push_str("<thead>");
                render_row(output, header, alignments, true, style);
                output.push_str("</thead>");
            }
            if !rows.is_empty() {
                output.push_str("<tbody>");
                for row in rows {
                    render_row(output, row, alignments, false, style);
                }
                output.push_str("</tbody>");
            }
            output.push_str("</table>\n");
        }

        Block::MathBlock { content } => {
            match math::render_html(content, true) {
                Ok(html) => output.push_str(&html),
                Err(e) => {
                    tracing::warn!(error = %e, "formula block fell back to source");
                    math_fallback(output, content, true, style);
                }
            }
            output.push('\n');
        }

        Block::Diagram { content } => {
            match diagram::render_fragment(
                content,
                &style.diagram_text_color,
                &style.diagram_background_color,
            ) {
                Ok(html) => output.push_str(&html),
                Err(e) => {
                    tracing::warn!(error = %e, "diagram fell back to source");
                    let _ = write!(
                        output,
                        "<pre class=\"imparse-diagram-error\" style=\"background-color:{};color:{};padding:{}px;border-radius:{}px;white-space:pre-wrap;\">",
                        style.code_background_color,
                        style.code_text_color,
                        style.code_block_padding,
                        style.code_block_border_radius,
                    );
                    escape_into(output, content);
                    output.push_str("</pre>");
                }
            }
            output.push('\n');
        }
    }
}

fn render_list(
    output: &mut String,
    kind: ListKind,
    start: Option<u32>,
    items: &[ListItem],
    style: &StyleConfig,
) {
    let tag = match kind {
        ListKind::Ordered => "ol",
        ListKind::Bullet | ListKind::Task => "ul",
    };
    let _ = write!(output, "<{tag}");
    if let (ListKind::Ordered, Some(start)) = (kind, start) {
        if start != 1 {
            let _ = write!(output, " start=\"{start}\"");
        }
    }
    let marker = if kind == ListKind::Task {
        "list-style:none;padding-left:0.5em;"
    } else {
        "padding-left:1.5em;"
    };
    let _ = write!(
        output,
        " style=\"{marker}margin:0 0 {}px 0;\">",
        style.paragraph_spacing
    );

    for item in items {
        let _ = write!(output, "<li style=\"margin-bottom:{}px;\">", style.list_item_spacing);
        if let Some(checked) = item.checked {
            let _ = write!(
                output,
                "<input type=\"checkbox\" disabled{} style=\"margin-right:8px;\">",
                if checked { " checked" } else { "" }
            );
        }
        match item.content.as_slice() {
            // tight item: no paragraph margins
            [Block::Paragraph { content }] => render_inlines(output, content, style),
            blocks => {
                for block in blocks {
                    render_block(output, block, style);
                }
            }
        }
        output.push_str("</li>");
    }
    let _ = writeln!(output, "</{tag}>");
}

fn render_row(
    output: &mut String,
    row: &TableRow,
    alignments: &[ColumnAlignment],
    header: bool,
    style: &StyleConfig,
) {
    let tag = if header { "th" } else { "td" };
    output.push_str("<tr>");
    for (index, cell) in row.cells.iter().enumerate() {
        let _ = write!(
            output,
            "<{tag} style=\"padding:{}px 12px;border:1px solid {};",
            style.table_cell_padding, style.table_border_color
        );
        if header {
            let _ = write!(
                output,
                "background-color:{};font-weight:600;",
                style.table_header_background
            );
        }
        if let Some(align) = alignments.get(index).and_then(ColumnAlignment::css) {
            let _ = write!(output, "text-align:{align};");
        }
        output.push_str("\">");
        render_inlines(output, &cell.content, style);
        let _ = write!(output, "</{tag}>");
    }
    output.push_str("</tr>");
}

fn render_inlines(output: &mut String, inlines: &[Inline], style: &StyleConfig) {
    for inline in inlines {
        render_inline(output, inline, style);
    }
}

fn wrap(output: &mut String, tag: &str, content: &[Inline], style: &StyleConfig) {
    let _ = write!(output, "<{tag}>");
    render_inlines(output, content, style);
    let _ = write!(output, "</{tag}>");
}

fn render_inline(output: &mut String, inline: &Inline, style: &StyleConfig) {
    match inline {
        Inline::Text { content } => escape_into(output, content),

        Inline::Emphasis { content } => wrap(output, "em", content, style),

        Inline::Strong { content } => wrap(output, "strong", content, style),

        Inline::Strikethrough { content } => wrap(output, "s", content, style),

        Inline::Underline { content } => wrap(output, "u", content, style),

        Inline::Color { color, content } => {
            if is_safe_color(color) {
                let _ = write!(output, "<span style=\"color:{};\">", escape_html(color));
                render_inlines(output, content, style);
                output.push_str("</span>");
            } else {
                tracing::debug!(color = %color, "dropped unsupported text color");
                render_inlines(output, content, style);
            }
        }

        Inline::Code { content } => {
            let _ = write!(
                output,
                "<code style=\"background-color:{};color:{};font-family:{};font-size:{}px;padding:2px 6px;border-radius:3px;\">",
                style.code_background_color,
                style.code_text_color,
                escape_html(&style.code_font_family),
                style.code_font_size,
            );
            escape_into(output, content);
            output.push_str("</code>");
        }

        Inline::Link {
            url,
            title,
            content,
        } => {
            output.push_str("<a href=\"");
            escape_into(output, safe_url(url, false));
            output.push('"');
            if let Some(title) = title {
                output.push_str(" title=\"");
                escape_into(output, title);
                output.push('"');
            }
            let _ = write!(
                output,
                " style=\"color:{};text-decoration:none;\">",
                style.link_color
            );
            render_inlines(output, content, style);
            output.push_str("</a>");
        }

        Inline::Image {
            url,
            alt,
            title,
            width,
            height,
        } => {
            output.push_str("<img src=\"");
            escape_into(output, safe_url(url, true));
            output.push_str("\" alt=\"");
            escape_into(output, alt);
            output.push('"');
            if let Some(title) = title {
                output.push_str(" title=\"");
                escape_into(output, title);
                output.push('"');
            }
            for (name, value) in [("width", width), ("height", height)] {
                if let Some(value) = value.filter(|v| v.is_finite() && *v > 0.0) {
                    let _ = write!(output, " {name}=\"{}\"", value.round());
                }
            }
            let _ = write!(
                output,
                " style=\"max-width:100%;height:auto;border-radius:{}px;margin:{}px 0;\">",
                style.image_border_radius, style.image_margin
            );
        }

        Inline::Math { content, display } => match math::render_html(content, *display) {
            Ok(html) => output.push_str(&html),
            Err(e) => {
                tracing::debug!(error = %e, "inline formula fell back to source");
                math_fallback(output, content, *display, style);
            }
        },

        Inline::Mention { id, name } => {
            output.push_str("<span class=\"imparse-mention\" data-id=\"");
            escape_into(output, id);
            let _ = write!(
                output,
                "\" style=\"background-color:{};color:{};padding:2px 6px;border-radius:4px;font-weight:500;\">@",
                style.mention_background, style.mention_text_color
            );
            escape_into(output, name);
            output.push_str("</span>");
        }

        Inline::Emoji { content } => {
            output.push_str("<span class=\"imparse-emoji\">");
            escape_into(output, content);
            output.push_str("</span>");
        }

        Inline::LineBreak => output.push_str("<br>"),

        Inline::SoftBreak => output.push('\n'),
    }
}

/// Visible source for a formula that could not be typeset
fn math_fallback(output: &mut String, source: &str, display: bool, style: &StyleConfig) {
    let (tag, delimiter) = if display { ("div", "$$") } else { ("span", "$") };
    let _ = write!(
        output,
        "<{tag} class=\"imparse-math-error\" style=\"font-family:{};color:{};\">{delimiter}",
        escape_html(&style.code_font_family),
        style.code_text_color,
    );
    escape_into(output, source);
    let _ = write!(output, "{delimiter}</{tag}>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SourceFormat, TableCell};
    use crate::formats::MarkdownParser;
    use crate::traits::{ErrorCode, ParseConfig, Parser};
    use pretty_assertions::assert_eq;

    fn render_md(input: &str) -> String {
        let doc = MarkdownParser::new()
            .parse(input, &ParseConfig::default())
            .unwrap();
        HtmlRenderer::default().render(&doc).unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape_html("a\0b"), "a\u{fffd}b");
    }

    #[test]
    fn test_nul_never_reaches_output() {
        let doc = crate::parse_delta(r#"[{"insert":"x\u0000y"},{"insert":"\n","attributes":{"code-block":true}},{"insert":"\u0000\n"}]"#)
            .unwrap();
        let html = HtmlRenderer::default().render(&doc).unwrap();
        assert!(!html.contains('\0'));
        assert!(html.contains("x\u{fffd}y"));
    }

    #[test]
    fn test_empty_document_is_bare_wrapper() {
        let html = HtmlRenderer::default()
            .render(&Document::new(SourceFormat::Markdown))
            .unwrap();
        assert!(html.starts_with("<div class=\"imparse-document\""));
        assert!(html.ends_with("\"></div>"));
    }

    #[test]
    fn test_heading_and_strong() {
        let html = render_md("# Title\n\nSome **bold** text.");
        assert!(html.contains("<h1 style="));
        assert!(html.contains(">Title</h1>"));
        assert!(html.contains("Some <strong>bold</strong> text."));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let html = render_md("a < b && c > d\n\n<script>alert(1)</script>");
        assert!(html.contains("a &lt; b &amp;&amp; c &gt; d"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_unsafe_links_neutralized() {
        assert_eq!(safe_url("javascript:alert(1)", false), "#");
        assert_eq!(safe_url(" JaVa\tScript:alert(1)", false), "#");
        assert_eq!(safe_url("vbscript:x", false), "#");
        assert_eq!(safe_url("data:text/html,hi", false), "#");
        assert_eq!(safe_url("data:image/png;base64,AA", false), "#");
        assert_eq!(safe_url("data:image/png;base64,AA", true), "data:image/png;base64,AA");
        assert_eq!(safe_url("https://example.com", false), "https://example.com");

        let html = render_md("[x](javascript:alert(1))");
        assert!(html.contains("href=\"#\""));
    }

    #[test]
    fn test_styles_come_from_config() {
        let doc = MarkdownParser::new()
            .parse("[link](https://a.b)", &ParseConfig::default())
            .unwrap();
        let light = HtmlRenderer::default().render(&doc).unwrap();
        let dark = HtmlRenderer::new(StyleConfig::dark()).render(&doc).unwrap();
        assert!(light.contains(&StyleConfig::default().link_color));
        assert!(dark.contains(&StyleConfig::dark().link_color));
        assert_ne!(light, dark);
    }

    #[test]
    fn test_invalid_style_is_rejected() {
        let renderer = HtmlRenderer::new(StyleConfig {
            text_color: "red;}".into(),
            ..StyleConfig::default()
        });
        let err = renderer
            .render(&Document::new(SourceFormat::Markdown))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStyleConfig);
    }

    #[test]
    fn test_task_list_and_tight_items() {
        let html = render_md("- [x] done\n- [ ] todo");
        assert!(html.contains("<input type=\"checkbox\" disabled checked"));
        assert!(html.contains("margin-right:8px;\">done</li>"));
        assert!(!html.contains("<li style=\"margin-bottom:8px;\"><p"));
    }

    #[test]
    fn test_ordered_start() {
        let html = render_md("3. three\n4. four");
        assert!(html.contains("<ol start=\"3\""));
        let html = render_md("1. one");
        assert!(!html.contains("start="));
    }

    #[test]
    fn test_table_alignment_and_header() {
        let doc = Document {
            source_format: SourceFormat::Markdown,
            content: vec![Block::Table {
                alignments: vec![ColumnAlignment::Default, ColumnAlignment::Right],
                header: Some(TableRow {
                    cells: vec![
                        TableCell {
                            content: vec![Inline::text("a")],
                        },
                        TableCell {
                            content: vec![Inline::text("b")],
                        },
                    ],
                }),
                rows: vec![],
            }],
            raw_source: None,
        };
        let html = HtmlRenderer::default().render(&doc).unwrap();
        assert!(html.contains("<thead><tr><th"));
        assert!(html.contains("text-align:right;\">b</th>"));
        assert!(!html.contains("<tbody>"));
    }

    #[test]
    fn test_math_and_fallback() {
        let html = render_md("Inline $x^2$ here");
        assert!(html.contains("imparse-math"));
        assert!(html.contains("class=\"katex\""));

        let html = render_md("$$\\nope{x}$$");
        assert!(html.contains("imparse-math-error"));
        assert!(html.contains("$$\\nope{x}$$"));
    }

    #[test]
    fn test_diagram_and_fallback() {
        let html = render_md("```mermaid\ngraph TD\n  A-->B\n```");
        assert!(html.contains("class=\"mermaid imparse-diagram\""));
        assert!(html.contains("A--&gt;B"));

        let html = render_md("```mermaid\nnot a diagram\n```");
        assert!(html.contains("imparse-diagram-error"));
    }

    #[test]
    fn test_unsafe_inline_color_dropped() {
        let doc = Document {
            source_format: SourceFormat::Delta,
            content: vec![Block::Paragraph {
                content: vec![
                    Inline::Color {
                        color: "#ff0000".into(),
                        content: vec![Inline::text("red")],
                    },
                    Inline::Color {
                        color: "x\" onclick=\"y".into(),
                        content: vec![Inline::text("plain")],
                    },
                ],
            }],
            raw_source: None,
        };
        let html = HtmlRenderer::default().render(&doc).unwrap();
        assert!(html.contains("<span style=\"color:#ff0000;\">red</span>"));
        assert!(html.contains(">plain</p>") || html.contains("</span>plain</p>"));
        assert!(!html.contains("onclick"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let input = "# H\n\n- a\n- b\n\n> q\n\n| x | y |\n|---|:-:|\n| 1 | 2 |\n\n$$\\frac{1}{2}$$";
        assert_eq!(render_md(input), render_md(input));
    }
}
