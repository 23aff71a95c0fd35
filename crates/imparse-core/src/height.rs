// SPDX-License-Identifier: AGPL-3.0-or-later
//! Height estimation for pre-sizing host views
//!
//! The estimate mirrors the box model of the HTML renderer with coarse text
//! metrics: an average glyph is half an em wide and wide (CJK, emoji)
//! graphemes take a full em. Anything the renderer does not wrap (code, rules,
//! formulas, diagrams, images) contributes a width-independent height, which
//! keeps the estimate non-increasing as the width grows.

use crate::ast::{Block, Document, Inline, ListItem, TableRow};
use crate::style::StyleConfig;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

const HEADING_LINE_HEIGHT: f32 = 1.25;
const CODE_LINE_HEIGHT: f32 = 1.45;
/// List indent in em
const LIST_INDENT: f32 = 1.5;
const QUOTE_PADDING: f32 = 16.0;
const CELL_SIDE_PADDING: f32 = 12.0;
const DEFAULT_IMAGE_HEIGHT: f32 = 200.0;
const MIN_IMAGE_HEIGHT: f32 = 16.0;
const MAX_IMAGE_HEIGHT: f32 = 600.0;
const MIN_DIAGRAM_HEIGHT: f32 = 200.0;
const MAX_DIAGRAM_HEIGHT: f32 = 800.0;

/// Metrics taken from a style configuration
#[derive(Debug, Clone)]
pub struct HeightEstimator {
    font_size: f32,
    line_height: f32,
    code_font_size: f32,
    paragraph_spacing: f32,
    list_item_spacing: f32,
    code_block_padding: f32,
    table_cell_padding: f32,
    blockquote_border_width: f32,
    image_margin: f32,
    content_padding: f32,
    max_content_width: f32,
}

impl Default for HeightEstimator {
    fn default() -> Self {
        Self::new(&StyleConfig::default())
    }
}

/// Text measured in half-em units plus forced line breaks
#[derive(Debug, Default)]
struct Measure {
    /// Width units per hard line
    lines: Vec<usize>,
    /// Height of embedded images and display formulas
    extra: f32,
}

impl HeightEstimator {
    pub fn new(style: &StyleConfig) -> Self {
        Self {
            font_size: style.font_size,
            line_height: style.line_height,
            code_font_size: style.code_font_size,
            paragraph_spacing: style.paragraph_spacing,
            list_item_spacing: style.list_item_spacing,
            code_block_padding: style.code_block_padding,
            table_cell_padding: style.table_cell_padding,
            blockquote_border_width: style.blockquote_border_width,
            image_margin: style.image_margin,
            content_padding: style.content_padding,
            max_content_width: style.max_content_width,
        }
    }

    /// Estimated rendered height in px of `doc` laid out `width` px wide
    #[tracing::instrument(level = "debug", skip(self, doc), fields(blocks = doc.content.len()))]
    pub fn document(&self, doc: &Document, width: f32) -> f32 {
        let min_width = self.font_size * 0.5;
        let mut width = if width.is_finite() && width > 0.0 {
            width
        } else {
            tracing::debug!(width, "clamped unusable width");
            min_width
        };
        if self.max_content_width > 0.0 {
            width = width.min(self.max_content_width);
        }
        let inner = (width - 2.0 * self.content_padding).max(min_width);

        2.0 * self.content_padding + self.blocks(&doc.content, inner)
    }

    fn blocks(&self, blocks: &[Block], width: f32) -> f32 {
        blocks.iter().map(|block| self.block(block, width)).sum()
    }

    fn block(&self, block: &Block, width: f32) -> f32 {
        match block {
            Block::Paragraph { content } => {
                self.inlines(content, width, self.font_size, self.line_height)
                    + self.paragraph_spacing
            }

            Block::Heading { level, content } => {
                let size = self.font_size * heading_scale(*level);
                // 1em above, 0.5em below
                self.inlines(content, width, size, HEADING_LINE_HEIGHT) + 1.5 * size
            }

            Block::List { items, .. } => {
                let indent = LIST_INDENT * self.font_size;
                let inner = (width - indent).max(self.font_size * 0.5);
                items.iter().map(|item| self.item(item, inner)).sum::<f32>()
                    + self.paragraph_spacing
            }

            Block::CodeBlock { content, .. } => {
                let lines = content.lines().count().max(1) as f32;
                lines * self.code_font_size * CODE_LINE_HEIGHT
                    + 2.0 * self.code_block_padding
                    + self.paragraph_spacing
            }

            Block::BlockQuote { content } => {
                let inner =
                    (width - self.blockquote_border_width - QUOTE_PADDING).max(self.font_size * 0.5);
                let body = if content.is_empty() {
                    self.font_size * self.line_height
                } else {
                    self.blocks(content, inner)
                };
                body + self.paragraph_spacing
            }

            // 1px rule plus 1.5em margins
            Block::ThematicBreak => 1.0 + 3.0 * self.font_size,

            Block::Table { header, rows, .. } => {
                let columns = header
                    .iter()
                    .chain(rows)
                    .map(|row| row.cells.len())
                    .max()
                    .unwrap_or(0);
                if columns == 0 {
                    return 0.0;
                }
                let cell_width =
                    (width / columns as f32 - 2.0 * CELL_SIDE_PADDING).max(self.font_size * 0.5);
                header
                    .iter()
                    .chain(rows)
                    .map(|row| self.row(row, cell_width))
                    .sum::<f32>()
                    + self.paragraph_spacing
            }

            Block::MathBlock { content } => formula_height(content, true),

            Block::Diagram { content } => diagram_height(content),
        }
    }

    fn item(&self, item: &ListItem, width: f32) -> f32 {
        let body = match item.content.as_slice() {
            [] => self.font_size * self.line_height,
            // tight items render without paragraph margins
            [Block::Paragraph { content }] => {
                self.inlines(content, width, self.font_size, self.line_height)
            }
            blocks => self.blocks(blocks, width),
        };
        body + self.list_item_spacing
    }

    fn row(&self, row: &TableRow, cell_width: f32) -> f32 {
        let tallest = row
            .cells
            .iter()
            .map(|cell| self.inlines(&cell.content, cell_width, self.font_size, self.line_height))
            .fold(self.font_size * self.line_height, f32::max);
        // 1px border
        tallest + 2.0 * self.table_cell_padding + 1.0
    }

    /// Wrapped height of a run of inlines
    fn inlines(&self, inlines: &[Inline], width: f32, font_size: f32, line_height: f32) -> f32 {
        let mut measure = Measure {
            lines: vec![0],
            extra: 0.0,
        };
        for inline in inlines {
            self.measure(inline, &mut measure);
        }

        let per_line = ((width / (font_size * 0.5)).floor() as usize).max(1);
        let lines: usize = measure
            .lines
            .iter()
            .map(|units| units.div_ceil(per_line).max(1))
            .sum();
        lines as f32 * font_size * line_height + measure.extra
    }

    fn measure(&self, inline: &Inline, measure: &mut Measure) {
        let push = |measure: &mut Measure, text: &str| {
            if let Some(last) = measure.lines.last_mut() {
                *last += text_units(text);
            }
        };
        match inline {
            Inline::Text { content } | Inline::Code { content } | Inline::Emoji { content } => {
                push(measure, content)
            }
            Inline::Mention { name, .. } => {
                // `@` plus the chip's horizontal padding
                push(measure, name);
                push(measure, "@  ");
            }
            Inline::Math {
                content,
                display: false,
            } => push(measure, content),
            Inline::Math {
                content,
                display: true,
            } => measure.extra += formula_height(content, true),
            Inline::Image { height, .. } => {
                measure.extra += image_height(*height) + 2.0 * self.image_margin
            }
            Inline::LineBreak => measure.lines.push(0),
            Inline::SoftBreak => push(measure, " "),
            Inline::Emphasis { content }
            | Inline::Strong { content }
            | Inline::Strikethrough { content }
            | Inline::Underline { content }
            | Inline::Color { content, .. }
            | Inline::Link { content, .. } => {
                for child in content {
                    self.measure(child, measure);
                }
            }
        }
    }
}

fn heading_scale(level: u8) -> f32 {
    match level {
        0 | 1 => 2.0,
        2 => 1.5,
        3 => 1.25,
        4 => 1.1,
        5 => 1.0,
        _ => 0.9,
    }
}

/// Width of `text` in half-em units; wide graphemes take two
fn text_units(text: &str) -> usize {
    text.graphemes(true).map(UnicodeWidthStr::width).sum()
}

fn formula_height(content: &str, display: bool) -> f32 {
    let rows = (content.len() as f32 / 50.0).ceil().max(1.0);
    let row_height = if display { 40.0 } else { 24.0 };
    rows * row_height + 16.0
}

fn diagram_height(content: &str) -> f32 {
    (content.len() as f32 * 0.5).clamp(MIN_DIAGRAM_HEIGHT, MAX_DIAGRAM_HEIGHT)
}

fn image_height(declared: Option<f32>) -> f32 {
    match declared {
        Some(h) if h.is_finite() && h > 0.0 => h.clamp(MIN_IMAGE_HEIGHT, MAX_IMAGE_HEIGHT),
        _ => DEFAULT_IMAGE_HEIGHT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceFormat;

    fn doc(content: Vec<Block>) -> Document {
        Document {
            source_format: SourceFormat::Markdown,
            content,
            raw_source: None,
        }
    }

    fn paragraph(text: &str) -> Block {
        Block::Paragraph {
            content: vec![Inline::text(text)],
        }
    }

    #[test]
    fn test_single_paragraph_positive() {
        let h = HeightEstimator::default().document(&doc(vec![paragraph("Hello")]), 300.0);
        assert!(h.is_finite() && h > 0.0);
    }

    #[test]
    fn test_long_text_wraps() {
        let est = HeightEstimator::default();
        let short = est.document(&doc(vec![paragraph("word")]), 300.0);
        let long = est.document(&doc(vec![paragraph(&"word ".repeat(200))]), 300.0);
        assert!(long > short * 3.0);
    }

    #[test]
    fn test_cjk_counts_double() {
        assert_eq!(text_units("ab"), 2);
        assert_eq!(text_units("中文"), 4);
        assert_eq!(text_units("e\u{301}"), 1);
        for emoji in ["🎉", "🚀", "✅", "⌚"] {
            assert_eq!(text_units(emoji), 2, "{emoji}");
        }
        let est = HeightEstimator::default();
        let latin = est.document(&doc(vec![paragraph(&"a".repeat(120))]), 300.0);
        let cjk = est.document(&doc(vec![paragraph(&"中".repeat(120))]), 300.0);
        assert!(cjk > latin);
    }

    #[test]
    fn test_unusable_widths_are_clamped() {
        let est = HeightEstimator::default();
        let d = doc(vec![paragraph("some text")]);
        for width in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let h = est.document(&d, width);
            assert!(h.is_finite() && h > 0.0, "{width}");
        }
    }

    #[test]
    fn test_fixed_blocks_ignore_width() {
        let est = HeightEstimator::default();
        let d = doc(vec![
            Block::CodeBlock {
                language: None,
                content: "a\nb\nc".into(),
            },
            Block::ThematicBreak,
            Block::MathBlock {
                content: "x^2".into(),
            },
            Block::Diagram {
                content: "graph TD\nA-->B".into(),
            },
        ]);
        assert_eq!(est.document(&d, 320.0), est.document(&d, 640.0));
    }

    #[test]
    fn test_images() {
        assert_eq!(image_height(Some(100.0)), 100.0);
        assert_eq!(image_height(Some(1e9)), MAX_IMAGE_HEIGHT);
        assert_eq!(image_height(Some(f32::NAN)), DEFAULT_IMAGE_HEIGHT);
        assert_eq!(image_height(None), DEFAULT_IMAGE_HEIGHT);
    }

    #[test]
    fn test_line_breaks_add_lines() {
        let est = HeightEstimator::default();
        let one = est.document(&doc(vec![paragraph("a b")]), 400.0);
        let two = est.document(
            &doc(vec![Block::Paragraph {
                content: vec![Inline::text("a"), Inline::LineBreak, Inline::text("b")],
            }]),
            400.0,
        );
        assert!(two > one);
    }

    #[test]
    fn test_empty_document_is_padding_only() {
        let style = StyleConfig::default();
        let h = HeightEstimator::new(&style).document(&doc(vec![]), 300.0);
        assert_eq!(h, 2.0 * style.content_padding);
    }
}
