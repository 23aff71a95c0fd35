// SPDX-License-Identifier: AGPL-3.0-or-later
//! Markdown parser using comrak
//!
//! comrak does the block scan and delimiter resolution in a single forward
//! pass; this module only maps its tree onto the unified AST. Nothing the
//! user writes makes the parse fail: constructs we do not model (raw HTML,
//! footnote references, superscript) degrade to their text.

use crate::ast::{
    Block, ColumnAlignment, Document, Inline, ListItem, ListKind, SourceFormat, TableCell,
    TableRow,
};
use crate::formats::push_inline;
use crate::traits::{ParseConfig, Parser, Result};
use comrak::nodes::{AstNode, ListType, NodeValue, TableAlignment};
use comrak::{parse_document, Arena, Options};

/// Containers nested deeper than this are flattened to their text. Applies
/// separately to block and inline nesting, and keeps the serialized AST
/// within serde_json's default recursion limit.
pub const MAX_DEPTH: usize = 16;

/// Markdown parser (CommonMark + GFM tables, strikethrough, task lists, autolinks, `$` math)
pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    fn comrak_options(config: &ParseConfig) -> Options<'static> {
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.math_dollars = config.math;
        options.parse.smart = config.smart_punctuation;
        options
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for MarkdownParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Markdown
    }

    #[tracing::instrument(level = "debug", skip_all, fields(len = input.len()))]
    fn parse(&self, input: &str, config: &ParseConfig) -> Result<Document> {
        let arena = Arena::new();
        let options = Self::comrak_options(config);
        let root = parse_document(&arena, input, &options);

        let content = parse_children(root, 0);
        tracing::debug!(blocks = content.len(), "parsed markdown");

        Ok(Document {
            source_format: SourceFormat::Markdown,
            content,
            raw_source: config.preserve_raw_source.then(|| input.to_string()),
        })
    }
}

fn parse_children<'a>(node: &'a AstNode<'a>, depth: usize) -> Vec<Block> {
    if depth >= MAX_DEPTH {
        tracing::debug!(depth, "flattening deeply nested markdown");
        let text = flatten_text(node);
        let text = text.trim();
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![Block::Paragraph {
                content: vec![Inline::text(text)],
            }]
        };
    }
    node.children()
        .filter_map(|child| parse_node(child, depth + 1))
        .collect()
}

/// Text of a whole subtree, walked without recursion
fn flatten_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) | NodeValue::HtmlInline(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::Math(math) => text.push_str(&math.literal),
            NodeValue::CodeBlock(code) => text.push_str(&code.literal),
            NodeValue::HtmlBlock(html) => text.push_str(&html.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableCell => {
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
    text
}

fn parse_node<'a>(node: &'a AstNode<'a>, depth: usize) -> Option<Block> {
    let data = node.data.borrow();

    match &data.value {
        NodeValue::Paragraph => {
            let content = parse_inlines(node);
            Some(promote_display_math(content))
        }

        NodeValue::Heading(heading) => Some(Block::Heading {
            level: heading.level.clamp(1, 6),
            content: parse_inlines(node),
        }),

        NodeValue::CodeBlock(code) => {
            let language = code
                .info
                .split_whitespace()
                .next()
                .map(|lang| lang.to_string());
            let content = trim_final_newline(&code.literal);

            Some(match language.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("mermaid") => Block::Diagram { content },
                Some("math") | Some("latex") | Some("tex") => Block::MathBlock { content },
                _ => Block::CodeBlock { language, content },
            })
        }

        NodeValue::BlockQuote => Some(Block::BlockQuote {
            content: parse_children(node, depth),
        }),

        NodeValue::List(list) => {
            let is_task = node
                .children()
                .any(|child| matches!(child.data.borrow().value, NodeValue::TaskItem(_)));
            let kind = if is_task {
                ListKind::Task
            } else if list.list_type == ListType::Ordered {
                ListKind::Ordered
            } else {
                ListKind::Bullet
            };

            let items: Vec<ListItem> = node
                .children()
                .map(|child| {
                    let checked = match child.data.borrow().value {
                        NodeValue::TaskItem(symbol) => Some(symbol.is_some()),
                        _ => None,
                    };
                    ListItem {
                        content: parse_children(child, depth),
                        checked,
                    }
                })
                .collect();

            let start = (list.list_type == ListType::Ordered && list.start != 1)
                .then(|| u32::try_from(list.start).unwrap_or(u32::MAX));

            Some(Block::List { kind, start, items })
        }

        NodeValue::ThematicBreak => Some(Block::ThematicBreak),

        NodeValue::Table(table) => {
            let alignments = table
                .alignments
                .iter()
                .map(|a| match a {
                    TableAlignment::Left => ColumnAlignment::Left,
                    TableAlignment::Center => ColumnAlignment::Center,
                    TableAlignment::Right => ColumnAlignment::Right,
                    TableAlignment::None => ColumnAlignment::Default,
                })
                .collect();

            let mut header = None;
            let mut rows = Vec::new();
            for child in node.children() {
                if let NodeValue::TableRow(is_header) = child.data.borrow().value {
                    let cells = child
                        .children()
                        .map(|cell| TableCell {
                            content: parse_inlines(cell),
                        })
                        .collect();
                    let row = TableRow { cells };
                    if is_header {
                        header = Some(row);
                    } else {
                        rows.push(row);
                    }
                }
            }

            Some(Block::Table {
                alignments,
                header,
                rows,
            })
        }

        // Raw HTML is shown as text, never passed through
        NodeValue::HtmlBlock(html) => Some(Block::Paragraph {
            content: vec![Inline::text(html.literal.trim_end())],
        }),

        NodeValue::Document | NodeValue::Item(_) | NodeValue::TaskItem(_) => None,

        _ => {
            tracing::debug!("unsupported markdown block, keeping its text");
            let content = parse_inlines(node);
            (!content.is_empty()).then_some(Block::Paragraph { content })
        }
    }
}

/// `$$…$$` alone in a paragraph is a formula block
fn promote_display_math(content: Vec<Inline>) -> Block {
    let significant: Vec<&Inline> = content
        .iter()
        .filter(|i| !matches!(i, Inline::Text { content } if content.trim().is_empty()))
        .filter(|i| !matches!(i, Inline::SoftBreak | Inline::LineBreak))
        .collect();

    if let [Inline::Math {
        content: formula,
        display: true,
    }] = significant.as_slice()
    {
        return Block::MathBlock {
            content: formula.trim().to_string(),
        };
    }
    Block::Paragraph { content }
}

fn trim_final_newline(literal: &str) -> String {
    literal
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(literal)
        .to_string()
}

fn parse_inlines<'a>(node: &'a AstNode<'a>) -> Vec<Inline> {
    nested_inlines(node, 0)
}

fn nested_inlines<'a>(node: &'a AstNode<'a>, depth: usize) -> Vec<Inline> {
    let mut out = Vec::new();
    if depth >= MAX_DEPTH {
        push_inline(&mut out, Inline::text(flatten_text(node)));
        return out;
    }
    for child in node.children() {
        parse_inline(child, depth + 1, &mut out);
    }
    out
}

fn parse_inline<'a>(node: &'a AstNode<'a>, depth: usize, out: &mut Vec<Inline>) {
    let data = node.data.borrow();

    let inline = match &data.value {
        NodeValue::Text(text) => Inline::text(text.clone()),

        NodeValue::SoftBreak => Inline::SoftBreak,

        NodeValue::LineBreak => Inline::LineBreak,

        NodeValue::Code(code) => Inline::Code {
            content: code.literal.clone(),
        },

        NodeValue::Emph => Inline::Emphasis {
            content: nested_inlines(node, depth),
        },

        NodeValue::Strong => Inline::Strong {
            content: nested_inlines(node, depth),
        },

        NodeValue::Strikethrough => Inline::Strikethrough {
            content: nested_inlines(node, depth),
        },

        NodeValue::Link(link) => Inline::Link {
            url: link.url.clone(),
            title: (!link.title.is_empty()).then(|| link.title.clone()),
            content: strip_links(nested_inlines(node, depth)),
        },

        NodeValue::Image(image) => Inline::Image {
            url: image.url.clone(),
            alt: crate::ast::inlines_to_text(&nested_inlines(node, depth)),
            title: (!image.title.is_empty()).then(|| image.title.clone()),
            width: None,
            height: None,
        },

        NodeValue::Math(math) => Inline::Math {
            content: math.literal.clone(),
            display: math.display_math,
        },

        NodeValue::HtmlInline(html) => Inline::text(html.clone()),

        _ => {
            // Unmodelled wrapper: keep its children in place
            for inline in nested_inlines(node, depth) {
                push_inline(out, inline);
            }
            return;
        }
    };

    push_inline(out, inline);
}

/// Links never nest; an inner link keeps only its text
fn strip_links(content: Vec<Inline>) -> Vec<Inline> {
    let mut out = Vec::with_capacity(content.len());
    for inline in content {
        match inline {
            Inline::Link { content, .. } => {
                for child in strip_links(content) {
                    push_inline(&mut out, child);
                }
            }
            other => push_inline(&mut out, other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Document {
        MarkdownParser::new()
            .parse(input, &ParseConfig::default())
            .unwrap()
    }

    #[test]
    fn test_parse_heading_and_strong() {
        let doc = parse("# Title\n\nSome **bold** text.");
        assert_eq!(
            doc.content,
            vec![
                Block::Heading {
                    level: 1,
                    content: vec![Inline::text("Title")],
                },
                Block::Paragraph {
                    content: vec![
                        Inline::text("Some "),
                        Inline::Strong {
                            content: vec![Inline::text("bold")]
                        },
                        Inline::text(" text."),
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_heading_levels() {
        let doc = parse("###### six\n\n####### seven");
        assert!(matches!(doc.content[0], Block::Heading { level: 6, .. }));
        assert!(matches!(doc.content[1], Block::Paragraph { .. }));
    }

    #[test]
    fn test_fenced_code_with_language() {
        let doc = parse("```rust extra\nfn main() {}\n```");
        assert_eq!(
            doc.content,
            vec![Block::CodeBlock {
                language: Some("rust".to_string()),
                content: "fn main() {}".to_string(),
            }]
        );
    }

    #[test]
    fn test_mermaid_and_math_fences() {
        let doc = parse("```mermaid\ngraph TD\nA-->B\n```\n\n```math\nx^2\n```");
        assert_eq!(
            doc.content,
            vec![
                Block::Diagram {
                    content: "graph TD\nA-->B".to_string()
                },
                Block::MathBlock {
                    content: "x^2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_nested_lists() {
        let doc = parse("- a\n  - b\n- c\n\n3. x\n4. y");
        let Block::List { kind, items, .. } = &doc.content[0] else {
            panic!("expected list");
        };
        assert_eq!(*kind, ListKind::Bullet);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0].content[1], Block::List { .. }));

        let Block::List { kind, start, items } = &doc.content[1] else {
            panic!("expected ordered list");
        };
        assert_eq!(*kind, ListKind::Ordered);
        assert_eq!(*start, Some(3));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_task_list() {
        let doc = parse("- [x] done\n- [ ] todo");
        let Block::List { kind, items, .. } = &doc.content[0] else {
            panic!("expected list");
        };
        assert_eq!(*kind, ListKind::Task);
        assert_eq!(items[0].checked, Some(true));
        assert_eq!(items[1].checked, Some(false));
    }

    #[test]
    fn test_blockquote_and_rule() {
        let doc = parse("> quoted\n> more\n\n---\n");
        assert!(matches!(&doc.content[0], Block::BlockQuote { content } if content.len() == 1));
        assert_eq!(doc.content[1], Block::ThematicBreak);
    }

    #[test]
    fn test_table_with_alignment() {
        let doc = parse("| a | b |\n|:--|--:|\n| 1 | 2 |\n| 3 | 4 |");
        let Block::Table {
            alignments,
            header,
            rows,
        } = &doc.content[0]
        else {
            panic!("expected table");
        };
        assert_eq!(
            alignments,
            &vec![ColumnAlignment::Left, ColumnAlignment::Right]
        );
        assert_eq!(header.as_ref().unwrap().cells.len(), 2);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_inline_spans() {
        let doc = parse("*em* ~~del~~ `code` [link](http://x.io \"T\") ![alt](a.png)");
        let Block::Paragraph { content } = &doc.content[0] else {
            panic!("expected paragraph");
        };
        assert!(matches!(content[0], Inline::Emphasis { .. }));
        assert!(content.iter().any(|i| matches!(i, Inline::Strikethrough { .. })));
        assert!(content
            .iter()
            .any(|i| matches!(i, Inline::Code { content } if content == "code")));
        assert!(content.iter().any(|i| matches!(
            i,
            Inline::Link { url, title: Some(t), .. } if url == "http://x.io" && t == "T"
        )));
        assert!(content
            .iter()
            .any(|i| matches!(i, Inline::Image { alt, .. } if alt == "alt")));
    }

    #[test]
    fn test_inline_and_display_math() {
        let doc = parse("Energy $E=mc^2$ here\n\n$$\\frac{a}{b}$$");
        let Block::Paragraph { content } = &doc.content[0] else {
            panic!("expected paragraph");
        };
        assert!(content.iter().any(|i| matches!(
            i,
            Inline::Math { content, display: false } if content == "E=mc^2"
        )));
        assert_eq!(
            doc.content[1],
            Block::MathBlock {
                content: "\\frac{a}{b}".to_string()
            }
        );
    }

    #[test]
    fn test_math_disabled() {
        let config = ParseConfig {
            math: false,
            ..ParseConfig::default()
        };
        let doc = MarkdownParser::new().parse("$x$", &config).unwrap();
        assert_eq!(
            doc.content,
            vec![Block::Paragraph {
                content: vec![Inline::text("$x$")]
            }]
        );
    }

    #[test]
    fn test_raw_html_degrades_to_text() {
        let doc = parse("<div>hi</div>\n\ntext <b>x</b>");
        assert_eq!(
            doc.content[0],
            Block::Paragraph {
                content: vec![Inline::text("<div>hi</div>")]
            }
        );
        let Block::Paragraph { content } = &doc.content[1] else {
            panic!("expected paragraph");
        };
        assert_eq!(content, &vec![Inline::text("text <b>x</b>")]);
    }

    #[test]
    fn test_unclosed_constructs_are_text() {
        let doc = parse("**never closed [nor this");
        assert_eq!(
            doc.content,
            vec![Block::Paragraph {
                content: vec![Inline::text("**never closed [nor this")]
            }]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").content.is_empty());
        assert!(parse("   \n\n  ").content.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let err = MarkdownParser::new()
            .parse_bytes(&[0x23, 0x20, 0xc3, 0x28], &ParseConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), crate::traits::ErrorCode::InvalidEncoding);
    }

    fn block_depth(blocks: &[Block]) -> usize {
        blocks
            .iter()
            .map(|block| match block {
                Block::BlockQuote { content } => 1 + block_depth(content),
                Block::List { items, .. } => {
                    1 + items.iter().map(|i| block_depth(&i.content)).max().unwrap_or(0)
                }
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    fn inline_depth(inlines: &[Inline]) -> usize {
        inlines
            .iter()
            .map(|inline| match inline {
                Inline::Emphasis { content } | Inline::Strong { content } => 1 + inline_depth(content),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let quotes = parse(&format!("{} x", ">".repeat(1000)));
        assert!(block_depth(&quotes.content) <= MAX_DEPTH);
        assert_eq!(quotes.word_count(), 1);

        let lists = parse(&format!("{}x", "- ".repeat(1000)));
        assert!(block_depth(&lists.content) <= MAX_DEPTH);
        assert_eq!(lists.word_count(), 1);

        let emphasis = parse(&format!("{}x{}", "*_".repeat(300), "_*".repeat(300)));
        let Block::Paragraph { content } = &emphasis.content[0] else {
            panic!("expected paragraph");
        };
        assert!(inline_depth(content) <= MAX_DEPTH);
    }

    #[test]
    fn test_shallow_nesting_is_kept() {
        let doc = parse("> > > deep");
        assert_eq!(block_depth(&doc.content), 3);
    }
}
