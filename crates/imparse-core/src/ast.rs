// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unified document AST shared by the Markdown and delta parsers
//!
//! Both parsers produce this tree and every renderer consumes it, so a renderer
//! never needs to know which source format a document came from.

use serde::{Deserialize, Serialize};

/// Source format identifier for provenance tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Delta,
}

impl SourceFormat {
    /// Short display name
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Markdown => "MD",
            Self::Delta => "DELTA",
        }
    }

    pub const ALL: [Self; 2] = [Self::Markdown, Self::Delta];
}

/// The root document node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source_format: SourceFormat,
    #[serde(default)]
    pub content: Vec<Block>,
    /// Preserved raw source (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_source: Option<String>,
}

impl Document {
    /// Create a new empty document
    pub fn new(format: SourceFormat) -> Self {
        Self {
            source_format: format,
            content: Vec::new(),
            raw_source: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Count words in the document
    pub fn word_count(&self) -> usize {
        self.content.iter().map(|b| b.word_count()).sum()
    }

    /// Count characters in the document
    pub fn char_count(&self) -> usize {
        self.content.iter().map(|b| b.char_count()).sum()
    }
}

/// Block-level elements (structural)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Plain paragraph
    Paragraph { content: Vec<Inline> },

    /// Heading with level 1-6
    Heading { level: u8, content: Vec<Inline> },

    /// Ordered, bullet or task list
    List {
        kind: ListKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<u32>,
        items: Vec<ListItem>,
    },

    /// Code block with optional language
    CodeBlock {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        content: String,
    },

    /// Block quote (may be nested)
    BlockQuote { content: Vec<Block> },

    /// Horizontal rule / thematic break
    ThematicBreak,

    /// Table with an optional header row
    Table {
        #[serde(default)]
        alignments: Vec<ColumnAlignment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header: Option<TableRow>,
        rows: Vec<TableRow>,
    },

    /// Display formula (LaTeX source)
    MathBlock { content: String },

    /// Diagram description (Mermaid source)
    Diagram { content: String },
}

impl Block {
    /// Count words in this block
    pub fn word_count(&self) -> usize {
        match self {
            Block::Paragraph { content } | Block::Heading { content, .. } => {
                content.iter().map(|i| i.word_count()).sum()
            }
            Block::CodeBlock { content, .. } => content.split_whitespace().count(),
            Block::BlockQuote { content } => content.iter().map(|b| b.word_count()).sum(),
            Block::List { items, .. } => items
                .iter()
                .flat_map(|i| &i.content)
                .map(|b| b.word_count())
                .sum(),
            Block::Table { header, rows, .. } => header
                .iter()
                .chain(rows)
                .flat_map(|r| &r.cells)
                .flat_map(|c| &c.content)
                .map(|i| i.word_count())
                .sum(),
            Block::ThematicBreak | Block::MathBlock { .. } | Block::Diagram { .. } => 0,
        }
    }

    /// Count characters in this block
    pub fn char_count(&self) -> usize {
        match self {
            Block::Paragraph { content } | Block::Heading { content, .. } => {
                content.iter().map(|i| i.char_count()).sum()
            }
            Block::CodeBlock { content, .. } => content.chars().count(),
            Block::BlockQuote { content } => content.iter().map(|b| b.char_count()).sum(),
            Block::List { items, .. } => items
                .iter()
                .flat_map(|i| &i.content)
                .map(|b| b.char_count())
                .sum(),
            Block::Table { header, rows, .. } => header
                .iter()
                .chain(rows)
                .flat_map(|r| &r.cells)
                .flat_map(|c| &c.content)
                .map(|i| i.char_count())
                .sum(),
            Block::ThematicBreak | Block::MathBlock { .. } | Block::Diagram { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Ordered,
    Task,
}

/// A list entry. Owned by exactly one `Block::List`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub content: Vec<Block>,
    /// `None` for plain items, `Some(done)` for task items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnAlignment {
    Left,
    Center,
    Right,
    #[default]
    Default,
}

impl ColumnAlignment {
    /// CSS `text-align` value, if the column asks for one
    pub const fn css(&self) -> Option<&'static str> {
        match self {
            Self::Left => Some("left"),
            Self::Center => Some("center"),
            Self::Right => Some("right"),
            Self::Default => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub content: Vec<Inline>,
}

/// Inline elements (character-level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    /// Plain text
    Text { content: String },

    /// Emphasis (usually italic)
    Emphasis { content: Vec<Inline> },

    /// Strong emphasis (usually bold)
    Strong { content: Vec<Inline> },

    /// Strikethrough
    Strikethrough { content: Vec<Inline> },

    /// Underline
    Underline { content: Vec<Inline> },

    /// Foreground color (CSS color string)
    Color { color: String, content: Vec<Inline> },

    /// Inline code
    Code { content: String },

    /// Hyperlink. Never contains another link.
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: Vec<Inline>,
    },

    /// Image
    Image {
        url: String,
        #[serde(default)]
        alt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f32>,
    },

    /// Formula inside running text. `display` is set for `$$…$$` that shares
    /// its line with other content.
    Math {
        content: String,
        #[serde(default)]
        display: bool,
    },

    /// @-mention of a user or group
    Mention { id: String, name: String },

    /// Emoji glyph or shortcode
    Emoji { content: String },

    /// Line break (hard break)
    LineBreak,

    /// Soft break (may become space or newline)
    SoftBreak,
}

impl Inline {
    pub fn text(content: impl Into<String>) -> Self {
        Inline::Text {
            content: content.into(),
        }
    }

    /// Child spans of a styling wrapper
    pub fn children(&self) -> &[Inline] {
        match self {
            Inline::Emphasis { content }
            | Inline::Strong { content }
            | Inline::Strikethrough { content }
            | Inline::Underline { content }
            | Inline::Color { content, .. }
            | Inline::Link { content, .. } => content,
            _ => &[],
        }
    }

    /// Count words in this inline element
    pub fn word_count(&self) -> usize {
        match self {
            Inline::Text { content } | Inline::Code { content } => {
                content.split_whitespace().count()
            }
            Inline::Mention { .. } => 1,
            _ => self.children().iter().map(|i| i.word_count()).sum(),
        }
    }

    /// Count characters in this inline element
    pub fn char_count(&self) -> usize {
        match self {
            Inline::Text { content } | Inline::Code { content } => content.chars().count(),
            Inline::Mention { name, .. } => name.chars().count() + 1,
            Inline::Emoji { content } => content.chars().count(),
            _ => self.children().iter().map(|i| i.char_count()).sum(),
        }
    }

    /// Visible text of this span, as a reader would see it
    pub fn plain_text(&self, out: &mut String) {
        match self {
            Inline::Text { content } | Inline::Code { content } | Inline::Emoji { content } => {
                out.push_str(content)
            }
            Inline::Math { content, .. } => out.push_str(content),
            Inline::Mention { name, .. } => {
                out.push('@');
                out.push_str(name);
            }
            Inline::Image { alt, .. } => out.push_str(alt),
            Inline::LineBreak => out.push('\n'),
            Inline::SoftBreak => out.push(' '),
            _ => {
                for child in self.children() {
                    child.plain_text(out);
                }
            }
        }
    }
}

/// Concatenated visible text of a run of inlines
pub fn inlines_to_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        inline.plain_text(&mut out);
    }
    out
}
