// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quill delta parser
//!
//! A delta is a flat list of operations. Text and embeds accumulate on the
//! current line; a newline insert closes the line and carries that line's
//! block attributes. Consecutive lines of the same kind are then folded into
//! block quotes, code blocks and nested lists.

use crate::ast::{Block, Document, Inline, ListItem, ListKind, SourceFormat};
use crate::formats::push_inline;
use crate::traits::{EngineError, ParseConfig, Parser, Result};
use serde_json::{Map, Value};
use std::iter::Peekable;

type Attributes = Map<String, Value>;

/// Deepest list nesting honored; deeper `indent` values are clamped
const MAX_INDENT: usize = 8;

/// Delta parser (Quill operation lists)
pub struct DeltaParser;

impl DeltaParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeltaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DeltaParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Delta
    }

    #[tracing::instrument(level = "debug", skip_all, fields(len = input.len()))]
    fn parse(&self, input: &str, config: &ParseConfig) -> Result<Document> {
        let value: Value = serde_json::from_str(input).map_err(EngineError::InvalidDeltaJson)?;
        let ops = op_list(&value)?;

        let mut lines = LineBuilder::new(config.math);
        for (index, op) in ops.iter().enumerate() {
            if let Op::Insert { value, attributes } = decode_op(index, op)? {
                lines.insert(value, attributes);
            }
        }

        let content = fold_lines(lines.finish());
        tracing::debug!(ops = ops.len(), blocks = content.len(), "parsed delta");

        Ok(Document {
            source_format: SourceFormat::Delta,
            content,
            raw_source: config.preserve_raw_source.then(|| input.to_string()),
        })
    }
}

fn op_list(value: &Value) -> Result<&[Value]> {
    match value {
        Value::Array(ops) => Ok(ops),
        Value::Object(delta) => match delta.get("ops") {
            Some(Value::Array(ops)) => Ok(ops),
            Some(_) => Err(EngineError::InvalidDelta("\"ops\" must be an array".into())),
            None => Err(EngineError::InvalidDelta("missing \"ops\" array".into())),
        },
        _ => Err(EngineError::InvalidDelta(
            "expected an object with \"ops\" or an array of operations".into(),
        )),
    }
}

enum Op<'a> {
    Insert {
        value: InsertValue<'a>,
        attributes: Option<&'a Attributes>,
    },
    Skip,
}

enum InsertValue<'a> {
    Text(&'a str),
    Embed(&'a Attributes),
}

fn decode_op(index: usize, op: &Value) -> Result<Op<'_>> {
    let Value::Object(op) = op else {
        return Err(EngineError::delta_op(index, "operation must be an object"));
    };

    let attributes = match op.get("attributes") {
        None | Some(Value::Null) => None,
        Some(Value::Object(attributes)) => Some(attributes),
        Some(_) => return Err(EngineError::delta_op(index, "attributes must be an object")),
    };

    let actions = ["insert", "retain", "delete"]
        .iter()
        .filter(|key| op.contains_key(**key))
        .count();
    if actions != 1 {
        return Err(EngineError::delta_op(
            index,
            "operation needs exactly one of insert, retain or delete",
        ));
    }

    if let Some(insert) = op.get("insert") {
        let value = match insert {
            Value::String(text) => InsertValue::Text(text),
            Value::Object(embed) if !embed.is_empty() => InsertValue::Embed(embed),
            _ => {
                return Err(EngineError::delta_op(
                    index,
                    "insert must be a string or an embed object",
                ))
            }
        };
        return Ok(Op::Insert { value, attributes });
    }

    if let Some(retain) = op.get("retain") {
        return match retain.as_u64() {
            Some(_) => Ok(Op::Skip),
            None => Err(EngineError::delta_op(
                index,
                "retain must be a non-negative integer",
            )),
        };
    }

    match op.get("delete").and_then(Value::as_u64) {
        Some(count) if count > 0 => Ok(Op::Skip),
        _ => Err(EngineError::delta_op(index, "delete must be a positive integer")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LineKind {
    Paragraph,
    Heading(u8),
    Quote,
    Code(Option<String>),
    List {
        kind: ListKind,
        checked: Option<bool>,
        indent: usize,
    },
    Rule,
}

#[derive(Debug)]
struct Line {
    kind: LineKind,
    content: Vec<Inline>,
    /// Unstyled text as inserted, used for code lines
    raw: String,
}

struct LineBuilder {
    math: bool,
    content: Vec<Inline>,
    raw: String,
    lines: Vec<Line>,
}

impl LineBuilder {
    fn new(math: bool) -> Self {
        Self {
            math,
            content: Vec::new(),
            raw: String::new(),
            lines: Vec::new(),
        }
    }

    fn insert(&mut self, value: InsertValue<'_>, attributes: Option<&Attributes>) {
        match value {
            InsertValue::Text(text) => {
                let mut segments = text.split('\n');
                if let Some(first) = segments.next() {
                    self.push_text(first, attributes);
                }
                for segment in segments {
                    self.end_line(block_kind(attributes));
                    self.push_text(segment, attributes);
                }
            }
            InsertValue::Embed(embed) => self.push_embed(embed, attributes),
        }
    }

    fn push_text(&mut self, text: &str, attributes: Option<&Attributes>) {
        if text.is_empty() {
            return;
        }
        self.raw.push_str(text);

        if is_set(attributes, "code") {
            let leaf = Inline::Code {
                content: text.to_string(),
            };
            push_styled(&mut self.content, style(attributes, leaf));
            return;
        }

        if !self.math {
            push_styled(&mut self.content, style(attributes, Inline::text(text)));
            return;
        }

        for segment in split_math(text) {
            let leaf = match segment {
                Segment::Text(text) => Inline::text(text),
                Segment::Math { formula, display } => Inline::Math {
                    content: formula.to_string(),
                    display,
                },
            };
            push_styled(&mut self.content, style(attributes, leaf));
        }
    }

    fn push_embed(&mut self, embed: &Attributes, attributes: Option<&Attributes>) {
        let Some((kind, payload)) = embed.iter().next() else {
            return;
        };

        let leaf = match kind.as_str() {
            "image" | "imageContainer" => image_embed(payload, attributes),
            "formula" => payload.as_str().map(|formula| Inline::Math {
                content: formula.trim().to_string(),
                display: false,
            }),
            "mention" => mention_embed(payload),
            "emoji" => match payload {
                Value::String(content) => Some(Inline::Emoji {
                    content: content.clone(),
                }),
                Value::Object(emoji) => emoji.get("content").and_then(Value::as_str).map(|c| {
                    Inline::Emoji {
                        content: c.to_string(),
                    }
                }),
                _ => None,
            },
            "divider" | "hr" => {
                self.push_rule();
                return;
            }
            other => {
                tracing::debug!(embed = other, "dropping unsupported delta embed");
                return;
            }
        };

        match leaf {
            Some(leaf) => push_styled(&mut self.content, style(attributes, leaf)),
            None => tracing::debug!(embed = kind.as_str(), "dropping malformed delta embed"),
        }
    }

    /// A divider stands on its own line
    fn push_rule(&mut self) {
        if !self.content.is_empty() {
            self.end_line(LineKind::Paragraph);
        }
        self.lines.push(Line {
            kind: LineKind::Rule,
            content: Vec::new(),
            raw: String::new(),
        });
    }

    fn end_line(&mut self, kind: LineKind) {
        self.lines.push(Line {
            kind,
            content: std::mem::take(&mut self.content),
            raw: std::mem::take(&mut self.raw),
        });
    }

    /// Text after the last newline still forms a line
    fn finish(mut self) -> Vec<Line> {
        if !self.content.is_empty() {
            self.end_line(LineKind::Paragraph);
        }
        self.lines
    }
}

fn is_set(attributes: Option<&Attributes>, key: &str) -> bool {
    attribute(attributes, key).is_some_and(|v| {
        matches!(v, Value::Bool(true)) || v.as_str().is_some_and(|s| !s.is_empty())
    })
}

fn block_kind(attributes: Option<&Attributes>) -> LineKind {
    let Some(attributes) = attributes else {
        return LineKind::Paragraph;
    };

    match attributes.get("code-block") {
        Some(Value::Bool(true)) => return LineKind::Code(None),
        Some(Value::String(language)) => {
            let language = language.trim();
            let language = (!language.is_empty() && language != "plain" && language != "true")
                .then(|| language.to_string());
            return LineKind::Code(language);
        }
        _ => {}
    }

    if let Some(level) = attributes.get("header").and_then(header_level) {
        return LineKind::Heading(level);
    }

    if let Some(list) = attributes.get("list").and_then(Value::as_str) {
        let indent = attributes
            .get("indent")
            .and_then(Value::as_u64)
            .map_or(0, |n| usize::try_from(n).unwrap_or(MAX_INDENT))
            .min(MAX_INDENT);
        let (kind, checked) = match list {
            "ordered" => (ListKind::Ordered, None),
            "checked" => (ListKind::Task, Some(true)),
            "unchecked" => (ListKind::Task, Some(false)),
            _ => (ListKind::Bullet, None),
        };
        return LineKind::List {
            kind,
            checked,
            indent,
        };
    }

    if is_set(Some(attributes), "blockquote") {
        return LineKind::Quote;
    }

    LineKind::Paragraph
}

fn header_level(value: &Value) -> Option<u8> {
    let level = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (1..=6).contains(&level).then_some(level as u8)
}

/// Wrap a leaf in its inline styles. Outermost first:
/// link, bold, italic, underline, strike, color.
fn style(attributes: Option<&Attributes>, leaf: Inline) -> Inline {
    let Some(attributes) = attributes else {
        return leaf;
    };
    let mut inline = leaf;

    if let Some(color) = attributes.get("color").and_then(Value::as_str) {
        if !color.trim().is_empty() {
            inline = Inline::Color {
                color: color.trim().to_string(),
                content: vec![inline],
            };
        }
    }
    if is_set(Some(attributes), "strike") {
        inline = Inline::Strikethrough {
            content: vec![inline],
        };
    }
    if is_set(Some(attributes), "underline") {
        inline = Inline::Underline {
            content: vec![inline],
        };
    }
    if is_set(Some(attributes), "italic") {
        inline = Inline::Emphasis {
            content: vec![inline],
        };
    }
    if is_set(Some(attributes), "bold") {
        inline = Inline::Strong {
            content: vec![inline],
        };
    }
    if let Some(url) = attributes.get("link").and_then(Value::as_str) {
        inline = Inline::Link {
            url: url.to_string(),
            title: None,
            content: vec![inline],
        };
    }
    inline
}

/// Append a styled span, folding it into the previous span when both carry
/// the same wrapper so `**ab**` split over two ops stays one `strong`.
fn push_styled(out: &mut Vec<Inline>, inline: Inline) {
    let inline = match out.last_mut() {
        Some(last) => match merge(last, inline) {
            Some(rest) => rest,
            None => return,
        },
        None => inline,
    };
    push_inline(out, inline);
}

fn merge(last: &mut Inline, next: Inline) -> Option<Inline> {
    let (target, children) = match (last, next) {
        (Inline::Strong { content: a }, Inline::Strong { content: b })
        | (Inline::Emphasis { content: a }, Inline::Emphasis { content: b })
        | (Inline::Underline { content: a }, Inline::Underline { content: b })
        | (Inline::Strikethrough { content: a }, Inline::Strikethrough { content: b }) => (a, b),
        (
            Inline::Color {
                color: c,
                content: a,
            },
            Inline::Color {
                color: d,
                content: b,
            },
        ) if *c == d => (a, b),
        (
            Inline::Link {
                url: u,
                title: t,
                content: a,
            },
            Inline::Link {
                url: v,
                title: w,
                content: b,
            },
        ) if *u == v && *t == w => (a, b),
        (_, next) => return Some(next),
    };
    for child in children {
        push_styled(target, child);
    }
    None
}

fn image_embed(payload: &Value, attributes: Option<&Attributes>) -> Option<Inline> {
    let (url, width, height) = match payload {
        Value::String(url) => (url.as_str(), None, None),
        Value::Object(image) => (
            image.get("url").or_else(|| image.get("src")).and_then(Value::as_str)?,
            image.get("width").and_then(dimension),
            image.get("height").and_then(dimension),
        ),
        _ => return None,
    };
    if url.trim().is_empty() {
        return None;
    }

    Some(Inline::Image {
        url: url.to_string(),
        alt: attribute(attributes, "alt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        title: None,
        width: width.or_else(|| attribute(attributes, "width").and_then(dimension)),
        height: height.or_else(|| attribute(attributes, "height").and_then(dimension)),
    })
}

fn attribute<'a>(attributes: Option<&'a Attributes>, key: &str) -> Option<&'a Value> {
    attributes.and_then(|a| a.get(key))
}

/// `320`, `"320"` or `"320px"`
fn dimension(value: &Value) -> Option<f32> {
    let n = match value {
        Value::Number(n) => n.as_f64()? as f32,
        Value::String(s) => s.trim().trim_end_matches("px").trim().parse().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then_some(n)
}

fn mention_embed(payload: &Value) -> Option<Inline> {
    let Value::Object(mention) = payload else {
        return None;
    };
    let id = match mention.get("id")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let name = mention
        .get("name")
        .or_else(|| mention.get("value"))
        .and_then(Value::as_str)
        .map_or_else(|| id.clone(), str::to_string);
    Some(Inline::Mention { id, name })
}

enum Segment<'a> {
    Text(&'a str),
    Math { formula: &'a str, display: bool },
}

/// Split `$…$` and `$$…$$` formulas out of running text.
///
/// Inline formulas may not start or end with whitespace, so prices like
/// `$5 and $10` stay text. `\$` never opens a formula.
fn split_math(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'$' => {}
            _ => {
                i += 1;
                continue;
            }
        }

        let display = bytes.get(i + 1) == Some(&b'$');
        let fence = if display { 2 } else { 1 };
        let body_start = i + fence;
        let rest = &text[body_start..];
        let close = if display {
            rest.find("$$")
        } else {
            rest.find('$')
        };

        match close {
            Some(len) if is_formula(&rest[..len], display) => {
                if start < i {
                    segments.push(Segment::Text(&text[start..i]));
                }
                segments.push(Segment::Math {
                    formula: rest[..len].trim(),
                    display,
                });
                i = body_start + len + fence;
                start = i;
            }
            _ => i += fence,
        }
    }

    if start < text.len() {
        segments.push(Segment::Text(&text[start..]));
    }
    segments
}

fn is_formula(body: &str, display: bool) -> bool {
    if body.trim().is_empty() {
        return false;
    }
    display || !(body.starts_with(char::is_whitespace) || body.ends_with(char::is_whitespace))
}

struct ListLine {
    kind: ListKind,
    checked: Option<bool>,
    indent: usize,
    content: Vec<Inline>,
}

fn fold_lines(lines: Vec<Line>) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut lines = lines.into_iter().peekable();

    while let Some(line) = lines.next() {
        match line.kind {
            LineKind::Paragraph => blocks.extend(paragraph(line.content)),

            LineKind::Heading(level) => blocks.push(Block::Heading {
                level,
                content: line.content,
            }),

            LineKind::Rule => blocks.push(Block::ThematicBreak),

            LineKind::Quote => {
                let mut content: Vec<Block> = paragraph(line.content).into_iter().collect();
                while let Some(next) = lines.next_if(|l| l.kind == LineKind::Quote) {
                    content.extend(paragraph(next.content));
                }
                blocks.push(Block::BlockQuote { content });
            }

            LineKind::Code(language) => {
                let mut source = line.raw;
                while let Some(next) =
                    lines.next_if(|l| matches!(&l.kind, LineKind::Code(lang) if *lang == language))
                {
                    source.push('\n');
                    source.push_str(&next.raw);
                }
                blocks.push(code_block(language, source));
            }

            LineKind::List {
                kind,
                checked,
                indent,
            } => {
                let mut run = vec![ListLine {
                    kind,
                    checked,
                    indent,
                    content: line.content,
                }];
                while let Some(next) = lines.next_if(|l| matches!(l.kind, LineKind::List { .. })) {
                    if let LineKind::List {
                        kind,
                        checked,
                        indent,
                    } = next.kind
                    {
                        run.push(ListLine {
                            kind,
                            checked,
                            indent,
                            content: next.content,
                        });
                    }
                }
                blocks.extend(build_lists(&mut run.into_iter().peekable(), 0));
            }
        }
    }
    blocks
}

/// A blank line is spacing, not content; a lone formula is a formula block
fn paragraph(content: Vec<Inline>) -> Option<Block> {
    let significant: Vec<&Inline> = content
        .iter()
        .filter(|i| !matches!(i, Inline::Text { content } if content.trim().is_empty()))
        .collect();

    match significant.as_slice() {
        [] => None,
        [Inline::Math { content: formula, .. }] => Some(Block::MathBlock {
            content: formula.clone(),
        }),
        _ => Some(Block::Paragraph { content }),
    }
}

fn code_block(language: Option<String>, content: String) -> Block {
    match language.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("mermaid") => Block::Diagram { content },
        Some("math") | Some("latex") | Some("tex") => Block::MathBlock { content },
        _ => Block::CodeBlock { language, content },
    }
}

/// Build the lists at nesting `depth`; deeper lines attach to the last item.
/// A change of kind at the same depth starts a new list.
fn build_lists<I>(lines: &mut Peekable<I>, depth: usize) -> Vec<Block>
where
    I: Iterator<Item = ListLine>,
{
    let mut blocks = Vec::new();
    let mut current: Option<(ListKind, Vec<ListItem>)> = None;

    while let Some((indent, kind)) = lines.peek().map(|l| (l.indent, l.kind)) {
        if indent < depth {
            break;
        }

        if indent > depth {
            let nested = build_lists(lines, depth + 1);
            let (_, items) = current.get_or_insert_with(|| (kind, Vec::new()));
            if items.is_empty() {
                items.push(ListItem {
                    content: Vec::new(),
                    checked: None,
                });
            }
            if let Some(last) = items.last_mut() {
                last.content.extend(nested);
            }
            continue;
        }

        let Some(line) = lines.next() else {
            break;
        };
        if current.as_ref().is_some_and(|(k, _)| *k != line.kind) {
            blocks.extend(current.take().map(finish_list));
        }
        let (_, items) = current.get_or_insert_with(|| (line.kind, Vec::new()));
        items.push(ListItem {
            content: paragraph(line.content).into_iter().collect(),
            checked: line.checked,
        });
    }

    blocks.extend(current.map(finish_list));
    blocks
}

fn finish_list((kind, items): (ListKind, Vec<ListItem>)) -> Block {
    Block::List {
        kind,
        start: None,
        items,
    }
}
