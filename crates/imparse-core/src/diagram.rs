// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mermaid diagram front end
//!
//! Layout is left to mermaid.js on the host side. This module checks that a
//! source is plausibly a diagram (known header, balanced brackets) and wraps
//! it either as a fragment for the HTML renderer or as a standalone page with
//! theme variables derived from two colors.

use crate::formats::html::escape_html;
use crate::style::is_safe_color;
use crate::traits::{EngineError, Result};
use std::fmt::Write;

const MERMAID_SCRIPT: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramKind {
    Flowchart,
    Sequence,
    Class,
    State,
    Er,
    Gantt,
    Pie,
    Journey,
    GitGraph,
    Mindmap,
    Timeline,
}

impl DiagramKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::Sequence => "sequence",
            Self::Class => "class",
            Self::State => "state",
            Self::Er => "er",
            Self::Gantt => "gantt",
            Self::Pie => "pie",
            Self::Journey => "journey",
            Self::GitGraph => "gitgraph",
            Self::Mindmap => "mindmap",
            Self::Timeline => "timeline",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "graph" | "flowchart" => Self::Flowchart,
            "sequencediagram" => Self::Sequence,
            "classdiagram" => Self::Class,
            "statediagram" | "statediagram-v2" => Self::State,
            "erdiagram" => Self::Er,
            "gantt" => Self::Gantt,
            "pie" => Self::Pie,
            "journey" => Self::Journey,
            "gitgraph" => Self::GitGraph,
            "mindmap" => Self::Mindmap,
            "timeline" => Self::Timeline,
            _ => return None,
        })
    }

    /// Kinds whose statements carry free text after a `:`
    const fn has_free_text(self) -> bool {
        !matches!(self, Self::Flowchart | Self::Mindmap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphDirection {
    TB,
    TD,
    LR,
    RL,
    BT,
}

impl GraphDirection {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tb" => Some(Self::TB),
            "td" => Some(Self::TD),
            "lr" => Some(Self::LR),
            "rl" => Some(Self::RL),
            "bt" => Some(Self::BT),
            _ => None,
        }
    }
}

/// What the header line declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagramHeader {
    pub kind: DiagramKind,
    pub direction: Option<GraphDirection>,
    /// 1-based line of the header
    pub line: usize,
}

fn diagram_error(line: usize, message: impl Into<String>) -> EngineError {
    EngineError::Diagram {
        line,
        message: message.into(),
    }
}

/// Lines that carry no diagram statements: blanks, `%%` comments and
/// `%%{init}%%` directives
fn is_insignificant(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("%%")
}

fn parse_header(line: &str, number: usize) -> Result<DiagramHeader> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens
        .next()
        .unwrap_or_default()
        .trim_end_matches(';')
        .to_ascii_lowercase();
    let kind = DiagramKind::from_keyword(&keyword)
        .ok_or_else(|| diagram_error(number, format!("unknown diagram type {keyword:?}")))?;

    let direction = match (kind, tokens.next()) {
        (DiagramKind::Flowchart, Some(token)) => {
            let token = token.trim_end_matches(';');
            Some(GraphDirection::parse(token).ok_or_else(|| {
                diagram_error(
                    number,
                    format!("invalid direction {token:?}; expected TB, TD, BT, RL or LR"),
                )
            })?)
        }
        _ => None,
    };

    Ok(DiagramHeader {
        kind,
        direction,
        line: number,
    })
}

/// Check a diagram source and return its header
#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
pub fn validate(source: &str) -> Result<DiagramHeader> {
    let mut lines = source.lines().enumerate().map(|(i, line)| (i + 1, line));

    // optional YAML front matter
    let mut header = None;
    let mut in_front_matter = false;
    for (number, line) in lines.by_ref() {
        if line.trim() == "---" {
            in_front_matter = !in_front_matter;
            continue;
        }
        if in_front_matter || is_insignificant(line) {
            continue;
        }
        header = Some(parse_header(line, number)?);
        break;
    }
    if in_front_matter {
        return Err(diagram_error(1, "unterminated front matter"));
    }
    let header = header.ok_or_else(|| diagram_error(1, "empty diagram"))?;

    let mut braces: Vec<usize> = Vec::new();
    for (number, line) in lines {
        if is_insignificant(line) {
            continue;
        }
        check_line(line, number, header.kind, &mut braces)?;
    }
    if let Some(line) = braces.first() {
        return Err(diagram_error(*line, "unclosed '{'"));
    }

    tracing::debug!(kind = header.kind.as_str(), "diagram accepted");
    Ok(header)
}

/// Round and square brackets must balance within a line. Curly braces may
/// span lines (class, state and ER bodies), so their open lines are pushed
/// onto `braces`.
///
/// Flowchart edge labels (`-->|text|`) are skipped, and `>` opens an
/// asymmetric node (`A>label]`) only straight after a node id. Mindmap
/// cloud and bang shapes (`id)cloud(`, `id))bang((`) open with `)`.
fn check_line(line: &str, number: usize, kind: DiagramKind, braces: &mut Vec<usize>) -> Result<()> {
    // ER cardinality markers like `||--o{` are not brackets
    let relationship = kind == DiagramKind::Er && (line.contains("--") || line.contains(".."));

    // (opener, expected closer)
    let mut stack: Vec<(char, char)> = Vec::new();
    let mut quoted = false;
    let mut label = false;
    let mut prev = ' ';
    for c in line.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if label {
            label = quoted || c != '|';
        } else if !quoted {
            let expected = stack.last().map(|&(_, close)| close);
            match c {
                '|' if kind == DiagramKind::Flowchart && stack.is_empty() => label = true,
                '(' if expected == Some('(') => {
                    stack.pop();
                }
                '(' => stack.push(('(', ')')),
                '[' => stack.push(('[', ']')),
                '>' if kind == DiagramKind::Flowchart && stack.is_empty() && is_id_char(prev) => {
                    stack.push(('>', ']'))
                }
                ')' | ']' if expected == Some(c) => {
                    stack.pop();
                }
                ')' if kind == DiagramKind::Mindmap && matches!(expected, None | Some('(')) => {
                    stack.push((')', '('))
                }
                ')' | ']' => return Err(diagram_error(number, format!("unbalanced '{c}'"))),
                '{' if !relationship => braces.push(number),
                '}' if !relationship => {
                    if braces.pop().is_none() {
                        return Err(diagram_error(number, "unbalanced '}'"));
                    }
                }
                ':' if stack.is_empty() && kind.has_free_text() => break,
                _ => {}
            }
        }
        prev = c;
    }

    if quoted {
        return Err(diagram_error(number, "unterminated string"));
    }
    match stack.last() {
        Some((open, _)) => Err(diagram_error(number, format!("unclosed '{open}'"))),
        None => Ok(()),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// An sRGB color with optional alpha
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    /// Accepts `#rgb`, `#rrggbb` and `#rrggbbaa`; alpha is ignored for theming
    fn parse_hex(field: &'static str, value: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidColor {
            field,
            value: value.to_string(),
        };
        let hex = value.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let digits: Vec<u8> = hex
                    .chars()
                    .map(|c| c.to_digit(16).map_or(0, |d| d as u8 * 17))
                    .collect();
                Ok(Self {
                    r: digits[0],
                    g: digits[1],
                    b: digits[2],
                })
            }
            6 | 8 => Ok(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            _ => Err(invalid()),
        }
    }

    /// Relative luminance in 0..=1
    fn luminance(self) -> f32 {
        fn linear(c: u8) -> f32 {
            let c = f32::from(c) / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }

    /// `self` moved toward `other` by `t`
    fn mix(self, other: Self, t: f32) -> Self {
        let lerp = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Self {
            r: lerp(self.r, other.r),
            g: lerp(self.g, other.g),
            b: lerp(self.b, other.b),
        }
    }

    fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Inline element for embedding in a rendered document. Colors are CSS
/// values from the style configuration.
pub fn render_fragment(source: &str, text_color: &str, background_color: &str) -> Result<String> {
    for (field, value) in [
        ("text_color", text_color),
        ("background_color", background_color),
    ] {
        if !is_safe_color(value) {
            return Err(EngineError::InvalidColor {
                field,
                value: value.to_string(),
            });
        }
    }
    let header = validate(source)?;

    Ok(format!(
        "<div class=\"mermaid imparse-diagram\" data-diagram=\"{}\" style=\"color:{text_color};background-color:{background_color};text-align:center;margin:1em 0;\">{}</div>",
        header.kind.as_str(),
        escape_html(source.trim()),
    ))
}

/// Standalone HTML page that loads mermaid.js and renders one diagram
#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
pub fn render_page(source: &str, text_color: &str, background_color: &str) -> Result<String> {
    let text = Rgb::parse_hex("text_color", text_color)?;
    let background = Rgb::parse_hex("background_color", background_color)?;
    validate(source)?;

    let dark = background.luminance() < 0.5;
    let variables = [
        ("background", background.hex()),
        ("primaryColor", background.mix(text, 0.08).hex()),
        ("primaryTextColor", text.hex()),
        ("primaryBorderColor", background.mix(text, 0.5).hex()),
        ("secondaryColor", background.mix(text, 0.15).hex()),
        ("tertiaryColor", background.mix(text, 0.04).hex()),
        ("lineColor", background.mix(text, 0.7).hex()),
        ("textColor", text.hex()),
        ("mainBkg", background.mix(text, 0.08).hex()),
        ("nodeBorder", background.mix(text, 0.5).hex()),
        ("noteBkgColor", background.mix(text, 0.12).hex()),
        ("noteTextColor", text.hex()),
    ];
    let mut theme = serde_json::Map::new();
    theme.insert("darkMode".to_string(), dark.into());
    for (name, value) in variables {
        theme.insert(name.to_string(), value.into());
    }
    let config = serde_json::json!({
        "startOnLoad": true,
        "securityLevel": "strict",
        "theme": "base",
        "themeVariables": theme,
    });

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    let _ = writeln!(
        page,
        "<style>\nhtml, body {{ margin: 0; padding: 0; background-color: {bg}; color: {fg}; }}\n.mermaid {{ display: flex; justify-content: center; padding: 16px; }}\n</style>",
        bg = background.hex(),
        fg = text.hex(),
    );
    page.push_str("</head>\n<body>\n<div class=\"mermaid\">\n");
    page.push_str(&escape_html(source.trim()));
    page.push_str("\n</div>\n");
    let _ = writeln!(page, "<script src=\"{MERMAID_SCRIPT}\"></script>");
    let _ = writeln!(page, "<script>\nmermaid.initialize({config});\n</script>");
    page.push_str("</body>\n</html>\n");
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorCode;
    use pretty_assertions::assert_eq;

    fn line_of(err: EngineError) -> usize {
        match err {
            EngineError::Diagram { line, .. } => line,
            other => panic!("expected diagram error, got {other:?}"),
        }
    }

    #[test]
    fn test_headers() {
        let h = validate("graph TD\n  A-->B").unwrap();
        assert_eq!(h.kind, DiagramKind::Flowchart);
        assert_eq!(h.direction, Some(GraphDirection::TD));

        let h = validate("flowchart lr;\nA --> B").unwrap();
        assert_eq!(h.direction, Some(GraphDirection::LR));

        for (source, kind) in [
            ("sequenceDiagram\nAlice->>Bob: Hi (there", DiagramKind::Sequence),
            ("stateDiagram-v2\n[*] --> Still", DiagramKind::State),
            ("classDiagram\nclass Animal {\n  +int age\n}", DiagramKind::Class),
            ("pie title Pets\n\"Dogs\" : 386", DiagramKind::Pie),
            ("gitGraph\ncommit", DiagramKind::GitGraph),
            ("timeline\n2021 : launch", DiagramKind::Timeline),
        ] {
            assert_eq!(validate(source).unwrap().kind, kind, "{source}");
        }
    }

    #[test]
    fn test_comments_directives_and_front_matter_skipped() {
        let h = validate("%% comment\n%%{init: {\"theme\":\"dark\"}}%%\n\ngraph LR\nA-->B").unwrap();
        assert_eq!(h.line, 4);
        let h = validate("---\ntitle: Flow\n---\nflowchart TB\nA-->B").unwrap();
        assert_eq!(h.line, 4);
        assert!(validate("---\ntitle: x\ngraph TD").is_err());
    }

    #[test]
    fn test_unknown_header_and_empty() {
        let err = validate("not a diagram").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDiagram);
        assert!(err.to_string().contains("unknown diagram type"));
        assert!(validate("").is_err());
        assert!(validate("%% only a comment").is_err());
        assert_eq!(line_of(validate("graph XY\nA-->B").unwrap_err()), 1);
    }

    #[test]
    fn test_bracket_balance() {
        assert!(validate("graph TD\nA[Start] --> B(Round) --> C{Choice}").is_ok());
        assert!(validate("graph TD\nA[\"label with ( paren\"] --> B").is_ok());
        assert!(validate("graph TD\nA>flag] --> B").is_ok());
        assert_eq!(line_of(validate("graph TD\nA-->B\nC[oops --> D").unwrap_err()), 3);
        assert_eq!(line_of(validate("graph TD\nA) --> B").unwrap_err()), 2);
        assert_eq!(line_of(validate("classDiagram\nclass A {\n+x").unwrap_err()), 2);
        assert_eq!(line_of(validate("stateDiagram\n}").unwrap_err()), 2);
    }

    #[test]
    fn test_labels_and_shapes_with_stray_brackets() {
        for source in [
            "mindmap\n  root((Root))\n    id)cloud(\n    id))bang((\n    id[square]",
            "graph TD\nA -->|x>y| B",
            "flowchart LR\nA -- go -->|a(b| B",
            "graph TD\nA[a>b] --> C",
            "graph TD\nA_1>flag] --> B",
        ] {
            assert!(validate(source).is_ok(), "{source}");
        }
        assert_eq!(line_of(validate("mindmap\n  root\n    id)cloud").unwrap_err()), 3);
        assert_eq!(line_of(validate("graph TD\nA -->|x| B)").unwrap_err()), 2);
        assert_eq!(line_of(validate("graph TD\nA[a>b --> C").unwrap_err()), 2);
    }

    #[test]
    fn test_er_cardinality_is_not_a_brace() {
        let source = "erDiagram\nCUSTOMER ||--o{ ORDER : places\nORDER }|..|{ LINE-ITEM : contains\nCUSTOMER {\n  string name\n}";
        assert!(validate(source).is_ok());
    }

    #[test]
    fn test_colors() {
        assert_eq!(
            Rgb::parse_hex("text_color", "#fff").unwrap(),
            Rgb {
                r: 255,
                g: 255,
                b: 255
            }
        );
        assert!(Rgb::parse_hex("text_color", "#112233").is_ok());
        assert!(Rgb::parse_hex("text_color", "#11223344").is_ok());
        for bad in ["red", "#12", "#12345", "#gggggg", "112233", ""] {
            let err = Rgb::parse_hex("text_color", bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidDiagram, "{bad}");
        }
    }

    #[test]
    fn test_page() {
        let page = render_page("graph TD\nA-->B", "#333333", "#ffffff").unwrap();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(MERMAID_SCRIPT));
        assert!(page.contains("A--&gt;B"));
        assert!(page.contains("\"darkMode\":false"));
        assert!(page.contains("\"primaryTextColor\":\"#333333\""));

        let dark = render_page("graph TD\nA-->B", "#f2f2f7", "#1c1c1e").unwrap();
        assert!(dark.contains("\"darkMode\":true"));
        assert_ne!(page, dark);
    }

    #[test]
    fn test_page_config_is_json() {
        let page = render_page("graph TD\nA-->B", "#f2f2f7", "#1c1c1e").unwrap();
        let start = page.find("mermaid.initialize(").unwrap() + "mermaid.initialize(".len();
        let end = page[start..].find(");\n").unwrap() + start;
        let config: serde_json::Value = serde_json::from_str(&page[start..end]).unwrap();
        assert_eq!(config["securityLevel"], "strict");
        assert_eq!(config["theme"], "base");
        assert_eq!(config["themeVariables"]["darkMode"], true);
        assert_eq!(config["themeVariables"]["background"], "#1c1c1e");
        assert_eq!(config["themeVariables"]["textColor"], "#f2f2f7");
    }

    #[test]
    fn test_page_rejects_bad_input() {
        let err = render_page("graph TD", "blue", "#ffffff").unwrap_err();
        assert!(matches!(err, EngineError::InvalidColor { field: "text_color", .. }));
        let err = render_page("nonsense", "#000", "#fff").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDiagram);
    }

    #[test]
    fn test_fragment() {
        let html = render_fragment("graph TD\nA-->B", "#333333", "#ffffff").unwrap();
        assert!(html.starts_with("<div class=\"mermaid imparse-diagram\" data-diagram=\"flowchart\""));
        assert!(render_fragment("graph TD", "red\" x=\"", "#fff").is_err());
    }
}
