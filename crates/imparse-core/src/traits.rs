// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parser and Renderer traits, shared configuration and the engine error type

use crate::ast::{Document, SourceFormat};
use std::io::Read;

/// Stable numeric error codes reported across the C boundary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,
    InvalidEncoding = 1,
    InvalidDelta = 2,
    InvalidMath = 3,
    InvalidDiagram = 4,
    InvalidStyleConfig = 5,
    NullPointer = 6,
    InvalidAst = 7,
    Internal = 8,
}

impl ErrorCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Error type for every parse and render operation
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid UTF-8 input at byte {valid_up_to}")]
    InvalidEncoding { valid_up_to: usize },

    #[error("Invalid delta JSON: {0}")]
    InvalidDeltaJson(#[source] serde_json::Error),

    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Invalid delta operation at index {index}: {message}")]
    InvalidDeltaOp { index: usize, message: String },

    #[error("Math error at offset {offset}: {message}")]
    Math { offset: usize, message: String },

    #[error("Diagram error on line {line}: {message}")]
    Diagram { line: usize, message: String },

    #[error("Invalid color {value:?} for {field}")]
    InvalidColor { field: &'static str, value: String },

    #[error("Invalid style configuration: {0}")]
    StyleConfig(String),

    #[error("Invalid AST JSON: {0}")]
    InvalidAst(#[source] serde_json::Error),

    #[error("Required argument {0} is null")]
    NullPointer(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable error code for this failure category
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidEncoding { .. } => ErrorCode::InvalidEncoding,
            Self::InvalidDeltaJson(_) | Self::InvalidDelta(_) | Self::InvalidDeltaOp { .. } => {
                ErrorCode::InvalidDelta
            }
            Self::Math { .. } => ErrorCode::InvalidMath,
            Self::Diagram { .. } | Self::InvalidColor { .. } => ErrorCode::InvalidDiagram,
            Self::StyleConfig(_) => ErrorCode::InvalidStyleConfig,
            Self::InvalidAst(_) => ErrorCode::InvalidAst,
            Self::NullPointer(_) => ErrorCode::NullPointer,
            Self::Serialization(_) | Self::IoError(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub(crate) fn delta_op(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidDeltaOp {
            index,
            message: message.into(),
        }
    }
}

impl From<std::str::Utf8Error> for EngineError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::InvalidEncoding {
            valid_up_to: e.valid_up_to(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Configuration for parsing
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Recognize `$…$` and `$$…$$` formulas in text
    pub math: bool,
    /// Convert straight quotes and dashes to typographic ones (Markdown only)
    pub smart_punctuation: bool,
    /// Keep raw source on the document
    pub preserve_raw_source: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            math: true,
            smart_punctuation: false,
            preserve_raw_source: false,
        }
    }
}

/// Parser trait: convert source format to AST
pub trait Parser: Send + Sync {
    /// The source format this parser handles
    fn format(&self) -> SourceFormat;

    /// Parse a string into a Document
    fn parse(&self, input: &str, config: &ParseConfig) -> Result<Document>;

    /// Parse raw bytes, reporting invalid UTF-8 instead of guessing
    fn parse_bytes(&self, input: &[u8], config: &ParseConfig) -> Result<Document> {
        let input = std::str::from_utf8(input)?;
        self.parse(input, config)
    }
}

/// Extension trait for streaming input (not dyn-compatible)
pub trait ParserExt: Parser {
    /// Parse from a reader
    fn parse_reader<R: Read>(&self, mut reader: R, config: &ParseConfig) -> Result<Document> {
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;
        self.parse_bytes(&input, config)
    }
}

impl<T: Parser> ParserExt for T {}

/// Renderer trait: convert AST to markup
pub trait Renderer: Send + Sync {
    /// Render a Document to a string
    fn render(&self, doc: &Document) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::Success.as_i32(), 0);
        assert_eq!(ErrorCode::InvalidEncoding.as_i32(), 1);
        assert_eq!(ErrorCode::InvalidDelta.as_i32(), 2);
        assert_eq!(ErrorCode::InvalidMath.as_i32(), 3);
        assert_eq!(ErrorCode::InvalidDiagram.as_i32(), 4);
        assert_eq!(ErrorCode::InvalidStyleConfig.as_i32(), 5);
        assert_eq!(ErrorCode::NullPointer.as_i32(), 6);
        assert_eq!(ErrorCode::InvalidAst.as_i32(), 7);
        assert_eq!(ErrorCode::Internal.as_i32(), 8);
    }

    #[test]
    fn test_utf8_error_maps_to_encoding() {
        let bytes = [b'a', 0xff, b'b'];
        let err: EngineError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::InvalidEncoding);
        assert!(err.to_string().contains("byte 1"));
    }

    #[test]
    fn test_parse_reader() {
        use crate::formats::{DeltaParser, MarkdownParser};

        let doc = MarkdownParser::new()
            .parse_reader(std::io::Cursor::new("# Hi"), &ParseConfig::default())
            .unwrap();
        assert_eq!(doc.content.len(), 1);

        let err = DeltaParser::new()
            .parse_reader(&[0xff, 0xfe][..], &ParseConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEncoding);
    }

    #[test]
    fn test_every_non_success_code_is_nonzero() {
        let errors = [
            EngineError::delta_op(3, "missing insert"),
            EngineError::Math {
                offset: 0,
                message: "x".into(),
            },
            EngineError::StyleConfig("bad".into()),
            EngineError::NullPointer("input"),
            EngineError::Internal("panic".into()),
        ];
        for e in errors {
            assert_ne!(e.code(), ErrorCode::Success);
        }
    }
}
