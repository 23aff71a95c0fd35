// SPDX-License-Identifier: AGPL-3.0-or-later
//! Format handlers: source parsers and the HTML renderer

pub mod delta;
pub mod html;
pub mod markdown;

pub use delta::DeltaParser;
pub use html::HtmlRenderer;
pub use markdown::MarkdownParser;

use crate::ast::Inline;

/// Append an inline, merging it into a preceding text run when both are text
pub(crate) fn push_inline(out: &mut Vec<Inline>, inline: Inline) {
    if let Inline::Text { content } = &inline {
        if content.is_empty() {
            return;
        }
        if let Some(Inline::Text { content: prev }) = out.last_mut() {
            prev.push_str(content);
            return;
        }
    }
    out.push(inline);
}
