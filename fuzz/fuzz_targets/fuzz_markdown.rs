// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = imparse_core::parse_markdown_bytes(data) {
        let _ = imparse_core::serialize_ast(&doc);
        let _ = imparse_core::estimate_height(&doc, 320.0, &imparse_core::StyleConfig::default());
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = imparse_core::markdown_to_html(text);
    }
});
