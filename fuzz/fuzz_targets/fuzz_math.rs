// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, bool)| {
    let (formula, display) = data;
    let _ = imparse_core::math_to_html(formula, display);
    let _ = imparse_core::math_to_svg(formula, display);
    let _ = imparse_core::diagram::validate(formula);
});
