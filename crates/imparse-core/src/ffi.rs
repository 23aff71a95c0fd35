// SPDX-License-Identifier: AGPL-3.0-or-later
//! C ABI for host UI layers
//!
//! Every operation returns a heap [`ParseResult`] envelope that the caller
//! owns until it hands it back to [`free_parse_result`]. Plain strings are
//! released with [`free_string`]. Panics never cross the boundary; they are
//! reported as internal errors.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::style::StyleConfig;
use crate::traits::{EngineError, ErrorCode, Result};

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Result envelope returned by every fallible operation
#[repr(C)]
pub struct ParseResult {
    pub success: bool,
    /// JSON or markup on success, null otherwise
    pub payload: *mut c_char,
    /// 0 on success, see [`ErrorCode`]
    pub error_code: i32,
    /// Human-readable message on failure, null otherwise
    pub error_message: *mut c_char,
}

impl ParseResult {
    fn success(payload: CString) -> Self {
        Self {
            success: true,
            payload: payload.into_raw(),
            error_code: ErrorCode::Success.as_i32(),
            error_message: ptr::null_mut(),
        }
    }

    fn failure(error: &EngineError) -> Self {
        let message = error.to_string().replace('\0', " ");
        Self {
            success: false,
            payload: ptr::null_mut(),
            error_code: error.code().as_i32(),
            error_message: CString::new(message).unwrap_or_default().into_raw(),
        }
    }
}

/// Run `op` and box its outcome as an envelope
fn envelope(op: impl FnOnce() -> Result<String>) -> *mut ParseResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|_| Err(EngineError::Internal("panic in entry point".to_string())))
        .and_then(|payload| {
            CString::new(payload)
                .map_err(|e| EngineError::Serialization(format!("interior NUL at byte {}", e.nul_position())))
        });

    let result = match outcome {
        Ok(payload) => ParseResult::success(payload),
        Err(e) => {
            tracing::debug!(code = e.code().as_i32(), error = %e, "operation failed");
            ParseResult::failure(&e)
        }
    };
    Box::into_raw(Box::new(result))
}

/// Borrow a required C string
///
/// # Safety
/// `ptr` must be null or a valid NUL-terminated string that outlives `'a`.
unsafe fn required<'a>(ptr: *const c_char, name: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(EngineError::NullPointer(name));
    }
    Ok(CStr::from_ptr(ptr).to_str()?)
}

/// Borrow an optional C string; null means absent
///
/// # Safety
/// Same as [`required`].
unsafe fn optional<'a>(ptr: *const c_char) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    Ok(Some(CStr::from_ptr(ptr).to_str()?))
}

fn raw_string(value: Result<String>) -> *mut c_char {
    match value.map(CString::new) {
        Ok(Ok(s)) => s.into_raw(),
        _ => ptr::null_mut(),
    }
}

/// Parse Markdown into AST JSON
///
/// # Safety
/// `text` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn parse_markdown_to_json(text: *const c_char) -> *mut ParseResult {
    envelope(|| {
        let doc = crate::parse_markdown(required(text, "text")?)?;
        crate::serialize_ast(&doc)
    })
}

/// Parse a delta into AST JSON
///
/// # Safety
/// `delta_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn parse_delta_to_json(delta_json: *const c_char) -> *mut ParseResult {
    envelope(|| {
        let doc = crate::parse_delta(required(delta_json, "delta_json")?)?;
        crate::serialize_ast(&doc)
    })
}

/// Render Markdown with the default style
///
/// # Safety
/// `text` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn markdown_to_html(text: *const c_char) -> *mut ParseResult {
    envelope(|| crate::markdown_to_html(required(text, "text")?))
}

/// Render a delta with the default style
///
/// # Safety
/// `delta_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn delta_to_html(delta_json: *const c_char) -> *mut ParseResult {
    envelope(|| crate::delta_to_html(required(delta_json, "delta_json")?))
}

/// Render Markdown with a style override; a null config means the default
///
/// # Safety
/// `text` and `config_json` must each be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn markdown_to_html_with_config(
    text: *const c_char,
    config_json: *const c_char,
) -> *mut ParseResult {
    envelope(|| {
        let text = required(text, "text")?;
        crate::markdown_to_html_with_config(text, optional(config_json)?)
    })
}

/// Render a delta with a style override; a null config means the default
///
/// # Safety
/// `delta_json` and `config_json` must each be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn delta_to_html_with_config(
    delta_json: *const c_char,
    config_json: *const c_char,
) -> *mut ParseResult {
    envelope(|| {
        let delta = required(delta_json, "delta_json")?;
        crate::delta_to_html_with_config(delta, optional(config_json)?)
    })
}

/// Light preset as JSON. Release with [`free_string`].
#[no_mangle]
pub extern "C" fn get_default_style_config() -> *mut c_char {
    raw_string(StyleConfig::default().to_json())
}

/// Dark preset as JSON. Release with [`free_string`].
#[no_mangle]
pub extern "C" fn get_dark_style_config() -> *mut c_char {
    raw_string(StyleConfig::dark().to_json())
}

/// Typeset a formula as HTML
///
/// # Safety
/// `formula` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn math_to_html(formula: *const c_char, display: bool) -> *mut ParseResult {
    envelope(|| crate::math_to_html(required(formula, "formula")?, display))
}

/// Typeset a formula as SVG
///
/// # Safety
/// `formula` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn math_to_svg(formula: *const c_char, display: bool) -> *mut ParseResult {
    envelope(|| crate::math_to_svg(required(formula, "formula")?, display))
}

/// Wrap a Mermaid diagram in a themed HTML page
///
/// # Safety
/// All arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn mermaid_to_html(
    source: *const c_char,
    text_color_hex: *const c_char,
    background_color_hex: *const c_char,
) -> *mut ParseResult {
    envelope(|| {
        crate::mermaid_to_html(
            required(source, "source")?,
            required(text_color_hex, "text_color_hex")?,
            required(background_color_hex, "background_color_hex")?,
        )
    })
}

/// Estimated height in px of an AST laid out `width` px wide, or -1 when the
/// AST cannot be read
///
/// # Safety
/// `ast_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn calculate_ast_height(ast_json: *const c_char, width: f32) -> f32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        crate::calculate_ast_height(required(ast_json, "ast_json")?, width)
    }));
    match outcome {
        Ok(Ok(height)) => height,
        Ok(Err(e)) => {
            tracing::debug!(code = e.code().as_i32(), error = %e, "height estimate failed");
            -1.0
        }
        Err(_) => -1.0,
    }
}

/// Release an envelope and both of its strings. Null is ignored.
///
/// # Safety
/// `result` must be null or a pointer returned by this library that has not
/// been released yet.
#[no_mangle]
pub unsafe extern "C" fn free_parse_result(result: *mut ParseResult) {
    if result.is_null() {
        return;
    }
    let result = Box::from_raw(result);
    free_string(result.payload);
    free_string(result.error_message);
}

/// Release a string returned by this library. Null is ignored.
///
/// # Safety
/// `s` must be null or a pointer returned by this library that has not been
/// released yet.
#[no_mangle]
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Library version. Static; never release it.
#[no_mangle]
pub extern "C" fn imparse_version() -> *const c_char {
    VERSION.as_ptr().cast()
}

/// Install a stderr log subscriber. `filter` uses `EnvFilter` syntax; null
/// reads `IMPARSE_LOG` and falls back to `warn`. Returns false when the
/// filter is invalid or a subscriber is already installed.
///
/// # Safety
/// `filter` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn imparse_init_logging(filter: *const c_char) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = match optional(filter) {
        Ok(Some(directives)) => match EnvFilter::try_new(directives) {
            Ok(filter) => filter,
            Err(_) => return false,
        },
        Ok(None) => {
            EnvFilter::try_from_env("IMPARSE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
        }
        Err(_) => return false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
