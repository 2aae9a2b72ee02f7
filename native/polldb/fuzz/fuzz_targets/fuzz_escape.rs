#![no_main]
//! Fuzz test for escape/unescape
//!
//! Escaping runs on host-supplied text destined for SQL literals. It must never
//! panic, never grow past twice the input, and unescape must invert it.

use libfuzzer_sys::fuzz_target;
use polldb::{escape, unescape, EscapeStyle};

fuzz_target!(|data: &[u8]| {
    // Convert bytes to string (if valid UTF-8)
    if let Ok(text) = std::str::from_utf8(data) {
        for style in [EscapeStyle::Backslash, EscapeStyle::QuoteDoubling] {
            let escaped = escape(text, style);
            assert!(escaped.len() <= text.len() * 2);
            assert_eq!(unescape(&escaped, style), text);
        }
    }
});
