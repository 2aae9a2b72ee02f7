#![no_main]
//! Structured escape fuzzing
//!
//! Builds inputs dense in the characters the escapers rewrite, so the
//! interesting branches are hit far more often than with raw bytes.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use polldb::{escape, unescape, EscapeStyle};

/// One piece of a literal
#[derive(Debug, Arbitrary)]
enum Piece<'a> {
    Quote,
    DoubleQuote,
    Backslash,
    Nul,
    Newline,
    CarriageReturn,
    CtrlZ,
    Text(&'a str),
}

impl Piece<'_> {
    fn push_to(&self, out: &mut String) {
        match self {
            Piece::Quote => out.push('\''),
            Piece::DoubleQuote => out.push('"'),
            Piece::Backslash => out.push('\\'),
            Piece::Nul => out.push('\0'),
            Piece::Newline => out.push('\n'),
            Piece::CarriageReturn => out.push('\r'),
            Piece::CtrlZ => out.push('\x1a'),
            Piece::Text(text) => out.push_str(text),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct Literal<'a> {
    backslash_style: bool,
    pieces: Vec<Piece<'a>>,
}

fuzz_target!(|input: Literal| {
    let mut text = String::new();
    for piece in &input.pieces {
        piece.push_to(&mut text);
    }

    let style = if input.backslash_style {
        EscapeStyle::Backslash
    } else {
        EscapeStyle::QuoteDoubling
    };

    let escaped = escape(&text, style);
    assert!(escaped.len() <= text.len() * 2);
    assert_eq!(unescape(&escaped, style), text);
});
