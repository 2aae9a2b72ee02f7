//! String escaping for SQL literals.
//!
//! Every escape sequence is two ASCII bytes replacing one ASCII byte, so the
//! output never exceeds twice the input length. Callers building C-style
//! buffers add one byte for the terminator.

/// Escaping dialect of a native client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeStyle {
    /// MySQL-style backslash escapes (`\0`, `\n`, `\r`, `\\`, `\'`, `\"`, `\Z`)
    Backslash,
    /// SQL standard / SQLite: single quotes are doubled
    #[default]
    QuoteDoubling,
}

/// Upper bound of the escaped length for an input of `len` bytes, terminator included.
pub const fn escaped_capacity(len: usize) -> usize {
    len * 2 + 1
}

pub fn escape(input: &str, style: EscapeStyle) -> String {
    let mut out = String::with_capacity(escaped_capacity(input.len()));
    match style {
        EscapeStyle::Backslash => {
            for c in input.chars() {
                match c {
                    '\0' => out.push_str("\\0"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '"' => out.push_str("\\\""),
                    '\x1a' => out.push_str("\\Z"),
                    other => out.push(other),
                }
            }
        }
        EscapeStyle::QuoteDoubling => {
            for c in input.chars() {
                if c == '\'' {
                    out.push('\'');
                }
                out.push(c);
            }
        }
    }
    out
}

/// Inverse of `escape` for well-formed input.
///
/// Unknown backslash sequences decode to the escaped character, and a lone
/// trailing backslash or quote is kept as is.
pub fn unescape(input: &str, style: EscapeStyle) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    match style {
        EscapeStyle::Backslash => {
            while let Some(c) = chars.next() {
                if c != '\\' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('0') => out.push('\0'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('Z') => out.push('\x1a'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            }
        }
        EscapeStyle::QuoteDoubling => {
            let mut chars = chars.peekable();
            while let Some(c) = chars.next() {
                out.push(c);
                if c == '\'' && chars.peek() == Some(&'\'') {
                    chars.next();
                }
            }
        }
    }
    out
}
