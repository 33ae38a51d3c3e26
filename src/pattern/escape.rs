//! Escape handling for grep pattern text
//!
//! Literal patterns use a small escape vocabulary:
//! - `\zXY` is the raw byte `0xXY`, copied as-is in every encoding
//! - `\xXY` is the character U+00XY, encoded like any other character
//! - `\\`, `\"`, `\n`, `\r`, `\t`, `\0`
//! - a backslash before a regex operator makes the operator literal
//!
//! Text with an unescaped operator or any other escape is a regular
//! expression and is compiled by [`super::expr`].
//! With `fixed`, only `\\` and `\"` are unescaped and everything else is literal.

use super::PatternError;

/// Characters that are operators in a regular expression
pub const REGEX_OPERATORS: &[char] = &[
    '.', '*', '+', '?', '|', '(', ')', '[', ']', '{', '}', '^', '$',
];

/// One element of a parsed pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// A character, to be encoded
    Char(char),
    /// A raw byte
    Byte(u8),
}

/// Whether non-fixed pattern text needs the regex engine
pub fn needs_regex(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('z' | 'x' | 'n' | 'r' | 't' | '0' | '\\' | '"') | None => {}
                Some(c) if REGEX_OPERATORS.contains(&c) => {}
                Some(_) => return true,
            }
        } else if REGEX_OPERATORS.contains(&c) {
            return true;
        }
    }
    false
}

/// Split literal pattern text into characters and raw bytes
pub fn parse_units(text: &str, fixed: bool) -> Result<Vec<Unit>, PatternError> {
    let mut units = Vec::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            units.push(Unit::Char(c));
            continue;
        }

        let Some(escaped) = chars.next() else {
            return Err(PatternError::invalid_escape(text, "trailing backslash"));
        };
        if fixed {
            match escaped {
                '\\' | '"' => units.push(Unit::Char(escaped)),
                other => {
                    units.push(Unit::Char('\\'));
                    units.push(Unit::Char(other));
                }
            }
            continue;
        }

        let unit = match escaped {
            'z' => Unit::Byte(hex_pair(text, &mut chars)?),
            'x' => Unit::Char(char::from(hex_pair(text, &mut chars)?)),
            'n' => Unit::Char('\n'),
            'r' => Unit::Char('\r'),
            't' => Unit::Char('\t'),
            '0' => Unit::Char('\0'),
            '\\' | '"' => Unit::Char(escaped),
            c if REGEX_OPERATORS.contains(&c) => Unit::Char(c),
            other => {
                return Err(PatternError::invalid_escape(
                    text,
                    format!("unknown escape \\{}", other),
                ))
            }
        };
        units.push(unit);
    }
    Ok(units)
}

fn hex_pair(text: &str, chars: &mut std::str::Chars<'_>) -> Result<u8, PatternError> {
    let hi = chars.next().and_then(|c| c.to_digit(16));
    let lo = chars.next().and_then(|c| c.to_digit(16));
    match (hi, lo) {
        (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
        _ => Err(PatternError::invalid_escape(
            text,
            "expected two hex digits",
        )),
    }
}
