//! Regular-expression patterns
//!
//! Non-literal pattern text is parsed with `regex-syntax`. The pattern
//! escapes that are not regex syntax are rewritten first: `\zXY` becomes a
//! raw byte, `\"` a quote and `\0` a NUL. For UTF-16 the parsed expression
//! is rewritten so every character matches its two-byte code unit.
//!
//! Search is streaming, so anchors (`^`, `$`) are rejected and every
//! expression must consume at least one byte.

use super::{Encoding, PatternError};
use crate::rule::PatternDef;
use regex::bytes::{Regex, RegexBuilder};
use regex_syntax::hir::{Class, ClassBytes, ClassBytesRange, Hir, HirKind, Look, Repetition};
use regex_syntax::ParserBuilder;

/// Highest code unit a UTF-16 class is expanded for
const BMP_MAX: u32 = 0xFFFF;
const SURROGATES: (u32, u32) = (0xD800, 0xDFFF);

/// A compiled regular-expression pattern
#[derive(Debug, Clone)]
pub struct RegexPattern {
    /// Expression handed to the regex engine
    pub expression: String,
    /// Compiled matcher
    pub regex: Regex,
    /// Shortest possible match in bytes
    pub min_len: usize,
    /// Longest possible match in bytes, when bounded
    pub max_len: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Compile `def` as a regular expression in `encoding`
pub fn compile_regex(def: &PatternDef, encoding: Encoding) -> Result<RegexPattern, PatternError> {
    let pattern = def.pattern.as_str();
    let (unicode, endian) = match encoding {
        Encoding::Ascii => {
            if !pattern.is_ascii() {
                return Err(PatternError::Unencodable {
                    pattern: pattern.to_string(),
                    encoding: encoding.name().to_string(),
                });
            }
            (false, None)
        }
        Encoding::Utf8 => (true, None),
        Encoding::Utf16Le => (true, Some(Endian::Little)),
        Encoding::Utf16Be => (true, Some(Endian::Big)),
        Encoding::Other(_) => {
            return Err(PatternError::RegexEncoding {
                pattern: pattern.to_string(),
                encoding: encoding.name().to_string(),
            })
        }
    };

    let source = translate(pattern, endian.is_some())?;
    let mut builder = ParserBuilder::new();
    builder
        .unicode(unicode)
        .utf8(false)
        .case_insensitive(def.options.case_insensitive);
    let hir = builder
        .build()
        .parse(&source)
        .map_err(|e| regex_error(pattern, e.to_string()))?;
    check_looks(&hir, pattern, endian.is_some())?;

    let hir = match endian {
        Some(endian) => widen(&hir, endian).map_err(|m| regex_error(pattern, m))?,
        None => hir,
    };
    let min_len = match hir.properties().minimum_len() {
        Some(n) if n > 0 => n,
        _ => {
            return Err(PatternError::EmptyMatch {
                pattern: pattern.to_string(),
            })
        }
    };
    let max_len = hir.properties().maximum_len();

    let expression = hir.to_string();
    let regex = RegexBuilder::new(&expression)
        .unicode(unicode)
        .build()
        .map_err(|e| regex_error(pattern, e.to_string()))?;
    Ok(RegexPattern {
        expression,
        regex,
        min_len,
        max_len,
    })
}

fn regex_error(pattern: &str, message: String) -> PatternError {
    PatternError::Regex {
        pattern: pattern.to_string(),
        message,
    }
}

/// Rewrite the pattern-only escapes into regex syntax
fn translate(text: &str, wide: bool) -> Result<String, PatternError> {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();
    let mut class_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                class_depth += 1;
                out.push(c);
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(c);
            }
            '\\' => {
                let Some(escaped) = chars.next() else {
                    return Err(PatternError::invalid_escape(text, "trailing backslash"));
                };
                match escaped {
                    'z' => {
                        if wide {
                            return Err(PatternError::invalid_escape(
                                text,
                                "raw bytes are not supported in UTF-16 expressions",
                            ));
                        }
                        if class_depth > 0 {
                            return Err(PatternError::invalid_escape(
                                text,
                                "raw bytes are not supported inside a class",
                            ));
                        }
                        let hi = chars.next().filter(char::is_ascii_hexdigit);
                        let lo = chars.next().filter(char::is_ascii_hexdigit);
                        let (Some(hi), Some(lo)) = (hi, lo) else {
                            return Err(PatternError::invalid_escape(
                                text,
                                "expected two hex digits",
                            ));
                        };
                        out.push_str("(?-u:\\x");
                        out.push(hi);
                        out.push(lo);
                        out.push(')');
                    }
                    '"' => out.push('"'),
                    '0' => out.push_str("\\x00"),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn check_looks(hir: &Hir, pattern: &str, wide: bool) -> Result<(), PatternError> {
    let looks = hir.properties().look_set();
    let anchors = [
        Look::Start,
        Look::End,
        Look::StartLF,
        Look::EndLF,
        Look::StartCRLF,
        Look::EndCRLF,
    ];
    if anchors.iter().any(|l| looks.contains(*l)) {
        return Err(regex_error(
            pattern,
            "anchors are not supported in streaming search".to_string(),
        ));
    }
    if wide && !looks.is_empty() {
        return Err(regex_error(
            pattern,
            "word boundaries are not supported in UTF-16 expressions".to_string(),
        ));
    }
    Ok(())
}

/// Rewrite a parsed expression so it matches UTF-16 code units
fn widen(hir: &Hir, endian: Endian) -> Result<Hir, String> {
    let widened = match hir.kind() {
        HirKind::Empty => Hir::empty(),
        HirKind::Literal(lit) => {
            let text = std::str::from_utf8(&lit.0)
                .map_err(|_| "raw bytes are not supported in UTF-16 expressions".to_string())?;
            let mut bytes = Vec::with_capacity(text.len() * 2);
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit_bytes(unit, endian));
            }
            Hir::literal(bytes)
        }
        HirKind::Class(Class::Unicode(class)) => widen_ranges(
            class.iter().map(|r| (u32::from(r.start()), u32::from(r.end()))),
            endian,
        ),
        HirKind::Class(Class::Bytes(class)) => widen_ranges(
            class.iter().map(|r| (u32::from(r.start()), u32::from(r.end()))),
            endian,
        ),
        HirKind::Look(look) => {
            return Err(format!("{:?} is not supported in UTF-16 expressions", look))
        }
        HirKind::Repetition(rep) => Hir::repetition(Repetition {
            min: rep.min,
            max: rep.max,
            greedy: rep.greedy,
            sub: Box::new(widen(&rep.sub, endian)?),
        }),
        HirKind::Capture(cap) => widen(&cap.sub, endian)?,
        HirKind::Concat(subs) => Hir::concat(
            subs.iter()
                .map(|h| widen(h, endian))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        HirKind::Alternation(subs) => Hir::alternation(
            subs.iter()
                .map(|h| widen(h, endian))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };
    Ok(widened)
}

fn unit_bytes(unit: u16, endian: Endian) -> [u8; 2] {
    match endian {
        Endian::Little => unit.to_le_bytes(),
        Endian::Big => unit.to_be_bytes(),
    }
}

/// One alternative per high byte: a class over the low byte next to the
/// literal high byte. Characters outside the BMP are not matched.
fn widen_ranges(ranges: impl Iterator<Item = (u32, u32)>, endian: Endian) -> Hir {
    let mut alternatives = Vec::new();
    for (lo, hi) in ranges {
        let hi = hi.min(BMP_MAX);
        if lo > hi {
            continue;
        }
        // Lone surrogates are not characters
        if lo < SURROGATES.0 {
            push_units(lo, hi.min(SURROGATES.0 - 1), endian, &mut alternatives);
        }
        if hi > SURROGATES.1 {
            push_units(lo.max(SURROGATES.1 + 1), hi, endian, &mut alternatives);
        }
    }
    Hir::alternation(alternatives)
}

fn push_units(first: u32, last: u32, endian: Endian, out: &mut Vec<Hir>) {
    let mut start = first;
    while start <= last {
        let high = start >> 8;
        let end = last.min((high << 8) | 0xFF);
        let low = Hir::class(Class::Bytes(ClassBytes::new([ClassBytesRange::new(
            (start & 0xFF) as u8,
            (end & 0xFF) as u8,
        )])));
        let high = Hir::literal(vec![high as u8]);
        out.push(match endian {
            Endian::Little => Hir::concat(vec![low, high]),
            Endian::Big => Hir::concat(vec![high, low]),
        });
        start = end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(pattern: &str, encoding: &str, nocase: bool) -> Result<RegexPattern, PatternError> {
        let mut def = PatternDef::new(pattern);
        def.options.case_insensitive = nocase;
        let encoding = Encoding::from_label(encoding).unwrap();
        compile_regex(&def, encoding)
    }

    fn spans(re: &RegexPattern, data: &[u8]) -> Vec<(usize, usize)> {
        re.regex.find_iter(data).map(|m| (m.start(), m.end())).collect()
    }

    #[test]
    fn test_translate_pattern_escapes() {
        assert_eq!(translate(r"a\z00b", false).unwrap(), r"a(?-u:\x00)b");
        assert_eq!(translate(r#"\"\d\0"#, false).unwrap(), r#""\d\x00"#);
        assert!(translate(r"[\z41]", false).is_err());
        assert!(translate(r"\z41", true).is_err());
        assert!(translate(r"\z4", false).is_err());
    }

    #[test]
    fn test_ascii_expression() {
        let re = compile(r"\d{3}-\d{4}", "ASCII", false).unwrap();
        assert_eq!(spans(&re, b"call 555-1234 now"), vec![(5, 13)]);
        assert_eq!((re.min_len, re.max_len), (8, Some(8)));
    }

    #[test]
    fn test_raw_bytes_and_nocase() {
        let re = compile(r"MZ\z90.", "ASCII", true).unwrap();
        assert_eq!(spans(&re, b"..mz\x90\xff.."), vec![(2, 6)]);
    }

    #[test]
    fn test_utf16_expression() {
        let le = compile("fo+", "UTF-16LE", false).unwrap();
        assert_eq!(spans(&le, b"f\0o\0o\0x\0"), vec![(0, 6)]);
        let be = compile("[a-c]é", "UTF-16BE", false).unwrap();
        assert_eq!(spans(&be, b"\0b\0\xe9"), vec![(0, 4)]);
        assert_eq!(be.max_len, Some(4));
    }

    #[test]
    fn test_rejected_expressions() {
        assert!(matches!(
            compile("a*", "ASCII", false),
            Err(PatternError::EmptyMatch { .. })
        ));
        assert!(matches!(
            compile("^abc", "ASCII", false),
            Err(PatternError::Regex { .. })
        ));
        assert!(matches!(
            compile(r"\bword", "UTF-16LE", false),
            Err(PatternError::Regex { .. })
        ));
        assert!(matches!(
            compile("a+", "windows-1252", false),
            Err(PatternError::RegexEncoding { .. })
        ));
        assert!(matches!(
            compile("(unclosed", "ASCII", false),
            Err(PatternError::Regex { .. })
        ));
    }
}
