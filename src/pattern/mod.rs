//! Multi-pattern search for `grep` sections
//!
//! Patterns from every rule are compiled into one program. Literal and
//! `fixed` patterns go into Aho-Corasick automata (one case-sensitive, one
//! ASCII case-insensitive); everything else is a byte regex searched over
//! an overlapping window. The program is immutable and shared; each stream
//! is searched with its own `SearchContext`.

/// Pattern encodings
pub mod encoding;
/// Escape handling for pattern text
pub mod escape;
/// Regular-expression patterns
pub mod expr;
/// Program builder, program and search context
pub mod fsm;

pub use encoding::Encoding;
pub use expr::RegexPattern;
pub use fsm::{FsmBuilder, Hit, PatternInfo, PatternProgram, SearchContext};

use crate::rule::PatternDef;
use escape::{needs_regex, parse_units, Unit};
use thiserror::Error;

/// Errors raised while compiling patterns
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Regular expression failed to parse or compile
    #[error("Invalid regular expression \"{pattern}\": {message}")]
    Regex {
        /// Pattern text
        pattern: String,
        /// Parser or compiler message
        message: String,
    },

    /// Regular expressions are limited to ASCII, UTF-8 and UTF-16
    #[error("Regular expression \"{pattern}\" cannot be searched as {encoding}")]
    RegexEncoding {
        /// Pattern text
        pattern: String,
        /// Encoding name
        encoding: String,
    },

    /// Regular expression can match without consuming input
    #[error("Regular expression \"{pattern}\" matches the empty string")]
    EmptyMatch {
        /// Pattern text
        pattern: String,
    },

    /// Malformed escape sequence
    #[error("Invalid escape in pattern \"{pattern}\": {message}")]
    InvalidEscape {
        /// Pattern text
        pattern: String,
        /// What is wrong with it
        message: String,
    },

    /// Encoding name not recognized
    #[error("Unknown encoding {0}")]
    UnknownEncoding(String),

    /// Pattern has characters the encoding cannot represent
    #[error("Pattern \"{pattern}\" cannot be encoded as {encoding}")]
    Unencodable {
        /// Pattern text
        pattern: String,
        /// Encoding name
        encoding: String,
    },

    /// Pattern compiles to no bytes
    #[error("Empty pattern")]
    Empty,

    /// Automaton construction failed
    #[error("Failed to build pattern automaton: {0}")]
    Build(String),
}

impl PatternError {
    /// Create an invalid-escape error
    pub fn invalid_escape(pattern: &str, message: impl Into<String>) -> Self {
        Self::InvalidEscape {
            pattern: pattern.to_string(),
            message: message.into(),
        }
    }
}

/// A literal pattern reduced to the bytes to search for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralPattern {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Match ASCII letters regardless of case
    pub case_insensitive: bool,
}

/// A compiled pattern definition
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// Searched with Aho-Corasick
    Literal(LiteralPattern),
    /// Searched with a byte regex
    Regex(RegexPattern),
}

impl CompiledPattern {
    /// Encoded bytes of a literal pattern
    pub fn literal_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Literal(lit) => Some(&lit.bytes),
            Self::Regex(_) => None,
        }
    }
}

/// Interpret escapes and encode a pattern definition
pub fn compile_pattern(def: &PatternDef) -> Result<CompiledPattern, PatternError> {
    let encoding = Encoding::from_label(&def.encoding)
        .ok_or_else(|| PatternError::UnknownEncoding(def.encoding.clone()))?;
    if def.pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    if !def.options.fixed_string && needs_regex(&def.pattern) {
        return expr::compile_regex(def, encoding).map(CompiledPattern::Regex);
    }
    compile_literal(def, encoding).map(CompiledPattern::Literal)
}

fn compile_literal(def: &PatternDef, encoding: Encoding) -> Result<LiteralPattern, PatternError> {
    let units = parse_units(&def.pattern, def.options.fixed_string)?;

    let mut bytes = Vec::with_capacity(units.len() * 2);
    let mut run = String::new();
    for unit in units {
        match unit {
            Unit::Char(c) => run.push(c),
            Unit::Byte(b) => {
                if !run.is_empty() {
                    encoding.encode_into(&run, &mut bytes)?;
                    run.clear();
                }
                bytes.push(b);
            }
        }
    }
    if !run.is_empty() {
        encoding.encode_into(&run, &mut bytes)?;
    }

    if bytes.is_empty() {
        return Err(PatternError::Empty);
    }
    Ok(LiteralPattern {
        bytes,
        case_insensitive: def.options.case_insensitive,
    })
}
