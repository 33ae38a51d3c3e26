//! Parsed rule declarations

use crate::ast::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

/// Hash algorithm named in a `hash:` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// MD5
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
    /// BLAKE3
    Blake3,
}

impl HashAlgorithm {
    /// Keyword spelling
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One comma-separated line of a `hash:` section. A file matches the record
/// when every listed digest matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashRecord {
    /// Expected digest per algorithm, lowercase hex
    pub digests: BTreeMap<HashAlgorithm, String>,
}

/// `hash:` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSection {
    /// Alternative records; any one matching is enough
    pub records: Vec<FileHashRecord>,
    /// Union of the algorithms used by the records
    pub algorithms: BTreeSet<HashAlgorithm>,
}

/// Modifiers after a pattern string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOptions {
    /// `nocase`
    pub case_insensitive: bool,
    /// `fixed`: the pattern text is a literal
    pub fixed_string: bool,
}

/// Encoding used when a pattern declares none
pub const DEFAULT_ENCODING: &str = "ASCII";

/// A pattern in one encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDef {
    /// Pattern text as written, or `\zXY` sequences for hex literals
    pub pattern: String,
    /// Modifiers
    pub options: PatternOptions,
    /// Encoding name as written in the rule
    pub encoding: String,
}

impl PatternDef {
    /// Pattern in the default encoding with default options
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            options: PatternOptions::default(),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }
}

/// `grep:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepSection {
    /// Named patterns, one definition per encoding
    pub patterns: BTreeMap<String, Vec<PatternDef>>,
    /// Condition over the patterns
    pub condition: Node,
}

/// A parsed `rule NAME { ... }` declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name
    pub name: String,
    /// Stable identity: BLAKE3 hex over the declaration's lexemes
    pub id: String,
    /// `meta:` key/value pairs
    pub meta: BTreeMap<String, String>,
    /// `hash:` section
    pub hash: Option<HashSection>,
    /// `file_metadata:` predicate
    pub file_metadata: Option<Node>,
    /// `signature:` predicate
    pub signature: Option<Node>,
    /// `grep:` section
    pub grep: Option<GrepSection>,
    /// Token indices of the declaration, from `rule` to the closing brace
    pub token_span: Range<usize>,
}

impl Rule {
    /// Whether the rule has no predicate sections and so matches every file
    pub fn is_unconditional(&self) -> bool {
        self.hash.is_none()
            && self.file_metadata.is_none()
            && self.signature.is_none()
            && self.grep.is_none()
    }

    /// Number of pattern definitions across encodings
    pub fn pattern_count(&self) -> usize {
        self.grep
            .as_ref()
            .map(|g| g.patterns.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

/// Compute the identity of a rule from the lexemes of its tokens
pub fn rule_id<'a>(lexemes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for lexeme in lexemes {
        hasher.update(lexeme.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_is_stable_and_separated() {
        let a = rule_id(["rule", "A", "{", "}"]);
        assert_eq!(a, rule_id(["rule", "A", "{", "}"]));
        assert_eq!(a.len(), 64);
        // The separator keeps "ab","c" apart from "a","bc"
        assert_ne!(rule_id(["ab", "c"]), rule_id(["a", "bc"]));
    }

    #[test]
    fn test_pattern_def_defaults() {
        let def = PatternDef::new("foo");
        assert_eq!(def.encoding, "ASCII");
        assert!(!def.options.case_insensitive);
        assert!(!def.options.fixed_string);
    }
}
