//! Reading rule text, rule files and rule directories
//!
//! A `RuleSet` accumulates rules from any number of sources. Problems are
//! collected per source instead of aborting the load, so a user sees every
//! broken rule at once.

use crate::engine::RuleEngine;
use crate::error::{LlamaError, Result};
use crate::parser::parse_rules;
use crate::pattern::PatternError;
use crate::rule::Rule;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A problem found while loading one rule source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    /// File name, or the label given for in-memory text
    pub source_name: String,
    /// Message including the position, e.g. `Expected rule name at line 1 column 6`
    pub message: String,
}

impl RuleError {
    /// Create an error for `source_name`
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_name, self.message)
    }
}

/// Rules read so far together with every error encountered
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    errors: Vec<RuleError>,
    sources: usize,
}

impl RuleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and append its rules. Returns whether the text was free
    /// of errors. A lexing error discards the whole text; parse errors only
    /// discard the declaration they occur in.
    pub fn read_str(&mut self, source_name: &str, text: &str) -> bool {
        self.sources += 1;
        let output = match parse_rules(text) {
            Ok(output) => output,
            Err(e) => {
                warn!(source = source_name, error = %e, "Rule text could not be tokenized");
                self.errors.push(RuleError::new(source_name, e.to_string()));
                return false;
            }
        };

        let clean = output.errors.is_empty();
        for e in output.errors {
            warn!(source = source_name, error = %e, "Rule error");
            self.errors.push(RuleError::new(source_name, e.to_string()));
        }
        debug!(
            source = source_name,
            rules = output.rules.len(),
            "Read rule text"
        );
        self.rules.extend(output.rules);
        clean
    }

    /// Read one rule file. Unreadable files are reported as rule errors.
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let name = path.display().to_string();
        match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => self.read_str(&name, &text),
                Err(_) => {
                    self.sources += 1;
                    self.errors
                        .push(RuleError::new(name, "Rule file is not valid UTF-8"));
                    false
                }
            },
            Err(e) => {
                self.sources += 1;
                warn!(path = %name, error = %e, "Failed to read rule file");
                self.errors
                    .push(RuleError::new(name, format!("Failed to read file: {}", e)));
                false
            }
        }
    }

    /// Read every regular file below `dir`, in file name order. Keeps going
    /// after a bad file so all errors are reported.
    pub fn read_dir(&mut self, dir: impl AsRef<Path>) -> Result<bool> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LlamaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            )));
        }

        let mut clean = true;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                LlamaError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                }))
            })?;
            if entry.file_type().is_file() {
                clean &= self.read_file(entry.path());
            }
        }
        Ok(clean)
    }

    /// Read a file or a directory
    pub fn read_path(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        if path.is_dir() {
            self.read_dir(path)
        } else if path.exists() {
            Ok(self.read_file(path))
        } else {
            Err(LlamaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )))
        }
    }

    /// Rules read so far
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Errors collected so far
    pub fn errors(&self) -> &[RuleError] {
        &self.errors
    }

    /// Number of sources read
    pub fn source_count(&self) -> usize {
        self.sources
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules were read
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fail with a summary when any error was collected
    pub fn check(&self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(LlamaError::rules(&self.errors))
        }
    }

    /// Take the rules, leaving the set empty
    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    /// Build the engine over the rules read
    pub fn into_engine(self) -> std::result::Result<RuleEngine, PatternError> {
        info!(
            sources = self.sources,
            rules = self.rules.len(),
            errors = self.errors.len(),
            "Loaded rule set"
        );
        RuleEngine::new(self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_accumulates() {
        let mut set = RuleSet::new();
        assert!(set.read_str("one", "rule MyRule {}\nrule MyOtherRule {}"));
        assert_eq!(set.len(), 2);

        assert!(!set.read_str("two", "rule {}"));
        assert_eq!(
            set.errors(),
            &[RuleError::new("two", "Expected rule name at line 1 column 6")]
        );

        assert!(set.read_str(
            "three",
            "rule MyThirdRule {\n  file_metadata:\n    filesize > 30000\n}"
        ));
        assert_eq!(set.len(), 3);
        assert_eq!(set.source_count(), 3);
        assert!(set.check().is_err());
    }

    #[test]
    fn test_lex_error_discards_text() {
        let mut set = RuleSet::new();
        assert!(!set.read_str("bad", "rule A {} rule B { ! }"));
        assert!(set.is_empty());
        assert_eq!(set.errors().len(), 1);
        assert!(set.errors()[0]
            .message
            .starts_with("Unexpected input character: !"));
    }

    #[test]
    fn test_same_text_same_ids() {
        let text = r#"rule R { grep: patterns: a = "x" condition: any() }"#;
        let mut a = RuleSet::new();
        let mut b = RuleSet::new();
        a.read_str("a", text);
        b.read_str("b", text);
        assert_eq!(a.rules(), b.rules());
    }

    #[test]
    fn test_missing_path() {
        let mut set = RuleSet::new();
        assert!(set.read_path("/definitely/not/here.llama").is_err());
    }
}
