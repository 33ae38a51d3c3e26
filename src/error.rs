//! Error types shared across the crate

use thiserror::Error;

use crate::config::ConfigError;
use crate::lexer::error::LexError;
use crate::parser::ParseError;
use crate::pattern::PatternError;
use crate::processor::ProcessingError;
use crate::sink::SinkError;

/// Main error type for llama-rs operations
#[derive(Error, Debug)]
pub enum LlamaError {
    /// Rule text could not be tokenized
    #[error("Lexer error: {0}")]
    Lex(#[from] LexError),

    /// Rule text could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// One or more rule files failed to load
    #[error("{count} rule error(s), first: {first}")]
    Rules {
        /// Number of collected errors
        count: usize,
        /// Rendering of the first error
        first: String,
    },

    /// Pattern program could not be built
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// File processing failed
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Output sink rejected rows
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration is invalid or incomplete
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlamaError {
    /// Build an error summarizing a list of rule load failures
    pub fn rules(errors: &[crate::ruleset::RuleError]) -> Self {
        Self::Rules {
            count: errors.len(),
            first: errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Result type alias for llama-rs operations
pub type Result<T> = std::result::Result<T, LlamaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::LineCol;

    #[test]
    fn test_lex_error_converts() {
        let err: LlamaError = LexError::unexpected("Unexpected input", LineCol::new(2, 7)).into();
        assert_eq!(
            err.to_string(),
            "Lexer error: Unexpected input at line 2 column 7"
        );
    }

    #[test]
    fn test_rules_summary() {
        let errors = vec![crate::ruleset::RuleError::new(
            "a.llama",
            "Expected rule name at line 1 column 6",
        )];
        let err = LlamaError::rules(&errors);
        assert!(err.to_string().starts_with("1 rule error(s)"));
    }
}
