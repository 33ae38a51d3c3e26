use crate::lexer::token::LineCol;
use thiserror::Error;

/// Errors produced while parsing rule declarations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Grammar violation
    #[error("{message} at {pos}")]
    Syntax {
        /// What was expected or found
        message: String,
        /// Position of the offending token
        pos: LineCol,
    },

    /// Well-formed input that breaks a semantic rule (duplicate hash type,
    /// bad hex literal, wrong arity, unknown pattern name...)
    #[error("{message} at {pos}")]
    Validation {
        /// Description of the violation
        message: String,
        /// Position of the offending token
        pos: LineCol,
    },
}

impl ParseError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, pos: LineCol) -> Self {
        Self::Syntax {
            message: message.into(),
            pos,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>, pos: LineCol) -> Self {
        Self::Validation {
            message: message.into(),
            pos,
        }
    }

    /// Message without the position suffix
    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { message, .. } | Self::Validation { message, .. } => message,
        }
    }

    /// Position of the error
    pub fn pos(&self) -> LineCol {
        match self {
            Self::Syntax { pos, .. } | Self::Validation { pos, .. } => *pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_position() {
        let err = ParseError::syntax("Expected rule name", LineCol::new(1, 6));
        assert_eq!(err.to_string(), "Expected rule name at line 1 column 6");
        assert_eq!(err.message(), "Expected rule name");
    }
}
