use crate::lexer::token::LineCol;
use thiserror::Error;

/// Errors that can occur during lexing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    /// Input that cannot start or continue a token
    #[error("{message} at {pos}")]
    UnexpectedInput {
        /// Description of what went wrong
        message: String,
        /// Where the offending construct starts
        pos: LineCol,
    },
}

impl LexError {
    /// Create an unexpected-input error
    pub fn unexpected(message: impl Into<String>, pos: LineCol) -> Self {
        Self::UnexpectedInput {
            message: message.into(),
            pos,
        }
    }

    /// Position of the error in the source
    pub fn pos(&self) -> LineCol {
        match self {
            Self::UnexpectedInput { pos, .. } => *pos,
        }
    }
}
