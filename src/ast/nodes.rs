//! Leaf nodes of predicate trees

use crate::lexer::token::TokenKind;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a property comparison or function call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// All six operators, in bitmask order
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    /// Map a comparison token to its operator
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::EqualEqual => Some(CompareOp::Eq),
            TokenKind::NotEqual => Some(CompareOp::Ne),
            TokenKind::LessThan => Some(CompareOp::Lt),
            TokenKind::LessThanEqual => Some(CompareOp::Le),
            TokenKind::GreaterThan => Some(CompareOp::Gt),
            TokenKind::GreaterThanEqual => Some(CompareOp::Ge),
            _ => None,
        }
    }

    /// Source and SQL spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Bit used in operator masks
    pub fn bit(&self) -> u8 {
        1 << (*self as u8)
    }

    /// Apply the operator to an ordering of left against right
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Compare two values with this operator
    pub fn compare<T: Ord + ?Sized>(&self, left: &T, right: &T) -> bool {
        self.holds(left.cmp(right))
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand literal of a property comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Double-quoted string contents
    String(String),
    /// Unsigned integer
    Number(u64),
}

impl Value {
    /// Render as a SQL literal: strings single-quoted, numbers bare
    pub fn sql_literal(&self) -> String {
        match self {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Number(n) => n.to_string(),
        }
    }
}

/// Section that owns a property comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    /// `file_metadata:`
    FileMetadata,
    /// `signature:`
    Signature,
}

/// Property on the left of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    /// File creation time
    Created,
    /// File modification time
    Modified,
    /// Size in bytes
    Filesize,
    /// Final path component
    Filename,
    /// Full path
    Filepath,
    /// Detected signature name
    SignatureName,
    /// Detected signature identifier
    SignatureId,
}

impl Property {
    /// Column this property maps to in generated queries
    pub fn column(&self) -> &'static str {
        match self {
            Property::Created => "Created",
            Property::Modified => "Modified",
            Property::Filesize => "Filesize",
            Property::Filename => "Name",
            Property::Filepath => "Path",
            Property::SignatureName => "signature.Name",
            Property::SignatureId => "signature.Id",
        }
    }

    /// Section the property belongs to
    pub fn section(&self) -> Section {
        match self {
            Property::SignatureName | Property::SignatureId => Section::Signature,
            _ => Section::FileMetadata,
        }
    }
}

/// `property op value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyComparison {
    /// Left-hand property
    pub property: Property,
    /// Comparison operator
    pub op: CompareOp,
    /// Right-hand literal
    pub value: Value,
}

/// Condition function of a grep section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    /// Every listed pattern has a hit
    All,
    /// At least one listed pattern has a hit
    Any,
    /// Start offset of the n-th hit
    Offset,
    /// Total number of hits
    Count,
    /// Number of listed patterns with at least one hit
    CountHasHits,
    /// Length of the n-th hit
    Length,
}

impl Function {
    /// Map a function keyword to its function
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::All => Some(Function::All),
            TokenKind::Any => Some(Function::Any),
            TokenKind::Offset => Some(Function::Offset),
            TokenKind::Count => Some(Function::Count),
            TokenKind::CountHasHits => Some(Function::CountHasHits),
            TokenKind::Length => Some(Function::Length),
            _ => None,
        }
    }

    /// Keyword spelling
    pub fn name(&self) -> &'static str {
        match self {
            Function::All => "all",
            Function::Any => "any",
            Function::Offset => "offset",
            Function::Count => "count",
            Function::CountHasHits => "count_has_hits",
            Function::Length => "length",
        }
    }
}

/// `function(args) [op number]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Called function
    pub function: Function,
    /// Pattern names passed as arguments. Empty means every pattern of the rule.
    pub patterns: Vec<String>,
    /// Hit index argument of `offset` and `length`
    pub hit_index: Option<usize>,
    /// Trailing comparison
    pub comparison: Option<(CompareOp, u64)>,
}
