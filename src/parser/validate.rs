use crate::ast::{CompareOp, Function, Property, Section};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Mask accepting all six comparison operators
pub const ALL_OPS: u8 = 0b11_1111;

/// Mask accepting only `==` and `!=`
pub const EQUALITY_OPS: u8 = 0b00_0011;

/// Kind of literal expected on the right of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Double-quoted string
    String,
    /// Unsigned integer
    Number,
}

/// What a section accepts for one property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRule {
    /// Resolved property
    pub property: Property,
    /// Accepted operators, see `CompareOp::bit`
    pub ops: u8,
    /// Expected right-hand literal
    pub value: ValueKind,
}

impl PropertyRule {
    /// Whether `op` is allowed for this property
    pub fn allows(&self, op: CompareOp) -> bool {
        self.ops & op.bit() != 0
    }
}

static FILE_METADATA_PROPERTIES: Lazy<HashMap<&'static str, PropertyRule>> = Lazy::new(|| {
    [
        ("created", Property::Created, ALL_OPS, ValueKind::String),
        ("modified", Property::Modified, ALL_OPS, ValueKind::String),
        ("filesize", Property::Filesize, ALL_OPS, ValueKind::Number),
        ("filename", Property::Filename, EQUALITY_OPS, ValueKind::String),
        ("filepath", Property::Filepath, EQUALITY_OPS, ValueKind::String),
    ]
    .into_iter()
    .map(|(name, property, ops, value)| (name, PropertyRule { property, ops, value }))
    .collect()
});

static SIGNATURE_PROPERTIES: Lazy<HashMap<&'static str, PropertyRule>> = Lazy::new(|| {
    [
        ("name", Property::SignatureName, EQUALITY_OPS, ValueKind::String),
        ("id", Property::SignatureId, EQUALITY_OPS, ValueKind::String),
    ]
    .into_iter()
    .map(|(name, property, ops, value)| (name, PropertyRule { property, ops, value }))
    .collect()
});

/// Look up a property by its spelling within a section
pub fn property_rule(section: Section, name: &str) -> Option<PropertyRule> {
    match section {
        Section::FileMetadata => FILE_METADATA_PROPERTIES.get(name).copied(),
        Section::Signature => SIGNATURE_PROPERTIES.get(name).copied(),
    }
}

/// Message used when a section sees something other than one of its properties
pub fn expected_property_message(section: Section) -> &'static str {
    match section {
        Section::FileMetadata => "Expected created, modified, filesize, filename, or filepath",
        Section::Signature => "Expected name or id",
    }
}

/// Whether a function call needs a trailing comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPolicy {
    /// `fn(...) op N` is mandatory
    Required,
    /// `fn(...)` must stand alone
    Forbidden,
}

/// Arity and comparison policy of a condition function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionPolicy {
    /// Fewest arguments accepted
    pub min_args: usize,
    /// Most arguments accepted, `None` for unbounded
    pub max_args: Option<usize>,
    /// Trailing comparison rule
    pub comparison: ComparisonPolicy,
    /// Second argument is a hit index rather than a pattern name
    pub hit_index: bool,
}

impl FunctionPolicy {
    /// Whether `n` arguments are acceptable
    pub fn accepts_arity(&self, n: usize) -> bool {
        n >= self.min_args && self.max_args.map_or(true, |max| n <= max)
    }
}

/// Policy table for condition functions
pub fn function_policy(function: Function) -> FunctionPolicy {
    match function {
        Function::All | Function::Any => FunctionPolicy {
            min_args: 0,
            max_args: None,
            comparison: ComparisonPolicy::Forbidden,
            hit_index: false,
        },
        Function::Count => FunctionPolicy {
            min_args: 1,
            max_args: Some(2),
            comparison: ComparisonPolicy::Required,
            hit_index: false,
        },
        Function::Offset | Function::Length => FunctionPolicy {
            min_args: 1,
            max_args: Some(2),
            comparison: ComparisonPolicy::Required,
            hit_index: true,
        },
        Function::CountHasHits => FunctionPolicy {
            min_args: 0,
            max_args: None,
            comparison: ComparisonPolicy::Required,
            hit_index: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata_table() {
        let size = property_rule(Section::FileMetadata, "filesize").unwrap();
        assert_eq!(size.value, ValueKind::Number);
        assert!(size.allows(CompareOp::Ge));

        let name = property_rule(Section::FileMetadata, "filename").unwrap();
        assert!(name.allows(CompareOp::Ne));
        assert!(!name.allows(CompareOp::Lt));

        assert!(property_rule(Section::FileMetadata, "name").is_none());
    }

    #[test]
    fn test_signature_table() {
        assert_eq!(
            property_rule(Section::Signature, "id").map(|r| r.property),
            Some(Property::SignatureId)
        );
        assert!(property_rule(Section::Signature, "filesize").is_none());
    }

    #[test]
    fn test_function_arity() {
        assert!(function_policy(Function::All).accepts_arity(0));
        assert!(function_policy(Function::Any).accepts_arity(7));
        assert!(!function_policy(Function::Count).accepts_arity(0));
        assert!(!function_policy(Function::Offset).accepts_arity(3));
        assert!(function_policy(Function::Length).hit_index);
    }
}
