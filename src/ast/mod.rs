//! Predicate trees built by the parser
//!
//! Boolean expressions of the `file_metadata`, `signature` and `grep`
//! sections are owned binary trees. Leaves are either property comparisons
//! or condition-function calls.

/// Leaf node types
pub mod nodes;

pub use nodes::{
    CompareOp, Function, FunctionCall, Property, PropertyComparison, Section, Value,
};

use serde::{Deserialize, Serialize};

/// A boolean expression node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Both children hold
    And(Box<Node>, Box<Node>),
    /// Either child holds
    Or(Box<Node>, Box<Node>),
    /// Grep condition function
    Function(FunctionCall),
    /// Property comparison
    Property(PropertyComparison),
}

/// Borrowed view of a leaf, handed to evaluation callbacks
#[derive(Debug, Clone, Copy)]
pub enum Leaf<'a> {
    /// Function call leaf
    Function(&'a FunctionCall),
    /// Property comparison leaf
    Property(&'a PropertyComparison),
}

impl Node {
    /// `left AND right`
    pub fn and(left: Node, right: Node) -> Node {
        Node::And(Box::new(left), Box::new(right))
    }

    /// `left OR right`
    pub fn or(left: Node, right: Node) -> Node {
        Node::Or(Box::new(left), Box::new(right))
    }

    /// Fold the tree to a boolean, asking `leaf` for each leaf value.
    /// Evaluation short-circuits left to right.
    pub fn evaluate<F>(&self, leaf: &mut F) -> bool
    where
        F: FnMut(Leaf<'_>) -> bool,
    {
        match self {
            Node::And(l, r) => l.evaluate(leaf) && r.evaluate(leaf),
            Node::Or(l, r) => l.evaluate(leaf) || r.evaluate(leaf),
            Node::Function(f) => leaf(Leaf::Function(f)),
            Node::Property(p) => leaf(Leaf::Property(p)),
        }
    }

    /// Visit every leaf in left-to-right order
    pub fn for_each_leaf<F>(&self, f: &mut F)
    where
        F: FnMut(Leaf<'_>),
    {
        match self {
            Node::And(l, r) | Node::Or(l, r) => {
                l.for_each_leaf(f);
                r.for_each_leaf(f);
            }
            Node::Function(call) => f(Leaf::Function(call)),
            Node::Property(cmp) => f(Leaf::Property(cmp)),
        }
    }

    /// Depth of the tree, leaves count as 1
    pub fn depth(&self) -> usize {
        match self {
            Node::And(l, r) | Node::Or(l, r) => 1 + l.depth().max(r.depth()),
            _ => 1,
        }
    }
}
