//! SQL text generation for rule predicates
//!
//! The persistence layer keeps `dirent`, `inode` and `signature` tables; a
//! rule's `file_metadata` and `signature` predicates become the `WHERE`
//! clause of a per-rule `SELECT` whose rows feed `rule_matches`.

use crate::ast::Node;
use crate::rule::Rule;

/// `CREATE TABLE` statement for rule rows
pub const CREATE_RULES_TABLE: &str = "CREATE TABLE rules (id VARCHAR, name VARCHAR);";

/// `CREATE TABLE` statement for rule-match rows
pub const CREATE_RULE_MATCHES_TABLE: &str =
    "CREATE TABLE rule_matches (id VARCHAR, path VARCHAR, name VARCHAR, addr UBIGINT);";

/// Builds SQL text from parsed rules
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Create a builder
    pub fn new() -> Self {
        Self
    }

    /// Render a property predicate tree. Comparisons become
    /// `Column op literal`, boolean nodes are parenthesized. Grep condition
    /// functions have no SQL form and give `None`.
    pub fn clause(&self, node: &Node) -> Option<String> {
        let mut out = String::new();
        write_clause(node, &mut out)?;
        Some(out)
    }

    /// `SELECT` returning one row per file the rule's metadata predicates
    /// accept, or `None` if a predicate has no SQL form
    pub fn rule_query(&self, rule: &Rule) -> Option<String> {
        let mut query = format!("SELECT '{}', Path, Name, Addr FROM dirent, inode", rule.id);
        if rule.signature.is_some() {
            query.push_str(", signature");
        }
        query.push_str(" WHERE dirent.Metaaddr == inode.Addr");
        if rule.signature.is_some() {
            query.push_str(" AND signature.MetaAddr == inode.Addr");
        }
        for node in [&rule.file_metadata, &rule.signature].into_iter().flatten() {
            query.push_str(" AND ");
            query.push_str(&self.clause(node)?);
        }
        Some(query)
    }

    /// `INSERT INTO rules VALUES (id, name),...;`, or `None` without rules
    pub fn rules_insert<'r>(&self, rules: impl IntoIterator<Item = &'r Rule>) -> Option<String> {
        let values: Vec<String> = rules
            .into_iter()
            .map(|r| format!("('{}', '{}')", r.id, r.name))
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(format!("INSERT INTO rules VALUES {};", values.join(",")))
    }

    /// `INSERT INTO rule_matches` over the UNION of every rule's query, or
    /// `None` without rules or when a rule query cannot be rendered
    pub fn rule_matches_insert<'r>(
        &self,
        rules: impl IntoIterator<Item = &'r Rule>,
    ) -> Option<String> {
        let selects: Vec<String> = rules
            .into_iter()
            .map(|r| self.rule_query(r).map(|q| format!("({})", q)))
            .collect::<Option<_>>()?;
        if selects.is_empty() {
            return None;
        }
        Some(format!(
            "INSERT INTO rule_matches {};",
            selects.join(" UNION ")
        ))
    }
}

fn write_clause(node: &Node, out: &mut String) -> Option<()> {
    match node {
        Node::And(l, r) | Node::Or(l, r) => {
            let op = if matches!(node, Node::And(..)) { "AND" } else { "OR" };
            out.push('(');
            write_clause(l, out)?;
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            write_clause(r, out)?;
            out.push(')');
        }
        Node::Property(cmp) => {
            out.push_str(cmp.property.column());
            out.push(' ');
            out.push_str(cmp.op.as_str());
            out.push(' ');
            out.push_str(&cmp.value.sql_literal());
        }
        // Grep conditions are evaluated against search hits, not in SQL
        Node::Function(_) => return None,
    }
    Some(())
}
