//! Rule engine: one combined pattern program for every loaded rule
//!
//! The engine owns the rules of a scan. It compiles all grep patterns into a
//! single `PatternProgram`, remembers which rule and pattern name each
//! program index belongs to, produces the rule tables, and decides which
//! rules a processed file satisfies.
//!
//! Hits are never held per file. A `HitSummary` counts them per rule and
//! pattern name and keeps only the leading hits an `offset` or `length`
//! condition can ask for.

use crate::ast::{Function, FunctionCall, Leaf, Node, Property, PropertyComparison, Value};
use crate::hash::FileHashes;
use crate::pattern::{FsmBuilder, Hit, PatternError, PatternProgram};
use crate::query::{QueryBuilder, CREATE_RULES_TABLE, CREATE_RULE_MATCHES_TABLE};
use crate::record::{format_timestamp, Dirent, Inode, RuleRow};
use crate::rule::{GrepSection, HashSection, Rule};
use crate::sink::{OutputSink, RuleStatements, SinkError};
use std::collections::BTreeMap;
use tracing::info;

/// Owner of one program pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternOwner {
    /// Index of the rule in the engine
    pub rule_index: usize,
    /// Identity of the rule
    pub rule_id: String,
    /// Pattern name within the rule
    pub pattern_name: String,
    /// Hit group shared by every encoding of this rule's pattern name
    pub group: usize,
}

/// Hits of one pattern name within one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HitGroup {
    /// Leading hits needed by `offset`/`length` conditions
    retain: usize,
}

/// Per-file hit totals by rule and pattern name, plus the leading hits
/// `offset` and `length` conditions may ask for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitSummary {
    counts: Vec<u64>,
    /// Sorted by start then end offset
    kept: Vec<Vec<Hit>>,
}

impl HitSummary {
    /// Hits recorded over all groups
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Hits currently kept for `offset`/`length`
    pub fn retained(&self) -> usize {
        self.kept.iter().map(Vec::len).sum()
    }

    fn count(&self, group: usize) -> u64 {
        self.counts.get(group).copied().unwrap_or(0)
    }

    fn nth(&self, group: usize, n: usize) -> Option<&Hit> {
        self.kept.get(group).and_then(|hits| hits.get(n))
    }
}

/// What is known about one file when rules are evaluated
#[derive(Debug, Clone, Copy)]
pub struct FileFacts<'a> {
    /// Directory entry
    pub dirent: &'a Dirent,
    /// Metadata
    pub inode: &'a Inode,
    /// Digests, absent when the file had no content
    pub hashes: Option<&'a FileHashes>,
    /// Pattern hits, absent when the file had no content
    pub hits: Option<&'a HitSummary>,
}

/// Owns the rules of a scan and the program built from them
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    program: PatternProgram,
    owners: Vec<PatternOwner>,
    groups: Vec<HitGroup>,
    /// Per rule, pattern name to hit group
    rule_groups: Vec<BTreeMap<String, usize>>,
    queries: QueryBuilder,
}

impl RuleEngine {
    /// Build the combined pattern program for `rules`
    pub fn new(rules: Vec<Rule>) -> Result<Self, PatternError> {
        let mut builder = FsmBuilder::new();
        let mut owners = Vec::new();
        let mut groups = Vec::new();
        let mut rule_groups = Vec::with_capacity(rules.len());

        for (rule_index, rule) in rules.iter().enumerate() {
            let mut names = BTreeMap::new();
            if let Some(grep) = &rule.grep {
                for (name, defs) in &grep.patterns {
                    let group = groups.len();
                    groups.push(HitGroup { retain: 0 });
                    names.insert(name.clone(), group);
                    for def in defs {
                        let index = builder.add_pattern(def, owners.len())?;
                        debug_assert_eq!(index, owners.len());
                        owners.push(PatternOwner {
                            rule_index,
                            rule_id: rule.id.clone(),
                            pattern_name: name.clone(),
                            group,
                        });
                    }
                }
                grep.condition.for_each_leaf(&mut |leaf| {
                    let Leaf::Function(call) = leaf else { return };
                    if !matches!(call.function, Function::Offset | Function::Length) {
                        return;
                    }
                    let name = call
                        .patterns
                        .first()
                        .or_else(|| grep.patterns.keys().next());
                    if let Some(group) = name.and_then(|n| names.get(n)).and_then(|g| groups.get_mut(*g)) {
                        group.retain = group.retain.max(call.hit_index.unwrap_or(0) + 1);
                    }
                });
            }
            rule_groups.push(names);
        }

        let program = builder.build()?;
        info!(
            rules = rules.len(),
            patterns = program.len(),
            "Rule engine ready"
        );
        Ok(Self {
            rules,
            program,
            owners,
            groups,
            rule_groups,
            queries: QueryBuilder::new(),
        })
    }

    /// Loaded rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Combined pattern program
    pub fn program(&self) -> &PatternProgram {
        &self.program
    }

    /// Owner of a program pattern index
    pub fn owner(&self, pattern_index: usize) -> Option<&PatternOwner> {
        self.owners.get(pattern_index)
    }

    /// Rows for the `rules` table
    pub fn rule_rows(&self) -> Vec<RuleRow> {
        self.rules
            .iter()
            .map(|r| RuleRow {
                id: r.id.clone(),
                name: r.name.clone(),
            })
            .collect()
    }

    /// SQL creating and filling the rule tables
    pub fn statements(&self) -> RuleStatements {
        RuleStatements {
            create_tables: vec![
                CREATE_RULES_TABLE.to_string(),
                CREATE_RULE_MATCHES_TABLE.to_string(),
            ],
            insert_rules: self.queries.rules_insert(&self.rules),
            insert_rule_matches: self.queries.rule_matches_insert(&self.rules),
        }
    }

    /// Write the rule rows and SQL to `sink`
    pub fn write_rules(&self, sink: &dyn OutputSink) -> Result<(), SinkError> {
        sink.write_rules(&self.rule_rows(), &self.statements())
    }

    /// Empty summary sized for this engine's hit groups
    pub fn new_summary(&self) -> HitSummary {
        HitSummary {
            counts: vec![0; self.groups.len()],
            kept: vec![Vec::new(); self.groups.len()],
        }
    }

    /// Count `hit` and keep it if an `offset`/`length` condition may need it
    pub fn record_hit(&self, summary: &mut HitSummary, hit: &Hit) {
        let Some(owner) = self.owners.get(hit.pattern_index) else {
            return;
        };
        let (Some(group), Some(count), Some(kept)) = (
            self.groups.get(owner.group),
            summary.counts.get_mut(owner.group),
            summary.kept.get_mut(owner.group),
        ) else {
            return;
        };
        *count += 1;
        let key = (hit.start, hit.end);
        let at = kept.partition_point(|h| (h.start, h.end) <= key);
        if at < group.retain {
            kept.insert(at, *hit);
            kept.truncate(group.retain);
        }
    }

    /// Summary of a complete hit list
    pub fn summarize(&self, hits: &[Hit]) -> HitSummary {
        let mut summary = self.new_summary();
        for hit in hits {
            self.record_hit(&mut summary, hit);
        }
        summary
    }

    /// Rules satisfied by a file, in load order
    pub fn matching_rules<'e>(&'e self, facts: &FileFacts<'_>) -> Vec<&'e Rule> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(i, rule)| self.rule_matches(*i, rule, facts))
            .map(|(_, rule)| rule)
            .collect()
    }

    fn rule_matches(
        &self,
        rule_index: usize,
        rule: &Rule,
        facts: &FileFacts<'_>,
    ) -> bool {
        if let Some(hash) = &rule.hash {
            if !facts.hashes.is_some_and(|h| hash_section_matches(hash, h)) {
                return false;
            }
        }
        if let Some(node) = &rule.file_metadata {
            if !properties_hold(node, facts.dirent, facts.inode) {
                return false;
            }
        }
        if let Some(node) = &rule.signature {
            if !properties_hold(node, facts.dirent, facts.inode) {
                return false;
            }
        }
        if let Some(grep) = &rule.grep {
            let (Some(summary), Some(names)) = (facts.hits, self.rule_groups.get(rule_index)) else {
                return false;
            };
            if !grep_condition_holds(grep, names, summary) {
                return false;
            }
        }
        true
    }
}

/// Any record whose digests all equal the file's
fn hash_section_matches(section: &HashSection, hashes: &FileHashes) -> bool {
    section.records.iter().any(|record| {
        record
            .digests
            .iter()
            .all(|(alg, expected)| hashes.get(*alg).eq_ignore_ascii_case(expected))
    })
}

fn properties_hold(node: &Node, dirent: &Dirent, inode: &Inode) -> bool {
    node.evaluate(&mut |leaf| match leaf {
        Leaf::Property(cmp) => property_holds(cmp, dirent, inode),
        Leaf::Function(_) => false,
    })
}

fn property_holds(cmp: &PropertyComparison, dirent: &Dirent, inode: &Inode) -> bool {
    let text: Option<String> = match cmp.property {
        Property::Filesize => {
            return match cmp.value {
                Value::Number(n) => cmp.op.compare(&inode.filesize, &n),
                Value::String(_) => false,
            }
        }
        Property::Created => inode.created.as_ref().map(format_timestamp),
        Property::Modified => inode.modified.as_ref().map(format_timestamp),
        Property::Filename => Some(dirent.name.clone()),
        Property::Filepath => Some(dirent.path.clone()),
        Property::SignatureName => inode.signature.as_ref().map(|s| s.name.clone()),
        Property::SignatureId => inode.signature.as_ref().map(|s| s.id.clone()),
    };
    match (text, &cmp.value) {
        (Some(actual), Value::String(expected)) => cmp.op.compare(actual.as_str(), expected.as_str()),
        _ => false,
    }
}

fn grep_condition_holds(
    grep: &GrepSection,
    names: &BTreeMap<String, usize>,
    summary: &HitSummary,
) -> bool {
    grep.condition.evaluate(&mut |leaf| match leaf {
        Leaf::Function(call) => function_holds(call, grep, names, summary),
        Leaf::Property(_) => false,
    })
}

fn function_holds(
    call: &FunctionCall,
    grep: &GrepSection,
    groups: &BTreeMap<String, usize>,
    summary: &HitSummary,
) -> bool {
    let names: Vec<&str> = if call.patterns.is_empty() {
        grep.patterns.keys().map(String::as_str).collect()
    } else {
        call.patterns.iter().map(String::as_str).collect()
    };
    let count_for = |name: &str| groups.get(name).map_or(0, |g| summary.count(*g));
    let compare = |value: u64| {
        call.comparison
            .map_or(false, |(op, expected)| op.compare(&value, &expected))
    };

    match call.function {
        Function::All => names.iter().all(|n| count_for(n) > 0),
        Function::Any => names.iter().any(|n| count_for(n) > 0),
        Function::Count => compare(names.iter().map(|n| count_for(n)).sum()),
        Function::CountHasHits => compare(names.iter().filter(|n| count_for(n) > 0).count() as u64),
        Function::Offset | Function::Length => {
            let nth = call.hit_index.unwrap_or(0);
            names
                .first()
                .and_then(|n| groups.get(*n))
                .and_then(|g| summary.nth(*g, nth))
                .map_or(false, |hit| {
                    compare(if call.function == Function::Offset {
                        hit.start
                    } else {
                        hit.len()
                    })
                })
        }
    }
}
