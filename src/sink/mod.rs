//! Output sinks receiving scan rows
//!
//! The scheduler and processors write through the `OutputSink` trait object.
//! Implementations must tolerate concurrent calls from worker threads.

use crate::record::{Dirent, HashRecord, Inode, RuleMatch, RuleRow, SearchHit};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised by output sinks
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying writer failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Row could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// SQL text describing the rule tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleStatements {
    /// `CREATE TABLE` statements
    pub create_tables: Vec<String>,
    /// `INSERT INTO rules ...`
    pub insert_rules: Option<String>,
    /// `INSERT INTO rule_matches ...`
    pub insert_rule_matches: Option<String>,
}

/// Destination for scan output
pub trait OutputSink: Send + Sync {
    /// Persist directory entries of one batch
    fn write_dirents(&self, rows: &[Dirent]) -> Result<(), SinkError>;
    /// Persist inodes of one batch
    fn write_inodes(&self, rows: &[Inode]) -> Result<(), SinkError>;
    /// Persist file digests
    fn write_hashes(&self, rows: &[HashRecord]) -> Result<(), SinkError>;
    /// Persist pattern hits
    fn write_search_hits(&self, rows: &[SearchHit]) -> Result<(), SinkError>;
    /// Persist rule matches found during the scan
    fn write_rule_matches(&self, rows: &[RuleMatch]) -> Result<(), SinkError>;
    /// Persist the rule table and its SQL
    fn write_rules(&self, rows: &[RuleRow], statements: &RuleStatements) -> Result<(), SinkError>;
    /// Flush buffered output
    fn flush(&self) -> Result<(), SinkError>;
}

/// Everything a `MemorySink` has received
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    /// Directory entries
    pub dirents: Vec<Dirent>,
    /// Inodes
    pub inodes: Vec<Inode>,
    /// Digests
    pub hashes: Vec<HashRecord>,
    /// Pattern hits
    pub search_hits: Vec<SearchHit>,
    /// Rule matches
    pub rule_matches: Vec<RuleMatch>,
    /// Rules
    pub rules: Vec<RuleRow>,
    /// Rule SQL
    pub statements: RuleStatements,
    /// Number of `flush` calls
    pub flushes: usize,
}

/// Sink that keeps rows in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<MemoryTables>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn snapshot(&self) -> MemoryTables {
        self.tables.lock().clone()
    }
}

impl OutputSink for MemorySink {
    fn write_dirents(&self, rows: &[Dirent]) -> Result<(), SinkError> {
        self.tables.lock().dirents.extend_from_slice(rows);
        Ok(())
    }

    fn write_inodes(&self, rows: &[Inode]) -> Result<(), SinkError> {
        self.tables.lock().inodes.extend_from_slice(rows);
        Ok(())
    }

    fn write_hashes(&self, rows: &[HashRecord]) -> Result<(), SinkError> {
        self.tables.lock().hashes.extend_from_slice(rows);
        Ok(())
    }

    fn write_search_hits(&self, rows: &[SearchHit]) -> Result<(), SinkError> {
        self.tables.lock().search_hits.extend_from_slice(rows);
        Ok(())
    }

    fn write_rule_matches(&self, rows: &[RuleMatch]) -> Result<(), SinkError> {
        self.tables.lock().rule_matches.extend_from_slice(rows);
        Ok(())
    }

    fn write_rules(&self, rows: &[RuleRow], statements: &RuleStatements) -> Result<(), SinkError> {
        let mut tables = self.tables.lock();
        tables.rules.extend_from_slice(rows);
        tables.statements = statements.clone();
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.tables.lock().flushes += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct Line<'a, T: Serialize> {
    table: &'a str,
    row: &'a T,
}

/// Sink writing one JSON object per row: `{"table": ..., "row": {...}}`
pub struct JsonLinesSink {
    out: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl JsonLinesSink {
    /// Write to any writer
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(BufWriter::new(Box::new(writer))),
        }
    }

    /// Create or truncate `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening JSON lines output");
        Ok(Self::new(File::create(path)?))
    }

    fn write_rows<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), SinkError> {
        let mut out = self.out.lock();
        for row in rows {
            serde_json::to_writer(&mut *out, &Line { table, row })?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl OutputSink for JsonLinesSink {
    fn write_dirents(&self, rows: &[Dirent]) -> Result<(), SinkError> {
        self.write_rows("dirent", rows)
    }

    fn write_inodes(&self, rows: &[Inode]) -> Result<(), SinkError> {
        self.write_rows("inode", rows)
    }

    fn write_hashes(&self, rows: &[HashRecord]) -> Result<(), SinkError> {
        self.write_rows("hash", rows)
    }

    fn write_search_hits(&self, rows: &[SearchHit]) -> Result<(), SinkError> {
        self.write_rows("search_hits", rows)
    }

    fn write_rule_matches(&self, rows: &[RuleMatch]) -> Result<(), SinkError> {
        self.write_rows("rule_matches", rows)
    }

    fn write_rules(&self, rows: &[RuleRow], statements: &RuleStatements) -> Result<(), SinkError> {
        self.write_rows("rules", rows)?;
        self.write_rows("rule_sql", std::slice::from_ref(statements))
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.out.lock().flush()?;
        Ok(())
    }
}
