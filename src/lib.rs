//! Forensic triage rules: a rule language, its compiler and a scan pipeline
//!
//! Rules are written in a small language with `meta`, `hash`,
//! `file_metadata`, `signature` and `grep` sections. This crate lexes and
//! parses them, turns their metadata predicates into SQL text, compiles every
//! grep pattern into one multi-pattern program, and runs a concurrent scan
//! that hashes and searches files with a bounded pool of processors.
//!
//! # Example
//!
//! ```no_run
//! use llama_rs::{LlamaBuilder, sink::JsonLinesSink};
//! use std::sync::Arc;
//!
//! # fn example() -> llama_rs::Result<()> {
//! let llama = LlamaBuilder::new()
//!     .add_rule_text(
//!         "inline",
//!         r#"rule Secret { grep: patterns: a = "password" nocase condition: any() }"#,
//!     )
//!     .worker_threads(4)
//!     .build()?;
//!
//! let sink = Arc::new(JsonLinesSink::create("out.jsonl")?);
//! let stats = llama.scan("/evidence", sink)?;
//! tracing::info!(files = stats.files_processed, "done");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub use config::{ConfigError, ScanConfig};
pub use engine::RuleEngine;
pub use error::{LlamaError, Result};
pub use parser::{parse_rules, ParseError, ParseOutput};
pub use processor::{Processor, ProcessingError};
pub use rule::Rule;
pub use ruleset::{RuleError, RuleSet};
pub use scheduler::{FileScheduler, ScanStats};

/// AST nodes for rule predicates
pub mod ast;

/// Scan configuration
pub mod config;

/// Rule engine and in-process rule evaluation
pub mod engine;

/// Error types
pub mod error;

/// Streaming file hashing
pub mod hash;

/// Lexical analysis
pub mod lexer;

/// Parser implementation
pub mod parser;

/// Literal multi-pattern search
pub mod pattern;

/// Per-file processing
pub mod processor;

/// SQL generation for rule predicates
pub mod query;

/// Row and file records
pub mod record;

/// Rule definitions
pub mod rule;

/// Reading rules from text, files and directories
pub mod ruleset;

/// Batch scheduling and the processor pool
pub mod scheduler;

/// Output sinks
pub mod sink;

/// Directory walking
pub mod walker;

use sink::OutputSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with default settings
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Builder for a scan
#[derive(Debug, Clone, Default)]
pub struct LlamaBuilder {
    /// Rule files or directories
    pub rule_paths: Vec<PathBuf>,
    /// In-memory rule sources as (name, text)
    pub rule_texts: Vec<(String, String)>,
    /// Scan settings
    pub config: ScanConfig,
}

impl LlamaBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule file or directory
    pub fn add_rule_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rule_paths.push(path.into());
        self
    }

    /// Add rule text under a source name
    pub fn add_rule_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.rule_texts.push((name.into(), text.into()));
        self
    }

    /// Replace the scan settings
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Set whether any rule error aborts the build
    pub fn fail_on_rule_error(mut self, fail: bool) -> Self {
        self.config.fail_on_rule_error = fail;
        self
    }

    /// Read every rule source and build the engine
    pub fn build(self) -> Result<Llama> {
        self.config.validate()?;
        let mut rules = RuleSet::new();
        for path in &self.rule_paths {
            rules.read_path(path)?;
        }
        for (name, text) in &self.rule_texts {
            rules.read_str(name, text);
        }

        let rule_errors = rules.errors().to_vec();
        if !rule_errors.is_empty() {
            if self.config.fail_on_rule_error {
                return Err(LlamaError::rules(&rule_errors));
            }
            warn!(errors = rule_errors.len(), "Continuing without rules that failed to load");
        }

        Ok(Llama {
            engine: Arc::new(rules.into_engine()?),
            config: self.config,
            rule_errors,
        })
    }
}

/// Rules ready to scan with
#[derive(Debug)]
pub struct Llama {
    engine: Arc<RuleEngine>,
    config: ScanConfig,
    rule_errors: Vec<RuleError>,
}

impl Llama {
    /// The rule engine
    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// Scan settings
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Errors from rule loading that did not abort the build
    pub fn rule_errors(&self) -> &[RuleError] {
        &self.rule_errors
    }

    /// Walk `input`, process every file and write all rows to `sink`
    pub fn scan(&self, input: impl AsRef<Path>, sink: Arc<dyn OutputSink>) -> Result<ScanStats> {
        let input = input.as_ref();
        info!(input = %input.display(), rules = self.engine.rules().len(), "Starting scan");
        self.engine.write_rules(sink.as_ref())?;

        let prototype = Processor::new(Arc::clone(&self.engine), Arc::clone(&sink), &self.config);
        let scheduler = FileScheduler::new(&prototype, sink, &self.config)?;
        walker::Walker::new(input, self.config.walker_batch_size)
            .walk(|batch| scheduler.schedule(batch))?;
        scheduler.finish()
    }
}
