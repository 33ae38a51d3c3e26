//! Per-file hashing and pattern search
//!
//! A `Processor` streams one file at a time: once through the hasher, then
//! again through the shared pattern program. Its rows are buffered privately
//! and handed to the sink in batches, including while a file is searched.

use crate::config::ScanConfig;
use crate::engine::{FileFacts, HitSummary, RuleEngine};
use crate::hash::{FileHasher, FileHashes};
use crate::pattern::{Hit, SearchContext};
use crate::record::{Dirent, FileEntry, HashRecord, Inode, ReadSeek, RuleMatch, SearchHit};
use crate::sink::{OutputSink, SinkError};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised while processing a file
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Reading or rewinding the file failed
    #[error("Failed to read file at address {meta_addr}: {source}")]
    Read {
        /// Inode address of the file
        meta_addr: u64,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The sink rejected buffered rows
    #[error("Failed to write rows: {0}")]
    Sink(#[from] SinkError),
}

impl ProcessingError {
    fn read(meta_addr: u64, source: io::Error) -> Self {
        Self::Read { meta_addr, source }
    }
}

/// What processing one stream produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileOutcome {
    /// Digests of the stream
    pub hashes: FileHashes,
    /// Hit counts and the hits rule conditions need
    pub summary: HitSummary,
    /// Number of hits
    pub hits: u64,
    /// Bytes read per pass
    pub bytes: u64,
}

/// Turns hits into rows and summary entries during a search pass
struct HitRecorder<'e> {
    engine: &'e RuleEngine,
    file_hash: &'e str,
    summary: HitSummary,
    hits: u64,
}

impl HitRecorder<'_> {
    fn record(&mut self, rows: &mut Vec<SearchHit>, hit: Hit) {
        let (Some(owner), Some(info)) = (
            self.engine.owner(hit.pattern_index),
            self.engine.program().pattern(hit.pattern_index),
        ) else {
            return;
        };
        rows.push(SearchHit {
            pattern: info.pattern.clone(),
            start_offset: hit.start,
            end_offset: hit.end,
            rule_id: owner.rule_id.clone(),
            file_hash: self.file_hash.to_string(),
            length: hit.len(),
        });
        self.engine.record_hit(&mut self.summary, &hit);
        self.hits += 1;
    }
}

/// Counters kept by one processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Files hashed and searched
    pub files: u64,
    /// Bytes hashed
    pub bytes: u64,
    /// Search hits recorded
    pub hits: u64,
    /// Rule matches recorded
    pub rule_matches: u64,
}

/// Hashes and searches files, buffering the resulting rows
pub struct Processor {
    engine: Arc<RuleEngine>,
    sink: Arc<dyn OutputSink>,
    hasher: FileHasher,
    ctx: SearchContext,
    buf: Vec<u8>,
    batch_size: usize,
    hashes: Vec<HashRecord>,
    search_hits: Vec<SearchHit>,
    rule_matches: Vec<RuleMatch>,
    stats: ProcessorStats,
}

impl Processor {
    /// Create a processor over a built engine
    pub fn new(engine: Arc<RuleEngine>, sink: Arc<dyn OutputSink>, config: &ScanConfig) -> Self {
        let ctx = engine.program().new_context();
        Self {
            engine,
            sink,
            hasher: FileHasher::new(),
            ctx,
            buf: vec![0; config.read_chunk_size.max(1)],
            batch_size: config.output_batch_size.max(1),
            hashes: Vec::new(),
            search_hits: Vec::new(),
            rule_matches: Vec::new(),
            stats: ProcessorStats::default(),
        }
    }

    /// Hash and search a stream, recording a hash row and its search hits
    pub fn process(
        &mut self,
        meta_addr: u64,
        stream: &mut dyn ReadSeek,
    ) -> Result<FileOutcome, ProcessingError> {
        self.hasher.reset();
        stream
            .seek(SeekFrom::Start(0))
            .map_err(|e| ProcessingError::read(meta_addr, e))?;
        loop {
            let n = read_chunk(stream, &mut self.buf).map_err(|e| ProcessingError::read(meta_addr, e))?;
            if n == 0 {
                break;
            }
            self.hasher.update(&self.buf[..n]);
        }
        let bytes = self.hasher.bytes();
        let hashes = self.hasher.finalize();

        let engine = Arc::clone(&self.engine);
        let program = engine.program();
        let mut recorder = HitRecorder {
            engine: &engine,
            file_hash: &hashes.blake3,
            summary: engine.new_summary(),
            hits: 0,
        };
        if !program.is_empty() {
            self.ctx.reset();
            stream
                .seek(SeekFrom::Start(0))
                .map_err(|e| ProcessingError::read(meta_addr, e))?;
            loop {
                let n = read_chunk(stream, &mut self.buf)
                    .map_err(|e| ProcessingError::read(meta_addr, e))?;
                if n == 0 {
                    break;
                }
                let rows = &mut self.search_hits;
                program.search(&mut self.ctx, &self.buf[..n], |hit| recorder.record(rows, hit));
                self.flush_search_hits()?;
            }
            let rows = &mut self.search_hits;
            program.finish(&mut self.ctx, |hit| recorder.record(rows, hit));
        }
        let HitRecorder { summary, hits, .. } = recorder;

        self.hashes.push(hashes.to_record(meta_addr));
        self.stats.files += 1;
        self.stats.bytes += bytes;
        self.stats.hits += hits;
        trace!(meta_addr, bytes, hits, "Processed stream");

        self.flush_full()?;
        Ok(FileOutcome {
            hashes,
            summary,
            hits,
            bytes,
        })
    }

    /// Record a `RuleMatch` row for every rule the file satisfies
    pub fn match_rules(
        &mut self,
        dirent: &Dirent,
        inode: &Inode,
        outcome: Option<&FileOutcome>,
    ) -> Result<usize, ProcessingError> {
        let facts = FileFacts {
            dirent,
            inode,
            hashes: outcome.map(|o| &o.hashes),
            hits: outcome.map(|o| &o.summary),
        };
        let engine = Arc::clone(&self.engine);
        let matched = engine.matching_rules(&facts);
        for rule in &matched {
            self.rule_matches.push(RuleMatch {
                id: rule.id.clone(),
                path: dirent.path.clone(),
                name: dirent.name.clone(),
                addr: inode.addr,
            });
        }
        self.stats.rule_matches += matched.len() as u64;
        self.flush_full()?;
        Ok(matched.len())
    }

    /// Process a scheduled entry: content first when present, then rules
    pub fn process_entry(&mut self, mut entry: FileEntry) -> Result<(), ProcessingError> {
        let outcome = match entry.stream.as_mut() {
            Some(stream) => Some(self.process(entry.inode.addr, &mut **stream)?),
            None => None,
        };
        debug!(path = %entry.dirent.path, content = outcome.is_some(), "Processed file");
        self.match_rules(&entry.dirent, &entry.inode, outcome.as_ref())?;
        Ok(())
    }

    /// Write every buffered row to the sink
    pub fn flush(&mut self) -> Result<(), ProcessingError> {
        if !self.hashes.is_empty() {
            self.sink.write_hashes(&self.hashes)?;
            self.hashes.clear();
        }
        if !self.search_hits.is_empty() {
            self.sink.write_search_hits(&self.search_hits)?;
            self.search_hits.clear();
        }
        if !self.rule_matches.is_empty() {
            self.sink.write_rule_matches(&self.rule_matches)?;
            self.rule_matches.clear();
        }
        Ok(())
    }

    /// Rows waiting for the next flush
    pub fn buffered_rows(&self) -> usize {
        self.hashes.len() + self.search_hits.len() + self.rule_matches.len()
    }

    /// Counters since creation
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    fn flush_full(&mut self) -> Result<(), ProcessingError> {
        if self.buffered_rows() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Hand search hits to the sink once a batch is full
    fn flush_search_hits(&mut self) -> Result<(), ProcessingError> {
        if self.search_hits.len() >= self.batch_size {
            self.sink.write_search_hits(&self.search_hits)?;
            self.search_hits.clear();
        }
        Ok(())
    }
}

impl Clone for Processor {
    /// Shares the engine and sink; the hasher, search context and buffers are new
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
            hasher: FileHasher::new(),
            ctx: self.engine.program().new_context(),
            buf: vec![0; self.buf.len()],
            batch_size: self.batch_size,
            hashes: Vec::new(),
            search_hits: Vec::new(),
            rule_matches: Vec::new(),
            stats: ProcessorStats::default(),
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("chunk_size", &self.buf.len())
            .field("batch_size", &self.batch_size)
            .field("buffered_rows", &self.buffered_rows())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn read_chunk(stream: &mut dyn ReadSeek, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
