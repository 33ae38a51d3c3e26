//! Batch scheduling over a bounded processor pool
//!
//! Batches are posted to a dedicated scheduling thread that persists their
//! dirents and inodes in arrival order. For each batch it then checks out a
//! processor, blocking while the pool is exhausted, and hands the batch's
//! content to the worker pool. The bounded queue in front of the scheduling
//! thread pushes that back-pressure on to whoever produces batches.

/// Processor pool with blocking checkout
pub mod pool;

pub use pool::{PooledProcessor, ProcessorPool};

use crate::config::ScanConfig;
use crate::error::{LlamaError, Result};
use crate::processor::Processor;
use crate::record::FileBatch;
use crate::sink::OutputSink;
use crossbeam::channel::{self, Sender};
use crossbeam::sync::WaitGroup;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Summary of a finished scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Batches scheduled
    pub batches: u64,
    /// Entries across all batches
    pub entries: u64,
    /// Files whose content was hashed and searched
    pub files_processed: u64,
    /// Files whose processing failed
    pub failed_files: u64,
    /// Content bytes hashed
    pub bytes: u64,
    /// Search hits recorded
    pub hits: u64,
    /// Rule matches recorded
    pub rule_matches: u64,
    /// Highest number of processors in use at once
    pub peak_processors: usize,
    /// Wall time from construction to the end of `finish`
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    entries: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    pool: Arc<ProcessorPool>,
    workers: rayon::ThreadPool,
    sink: Arc<dyn OutputSink>,
    counters: Arc<Counters>,
}

/// Accepts file batches and runs them through pooled processors
pub struct FileScheduler {
    sender: Option<Sender<FileBatch>>,
    strand: Option<JoinHandle<()>>,
    pending: Option<WaitGroup>,
    shared: Arc<Shared>,
    started: Instant,
}

impl FileScheduler {
    /// Start the scheduling thread and worker pool. The pool holds
    /// `worker_threads` clones of `prototype`.
    pub fn new(prototype: &Processor, sink: Arc<dyn OutputSink>, config: &ScanConfig) -> Result<Self> {
        config.validate()?;
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("llama-worker-{}", i))
            .panic_handler(|_| error!("File processing job panicked"))
            .build()
            .map_err(|e| LlamaError::ThreadPool(e.to_string()))?;

        let shared = Arc::new(Shared {
            pool: ProcessorPool::new(prototype, config.worker_threads),
            workers,
            sink,
            counters: Arc::default(),
        });

        let (sender, receiver) = channel::bounded::<FileBatch>(config.queue_depth());
        let pending = WaitGroup::new();
        let strand = {
            let shared = Arc::clone(&shared);
            let pending = pending.clone();
            thread::Builder::new()
                .name("llama-scheduler".to_string())
                .spawn(move || {
                    for batch in receiver {
                        shared.perform_scheduling(batch, &pending);
                    }
                })?
        };

        info!(
            workers = config.worker_threads,
            queue_depth = config.queue_depth(),
            "Scheduler started"
        );
        Ok(Self {
            sender: Some(sender),
            strand: Some(strand),
            pending: Some(pending),
            shared,
            started: Instant::now(),
        })
    }

    /// Post a batch. Blocks while the scheduling queue is full.
    pub fn schedule(&self, batch: FileBatch) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(closed)?;
        sender.send(batch).map_err(|_| closed())
    }

    /// The processor pool
    pub fn pool(&self) -> &Arc<ProcessorPool> {
        &self.shared.pool
    }

    /// Wait for every scheduled batch, flush all processors and the sink
    pub fn finish(mut self) -> Result<ScanStats> {
        drop(self.sender.take());
        if let Some(strand) = self.strand.take() {
            if strand.join().is_err() {
                error!("Scheduling thread panicked");
            }
        }
        if let Some(pending) = self.pending.take() {
            pending.wait();
        }

        let mut stats = ScanStats {
            batches: self.shared.counters.batches.load(Ordering::Relaxed),
            entries: self.shared.counters.entries.load(Ordering::Relaxed),
            failed_files: self.shared.counters.failed.load(Ordering::Relaxed),
            peak_processors: self.shared.pool.peak(),
            ..ScanStats::default()
        };
        let mut flush_error = None;
        self.shared.pool.for_each_idle(|processor| {
            let s = processor.stats();
            stats.files_processed += s.files;
            stats.bytes += s.bytes;
            stats.hits += s.hits;
            stats.rule_matches += s.rule_matches;
            if let Err(e) = processor.flush() {
                error!(error = %e, "Failed to flush processor");
                flush_error.get_or_insert(e);
            }
        });
        if let Some(e) = flush_error {
            return Err(e.into());
        }
        self.shared.sink.flush()?;

        stats.elapsed = self.started.elapsed();
        info!(
            batches = stats.batches,
            files = stats.files_processed,
            failed = stats.failed_files,
            hits = stats.hits,
            rule_matches = stats.rule_matches,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Scan finished"
        );
        Ok(stats)
    }
}

impl Drop for FileScheduler {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(strand) = self.strand.take() {
            let _ = strand.join();
        }
    }
}

impl std::fmt::Debug for FileScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileScheduler")
            .field("pool_size", &self.shared.pool.size())
            .field("open", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Runs on the scheduling thread, one batch at a time
    fn perform_scheduling(&self, mut batch: FileBatch, pending: &WaitGroup) {
        let n = self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .entries
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        debug!(batch = n, entries = batch.len(), "Scheduling batch");

        let dirents: Vec<_> = batch.entries.iter().map(|e| e.dirent.clone()).collect();
        let inodes: Vec<_> = batch.entries.iter().map(|e| e.inode.clone()).collect();
        if let Err(e) = self.sink.write_dirents(&dirents) {
            error!(batch = n, error = %e, "Failed to write dirents");
        }
        if let Err(e) = self.sink.write_inodes(&inodes) {
            error!(batch = n, error = %e, "Failed to write inodes");
        }

        let entries = std::mem::take(&mut batch.entries);
        let mut processor = self.pool.checkout();
        let done = pending.clone();
        let counters = Arc::clone(&self.counters);
        self.workers.spawn(move || {
            for entry in entries {
                let path = entry.dirent.path.clone();
                if let Err(e) = processor.process_entry(entry) {
                    warn!(path = %path, error = %e, "Skipping file");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            drop(processor);
            drop(done);
        });
    }
}

fn closed() -> LlamaError {
    LlamaError::ThreadPool("scheduler is no longer accepting batches".to_string())
}
