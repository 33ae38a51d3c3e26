//! Scan configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the configuration file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for `ScanConfig`
    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range
    #[error("{0}")]
    Invalid(String),
}

/// Tunables of a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Threads processing files
    pub worker_threads: usize,

    /// Bytes read from a file per chunk
    pub read_chunk_size: usize,

    /// Rows a processor buffers before writing them to the sink
    pub output_batch_size: usize,

    /// Batches waiting for the scheduler; defaults to twice the workers
    pub scheduler_queue_depth: Option<usize>,

    /// Entries per walker batch
    pub walker_batch_size: usize,

    /// Abort the scan when any rule fails to load
    pub fail_on_rule_error: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            read_chunk_size: 64 * 1024,
            output_batch_size: 1000,
            scheduler_queue_depth: None,
            walker_batch_size: 100,
            fail_on_rule_error: false,
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Load and validate a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective depth of the scheduler queue
    pub fn queue_depth(&self) -> usize {
        self.scheduler_queue_depth
            .unwrap_or(self.worker_threads.saturating_mul(2))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.worker_threads, "worker_threads"),
            (self.read_chunk_size, "read_chunk_size"),
            (self.output_batch_size, "output_batch_size"),
            (self.queue_depth(), "scheduler_queue_depth"),
            (self.walker_batch_size, "walker_batch_size"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `ScanConfig`
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Set the read chunk size
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes;
        self
    }

    /// Set the processor output batch size
    pub fn output_batch_size(mut self, rows: usize) -> Self {
        self.config.output_batch_size = rows;
        self
    }

    /// Set the scheduler queue depth
    pub fn scheduler_queue_depth(mut self, depth: usize) -> Self {
        self.config.scheduler_queue_depth = Some(depth);
        self
    }

    /// Set the walker batch size
    pub fn walker_batch_size(mut self, entries: usize) -> Self {
        self.config.walker_batch_size = entries;
        self
    }

    /// Abort on rule load errors
    pub fn fail_on_rule_error(mut self, fail: bool) -> Self {
        self.config.fail_on_rule_error = fail;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<ScanConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
