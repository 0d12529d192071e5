//! # Config - engine tunables
//!
//! Every value the engine consumes from its surroundings: where files live,
//! when the memtable is flushed, how sparse the segment index is and whether
//! WAL appends are fsynced.
//!
//! ## Environment
//!
//! ```text
//! LSMKV_DATA_DIR        base storage directory          (default: "data")
//! LSMKV_MEMTABLE_BYTES  flush threshold in bytes        (default: 1000)
//! LSMKV_SPARSITY        sparse index sampling interval  (default: 1000)
//! LSMKV_WAL_SYNC        fsync every WAL append          (default: "false")
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const ENV_DATA_DIR: &str = "LSMKV_DATA_DIR";
pub const ENV_MEMTABLE_BYTES: &str = "LSMKV_MEMTABLE_BYTES";
pub const ENV_SPARSITY: &str = "LSMKV_SPARSITY";
pub const ENV_WAL_SYNC: &str = "LSMKV_WAL_SYNC";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MEMTABLE_THRESHOLD: usize = 1000;
pub const DEFAULT_SPARSITY_FACTOR: usize = 1000;

/// File name of the WAL inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.log";
/// Name of the segment directory inside the data directory.
pub const SEGMENT_DIR_NAME: &str = "segments";

/// Smallest bloom filter any segment gets, in bits.
pub const MIN_BLOOM_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },

    #[error("memtable threshold must be > 0")]
    ZeroThreshold,

    #[error("sparsity factor must be > 0")]
    ZeroSparsity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base directory holding the WAL and the segment directory.
    pub data_dir: PathBuf,
    /// Memtable size in bytes at which the next `put` flushes.
    pub memtable_threshold: usize,
    /// Every N-th segment entry is sampled into the sparse index.
    pub sparsity_factor: usize,
    /// Fsync after every WAL append.
    pub wal_sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            memtable_threshold: DEFAULT_MEMTABLE_THRESHOLD,
            sparsity_factor: DEFAULT_SPARSITY_FACTOR,
            wal_sync: false,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_memtable_threshold(mut self, bytes: usize) -> Self {
        self.memtable_threshold = bytes;
        self
    }

    pub fn with_sparsity_factor(mut self, n: usize) -> Self {
        self.sparsity_factor = n;
        self
    }

    pub fn with_wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    /// Reads the `LSMKV_*` variables, using defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](EngineConfig::from_env) with a custom variable
    /// source. Unparsable values are errors, not silent defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            if dir.is_empty() {
                return Err(invalid(ENV_DATA_DIR, dir));
            }
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MEMTABLE_BYTES) {
            config.memtable_threshold = parse_usize(ENV_MEMTABLE_BYTES, raw)?;
        }
        if let Some(raw) = lookup(ENV_SPARSITY) {
            config.sparsity_factor = parse_usize(ENV_SPARSITY, raw)?;
        }
        if let Some(raw) = lookup(ENV_WAL_SYNC) {
            config.wal_sync = parse_bool(ENV_WAL_SYNC, raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memtable_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.sparsity_factor == 0 {
            return Err(ConfigError::ZeroSparsity);
        }
        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn segment_dir(&self) -> PathBuf {
        self.data_dir.join(SEGMENT_DIR_NAME)
    }

    /// Bloom filter length for segments on `level`: the memtable budget
    /// scaled by `level + 1`, never below [`MIN_BLOOM_BITS`].
    #[must_use]
    pub fn bloom_bits_for_level(&self, level: u32) -> usize {
        self.memtable_threshold
            .saturating_mul(level as usize + 1)
            .max(MIN_BLOOM_BITS)
    }
}

fn invalid(name: &str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value,
    }
}

fn parse_usize(name: &str, raw: String) -> Result<usize, ConfigError> {
    raw.trim().parse().map_err(|_| invalid(name, raw))
}

fn parse_bool(name: &str, raw: String) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, raw)),
    }
}
