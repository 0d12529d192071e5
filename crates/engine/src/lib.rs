//! # Engine - LSM storage engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`], and
//! [`sstable`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → (memtable over budget?)            │
//! │              |            yes                 │
//! │              v                                │
//! │           compact() → pairwise merges, L → L+1│
//! │              |                                │
//! │              v                                │
//! │           flush() → new L0 segment, WAL clear │
//! │              |                                │
//! │              v                                │
//! │           WAL append → Memtable insert        │
//! │                                               │
//! │ read.rs → Memtable → L0 → L1 → ... → Ln       │
//! │           (newest segment first, first hit)   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, `open`, accessors, `Debug`          |
//! | [`recovery`]   | WAL replay, segment table reconstruction             |
//! | [`write`]      | `put()`, `remove()`, `drop_table()`, flushing        |
//! | [`read`]       | `get()`                                              |
//! | [`compaction`] | `compact()`: size-tiered pairwise merges             |
//!
//! ## Levels
//!
//! ```text
//! ┌────────────────────────────┐  ← freshest, checked first
//! │ MEMTABLE                   │
//! ├────────────────────────────┤  ← from flushes
//! │ L0 segments                │
//! ├────────────────────────────┤  ← one merge deeper per level
//! │ L1 .. Ln segments          │
//! └────────────────────────────┘
//! ```
//!
//! Within a level segments are kept oldest to newest by id. After a
//! compaction every level holds at most one segment, and a deeper level only
//! ever holds older data than a shallower one.
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL **before** the Memtable update. The WAL
//! is only truncated **after** the flushed segment has been published.
//! Segments are written via temp file + rename, and compaction publishes the
//! merged segment before deleting its inputs.
mod compaction;
mod read;
mod recovery;
mod write;

use anyhow::{Context, Result};
use config::EngineConfig;
use memtable::Memtable;
pub use recovery::replay_wal_and_build;
use sstable::{Segment, SegmentOptions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use wal::WalWriter;

/// The storage engine: a memtable, its WAL, and the on-disk segment table.
///
/// # Write Path
///
/// 1. If the memtable has reached its byte budget, compact every level and
///    flush the memtable to a new level-0 segment, then truncate the WAL.
/// 2. Append the record to the WAL.
/// 3. Apply it to the memtable.
///
/// # Read Path
///
/// 1. Check the Memtable (freshest data, includes tombstones).
/// 2. Check levels shallowest first, newest segment first within a level.
/// 3. First match wins; tombstones shadow older values.
///
/// # Recovery
///
/// [`Engine::open`] replays the WAL into a fresh memtable and re-opens every
/// segment file, rebuilding bloom filters and sparse indexes by full scan.
///
/// Dropping the engine does not flush: the WAL already holds every write
/// that has not reached a segment.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) mem: Memtable,
    /// Level -> segments ordered oldest (lowest id) to newest.
    pub(crate) levels: BTreeMap<u32, Vec<Segment>>,
    pub(crate) segment_dir: PathBuf,
    pub(crate) wal_writer: WalWriter,
    /// Id given to the next segment created.
    pub(crate) next_id: u32,
    /// Files of merged-away segments whose removal failed. No longer
    /// searched; removal is retried on the next compaction.
    pub(crate) obsolete: Vec<PathBuf>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.config.data_dir)
            .field("memtable_threshold", &self.config.memtable_threshold)
            .field("sparsity_factor", &self.config.sparsity_factor)
            .field("wal_sync", &self.config.wal_sync)
            .field("memtable_size", &self.mem.byte_size())
            .field("memtable_entries", &self.mem.len())
            .field("levels", &self.levels())
            .field("next_segment_id", &self.next_id)
            .field("obsolete_files", &self.obsolete.len())
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) a database under `config.data_dir`, performing full
    /// recovery.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the data and segment directories if they do not exist.
    /// 2. Replay the WAL into a fresh Memtable.
    /// 3. Open the WAL writer in append mode, cutting off a torn tail.
    /// 4. Delete leftover `.tmp` files and re-open every segment, grouped by
    ///    the level encoded in its name.
    /// 5. Continue segment ids one past the largest id found.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;

        let segment_dir = config.segment_dir();
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        std::fs::create_dir_all(&segment_dir)
            .with_context(|| format!("creating {}", segment_dir.display()))?;

        // Replay before opening the writer.
        let wal_path = config.wal_path();
        let mut mem = Memtable::new();
        let stats = replay_wal_and_build(&wal_path, &mut mem)?;

        let mut wal_writer = WalWriter::create(&wal_path, config.wal_sync)
            .with_context(|| format!("opening WAL {}", wal_path.display()))?;
        if stats.truncated_tail {
            wal_writer
                .truncate_to(stats.valid_len)
                .context("cutting torn WAL tail")?;
        }

        let recovered = Self::restore_levels(&config, &segment_dir)?;
        let next_id = match recovered.max_id {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| anyhow::anyhow!("segment id space exhausted"))?,
            None => 0,
        };

        info!(
            data_dir = %config.data_dir.display(),
            wal_records = stats.applied,
            wal_skipped = stats.skipped,
            segments = recovered.segment_count(),
            next_id,
            "engine opened"
        );

        Ok(Self {
            config,
            mem,
            levels: recovered.levels,
            segment_dir,
            wal_writer,
            next_id,
            obsolete: Vec::new(),
        })
    }

    /// Shorthand for [`open`](Engine::open) with default tunables.
    pub fn open_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open(EngineConfig::new(data_dir))
    }

    /// Build options for a segment on `level`.
    pub(crate) fn segment_options(&self, level: u32) -> SegmentOptions {
        Self::options_for(&self.config, level)
    }

    pub(crate) fn options_for(config: &EngineConfig, level: u32) -> SegmentOptions {
        SegmentOptions::new(config.bloom_bits_for_level(level), config.sparsity_factor)
    }

    pub(crate) fn allocate_id(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("segment id space exhausted"))?;
        Ok(id)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current memtable size in bytes (sum of key and value lengths).
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.byte_size()
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    /// Returns the total number of segments across all levels.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    /// Returns the number of segments on `level`.
    #[must_use]
    pub fn level_count(&self, level: u32) -> usize {
        self.levels.get(&level).map_or(0, Vec::len)
    }

    /// Non-empty levels and their segment counts, shallowest first.
    pub fn levels(&self) -> BTreeMap<u32, usize> {
        self.levels
            .iter()
            .filter(|(_, segs)| !segs.is_empty())
            .map(|(&level, segs)| (level, segs.len()))
            .collect()
    }

    /// Id the next flushed or merged segment will get.
    #[must_use]
    pub fn next_segment_id(&self) -> u32 {
        self.next_id
    }

    /// Files of retired segments still waiting to be removed.
    pub fn obsolete_files(&self) -> &[PathBuf] {
        &self.obsolete
    }

    pub fn segment_dir(&self) -> &Path {
        &self.segment_dir
    }
}

#[cfg(test)]
mod tests;
