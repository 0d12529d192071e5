/// Write path: `put()`, `remove()`, `drop_table()`, and flushing.
///
/// All mutations flow through this module. Before a write is accepted the
/// memtable budget is checked; an over-budget memtable is flushed to a new
/// level-0 segment (after compacting existing levels), so the incoming entry
/// starts the next memtable generation. Each write is then appended to the
/// WAL for durability and applied to the in-memory Memtable.
use anyhow::{bail, Context, Result};
use memtable::{KvPair, SEPARATOR, TOMBSTONE};
use sstable::{delete_all_segments, Segment};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use crate::Engine;

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        bail!("key must not be empty");
    }
    if key.contains(SEPARATOR) {
        bail!("key must not contain '{}'", SEPARATOR);
    }
    if key.contains(['\n', '\r']) {
        bail!("key must not contain a line break");
    }
    Ok(())
}

fn check_value(value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("value must not be empty");
    }
    if value.contains(['\n', '\r']) {
        bail!("value must not contain a line break");
    }
    if value == TOMBSTONE {
        bail!("value is reserved");
    }
    Ok(())
}

impl Engine {
    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// Rejects keys that are empty or contain the separator or a line break,
    /// and values that are empty, contain a line break or equal the reserved
    /// tombstone marker. Fails without acknowledging the write if the WAL
    /// append fails.
    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        check_value(value)?;
        self.apply(KvPair::new(key, value))
    }

    /// Deletes `key` by writing a tombstone.
    ///
    /// The tombstone shadows any older value in segments until compaction
    /// carries it to the deepest level.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        check_key(key)?;
        self.apply(KvPair::tombstone(key))
    }

    fn apply(&mut self, pair: KvPair) -> Result<()> {
        if self.needs_flush() {
            self.compact()?;
            self.flush()?;
        }

        // Append to WAL first
        self.wal_writer.append(&pair)?;
        debug!(key = %pair.key, tombstone = pair.is_tombstone(), "write applied");

        self.mem.insert(pair);
        Ok(())
    }

    /// Whether the memtable has reached its byte budget.
    ///
    /// Checked before every write; kept separate so a scheduler other than
    /// the write path could drive flushing.
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        !self.mem.is_empty() && self.mem.byte_size() >= self.config.memtable_threshold
    }

    /// Flushes a non-empty memtable to level 0 without compacting first.
    /// No-op on an empty memtable.
    pub fn force_flush(&mut self) -> Result<()> {
        if self.mem.is_empty() {
            return Ok(());
        }
        self.flush()
    }

    /// Writes the memtable to a new level-0 segment, then truncates the WAL.
    ///
    /// If the segment cannot be written the memtable and WAL are left as
    /// they were.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let id = self.allocate_id()?;
        let options = self.segment_options(0);
        let bytes = self.mem.byte_size();

        let segment = Segment::create_from_memtable(&self.segment_dir, id, options, &mut self.mem)?;
        info!(id, entries = segment.len(), bytes, "memtable flushed");
        self.levels.entry(0).or_default().push(segment);

        // The segment now holds every WAL entry.
        self.wal_writer.clear()?;
        Ok(())
    }

    /// Resets the database to empty: truncates the WAL, clears the memtable
    /// and deletes every segment file.
    ///
    /// The WAL goes first so that a failure there changes nothing. A segment
    /// leaves the level table only once its file is gone, so after a failed
    /// call every segment still listed is still readable.
    pub fn drop_table(&mut self) -> Result<()> {
        self.wal_writer.clear()?;
        self.mem.clear();

        for segs in self.levels.values_mut() {
            while let Some(segment) = segs.last() {
                remove_if_present(segment.path())?;
                segs.pop();
            }
        }
        self.levels.clear();

        // Anything else left in the directory (e.g. unfinished merges).
        delete_all_segments(&self.segment_dir)?;
        self.obsolete.clear();

        self.next_id = 0;
        info!(data_dir = %self.config.data_dir.display(), "table dropped");
        Ok(())
    }
}
