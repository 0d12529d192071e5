/// WAL replay and segment table recovery.
///
/// This module handles the cold-start path: replaying the WAL into a fresh
/// memtable and re-opening every segment file left on disk.
use anyhow::{Context, Result};
use config::EngineConfig;
use memtable::Memtable;
use sstable::{collect_levels, RecoveredLevels};
use std::path::Path;
use tracing::warn;
use wal::{ReplayStats, WalReader};

use crate::Engine;

/// Replays a WAL file into the given memtable.
///
/// If the WAL file does not exist, returns empty stats (fresh start).
/// Later lines overwrite earlier ones, so a tombstone written after a value
/// wins as it did before the restart.
///
/// # Errors
///
/// Propagates any I/O error from [`WalReader::replay`]. Malformed lines are
/// skipped, not fatal.
pub fn replay_wal_and_build<P: AsRef<Path>>(path: P, mem: &mut Memtable) -> Result<ReplayStats> {
    match WalReader::open(path.as_ref()) {
        Ok(mut reader) => {
            let stats = reader
                .replay(|pair| {
                    mem.insert(pair);
                })
                .context("failed to replay WAL")?;

            if stats.skipped > 0 || stats.truncated_tail {
                warn!(
                    skipped = stats.skipped,
                    truncated_tail = stats.truncated_tail,
                    "WAL replay dropped damaged records"
                );
            }
            Ok(stats)
        }
        Err(e) => {
            // File doesn't exist yet -> fresh start
            if matches!(e, wal::WalError::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
            {
                Ok(ReplayStats::default())
            } else {
                Err(anyhow::anyhow!(e).context("failed to open WAL for replay"))
            }
        }
    }
}

impl Engine {
    /// Re-opens every segment in `segment_dir` with the options its level
    /// was written with. Leftover `.tmp` files are removed on the way.
    pub(crate) fn restore_levels(config: &EngineConfig, segment_dir: &Path) -> Result<RecoveredLevels> {
        collect_levels(segment_dir, |level| Self::options_for(config, level))
            .with_context(|| format!("restoring segments from {}", segment_dir.display()))
    }
}
