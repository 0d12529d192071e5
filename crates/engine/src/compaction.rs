/// Compaction: size-tiered pairwise merging from each level into the next.
///
/// For every level in ascending order, while it holds two or more segments
/// a pair is merged into one segment on the level below. New levels are
/// created on demand and visited in the same pass, so one call leaves at
/// most one segment per level.
///
/// The write path compacts before every flush, so a level never holds more
/// than two segments when compaction starts and the pair is the whole level.
/// Should a level hold more (forced flushes, an interrupted cascade), the two
/// oldest are merged first so that every level stays newer than the ones
/// below it.
///
/// Tombstones are dropped only when no level below the source holds data;
/// anywhere else they must keep shadowing older values further down.
use anyhow::{Context, Result};
use sstable::Segment;
use std::fs;
use std::io;
use tracing::{debug, info, warn};

use crate::Engine;

impl Engine {
    /// Merges segments level by level until no level holds more than one.
    ///
    /// The merged segment is published and registered before its inputs are
    /// deleted. If the merge fails the inputs stay in place and the engine
    /// remains usable. If an input file cannot be deleted afterwards the
    /// failure is logged and retried later; the call still succeeds.
    pub fn compact(&mut self) -> Result<()> {
        self.purge_obsolete();

        let mut level = match self.levels.keys().next() {
            Some(&l) => l,
            None => return Ok(()),
        };

        let mut merges = 0usize;
        loop {
            while self.level_count(level) >= 2 {
                self.merge_oldest_pair(level)?;
                merges += 1;
            }
            match self.levels.range(level + 1..).next() {
                Some((&next, _)) => level = next,
                None => break,
            }
        }

        // Keep only populated levels.
        self.levels.retain(|_, segs| !segs.is_empty());

        if merges > 0 {
            info!(merges, levels = ?self.levels(), "compaction finished");
        }
        Ok(())
    }

    /// Deletes the files of segments already unlinked from the level table.
    ///
    /// A file that cannot be removed is remembered in `obsolete` and retried
    /// by the next [`compact`](Engine::compact).
    pub(crate) fn retire(&mut self, segments: Vec<Segment>) {
        for segment in segments {
            let path = segment.path().to_path_buf();
            if let Err(e) = segment.delete_file() {
                warn!(path = %path.display(), error = %format!("{:#}", e), "could not delete merged segment");
                self.obsolete.push(path);
            }
        }
    }

    /// Retries removal of files left behind by [`retire`](Engine::retire).
    pub(crate) fn purge_obsolete(&mut self) {
        self.obsolete.retain(|path| match fs::remove_file(path) {
            Ok(()) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "obsolete segment still present");
                true
            }
        });
    }

    /// Whether nothing older than the oldest pair of `level` exists.
    fn is_deepest_merge(&self, level: u32) -> bool {
        self.levels
            .range(level + 1..)
            .all(|(_, segs)| segs.is_empty())
    }

    fn merge_oldest_pair(&mut self, level: u32) -> Result<()> {
        let target = level
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("level number overflow"))?;
        let drop_tombstones = self.is_deepest_merge(level);
        let id = self.allocate_id()?;
        let options = self.segment_options(target);

        let merged = {
            let segs = &self.levels[&level];
            let older = &segs[0];
            let newer = &segs[1];
            debug!(
                level,
                newer = newer.id(),
                older = older.id(),
                id,
                drop_tombstones,
                "compacting pair"
            );
            Segment::merge(&self.segment_dir, id, target, options, newer, older, drop_tombstones)
                .with_context(|| format!("merging level {} into level {}", level, target))?
        };

        // The merged file is durable. Swap the table first so that a failed
        // removal below can never hide data.
        let segs = self
            .levels
            .get_mut(&level)
            .ok_or_else(|| anyhow::anyhow!("level {} vanished during compaction", level))?;
        let inputs: Vec<Segment> = segs.drain(..2).collect();
        match merged {
            Some(segment) => self.levels.entry(target).or_default().push(segment),
            None => debug!(level, "merge left no live entries"),
        }

        self.retire(inputs);
        Ok(())
    }
}
