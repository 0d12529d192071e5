//! Segment directory helpers: rebuild the level table on restart, wipe it on drop.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::format::{is_tmp_file, parse_segment_path, SegmentOptions};
use crate::Segment;

/// Segments found on disk, grouped by level.
#[derive(Debug, Default)]
pub struct RecoveredLevels {
    /// Level -> segments ordered oldest (lowest id) to newest.
    pub levels: BTreeMap<u32, Vec<Segment>>,
    /// Largest segment id seen, if any.
    pub max_id: Option<u32>,
    /// Unfinished `.tmp` files that were deleted.
    pub removed_tmp: usize,
}

impl RecoveredLevels {
    pub fn segment_count(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }
}

/// Scans `dir` and re-opens every segment in it.
///
/// `options_for_level` must return the same options the segment was written
/// with. Leftover temporary files are removed; other unrecognised files are
/// ignored with a warning. A segment that exists but cannot be read is an
/// error, never silently dropped.
pub fn collect_levels<F>(dir: &Path, options_for_level: F) -> Result<RecoveredLevels>
where
    F: Fn(u32) -> SegmentOptions,
{
    let mut recovered = RecoveredLevels::default();
    if !dir.exists() {
        return Ok(recovered);
    }

    let mut found: Vec<(u32, u32, std::path::PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if is_tmp_file(&path) {
            fs::remove_file(&path)
                .with_context(|| format!("removing leftover {}", path.display()))?;
            recovered.removed_tmp += 1;
            continue;
        }
        match parse_segment_path(&path) {
            Some((id, level)) => found.push((id, level, path)),
            None => warn!(path = %path.display(), "ignoring unrecognised file in segment directory"),
        }
    }

    found.sort_by_key(|(id, _, _)| *id);
    for (id, level, path) in found {
        let segment = Segment::open(&path, options_for_level(level))
            .with_context(|| format!("re-opening segment {}", path.display()))?;
        recovered.max_id = Some(recovered.max_id.map_or(id, |m| m.max(id)));
        recovered.levels.entry(level).or_default().push(segment);
    }

    info!(
        segments = recovered.segment_count(),
        levels = recovered.levels.len(),
        removed_tmp = recovered.removed_tmp,
        "segment directory scanned"
    );
    Ok(recovered)
}

/// Removes every file in the segment directory. Returns how many were removed.
pub fn delete_all_segments(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            removed += 1;
        }
    }
    info!(removed, dir = %dir.display(), "segment directory cleared");
    Ok(removed)
}
