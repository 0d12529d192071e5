//! Segment file naming and per-segment build options.
//!
//! ## File name
//!
//! ```text
//! <id:05>_<level:05>[.<ext>]
//! ```
//!
//! Both fields are zero-padded to at least five decimal digits. The level is
//! recovered from the name on restart; all segments share one flat directory.
//! Files carrying the [`TMP_EXTENSION`] are unfinished writes and are never
//! treated as segments.

use std::path::Path;

/// Extension of a segment that is still being written.
pub const TMP_EXTENSION: &str = "tmp";

/// Minimum width of the zero-padded name fields.
pub const NAME_FIELD_WIDTH: usize = 5;

/// Builds the file name for segment `id` at `level`.
#[must_use]
pub fn segment_file_name(id: u32, level: u32) -> String {
    format!("{:05}_{:05}", id, level)
}

/// Decodes `(id, level)` from a segment file name.
///
/// Accepts any decimal width and an optional extension other than
/// [`TMP_EXTENSION`]. Returns `None` for anything else.
pub fn parse_segment_file_name(name: &str) -> Option<(u32, u32)> {
    let stem = match name.split_once('.') {
        Some((_, ext)) if ext == TMP_EXTENSION => return None,
        Some((stem, _)) => stem,
        None => name,
    };
    let (id, level) = stem.split_once('_')?;
    Some((parse_field(id)?, parse_field(level)?))
}

/// Same as [`parse_segment_file_name`] for a full path.
pub fn parse_segment_path(path: &Path) -> Option<(u32, u32)> {
    parse_segment_file_name(path.file_name()?.to_str()?)
}

/// Returns `true` if `path` is a leftover temporary segment file.
pub fn is_tmp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TMP_EXTENSION)
}

fn parse_field(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Parameters fixed at segment construction time.
///
/// The same options must be supplied when a segment is re-opened after a
/// restart, otherwise its bloom filter and sparse index differ from the ones
/// built at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Length of the bloom filter in bits. Must be non-zero.
    pub bloom_bits: usize,
    /// Every `sparsity`-th entry is sampled into the sparse index. Must be non-zero.
    pub sparsity: usize,
}

impl SegmentOptions {
    pub fn new(bloom_bits: usize, sparsity: usize) -> Self {
        Self {
            bloom_bits,
            sparsity,
        }
    }

    pub(crate) fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.bloom_bits > 0, "segment bloom filter needs at least one bit");
        anyhow::ensure!(self.sparsity > 0, "segment sparsity factor must be > 0");
        Ok(())
    }
}
