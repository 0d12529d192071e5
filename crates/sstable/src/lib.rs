//! # SSTable - Sorted segment files
//!
//! Immutable, on-disk storage for the LSM engine.
//!
//! When the memtable exceeds its size threshold the engine flushes it to disk
//! as a level-0 [`Segment`]. Segments are *write-once, read-many*: once
//! created they are never modified, only replaced when compaction merges two
//! of them into one segment on the next level.
//!
//! ## File layout
//!
//! ```text
//! <key>,<value>\n
//! <key>,<value>\n
//! ...
//! ```
//!
//! One line per key, strictly ascending by key, in the same line format as
//! the WAL. Deleted keys carry the tombstone value. There is no header or
//! footer: the bloom filter and the sparse index live in memory only and are
//! rebuilt by a full scan when a segment is re-opened.
//!
//! ## Naming
//!
//! `<id:05>_<level:05>`, all segments in one flat directory. See [`format`].

pub mod format;

mod dir;
mod merge;
mod reader;
mod writer;

pub use dir::{collect_levels, delete_all_segments, RecoveredLevels};
pub use format::{parse_segment_file_name, segment_file_name, SegmentOptions, TMP_EXTENSION};
pub use merge::MergeIterator;
pub use reader::{Segment, SegmentScanner};

#[cfg(test)]
mod tests;
