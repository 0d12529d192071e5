use anyhow::{Context, Result};
use bloom::BloomFilter;
use memtable::{KvPair, RedBlackTree};
use std::fs::{self, rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::format::{segment_file_name, SegmentOptions, TMP_EXTENSION};
use crate::Segment;

/// Streams sorted pairs into a new segment file.
///
/// The write is crash-safe: lines go to `<name>.tmp`, which is fsynced and
/// then atomically renamed to its final name. The bloom filter and sparse
/// index are built on the fly, so the result is a ready-to-query
/// [`Segment`] without re-reading the file.
pub(crate) struct SegmentWriter {
    id: u32,
    level: u32,
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    options: SegmentOptions,
    bloom: BloomFilter,
    index: RedBlackTree<String, u64>,
    offset: u64,
    count: usize,
    last_key: Option<String>,
}

impl SegmentWriter {
    pub(crate) fn create(dir: &Path, id: u32, level: u32, options: SegmentOptions) -> Result<Self> {
        options.check()?;
        let path = dir.join(segment_file_name(id, level));
        let tmp_path = path.with_extension(TMP_EXTENSION);
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;

        Ok(Self {
            id,
            level,
            path,
            tmp_path,
            file: BufWriter::new(raw_file),
            options,
            bloom: BloomFilter::new(options.bloom_bits),
            index: RedBlackTree::new(),
            offset: 0,
            count: 0,
            last_key: None,
        })
    }

    /// Appends one pair. Keys must arrive in strictly ascending order.
    pub(crate) fn push(&mut self, pair: &KvPair) -> Result<()> {
        if let Some(last) = &self.last_key {
            anyhow::ensure!(
                pair.key.as_str() > last.as_str(),
                "segment keys out of order: {:?} after {:?}",
                pair.key,
                last
            );
        }

        // Sample the offset where this line starts.
        if self.count % self.options.sparsity == 0 {
            self.index.insert(pair.key.clone(), self.offset);
        }
        self.bloom.set(&pair.key);

        let line = pair.to_log_line();
        self.file.write_all(line.as_bytes())?;
        self.offset += line.len() as u64;
        self.count += 1;
        self.last_key = Some(pair.key.clone());
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// Seals the file and publishes it under its final name.
    pub(crate) fn finish(self) -> Result<Segment> {
        let SegmentWriter {
            id,
            level,
            path,
            tmp_path,
            mut file,
            bloom,
            index,
            count,
            ..
        } = self;

        file.flush()?;
        file.into_inner()?.sync_all()?;

        rename(&tmp_path, &path)
            .with_context(|| format!("publishing {}", path.display()))?;

        // A crash between rename and directory sync can lose the entry on
        // ext4/XFS.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(id, level, entries = count, "segment written");
        Segment::from_parts(path, id, level, bloom, index, count)
    }

    /// Like [`abandon`](Self::abandon), for error paths: a failed cleanup is
    /// logged and the `.tmp` file is left for the restart scan.
    pub(crate) fn discard(self) {
        let tmp_path = self.tmp_path.clone();
        if let Err(e) = self.abandon() {
            warn!(path = %tmp_path.display(), error = %e, "could not remove unfinished segment");
        }
    }

    /// Drops the unfinished file.
    pub(crate) fn abandon(self) -> Result<()> {
        let tmp_path = self.tmp_path.clone();
        drop(self);
        fs::remove_file(&tmp_path)
            .with_context(|| format!("removing {}", tmp_path.display()))?;
        Ok(())
    }
}
