use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use memtable::{KvPair, Memtable, RedBlackTree};
use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::format::{parse_segment_path, SegmentOptions};
use crate::merge::MergeIterator;
use crate::writer::SegmentWriter;

/// One immutable sorted file plus its in-memory bloom filter and sparse index.
///
/// The sparse index maps every `sparsity`-th key to the byte offset where its
/// line starts. A lookup seeks to the nearest sampled key at or before the
/// target and scans forward, stopping as soon as a larger key shows up.
///
/// A persistent file handle is kept open for the lifetime of the segment,
/// wrapped in a `Mutex` so that `search` can be called through `&self`.
pub struct Segment {
    path: PathBuf,
    id: u32,
    level: u32,
    bloom: BloomFilter,
    index: RedBlackTree<String, u64>,
    len: usize,
    file: Mutex<BufReader<File>>,
}

impl Segment {
    pub(crate) fn from_parts(
        path: PathBuf,
        id: u32,
        level: u32,
        bloom: BloomFilter,
        index: RedBlackTree<String, u64>,
        len: usize,
    ) -> Result<Self> {
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            path,
            id,
            level,
            bloom,
            index,
            len,
            file: Mutex::new(BufReader::new(file)),
        })
    }

    /// Flushes `mem` to a new level-0 segment in `dir`, leaving `mem` empty.
    ///
    /// # Errors
    ///
    /// Fails if the memtable is empty or on any I/O error. On failure the
    /// drained entries are put back so nothing is lost from memory.
    pub fn create_from_memtable(
        dir: &Path,
        id: u32,
        options: SegmentOptions,
        mem: &mut Memtable,
    ) -> Result<Self> {
        if mem.is_empty() {
            bail!("refusing to write an empty segment (empty memtable)");
        }

        let pairs = mem.drain_sorted();
        match Self::write_sorted(dir, id, 0, options, &pairs) {
            Ok(segment) => Ok(segment),
            Err(e) => {
                for pair in pairs {
                    mem.insert(pair);
                }
                Err(e)
            }
        }
    }

    fn write_sorted(
        dir: &Path,
        id: u32,
        level: u32,
        options: SegmentOptions,
        pairs: &[KvPair],
    ) -> Result<Self> {
        let mut writer = SegmentWriter::create(dir, id, level, options)?;
        let pushed = pairs.iter().try_for_each(|pair| writer.push(pair));
        if let Err(e) = pushed {
            writer.discard();
            return Err(e);
        }
        writer.finish()
    }

    /// Merges two segments into a new segment `id` at `level`.
    ///
    /// The input with the higher id is the newer one and wins on shared keys.
    /// Tombstones are carried into the output unless `drop_tombstones` is set.
    /// Returns `Ok(None)` when nothing survives the merge; no file is left
    /// behind in that case. The inputs are not modified.
    pub fn merge(
        dir: &Path,
        id: u32,
        level: u32,
        options: SegmentOptions,
        a: &Segment,
        b: &Segment,
        drop_tombstones: bool,
    ) -> Result<Option<Self>> {
        let (newer, older) = if a.id >= b.id { (a, b) } else { (b, a) };
        debug!(
            newer = newer.id,
            older = older.id,
            id,
            level,
            drop_tombstones,
            "merging segments"
        );

        let mut writer = SegmentWriter::create(dir, id, level, options)?;
        let dropped = match Self::copy_merged(&mut writer, newer, older, drop_tombstones) {
            Ok(dropped) => dropped,
            Err(e) => {
                writer.discard();
                return Err(e);
            }
        };

        if writer.len() == 0 {
            debug!(id, dropped, "merge produced no live entries");
            writer.abandon()?;
            return Ok(None);
        }
        writer.finish().map(Some)
    }

    /// Feeds the merged stream into `writer`, returning how many tombstones
    /// were dropped.
    fn copy_merged(
        writer: &mut SegmentWriter,
        newer: &Segment,
        older: &Segment,
        drop_tombstones: bool,
    ) -> Result<usize> {
        let mut dropped = 0usize;
        for pair in MergeIterator::new(newer.scan()?, older.scan()?) {
            let pair = pair?;
            if drop_tombstones && pair.is_tombstone() {
                dropped += 1;
                continue;
            }
            writer.push(&pair)?;
        }
        Ok(dropped)
    }

    /// Re-opens a segment after a restart.
    ///
    /// The file is scanned once to rebuild the bloom filter and sparse index
    /// with exactly the sampling used at write time. Lines that cannot be
    /// decoded are skipped with a warning.
    pub fn open<P: AsRef<Path>>(path: P, options: SegmentOptions) -> Result<Self> {
        options.check()?;
        let path = path.as_ref().to_path_buf();
        let (id, level) = match parse_segment_path(&path) {
            Some(parsed) => parsed,
            None => bail!("not a segment file name: {}", path.display()),
        };

        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut scanner = SegmentScanner::new(BufReader::new(file), 0);

        let mut bloom = BloomFilter::new(options.bloom_bits);
        let mut index = RedBlackTree::new();
        let mut len = 0usize;
        let mut last_key: Option<String> = None;

        while let Some((offset, pair)) = scanner.next_entry()? {
            if let Some(last) = &last_key {
                if pair.key.as_str() <= last.as_str() {
                    bail!(
                        "segment {} is not sorted: {:?} after {:?}",
                        path.display(),
                        pair.key,
                        last
                    );
                }
            }
            if len % options.sparsity == 0 {
                index.insert(pair.key.clone(), offset);
            }
            bloom.set(&pair.key);
            len += 1;
            last_key = Some(pair.key);
        }

        if scanner.skipped() > 0 {
            warn!(
                path = %path.display(),
                skipped = scanner.skipped(),
                "segment contains undecodable lines"
            );
        }

        Self::from_parts(path, id, level, bloom, index, len)
    }

    /// Point lookup.
    ///
    /// Returns `Ok(None)` when the key is definitely absent, and the stored
    /// value otherwise. A tombstone comes back as the raw tombstone string.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, so an unreadable file is never
    /// mistaken for a missing key.
    pub fn search(&self, key: &str) -> Result<Option<String>> {
        // Fast path: bloom filter says "definitely not here"
        if !self.bloom.is_set(key) {
            return Ok(None);
        }

        let start = match self.index.floor(key) {
            Some((_, &offset)) => offset,
            // Smaller than the first key.
            None => return Ok(None),
        };

        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(start))?;

        let mut scanner = SegmentScanner::new(&mut *f, start);
        while let Some((_, pair)) = scanner.next_entry()? {
            match pair.key.as_str().cmp(key) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(pair.value)),
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Streams every pair in file order through a fresh file handle.
    pub fn scan(&self) -> Result<SegmentScanner<BufReader<File>>> {
        let file =
            File::open(&self.path).with_context(|| format!("opening {}", self.path.display()))?;
        Ok(SegmentScanner::new(BufReader::new(file), 0))
    }

    /// Removes the backing file. Consumes the segment so that no lookup can
    /// reach it afterwards.
    pub fn delete_file(self) -> Result<()> {
        let Segment { path, file, .. } = self;
        drop(file);
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        debug!(path = %path.display(), "segment file deleted");
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name, `<id>_<level>`.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Number of entries (tombstones included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    /// The sparse key -> offset index.
    pub fn index(&self) -> &RedBlackTree<String, u64> {
        &self.index
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("level", &self.level)
            .field("len", &self.len)
            .field("index_len", &self.index.len())
            .finish()
    }
}

/// Sequential reader over segment lines.
///
/// Lines that cannot be decoded (bad UTF-8, no separator) are skipped with a
/// warning and counted; they still advance the byte offset.
pub struct SegmentScanner<R: BufRead> {
    reader: R,
    offset: u64,
    skipped: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> SegmentScanner<R> {
    /// `offset` is the byte position `reader` currently sits at.
    pub fn new(reader: R, offset: u64) -> Self {
        Self {
            reader,
            offset,
            skipped: 0,
            buf: Vec::with_capacity(128),
        }
    }

    /// Next decodable pair along with the offset its line starts at.
    pub fn next_entry(&mut self) -> Result<Option<(u64, KvPair)>> {
        loop {
            self.buf.clear();
            let start = self.offset;
            let n = self.reader.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                return Ok(None);
            }
            self.offset += n as u64;

            let text = match std::str::from_utf8(&self.buf) {
                Ok(t) => t,
                Err(e) => {
                    warn!(offset = start, error = %e, "skipping non-utf8 segment line");
                    self.skipped += 1;
                    continue;
                }
            };
            match KvPair::parse_log_line(text) {
                Ok(pair) => return Ok(Some((start, pair))),
                Err(e) => {
                    warn!(offset = start, error = %e, "skipping corrupt segment line");
                    self.skipped += 1;
                }
            }
        }
    }

    /// Lines skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for SegmentScanner<R> {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose().map(|r| r.map(|(_, pair)| pair))
    }
}
