//! # WAL - Write-Ahead Log
//!
//! Crash durability for the memtable.
//!
//! Every mutation (a put or a tombstone) is appended to the WAL as a log line
//! **before** the corresponding memtable update. After a flush the WAL is
//! truncated, since the new segment holds everything it described. On
//! restart the WAL is replayed into a fresh memtable so that no acknowledged
//! write is lost.
//!
//! ## Record Format
//!
//! The WAL uses the same line format as segment files:
//!
//! ```text
//! <key>,<value>\n
//! ```
//!
//! A line without its terminating `\n` can only be the tail of a write that
//! was interrupted by a crash; replay ignores it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memtable::KvPair;
//! use wal::{WalReader, WalWriter};
//!
//! let mut w = WalWriter::create("wal.log", true).unwrap();
//! w.append(&KvPair::new("hello", "world")).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|pair| println!("{:?}", pair)).unwrap();
//! ```

use memtable::KvPair;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during WAL operations.
///
/// Malformed lines are not errors: replay skips them and counts them in
/// [`ReplayStats::skipped`].
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append-only WAL writer.
///
/// Each line is written with a single `write_all` call. When `sync` is
/// `true`, every append is followed by `sync_all()` so the record is on disk
/// before the call returns.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    sync: bool,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the WAL (created if it does not exist).
    /// * `sync` - if true, every `append` call is followed by `fsync`.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Self { file, path, sync })
    }

    /// Appends one `key,value\n` line.
    ///
    /// The caller must not treat the write as acknowledged if this fails.
    pub fn append(&mut self, pair: &KvPair) -> Result<(), WalError> {
        let line = pair.to_log_line();
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Truncates the WAL to zero length.
    ///
    /// Called right after a successful flush. Later appends start again at
    /// offset 0 because the file is opened in append mode.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), "wal truncated");
        Ok(())
    }

    /// Cuts the file back to `len` bytes.
    ///
    /// Used after replay to drop a torn tail, so the next append does not
    /// glue onto a partial line.
    pub fn truncate_to(&mut self, len: u64) -> Result<(), WalError> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), len, "wal tail cut");
        Ok(())
    }

    /// Forces buffered data to disk via `sync_all()`.
    ///
    /// Useful when `sync` is `false` and the caller wants durability at a
    /// specific point.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Current length of the WAL file in bytes.
    pub fn len(&self) -> Result<u64, WalError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, WalError> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a [`WalReader::replay`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Lines handed to the callback.
    pub applied: usize,
    /// Complete lines that could not be decoded (bad UTF-8, no separator).
    pub skipped: usize,
    /// Whether the file ended in a partial line that was ignored.
    pub truncated_tail: bool,
    /// Bytes up to the end of the last complete line.
    pub valid_len: u64,
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so tests can replay in-memory
/// buffers (`Cursor<Vec<u8>>`) as well as real files.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    ///
    /// Returns `WalError::Io` if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every well-formed line in order, calling `apply` for each.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(stats)`.
    /// - **Partial last line** (crash mid-write) -> ignored, `truncated_tail`
    ///   is set, and all complete lines before it are still applied.
    /// - **Malformed line** -> skipped with a warning, replay continues.
    /// - **I/O error** -> `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ReplayStats, WalError>
    where
        F: FnMut(KvPair),
    {
        let mut stats = ReplayStats::default();
        let mut buf = Vec::with_capacity(256);
        let mut line_no = 0usize;

        loop {
            buf.clear();
            let n = self.rdr.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_no += 1;

            if buf.last() != Some(&b'\n') {
                warn!(line = line_no, bytes = n, "ignoring torn wal tail");
                stats.truncated_tail = true;
                break;
            }
            stats.valid_len += n as u64;

            let text = match std::str::from_utf8(&buf) {
                Ok(t) => t,
                Err(e) => {
                    warn!(line = line_no, error = %e, "skipping non-utf8 wal line");
                    stats.skipped += 1;
                    continue;
                }
            };

            match KvPair::parse_log_line(text) {
                Ok(pair) => {
                    apply(pair);
                    stats.applied += 1;
                }
                Err(e) => {
                    warn!(line = line_no, error = %e, "skipping corrupt wal line");
                    stats.skipped += 1;
                }
            }
        }

        debug!(
            applied = stats.applied,
            skipped = stats.skipped,
            truncated_tail = stats.truncated_tail,
            "wal replay finished"
        );
        Ok(stats)
    }
}
