//! Key/value pairs and their on-disk log-line form.
//!
//! The WAL and every segment file share one text format:
//!
//! ```text
//! <key>,<value>\n
//! ```
//!
//! Keys never contain the separator, so a line is split at its **first**
//! separator and the value may contain further commas.

use thiserror::Error;

/// Reserved value marking a logical deletion. Users may never store it.
pub const TOMBSTONE: &str = "+++TOMBSTONE+++";

/// Separator between key and value in a log line.
pub const SEPARATOR: char = ',';

/// Errors produced while decoding a log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The line has no separator, so key and value cannot be told apart.
    #[error("log line has no ',' separator: {0:?}")]
    MissingSeparator(String),
}

/// A single key/value pair. `value` may be [`TOMBSTONE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A deletion marker for `key`.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self::new(key, TOMBSTONE)
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }

    /// Bytes this pair contributes to the memtable size counter.
    #[must_use]
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }

    /// Serializes the pair as `key,value\n`.
    #[must_use]
    pub fn to_log_line(&self) -> String {
        let mut line = String::with_capacity(self.key.len() + self.value.len() + 2);
        line.push_str(&self.key);
        line.push(SEPARATOR);
        line.push_str(&self.value);
        line.push('\n');
        line
    }

    /// Parses one log line. A trailing `\n` (and `\r`) is ignored.
    pub fn parse_log_line(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(['\n', '\r']);
        match line.split_once(SEPARATOR) {
            Some((key, value)) => Ok(Self::new(key, value)),
            None => Err(RecordError::MissingSeparator(line.to_string())),
        }
    }
}
