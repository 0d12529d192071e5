//! Two-way merge of sorted pair streams.
//!
//! Produces pairs in ascending key order. When both sources hold the same
//! key, only the pair from the **newer** source is emitted and the older one
//! is discarded. This is the core primitive for compaction.

use anyhow::Result;
use memtable::KvPair;
use std::cmp::Ordering;

/// Merge-join over a newer and an older sorted stream.
///
/// Both sources must yield strictly ascending keys. Tombstones are passed
/// through untouched; deciding whether to keep them is the caller's job.
pub struct MergeIterator<N, O>
where
    N: Iterator<Item = Result<KvPair>>,
    O: Iterator<Item = Result<KvPair>>,
{
    newer: N,
    older: O,
    newer_head: Option<KvPair>,
    older_head: Option<KvPair>,
    /// Set once a source reported an error; the iterator then stops.
    failed: bool,
}

impl<N, O> MergeIterator<N, O>
where
    N: Iterator<Item = Result<KvPair>>,
    O: Iterator<Item = Result<KvPair>>,
{
    pub fn new(newer: N, older: O) -> Self {
        Self {
            newer,
            older,
            newer_head: None,
            older_head: None,
            failed: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.newer_head.is_none() {
            self.newer_head = self.newer.next().transpose()?;
        }
        if self.older_head.is_none() {
            self.older_head = self.older.next().transpose()?;
        }
        Ok(())
    }

    /// Returns the next merged pair, or `None` when both sources are exhausted.
    pub fn next_entry(&mut self) -> Result<Option<KvPair>> {
        self.fill()?;

        let order = match (&self.newer_head, &self.older_head) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(n), Some(o)) => n.key.cmp(&o.key),
        };

        Ok(match order {
            Ordering::Less => self.newer_head.take(),
            Ordering::Greater => self.older_head.take(),
            Ordering::Equal => {
                // Shadowed by the newer source.
                self.older_head = None;
                self.newer_head.take()
            }
        })
    }

    /// Collects all remaining pairs into a `Vec`.
    pub fn collect_all(&mut self) -> Result<Vec<KvPair>> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}

impl<N, O> Iterator for MergeIterator<N, O>
where
    N: Iterator<Item = Result<KvPair>>,
    O: Iterator<Item = Result<KvPair>>,
{
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
