//! # Memtable
//!
//! The mutable, in-memory half of the LSM tree, plus the ordered tree and
//! the key/value record types shared by the WAL and the segment files.
//!
//! A [`Memtable`] is a [`RedBlackTree`] of `String -> String` with a running
//! byte counter. Deletions are stored as [`TOMBSTONE`] values so they can
//! shadow older data on disk; the memtable itself never interprets them.

mod record;
mod tree;

pub use record::{KvPair, RecordError, SEPARATOR, TOMBSTONE};
pub use tree::{Color, InvariantViolation, Iter, RedBlackTree};

#[derive(Debug, Default)]
pub struct Memtable {
    tree: RedBlackTree<String, String>,
    byte_size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            tree: RedBlackTree::new(),
            byte_size: 0,
        }
    }

    /// Inserts or overwrites `key`. Returns the signed change in
    /// [`byte_size`](Memtable::byte_size): `key + value` for a new key,
    /// `new_value - old_value` for an overwrite.
    pub fn put(&mut self, key: String, value: String) -> isize {
        let key_len = key.len();
        let value_len = value.len();
        let delta = match self.tree.insert(key, value) {
            Some(old) => value_len as isize - old.len() as isize,
            None => (key_len + value_len) as isize,
        };
        self.byte_size = self.byte_size.saturating_add_signed(delta);
        delta
    }

    /// Same as [`put`](Memtable::put) for an owned pair.
    pub fn insert(&mut self, pair: KvPair) -> isize {
        self.put(pair.key, pair.value)
    }

    /// Raw lookup; a deleted key yields `Some(TOMBSTONE)`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tree.get(key).map(String::as_str)
    }

    /// Physically removes `key` from the tree (no tombstone is left behind).
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let value = self.tree.remove(key)?;
        self.byte_size = self.byte_size.saturating_sub(key.len() + value.len());
        Some(value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tree.contains_key(key)
    }

    /// Sum of key and value lengths of every live entry (tombstones included).
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.byte_size = 0;
    }

    /// Ordered iterator over `(key, value)`, tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tree.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Takes every entry out in ascending key order, leaving the memtable
    /// empty. Used once per generation, when flushing to a segment.
    pub fn drain_sorted(&mut self) -> Vec<KvPair> {
        self.byte_size = 0;
        self.tree
            .drain_sorted()
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect()
    }

    /// The underlying tree, for structural checks.
    pub fn tree(&self) -> &RedBlackTree<String, String> {
        &self.tree
    }
}

#[cfg(test)]
mod tests;
