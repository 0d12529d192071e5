use crate::*;
use anyhow::Result;
use memtable::{KvPair, Memtable};
use std::path::Path;

pub fn opts() -> SegmentOptions {
    SegmentOptions::new(1024, 4)
}

pub fn memtable_of(entries: &[(&str, &str)]) -> Memtable {
    let mut m = Memtable::new();
    for &(k, v) in entries {
        m.insert(KvPair::new(k, v));
    }
    m
}

/// Flushes `entries` into segment `id` at level 0.
pub fn flush(dir: &Path, id: u32, entries: &[(&str, &str)]) -> Result<Segment> {
    let mut m = memtable_of(entries);
    Segment::create_from_memtable(dir, id, opts(), &mut m)
}

pub fn numbered_memtable(n: usize) -> Memtable {
    let mut m = Memtable::new();
    for i in 0..n {
        m.put(format!("key{:05}", i), format!("value{}", i));
    }
    m
}

pub fn all_pairs(segment: &Segment) -> Result<Vec<KvPair>> {
    segment.scan()?.collect()
}
