use super::helpers::*;
use crate::*;
use anyhow::Result;
use memtable::TOMBSTONE;
use std::fs;
use tempfile::tempdir;

// --------------------- Basic put / get / remove ---------------------

#[test]
fn put_and_get() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("name", "alice")?;
    assert_eq!(engine.get("name")?.as_deref(), Some("alice"));
    Ok(())
}

#[test]
fn remove_hides_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("k", "v")?;
    engine.remove("k")?;
    assert_eq!(engine.get("k")?, None);
    // The tombstone stays in the memtable.
    assert_eq!(engine.memtable_len(), 1);
    Ok(())
}

#[test]
fn put_remove_put() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("a", "x")?;
    engine.remove("a")?;
    engine.put("a", "y")?;
    assert_eq!(engine.get("a")?.as_deref(), Some("y"));
    Ok(())
}

#[test]
fn overwrite_key() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("k", "v1")?;
    engine.put("k", "v2")?;
    assert_eq!(engine.get("k")?.as_deref(), Some("v2"));
    assert_eq!(engine.memtable_size(), 3);
    Ok(())
}

#[test]
fn remove_missing_key_is_fine() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;
    engine.remove("ghost")?;
    assert_eq!(engine.get("ghost")?, None);
    Ok(())
}

// --------------------- Validation ---------------------

#[test]
fn invalid_keys_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    for key in ["", "a,b", "line\nbreak", "cr\r"] {
        assert!(engine.put(key, "v").is_err(), "{:?}", key);
        assert!(engine.remove(key).is_err(), "{:?}", key);
    }
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);
    Ok(())
}

#[test]
fn invalid_values_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    assert!(engine.put("k", "").is_err());
    assert!(engine.put("k", "two\nlines").is_err());
    assert!(engine.put("k", TOMBSTONE).is_err());
    assert_eq!(engine.get("k")?, None);
    Ok(())
}

#[test]
fn values_may_contain_separator() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 8)?;

    engine.put("csv", "a,b,c")?;
    engine.force_flush()?;
    assert_eq!(engine.get("csv")?.as_deref(), Some("a,b,c"));
    Ok(())
}

// --------------------- WAL ---------------------

#[test]
fn put_appends_to_wal_before_memtable() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("a", "1")?;
    engine.remove("b")?;
    let wal = fs::read_to_string(dir.path().join("wal.log"))?;
    assert_eq!(wal, format!("a,1\nb,{}\n", TOMBSTONE));
    Ok(())
}

// --------------------- Flush ---------------------

#[test]
fn flush_happens_before_the_triggering_put() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 4)?;

    engine.put("ab", "cd")?; // 4 bytes: at budget, nothing flushed yet
    assert_eq!(engine.segment_count(), 0);
    assert!(engine.needs_flush());

    engine.put("e", "f")?; // flushes {ab}, then starts a new generation
    assert_eq!(engine.level_count(0), 1);
    assert_eq!(engine.memtable_len(), 1);
    assert_eq!(engine.memtable_size(), 2);
    assert_eq!(engine.get("ab")?.as_deref(), Some("cd"));
    assert_eq!(engine.get("e")?.as_deref(), Some("f"));

    // WAL only holds the new generation.
    let wal = fs::read_to_string(dir.path().join("wal.log"))?;
    assert_eq!(wal, "e,f\n");
    Ok(())
}

#[test]
fn needs_flush_tracks_budget() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 10)?;
    assert!(!engine.needs_flush());
    engine.put("key", "val")?;
    assert!(!engine.needs_flush());
    engine.put("key2", "val")?;
    assert!(engine.needs_flush());
    Ok(())
}

#[test]
fn force_flush_writes_level_zero_segment() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("a", "1")?;
    engine.put("b", "2")?;
    engine.force_flush()?;

    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.level_count(0), 1);
    assert_eq!(count_segment_files(dir.path()), 1);
    assert!(dir.path().join("segments").join("00000_00000").exists());
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);
    assert_eq!(engine.get("b")?.as_deref(), Some("2"));
    Ok(())
}

#[test]
fn force_flush_empty_memtable_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;
    engine.force_flush()?;
    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.next_segment_id(), 0);
    Ok(())
}

#[test]
fn segment_ids_increase() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;
    for round in 0..3 {
        engine.put(&format!("k{}", round), "v")?;
        engine.force_flush()?;
    }
    assert_eq!(engine.next_segment_id(), 3);
    let ids: Vec<u32> = engine.levels[&0].iter().map(|s| s.id()).collect();
    assert_eq!(ids, [0, 1, 2]);
    Ok(())
}

// --------------------- drop_table ---------------------

#[test]
fn drop_table_resets_everything() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 64)?;
    put_numbered(&mut engine, 200)?;
    assert!(engine.segment_count() > 0);

    engine.drop_table()?;

    for i in 1..=200 {
        assert_eq!(engine.get(&i.to_string())?, None);
    }
    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(fs::read_dir(dir.path().join("segments"))?.count(), 0);
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);
    Ok(())
}

#[test]
fn engine_usable_after_drop_table() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 16)?;
    put_numbered(&mut engine, 50)?;
    engine.drop_table()?;

    put_numbered(&mut engine, 20)?;
    assert_eq!(engine.get("7")?.as_deref(), Some("7"));
    assert_eq!(engine.get("42")?, None);
    Ok(())
}

#[test]
fn drop_table_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open(dir.path(), 32)?;
        put_numbered(&mut engine, 100)?;
        engine.drop_table()?;
    }
    let engine = open(dir.path(), 32)?;
    assert_eq!(engine.get("1")?, None);
    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.memtable_len(), 0);
    Ok(())
}

// --------------------- Introspection ---------------------

#[test]
fn debug_impl_summarises_state() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024)?;
    engine.put("a", "1")?;
    let debug = format!("{:?}", engine);
    assert!(debug.contains("Engine"));
    assert!(debug.contains("memtable_size"));
    assert!(debug.contains("levels"));
    Ok(())
}

#[test]
fn failed_drop_table_keeps_undeleted_segments_readable() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open(dir.path(), 1024 * 1024)?;

    engine.put("a", "1")?;
    engine.force_flush()?;
    engine.put("b", "2")?;
    engine.force_flush()?;
    engine.put("c", "3")?;
    let stuck = engine.levels[&0][0].path().to_path_buf();
    replace_with_dir(&stuck);

    assert!(engine.drop_table().is_err());

    // WAL and memtable were cleared first; the newer segment is gone.
    assert_eq!(fs::metadata(dir.path().join("wal.log"))?.len(), 0);
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.get("c")?, None);
    assert_eq!(engine.get("b")?, None);
    // The segment whose file could not be removed is still listed and served.
    assert_eq!(engine.levels(), std::collections::BTreeMap::from([(0, 1)]));
    assert_eq!(engine.get("a")?.as_deref(), Some("1"));

    fs::remove_dir(&stuck)?;
    engine.drop_table()?;
    assert_eq!(engine.segment_count(), 0);
    assert_eq!(engine.get("a")?, None);
    assert_eq!(engine.next_segment_id(), 0);
    Ok(())
}
