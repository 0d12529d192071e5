use crate::Engine;
use anyhow::Result;
use config::EngineConfig;
use std::fs;
use std::path::Path;

pub fn config(dir: &Path, threshold: usize) -> EngineConfig {
    EngineConfig::new(dir)
        .with_memtable_threshold(threshold)
        .with_sparsity_factor(16)
}

pub fn open(dir: &Path, threshold: usize) -> Result<Engine> {
    Engine::open(config(dir, threshold))
}

/// Counts finished segment files (no `.tmp`) in the engine's segment dir.
pub fn count_segment_files(data_dir: &Path) -> usize {
    fs::read_dir(data_dir.join("segments"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|s| s.to_str())
                .map(|name| sstable::parse_segment_file_name(name).is_some())
                .unwrap_or(false)
        })
        .count()
}

/// Puts `"1"..="n"` with value equal to the key.
pub fn put_numbered(engine: &mut Engine, n: usize) -> Result<()> {
    for i in 1..=n {
        let k = i.to_string();
        engine.put(&k, &k)?;
    }
    Ok(())
}

/// Swaps a segment file for an empty directory of the same name. The
/// segment's open handle still reads the old data, but opening the path for
/// a scan fails on read and removing it as a file fails.
pub fn replace_with_dir(path: &Path) {
    fs::remove_file(path).unwrap();
    fs::create_dir(path).unwrap();
}

/// Counts leftover `.tmp` files in the engine's segment dir.
pub fn count_tmp_files(data_dir: &Path) -> usize {
    fs::read_dir(data_dir.join("segments"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
        .count()
}
