/// Read path: `get()`.
///
/// Point lookups check the memtable first (freshest data), then every level
/// from shallowest to deepest, newest segment first within a level. The
/// first match wins; tombstones shadow older values.
use anyhow::Result;
use memtable::TOMBSTONE;

use crate::Engine;

fn live(value: String) -> Option<String> {
    if value == TOMBSTONE {
        None
    } else {
        Some(value)
    }
}

impl Engine {
    /// Looks up a key, returning `Some(value)` if found and live.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment read fails, so an unreadable file is
    /// never reported as a missing key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        // 1. Check memtable FIRST (and respect tombstones)
        if let Some(value) = self.mem.get(key) {
            return Ok(live(value.to_string()));
        }

        // 2. Shallow levels hold newer data
        for segments in self.levels.values() {
            for segment in segments.iter().rev() {
                if let Some(value) = segment.search(key)? {
                    return Ok(live(value));
                }
            }
        }

        // 3. Not found anywhere
        Ok(None)
    }
}
