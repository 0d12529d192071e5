//! # Bloom Filter
//!
//! A fixed-size bit array answering "possibly present" or "definitely absent"
//! for string keys.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives).
//!
//! ## Usage in the engine
//!
//! Every on-disk segment owns one filter, filled while the segment file is
//! written (or rebuilt by a full scan on restart). A lookup consults the
//! filter first; a negative answer skips the segment without touching disk.
//! Filters are never persisted and have no removal operation.
//!
//! ## Hashing
//!
//! The key is reduced to a single 64-bit FNV-1a hash. Three independent
//! integer avalanche mixers are then applied to that hash, each result taken
//! modulo the filter length, giving the three probe positions.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1024);
//! bf.set("hello");
//! assert!(bf.is_set("hello"));
//! ```

/// Number of bit probes per key.
pub const NUM_HASHES: u32 = 3;

/// A bloom filter backed by a packed bit vector with three hash probes.
#[derive(Clone)]
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of addressable bits in the filter.
    num_bits: u64,
}

impl BloomFilter {
    /// Creates an empty filter with `num_bits` addressable bits.
    ///
    /// # Panics
    ///
    /// Panics if `num_bits` is 0.
    pub fn new(num_bits: usize) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        let num_bits = num_bits as u64;
        let byte_len = num_bits.div_ceil(8) as usize;

        Self {
            bits: vec![0u8; byte_len],
            num_bits,
        }
    }

    /// Records `key` as a member of the set.
    pub fn set(&mut self, key: &str) {
        for idx in self.probes(key) {
            self.set_bit(idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.probes(key).iter().all(|&idx| self.get_bit(idx))
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of bits currently set.
    #[must_use]
    pub fn count_ones(&self) -> u64 {
        self.bits.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    // ---- Internal helpers ----

    fn probes(&self, key: &str) -> [u64; 3] {
        let h = fnv1a_64(key.as_bytes());
        [
            mix_1(h) % self.num_bits,
            mix_2(h) % self.num_bits,
            mix_3(h) % self.num_bits,
        ]
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &NUM_HASHES)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// FNV-1a 64-bit hash of the raw key bytes.
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// Integer mixers after Thomas Wang / Bob Jenkins, widened to wrapping u64.

fn mix_1(mut key: u64) -> u64 {
    key = (!key).wrapping_add(key << 15);
    key ^= key >> 12;
    key = key.wrapping_add(key << 2);
    key ^= key >> 4;
    key = key.wrapping_mul(2057);
    key ^ (key >> 16)
}

fn mix_2(mut key: u64) -> u64 {
    key = key.wrapping_add(0x7ed55d16).wrapping_add(key << 12);
    key = (key ^ 0xc761c23c) ^ (key >> 19);
    key = key.wrapping_add(0x165667b1).wrapping_add(key << 5);
    key = key.wrapping_add(0xd3a2646c) ^ (key << 9);
    key = key.wrapping_add(0xfd7046c5).wrapping_add(key << 3);
    (key ^ 0xb55a4f09) ^ (key >> 16)
}

fn mix_3(mut key: u64) -> u64 {
    key = (key ^ 61) ^ (key >> 16);
    key = key.wrapping_add(key << 3);
    key ^= key >> 4;
    key = key.wrapping_mul(0x27d4eb2d);
    key ^ (key >> 15)
}
