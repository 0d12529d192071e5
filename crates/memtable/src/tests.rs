use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

fn s(v: &str) -> String {
    v.to_string()
}

fn assert_valid<K: Ord, V>(tree: &RedBlackTree<K, V>) {
    if let Err(e) = tree.validate() {
        panic!("red-black invariant broken: {}", e);
    }
}

// -------------------- Tree: insert --------------------

#[test]
fn empty_tree_is_valid() {
    let tree: RedBlackTree<String, String> = RedBlackTree::new();
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), 0);
    assert_valid(&tree);
}

#[test]
fn insert_and_get() {
    let mut tree = RedBlackTree::new();
    assert!(tree.insert(s("b"), 2).is_none());
    assert!(tree.insert(s("a"), 1).is_none());
    assert!(tree.insert(s("c"), 3).is_none());

    assert_eq!(tree.get("a"), Some(&1));
    assert_eq!(tree.get("b"), Some(&2));
    assert_eq!(tree.get("c"), Some(&3));
    assert_eq!(tree.get("d"), None);
    assert_valid(&tree);
}

#[test]
fn insert_existing_key_overwrites_in_place() {
    let mut tree = RedBlackTree::new();
    tree.insert(s("k"), s("v1"));
    assert_eq!(tree.insert(s("k"), s("v2")), Some(s("v1")));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.get("k"), Some(&s("v2")));
}

#[test]
fn ascending_inserts_stay_balanced() {
    let mut tree = RedBlackTree::new();
    for i in 0..1_024u32 {
        tree.insert(i, ());
        assert_valid(&tree);
    }
    // A red-black tree never exceeds 2 * log2(n + 1).
    assert!(tree.height() <= 20, "height {} too large", tree.height());
}

#[test]
fn descending_inserts_stay_balanced() {
    let mut tree = RedBlackTree::new();
    for i in (0..1_024u32).rev() {
        tree.insert(i, ());
    }
    assert_valid(&tree);
    assert!(tree.height() <= 20);
}

#[test]
fn reference_insert_sequence() {
    let mut tree = RedBlackTree::new();
    for k in ["8", "18", "5", "15", "17", "25", "40", "80", "19"] {
        tree.insert(s(k), s(""));
        assert_valid(&tree);
    }
    let keys: Vec<&String> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["15", "17", "18", "19", "25", "40", "5", "8", "80"]);
}

// -------------------- Tree: remove --------------------

#[test]
fn remove_missing_key_is_none() {
    let mut tree: RedBlackTree<String, u64> = RedBlackTree::new();
    assert!(tree.remove("nope").is_none());
    tree.insert(s("a"), 1);
    assert!(tree.remove("b").is_none());
    assert_eq!(tree.len(), 1);
}

#[test]
fn remove_only_node_empties_tree() {
    let mut tree = RedBlackTree::new();
    tree.insert(s("root"), 1u64);
    assert_eq!(tree.remove("root"), Some(1));
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_valid(&tree);

    // Tree is reusable afterwards.
    tree.insert(s("again"), 2);
    assert_eq!(tree.get("again"), Some(&2));
    assert_valid(&tree);
}

#[test]
fn reference_remove_sequence() {
    let mut tree = RedBlackTree::new();
    for k in ["8", "18", "5", "15", "17", "25", "40", "80", "19"] {
        tree.insert(s(k), s(""));
    }
    for k in ["25", "8", "17"] {
        assert!(tree.remove(k).is_some());
        assert_valid(&tree);
    }
    let keys: Vec<&String> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["15", "18", "19", "40", "5", "80"]);
}

#[test]
fn remove_node_with_two_children_keeps_successor_value() {
    let mut tree = RedBlackTree::new();
    for (k, v) in [(4, "four"), (2, "two"), (6, "six"), (1, "one"), (3, "three"), (5, "five"), (7, "seven")] {
        tree.insert(k, v);
    }
    assert_eq!(tree.remove(&4), Some("four"));
    assert_eq!(tree.get(&5), Some(&"five"));
    assert_eq!(tree.get(&4), None);
    assert_valid(&tree);
}

#[test]
fn remove_everything_in_insert_order() {
    let mut tree = RedBlackTree::new();
    for i in 0..500u32 {
        tree.insert(i, i * 10);
    }
    for i in 0..500u32 {
        assert_eq!(tree.remove(&i), Some(i * 10));
        assert_valid(&tree);
    }
    assert!(tree.is_empty());
}

#[test]
fn remove_everything_in_reverse_order() {
    let mut tree = RedBlackTree::new();
    for i in 0..500u32 {
        tree.insert(i, ());
    }
    for i in (0..500u32).rev() {
        assert!(tree.remove(&i).is_some());
        assert_valid(&tree);
    }
    assert!(tree.is_empty());
}

#[test]
fn random_operations_preserve_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut tree = RedBlackTree::new();
    let mut model = BTreeMap::new();

    for _ in 0..5_000 {
        let key: u16 = rng.gen_range(0..400);
        if rng.gen_bool(0.6) {
            let value: u32 = rng.gen();
            assert_eq!(tree.insert(key, value), model.insert(key, value));
        } else {
            assert_eq!(tree.remove(&key), model.remove(&key));
        }
        assert_valid(&tree);
        assert_eq!(tree.len(), model.len());
    }

    let ours: Vec<(u16, u32)> = tree.iter().map(|(k, v)| (*k, *v)).collect();
    let expected: Vec<(u16, u32)> = model.into_iter().collect();
    assert_eq!(ours, expected);
}

// -------------------- Tree: floor --------------------

#[test]
fn floor_finds_largest_key_not_above_target() {
    let mut tree = RedBlackTree::new();
    for (k, off) in [("b", 0u64), ("f", 100), ("m", 200), ("t", 300)] {
        tree.insert(s(k), off);
    }

    assert_eq!(tree.floor("a"), None);
    assert_eq!(tree.floor("b"), Some((&s("b"), &0)));
    assert_eq!(tree.floor("c"), Some((&s("b"), &0)));
    assert_eq!(tree.floor("m"), Some((&s("m"), &200)));
    assert_eq!(tree.floor("s"), Some((&s("m"), &200)));
    assert_eq!(tree.floor("zzz"), Some((&s("t"), &300)));
}

#[test]
fn floor_on_empty_tree() {
    let tree: RedBlackTree<String, u64> = RedBlackTree::new();
    assert!(tree.floor("x").is_none());
}

#[test]
fn floor_matches_btreemap_range() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut tree = RedBlackTree::new();
    let mut model = BTreeMap::new();
    for _ in 0..300 {
        let k: u32 = rng.gen_range(0..10_000);
        tree.insert(k, ());
        model.insert(k, ());
    }
    for probe in (0..10_000u32).step_by(37) {
        let expected = model.range(..=probe).next_back().map(|(k, _)| *k);
        assert_eq!(tree.floor(&probe).map(|(k, _)| *k), expected);
    }
}

// -------------------- Tree: traversal --------------------

#[test]
fn iter_yields_sorted_keys() {
    let mut tree = RedBlackTree::new();
    for k in ["c", "a", "b", "e", "d"] {
        tree.insert(s(k), ());
    }
    let keys: Vec<&str> = tree.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["a", "b", "c", "d", "e"]);
}

#[test]
fn drain_sorted_empties_tree() {
    let mut tree = RedBlackTree::new();
    for i in [5u8, 3, 9, 1, 7] {
        tree.insert(i, i as u32 * 2);
    }
    let drained = tree.drain_sorted();
    assert_eq!(drained, vec![(1, 2), (3, 6), (5, 10), (7, 14), (9, 18)]);
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_valid(&tree);
}

#[test]
fn drain_sorted_after_removals() {
    let mut tree = RedBlackTree::new();
    for i in 0..100u32 {
        tree.insert(i, ());
    }
    for i in (0..100u32).filter(|i| i % 3 == 0) {
        tree.remove(&i);
    }
    let keys: Vec<u32> = tree.drain_sorted().into_iter().map(|(k, _)| k).collect();
    let expected: Vec<u32> = (0..100).filter(|i| i % 3 != 0).collect();
    assert_eq!(keys, expected);
}

#[test]
fn debug_lists_entries_in_order() {
    let mut tree = RedBlackTree::new();
    tree.insert(2, "b");
    tree.insert(1, "a");
    assert_eq!(format!("{:?}", tree), r#"{1: "a", 2: "b"}"#);
}

// -------------------- Memtable: CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let mut m = Memtable::new();
    m.put(s("k1"), s("v1"));
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("k1"), Some("v1"));
}

#[test]
fn put_overwrites() {
    let mut m = Memtable::new();
    m.put(s("k1"), s("v1"));
    m.put(s("k1"), s("v2"));
    assert_eq!(m.get("k1"), Some("v2"));
    assert_eq!(m.len(), 1);
}

#[test]
fn get_missing_key_returns_none() {
    let m = Memtable::new();
    assert!(m.get("nonexistent").is_none());
}

#[test]
fn tombstone_is_stored_verbatim() {
    let mut m = Memtable::new();
    m.put(s("k"), s("v"));
    m.insert(KvPair::tombstone("k"));
    assert_eq!(m.get("k"), Some(TOMBSTONE));
    assert_eq!(m.len(), 1);
}

#[test]
fn remove_drops_entry() {
    let mut m = Memtable::new();
    m.put(s("a"), s("1"));
    m.put(s("b"), s("2"));
    assert_eq!(m.remove("a"), Some(s("1")));
    assert!(!m.contains_key("a"));
    assert!(m.contains_key("b"));
    assert!(m.remove("a").is_none());
}

// -------------------- Memtable: byte_size tracking --------------------

#[test]
fn byte_size_includes_key_and_value() {
    let mut m = Memtable::new();
    assert_eq!(m.byte_size(), 0);
    // key="ab" (2) + value="ccc" (3) = 5
    assert_eq!(m.put(s("ab"), s("ccc")), 5);
    assert_eq!(m.byte_size(), 5);
}

#[test]
fn byte_size_adjusts_on_overwrite() {
    let mut m = Memtable::new();
    m.put(s("a"), s("aaa")); // 1 + 3
    assert_eq!(m.put(s("a"), s("bb")), -1);
    assert_eq!(m.byte_size(), 3);
    assert_eq!(m.put(s("a"), s("bbbbb")), 3);
    assert_eq!(m.byte_size(), 6);
}

#[test]
fn byte_size_adjusts_on_remove() {
    let mut m = Memtable::new();
    m.put(s("a"), s("aaa"));
    m.put(s("bb"), s("c"));
    m.remove("a");
    assert_eq!(m.byte_size(), 3);
}

#[test]
fn byte_size_counts_tombstones() {
    let mut m = Memtable::new();
    m.insert(KvPair::tombstone("k"));
    assert_eq!(m.byte_size(), 1 + TOMBSTONE.len());
}

// -------------------- Memtable: clear / drain --------------------

#[test]
fn clear_resets_everything() {
    let mut m = Memtable::new();
    m.put(s("a"), s("1"));
    m.put(s("b"), s("2"));
    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.byte_size(), 0);
    assert!(m.get("a").is_none());
}

#[test]
fn drain_sorted_returns_pairs_in_key_order() {
    let mut m = Memtable::new();
    m.put(s("c"), s("3"));
    m.put(s("a"), s("1"));
    m.insert(KvPair::tombstone("b"));

    let pairs = m.drain_sorted();
    assert_eq!(
        pairs,
        vec![KvPair::new("a", "1"), KvPair::tombstone("b"), KvPair::new("c", "3")]
    );
    assert!(m.is_empty());
    assert_eq!(m.byte_size(), 0);
}

#[test]
fn iter_is_lexicographic_not_numeric() {
    let mut m = Memtable::new();
    for i in 1..=12 {
        m.put(i.to_string(), i.to_string());
    }
    let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
    assert_eq!(keys[..4], ["1", "10", "11", "12"]);
}

// -------------------- Memtable: load --------------------

#[test]
fn write_load_with_key_reuse() {
    let mut m = Memtable::new();
    for i in 0..50_000u64 {
        m.put(format!("key{}", i % 1_000), "x".repeat(10));
    }
    assert_eq!(m.len(), 1_000);
    assert_valid(m.tree());
}

#[test]
fn delete_heavy_workload() {
    let mut m = Memtable::new();
    for i in 0..10_000u64 {
        let key = format!("k{}", i % 50);
        if i % 2 == 0 {
            m.put(key, s("v"));
        } else {
            m.remove(&key);
        }
    }
    assert_valid(m.tree());
    let expected: usize = m.iter().map(|(k, v)| k.len() + v.len()).sum();
    assert_eq!(m.byte_size(), expected);
}
