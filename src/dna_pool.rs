//! DNA pool `P` (§4.2): two distinct abstractions sharing one contract, per the
//! "Dual-purpose DNA pool" design note.
//!
//! `DedupSet` is the string-deduplicating shape, used as a per-(feature, cell) UMI
//! pool. `IndexMap` is the integer-keyed shape with an attached payload, used as the
//! feature → {cell entry} map. The original C implementation conflates both into one
//! `PISA_dna_pool` struct keyed by either a string hash or a raw index; we keep them
//! separate since nothing here observes the conflation.

use rustc_hash::{FxHashMap, FxHashSet};

/// A deduplicating multiset of short strings (UMIs). `push` is idempotent; `size`
/// reports the number of distinct strings ever pushed.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: FxHashSet<Box<str>>,
}

impl DedupSet {
    pub fn new() -> Self {
        DedupSet {
            seen: FxHashSet::default(),
        }
    }

    pub fn push(&mut self, s: &str) {
        if !self.seen.contains(s) {
            self.seen.insert(Box::from(s));
        }
    }

    pub fn size(&self) -> usize {
        self.seen.len()
    }
}

/// An integer-keyed map with a payload per entry, preserving first-insertion order of
/// keys (mirrors the teacher's `v->data[j]` flat array walked in insertion order when
/// serializing — see `mex.rs`).
#[derive(Debug)]
pub struct IndexMap<K, V> {
    order: Vec<K>,
    slots: FxHashMap<K, usize>,
    data: Vec<V>,
}

impl<K, V> Default for IndexMap<K, V>
where
    K: std::hash::Hash + Eq + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> IndexMap<K, V>
where
    K: std::hash::Hash + Eq + Copy,
{
    pub fn new() -> Self {
        IndexMap {
            order: Vec::new(),
            slots: FxHashMap::default(),
            data: Vec::new(),
        }
    }

    pub fn query(&self, key: K) -> Option<&V> {
        self.slots.get(&key).map(|&i| &self.data[i])
    }

    pub fn query_mut(&mut self, key: K) -> Option<&mut V> {
        if let Some(&i) = self.slots.get(&key) {
            Some(&mut self.data[i])
        } else {
            None
        }
    }

    /// Insert `key` with `make` if absent, returning a mutable reference to the entry
    /// either way (the fresh-or-existing distinction the counting engine needs to
    /// decide whether to initialize UMI pools).
    pub fn push_or_get(&mut self, key: K, make: impl FnOnce() -> V) -> (&mut V, bool) {
        if let Some(&i) = self.slots.get(&key) {
            return (&mut self.data[i], false);
        }
        let i = self.data.len();
        self.order.push(key);
        self.slots.insert(key, i);
        self.data.push(make());
        (&mut self.data[i], true)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate `(key, value)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.order.iter().map(move |&k| (k, &self.data[self.slots[&k]]))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        let slots = &self.slots;
        self.order
            .iter()
            .zip(self.data.iter_mut())
            .map(move |(&k, v)| {
                debug_assert!(slots.contains_key(&k));
                (k, v)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_set_collapses_repeats() {
        let mut p = DedupSet::new();
        p.push("AAA");
        p.push("AAA");
        p.push("TTT");
        assert_eq!(p.size(), 2);
    }

    #[test]
    fn index_map_tracks_freshness() {
        let mut m: IndexMap<u32, Vec<u32>> = IndexMap::new();
        let (_, fresh1) = m.push_or_get(7, Vec::new);
        assert!(fresh1);
        let (entry, fresh2) = m.push_or_get(7, Vec::new);
        assert!(!fresh2);
        entry.push(1);
        assert_eq!(m.query(7).unwrap(), &vec![1]);
        assert_eq!(m.size(), 1);
    }

    #[test]
    fn index_map_preserves_insertion_order() {
        let mut m: IndexMap<u32, u32> = IndexMap::new();
        m.push_or_get(5, || 50);
        m.push_or_get(3, || 30);
        m.push_or_get(9, || 90);
        let keys: Vec<u32> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![5, 3, 9]);
    }
}
