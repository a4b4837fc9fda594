//! Bidirectional string interner `D` (§4.1).
//!
//! Ids are dense, stable within a run, and assigned in insertion order. An optional
//! per-id value slot lets callers attach a payload (e.g. the per-feature cell-pool in
//! the counting engine) without a second lookup structure.

use indexmap::IndexSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::CellmtxError;

#[derive(Debug, Default)]
pub struct Interner<V> {
    names: IndexSet<Box<str>>,
    values: Option<Vec<Option<V>>>,
}

impl<V> Interner<V> {
    pub fn new() -> Self {
        Interner {
            names: IndexSet::new(),
            values: None,
        }
    }

    /// Enable the per-id value side table. Must be called before any `assign_value`.
    pub fn set_value_slot(&mut self) {
        if self.values.is_none() {
            self.values = Some(Vec::with_capacity(self.names.len()));
        }
    }

    /// Insert `s` if absent; returns the (possibly pre-existing) id. Idempotent.
    pub fn push(&mut self, s: &str) -> u32 {
        if let Some(id) = self.names.get_index_of(s) {
            return id as u32;
        }
        self.names.insert(Box::from(s));
        let id = self.names.len() as u32 - 1;
        if let Some(values) = &mut self.values {
            values.push(None);
        }
        id
    }

    /// Look up `s` without inserting. Returns `-1` (as `None` here) if absent.
    pub fn query(&self, s: &str) -> Option<u32> {
        self.names.get_index_of(s).map(|i| i as u32)
    }

    pub fn name(&self, id: u32) -> &str {
        self.names
            .get_index(id as usize)
            .expect("interner id out of range")
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn assign_value(&mut self, id: u32, v: V) {
        let values = self.values.as_mut().expect("value slot not enabled");
        values[id as usize] = Some(v);
    }

    pub fn query_value(&self, id: u32) -> Option<&V> {
        self.values.as_ref()?[id as usize].as_ref()
    }

    pub fn query_value_mut(&mut self, id: u32) -> Option<&mut V> {
        self.values.as_mut()?[id as usize].as_mut()
    }

    /// Iterate ids in insertion order, i.e. the order that will be emitted as matrix
    /// row/column labels.
    pub fn iter_ids(&self) -> impl Iterator<Item = u32> {
        0..self.names.len() as u32
    }
}

impl Interner<()> {
    /// Bulk-load a newline-delimited file of names, e.g. a barcode whitelist. Used
    /// with whitelist mode in the counting engine, where the loaded table is frozen
    /// (unknown barcodes are then skipped rather than learned).
    pub fn read(path: &Path) -> Result<Self, CellmtxError> {
        let file =
            File::open(path).map_err(|e| CellmtxError::io(path, e))?;
        let reader = BufReader::new(file);
        let mut interner = Interner::new();
        for line in reader.lines() {
            let line = line.map_err(|e| CellmtxError::io(path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            interner.push(trimmed);
        }
        Ok(interner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_is_idempotent() {
        let mut d: Interner<()> = Interner::new();
        let a = d.push("G1");
        let b = d.push("G2");
        let a2 = d.push("G1");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(d.name(a), "G1");
        assert_eq!(d.size(), 2);
    }

    #[test]
    fn ids_are_dense_and_ordered() {
        let mut d: Interner<()> = Interner::new();
        for s in ["a", "b", "c"] {
            d.push(s);
        }
        assert_eq!(d.iter_ids().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(d.name(0), "a");
        assert_eq!(d.name(2), "c");
    }

    #[test]
    fn query_missing_returns_none() {
        let d: Interner<()> = Interner::new();
        assert_eq!(d.query("nope"), None);
    }

    #[test]
    fn value_slot_roundtrip() {
        let mut d: Interner<u32> = Interner::new();
        d.set_value_slot();
        let id = d.push("feat");
        assert_eq!(d.query_value(id), None);
        d.assign_value(id, 42);
        assert_eq!(d.query_value(id), Some(&42));
    }
}
