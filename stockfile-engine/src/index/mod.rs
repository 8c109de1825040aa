//! In-memory secondary indexes
//!
//! Indexes are derived state: they are never persisted and are rebuilt from
//! the data file whenever it is opened or restored. Every offset they hold
//! points at a live slot whose decoded content matches the indexed key.

pub mod range;
pub mod text;

use std::collections::HashMap;

use crate::error::StoreResult;
use crate::query::{parse_float, parse_int, Comparison, Field};
use crate::storage::record::fit_text;
use crate::storage::{Record, SlotFile};

pub use range::{PriceKey, RangeIndex};
pub use text::TextIndex;

/// The full set of secondary indexes for one data file
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexSet {
    ids: HashMap<i32, u64>,
    names: TextIndex,
    suppliers: TextIndex,
    quantities: RangeIndex<i32>,
    prices: RangeIndex<PriceKey>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `offset` under every key of `record`
    pub fn index(&mut self, record: &Record, offset: u64) {
        self.ids.insert(record.id, offset);
        self.names.insert(&record.name, offset);
        self.suppliers.insert(&record.supplier, offset);
        self.quantities.insert(record.quantity, offset);
        self.prices.insert(PriceKey(record.price), offset);
    }

    /// Remove `offset` from every key of `record`
    pub fn unindex(&mut self, record: &Record, offset: u64) {
        if self.ids.get(&record.id) == Some(&offset) {
            self.ids.remove(&record.id);
        }
        self.names.remove(&record.name, offset);
        self.suppliers.remove(&record.supplier, offset);
        self.quantities.remove(record.quantity, offset);
        self.prices.remove(PriceKey(record.price), offset);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.names.clear();
        self.suppliers.clear();
        self.quantities.clear();
        self.prices.clear();
    }

    /// Clear and repopulate from a full scan of `file`.
    ///
    /// Returns the number of live records indexed.
    pub fn rebuild(&mut self, file: &mut SlotFile) -> StoreResult<usize> {
        self.clear();
        let mut indexed = 0;
        for (offset, record) in file.scan()? {
            if let Some(existing) = self.ids.get(&record.id) {
                tracing::warn!(
                    "Duplicate live id {} at offset {} (first seen at {}), slot not indexed",
                    record.id,
                    offset,
                    existing
                );
                continue;
            }
            self.index(&record, offset);
            indexed += 1;
        }
        tracing::debug!("Rebuilt indexes for {:?}: {} records", file.path, indexed);
        Ok(indexed)
    }

    /// Offset of the live record with this id
    pub fn offset_of(&self, id: i32) -> Option<u64> {
        self.ids.get(&id).copied()
    }

    pub fn contains_id(&self, id: i32) -> bool {
        self.ids.contains_key(&id)
    }

    /// Drop every entry pointing at `offset`.
    ///
    /// Used when a slot turns out to be tombstoned behind the indexes' back,
    /// so its keys are no longer known. Costs a pass over every index.
    pub fn forget_offset(&mut self, offset: u64) {
        self.ids.retain(|_, &mut o| o != offset);
        self.names.purge(offset);
        self.suppliers.purge(offset);
        self.quantities.purge(offset);
        self.prices.purge(offset);
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids of every live record, in no particular order
    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.ids.keys().copied()
    }

    /// Offsets matching `field = value`.
    ///
    /// Text values are truncated to slot capacity first, the same way stored
    /// text is. Malformed numeric values resolve to no offsets. The result is an owned
    /// copy, safe to iterate while the indexes are mutated.
    pub fn equality(&self, field: Field, value: &str) -> Vec<u64> {
        match field {
            Field::Id => parse_int(value)
                .and_then(|id| self.offset_of(id))
                .into_iter()
                .collect(),
            Field::Name => self.names.get(&fit_text(value)).to_vec(),
            Field::Supplier => self.suppliers.get(&fit_text(value)).to_vec(),
            Field::Quantity => parse_int(value)
                .map(|q| self.quantities.get(q).to_vec())
                .unwrap_or_default(),
            Field::Price => parse_float(value)
                .map(|p| self.prices.get(PriceKey(p)).to_vec())
                .unwrap_or_default(),
        }
    }

    /// Offsets matching `field <op> value`.
    ///
    /// Range operators are only answered by the numeric indexes; on text
    /// fields and id they resolve to no offsets.
    pub fn select(&self, field: Field, op: Comparison, value: &str) -> Vec<u64> {
        if op == Comparison::Equal {
            return self.equality(field, value);
        }
        if !field.is_ranged() {
            return Vec::new();
        }
        match field {
            Field::Quantity => parse_int(value)
                .map(|q| self.quantities.select(op, q))
                .unwrap_or_default(),
            _ => parse_float(value)
                .map(|p| self.prices.select(op, PriceKey(p)))
                .unwrap_or_default(),
        }
    }
}
