//! Sorted index over numeric fields, supporting range queries
//!
//! Lookups cost `O(log k)` in the number of distinct keys plus linear time in
//! the number of matching offsets.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::query::Comparison;

/// Total-order wrapper so prices can key a `BTreeMap`.
///
/// Uses IEEE 754 `totalOrder`: `-0.0` sorts before `0.0` and the two are
/// distinct keys.
#[derive(Debug, Clone, Copy)]
pub struct PriceKey(pub f64);

impl PartialEq for PriceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Maps a numeric key to the offsets of every slot holding it
#[derive(Debug, Clone, PartialEq)]
pub struct RangeIndex<K: Ord> {
    buckets: BTreeMap<K, Vec<u64>>,
}

impl<K: Ord + Copy> RangeIndex<K> {
    pub fn new() -> Self {
        RangeIndex {
            buckets: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, offset: u64) {
        self.buckets.entry(key).or_default().push(offset);
    }

    pub fn remove(&mut self, key: K, offset: u64) {
        if let Some(offsets) = self.buckets.get_mut(&key) {
            offsets.retain(|&o| o != offset);
            if offsets.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    /// Offsets of slots whose key equals `key`
    pub fn get(&self, key: K) -> &[u64] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Offsets of slots whose key satisfies `key <op> target`.
    ///
    /// Results come in ascending key order, then insertion order within a key.
    pub fn select(&self, op: Comparison, target: K) -> Vec<u64> {
        let bounds = match op {
            Comparison::Equal => (Bound::Included(&target), Bound::Included(&target)),
            Comparison::Less => (Bound::Unbounded, Bound::Excluded(&target)),
            Comparison::LessOrEqual => (Bound::Unbounded, Bound::Included(&target)),
            Comparison::Greater => (Bound::Excluded(&target), Bound::Unbounded),
            Comparison::GreaterOrEqual => (Bound::Included(&target), Bound::Unbounded),
        };

        self.buckets
            .range::<K, _>(bounds)
            .flat_map(|(_, offsets)| offsets.iter().copied())
            .collect()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove `offset` from every bucket, whatever its key
    pub fn purge(&mut self, offset: u64) {
        self.buckets.retain(|_, offsets| {
            offsets.retain(|&o| o != offset);
            !offsets.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl<K: Ord + Copy> Default for RangeIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
