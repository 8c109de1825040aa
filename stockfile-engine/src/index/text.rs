//! Equality-only index over text fields

use std::collections::HashMap;

/// Maps a text value to the offsets of every slot holding it.
///
/// Offsets within a bucket keep insertion order. Empty buckets are removed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TextIndex {
    buckets: HashMap<String, Vec<u64>>,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, offset: u64) {
        self.buckets.entry(key.to_string()).or_default().push(offset);
    }

    pub fn remove(&mut self, key: &str, offset: u64) {
        if let Some(offsets) = self.buckets.get_mut(key) {
            offsets.retain(|&o| o != offset);
            if offsets.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    /// Offsets of slots whose field equals `key`
    pub fn get(&self, key: &str) -> &[u64] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_keep_insertion_order() {
        let mut index = TextIndex::new();
        index.insert("TV", 434);
        index.insert("TV", 0);
        index.insert("Radio", 217);
        assert_eq!(index.get("TV"), &[434, 0]);
        assert_eq!(index.get("Phone"), &[] as &[u64]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_bucket_removed() {
        let mut index = TextIndex::new();
        index.insert("TV", 0);
        index.remove("TV", 217);
        assert_eq!(index.len(), 1);
        index.remove("TV", 0);
        assert!(index.is_empty());
    }
}
