use ahash::RandomState;
use common::RecordLoc;
use hashbrown::HashMap;
use types::IndexKey;

/// Hash index on one `(table, column)`: normalized column value → the
/// locators of every record holding it. Duplicate values accumulate; a key
/// is present iff its locator list is non-empty.
///
/// Indexes are not maintained by plain inserts. They are rebuilt by
/// `hash_table` (and kept current for `_id` by `insert_unique_records_by_id`),
/// and all of them die with `clear_table`.
#[derive(Clone, Debug, Default)]
pub struct HashIndex {
    buckets: HashMap<IndexKey, Vec<RecordLoc>, RandomState>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: IndexKey, loc: RecordLoc) {
        self.buckets.entry(key).or_default().push(loc);
    }

    /// Insert unless this exact locator is already listed under the key.
    /// Used when extending an existing index over a rescan.
    pub fn insert_distinct(&mut self, key: IndexKey, loc: RecordLoc) {
        let locs = self.buckets.entry(key).or_default();
        if !locs.contains(&loc) {
            locs.push(loc);
        }
    }

    pub fn get(&self, key: &IndexKey) -> Option<&[RecordLoc]> {
        self.buckets.get(key).map(|locs| locs.as_slice())
    }

    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.buckets.contains_key(key)
    }

    /// Keys in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.buckets.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&IndexKey, &Vec<RecordLoc>)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
