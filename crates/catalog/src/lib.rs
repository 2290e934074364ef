//! Table catalog: the explicit engine value everything else threads through.
//!
//! A [`Catalog`] owns the page store, the page buffer, and every table. A
//! table is a column list, an insertion-ordered list of pages, a max-heap of
//! per-page free space, and a map of per-column hash indexes addressing
//! records by `(page, slot)`.
//!
//! Reads that materialize records go through the buffer and pay the
//! simulated fetch latency on a miss; metadata operations (entry counts,
//! column lists, index probes) do not touch pages. Scans are lazy
//! [`RecordStream`]s in the Volcano style: each `next` call takes the
//! catalog by `&mut` so consumers can interleave pulls with inserts into
//! other tables.

mod index;
mod streams;
#[cfg(test)]
mod tests;

pub use index::HashIndex;
pub use streams::{FilterScan, IndexScan, RecordStream, TableScan, drain};

use ahash::RandomState;
use buffer::PageBuffer;
use common::{CompareOp, Config, DbError, DbResult, ID_COL, PageId, Record, RecordLoc};
use hashbrown::HashMap;
use std::collections::BinaryHeap;
use storage::PageStore;
use tracing::debug;
use types::{IndexKey, Value};
use uuid::Uuid;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Free-space heap entry. Derived `Ord` compares `spaces_left` first, so the
/// `BinaryHeap` is a max-heap on free space. Entries go stale when their page
/// is written again; the insert path discards stale entries lazily when it
/// reads the top.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FreeSpace {
    spaces_left: usize,
    page: PageId,
}

#[derive(Debug)]
struct Table {
    columns: Vec<String>,
    page_ids: Vec<PageId>,
    free_space: BinaryHeap<FreeSpace>,
    indexes: Map<String, HashIndex>,
}

/// The engine: tables, page store, and buffer, threaded `&mut` through the
/// evaluators. Dropping every table is engine teardown.
#[derive(Debug)]
pub struct Catalog {
    config: Config,
    tables: Map<String, Table>,
    store: PageStore,
    buffer: PageBuffer,
}

impl Catalog {
    pub fn new(config: Config) -> Self {
        let buffer = PageBuffer::new(config.buffer_capacity, config.page_fetch);
        Self {
            config,
            tables: Map::default(),
            store: PageStore::new(),
            buffer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Defensive copy of a table's declared column list.
    pub fn table_columns(&self, name: &str) -> DbResult<Vec<String>> {
        Ok(self.table(name)?.columns.clone())
    }

    /// Create a table with one empty page.
    pub fn add_table(&mut self, name: &str, columns: Vec<String>) -> DbResult<()> {
        if self.tables.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        let page = self.store.allocate(self.config.page_capacity);
        let mut free_space = BinaryHeap::new();
        free_space.push(FreeSpace {
            spaces_left: self.config.page_capacity,
            page,
        });
        self.tables.insert(
            name.to_string(),
            Table {
                columns,
                page_ids: vec![page],
                free_space,
                indexes: Map::default(),
            },
        );
        Ok(())
    }

    /// Insert a batch. Records without an `_id` get a generated
    /// `"{table}:{uuid}"` identity. No uniqueness is enforced and no index
    /// is maintained — readers rehash before the next index read.
    pub fn insert_records(&mut self, name: &str, records: Vec<Record>) -> DbResult<()> {
        self.place_records(name, records, false)?;
        Ok(())
    }

    /// Insert a batch, skipping records whose `_id` is already present, and
    /// keep the `_id` hash index current incrementally. Returns how many
    /// records were accepted.
    pub fn insert_unique_records_by_id(
        &mut self,
        name: &str,
        records: Vec<Record>,
    ) -> DbResult<usize> {
        if !self.is_table_hashed(name, ID_COL) {
            self.hash_table(name, ID_COL, true)?;
        }
        self.place_records(name, records, true)
    }

    /// Clear every page in place, rebuild the free-space heap, and discard
    /// all hash indexes on the table.
    pub fn clear_table(&mut self, name: &str) -> DbResult<()> {
        let page_ids = self.table(name)?.page_ids.clone();
        for page in &page_ids {
            self.store.page_mut(*page)?.clear();
        }
        let capacity = self.config.page_capacity;
        let table = self.table_mut(name)?;
        table.free_space = page_ids
            .iter()
            .map(|page| FreeSpace {
                spaces_left: capacity,
                page: *page,
            })
            .collect();
        table.indexes.clear();
        Ok(())
    }

    /// Clear then remove all table state, releasing its pages.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        self.clear_table(name)?;
        let table = self
            .tables
            .remove(name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        for page in table.page_ids {
            self.buffer.evict(page);
            self.store.release(page);
        }
        Ok(())
    }

    /// Engine teardown.
    pub fn drop_all_tables(&mut self) -> DbResult<()> {
        for name in self.table_names() {
            self.drop_table(&name)?;
        }
        Ok(())
    }

    /// Build (or rebuild) the hash index on `(name, col)` by scanning every
    /// page through the buffer. With `fresh` the index starts empty;
    /// otherwise existing locator lists are extended, skipping locators
    /// already present.
    pub fn hash_table(&mut self, name: &str, col: &str, fresh: bool) -> DbResult<()> {
        let page_ids = self.table(name)?.page_ids.clone();
        let mut index = if fresh {
            HashIndex::new()
        } else {
            self.table_mut(name)?.indexes.remove(col).unwrap_or_default()
        };
        debug!(table = name, col, fresh, "hashing table");
        for page in page_ids {
            self.buffer.ensure(page);
            let snapshot = self.store.page(page)?.snapshot();
            for (slot, record) in snapshot.iter().enumerate() {
                if let Some(value) = record.get(col) {
                    let loc = RecordLoc {
                        page,
                        slot: slot as u16,
                    };
                    if fresh {
                        index.insert(value.key(), loc);
                    } else {
                        index.insert_distinct(value.key(), loc);
                    }
                }
            }
        }
        self.table_mut(name)?.indexes.insert(col.to_string(), index);
        Ok(())
    }

    pub fn is_table_hashed(&self, name: &str, col: &str) -> bool {
        self.tables
            .get(name)
            .is_some_and(|table| table.indexes.contains_key(col))
    }

    /// O(1) membership probe. Requires an existing index on `(name, col)`.
    pub fn has_value(&self, name: &str, col: &str, value: &Value) -> DbResult<bool> {
        Ok(self.table_index(name, col)?.contains_key(&value.key()))
    }

    /// Key-form variant of [`Catalog::has_value`].
    pub fn index_has_key(&self, name: &str, col: &str, key: &IndexKey) -> DbResult<bool> {
        Ok(self.table_index(name, col)?.contains_key(key))
    }

    /// Defensive copy of an index's keys, in unspecified order.
    pub fn index_keys(&self, name: &str, col: &str) -> DbResult<Vec<IndexKey>> {
        Ok(self.table_index(name, col)?.keys().cloned().collect())
    }

    /// Materialize the records stored under one index key, through the
    /// buffer. Missing keys yield an empty list, never an error.
    pub fn records_for_key(
        &mut self,
        name: &str,
        col: &str,
        key: &IndexKey,
    ) -> DbResult<Vec<Record>> {
        let locs: Vec<RecordLoc> = self
            .table_index(name, col)?
            .get(key)
            .map(|locs| locs.to_vec())
            .unwrap_or_default();
        locs.into_iter().map(|loc| self.record_at(loc)).collect()
    }

    /// Lazy full scan in page-insertion order.
    pub fn scan(&self, name: &str) -> DbResult<TableScan> {
        Ok(TableScan::new(self.table(name)?.page_ids.clone()))
    }

    /// Lazy full scan filtered by a host-supplied predicate.
    pub fn filter_scan(
        &self,
        name: &str,
        predicate: Box<dyn Fn(&Record) -> bool>,
    ) -> DbResult<FilterScan> {
        Ok(FilterScan::new(self.scan(name)?, predicate))
    }

    /// Lazy stream of the records satisfying `col op rhs`, resolved through
    /// the hash index on `(name, col)`. For `=` this is a single-key lookup;
    /// for `>` it concatenates the locator lists of every key above `rhs`.
    /// Requires the index to exist; a lookup miss just yields an empty
    /// stream.
    pub fn index_scan(
        &self,
        name: &str,
        col: &str,
        op: CompareOp,
        rhs: &Value,
    ) -> DbResult<IndexScan> {
        let index = self.table_index(name, col)?;
        let rhs_key = rhs.key();
        let locs: Vec<RecordLoc> = match op {
            CompareOp::Eq => index
                .get(&rhs_key)
                .map(|locs| locs.to_vec())
                .unwrap_or_default(),
            CompareOp::Gt => index
                .entries()
                .filter(|(key, _)| **key > rhs_key)
                .flat_map(|(_, locs)| locs.iter().copied())
                .collect(),
        };
        Ok(IndexScan::new(locs))
    }

    /// Number of records currently in the table. Metadata only — no pages
    /// are fetched.
    pub fn entry_count(&self, name: &str) -> DbResult<usize> {
        let mut count = 0;
        for page in &self.table(name)?.page_ids {
            count += self.store.page(*page)?.len();
        }
        Ok(count)
    }

    /// Create `dst` with `src`'s columns and fill it in ascending key order
    /// of `src`'s (re)built hash index on `col`. Order within one key is not
    /// specified.
    pub fn copy_into_sorted_table(&mut self, src: &str, col: &str, dst: &str) -> DbResult<()> {
        let columns = self.table_columns(src)?;
        self.add_table(dst, columns)?;
        self.hash_table(src, col, true)?;
        let mut keys = self.index_keys(src, col)?;
        keys.sort();
        for key in keys {
            let records = self.records_for_key(src, col, &key)?;
            self.insert_records(dst, records)?;
        }
        Ok(())
    }

    fn table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    fn table_index(&self, name: &str, col: &str) -> DbResult<&HashIndex> {
        self.table(name)?.indexes.get(col).ok_or_else(|| {
            DbError::Catalog(format!("table '{name}' has no hash index on '{col}'"))
        })
    }

    /// Make a page buffer-resident and snapshot its records.
    pub(crate) fn page_snapshot(&mut self, page: PageId) -> DbResult<Vec<Record>> {
        self.buffer.ensure(page);
        Ok(self.store.page(page)?.snapshot())
    }

    /// Materialize one record through the buffer.
    pub(crate) fn record_at(&mut self, loc: RecordLoc) -> DbResult<Record> {
        self.buffer.ensure(loc.page);
        Ok(self.store.page(loc.page)?.record(loc.slot)?.clone())
    }

    /// Pop free-space entries until the top agrees with its page's actual
    /// free space, discarding stale ones. The returned entry is removed from
    /// the heap; callers re-push after writing.
    fn take_most_free(&mut self, name: &str) -> DbResult<Option<(PageId, usize)>> {
        loop {
            let entry = match self.table_mut(name)?.free_space.pop() {
                Some(entry) => entry,
                None => return Ok(None),
            };
            let actual = self.store.page(entry.page)?.spaces_left();
            if actual == entry.spaces_left {
                return Ok(Some((entry.page, actual)));
            }
        }
    }

    fn allocate_page(&mut self, name: &str) -> DbResult<PageId> {
        let page = self.store.allocate(self.config.page_capacity);
        self.table_mut(name)?.page_ids.push(page);
        Ok(page)
    }

    fn push_free_entry(&mut self, name: &str, page: PageId, spaces_left: usize) -> DbResult<()> {
        self.table_mut(name)?
            .free_space
            .push(FreeSpace { spaces_left, page });
        Ok(())
    }

    /// Shared insert path. Records land in the currently most-free page;
    /// when it fills a fresh page is allocated. The free-space queue is
    /// repaired by re-pushing the written page after the batch.
    fn place_records(&mut self, name: &str, records: Vec<Record>, unique: bool) -> DbResult<usize> {
        let capacity = self.config.page_capacity;
        let (mut page, mut spaces) = match self.take_most_free(name)? {
            Some((page, spaces)) if spaces > 0 => (page, spaces),
            Some((page, _)) => {
                self.push_free_entry(name, page, 0)?;
                (self.allocate_page(name)?, capacity)
            }
            None => (self.allocate_page(name)?, capacity),
        };
        self.buffer.ensure(page);

        let mut accepted = 0;
        for mut record in records {
            let id_key = match record.id() {
                Some(id) => id.key(),
                None => {
                    let generated = format!("{name}:{}", Uuid::new_v4());
                    record.set_id(generated.clone());
                    IndexKey::Text(generated)
                }
            };
            if unique && self.index_has_key(name, ID_COL, &id_key)? {
                continue;
            }
            if spaces == 0 {
                self.push_free_entry(name, page, 0)?;
                page = self.allocate_page(name)?;
                spaces = capacity;
                self.buffer.ensure(page);
            }
            let slot = self.store.page_mut(page)?.insert(record)?;
            spaces -= 1;
            if unique {
                let index = self
                    .table_mut(name)?
                    .indexes
                    .get_mut(ID_COL)
                    .ok_or_else(|| {
                        DbError::Catalog(format!("table '{name}' lost its '{ID_COL}' index"))
                    })?;
                index.insert(id_key, RecordLoc { page, slot });
            }
            accepted += 1;
        }
        self.push_free_entry(name, page, spaces)?;
        Ok(accepted)
    }
}
