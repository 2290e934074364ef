//! In-memory page storage.
//!
//! A [`Page`] is a fixed-capacity insertion log of records with slot-indexed
//! direct access; the [`PageStore`] owns every page in the engine and is the
//! authoritative home of record data. Buffer residency is simulated one
//! level up — a page evicted from the buffer still lives here, so eviction
//! is always silent.


use ahash::RandomState;
use common::{DbError, DbResult, PageId, Record};
use hashbrown::HashMap;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Fixed-capacity, append-only record container with stable slot indices.
///
/// Records are never deleted individually; `clear` empties the whole page in
/// place. Capacity is enforced at insert — callers are expected to consult
/// `spaces_left` first, so a full-page insert is a programmer error.
#[derive(Clone, Debug)]
pub struct Page {
    id: PageId,
    capacity: usize,
    records: Vec<Record>,
}

impl Page {
    pub fn new(id: PageId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    /// Append a record, returning its slot.
    pub fn insert(&mut self, record: Record) -> DbResult<u16> {
        if self.records.len() >= self.capacity {
            return Err(DbError::Storage(format!("page {} is full", self.id.0)));
        }
        let slot = self.records.len() as u16;
        self.records.push(record);
        Ok(slot)
    }

    /// Direct access by slot.
    pub fn record(&self, slot: u16) -> DbResult<&Record> {
        self.records.get(slot as usize).ok_or_else(|| {
            DbError::Storage(format!("slot {slot} out of bounds on page {}", self.id.0))
        })
    }

    /// Snapshot of the current contents, in slot order. Callers may keep
    /// inserting into the table while walking the snapshot.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Drop every record; the page object and its id survive.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn spaces_left(&self) -> usize {
        self.capacity - self.records.len()
    }
}

/// Owner of every page in the engine, keyed by id. Ids are allocated
/// monotonically and never reused.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Map<PageId, Page>,
    next_id: u64,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh empty page with the given capacity.
    pub fn allocate(&mut self, capacity: usize) -> PageId {
        let id = PageId(self.next_id);
        self.next_id += 1;
        self.pages.insert(id, Page::new(id, capacity));
        id
    }

    pub fn page(&self, id: PageId) -> DbResult<&Page> {
        self.pages
            .get(&id)
            .ok_or_else(|| DbError::Storage(format!("unknown page {}", id.0)))
    }

    pub fn page_mut(&mut self, id: PageId) -> DbResult<&mut Page> {
        self.pages
            .get_mut(&id)
            .ok_or_else(|| DbError::Storage(format!("unknown page {}", id.0)))
    }

    /// Release a page entirely (table drop).
    pub fn release(&mut self, id: PageId) {
        self.pages.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
