//! Lazy record streams in the Volcano pull style.
//!
//! A stream is passive state; every `next` call borrows the catalog, so a
//! consumer can pull a record and immediately insert into another table
//! before pulling again. Page contents are snapshotted when the stream
//! reaches the page — never earlier — so records materialize on demand and
//! each page access pays the buffer, including re-admissions after an
//! eviction mid-scan.

use crate::Catalog;
use common::{DbResult, PageId, Record, RecordLoc};
use std::collections::VecDeque;

/// Pull-based record stream over the catalog.
pub trait RecordStream {
    /// Fetch the next record, or `None` when exhausted.
    fn next(&mut self, catalog: &mut Catalog) -> DbResult<Option<Record>>;
}

/// Drain a stream to completion.
pub fn drain<S: RecordStream>(stream: &mut S, catalog: &mut Catalog) -> DbResult<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(record) = stream.next(catalog)? {
        records.push(record);
    }
    Ok(records)
}

/// Full scan in page-insertion order, one page snapshot at a time.
///
/// The page list is fixed at creation; pages added to the table afterwards
/// are not visited.
#[derive(Debug)]
pub struct TableScan {
    pages: VecDeque<PageId>,
    current: VecDeque<Record>,
}

impl TableScan {
    pub(crate) fn new(pages: Vec<PageId>) -> Self {
        Self {
            pages: pages.into(),
            current: VecDeque::new(),
        }
    }
}

impl RecordStream for TableScan {
    fn next(&mut self, catalog: &mut Catalog) -> DbResult<Option<Record>> {
        loop {
            if let Some(record) = self.current.pop_front() {
                return Ok(Some(record));
            }
            match self.pages.pop_front() {
                Some(page) => self.current = catalog.page_snapshot(page)?.into(),
                None => return Ok(None),
            }
        }
    }
}

/// Full scan filtered by a host-supplied row predicate.
pub struct FilterScan {
    inner: TableScan,
    predicate: Box<dyn Fn(&Record) -> bool>,
}

impl FilterScan {
    pub(crate) fn new(inner: TableScan, predicate: Box<dyn Fn(&Record) -> bool>) -> Self {
        Self { inner, predicate }
    }
}

impl RecordStream for FilterScan {
    fn next(&mut self, catalog: &mut Catalog) -> DbResult<Option<Record>> {
        while let Some(record) = self.inner.next(catalog)? {
            if (self.predicate)(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Stream over a fixed locator list, materializing records through the
/// buffer one at a time.
#[derive(Debug)]
pub struct IndexScan {
    locs: VecDeque<RecordLoc>,
}

impl IndexScan {
    pub(crate) fn new(locs: Vec<RecordLoc>) -> Self {
        Self { locs: locs.into() }
    }
}

impl RecordStream for IndexScan {
    fn next(&mut self, catalog: &mut Catalog) -> DbResult<Option<Record>> {
        match self.locs.pop_front() {
            Some(loc) => catalog.record_at(loc).map(Some),
            None => Ok(None),
        }
    }
}
