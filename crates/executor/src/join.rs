//! Join primitives: lazy record streams over the catalog.
//!
//! Both joins are [`RecordStream`]s, so downstream consumers can pull one
//! projected row at a time and insert it elsewhere before pulling the next.
//! Output ordering: the block join follows outer-block then inner-scan
//! order; the hash join groups by the left driver's key iteration order,
//! then the right side's. No total order is promised.

use catalog::{Catalog, RecordStream, TableScan};
use common::{CompareOp, DbError, DbResult, Record, provenance_col};
use types::{IndexKey, Value};

/// One projection entry: `dst ← rec[src_table][src_col]`.
///
/// The source selector is explicit so the same column name can appear in
/// both operands without ambiguity.
#[derive(Clone, Debug)]
pub struct ProjEntry {
    pub dst: String,
    pub src_table: String,
    pub src_col: String,
}

impl ProjEntry {
    pub fn new(
        dst: impl Into<String>,
        src_table: impl Into<String>,
        src_col: impl Into<String>,
    ) -> Self {
        Self {
            dst: dst.into(),
            src_table: src_table.into(),
            src_col: src_col.into(),
        }
    }
}

fn project(
    proj: &[ProjEntry],
    t1: &str,
    rec1: &Record,
    t2: &str,
    rec2: &Record,
) -> DbResult<Record> {
    let mut out = Record::new();
    for entry in proj {
        let src = if entry.src_table == t1 {
            rec1
        } else if entry.src_table == t2 {
            rec2
        } else {
            return Err(DbError::Executor(format!(
                "projection references unknown source table '{}'",
                entry.src_table
            )));
        };
        let value = src.get(&entry.src_col).ok_or_else(|| {
            DbError::Executor(format!(
                "column '{}' missing in source table '{}'",
                entry.src_col, entry.src_table
            ))
        })?;
        out.set(entry.dst.clone(), value.clone());
    }
    Ok(out)
}

fn record_id(rec: &Record, table: &str) -> DbResult<Value> {
    rec.id().cloned().ok_or_else(|| {
        DbError::Executor(format!("record from '{table}' entered a join without an _id"))
    })
}

/// Block nested-loop join over the Cartesian product of `t1 × t2`.
///
/// The outer side is driven in contiguous blocks of `block_join_size`
/// records; each block opens one fresh scan of the inner side and yields a
/// projected row per (outer, inner) pair. With `with_pair_id`, `_id<t1>` and
/// `_id<t2>` provenance markers are added; no composite `_id` is produced.
pub fn block_join(
    cat: &Catalog,
    t1: &str,
    t2: &str,
    proj: Vec<ProjEntry>,
    with_pair_id: bool,
) -> DbResult<BlockJoin> {
    Ok(BlockJoin {
        t1: t1.to_string(),
        t2: t2.to_string(),
        proj,
        with_pair_id,
        block_size: cat.config().block_join_size,
        outer: cat.scan(t1)?,
        outer_done: false,
        block: Vec::new(),
        block_pos: 0,
        inner: None,
        inner_rec: None,
    })
}

pub struct BlockJoin {
    t1: String,
    t2: String,
    proj: Vec<ProjEntry>,
    with_pair_id: bool,
    block_size: usize,
    outer: TableScan,
    outer_done: bool,
    block: Vec<Record>,
    block_pos: usize,
    inner: Option<TableScan>,
    inner_rec: Option<Record>,
}

impl RecordStream for BlockJoin {
    fn next(&mut self, cat: &mut Catalog) -> DbResult<Option<Record>> {
        loop {
            // Pair the current inner record with each outer in the block.
            if self.inner_rec.is_some() && self.block_pos < self.block.len() {
                let pos = self.block_pos;
                self.block_pos += 1;
                let rec1 = &self.block[pos];
                let rec2 = match &self.inner_rec {
                    Some(rec) => rec,
                    None => continue,
                };
                let mut out = project(&self.proj, &self.t1, rec1, &self.t2, rec2)?;
                if self.with_pair_id {
                    let id1 = record_id(rec1, &self.t1)?;
                    let id2 = record_id(rec2, &self.t2)?;
                    out.set(provenance_col(&self.t1), id1);
                    out.set(provenance_col(&self.t2), id2);
                }
                return Ok(Some(out));
            }

            // Advance the inner scan within the current block.
            if let Some(inner) = &mut self.inner {
                match inner.next(cat)? {
                    Some(rec) => {
                        self.inner_rec = Some(rec);
                        self.block_pos = 0;
                        continue;
                    }
                    None => {
                        self.inner = None;
                        self.inner_rec = None;
                    }
                }
            }

            // Refill the outer block and restart the inner side.
            if self.outer_done {
                return Ok(None);
            }
            self.block.clear();
            while self.block.len() < self.block_size {
                match self.outer.next(cat)? {
                    Some(rec) => self.block.push(rec),
                    None => {
                        self.outer_done = true;
                        break;
                    }
                }
            }
            if self.block.is_empty() {
                return Ok(None);
            }
            self.inner = Some(cat.scan(&self.t2)?);
        }
    }
}

/// Hash join of `t1.c1 op t2.c2` for `op` in `=`, `>`.
///
/// Both sides are hashed on their join columns if not already hashed. For
/// each distinct left key the matching right keys are enumerated
/// (`=`: the key itself; `>`: every smaller right key), both locator lists
/// are materialized through the buffer, and their Cartesian product is
/// emitted with the projection. With `with_pair_id` each output carries the
/// composite identity `"{id1}|{id2}"` plus `_id<t1>` / `_id<t2>` provenance,
/// and self-joins drop pairs of one and the same record.
pub fn hash_join(
    cat: &mut Catalog,
    t1: &str,
    c1: &str,
    t2: &str,
    c2: &str,
    proj: Vec<ProjEntry>,
    op: CompareOp,
    with_pair_id: bool,
) -> DbResult<HashJoin> {
    if !cat.is_table_hashed(t1, c1) {
        cat.hash_table(t1, c1, true)?;
    }
    if !cat.is_table_hashed(t2, c2) {
        cat.hash_table(t2, c2, true)?;
    }
    Ok(HashJoin {
        t1: t1.to_string(),
        c1: c1.to_string(),
        t2: t2.to_string(),
        c2: c2.to_string(),
        proj,
        op,
        with_pair_id,
        left_keys: cat.index_keys(t1, c1)?,
        key_pos: 0,
        left: Vec::new(),
        right: Vec::new(),
        i: 0,
        j: 0,
    })
}

pub struct HashJoin {
    t1: String,
    c1: String,
    t2: String,
    c2: String,
    proj: Vec<ProjEntry>,
    op: CompareOp,
    with_pair_id: bool,
    left_keys: Vec<IndexKey>,
    key_pos: usize,
    left: Vec<Record>,
    right: Vec<Record>,
    i: usize,
    j: usize,
}

impl RecordStream for HashJoin {
    fn next(&mut self, cat: &mut Catalog) -> DbResult<Option<Record>> {
        loop {
            // Emit from the current group's Cartesian product.
            if self.i < self.left.len() {
                let (i, j) = (self.i, self.j);
                self.j += 1;
                if self.j >= self.right.len() {
                    self.j = 0;
                    self.i += 1;
                }
                let rec1 = &self.left[i];
                let rec2 = &self.right[j];
                if self.with_pair_id && self.t1 == self.t2 && rec1.id() == rec2.id() {
                    continue;
                }
                let mut out = project(&self.proj, &self.t1, rec1, &self.t2, rec2)?;
                if self.with_pair_id {
                    let id1 = record_id(rec1, &self.t1)?;
                    let id2 = record_id(rec2, &self.t2)?;
                    out.set_id(format!("{id1}|{id2}"));
                    out.set(provenance_col(&self.t1), id1);
                    out.set(provenance_col(&self.t2), id2);
                }
                return Ok(Some(out));
            }

            // Advance to the next left key with at least one right match.
            let v1 = match self.left_keys.get(self.key_pos) {
                Some(key) => key.clone(),
                None => return Ok(None),
            };
            self.key_pos += 1;

            let right_keys: Vec<IndexKey> = match self.op {
                CompareOp::Eq => {
                    if cat.index_has_key(&self.t2, &self.c2, &v1)? {
                        vec![v1.clone()]
                    } else {
                        Vec::new()
                    }
                }
                CompareOp::Gt => cat
                    .index_keys(&self.t2, &self.c2)?
                    .into_iter()
                    .filter(|key| v1 > *key)
                    .collect(),
            };
            if right_keys.is_empty() {
                continue;
            }

            self.left = cat.records_for_key(&self.t1, &self.c1, &v1)?;
            self.right = Vec::new();
            for key in &right_keys {
                self.right
                    .extend(cat.records_for_key(&self.t2, &self.c2, key)?);
            }
            if self.left.is_empty() || self.right.is_empty() {
                self.left.clear();
                continue;
            }
            self.i = 0;
            self.j = 0;
        }
    }
}
