//! The optimized term executor.
//!
//! A term runs in phases: `SELECT *` terms are a filtered scan; join terms
//! classify their predicates, simplify each table with simple predicates,
//! hash-join each table pair with composite predicates, fold the pair
//! tables into a forest of join trees, cross-product whatever is left
//! independent, and emit the surviving rows into the working and result
//! tables under content-addressed identities.
//!
//! Every intermediate lives in an ephemeral table with an opaque name and
//! is dropped on the way out; a fatal error aborts the query and leaves
//! cleanup to engine teardown.

use std::collections::{BTreeMap, BTreeSet};

use catalog::{Catalog, RecordStream, drain};
use common::{CompareOp, DbError, DbResult, ID_COL, Record, is_synthetic, provenance_col};
use ir::{Operand, Operation, Query, Term};
use tracing::debug;
use uuid::Uuid;

use crate::filter::compile_filter;
use crate::join::{ProjEntry, block_join, hash_join};

/// Execute one term into the working and result tables, returning how many
/// rows the result table gained.
pub(crate) fn execute_term(cat: &mut Catalog, query: &Query, term: &Term) -> DbResult<usize> {
    let before = cat.entry_count(&query.result_table)?;
    if term.is_select_all() {
        select_all_term(cat, query, term)?;
    } else {
        join_term(cat, query, term)?;
    }
    Ok(cat.entry_count(&query.result_table)? - before)
}

fn temp_name(hint: &str) -> String {
    format!("#{hint}:{}", Uuid::new_v4().simple())
}

/// `SELECT *`: scan the sole table with a row-local filter, re-address each
/// accepted row by content, and replace the working table.
fn select_all_term(cat: &mut Catalog, query: &Query, term: &Term) -> DbResult<()> {
    let table = match term.tables.as_slice() {
        [table] => table,
        _ => {
            return Err(DbError::Executor(
                "a SELECT * term scans exactly one table".into(),
            ));
        }
    };
    let columns = cat.table_columns(table)?;
    let predicate = compile_filter(term.ops.clone(), table, &columns);
    let mut scan = cat.filter_scan(table, predicate)?;
    let accepted = drain(&mut scan, cat)?;

    let w = &query.with_decl.name;
    let w_cols = cat.table_columns(w)?;
    let rows: Vec<Record> = accepted
        .iter()
        .map(|rec| reshape_positional(rec, &columns, &w_cols))
        .collect::<DbResult<_>>()?;

    cat.clear_table(w)?;
    cat.insert_unique_records_by_id(w, rows.clone())?;
    cat.insert_unique_records_by_id(&query.result_table, rows)?;
    Ok(())
}

/// Rebuild a record onto `dst_cols` positionally and give it its
/// content-addressed identity.
fn reshape_positional(rec: &Record, src_cols: &[String], dst_cols: &[String]) -> DbResult<Record> {
    if src_cols.len() != dst_cols.len() {
        return Err(DbError::Executor(format!(
            "cannot reshape {} columns onto {}",
            src_cols.len(),
            dst_cols.len()
        )));
    }
    let mut out = Record::new();
    for (src, dst) in src_cols.iter().zip(dst_cols) {
        let value = rec
            .get(src)
            .ok_or_else(|| DbError::Executor(format!("column '{src}' missing from record")))?;
        out.set(dst.clone(), value.clone());
    }
    let id = out.content_id();
    out.set_id(id);
    Ok(out)
}

/// Canonical unordered pair of source table names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PairKey(String, String);

impl PairKey {
    fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    fn members(&self) -> (&str, &str) {
        (&self.0, &self.1)
    }

    fn contains(&self, table: &str) -> bool {
        self.0 == table || self.1 == table
    }

    /// The source table two pair keys have in common, if any.
    fn shares<'a>(&'a self, other: &PairKey) -> Option<&'a str> {
        if other.contains(&self.0) {
            Some(&self.0)
        } else if other.contains(&self.1) {
            Some(&self.1)
        } else {
            None
        }
    }
}

/// Phase B: partition a term's predicates.
struct Classified {
    /// Per-table row-local predicates: column vs constant, plus column vs
    /// column within one table.
    simple: BTreeMap<String, Vec<Operation>>,
    /// Cross-table predicates keyed by the unordered table pair.
    composite: BTreeMap<PairKey, Vec<Operation>>,
    /// Tables appearing in no predicate at all.
    no_ops: Vec<String>,
}

fn classify(term: &Term) -> Classified {
    let mut simple: BTreeMap<String, Vec<Operation>> = BTreeMap::new();
    let mut composite: BTreeMap<PairKey, Vec<Operation>> = BTreeMap::new();
    let mut mentioned: BTreeSet<&str> = BTreeSet::new();

    for op in &term.ops {
        mentioned.insert(&op.lhs.table);
        match &op.rhs {
            Operand::Column(rhs) if rhs.table != op.lhs.table => {
                mentioned.insert(&rhs.table);
                composite
                    .entry(PairKey::new(&op.lhs.table, &rhs.table))
                    .or_default()
                    .push(op.clone());
            }
            _ => {
                simple
                    .entry(op.lhs.table.clone())
                    .or_default()
                    .push(op.clone());
            }
        }
    }

    let no_ops = term
        .tables
        .iter()
        .filter(|table| !mentioned.contains(table.as_str()))
        .cloned()
        .collect();

    Classified {
        simple,
        composite,
        no_ops,
    }
}

fn join_term(cat: &mut Catalog, query: &Query, term: &Term) -> DbResult<()> {
    let classes = classify(term);
    debug!(
        simple = classes.simple.len(),
        composite = classes.composite.len(),
        unconstrained = classes.no_ops.len(),
        "classified term predicates"
    );

    // Phase C: per-table simplification.
    let mut name_map: BTreeMap<String, String> = BTreeMap::new();
    let mut simplified: Vec<String> = Vec::new();
    for (table, preds) in &classes.simple {
        let s_name = simplify_table(cat, table, preds)?;
        name_map.insert(table.clone(), s_name.clone());
        simplified.push(s_name);
    }
    for table in &term.tables {
        name_map
            .entry(table.clone())
            .or_insert_with(|| table.clone());
    }

    // Phase D: per-pair composite joins.
    let pair_tables = composite_pairs(cat, term, &classes, &name_map)?;

    // Phase E: reduce the pair graph to one representative per join tree.
    let mut independents = reduce_forest(cat, term, &pair_tables)?;

    // Unconstrained tables and simplified tables outside every pair join in
    // via plain cross product.
    for table in &classes.no_ops {
        independents.push(name_map[table].clone());
    }
    for table in classes.simple.keys() {
        if !pair_tables.keys().any(|key| key.contains(table)) {
            independents.push(name_map[table].clone());
        }
    }

    // Phase F: cross-product the independent inputs.
    let final_table = cross_product(cat, &independents)?;

    // Phase G: emit into (W, R), then tear the intermediates down.
    emit(cat, query, term, &final_table)?;
    cat.drop_table(&final_table)?;
    for table in pair_tables.values() {
        cat.drop_table(table)?;
    }
    for table in &simplified {
        cat.drop_table(table)?;
    }
    Ok(())
}

/// Phase C for one table: one temp per predicate, intersected by `_id`.
fn simplify_table(cat: &mut Catalog, table: &str, preds: &[Operation]) -> DbResult<String> {
    let columns = cat.table_columns(table)?;
    let s_name = temp_name("sel");
    cat.add_table(&s_name, columns.clone())?;

    let mut temps = Vec::new();
    for pred in preds {
        let tp = temp_name("pred");
        cat.add_table(&tp, columns.clone())?;
        let records = match &pred.rhs {
            Operand::Literal(value) => {
                if !cat.is_table_hashed(table, &pred.lhs.col) {
                    cat.hash_table(table, &pred.lhs.col, true)?;
                }
                let mut scan = cat.index_scan(table, &pred.lhs.col, pred.op, value)?;
                drain(&mut scan, cat)?
            }
            Operand::Column(_) => {
                let predicate = compile_filter(vec![pred.clone()], table, &columns);
                let mut scan = cat.filter_scan(table, predicate)?;
                drain(&mut scan, cat)?
            }
        };
        cat.insert_unique_records_by_id(&tp, records)?;
        temps.push(tp);
    }

    let survivors = if temps.len() >= 2 {
        intersect_by_id(cat, &temps)?
    } else if let Some(only) = temps.first() {
        let mut scan = cat.scan(only)?;
        drain(&mut scan, cat)?
    } else {
        Vec::new()
    };
    cat.insert_unique_records_by_id(&s_name, survivors)?;

    for tp in temps {
        cat.drop_table(&tp)?;
    }
    Ok(s_name)
}

/// Keep each record of the first table whose `_id` every other table also
/// holds. All tables involved carry an `_id` hash index.
fn intersect_by_id(cat: &mut Catalog, tables: &[String]) -> DbResult<Vec<Record>> {
    let (first, rest) = tables
        .split_first()
        .ok_or_else(|| DbError::Executor("intersection over no tables".into()))?;
    let mut survivors = Vec::new();
    let mut scan = cat.scan(first)?;
    'records: while let Some(rec) = scan.next(cat)? {
        let id = rec
            .id()
            .cloned()
            .ok_or_else(|| DbError::Executor("record without _id during intersection".into()))?;
        for other in rest {
            if !cat.has_value(other, ID_COL, &id)? {
                continue 'records;
            }
        }
        survivors.push(rec);
    }
    Ok(survivors)
}

/// Phase D: one composite table per predicate pair, intersected by the
/// composite `_id`, hashed on both provenance columns.
fn composite_pairs(
    cat: &mut Catalog,
    term: &Term,
    classes: &Classified,
    name_map: &BTreeMap<String, String>,
) -> DbResult<BTreeMap<PairKey, String>> {
    let output_refs = term.output_refs()?;
    let mut pair_tables = BTreeMap::new();

    for (pair, preds) in &classes.composite {
        let (pa, pb) = pair.members();
        let out_cols: Vec<String> = output_refs
            .iter()
            .filter(|col| pair.contains(&col.table))
            .map(|col| col.qualified())
            .collect();

        let mut temps = Vec::new();
        for pred in preds {
            let rhs = match &pred.rhs {
                Operand::Column(rhs) => rhs,
                Operand::Literal(_) => {
                    return Err(DbError::Executor(
                        "composite predicate with a literal side".into(),
                    ));
                }
            };
            let left = mapped(name_map, &pred.lhs.table)?.clone();
            let right = mapped(name_map, &rhs.table)?.clone();
            let proj = output_refs
                .iter()
                .filter(|col| pair.contains(&col.table))
                .map(|col| {
                    Ok(ProjEntry::new(
                        col.qualified(),
                        mapped(name_map, &col.table)?.clone(),
                        col.col.clone(),
                    ))
                })
                .collect::<DbResult<Vec<ProjEntry>>>()?;

            let mut join = hash_join(
                cat,
                &left,
                &pred.lhs.col,
                &right,
                &rhs.col,
                proj,
                pred.op,
                true,
            )?;
            let mut batch = Vec::new();
            while let Some(mut rec) = join.next(cat)? {
                remap_provenance(&mut rec, &left, &pred.lhs.table);
                remap_provenance(&mut rec, &right, &rhs.table);
                canonicalize_pair_id(&mut rec, pa, pb)?;
                batch.push(rec);
            }

            let tp = temp_name("pred");
            cat.add_table(&tp, out_cols.clone())?;
            cat.insert_unique_records_by_id(&tp, batch)?;
            temps.push(tp);
        }

        let survivors = if temps.len() >= 2 {
            intersect_by_id(cat, &temps)?
        } else if let Some(only) = temps.first() {
            let mut scan = cat.scan(only)?;
            drain(&mut scan, cat)?
        } else {
            Vec::new()
        };

        let pair_table = temp_name("pair");
        cat.add_table(&pair_table, out_cols)?;
        cat.insert_unique_records_by_id(&pair_table, survivors)?;
        for tp in temps {
            cat.drop_table(&tp)?;
        }

        cat.hash_table(&pair_table, &provenance_col(pa), true)?;
        cat.hash_table(&pair_table, &provenance_col(pb), true)?;
        pair_tables.insert(pair.clone(), pair_table);
    }

    Ok(pair_tables)
}

fn mapped<'a>(name_map: &'a BTreeMap<String, String>, table: &str) -> DbResult<&'a String> {
    name_map
        .get(table)
        .ok_or_else(|| DbError::Executor(format!("'{table}' is not a table of this term")))
}

/// Joins scan simplified tables, but provenance is tracked under the source
/// table's name so pair tables line up across predicates and trees.
fn remap_provenance(rec: &mut Record, scanned: &str, source: &str) {
    if scanned == source {
        return;
    }
    if let Some(id) = rec.remove(&provenance_col(scanned)) {
        rec.set(provenance_col(source), id);
    }
}

/// Rebuild the composite identity in canonical pair order, so predicates
/// written in either orientation intersect on the same key.
fn canonicalize_pair_id(rec: &mut Record, pa: &str, pb: &str) -> DbResult<()> {
    if pa == pb {
        return Ok(());
    }
    let ida = rec
        .get(&provenance_col(pa))
        .ok_or_else(|| DbError::Executor(format!("composite row lost _id<{pa}>")))?;
    let idb = rec
        .get(&provenance_col(pb))
        .ok_or_else(|| DbError::Executor(format!("composite row lost _id<{pb}>")))?;
    let id = format!("{ida}|{idb}");
    rec.set_id(id);
    Ok(())
}

/// Tree node over pair keys. Children are attached in canonical key order,
/// so the forest shape is deterministic given the pair map.
struct TreeNode<'a> {
    key: &'a PairKey,
    children: Vec<TreeNode<'a>>,
}

fn build_tree<'a>(
    key: &'a PairKey,
    keys: &[&'a PairKey],
    visited: &mut BTreeSet<PairKey>,
) -> TreeNode<'a> {
    visited.insert(key.clone());
    let mut children = Vec::new();
    for other in keys {
        if !visited.contains(*other) && key.shares(other).is_some() {
            children.push(build_tree(other, keys, visited));
        }
    }
    TreeNode { key, children }
}

/// Phase E: decompose the pair graph into trees and reduce each one to its
/// root pair table. Returns one representative table per tree.
fn reduce_forest(
    cat: &mut Catalog,
    term: &Term,
    pair_tables: &BTreeMap<PairKey, String>,
) -> DbResult<Vec<String>> {
    let keys: Vec<&PairKey> = pair_tables.keys().collect();
    let mut visited = BTreeSet::new();
    let mut reps = Vec::new();
    for key in &keys {
        if visited.contains(*key) {
            continue;
        }
        let tree = build_tree(key, &keys, &mut visited);
        reps.push(reduce_tree(cat, term, &tree, pair_tables)?);
    }
    Ok(reps)
}

/// Post-order tree reduction: fold every child into its parent by
/// intersecting on the shared source's provenance and composing matching
/// rows, then overwrite the parent pair table with the composed projection.
fn reduce_tree(
    cat: &mut Catalog,
    term: &Term,
    node: &TreeNode<'_>,
    pair_tables: &BTreeMap<PairKey, String>,
) -> DbResult<String> {
    let parent = pair_tables[node.key].clone();
    if node.children.is_empty() {
        return Ok(parent);
    }

    let mut kids: Vec<(String, String)> = Vec::new();
    for child in &node.children {
        let shared = node
            .key
            .shares(child.key)
            .ok_or_else(|| DbError::Executor("join-tree child shares no source table".into()))?
            .to_string();
        let rep = reduce_tree(cat, term, child, pair_tables)?;
        kids.push((rep, shared));
    }

    let (pa, pb) = node.key.members();
    let prov_a = provenance_col(pa);
    let prov_b = provenance_col(pb);
    let output_refs = term.output_refs()?;

    let mut out_rows = Vec::new();
    let mut scan = cat.scan(&parent)?;
    'rows: while let Some(parent_row) = scan.next(cat)? {
        // Keep the row only if every child holds its shared provenance id.
        for (child, shared) in &kids {
            let col = provenance_col(shared);
            let id = parent_row.get(&col).ok_or_else(|| {
                DbError::Executor(format!("pair row missing provenance column '{col}'"))
            })?;
            if !cat.has_value(child, &col, id)? {
                continue 'rows;
            }
        }

        // Cartesian composition across the children's matching rows.
        let mut composed = vec![parent_row.clone()];
        for (child, shared) in &kids {
            let col = provenance_col(shared);
            let id = match parent_row.get(&col) {
                Some(id) => id.clone(),
                None => continue 'rows,
            };
            let mut matches = cat.index_scan(child, &col, CompareOp::Eq, &id)?;
            let matching = drain(&mut matches, cat)?;
            let mut next = Vec::with_capacity(composed.len() * matching.len());
            for base in &composed {
                for m in &matching {
                    let mut merged = base.clone();
                    merged.merge(m);
                    next.push(merged);
                }
            }
            composed = next;
        }

        for row in composed {
            let mut out = Record::new();
            for col in [&prov_a, &prov_b] {
                if let Some(value) = row.get(col) {
                    out.set(col.clone(), value.clone());
                }
            }
            for r in &output_refs {
                let qualified = r.qualified();
                if let Some(value) = row.get(&qualified) {
                    out.set(qualified, value.clone());
                }
            }
            out_rows.push(out);
        }
    }

    debug!(parent = %parent, rows = out_rows.len(), "reduced join-tree node");
    cat.clear_table(&parent)?;
    cat.insert_records(&parent, out_rows)?;
    cat.hash_table(&parent, &prov_a, true)?;
    cat.hash_table(&parent, &prov_b, true)?;
    Ok(parent)
}

fn non_id_columns(cat: &Catalog, table: &str) -> DbResult<Vec<String>> {
    Ok(cat
        .table_columns(table)?
        .into_iter()
        .filter(|col| !is_synthetic(col))
        .collect())
}

/// Phase F: fold the independent inputs left to right with block joins,
/// deduplicating by content-addressed identity at every step.
fn cross_product(cat: &mut Catalog, inputs: &[String]) -> DbResult<String> {
    let (first, rest) = inputs
        .split_first()
        .ok_or_else(|| DbError::Executor("term produced no independent inputs".into()))?;

    if rest.is_empty() {
        let cols = non_id_columns(cat, first)?;
        let out = temp_name("final");
        cat.add_table(&out, cols.clone())?;
        let mut scan = cat.scan(first)?;
        while let Some(rec) = scan.next(cat)? {
            let mut slim = Record::new();
            for col in &cols {
                if let Some(value) = rec.get(col) {
                    slim.set(col.clone(), value.clone());
                }
            }
            let id = slim.content_id();
            slim.set_id(id);
            cat.insert_unique_records_by_id(&out, vec![slim])?;
        }
        return Ok(out);
    }

    let mut left = first.clone();
    let mut left_is_temp = false;
    for right in rest {
        let left_cols = non_id_columns(cat, &left)?;
        let right_cols = non_id_columns(cat, right)?;
        let mut out_cols = left_cols.clone();
        for col in &right_cols {
            if !out_cols.contains(col) {
                out_cols.push(col.clone());
            }
        }

        let mut proj: Vec<ProjEntry> = left_cols
            .iter()
            .map(|col| ProjEntry::new(col.clone(), left.clone(), col.clone()))
            .collect();
        proj.extend(
            right_cols
                .iter()
                .map(|col| ProjEntry::new(col.clone(), right.clone(), col.clone())),
        );

        let step = temp_name("cross");
        cat.add_table(&step, out_cols)?;
        let mut join = block_join(cat, &left, right, proj, false)?;
        while let Some(mut rec) = join.next(cat)? {
            let id = rec.content_id();
            rec.set_id(id);
            cat.insert_unique_records_by_id(&step, vec![rec])?;
        }

        if left_is_temp {
            cat.drop_table(&left)?;
        }
        left = step;
        left_is_temp = true;
    }
    Ok(left)
}


/// Phase G: rebuild each final row onto the declared working columns,
/// content-address it, and insert into both the working and result tables.
fn emit(cat: &mut Catalog, query: &Query, term: &Term, final_table: &str) -> DbResult<()> {
    let w = &query.with_decl.name;
    let w_cols = cat.table_columns(w)?;
    let refs = term.output_refs()?;
    if refs.len() != w_cols.len() {
        return Err(DbError::Executor(format!(
            "term projects {} columns but '{w}' declares {}",
            refs.len(),
            w_cols.len()
        )));
    }

    let mut rows = Vec::new();
    let mut scan = cat.scan(final_table)?;
    while let Some(rec) = scan.next(cat)? {
        let mut out = Record::new();
        for (r, dst) in refs.iter().zip(&w_cols) {
            let qualified = r.qualified();
            let value = rec.get(&qualified).or_else(|| rec.get(&r.col)).ok_or_else(|| {
                DbError::Executor(format!("column '{qualified}' missing from joined row"))
            })?;
            out.set(dst.clone(), value.clone());
        }
        let id = out.content_id();
        out.set_id(id);
        rows.push(out);
    }

    cat.clear_table(w)?;
    cat.insert_unique_records_by_id(w, rows.clone())?;
    cat.insert_unique_records_by_id(&query.result_table, rows)?;
    Ok(())
}
