//! The standard (naive) term executor: no indexes, no simplification.
//!
//! Each term materializes the Cartesian product of its tables through lazy
//! scans, applies every predicate against the combined row environment,
//! projects to the declared columns, and emits under content-addressed
//! identities with the same working/result discipline as the optimized
//! executor. It doubles as the benchmark baseline and as an independent
//! oracle in tests.

use catalog::{Catalog, drain};
use common::{DbError, DbResult, Record};
use ir::{Operand, Operation, Query, Term};

pub(crate) fn execute_term(cat: &mut Catalog, query: &Query, term: &Term) -> DbResult<usize> {
    let before = cat.entry_count(&query.result_table)?;

    // Materialize every table of the term through the buffer.
    let mut sources: Vec<(String, Vec<Record>)> = Vec::new();
    for table in &term.tables {
        let mut scan = cat.scan(table)?;
        sources.push((table.clone(), drain(&mut scan, cat)?));
    }

    let w = &query.with_decl.name;
    let w_cols = cat.table_columns(w)?;
    let mut rows = Vec::new();
    let mut combo = vec![0usize; sources.len()];
    let empty = sources.iter().any(|(_, records)| records.is_empty());

    while !empty {
        let env: Vec<(&str, &Record)> = sources
            .iter()
            .zip(&combo)
            .map(|((table, records), idx)| (table.as_str(), &records[*idx]))
            .collect();

        let mut keep = true;
        for op in &term.ops {
            if !satisfies(op, &env)? {
                keep = false;
                break;
            }
        }
        if keep {
            rows.push(project_combo(term, &env, &w_cols)?);
        }

        // Odometer step over the Cartesian product.
        let mut level = sources.len();
        loop {
            if level == 0 {
                break;
            }
            level -= 1;
            combo[level] += 1;
            if combo[level] < sources[level].1.len() {
                break;
            }
            combo[level] = 0;
        }
        if combo.iter().all(|idx| *idx == 0) {
            break;
        }
    }

    cat.clear_table(w)?;
    cat.insert_unique_records_by_id(w, rows.clone())?;
    cat.insert_unique_records_by_id(&query.result_table, rows)?;
    Ok(cat.entry_count(&query.result_table)? - before)
}

fn lookup<'a>(env: &'a [(&str, &Record)], table: &str, col: &str) -> DbResult<&'a types::Value> {
    let (_, rec) = env
        .iter()
        .find(|(name, _)| *name == table)
        .ok_or_else(|| DbError::Executor(format!("'{table}' is not a table of this term")))?;
    rec.get(col)
        .ok_or_else(|| DbError::Executor(format!("column '{table}.{col}' missing from record")))
}

fn satisfies(op: &Operation, env: &[(&str, &Record)]) -> DbResult<bool> {
    let lhs = lookup(env, &op.lhs.table, &op.lhs.col)?;
    let rhs = match &op.rhs {
        Operand::Literal(value) => value,
        Operand::Column(col) => lookup(env, &col.table, &col.col)?,
    };
    Ok(op.op.matches(lhs.loose_cmp(rhs)))
}

fn project_combo(term: &Term, env: &[(&str, &Record)], w_cols: &[String]) -> DbResult<Record> {
    let mut out = Record::new();
    if term.is_select_all() {
        let (table, rec) = env
            .first()
            .ok_or_else(|| DbError::Executor("SELECT * term without a table".into()))?;
        let mut idx = 0;
        for (col, value) in rec.iter() {
            if common::is_synthetic(col) {
                continue;
            }
            let dst = w_cols.get(idx).ok_or_else(|| {
                DbError::Executor(format!("'{table}' has more columns than the declaration"))
            })?;
            out.set(dst.clone(), value.clone());
            idx += 1;
        }
    } else {
        let refs = term.output_refs()?;
        if refs.len() != w_cols.len() {
            return Err(DbError::Executor(format!(
                "term projects {} columns but the declaration has {}",
                refs.len(),
                w_cols.len()
            )));
        }
        for (r, dst) in refs.iter().zip(w_cols) {
            out.set(dst.clone(), lookup(env, &r.table, &r.col)?.clone());
        }
    }
    let id = out.content_id();
    out.set_id(id);
    Ok(out)
}
