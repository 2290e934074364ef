//! Recursive query execution.
//!
//! Two evaluation strategies share one semi-naive fixpoint driver: the
//! working table `W` (named by the `WITH RECURSIVE` declaration) seeds each
//! pass, the result table `R` accumulates every row ever derived, and the
//! loop stops on the first recursive pass that inserts nothing new into `R`.
//!
//! ```text
//! base term  → (W, R)
//! loop: recursive term → (W, R); stop when R gained 0 rows
//! drop W; R is the destination of SELECT * INTO
//! ```

mod filter;
mod join;
mod optimized;
mod standard;

pub use filter::compile_filter;
pub use join::{BlockJoin, HashJoin, ProjEntry, block_join, hash_join};

use catalog::Catalog;
use common::DbResult;
use ir::Query;
use tracing::debug;

/// Which term executor drives the query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Naive Cartesian products, no indexes.
    Standard,
    /// Simplification tables, composite hash joins, and join-tree reuse.
    Optimized,
}

/// Outcome of one executed query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRun {
    /// Name of the populated result table.
    pub result_table: String,
    /// Rows in the result table at fixpoint.
    pub rows: usize,
    /// Recursive passes taken, including the terminating empty one.
    pub passes: usize,
}

/// Execute a recursive query to fixpoint with the chosen strategy.
///
/// Allocates the working and result tables, runs the driver, and drops the
/// working table on the way out. The result table is left populated for the
/// caller.
pub fn execute_query(cat: &mut Catalog, query: &Query, strategy: Strategy) -> DbResult<QueryRun> {
    let w = &query.with_decl.name;
    let cols = query.with_decl.cols.clone();
    cat.add_table(w, cols.clone())?;
    cat.add_table(&query.result_table, cols)?;

    let base = run_term(cat, query, false, strategy)?;
    debug!(strategy = ?strategy, rows = base, "base term done");

    let mut passes = 0;
    loop {
        let gained = run_term(cat, query, true, strategy)?;
        passes += 1;
        debug!(strategy = ?strategy, pass = passes, gained, "recursive pass done");
        if gained == 0 {
            break;
        }
    }

    cat.drop_table(w)?;
    Ok(QueryRun {
        result_table: query.result_table.clone(),
        rows: cat.entry_count(&query.result_table)?,
        passes,
    })
}

fn run_term(cat: &mut Catalog, query: &Query, recursive: bool, strategy: Strategy) -> DbResult<usize> {
    let term = if recursive {
        &query.rec_term
    } else {
        &query.nonrec_term
    };
    match strategy {
        Strategy::Standard => standard::execute_term(cat, query, term),
        Strategy::Optimized => optimized::execute_term(cat, query, term),
    }
}
