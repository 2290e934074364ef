//! Row-local filter compilation.
//!
//! `compile_filter` turns a term's operations into one predicate over a
//! single record: conditions whose left side belongs to the given table (and
//! to its column list) are evaluated, everything else is ignored. The right
//! side is a literal or a column resolved from the same record, so
//! `a.c2 > a.c1` filters individual rows of `a`. With no applicable
//! conditions the predicate is `true`.

use common::Record;
use ir::{Operand, Operation};

pub fn compile_filter(
    ops: Vec<Operation>,
    table: &str,
    columns: &[String],
) -> Box<dyn Fn(&Record) -> bool> {
    let applicable: Vec<Operation> = ops
        .into_iter()
        .filter(|op| op.lhs.table == table && columns.contains(&op.lhs.col))
        .collect();
    Box::new(move |rec| {
        applicable.iter().all(|op| {
            let lhs = match rec.get(&op.lhs.col) {
                Some(value) => value,
                None => return false,
            };
            let rhs = match &op.rhs {
                Operand::Literal(value) => value,
                Operand::Column(col) => match rec.get(&col.col) {
                    Some(value) => value,
                    None => return false,
                },
            };
            op.op.matches(lhs.loose_cmp(rhs))
        })
    })
}
