//! Query IR consumed by the evaluators.
//!
//! Immutable values describing one `WITH RECURSIVE` query: a column is `*`
//! or a qualified `table.col` reference; an operation compares a column
//! against a literal or another column with `=` or `>`; a term is one
//! `SELECT`; a query is the two terms of the `UNION` plus the declaration
//! and destination names. Validation happens at construction — unsupported
//! operators and malformed references never reach the executors.

use common::{CompareOp, DbError, DbResult};
use types::Value;

/// Qualified `table.col` reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub col: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, col: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            col: col.into(),
        }
    }

    /// Parse a `table.col` token.
    pub fn parse(raw: &str) -> DbResult<Self> {
        match raw.split_once('.') {
            Some((table, col)) if !table.is_empty() && !col.is_empty() => {
                Ok(Self::new(table, col))
            }
            _ => Err(DbError::Parser(format!(
                "expected 'table.col', got '{raw}'"
            ))),
        }
    }

    /// The `table.col` spelling, used as a projected column name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.col)
    }
}

/// Projected column: `*` or a qualified reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    All,
    Ref(ColumnRef),
}

impl Column {
    pub fn parse(raw: &str) -> DbResult<Self> {
        if raw.trim() == "*" {
            Ok(Column::All)
        } else {
            ColumnRef::parse(raw).map(Column::Ref)
        }
    }
}

/// Right-hand side of a condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Value),
}

impl Operand {
    /// Literal detection: an integer parse wins, everything else is text.
    pub fn literal(raw: &str) -> Self {
        Operand::Literal(Value::from_literal(raw))
    }
}

/// One `lhs op rhs` condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub lhs: ColumnRef,
    pub op: CompareOp,
    pub rhs: Operand,
}

impl Operation {
    /// Build a condition, rejecting unsupported operators.
    pub fn new(lhs: ColumnRef, op: &str, rhs: Operand) -> DbResult<Self> {
        Ok(Self {
            lhs,
            op: CompareOp::parse(op)?,
            rhs,
        })
    }
}

/// One `SELECT cols FROM tables [WHERE ops]` term.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub cols: Vec<Column>,
    pub tables: Vec<String>,
    pub ops: Vec<Operation>,
}

impl Term {
    /// True for a `SELECT *` term, which scans its sole table with a
    /// row-local filter.
    pub fn is_select_all(&self) -> bool {
        matches!(self.cols.as_slice(), [Column::All])
    }

    /// The projected references of a non-`*` term, in declaration order.
    pub fn output_refs(&self) -> DbResult<Vec<&ColumnRef>> {
        self.cols
            .iter()
            .map(|col| match col {
                Column::Ref(r) => Ok(r),
                Column::All => Err(DbError::Executor(
                    "'*' cannot be mixed with explicit columns".into(),
                )),
            })
            .collect()
    }
}

/// `WITH RECURSIVE <name>(<cols>)` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct WithDecl {
    pub name: String,
    pub cols: Vec<String>,
}

/// A full recursive query: non-recursive term `UNION` recursive term,
/// selected into `result_table`.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub with_decl: WithDecl,
    pub nonrec_term: Term,
    pub rec_term: Term,
    pub result_table: String,
}
