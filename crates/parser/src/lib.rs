//! SQL front end: lowers the `WITH RECURSIVE` grammar onto the query IR.
//!
//! Exactly one production is accepted:
//!
//! ```sql
//! WITH RECURSIVE name(col, ...) AS (
//!   SELECT ... UNION SELECT ...
//! )
//! SELECT * INTO dest FROM name;
//! ```
//!
//! Parsing itself is delegated to `sqlparser`; this crate validates the
//! shape and maps it onto [`ir::Query`] values. Multiple statements in one
//! input are lowered sequentially.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult};
use ir::{Column, ColumnRef, Operand, Operation, Query, Term, WithDecl};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::Value;

/// Parse SQL text into recursive queries, in statement order.
pub fn parse_queries(sql: &str) -> DbResult<Vec<Query>> {
    let dialect = GenericDialect {};
    let stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::Parser(format!("SQL parse error: {e}")))?;

    stmts.into_iter().map(map_statement).collect()
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Query> {
    match stmt {
        sqlast::Statement::Query(query) => map_query(*query),
        _ => Err(DbError::Parser(
            "only WITH RECURSIVE ... SELECT INTO statements are supported".into(),
        )),
    }
}

fn map_query(query: sqlast::Query) -> DbResult<Query> {
    let with = query
        .with
        .ok_or_else(|| DbError::Parser("query must begin with WITH RECURSIVE".into()))?;
    if !with.recursive {
        return Err(DbError::Parser("WITH clause must be RECURSIVE".into()));
    }
    let mut ctes = with.cte_tables;
    if ctes.len() != 1 {
        return Err(DbError::Parser(
            "exactly one recursive table may be declared".into(),
        ));
    }
    let cte = ctes.remove(0);
    let name = normalize_ident(&cte.alias.name);
    let cols: Vec<String> = cte.alias.columns.iter().map(normalize_ident).collect();
    if cols.is_empty() {
        return Err(DbError::Parser(format!(
            "recursive table '{name}' needs an explicit column list"
        )));
    }

    let (nonrec, rec) = split_union(*cte.query)?;
    let nonrec_term = map_term(nonrec)?;
    let rec_term = map_term(rec)?;
    let result_table = map_outer(*query.body, &name)?;

    Ok(Query {
        with_decl: WithDecl { name, cols },
        nonrec_term,
        rec_term,
        result_table,
    })
}

fn split_union(query: sqlast::Query) -> DbResult<(Box<sqlast::Select>, Box<sqlast::Select>)> {
    match *query.body {
        sqlast::SetExpr::SetOperation {
            op: sqlast::SetOperator::Union,
            set_quantifier,
            left,
            right,
        } => {
            match set_quantifier {
                sqlast::SetQuantifier::None | sqlast::SetQuantifier::Distinct => {}
                other => {
                    return Err(DbError::Parser(format!(
                        "only plain UNION is supported, got UNION {other}"
                    )));
                }
            }
            Ok((expect_select(*left)?, expect_select(*right)?))
        }
        _ => Err(DbError::Parser(
            "the recursive body must be <term> UNION <term>".into(),
        )),
    }
}

fn expect_select(expr: sqlast::SetExpr) -> DbResult<Box<sqlast::Select>> {
    match expr {
        sqlast::SetExpr::Select(select) => Ok(select),
        _ => Err(DbError::Parser("expected a plain SELECT".into())),
    }
}

/// Validate `SELECT * INTO <dest> FROM <cte>` and return the destination.
fn map_outer(body: sqlast::SetExpr, cte: &str) -> DbResult<String> {
    let select = expect_select(body)?;
    let sqlast::Select {
        projection,
        into,
        from,
        selection,
        ..
    } = *select;

    match projection.as_slice() {
        [sqlast::SelectItem::Wildcard(options)] => ensure_plain_wildcard(options)?,
        _ => {
            return Err(DbError::Parser(
                "the outer SELECT must project '*'".into(),
            ));
        }
    }
    let into = into
        .ok_or_else(|| DbError::Parser("the outer SELECT must write INTO a table".into()))?;
    let dest = normalize_object_name(&into.name)?;
    let from = match from.as_slice() {
        [table] => table_name_from_with_joins(table)?,
        _ => {
            return Err(DbError::Parser(
                "the outer SELECT reads from exactly one table".into(),
            ));
        }
    };
    if from != cte {
        return Err(DbError::Parser(format!(
            "the outer SELECT must read FROM '{cte}'"
        )));
    }
    if selection.is_some() {
        return Err(DbError::Parser("the outer SELECT cannot filter".into()));
    }
    Ok(dest)
}

fn map_term(select: Box<sqlast::Select>) -> DbResult<Term> {
    let sqlast::Select {
        projection,
        from,
        selection,
        ..
    } = *select;

    let cols = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<Column>>>()?;
    if cols.is_empty() {
        return Err(DbError::Parser("a term must project something".into()));
    }
    if cols.len() > 1 && cols.contains(&Column::All) {
        return Err(DbError::Parser(
            "'*' cannot be combined with other columns".into(),
        ));
    }

    if from.is_empty() {
        return Err(DbError::Parser("a term needs a FROM clause".into()));
    }
    let tables = from
        .iter()
        .map(table_name_from_with_joins)
        .collect::<DbResult<Vec<_>>>()?;

    let ops = match selection {
        Some(expr) => flatten_conditions(expr)?,
        None => Vec::new(),
    };

    Ok(Term { cols, tables, ops })
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<Column> {
    match item {
        sqlast::SelectItem::Wildcard(options) => {
            ensure_plain_wildcard(&options)?;
            Ok(Column::All)
        }
        sqlast::SelectItem::UnnamedExpr(expr) => Ok(Column::Ref(column_ref(expr)?)),
        _ => Err(DbError::Parser(
            "select items must be '*' or table.col references".into(),
        )),
    }
}

/// Split an `AND` chain into individual conditions.
fn flatten_conditions(expr: sqlast::Expr) -> DbResult<Vec<Operation>> {
    match expr {
        sqlast::Expr::BinaryOp {
            left,
            op: sqlast::BinaryOperator::And,
            right,
        } => {
            let mut ops = flatten_conditions(*left)?;
            ops.extend(flatten_conditions(*right)?);
            Ok(ops)
        }
        sqlast::Expr::Nested(inner) => flatten_conditions(*inner),
        sqlast::Expr::BinaryOp { left, op, right } => Ok(vec![map_condition(*left, op, *right)?]),
        other => Err(DbError::Parser(format!("unsupported condition: {other}"))),
    }
}

fn map_condition(
    left: sqlast::Expr,
    op: sqlast::BinaryOperator,
    right: sqlast::Expr,
) -> DbResult<Operation> {
    let lhs = column_ref(left)?;
    let op = match op {
        sqlast::BinaryOperator::Eq => "=",
        sqlast::BinaryOperator::Gt => ">",
        other => {
            return Err(DbError::Parser(format!("unsupported operator: {other}")));
        }
    };
    let rhs = match right {
        expr @ sqlast::Expr::CompoundIdentifier(_) => Operand::Column(column_ref(expr)?),
        sqlast::Expr::Value(value) => Operand::Literal(map_value(value)?),
        other => {
            return Err(DbError::Parser(format!(
                "the right-hand side must be a table.col or a literal, got {other}"
            )));
        }
    };
    Operation::new(lhs, op, rhs)
}

fn column_ref(expr: sqlast::Expr) -> DbResult<ColumnRef> {
    match expr {
        sqlast::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, col] => Ok(ColumnRef::new(normalize_ident(table), normalize_ident(col))),
            _ => Err(DbError::Parser(
                "column references take the form table.col".into(),
            )),
        },
        sqlast::Expr::Identifier(ident) => Err(DbError::Parser(format!(
            "column '{}' must be qualified as table.col",
            ident.value
        ))),
        other => Err(DbError::Parser(format!("expected a column, got {other}"))),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    match value {
        sqlast::Value::Number(raw, _) => Ok(Value::from_literal(&raw)),
        sqlast::Value::SingleQuotedString(s) => Ok(Value::Text(s)),
        other => Err(DbError::Parser(format!("unsupported literal: {other}"))),
    }
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(normalize_ident)
        .ok_or_else(|| DbError::Parser("invalid object name".into()))
}

fn table_name_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(DbError::Parser(
            "explicit JOIN syntax is not supported".into(),
        ));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name),
        _ => Err(DbError::Parser("unsupported table factor".into())),
    }
}

fn ensure_plain_wildcard(options: &sqlast::WildcardAdditionalOptions) -> DbResult<()> {
    let has_options = options.opt_exclude.is_some()
        || options.opt_except.is_some()
        || options.opt_rename.is_some()
        || options.opt_replace.is_some();
    if has_options {
        Err(DbError::Parser("wildcard options not supported".into()))
    } else {
        Ok(())
    }
}
