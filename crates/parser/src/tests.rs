use super::*;
use common::CompareOp;
use pretty_assertions::assert_eq;

const REFLEXIVE: &str = "WITH RECURSIVE t(c1, c2) AS (\
  SELECT * FROM a UNION SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2\
) SELECT * INTO n FROM t;";

#[test]
fn parses_the_reflexive_closure_query() {
    let queries = parse_queries(REFLEXIVE).unwrap();
    assert_eq!(queries.len(), 1);
    let q = &queries[0];

    assert_eq!(q.with_decl.name, "t");
    assert_eq!(q.with_decl.cols, vec!["c1", "c2"]);
    assert_eq!(q.result_table, "n");

    assert_eq!(q.nonrec_term.cols, vec![Column::All]);
    assert_eq!(q.nonrec_term.tables, vec!["a"]);
    assert!(q.nonrec_term.ops.is_empty());

    assert_eq!(
        q.rec_term.cols,
        vec![
            Column::Ref(ColumnRef::new("a", "c1")),
            Column::Ref(ColumnRef::new("t", "c2")),
        ]
    );
    assert_eq!(q.rec_term.tables, vec!["a", "t"]);
    assert_eq!(q.rec_term.ops.len(), 1);
    let op = &q.rec_term.ops[0];
    assert_eq!(op.lhs, ColumnRef::new("t", "c1"));
    assert_eq!(op.op, CompareOp::Eq);
    assert_eq!(op.rhs, Operand::Column(ColumnRef::new("a", "c2")));
}

#[test]
fn parses_and_chains_and_literals() {
    let sql = "WITH RECURSIVE t(c1, c2) AS (\
      SELECT * FROM a WHERE a.c1 > 3 AND a.c2 = 'x'\
      UNION SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2 AND t.c2 > t.c1\
    ) SELECT * INTO out FROM t;";
    let q = &parse_queries(sql).unwrap()[0];

    assert_eq!(q.nonrec_term.ops.len(), 2);
    assert_eq!(q.nonrec_term.ops[0].rhs, Operand::Literal(Value::Int(3)));
    assert_eq!(
        q.nonrec_term.ops[1].rhs,
        Operand::Literal(Value::Text("x".into()))
    );
    assert_eq!(q.rec_term.ops.len(), 2);
}

#[test]
fn lowers_multiple_statements_in_order() {
    let sql = format!("{REFLEXIVE}\n{}", REFLEXIVE.replace("INTO n", "INTO m"));
    let queries = parse_queries(&sql).unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].result_table, "n");
    assert_eq!(queries[1].result_table, "m");
}

#[test]
fn identifiers_are_lowercased() {
    let sql = "WITH RECURSIVE T(C1) AS (\
      SELECT * FROM A UNION SELECT A.C1 FROM A, T WHERE T.C1 = A.C1\
    ) SELECT * INTO N FROM T;";
    let q = &parse_queries(sql).unwrap()[0];
    assert_eq!(q.with_decl.name, "t");
    assert_eq!(q.with_decl.cols, vec!["c1"]);
    assert_eq!(q.result_table, "n");
    assert_eq!(q.rec_term.tables, vec!["a", "t"]);
}

#[test]
fn rejects_non_recursive_with() {
    let sql = "WITH t(c1) AS (SELECT * FROM a UNION SELECT a.c1 FROM a) \
               SELECT * INTO n FROM t;";
    let err = parse_queries(sql).unwrap_err();
    assert!(format!("{err}").contains("RECURSIVE"));
}

#[test]
fn rejects_unsupported_operators() {
    let sql = "WITH RECURSIVE t(c1) AS (\
      SELECT * FROM a UNION SELECT a.c1 FROM a, t WHERE t.c1 < a.c1\
    ) SELECT * INTO n FROM t;";
    let err = parse_queries(sql).unwrap_err();
    assert!(format!("{err}").contains("unsupported operator"));
}

#[test]
fn rejects_unqualified_columns_in_conditions() {
    let sql = "WITH RECURSIVE t(c1) AS (\
      SELECT * FROM a UNION SELECT a.c1 FROM a, t WHERE c1 = a.c1\
    ) SELECT * INTO n FROM t;";
    let err = parse_queries(sql).unwrap_err();
    assert!(format!("{err}").contains("qualified"));
}

#[test]
fn rejects_union_all() {
    let sql = "WITH RECURSIVE t(c1) AS (\
      SELECT * FROM a UNION ALL SELECT a.c1 FROM a, t\
    ) SELECT * INTO n FROM t;";
    assert!(parse_queries(sql).is_err());
}

#[test]
fn rejects_missing_into() {
    let sql = "WITH RECURSIVE t(c1) AS (\
      SELECT * FROM a UNION SELECT a.c1 FROM a, t\
    ) SELECT * FROM t;";
    let err = parse_queries(sql).unwrap_err();
    assert!(format!("{err}").contains("INTO"));
}

#[test]
fn rejects_plain_statements() {
    assert!(parse_queries("SELECT * FROM a;").is_err());
    assert!(parse_queries("CREATE TABLE a (c1 INT);").is_err());
}
