use catalog::{Catalog, drain};
use common::{Config, Record};
use std::collections::BTreeSet;
use std::time::Duration;
use types::Value;

/// Engine config for tests: tiny pages, no simulated latency.
pub fn quick_config() -> Config {
    Config::builder()
        .page_capacity(4)
        .buffer_capacity(8)
        .block_join_size(3)
        .page_fetch(Duration::ZERO)
        .build()
}

/// A `(c1, c2)` record.
pub fn edge(c1: i64, c2: i64) -> Record {
    let mut rec = Record::new();
    rec.set("c1", Value::Int(c1));
    rec.set("c2", Value::Int(c2));
    rec
}

/// Create an edge table and load it.
pub fn edge_table(cat: &mut Catalog, name: &str, pairs: &[(i64, i64)]) {
    cat.add_table(name, vec!["c1".into(), "c2".into()])
        .expect("create edge table");
    cat.insert_records(name, pairs.iter().map(|(a, b)| edge(*a, *b)).collect())
        .expect("load edge table");
}

/// The `(c1, c2)` pairs currently in a table, as a set.
pub fn pairs_in(cat: &mut Catalog, table: &str) -> BTreeSet<(i64, i64)> {
    let mut scan = cat.scan(table).expect("scan table");
    drain(&mut scan, cat)
        .expect("drain table")
        .iter()
        .map(|rec| match (rec.get("c1"), rec.get("c2")) {
            (Some(Value::Int(a)), Some(Value::Int(b))) => (*a, *b),
            other => panic!("not an int edge: {other:?}"),
        })
        .collect()
}
