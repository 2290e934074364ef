use super::*;
use common::CompareOp;
use proptest::prelude::*;
use std::time::Duration;

fn test_config(page_capacity: usize) -> Config {
    Config::builder()
        .page_capacity(page_capacity)
        .buffer_capacity(8)
        .page_fetch(Duration::ZERO)
        .build()
}

fn edge(c1: i64, c2: i64) -> Record {
    let mut rec = Record::new();
    rec.set("c1", Value::Int(c1));
    rec.set("c2", Value::Int(c2));
    rec
}

fn edges(pairs: &[(i64, i64)]) -> Vec<Record> {
    pairs.iter().map(|(a, b)| edge(*a, *b)).collect()
}

fn catalog_with(pairs: &[(i64, i64)], page_capacity: usize) -> Catalog {
    let mut cat = Catalog::new(test_config(page_capacity));
    cat.add_table("a", vec!["c1".into(), "c2".into()]).unwrap();
    cat.insert_records("a", edges(pairs)).unwrap();
    cat
}

#[test]
fn add_table_rejects_duplicates() {
    let mut cat = Catalog::new(test_config(4));
    cat.add_table("a", vec!["c1".into()]).unwrap();
    let err = cat.add_table("a", vec!["c1".into()]).unwrap_err();
    assert!(format!("{err}").contains("already exists"));
}

#[test]
fn fresh_table_has_one_empty_page() {
    let mut cat = Catalog::new(test_config(4));
    cat.add_table("a", vec!["c1".into()]).unwrap();
    assert_eq!(cat.table("a").unwrap().page_ids.len(), 1);
    assert_eq!(cat.entry_count("a").unwrap(), 0);
}

#[test]
fn insert_assigns_ids_with_table_prefix() {
    let cat = catalog_with(&[(1, 2)], 4);
    let page = cat.table("a").unwrap().page_ids[0];
    let rec = cat.store.page(page).unwrap().record(0).unwrap().clone();
    match rec.id() {
        Some(Value::Text(id)) => assert!(id.starts_with("a:")),
        other => panic!("expected generated text id, got {other:?}"),
    }
}

#[test]
fn inserts_spill_into_new_pages() {
    let mut cat = catalog_with(&[], 2);
    cat.insert_records("a", edges(&[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]))
        .unwrap();
    assert_eq!(cat.table("a").unwrap().page_ids.len(), 3);
    assert_eq!(cat.entry_count("a").unwrap(), 5);
}

#[test]
fn scan_visits_every_record_once_in_insertion_order() {
    let mut cat = catalog_with(&[(1, 10), (2, 20), (3, 30)], 2);
    let mut scan = cat.scan("a").unwrap();
    let seen: Vec<i64> = drain(&mut scan, &mut cat)
        .unwrap()
        .iter()
        .map(|r| match r.get("c1") {
            Some(Value::Int(n)) => *n,
            other => panic!("bad c1: {other:?}"),
        })
        .collect();
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn unique_insert_skips_existing_ids_and_keeps_index_current() {
    let mut cat = Catalog::new(test_config(4));
    cat.add_table("t", vec!["c1".into()]).unwrap();

    let mut first = Record::new();
    first.set("c1", Value::Int(1));
    first.set_id("k1");
    let mut dup = first.clone();
    dup.set("c1", Value::Int(99));
    let mut second = Record::new();
    second.set("c1", Value::Int(2));
    second.set_id("k2");

    let accepted = cat
        .insert_unique_records_by_id("t", vec![first, dup, second])
        .unwrap();
    assert_eq!(accepted, 2);
    assert_eq!(cat.entry_count("t").unwrap(), 2);
    assert!(cat.has_value("t", ID_COL, &Value::Text("k1".into())).unwrap());
    assert!(cat.has_value("t", ID_COL, &Value::Text("k2".into())).unwrap());
}

#[test]
fn clear_table_keeps_pages_but_drops_indexes() {
    let mut cat = catalog_with(&[(1, 2), (3, 4)], 2);
    cat.hash_table("a", "c1", true).unwrap();
    assert!(cat.is_table_hashed("a", "c1"));

    let pages_before = cat.table("a").unwrap().page_ids.clone();
    cat.clear_table("a").unwrap();

    assert_eq!(cat.table("a").unwrap().page_ids, pages_before);
    assert_eq!(cat.entry_count("a").unwrap(), 0);
    assert!(!cat.is_table_hashed("a", "c1"));
}

#[test]
fn drop_table_releases_pages() {
    let mut cat = catalog_with(&[(1, 2)], 2);
    let pages = cat.table("a").unwrap().page_ids.clone();
    cat.drop_table("a").unwrap();
    assert!(!cat.has_table("a"));
    for page in pages {
        assert!(cat.store.page(page).is_err());
    }
}

#[test]
fn hash_lookup_uses_loose_equality() {
    let mut cat = Catalog::new(test_config(4));
    cat.add_table("t", vec!["c1".into()]).unwrap();
    let mut rec = Record::new();
    rec.set("c1", Value::Text("3".into()));
    cat.insert_records("t", vec![rec]).unwrap();
    cat.hash_table("t", "c1", true).unwrap();

    assert!(cat.has_value("t", "c1", &Value::Int(3)).unwrap());
    assert!(!cat.has_value("t", "c1", &Value::Int(4)).unwrap());
}

#[test]
fn has_value_without_index_is_a_programmer_error() {
    let cat = catalog_with(&[(1, 2)], 4);
    let err = cat.has_value("a", "c1", &Value::Int(1)).unwrap_err();
    assert!(format!("{err}").contains("no hash index"));
}

#[test]
fn index_scan_eq_returns_matching_records() {
    let mut cat = catalog_with(&[(1, 2), (1, 3), (2, 4)], 2);
    cat.hash_table("a", "c1", true).unwrap();
    let mut scan = cat.index_scan("a", "c1", CompareOp::Eq, &Value::Int(1)).unwrap();
    let recs = drain(&mut scan, &mut cat).unwrap();
    assert_eq!(recs.len(), 2);
    for rec in recs {
        assert_eq!(rec.get("c1"), Some(&Value::Int(1)));
    }
}

#[test]
fn index_scan_gt_concatenates_higher_keys() {
    let mut cat = catalog_with(&[(1, 0), (5, 0), (9, 0), (3, 0)], 2);
    cat.hash_table("a", "c1", true).unwrap();
    let mut scan = cat.index_scan("a", "c1", CompareOp::Gt, &Value::Int(3)).unwrap();
    let mut seen: Vec<i64> = drain(&mut scan, &mut cat)
        .unwrap()
        .iter()
        .map(|r| match r.get("c1") {
            Some(Value::Int(n)) => *n,
            other => panic!("bad c1: {other:?}"),
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![5, 9]);
}

#[test]
fn index_scan_miss_is_an_empty_stream() {
    let mut cat = catalog_with(&[(1, 2)], 4);
    cat.hash_table("a", "c1", true).unwrap();
    let mut scan = cat.index_scan("a", "c1", CompareOp::Eq, &Value::Int(42)).unwrap();
    assert!(drain(&mut scan, &mut cat).unwrap().is_empty());
}

#[test]
fn filter_scan_applies_predicate_lazily() {
    let mut cat = catalog_with(&[(1, 2), (2, 1), (3, 5)], 2);
    let mut scan = cat
        .filter_scan(
            "a",
            Box::new(|rec| match (rec.get("c1"), rec.get("c2")) {
                (Some(a), Some(b)) => b.loose_cmp(a) == std::cmp::Ordering::Greater,
                _ => false,
            }),
        )
        .unwrap();
    let recs = drain(&mut scan, &mut cat).unwrap();
    assert_eq!(recs.len(), 2);
}

#[test]
fn copy_into_sorted_table_orders_by_key() {
    let mut cat = catalog_with(&[(3, 0), (1, 0), (2, 0)], 2);
    cat.copy_into_sorted_table("a", "c1", "sorted").unwrap();

    let mut scan = cat.scan("sorted").unwrap();
    let seen: Vec<i64> = drain(&mut scan, &mut cat)
        .unwrap()
        .iter()
        .map(|r| match r.get("c1") {
            Some(Value::Int(n)) => *n,
            other => panic!("bad c1: {other:?}"),
        })
        .collect();
    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(cat.table_columns("sorted").unwrap(), vec!["c1", "c2"]);
}

#[test]
fn scans_survive_concurrent_inserts_into_the_same_table() {
    let mut cat = catalog_with(&[(1, 0), (2, 0)], 2);
    let mut scan = cat.scan("a").unwrap();
    let mut seen = 0;
    while let Some(_rec) = scan.next(&mut cat).unwrap() {
        // Growing the table mid-scan must not disturb the snapshot.
        cat.insert_records("a", edges(&[(90 + seen, 0)])).unwrap();
        seen += 1;
    }
    assert!(seen >= 2);
    assert_eq!(cat.entry_count("a").unwrap(), 2 + seen as usize);
}

proptest! {
    // Free-space queue: after any write pattern, the repaired top is at
    // least as free as every page in the table.
    #[test]
    fn free_space_top_dominates(batches in prop::collection::vec(1usize..12, 1..8)) {
        let mut cat = Catalog::new(test_config(5));
        cat.add_table("t", vec!["c1".into()]).unwrap();
        for (i, batch) in batches.iter().enumerate() {
            let recs = (0..*batch).map(|j| {
                let mut rec = Record::new();
                rec.set("c1", Value::Int((i * 100 + j) as i64));
                rec
            }).collect();
            cat.insert_records("t", recs).unwrap();

            let (top_page, top_spaces) = cat.take_most_free("t").unwrap().expect("heap non-empty");
            for page in &cat.table("t").unwrap().page_ids.clone() {
                prop_assert!(top_spaces >= cat.store.page(*page).unwrap().spaces_left());
            }
            cat.push_free_entry("t", top_page, top_spaces).unwrap();
        }
    }

    // Unique-by-id: whatever the mix of fresh and duplicate ids, the table
    // never holds two records with the same identity.
    #[test]
    fn unique_by_id_is_a_set(ids in prop::collection::vec(0u8..16, 1..40)) {
        let mut cat = Catalog::new(test_config(3));
        cat.add_table("t", vec!["c1".into()]).unwrap();
        for (i, id) in ids.iter().enumerate() {
            let mut rec = Record::new();
            rec.set("c1", Value::Int(i as i64));
            rec.set_id(format!("id{id}"));
            cat.insert_unique_records_by_id("t", vec![rec]).unwrap();
        }
        let mut scan = cat.scan("t").unwrap();
        let mut seen_ids: Vec<String> = drain(&mut scan, &mut cat).unwrap()
            .iter()
            .map(|r| match r.id() {
                Some(Value::Text(id)) => id.clone(),
                other => panic!("bad id: {other:?}"),
            })
            .collect();
        let total = seen_ids.len();
        seen_ids.sort();
        seen_ids.dedup();
        prop_assert_eq!(seen_ids.len(), total);
    }

    // Page accounting: capacity = held + free on every page, at any point.
    #[test]
    fn page_capacity_accounting(batch in 1usize..40) {
        let mut cat = Catalog::new(test_config(7));
        cat.add_table("t", vec!["c1".into()]).unwrap();
        let recs = (0..batch).map(|i| {
            let mut rec = Record::new();
            rec.set("c1", Value::Int(i as i64));
            rec
        }).collect();
        cat.insert_records("t", recs).unwrap();
        for page in &cat.table("t").unwrap().page_ids.clone() {
            let page = cat.store.page(*page).unwrap();
            prop_assert_eq!(page.len() + page.spaces_left(), 7);
        }
        prop_assert_eq!(cat.entry_count("t").unwrap(), batch);
    }
}
