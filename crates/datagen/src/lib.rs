//! Synthetic datasets for the benchmark drivers.
//!
//! CSV ingestion follows the fixed contract: UTF-8, LF or CRLF line ends,
//! comma-separated, no quoting, no header. Columns are named `c1..cN` and
//! every row's `_id` is the JSON of the row itself, assigned before the
//! scale cut. The graph and permutation generators produce edge tables with
//! the same `c1, c2` shape the benchmark queries expect.

use common::{DbResult, Record};
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::Path;
use types::Value;

/// Loaded or generated table data: declared columns plus rows.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

/// Parse CSV text, keeping the first `round(n * scale / 100)` rows.
pub fn parse_csv(input: &str, scale: u32) -> DbResult<Dataset> {
    let mut rows = Vec::new();
    let mut width = 0;
    for line in input.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        width = width.max(fields.len());
        let mut rec = Record::new();
        for (idx, raw) in fields.iter().enumerate() {
            rec.set(format!("c{}", idx + 1), Value::from_literal(raw));
        }
        // Row identity is the JSON of the full row, fixed before the cut.
        let id = rec.content_id();
        rec.set_id(id);
        rows.push(rec);
    }

    let keep = scale_cut(rows.len(), scale);
    rows.truncate(keep);
    Ok(Dataset {
        columns: (1..=width).map(|idx| format!("c{idx}")).collect(),
        rows,
    })
}

/// Load and scale-cut a CSV file.
pub fn load_csv_file(path: &Path, scale: u32) -> DbResult<Dataset> {
    let text = std::fs::read_to_string(path)?;
    parse_csv(&text, scale)
}

/// How many of `n` rows a scale percentage keeps.
pub fn scale_cut(n: usize, scale: u32) -> usize {
    ((n as f64) * f64::from(scale) / 100.0).round() as usize
}

fn edge(c1: i64, c2: i64) -> Record {
    let mut rec = Record::new();
    rec.set("c1", Value::Int(c1));
    rec.set("c2", Value::Int(c2));
    rec
}

/// `n` uniform random edges over the nodes `1..=n`.
pub fn random_graph<R: Rng>(n: usize, rng: &mut R) -> Dataset {
    let n = n.max(1);
    let rows = (0..n)
        .map(|_| {
            edge(
                rng.gen_range(1..=n as i64),
                rng.gen_range(1..=n as i64),
            )
        })
        .collect();
    Dataset {
        columns: vec!["c1".into(), "c2".into()],
        rows,
    }
}

/// The pairs `(i, p(i))` of a random permutation `p` of `1..=n`.
pub fn random_permutation<R: Rng>(n: usize, rng: &mut R) -> Dataset {
    let mut targets: Vec<i64> = (1..=n as i64).collect();
    targets.shuffle(rng);
    let rows = targets
        .into_iter()
        .enumerate()
        .map(|(idx, target)| edge(idx as i64 + 1, target))
        .collect();
    Dataset {
        columns: vec!["c1".into(), "c2".into()],
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Write;

    #[test]
    fn csv_rows_get_default_columns_and_json_ids() {
        let data = parse_csv("1,2\n3,x\n", 100).unwrap();
        assert_eq!(data.columns, vec!["c1", "c2"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].get("c1"), Some(&Value::Int(1)));
        assert_eq!(data.rows[1].get("c2"), Some(&Value::Text("x".into())));
        assert_eq!(
            data.rows[0].id(),
            Some(&Value::Text(r#"{"c1":1,"c2":2}"#.into()))
        );
    }

    #[test]
    fn crlf_lines_parse_cleanly() {
        let data = parse_csv("1,2\r\n3,4\r\n", 100).unwrap();
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[1].get("c2"), Some(&Value::Int(4)));
    }

    #[test]
    fn scale_keeps_a_rounded_prefix() {
        assert_eq!(scale_cut(10, 25), 3); // round(2.5) = 3
        assert_eq!(scale_cut(10, 10), 1);
        assert_eq!(scale_cut(3, 50), 2); // round(1.5) = 2
        assert_eq!(scale_cut(0, 100), 0);

        let data = parse_csv("1,1\n2,2\n3,3\n4,4\n", 50).unwrap();
        let first: Vec<_> = data.rows.iter().map(|r| r.get("c1").cloned()).collect();
        assert_eq!(first, vec![Some(Value::Int(1)), Some(Value::Int(2))]);
    }

    #[test]
    fn csv_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "5,6\n7,8\n").unwrap();
        let data = load_csv_file(file.path(), 100).unwrap();
        assert_eq!(data.rows.len(), 2);
    }

    #[test]
    fn permutation_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = random_permutation(8, &mut rng);
        assert_eq!(data.rows.len(), 8);
        let mut targets: Vec<i64> = data
            .rows
            .iter()
            .map(|rec| match rec.get("c2") {
                Some(Value::Int(n)) => *n,
                other => panic!("bad target: {other:?}"),
            })
            .collect();
        targets.sort_unstable();
        assert_eq!(targets, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn graph_edges_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let data = random_graph(16, &mut rng);
        assert_eq!(data.rows.len(), 16);
        for rec in &data.rows {
            for col in ["c1", "c2"] {
                match rec.get(col) {
                    Some(Value::Int(n)) => assert!((1..=16).contains(n)),
                    other => panic!("bad endpoint: {other:?}"),
                }
            }
        }
    }
}
