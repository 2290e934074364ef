//! `recsql`: benchmark drivers comparing the standard and optimized
//! evaluation strategies over synthetic datasets.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use catalog::Catalog;
use clap::{Parser, Subcommand};
use common::Config;
use datagen::Dataset;
use executor::{Strategy, execute_query};
use ir::Query;
use tabled::{Table, Tabled};
use tracing::info;

/// CSV benchmark queries, selected by `--query-number` (1-based).
const BENCH_QUERIES: &[&str] = &[
    "WITH RECURSIVE t(c1, c2) AS (
       SELECT * FROM a UNION SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2
     ) SELECT * INTO n FROM t;",
    "WITH RECURSIVE t(c1, c2) AS (
       SELECT * FROM a
       UNION
       SELECT a.c1, t.c2 FROM a, t
       WHERE t.c1 = a.c2 AND t.c2 > t.c1 AND a.c2 > a.c1
     ) SELECT * INTO n FROM t;",
];

/// Transitive closure over strictly increasing pairs, used by the graph and
/// order drivers.
const ORDERED_QUERY: &str = BENCH_QUERIES[1];

#[derive(Parser)]
#[command(name = "recsql", about = "Recursive SQL engine benchmark drivers")]
struct Cli {
    /// Simulated page fetch latency in milliseconds.
    #[arg(long, default_value_t = 0.1)]
    fetch_ms: f64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a CSV benchmark batch at every configured scale.
    Benchmark {
        #[arg(long)]
        batch_number: u32,
        #[arg(long)]
        query_number: usize,
        /// Directory holding `batch{N}.csv` files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Run the ordered query over a random graph of `n` edges.
    Graph {
        #[arg(long)]
        n: usize,
    },
    /// Run the ordered query over a random permutation.
    Order {
        #[arg(long, default_value_t = 64)]
        n: usize,
    },
}

#[derive(Tabled)]
struct BenchRow {
    scale: u32,
    strategy: &'static str,
    rows: usize,
    passes: usize,
    mean_ms: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::builder()
        .page_fetch(Duration::from_secs_f64(cli.fetch_ms / 1000.0))
        .build();

    match cli.command {
        Command::Benchmark {
            batch_number,
            query_number,
            data_dir,
        } => {
            let sql = *query_number
                .checked_sub(1)
                .and_then(|idx| BENCH_QUERIES.get(idx))
                .with_context(|| {
                    format!(
                        "query number must be in 1..={}, got {query_number}",
                        BENCH_QUERIES.len()
                    )
                })?;
            let path = data_dir.join(format!("batch{batch_number}.csv"));
            let full = datagen::load_csv_file(&path, 100)
                .with_context(|| format!("loading {}", path.display()))?;
            run_benchmark(&config, sql, |scale| {
                let keep = datagen::scale_cut(full.rows.len(), scale);
                Dataset {
                    columns: full.columns.clone(),
                    rows: full.rows[..keep].to_vec(),
                }
            })
        }
        Command::Graph { n } => {
            if n == 0 {
                bail!("--n must be positive");
            }
            let full = datagen::random_graph(n, &mut rand::thread_rng());
            run_benchmark(&config, ORDERED_QUERY, |scale| {
                let keep = datagen::scale_cut(full.rows.len(), scale);
                Dataset {
                    columns: full.columns.clone(),
                    rows: full.rows[..keep].to_vec(),
                }
            })
        }
        Command::Order { n } => {
            if n == 0 {
                bail!("--n must be positive");
            }
            let full = datagen::random_permutation(n, &mut rand::thread_rng());
            run_benchmark(&config, ORDERED_QUERY, |scale| {
                let keep = datagen::scale_cut(full.rows.len(), scale);
                Dataset {
                    columns: full.columns.clone(),
                    rows: full.rows[..keep].to_vec(),
                }
            })
        }
    }
}

fn run_benchmark(
    config: &Config,
    sql: &str,
    dataset_at: impl Fn(u32) -> Dataset,
) -> Result<()> {
    let queries = parser::parse_queries(sql)?;
    let query = queries
        .first()
        .context("benchmark SQL contains no query")?;

    let mut report = Vec::new();
    for &scale in &config.scales {
        let dataset = dataset_at(scale);
        info!(scale, rows = dataset.rows.len(), "benchmarking scale");
        for (strategy, label) in [
            (Strategy::Standard, "standard"),
            (Strategy::Optimized, "optimized"),
        ] {
            let mut times = Vec::new();
            let mut rows = 0;
            let mut passes = 0;
            for _ in 0..config.runs {
                let (elapsed, outcome) = timed_run(config, &dataset, query, strategy)?;
                times.push(elapsed);
                rows = outcome.rows;
                passes = outcome.passes;
            }
            // The first run warms nothing persistent but is discarded to
            // match how the benchmarks are reported.
            let measured = if times.len() > 1 { &times[1..] } else { &times[..] };
            let mean = measured.iter().sum::<Duration>() / measured.len() as u32;
            report.push(BenchRow {
                scale,
                strategy: label,
                rows,
                passes,
                mean_ms: format!("{:.3}", mean.as_secs_f64() * 1000.0),
            });
        }
    }

    println!("{}", Table::new(report));
    Ok(())
}

fn timed_run(
    config: &Config,
    dataset: &Dataset,
    query: &Query,
    strategy: Strategy,
) -> Result<(Duration, executor::QueryRun)> {
    let mut cat = Catalog::new(config.clone());
    cat.add_table("a", dataset.columns.clone())?;
    cat.insert_records("a", dataset.rows.clone())?;

    let start = Instant::now();
    let outcome = execute_query(&mut cat, query, strategy)?;
    let elapsed = start.elapsed();

    cat.drop_all_tables()?;
    Ok((elapsed, outcome))
}
