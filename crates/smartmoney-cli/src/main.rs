//! smartmoney: operator CLI for the smart money intelligence pipeline.
//!
//! Usage:
//!   smartmoney refresh <source>       Run a single collector now
//!   smartmoney refresh-all            Run the full pipeline
//!   smartmoney rank [--min-score F]   Re-rank from cached artifacts
//!   smartmoney db-status              Print columnar store status JSON
//!   smartmoney db-refresh             Force-reload all tables
//!
//! `DATA_DIR` selects the cache root (default `data`), `DATABASE_URL` the
//! columnar store path.

use anyhow::Context;
use cache_store::CacheStore;
use clap::{Parser, Subcommand};
use columnar_store::ColumnarStore;
use refresh_pipeline::RefreshPipeline;
use signal_core::config::{Config, RANKING_V3_FILE};
use signal_core::{Clock, RankingV3Artifact, SignalError};

/// Exit codes for `refresh <source>`.
const EXIT_OK: i32 = 0;
const EXIT_PARTIAL: i32 = 1;
const EXIT_FETCH_FAIL: i32 = 2;
const EXIT_PARSE_FAIL: i32 = 3;

#[derive(Parser)]
#[command(name = "smartmoney", about = "Smart money intelligence pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single collector from its raw input
    Refresh {
        /// Source name (congress, ark, darkpool, institutions, insiders,
        /// short_interest, superinvestors)
        source: String,
    },
    /// Run the full pipeline: collectors → engines → ranker → columnar
    RefreshAll,
    /// Re-run the scoring engines and ranker from cached artifacts
    Rank {
        /// Drop ranked tickers below this score
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        /// How many top tickers to print
        #[arg(long, default_value_t = 15)]
        top: usize,
    },
    /// Print columnar store status JSON
    DbStatus,
    /// Force-reload all columnar tables from the JSON artifacts
    DbRefresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartmoney=info,refresh_pipeline=info,collectors=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let cache = CacheStore::new(&config.data_dir)
        .with_context(|| format!("cannot open cache dir {}", config.data_dir.display()))?;
    let pipeline = RefreshPipeline::new(cache.clone(), Clock::now());

    let exit_code = match cli.command {
        Command::Refresh { source } => match pipeline.run_collector(&source) {
            Ok(report) => {
                println!(
                    "{}: {} records ({} skipped)",
                    report.source, report.records, report.skipped
                );
                EXIT_OK
            }
            Err(e @ SignalError::InputMissing(_)) => {
                eprintln!("{source}: {e}");
                EXIT_FETCH_FAIL
            }
            Err(e @ SignalError::InputMalformed(_)) => {
                eprintln!("{source}: {e}");
                EXIT_PARSE_FAIL
            }
            Err(e) => {
                eprintln!("{source}: {e}");
                EXIT_PARSE_FAIL
            }
        },

        Command::RefreshAll => {
            let columnar = open_columnar(&config, &cache).await;
            let summary = pipeline.run_all(columnar.as_ref()).await;
            for (source, ok, records) in &summary.sources {
                let mark = if *ok { "ok" } else { "skipped" };
                println!("{source:<16} {mark:<8} {records} records");
            }
            println!("ranked: {} tickers", summary.ranked);
            if summary.partial {
                EXIT_PARTIAL
            } else {
                EXIT_OK
            }
        }

        Command::Rank { min_score, top } => {
            let ranked = pipeline.rank(min_score)?;
            println!("{ranked} tickers ranked (min score {min_score})");

            let artifact: RankingV3Artifact = cache.read_as(RANKING_V3_FILE);
            println!("{:>3}  {:<7} {:>6}  {:>6}  {:<9}  sources", "#", "ticker", "v7", "v2", "dir");
            for (i, s) in artifact.signals.iter().take(top).enumerate() {
                let sources: Vec<&str> = s
                    .sources
                    .iter()
                    .map(|src| src.as_str())
                    .collect();
                println!(
                    "{:>3}. {:<7} {:>6.1}  {:>6.1}  {:<9}  {}",
                    i + 1,
                    s.ticker,
                    s.score,
                    s.v2_score,
                    format!("{:?}", s.direction).to_lowercase(),
                    sources.join(",")
                );
            }
            EXIT_OK
        }

        Command::DbStatus => {
            let store = ColumnarStore::connect(&config.db_path, cache.clone())
                .await
                .context("cannot open columnar store")?;
            let status = store.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            EXIT_OK
        }

        Command::DbRefresh => {
            let store = ColumnarStore::connect(&config.db_path, cache.clone())
                .await
                .context("cannot open columnar store")?;
            let counts = store.refresh_all().await;
            for (table, count) in &counts {
                println!("{table:<24} {count} rows");
            }
            EXIT_OK
        }
    };

    if exit_code != EXIT_OK {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// The columnar store is best-effort: a locked or unopenable database must
/// not block a refresh.
async fn open_columnar(config: &Config, cache: &CacheStore) -> Option<ColumnarStore> {
    match ColumnarStore::connect(&config.db_path, cache.clone()).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!("columnar store unavailable, continuing on JSON: {e}");
            None
        }
    }
}
