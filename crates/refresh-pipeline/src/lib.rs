//! Refresh orchestration.
//!
//! One pass runs every collector whose raw input is present, then the
//! scoring engines, then the confluence ranker, writes the ranking
//! artifacts, nudges the columnar store, and appends refresh-log rows.
//!
//! Per-source failures are logged and the pass continues with the
//! remaining sources. A ranker failure leaves the previous ranking
//! artifact on disk untouched (atomic cache writes).
//!
//! Raw inputs live in a drop-box directory fed by the fetchers:
//!
//!   raw/congress.json        array of provider rows
//!   raw/ark_snapshots.json   { etf → holdings snapshot }
//!   raw/regsho/              pipe-delimited day files
//!   raw/institutions.json    { cik → raw filing }
//!   raw/insiders.json        { trades: [...], clusters?: [...] }
//!   raw/short_interest.json  { records: [...], float_data?: {...} }
//!   raw/superinvestors.json  { aggregate, per_manager, holdings }

use cache_store::CacheStore;
use collectors::ark::{ArkCollector, ArkSnapshot};
use collectors::congress::CongressCollector;
use collectors::darkpool::DarkPoolCollector;
use collectors::insiders::InsidersCollector;
use collectors::institutions::{InstitutionsCollector, RawInstitutionFiling};
use collectors::short_interest::{FloatData, RawShortInterest, ShortInterestCollector};
use collectors::superinvestors::{
    RawAggregateActivity, RawManagerActivity, SuperinvestorsCollector,
};
use collectors::CollectorReport;
use columnar_store::ColumnarStore;
use confluence_ranker::DirectionInputs;
use conviction_engine::formula::FormulaInputs;
use conviction_engine::{ConvictionEngine, FormulaEngine, SourceData};
use serde::Deserialize;
use serde_json::Value;
use signal_core::config::{
    ARK_HOLDINGS_FILE, ARK_TRADES_FILE, CONGRESS_FILE, DARKPOOL_FILE, INSIDERS_FILE,
    INSTITUTIONS_FILE, RANKING_V1_FILE, RANKING_V2_FILE, RANKING_V3_FILE, REFRESH_LOG_FILE,
    SHORT_INTEREST_FILE, SUPERINVESTORS_FILE,
};
use signal_core::{Clock, RefreshLog, RefreshStatus, Result, SignalError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// All ingestable sources in refresh order.
pub const SOURCES: [&str; 7] = [
    "congress",
    "ark",
    "darkpool",
    "institutions",
    "insiders",
    "short_interest",
    "superinvestors",
];

/// Result of one full refresh pass.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    /// Per-source (name, ok, records).
    pub sources: Vec<(String, bool, usize)>,
    pub ranked: usize,
    pub partial: bool,
}

pub struct RefreshPipeline {
    cache: CacheStore,
    raw_dir: PathBuf,
    clock: Clock,
}

#[derive(Debug, Default, Deserialize)]
struct RawInsidersInput {
    #[serde(default)]
    trades: Vec<Value>,
    #[serde(default)]
    clusters: Option<Vec<signal_core::InsiderCluster>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawShortInterestInput {
    #[serde(default)]
    records: Vec<RawShortInterest>,
    #[serde(default)]
    float_data: std::collections::HashMap<String, FloatData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSuperinvestorsInput {
    #[serde(default)]
    aggregate: Vec<RawAggregateActivity>,
    #[serde(default)]
    per_manager: Vec<RawManagerActivity>,
    #[serde(default)]
    holdings: BTreeMap<String, signal_core::ManagerPortfolio>,
}

impl RefreshPipeline {
    pub fn new(cache: CacheStore, clock: Clock) -> Self {
        let raw_dir = cache.dir().join("raw");
        RefreshPipeline {
            cache,
            raw_dir,
            clock,
        }
    }

    pub fn with_raw_dir(mut self, raw_dir: impl Into<PathBuf>) -> Self {
        self.raw_dir = raw_dir.into();
        self
    }

    // ── Collectors ─────────────────────────────────────────────────────

    /// Run one collector by name from its raw input file. Errors are
    /// returned (for the single-source CLI); `run_all` downgrades them to
    /// log rows.
    pub fn run_collector(&self, source: &str) -> Result<CollectorReport> {
        let started = Instant::now();
        let result = self.dispatch_collector(source);
        self.log_step(source, &result, started);
        result
    }

    fn dispatch_collector(&self, source: &str) -> Result<CollectorReport> {
        match source {
            "congress" => {
                let records: Vec<Value> = self.read_raw("congress.json")?;
                CongressCollector::new(self.cache.clone()).run(&records)
            }
            "ark" => {
                let snapshots: BTreeMap<String, ArkSnapshot> =
                    self.read_raw("ark_snapshots.json")?;
                ArkCollector::new(self.cache.clone()).run(&snapshots)
            }
            "darkpool" => {
                let dir = self.raw_dir.join("regsho");
                if !dir.is_dir() {
                    return Err(SignalError::InputMissing(dir.display().to_string()));
                }
                DarkPoolCollector::new(self.cache.clone(), self.clock).run_from_dir(&dir, true)
            }
            "institutions" => {
                let filings: BTreeMap<String, RawInstitutionFiling> =
                    self.read_raw("institutions.json")?;
                InstitutionsCollector::new(self.cache.clone()).run(&filings)
            }
            "insiders" => {
                let input: RawInsidersInput = self.read_raw("insiders.json")?;
                InsidersCollector::new(self.cache.clone()).run(&input.trades, input.clusters)
            }
            "short_interest" => {
                let input: RawShortInterestInput = self.read_raw("short_interest.json")?;
                ShortInterestCollector::new(self.cache.clone())
                    .run(&input.records, &input.float_data)
            }
            "superinvestors" => {
                let input: RawSuperinvestorsInput = self.read_raw("superinvestors.json")?;
                SuperinvestorsCollector::new(self.cache.clone()).run(
                    &input.aggregate,
                    &input.per_manager,
                    input.holdings,
                )
            }
            other => Err(SignalError::InputMissing(format!("unknown source: {other}"))),
        }
    }

    fn read_raw<T: serde::de::DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.raw_dir.join(filename);
        if !path.is_file() {
            return Err(SignalError::InputMissing(path.display().to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| SignalError::InputMalformed(format!("{}: {e}", path.display())))
    }

    // ── Engines ────────────────────────────────────────────────────────

    /// Re-run the scoring engines and the ranker from the cached
    /// artifacts, writing all three ranking artifacts.
    pub fn rank(&self, min_score: f64) -> Result<usize> {
        let congress: signal_core::CongressArtifact = self.cache.read_as(CONGRESS_FILE);
        let ark_trades: signal_core::ArkTradesArtifact = self.cache.read_as(ARK_TRADES_FILE);
        let ark_holdings: signal_core::ArkHoldingsArtifact =
            self.cache.read_as(ARK_HOLDINGS_FILE);
        let darkpool: signal_core::DarkPoolArtifact = self.cache.read_as(DARKPOOL_FILE);
        let institutions: signal_core::InstitutionsArtifact =
            self.cache.read_as(INSTITUTIONS_FILE);
        let insiders: signal_core::InsidersArtifact = self.cache.read_as(INSIDERS_FILE);
        let superinvestors: signal_core::SuperinvestorsArtifact =
            self.cache.read_as(SUPERINVESTORS_FILE);

        // Formula engine output is kept for continuity with older readers.
        let formula = FormulaEngine::new(self.clock).with_min_score(0.0);
        let formula_inputs = FormulaInputs {
            congress: congress.clone(),
            ark_trades: ark_trades.clone(),
            darkpool: darkpool.clone(),
            institutions: institutions.clone(),
        };
        let v1_results = formula.generate(&formula_inputs, Some(0.0));
        let high_confidence = v1_results.iter().filter(|r| r.score >= 8.0).count();
        let avg_score = if v1_results.is_empty() {
            0.0
        } else {
            v1_results.iter().map(|r| r.score).sum::<f64>() / v1_results.len() as f64
        };
        self.cache.write(
            RANKING_V1_FILE,
            &serde_json::json!({
                "signals": v1_results,
                "metadata": {
                    "schema_version": "1.0.0",
                    "total_count": v1_results.len(),
                    "high_confidence": high_confidence,
                    "avg_score": (avg_score * 100.0).round() / 100.0,
                    "last_updated": now_iso(),
                },
            }),
        )?;

        // Conviction engine.
        let engine = ConvictionEngine::new(self.clock);
        let source_data = SourceData {
            congress: congress.clone(),
            ark_trades: ark_trades.clone(),
            ark_holdings,
            darkpool: darkpool.clone(),
            institutions: institutions.clone(),
            insiders: insiders.clone(),
        };
        let v2_signals = engine.generate(&source_data, 0.0);
        self.cache.write(
            RANKING_V2_FILE,
            &serde_json::json!({
                "signals": v2_signals,
                "metadata": {
                    "engine": "v2",
                    "total": v2_signals.len(),
                    "last_updated": now_iso(),
                },
            }),
        )?;

        // Confluence ranker on top.
        let direction_inputs = DirectionInputs {
            congress,
            ark_trades,
            insiders,
            superinvestors,
        };
        let directions = confluence_ranker::detect_directions(&direction_inputs);
        let ranked = confluence_ranker::rank(&v2_signals, &directions, min_score);
        let ranked_count = ranked.len();
        self.cache.write(
            RANKING_V3_FILE,
            &serde_json::json!({
                "signals": ranked,
                "metadata": {
                    "engine": "v3",
                    "algorithm": "v7",
                    "total": ranked_count,
                    "v2_total": v2_signals.len(),
                    "last_updated": now_iso(),
                },
            }),
        )?;

        tracing::info!(
            "ranking refreshed: {} conviction signals, {ranked_count} ranked",
            v2_signals.len()
        );
        Ok(ranked_count)
    }

    // ── Full pass ──────────────────────────────────────────────────────

    /// Run every collector whose raw input exists, then the engines, then
    /// a best-effort columnar refresh.
    pub async fn run_all(&self, columnar: Option<&ColumnarStore>) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        for source in SOURCES {
            match self.run_collector(source) {
                Ok(report) => {
                    summary
                        .sources
                        .push((source.to_string(), true, report.records));
                }
                Err(SignalError::InputMissing(what)) => {
                    tracing::warn!("{source}: no raw input ({what}), keeping previous artifact");
                    summary.sources.push((source.to_string(), false, 0));
                    summary.partial = true;
                }
                Err(e) => {
                    tracing::error!("{source}: collection failed: {e}");
                    summary.sources.push((source.to_string(), false, 0));
                    summary.partial = true;
                }
            }
        }

        let started = Instant::now();
        match self.rank(0.0) {
            Ok(ranked) => {
                summary.ranked = ranked;
                self.append_log(RefreshLog {
                    source: "ranking".to_string(),
                    status: RefreshStatus::Success,
                    records_count: ranked,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error_msg: None,
                    timestamp: now_iso(),
                });
            }
            Err(e) => {
                tracing::error!("ranking failed (previous artifacts remain): {e}");
                summary.partial = true;
                self.append_log(RefreshLog {
                    source: "ranking".to_string(),
                    status: RefreshStatus::Failed,
                    records_count: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error_msg: Some(e.to_string()),
                    timestamp: now_iso(),
                });
            }
        }

        if let Some(store) = columnar {
            let counts = store.refresh_all().await;
            tracing::info!("columnar store refreshed: {} tables", counts.len());
        }

        summary
    }

    fn log_step(&self, source: &str, result: &Result<CollectorReport>, started: Instant) {
        let row = match result {
            Ok(report) => RefreshLog {
                source: source.to_string(),
                status: RefreshStatus::Success,
                records_count: report.records,
                duration_ms: started.elapsed().as_millis() as u64,
                error_msg: None,
                timestamp: now_iso(),
            },
            Err(e) => RefreshLog {
                source: source.to_string(),
                status: RefreshStatus::Failed,
                records_count: 0,
                duration_ms: started.elapsed().as_millis() as u64,
                error_msg: Some(e.to_string()),
                timestamp: now_iso(),
            },
        };
        self.append_log(row);
    }

    fn append_log(&self, row: RefreshLog) {
        if let Err(e) = self.cache.append_jsonl(REFRESH_LOG_FILE, &row) {
            tracing::warn!("could not append refresh log: {e}");
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(reference: &str) -> (tempfile::TempDir, RefreshPipeline, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path().join("data")).unwrap();
        let pipeline = RefreshPipeline::new(cache.clone(), Clock::fixed(reference));
        (dir, pipeline, cache)
    }

    fn write_raw(dir: &tempfile::TempDir, name: &str, value: &Value) {
        let raw_dir = dir.path().join("data").join("raw");
        std::fs::create_dir_all(&raw_dir).unwrap();
        std::fs::write(raw_dir.join(name), serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn test_missing_raw_input_is_input_missing() {
        let (_dir, pipeline, _cache) = pipeline("2026-01-26");
        let err = pipeline.run_collector("congress").unwrap_err();
        assert!(matches!(err, SignalError::InputMissing(_)));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let (_dir, pipeline, _cache) = pipeline("2026-01-26");
        assert!(pipeline.run_collector("astrology").is_err());
    }

    #[test]
    fn test_collector_then_rank_end_to_end() {
        let (dir, pipeline, cache) = pipeline("2026-01-26");

        write_raw(
            &dir,
            "congress.json",
            &json!([{
                "Ticker": "NVDA",
                "Representative": "Nancy Pelosi",
                "Party": "D",
                "House": "Representatives",
                "Transaction": "Purchase",
                "Range": "$100,001 - $250,000",
                "TransactionDate": "2026-01-20",
                "ReportDate": "2026-01-22",
                "ExcessReturn": 5.2,
            }]),
        );

        let report = pipeline.run_collector("congress").unwrap();
        assert_eq!(report.records, 1);

        let ranked = pipeline.rank(0.0).unwrap();
        assert_eq!(ranked, 1);

        let v3: signal_core::RankingV3Artifact = cache.read_as(RANKING_V3_FILE);
        assert_eq!(v3.signals[0].ticker, "NVDA");
        assert!(v3.signals[0].score > 0.0);

        // Refresh log has rows for the collector and the ranking step.
        let log: Vec<RefreshLog> = cache.read_jsonl(REFRESH_LOG_FILE);
        assert!(log.iter().any(|r| r.source == "congress"));
    }

    #[tokio::test]
    async fn test_run_all_partial_on_missing_sources() {
        let (dir, pipeline, _cache) = pipeline("2026-01-26");
        write_raw(&dir, "congress.json", &json!([]));

        let summary = pipeline.run_all(None).await;
        assert!(summary.partial);
        let congress = summary.sources.iter().find(|(s, _, _)| s == "congress").unwrap();
        assert!(congress.1);
        let darkpool = summary.sources.iter().find(|(s, _, _)| s == "darkpool").unwrap();
        assert!(!darkpool.1);
    }

    // The canonical confluence example: a legislator buy six days back, an
    // ARK buy two days back, and a dark-pool anomaly one day back all on
    // NVDA. The formula engine lands at ≈8.45/10 and NVDA ranks first in
    // both the conviction and confluence outputs.
    #[test]
    fn test_confluence_example_all_engines() {
        let (_dir, pipeline, cache) = pipeline("2026-01-26");

        cache
            .write(
                CONGRESS_FILE,
                &json!({"trades": [{
                    "ticker": "NVDA", "representative": "Nancy Pelosi",
                    "party": "Democrat", "chamber": "House", "trade_type": "Buy",
                    "amount_range": "$100,001 - $250,000",
                    "amount_min": 100001.0, "amount_max": 250000.0,
                    "transaction_date": "2026-01-20", "filing_date": "2026-01-22",
                    "excess_return_pct": 5.2,
                }]}),
            )
            .unwrap();
        cache
            .write(
                ARK_TRADES_FILE,
                &json!({"trades": [{
                    "ticker": "NVDA", "etf": "ARKK", "trade_type": "Buy",
                    "date": "2026-01-24", "shares": 125000, "weight_pct": 2.3,
                    "change_type": "INCREASED",
                }]}),
            )
            .unwrap();
        cache
            .write(
                DARKPOOL_FILE,
                &json!({"tickers": [{
                    "ticker": "NVDA", "date": "2026-01-25",
                    "short_volume": 30000000, "total_volume": 45000000,
                    "dpi": 0.67, "dpi_30d_mean": 0.45, "dpi_30d_stddev": 0.08,
                    "z_score": 2.8, "z_score_window": 30, "is_anomaly": true,
                }]}),
            )
            .unwrap();
        // A weaker second ticker to make "first place" meaningful.
        cache
            .write(
                INSIDERS_FILE,
                &json!({"trades": [{
                    "ticker": "ZZZQ", "insider_name": "Pat Minor", "title": "Director",
                    "transaction_type": "Buy", "trade_date": "2026-01-25",
                    "value": 60000.0,
                }]}),
            )
            .unwrap();

        pipeline.rank(0.0).unwrap();

        // Formula engine check (0-10 scale, hand-rounded 8.46 historically).
        let v1 = cache.read(RANKING_V1_FILE).unwrap();
        let v1_signals = v1["signals"].as_array().unwrap();
        let nvda_v1 = v1_signals
            .iter()
            .find(|s| s["ticker"] == "NVDA")
            .unwrap();
        let v1_score = nvda_v1["score"].as_f64().unwrap();
        assert!((v1_score - 8.45).abs() <= 0.02, "v1 score {v1_score}");
        assert_eq!(nvda_v1["source_count"], 3);

        // Conviction engine puts NVDA first.
        let v2: signal_core::RankingV2Artifact = cache.read_as(RANKING_V2_FILE);
        assert_eq!(v2.signals[0].ticker, "NVDA");
        assert_eq!(v2.signals[0].source_count, 3);

        // Confluence ranker puts NVDA first too.
        let v3: signal_core::RankingV3Artifact = cache.read_as(RANKING_V3_FILE);
        assert_eq!(v3.signals[0].ticker, "NVDA");
        assert!(v3.signals[0].score > 0.0);
        assert!((0.0..=100.0).contains(&v3.signals[0].score));
    }

    // Same inputs, same outputs: the confluence artifact must be
    // byte-identical aside from the metadata timestamp.
    #[test]
    fn test_rank_deterministic() {
        let (_dir, pipeline, cache) = pipeline("2026-01-26");
        cache
            .write(
                CONGRESS_FILE,
                &json!({"trades": [{
                    "ticker": "NVDA", "representative": "X", "party": "D",
                    "trade_type": "Buy", "amount_range": "$100,001 - $250,000",
                    "amount_min": 100001.0, "amount_max": 250000.0,
                    "transaction_date": "2026-01-20",
                }]}),
            )
            .unwrap();

        pipeline.rank(0.0).unwrap();
        let mut first = cache.read(RANKING_V3_FILE).unwrap();
        pipeline.rank(0.0).unwrap();
        let mut second = cache.read(RANKING_V3_FILE).unwrap();

        for m in [&mut first, &mut second] {
            m.get_mut("metadata")
                .and_then(Value::as_object_mut)
                .unwrap()
                .remove("last_updated");
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_rank_with_empty_cache_produces_empty_artifacts() {
        let (_dir, pipeline, cache) = pipeline("2026-01-26");
        let ranked = pipeline.rank(0.0).unwrap();
        assert_eq!(ranked, 0);

        let v2: signal_core::RankingV2Artifact = cache.read_as(RANKING_V2_FILE);
        assert!(v2.signals.is_empty());
        assert_eq!(v2.metadata["engine"], "v2");
    }
}
