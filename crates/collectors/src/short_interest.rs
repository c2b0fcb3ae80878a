//! Short-interest collector.
//!
//! Consumes the bi-monthly consolidated short-interest feed, filters out
//! tiny positions and non-equity symbols, enriches a bounded set of
//! tickers with float data, and writes `short_interest.json` sorted by
//! short interest descending.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::{Deserialize, Serialize};
use signal_core::config::SHORT_INTEREST_FILE;
use signal_core::{Result, ShortInterestArtifact, ShortInterestRow};
use std::collections::{BTreeSet, HashMap};

/// Positions below this many shares short are dropped.
pub const MIN_SHORT_INTEREST: i64 = 100_000;
/// How many of the largest positions get float enrichment.
pub const FLOAT_TOP_N: usize = 80;
/// Hard cap on the enrichment set (top-N plus priority names).
pub const FLOAT_ENRICH_CAP: usize = 150;

/// Well-known names always worth enriching when present in the feed.
pub static PRIORITY_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "NVDA", "META", "TSLA", "BRK.B",
    "JPM", "V", "UNH", "JNJ", "XOM", "PG", "MA", "HD", "COST", "ABBV",
    "MRK", "AVGO", "PEP", "KO", "LLY", "TMO", "ADBE", "CRM", "WMT", "CSCO",
    "GME", "AMC", "BB", "NOK", "PLTR", "SOFI", "RIVN", "LCID",
    "NIO", "MARA", "RIOT", "COIN", "HOOD", "SNAP", "PINS", "RBLX", "DKNG",
    "CRWD", "SNOW", "NET", "SHOP", "SQ", "PYPL", "ROKU", "UBER", "LYFT",
    "DASH", "ABNB", "ZM", "DOCU", "PTON", "BYND", "SPCE", "CLOV",
    "MRNA", "BNTX", "BIIB", "BMRN", "ALNY", "EXAS", "HALO",
];

/// One raw feed record (consolidated short interest wire names).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawShortInterest {
    #[serde(default)]
    pub symbol_code: String,
    #[serde(default)]
    pub current_short_position_quantity: i64,
    #[serde(default)]
    pub previous_short_position_quantity: i64,
    #[serde(default)]
    pub change_percent: f64,
    #[serde(default)]
    pub days_to_cover_quantity: f64,
    #[serde(default)]
    pub average_daily_volume_quantity: i64,
    #[serde(default)]
    pub settlement_date: String,
}

/// Float data for one ticker, provided by the enrichment lookup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FloatData {
    #[serde(default)]
    pub shares_outstanding: i64,
    #[serde(default)]
    pub float_shares: i64,
    /// Short % of float as reported by the lookup, used when we cannot
    /// compute our own.
    #[serde(default)]
    pub short_pct_of_float: f64,
}

#[derive(Debug, Serialize)]
struct ShortInterestMetadata {
    schema_version: &'static str,
    source: &'static str,
    ticker_count: usize,
    total_fetched: usize,
    settlement_date: String,
    float_enriched_count: usize,
    last_updated: String,
}

pub struct ShortInterestCollector {
    cache: CacheStore,
}

impl ShortInterestCollector {
    pub fn new(cache: CacheStore) -> Self {
        ShortInterestCollector { cache }
    }

    /// Symbols with option/warrant markers or more than six characters are
    /// not common equity.
    fn is_equity_symbol(ticker: &str) -> bool {
        !ticker.is_empty()
            && ticker.len() <= 6
            && !ticker.contains(['+', '=', '^'])
    }

    /// Process raw rows into canonical rows, applying filters and float
    /// enrichment, sorted by short interest descending.
    pub fn process(
        records: &[RawShortInterest],
        float_data: &HashMap<String, FloatData>,
    ) -> Vec<ShortInterestRow> {
        let mut rows = Vec::new();
        for r in records {
            let ticker = r.symbol_code.trim().to_uppercase();
            if !Self::is_equity_symbol(&ticker) {
                continue;
            }
            if r.current_short_position_quantity < MIN_SHORT_INTEREST {
                continue;
            }

            let prior = r.previous_short_position_quantity;
            let mut change_pct = r.change_percent;
            if change_pct == 0.0 && prior > 0 {
                change_pct =
                    (r.current_short_position_quantity - prior) as f64 / prior as f64 * 100.0;
            }

            let fdata = float_data.get(&ticker).cloned().unwrap_or_default();
            let short_pct_float = if fdata.float_shares > 0 {
                round2(r.current_short_position_quantity as f64 / fdata.float_shares as f64 * 100.0)
            } else {
                fdata.short_pct_of_float
            };

            rows.push(ShortInterestRow {
                ticker,
                short_interest: r.current_short_position_quantity,
                prior_short_interest: prior,
                change: r.current_short_position_quantity - prior,
                change_pct: round2(change_pct),
                days_to_cover: round2(r.days_to_cover_quantity),
                avg_daily_volume: r.average_daily_volume_quantity,
                short_pct_float,
                float_shares: fdata.float_shares,
                shares_outstanding: fdata.shares_outstanding,
                settlement_date: r.settlement_date.clone(),
            });
        }

        rows.sort_by(|a, b| b.short_interest.cmp(&a.short_interest));
        rows
    }

    /// Which tickers the float lookup should be asked about: the top-N by
    /// short interest plus any priority names present in the feed, capped.
    pub fn tickers_for_float_enrichment(rows: &[ShortInterestRow]) -> Vec<String> {
        let mut selected: Vec<String> = rows
            .iter()
            .take(FLOAT_TOP_N)
            .map(|r| r.ticker.clone())
            .collect();

        let in_feed: BTreeSet<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        let already: BTreeSet<String> = selected.iter().cloned().collect();
        for p in PRIORITY_TICKERS {
            if in_feed.contains(p) && !already.contains(*p) {
                selected.push((*p).to_string());
            }
        }

        selected.truncate(FLOAT_ENRICH_CAP);
        selected
    }

    /// Process and write `short_interest.json`.
    pub fn run(
        &self,
        records: &[RawShortInterest],
        float_data: &HashMap<String, FloatData>,
    ) -> Result<CollectorReport> {
        let rows = Self::process(records, float_data);

        let settlement_date = rows
            .first()
            .map(|r| r.settlement_date.clone())
            .unwrap_or_default();
        let metadata = ShortInterestMetadata {
            schema_version: "1.0.0",
            source: "finra",
            ticker_count: rows.len(),
            total_fetched: records.len(),
            settlement_date,
            float_enriched_count: rows.iter().filter(|r| r.float_shares > 0).count(),
            last_updated: now_iso(),
        };

        let skipped = records.len() - rows.len();
        let record_count = rows.len();
        self.cache.write(
            SHORT_INTEREST_FILE,
            &ShortInterestArtifact {
                metadata: serde_json::to_value(&metadata).unwrap_or_default(),
                tickers: rows,
            },
        )?;

        tracing::info!(
            "short interest: {record_count} tickers saved (settlement {})",
            metadata.settlement_date
        );

        Ok(CollectorReport {
            source: "short_interest",
            records: record_count,
            skipped,
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ticker: &str, si: i64, prior: i64) -> RawShortInterest {
        RawShortInterest {
            symbol_code: ticker.to_string(),
            current_short_position_quantity: si,
            previous_short_position_quantity: prior,
            change_percent: 0.0,
            days_to_cover_quantity: 2.5,
            average_daily_volume_quantity: 1_000_000,
            settlement_date: "2026-01-15".to_string(),
        }
    }

    #[test]
    fn test_small_positions_filtered() {
        let rows = ShortInterestCollector::process(&[raw("TINY", 50_000, 40_000)], &HashMap::new());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_non_equity_symbols_filtered() {
        let records = vec![
            raw("GME", 5_000_000, 4_000_000),
            raw("ABC+", 5_000_000, 4_000_000),
            raw("XYZ=", 5_000_000, 4_000_000),
            raw("T^A", 5_000_000, 4_000_000),
            raw("LONGNAME", 5_000_000, 4_000_000),
        ];
        let rows = ShortInterestCollector::process(&records, &HashMap::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "GME");
    }

    #[test]
    fn test_change_pct_computed_when_missing() {
        let rows = ShortInterestCollector::process(&[raw("GME", 5_500_000, 5_000_000)], &HashMap::new());
        assert_eq!(rows[0].change_pct, 10.0);
        assert_eq!(rows[0].change, 500_000);
    }

    #[test]
    fn test_float_enrichment() {
        let mut float_data = HashMap::new();
        float_data.insert(
            "GME".to_string(),
            FloatData {
                shares_outstanding: 400_000_000,
                float_shares: 250_000_000,
                short_pct_of_float: 0.0,
            },
        );
        let rows = ShortInterestCollector::process(&[raw("GME", 50_000_000, 45_000_000)], &float_data);
        assert_eq!(rows[0].short_pct_float, 20.0);
        assert_eq!(rows[0].float_shares, 250_000_000);
    }

    #[test]
    fn test_lookup_pct_used_when_float_missing() {
        let mut float_data = HashMap::new();
        float_data.insert(
            "AMC".to_string(),
            FloatData {
                shares_outstanding: 0,
                float_shares: 0,
                short_pct_of_float: 18.5,
            },
        );
        let rows = ShortInterestCollector::process(&[raw("AMC", 50_000_000, 45_000_000)], &float_data);
        assert_eq!(rows[0].short_pct_float, 18.5);
    }

    #[test]
    fn test_sorted_by_short_interest_desc() {
        let records = vec![
            raw("AAA", 1_000_000, 900_000),
            raw("BBB", 9_000_000, 8_000_000),
            raw("CCC", 5_000_000, 4_000_000),
        ];
        let rows = ShortInterestCollector::process(&records, &HashMap::new());
        let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "CCC", "AAA"]);
    }

    #[test]
    fn test_enrichment_selection() {
        // 100 synthetic tickers by descending SI plus one priority name at
        // the bottom of the feed.
        let mut records: Vec<RawShortInterest> = (0..100)
            .map(|i| raw(&format!("T{i:03}"), 100_000_000 - i as i64 * 100_000, 1_000_000))
            .collect();
        records.push(raw("GME", 200_000, 100_000));
        let rows = ShortInterestCollector::process(&records, &HashMap::new());

        let selected = ShortInterestCollector::tickers_for_float_enrichment(&rows);
        assert!(selected.len() <= FLOAT_ENRICH_CAP);
        assert!(selected.contains(&"T000".to_string()));
        // Priority ticker included even though it is far below the top 80.
        assert!(selected.contains(&"GME".to_string()));
    }

    #[test]
    fn test_run_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        let collector = ShortInterestCollector::new(cache);

        let report = collector
            .run(&[raw("GME", 5_000_000, 4_000_000)], &HashMap::new())
            .unwrap();
        assert_eq!(report.records, 1);

        let artifact: ShortInterestArtifact = collector.cache.read_as(SHORT_INTEREST_FILE);
        assert_eq!(artifact.tickers.len(), 1);
        assert_eq!(artifact.metadata["settlement_date"], "2026-01-15");
    }
}
