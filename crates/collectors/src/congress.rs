//! Legislator trade collector.
//!
//! Accepts raw provider records (camel-case provider keys or snake_case
//! fallback-feed keys), normalizes them to [`CongressTrade`], and writes
//! `congress.json`.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::Serialize;
use serde_json::Value;
use signal_core::config::CONGRESS_FILE;
use signal_core::normalize::{
    normalize_chamber, normalize_party, parse_amount_range, parse_trade_type,
};
use signal_core::{clean_ticker, CongressArtifact, CongressTrade, Result, TradeType};

#[derive(Debug, Serialize)]
struct CongressMetadata {
    schema_version: &'static str,
    total_count: usize,
    buy_count: usize,
    sell_count: usize,
    avg_position: f64,
    avg_excess_return_30d: f64,
    skipped_count: usize,
    last_updated: String,
}

pub struct CongressCollector {
    cache: CacheStore,
}

impl CongressCollector {
    pub fn new(cache: CacheStore) -> Self {
        CongressCollector { cache }
    }

    /// Normalize one raw record; `None` when it should be filtered out
    /// (empty or placeholder ticker, non-stock rows, unknown trade type).
    pub fn normalize_trade(raw: &Value) -> Option<CongressTrade> {
        // Provider rows tag non-stock assets; skip anything explicitly so.
        if let Some(ticker_type) = str_field(raw, &["TickerType", "ticker_type"]) {
            if ticker_type != "Stock" {
                return None;
            }
        }

        let ticker = clean_ticker(str_field(raw, &["Ticker", "ticker"]).unwrap_or_default())?;

        let amount_raw = str_field(raw, &["Range", "Amount", "amount_range", "amount"])
            .unwrap_or_default()
            .to_string();
        let (amount_min, amount_max) = parse_amount_range(&amount_raw);

        let trade_type = parse_trade_type(
            str_field(raw, &["Transaction", "trade_type", "type"]).unwrap_or_default(),
        )?;

        let transaction_date = str_field(raw, &["TransactionDate", "transaction_date", "trade_date"])
            .unwrap_or_default()
            .to_string();
        let filing_date = str_field(raw, &["ReportDate", "filing_date", "disclosed_date"])
            .map(str::to_string);

        Some(CongressTrade {
            ticker,
            representative: str_field(raw, &["Representative", "representative", "politician"])
                .unwrap_or_default()
                .to_string(),
            bio_guide_id: str_field(raw, &["BioGuideID", "bio_guide_id"]).map(str::to_string),
            party: normalize_party(str_field(raw, &["Party", "party"]).unwrap_or_default()),
            chamber: normalize_chamber(str_field(raw, &["House", "chamber"]).unwrap_or_default()),
            trade_type,
            amount_range: amount_raw,
            amount_min,
            amount_max,
            transaction_date,
            filing_date,
            stock_return_pct: num_field(raw, &["PriceChange", "price_change"]).map(round2),
            spy_return_pct: num_field(raw, &["SPYChange", "spy_change"]).map(round2),
            excess_return_pct: num_field(raw, &["ExcessReturn", "excess_return"]).map(round2),
        })
    }

    /// Normalize, sort by transaction date descending, build metadata, and
    /// write the artifact. Returns the report for the refresh log.
    pub fn run(&self, raw_records: &[Value]) -> Result<CollectorReport> {
        let mut trades: Vec<CongressTrade> = Vec::with_capacity(raw_records.len());
        let mut skipped = 0usize;
        for raw in raw_records {
            match Self::normalize_trade(raw) {
                Some(t) => trades.push(t),
                None => skipped += 1,
            }
        }

        trades.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));

        let metadata = Self::build_metadata(&trades, skipped);
        let artifact = CongressArtifact {
            metadata: serde_json::to_value(&metadata).unwrap_or_default(),
            trades,
        };
        self.cache.write(CONGRESS_FILE, &artifact)?;

        tracing::info!(
            "congress: {} trades saved ({} buy, {} sell, {skipped} skipped)",
            artifact.trades.len(),
            metadata.buy_count,
            metadata.sell_count,
        );

        Ok(CollectorReport {
            source: "congress",
            records: artifact.trades.len(),
            skipped,
        })
    }

    /// Run from a raw input file containing a JSON array of provider rows.
    pub fn run_from_file(&self, path: &std::path::Path) -> Result<CollectorReport> {
        let text = std::fs::read_to_string(path)?;
        let records: Vec<Value> = serde_json::from_str(&text)
            .map_err(|e| signal_core::SignalError::InputMalformed(format!("{}: {e}", path.display())))?;
        self.run(&records)
    }

    fn build_metadata(trades: &[CongressTrade], skipped: usize) -> CongressMetadata {
        let buy_count = trades.iter().filter(|t| t.trade_type == TradeType::Buy).count();
        let sell_count = trades.iter().filter(|t| t.trade_type == TradeType::Sell).count();

        let positions: Vec<f64> = trades
            .iter()
            .filter(|t| t.amount_max > 0.0)
            .map(|t| (t.amount_min + t.amount_max) / 2.0)
            .collect();
        let avg_position = if positions.is_empty() {
            0.0
        } else {
            positions.iter().sum::<f64>() / positions.len() as f64
        };

        let excess: Vec<f64> = trades.iter().filter_map(|t| t.excess_return_pct).collect();
        let avg_excess = if excess.is_empty() {
            0.0
        } else {
            excess.iter().sum::<f64>() / excess.len() as f64
        };

        CongressMetadata {
            schema_version: "1.0.0",
            total_count: trades.len(),
            buy_count,
            sell_count,
            avg_position: round2(avg_position),
            avg_excess_return_30d: round2(avg_excess),
            skipped_count: skipped,
            last_updated: now_iso(),
        }
    }
}

fn str_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| raw.get(k))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn num_field(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| raw.get(k)).and_then(Value::as_f64)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collector() -> (tempfile::TempDir, CongressCollector) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        (dir, CongressCollector::new(cache))
    }

    #[test]
    fn test_normalize_provider_keys() {
        let raw = json!({
            "Ticker": "NVDA",
            "Representative": "Nancy Pelosi",
            "Party": "D",
            "House": "Representatives",
            "Transaction": "Purchase",
            "Range": "$100,001 - $250,000",
            "TransactionDate": "2026-01-20",
            "ReportDate": "2026-01-22",
            "ExcessReturn": 5.234,
            "PriceChange": 8.1,
            "SPYChange": 2.9,
        });
        let trade = CongressCollector::normalize_trade(&raw).unwrap();
        assert_eq!(trade.ticker, "NVDA");
        assert_eq!(trade.party, "Democrat");
        assert_eq!(trade.chamber, "House");
        assert_eq!(trade.trade_type, TradeType::Buy);
        assert_eq!(trade.amount_min, 100_001.0);
        assert_eq!(trade.amount_max, 250_000.0);
        assert_eq!(trade.excess_return_pct, Some(5.23));
        assert_eq!(trade.filing_date.as_deref(), Some("2026-01-22"));
    }

    #[test]
    fn test_normalize_snake_case_fallback() {
        let raw = json!({
            "ticker": "aapl",
            "politician": "Jane Doe",
            "chamber": "senate",
            "trade_type": "Sale (Partial)",
            "amount": "$15,001 - $50,000",
            "trade_date": "2026-01-10",
            "disclosed_date": "2026-01-12",
        });
        let trade = CongressCollector::normalize_trade(&raw).unwrap();
        assert_eq!(trade.ticker, "AAPL");
        assert_eq!(trade.representative, "Jane Doe");
        assert_eq!(trade.chamber, "Senate");
        assert_eq!(trade.trade_type, TradeType::Sell);
        assert_eq!(trade.transaction_date, "2026-01-10");
    }

    #[test]
    fn test_placeholder_ticker_filtered() {
        assert!(CongressCollector::normalize_trade(&json!({"Ticker": "--", "Transaction": "Purchase"})).is_none());
        assert!(CongressCollector::normalize_trade(&json!({"Ticker": "", "Transaction": "Purchase"})).is_none());
        assert!(CongressCollector::normalize_trade(&json!({"Transaction": "Purchase"})).is_none());
    }

    #[test]
    fn test_non_stock_filtered() {
        let raw = json!({"Ticker": "BOND1", "TickerType": "Bond", "Transaction": "Purchase"});
        assert!(CongressCollector::normalize_trade(&raw).is_none());
    }

    #[test]
    fn test_run_sorts_and_writes_artifact() {
        let (_dir, c) = collector();
        let records = vec![
            json!({"Ticker": "OLD", "Transaction": "Purchase", "TransactionDate": "2026-01-01", "Range": "$1,001 - $15,000"}),
            json!({"Ticker": "NEW", "Transaction": "Sale", "TransactionDate": "2026-01-20", "Range": "$1,001 - $15,000"}),
            json!({"Ticker": "--", "Transaction": "Purchase"}),
        ];
        let report = c.run(&records).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.skipped, 1);

        let artifact: CongressArtifact = c.cache.read_as(CONGRESS_FILE);
        assert_eq!(artifact.trades[0].ticker, "NEW");
        assert_eq!(artifact.trades[1].ticker, "OLD");
        assert_eq!(artifact.metadata["buy_count"], 1);
        assert_eq!(artifact.metadata["sell_count"], 1);
        assert_eq!(artifact.metadata["avg_position"], 8000.5);
    }

    #[test]
    fn test_idempotent_modulo_timestamp() {
        let (_dir, c) = collector();
        let records = vec![json!({
            "Ticker": "NVDA", "Transaction": "Purchase",
            "TransactionDate": "2026-01-20", "Range": "$100,001 - $250,000",
        })];
        c.run(&records).unwrap();
        let mut first: serde_json::Map<String, Value> = c.cache.read(CONGRESS_FILE).unwrap();
        c.run(&records).unwrap();
        let mut second: serde_json::Map<String, Value> = c.cache.read(CONGRESS_FILE).unwrap();

        // Strip the timestamp, everything else must be byte-equivalent.
        first.get_mut("metadata").unwrap().as_object_mut().unwrap().remove("last_updated");
        second.get_mut("metadata").unwrap().as_object_mut().unwrap().remove("last_updated");
        assert_eq!(first, second);
    }
}
