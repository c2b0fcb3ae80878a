//! Insider (Form 4) trade collector.
//!
//! Normalizes raw insider trade rows and derives buying clusters: three or
//! more distinct insiders buying the same ticker within a rolling 14-day
//! window. Clusters may also be supplied pre-computed by the feed, in
//! which case they are trusted as-is.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::Serialize;
use serde_json::Value;
use signal_core::config::INSIDERS_FILE;
use signal_core::normalize::parse_trade_type;
use signal_core::{
    clean_ticker, clock::parse_date, InsiderCluster, InsidersArtifact, InsiderTrade, Result,
    TradeType,
};
use std::collections::BTreeMap;

/// Buys further apart than this cannot share a cluster.
pub const CLUSTER_WINDOW_DAYS: i64 = 14;
/// Distinct insiders required to call it a cluster.
pub const CLUSTER_MIN_INSIDERS: usize = 3;

#[derive(Debug, Serialize)]
struct InsidersMetadata {
    schema_version: &'static str,
    total_count: usize,
    buy_count: usize,
    sell_count: usize,
    cluster_count: usize,
    skipped_count: usize,
    last_updated: String,
}

pub struct InsidersCollector {
    cache: CacheStore,
}

impl InsidersCollector {
    pub fn new(cache: CacheStore) -> Self {
        InsidersCollector { cache }
    }

    /// Normalize one raw row; `None` filters it out.
    pub fn normalize_trade(raw: &Value) -> Option<InsiderTrade> {
        let ticker = clean_ticker(str_field(raw, &["ticker", "Ticker"])?)?;
        let insider_name = str_field(raw, &["insider_name", "name", "Name"])?.to_string();
        let transaction_type =
            parse_trade_type(str_field(raw, &["transaction_type", "trade_type"]).unwrap_or(""))?;
        let trade_date = str_field(raw, &["trade_date", "transaction_date", "date"])
            .unwrap_or_default()
            .to_string();

        Some(InsiderTrade {
            ticker,
            company: str_field(raw, &["company", "Company"]).map(str::to_string),
            insider_name,
            title: str_field(raw, &["title", "Title"]).map(str::to_string),
            transaction_type,
            trade_date,
            filing_date: str_field(raw, &["filing_date", "disclosed_date"]).map(str::to_string),
            value: num_field(raw, &["value", "amount"]).unwrap_or(0.0),
            shares: num_field(raw, &["shares"]).map(|v| v as i64),
        })
    }

    /// Derive buy clusters per ticker. For each ticker the best 14-day
    /// window (most distinct insiders) is reported, when it reaches the
    /// minimum of three.
    pub fn compute_clusters(trades: &[InsiderTrade]) -> Vec<InsiderCluster> {
        let mut buys_by_ticker: BTreeMap<&str, Vec<&InsiderTrade>> = BTreeMap::new();
        for t in trades {
            if t.transaction_type == TradeType::Buy && parse_date(&t.trade_date).is_some() {
                buys_by_ticker.entry(t.ticker.as_str()).or_default().push(t);
            }
        }

        let mut clusters = Vec::new();
        for (ticker, mut buys) in buys_by_ticker {
            buys.sort_by(|a, b| a.trade_date.cmp(&b.trade_date));

            let mut best: Option<(usize, usize, usize)> = None; // (count, start, end)
            for start in 0..buys.len() {
                let Some(start_date) = parse_date(&buys[start].trade_date) else {
                    continue;
                };
                let mut insiders = std::collections::BTreeSet::new();
                let mut end = start;
                for (i, t) in buys.iter().enumerate().skip(start) {
                    let Some(d) = parse_date(&t.trade_date) else { continue };
                    if (d - start_date).num_days() > CLUSTER_WINDOW_DAYS {
                        break;
                    }
                    insiders.insert(t.insider_name.as_str());
                    end = i;
                }
                if best.map(|(n, _, _)| insiders.len() > n).unwrap_or(true) {
                    best = Some((insiders.len(), start, end));
                }
            }

            let Some((count, start, end)) = best else { continue };
            if count < CLUSTER_MIN_INSIDERS {
                continue;
            }

            let window = &buys[start..=end];
            let insiders: std::collections::BTreeSet<String> =
                window.iter().map(|t| t.insider_name.clone()).collect();
            clusters.push(InsiderCluster {
                ticker: ticker.to_string(),
                insider_count: insiders.len(),
                total_value: window.iter().map(|t| t.value).sum(),
                insiders: insiders.into_iter().collect(),
                first_date: window
                    .first()
                    .map(|t| t.trade_date.clone())
                    .unwrap_or_default(),
                last_date: window
                    .last()
                    .map(|t| t.trade_date.clone())
                    .unwrap_or_default(),
            });
        }

        clusters.sort_by(|a, b| {
            b.insider_count
                .cmp(&a.insider_count)
                .then(a.ticker.cmp(&b.ticker))
        });
        clusters
    }

    /// Normalize, (re)compute clusters unless supplied, write the artifact.
    pub fn run(
        &self,
        raw_trades: &[Value],
        provided_clusters: Option<Vec<InsiderCluster>>,
    ) -> Result<CollectorReport> {
        let mut trades = Vec::with_capacity(raw_trades.len());
        let mut skipped = 0usize;
        for raw in raw_trades {
            match Self::normalize_trade(raw) {
                Some(t) => trades.push(t),
                None => skipped += 1,
            }
        }
        trades.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));

        let clusters = match provided_clusters {
            Some(c) => c,
            None => Self::compute_clusters(&trades),
        };

        let metadata = InsidersMetadata {
            schema_version: "1.0.0",
            total_count: trades.len(),
            buy_count: trades
                .iter()
                .filter(|t| t.transaction_type == TradeType::Buy)
                .count(),
            sell_count: trades
                .iter()
                .filter(|t| t.transaction_type == TradeType::Sell)
                .count(),
            cluster_count: clusters.len(),
            skipped_count: skipped,
            last_updated: now_iso(),
        };

        let record_count = trades.len();
        self.cache.write(
            INSIDERS_FILE,
            &InsidersArtifact {
                metadata: serde_json::to_value(&metadata).unwrap_or_default(),
                trades,
                clusters,
            },
        )?;

        tracing::info!(
            "insiders: {record_count} trades, {} clusters saved ({skipped} skipped)",
            metadata.cluster_count
        );

        Ok(CollectorReport {
            source: "insiders",
            records: record_count,
            skipped,
        })
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
