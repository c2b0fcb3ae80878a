//! ARK ETF daily collector.
//!
//! Input is the current holdings snapshot per ETF. Each snapshot is
//! compared to the previously persisted holdings to detect position
//! changes:
//!
//!   NEW_POSITION  ticker appears
//!   INCREASED     shares grew more than 1%
//!   DECREASED     shares shrank more than 1%
//!   SOLD_OUT      ticker disappeared
//!
//! Changes are appended to `ark_changes.jsonl`; the trades artifact is
//! rebuilt from the full change log and the holdings artifact is the
//! latest snapshot per ETF concatenated.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::{Deserialize, Serialize};
use signal_core::config::{ARK_CHANGES_LOG, ARK_HOLDINGS_FILE, ARK_TRADES_FILE};
use signal_core::{
    clean_ticker, ArkHolding, ArkHoldingsArtifact, ArkTrade, ArkTradesArtifact, ChangeType,
    Result,
};
use std::collections::{BTreeMap, HashMap};

/// One raw holding row as fetched from the funds feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArkHolding {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub shares: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub market_value: Option<f64>,
}

/// A full snapshot of one ETF for one day.
#[derive(Debug, Clone, Deserialize)]
pub struct ArkSnapshot {
    pub date: String,
    #[serde(default)]
    pub holdings: Vec<RawArkHolding>,
}

/// One detected change, appended to the JSONL change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub etf: String,
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub shares: Option<i64>,
    #[serde(default)]
    pub prev_shares: Option<i64>,
    #[serde(default)]
    pub curr_shares: Option<i64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    pub date: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct TradesMetadata {
    schema_version: &'static str,
    total_count: usize,
    buy_count: usize,
    sell_count: usize,
    most_active_etf: String,
    etf_breakdown: BTreeMap<String, usize>,
    last_updated: String,
}

#[derive(Debug, Serialize)]
struct HoldingsMetadata {
    schema_version: &'static str,
    total_holdings: usize,
    etf_count: usize,
    total_value: f64,
    top_holding: String,
    last_updated: String,
}

pub struct ArkCollector {
    cache: CacheStore,
}

impl ArkCollector {
    pub fn new(cache: CacheStore) -> Self {
        ArkCollector { cache }
    }

    /// Diff one ETF's current snapshot against its previously persisted
    /// holdings.
    pub fn detect_changes(
        etf: &str,
        previous: &[ArkHolding],
        current: &ArkSnapshot,
    ) -> Vec<ArkChange> {
        let prev_map: HashMap<&str, &ArkHolding> =
            previous.iter().map(|h| (h.ticker.as_str(), h)).collect();

        let mut curr_map: HashMap<String, &RawArkHolding> = HashMap::new();
        for h in &current.holdings {
            if let Some(ticker) = clean_ticker(&h.ticker) {
                curr_map.insert(ticker, h);
            }
        }

        let timestamp = now_iso();
        let mut changes = Vec::new();

        for (ticker, holding) in &curr_map {
            let curr_shares = holding.shares as i64;
            match prev_map.get(ticker.as_str()) {
                None => changes.push(ArkChange {
                    change_type: ChangeType::NewPosition,
                    etf: etf.to_string(),
                    ticker: ticker.clone(),
                    company: holding.company.clone(),
                    shares: Some(curr_shares),
                    prev_shares: None,
                    curr_shares: Some(curr_shares),
                    weight: Some(holding.weight),
                    change_pct: None,
                    date: current.date.clone(),
                    timestamp: timestamp.clone(),
                }),
                Some(prev) => {
                    let prev_shares = prev.shares;
                    if prev_shares <= 0 {
                        continue;
                    }
                    let curr = curr_shares as f64;
                    let prev_f = prev_shares as f64;
                    if curr > prev_f * 1.01 {
                        changes.push(ArkChange {
                            change_type: ChangeType::Increased,
                            etf: etf.to_string(),
                            ticker: ticker.clone(),
                            company: holding.company.clone(),
                            shares: None,
                            prev_shares: Some(prev_shares),
                            curr_shares: Some(curr_shares),
                            weight: Some(holding.weight),
                            change_pct: Some(round2((curr - prev_f) / prev_f * 100.0)),
                            date: current.date.clone(),
                            timestamp: timestamp.clone(),
                        });
                    } else if curr < prev_f * 0.99 {
                        changes.push(ArkChange {
                            change_type: ChangeType::Decreased,
                            etf: etf.to_string(),
                            ticker: ticker.clone(),
                            company: holding.company.clone(),
                            shares: None,
                            prev_shares: Some(prev_shares),
                            curr_shares: Some(curr_shares),
                            weight: Some(holding.weight),
                            change_pct: Some(round2((prev_f - curr) / prev_f * 100.0)),
                            date: current.date.clone(),
                            timestamp: timestamp.clone(),
                        });
                    }
                }
            }
        }

        for (ticker, prev) in &prev_map {
            if prev.etf == etf && !curr_map.contains_key(*ticker) {
                changes.push(ArkChange {
                    change_type: ChangeType::SoldOut,
                    etf: etf.to_string(),
                    ticker: (*ticker).to_string(),
                    company: prev.company.clone(),
                    shares: None,
                    prev_shares: Some(prev.shares),
                    curr_shares: None,
                    weight: None,
                    change_pct: None,
                    date: current.date.clone(),
                    timestamp: timestamp.clone(),
                });
            }
        }

        changes.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        changes
    }

    /// Normalize one logged change into an [`ArkTrade`].
    pub fn normalize_trade(change: &ArkChange) -> Option<ArkTrade> {
        let ticker = clean_ticker(&change.ticker)?;
        let shares = change
            .curr_shares
            .or(change.shares)
            .or(change.prev_shares)
            .unwrap_or(0);

        Some(ArkTrade {
            ticker,
            company: change.company.clone(),
            etf: change.etf.to_uppercase(),
            trade_type: change.change_type.to_trade_type(),
            date: change.date.clone(),
            shares,
            weight_pct: change.weight,
            change_type: change.change_type,
            change_pct: change.change_pct.map(round2),
        })
    }

    /// Run the daily collection: diff snapshots against the persisted
    /// holdings, append new changes to the log, rebuild both artifacts.
    pub fn run(&self, snapshots: &BTreeMap<String, ArkSnapshot>) -> Result<CollectorReport> {
        let previous: ArkHoldingsArtifact = self.cache.read_as(ARK_HOLDINGS_FILE);

        // Diff per ETF.
        let mut new_changes = Vec::new();
        for (etf, snapshot) in snapshots {
            let prev: Vec<ArkHolding> = previous
                .holdings
                .iter()
                .filter(|h| h.etf == *etf)
                .cloned()
                .collect();
            if prev.is_empty() {
                // First sighting of this ETF: no baseline, nothing to diff.
                tracing::info!("ark {etf}: first run, no baseline to diff");
                continue;
            }
            let changes = Self::detect_changes(etf, &prev, snapshot);
            if !changes.is_empty() {
                tracing::info!("ark {etf}: {} changes detected", changes.len());
            }
            new_changes.extend(changes);
        }

        for change in &new_changes {
            self.cache.append_jsonl(ARK_CHANGES_LOG, change)?;
        }

        // Rebuild the trades artifact from the full change log.
        let all_changes: Vec<ArkChange> = self.cache.read_jsonl(ARK_CHANGES_LOG);
        let mut trades: Vec<ArkTrade> = all_changes
            .iter()
            .filter_map(Self::normalize_trade)
            .collect();
        trades.sort_by(|a, b| b.date.cmp(&a.date));

        let trades_metadata = Self::build_trades_metadata(&trades);
        self.cache.write(
            ARK_TRADES_FILE,
            &ArkTradesArtifact {
                metadata: serde_json::to_value(&trades_metadata).unwrap_or_default(),
                trades,
            },
        )?;

        // Holdings artifact: keep ETFs absent from this run, replace the
        // rest with the fresh snapshot.
        let mut holdings: Vec<ArkHolding> = previous
            .holdings
            .into_iter()
            .filter(|h| !snapshots.contains_key(&h.etf))
            .collect();
        for (etf, snapshot) in snapshots {
            for raw in &snapshot.holdings {
                let Some(ticker) = clean_ticker(&raw.ticker) else {
                    continue;
                };
                holdings.push(ArkHolding {
                    ticker,
                    company: raw.company.clone(),
                    etf: etf.to_uppercase(),
                    shares: raw.shares as i64,
                    weight_pct: round2(raw.weight),
                    market_value: raw.market_value,
                    date: snapshot.date.clone(),
                });
            }
        }
        holdings.sort_by(|a, b| b.weight_pct.total_cmp(&a.weight_pct));

        let holdings_metadata = Self::build_holdings_metadata(&holdings);
        let holding_count = holdings.len();
        self.cache.write(
            ARK_HOLDINGS_FILE,
            &ArkHoldingsArtifact {
                metadata: serde_json::to_value(&holdings_metadata).unwrap_or_default(),
                holdings,
            },
        )?;

        tracing::info!(
            "ark: {} new changes, {holding_count} holdings saved",
            new_changes.len()
        );

        Ok(CollectorReport {
            source: "ark",
            records: new_changes.len(),
            skipped: 0,
        })
    }

    fn build_trades_metadata(trades: &[ArkTrade]) -> TradesMetadata {
        use signal_core::TradeType;
        let buy_count = trades.iter().filter(|t| t.trade_type == TradeType::Buy).count();
        let sell_count = trades.iter().filter(|t| t.trade_type == TradeType::Sell).count();

        let mut etf_breakdown: BTreeMap<String, usize> = BTreeMap::new();
        for t in trades {
            *etf_breakdown.entry(t.etf.clone()).or_insert(0) += 1;
        }
        let most_active_etf = etf_breakdown
            .iter()
            .max_by_key(|(_, n)| **n)
            .map(|(etf, _)| etf.clone())
            .unwrap_or_default();

        TradesMetadata {
            schema_version: "1.0.0",
            total_count: trades.len(),
            buy_count,
            sell_count,
            most_active_etf,
            etf_breakdown,
            last_updated: now_iso(),
        }
    }

    fn build_holdings_metadata(holdings: &[ArkHolding]) -> HoldingsMetadata {
        let etfs: std::collections::BTreeSet<&str> =
            holdings.iter().map(|h| h.etf.as_str()).collect();
        let total_value: f64 = holdings.iter().filter_map(|h| h.market_value).sum();
        HoldingsMetadata {
            schema_version: "1.0.0",
            total_holdings: holdings.len(),
            etf_count: etfs.len(),
            total_value: round2(total_value),
            top_holding: holdings.first().map(|h| h.ticker.clone()).unwrap_or_default(),
            last_updated: now_iso(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
