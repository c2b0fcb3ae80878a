//! Per-ticker direction detection from the raw trade artifacts.
//!
//! Direction comes from comparing buy vs sell counts per source:
//! - congress:      trade_type Buy → buy, Sell → sell
//! - ark:           trade_type Buy → buy, Sell → sell
//! - insider:       transaction_type Buy → buy, Sell → sell
//! - superinvestor: Buy/Add → buy, Sell/Reduce → sell; aggregate rows
//!   compare manager counts per direction, per-manager rows count entries,
//!   and aggregate counts win when both exist.
//!
//! The always-neutral sources (darkpool, institution, short_interest) are
//! skipped entirely; the ranker forces them neutral.

use signal_core::{
    clean_ticker, ActivityOrigin, ArkTradesArtifact, CongressArtifact, Direction,
    InsidersArtifact, SourceKind, SuperinvestorsArtifact, TradeType,
};
use std::collections::{BTreeMap, HashMap};

/// `{ticker → {source → direction}}`.
pub type DirectionMap = HashMap<String, BTreeMap<SourceKind, Direction>>;

/// The raw artifacts direction detection reads.
#[derive(Debug, Default, Clone)]
pub struct DirectionInputs {
    pub congress: CongressArtifact,
    pub ark_trades: ArkTradesArtifact,
    pub insiders: InsidersArtifact,
    pub superinvestors: SuperinvestorsArtifact,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    buy: u32,
    sell: u32,
}

impl Counts {
    fn resolve(self) -> Direction {
        if self.buy > self.sell {
            Direction::Bullish
        } else if self.sell > self.buy {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

/// Detect per-ticker directions for every directional source.
pub fn detect_directions(inputs: &DirectionInputs) -> DirectionMap {
    let mut directions = DirectionMap::new();

    let mut assign = |counts: HashMap<String, Counts>, source: SourceKind| {
        for (ticker, c) in counts {
            directions
                .entry(ticker)
                .or_default()
                .insert(source, c.resolve());
        }
    };

    // Congress
    let mut counts: HashMap<String, Counts> = HashMap::new();
    for trade in &inputs.congress.trades {
        let Some(ticker) = clean_ticker(&trade.ticker) else {
            continue;
        };
        let entry = counts.entry(ticker).or_default();
        match trade.trade_type {
            TradeType::Buy => entry.buy += 1,
            TradeType::Sell => entry.sell += 1,
            TradeType::Exchange => {}
        }
    }
    assign(counts, SourceKind::Congress);

    // ARK
    let mut counts: HashMap<String, Counts> = HashMap::new();
    for trade in &inputs.ark_trades.trades {
        let Some(ticker) = clean_ticker(&trade.ticker) else {
            continue;
        };
        let entry = counts.entry(ticker).or_default();
        match trade.trade_type {
            TradeType::Buy => entry.buy += 1,
            TradeType::Sell => entry.sell += 1,
            TradeType::Exchange => {}
        }
    }
    assign(counts, SourceKind::Ark);

    // Insiders
    let mut counts: HashMap<String, Counts> = HashMap::new();
    for trade in &inputs.insiders.trades {
        let Some(ticker) = clean_ticker(&trade.ticker) else {
            continue;
        };
        let entry = counts.entry(ticker).or_default();
        match trade.transaction_type {
            TradeType::Buy => entry.buy += 1,
            TradeType::Sell => entry.sell += 1,
            TradeType::Exchange => {}
        }
    }
    assign(counts, SourceKind::Insider);

    // Superinvestors: aggregate manager counts preferred over per-manager
    // tallies when both exist for a ticker.
    let mut agg_counts: HashMap<String, Counts> = HashMap::new();
    let mut per_manager_counts: HashMap<String, Counts> = HashMap::new();
    for entry in &inputs.superinvestors.activity {
        let Some(ticker) = clean_ticker(&entry.ticker) else {
            continue;
        };
        match entry.source {
            ActivityOrigin::Aggregate => {
                let c = agg_counts.entry(ticker).or_default();
                let managers = entry.manager_count.unwrap_or(1);
                if entry.activity_type.is_buy() {
                    c.buy = c.buy.max(managers);
                } else {
                    c.sell = c.sell.max(managers);
                }
            }
            ActivityOrigin::PerManager => {
                let c = per_manager_counts.entry(ticker).or_default();
                if entry.activity_type.is_buy() {
                    c.buy += 1;
                } else {
                    c.sell += 1;
                }
            }
        }
    }
    let mut si_counts: HashMap<String, Counts> = per_manager_counts;
    for (ticker, counts) in agg_counts {
        si_counts.insert(ticker, counts);
    }
    assign(si_counts, SourceKind::Superinvestor);

    directions
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::{ActivityType, CongressTrade, SuperinvestorActivity};

    fn congress_trade(ticker: &str, trade_type: TradeType) -> CongressTrade {
        CongressTrade {
            ticker: ticker.to_string(),
            representative: "X".to_string(),
            bio_guide_id: None,
            party: String::new(),
            chamber: String::new(),
            trade_type,
            amount_range: String::new(),
            amount_min: 0.0,
            amount_max: 0.0,
            transaction_date: "2026-01-20".to_string(),
            filing_date: None,
            stock_return_pct: None,
            spy_return_pct: None,
            excess_return_pct: None,
        }
    }

    fn activity(
        ticker: &str,
        activity_type: ActivityType,
        source: ActivityOrigin,
        manager_count: Option<u32>,
    ) -> SuperinvestorActivity {
        SuperinvestorActivity {
            ticker: ticker.to_string(),
            company: None,
            manager: None,
            activity_type,
            portfolio_pct: None,
            manager_count,
            change_pct: None,
            portfolio_impact_pct: None,
            quarter: "Q3 2025".to_string(),
            source,
        }
    }

    #[test]
    fn test_congress_majority_buy() {
        let mut inputs = DirectionInputs::default();
        inputs.congress.trades = vec![
            congress_trade("NVDA", TradeType::Buy),
            congress_trade("NVDA", TradeType::Buy),
            congress_trade("NVDA", TradeType::Sell),
        ];
        let map = detect_directions(&inputs);
        assert_eq!(map["NVDA"][&SourceKind::Congress], Direction::Bullish);
    }

    #[test]
    fn test_tie_is_neutral() {
        let mut inputs = DirectionInputs::default();
        inputs.congress.trades = vec![
            congress_trade("AAPL", TradeType::Buy),
            congress_trade("AAPL", TradeType::Sell),
        ];
        let map = detect_directions(&inputs);
        assert_eq!(map["AAPL"][&SourceKind::Congress], Direction::Neutral);
    }

    #[test]
    fn test_exchange_ignored() {
        let mut inputs = DirectionInputs::default();
        inputs.congress.trades = vec![
            congress_trade("X", TradeType::Exchange),
            congress_trade("X", TradeType::Sell),
        ];
        let map = detect_directions(&inputs);
        assert_eq!(map["X"][&SourceKind::Congress], Direction::Bearish);
    }

    #[test]
    fn test_ticker_normalized() {
        let mut inputs = DirectionInputs::default();
        inputs.congress.trades = vec![congress_trade(" nvda ", TradeType::Buy)];
        let map = detect_directions(&inputs);
        assert!(map.contains_key("NVDA"));
    }

    #[test]
    fn test_superinvestor_aggregate_preferred() {
        let mut inputs = DirectionInputs::default();
        inputs.superinvestors.activity = vec![
            // Aggregate: 12 managers selling vs 3 buying → bearish.
            activity("KO", ActivityType::Sell, ActivityOrigin::Aggregate, Some(12)),
            activity("KO", ActivityType::Buy, ActivityOrigin::Aggregate, Some(3)),
            // Per-manager rows lean bullish, but aggregate wins.
            activity("KO", ActivityType::Buy, ActivityOrigin::PerManager, None),
            activity("KO", ActivityType::Add, ActivityOrigin::PerManager, None),
        ];
        let map = detect_directions(&inputs);
        assert_eq!(map["KO"][&SourceKind::Superinvestor], Direction::Bearish);
    }

    #[test]
    fn test_superinvestor_per_manager_fallback() {
        let mut inputs = DirectionInputs::default();
        inputs.superinvestors.activity = vec![
            activity("MSFT", ActivityType::Add, ActivityOrigin::PerManager, None),
            activity("MSFT", ActivityType::Buy, ActivityOrigin::PerManager, None),
            activity("MSFT", ActivityType::Reduce, ActivityOrigin::PerManager, None),
        ];
        let map = detect_directions(&inputs);
        assert_eq!(map["MSFT"][&SourceKind::Superinvestor], Direction::Bullish);
    }

    #[test]
    fn test_missing_artifacts_empty_map() {
        let map = detect_directions(&DirectionInputs::default());
        assert!(map.is_empty());
    }
}
