//! Weighted-confluence formula engine.
//!
//! The original scoring model: detect when multiple smart money sources
//! align on the same ticker within a ±7 day window, then score
//!
//!   base       = Σ unique source weights (congress 1.0, ark 1.0,
//!                darkpool 0.8, institution 0.6)
//!   recency    = 1.0 - days_since_last / 30 (clamped at 0)
//!   bonus      = 0.5 × (source_count - 1)
//!   excess     = min(max congress excess return / 10, 2.0)
//!   score      = min((base × recency + bonus + excess) / 5.0 × 10, 10)
//!
//! Kept alongside the conviction engine as a cross-check on a 0-10 scale;
//! the confluence ranker is the authoritative ranking.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use signal_core::{
    Clock, CongressArtifact, DarkPoolArtifact, HoldingChange, InstitutionsArtifact, SourceKind,
    TradeType,
};
use std::collections::BTreeMap;

/// A single extracted signal with its source weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSignal {
    pub ticker: String,
    pub source: SourceKind,
    pub direction: String,
    pub date: String,
    pub weight: f64,
    pub description: String,
    #[serde(default)]
    pub raw_data: Map<String, Value>,
}

/// A scored confluence result for one ticker, 0-10 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub ticker: String,
    pub score: f64,
    pub direction: String,
    pub sources: Vec<SourceKind>,
    pub source_count: usize,
    pub signal_date: String,
    pub congress_score: f64,
    pub ark_score: f64,
    pub darkpool_score: f64,
    pub institution_score: f64,
    pub base_score: f64,
    pub recency_multiplier: f64,
    pub signal_count_bonus: f64,
    pub excess_return_bonus: f64,
    pub raw_score: f64,
    #[serde(skip)]
    pub signals: Vec<FormulaSignal>,
}

/// Inputs the formula engine extracts from.
#[derive(Debug, Default, Clone)]
pub struct FormulaInputs {
    pub congress: CongressArtifact,
    pub ark_trades: signal_core::ArkTradesArtifact,
    pub darkpool: DarkPoolArtifact,
    pub institutions: InstitutionsArtifact,
}

pub struct FormulaEngine {
    window_days: i64,
    max_possible_score: f64,
    min_score: f64,
    clock: Clock,
}

impl FormulaEngine {
    pub fn new(clock: Clock) -> Self {
        FormulaEngine {
            window_days: 7,
            max_possible_score: 5.0,
            min_score: 6.0,
            clock,
        }
    }

    pub fn with_window(mut self, window_days: i64) -> Self {
        self.window_days = window_days;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    // ── Extraction ─────────────────────────────────────────────────────

    /// Congress buys ≥ $15K filed within 45 days.
    pub fn extract_congress(&self, data: &CongressArtifact) -> Vec<FormulaSignal> {
        let mut signals = Vec::new();
        for trade in &data.trades {
            if trade.trade_type != TradeType::Buy {
                continue;
            }
            if trade.amount_max < 15_000.0 {
                continue;
            }
            let date = trade
                .filing_date
                .as_deref()
                .unwrap_or(&trade.transaction_date);
            if self.clock.days_ago(date) > 45 {
                continue;
            }

            signals.push(FormulaSignal {
                ticker: trade.ticker.clone(),
                source: SourceKind::Congress,
                direction: "Bullish".to_string(),
                date: if trade.transaction_date.is_empty() {
                    date.to_string()
                } else {
                    trade.transaction_date.clone()
                },
                weight: 1.0,
                description: format!(
                    "{} ({}) bought {}",
                    trade.representative, trade.party, trade.amount_range
                ),
                raw_data: to_map(json!({
                    "representative": trade.representative,
                    "party": trade.party,
                    "chamber": trade.chamber,
                    "amount_min": trade.amount_min,
                    "amount_max": trade.amount_max,
                    "excess_return_pct": trade.excess_return_pct,
                })),
            });
        }
        signals
    }

    /// ARK buys with weight ≥ 1% (unknown weight passes) within 30 days.
    pub fn extract_ark(&self, data: &signal_core::ArkTradesArtifact) -> Vec<FormulaSignal> {
        let mut signals = Vec::new();
        for trade in &data.trades {
            if trade.trade_type != TradeType::Buy {
                continue;
            }
            if self.clock.days_ago(&trade.date) > 30 {
                continue;
            }
            if let Some(w) = trade.weight_pct {
                if w < 1.0 {
                    continue;
                }
            }

            let desc = if trade.change_type == signal_core::ChangeType::NewPosition {
                format!("ARK {} NEW position ({} shares)", trade.etf, trade.shares)
            } else {
                format!("ARK {} bought ({} shares)", trade.etf, trade.shares)
            };

            signals.push(FormulaSignal {
                ticker: trade.ticker.clone(),
                source: SourceKind::Ark,
                direction: "Bullish".to_string(),
                date: trade.date.clone(),
                weight: 1.0,
                description: desc,
                raw_data: to_map(json!({
                    "etf": trade.etf,
                    "shares": trade.shares,
                    "weight_pct": trade.weight_pct,
                    "change_type": trade.change_type,
                    "change_pct": trade.change_pct,
                })),
            });
        }
        signals
    }

    /// Dark pool anomalies: Z ≥ 2, DPI ≥ 0.4, volume ≥ 500K, ≤ 7 days old.
    pub fn extract_darkpool(&self, data: &DarkPoolArtifact) -> Vec<FormulaSignal> {
        let mut signals = Vec::new();
        for entry in &data.tickers {
            if self.clock.days_ago(&entry.date) > 7 {
                continue;
            }
            if entry.z_score < 2.0 {
                continue;
            }
            let dpi = if entry.dpi > 1.0 {
                entry.dpi / 100.0
            } else {
                entry.dpi
            };
            if dpi < 0.4 {
                continue;
            }
            if entry.total_volume < 500_000 {
                continue;
            }

            signals.push(FormulaSignal {
                ticker: entry.ticker.clone(),
                source: SourceKind::Darkpool,
                direction: "Bullish".to_string(),
                date: entry.date.clone(),
                weight: 0.8,
                description: format!("DPI {:.2} (Z-score {:.1}σ)", dpi, entry.z_score),
                raw_data: to_map(json!({
                    "dpi": dpi,
                    "z_score": entry.z_score,
                    "total_volume": entry.total_volume,
                    "short_volume": entry.short_volume,
                })),
            });
        }
        signals
    }

    /// Institutional new positions or ≥10% increases worth ≥ $50M within
    /// 90 days.
    pub fn extract_institutions(&self, data: &InstitutionsArtifact) -> Vec<FormulaSignal> {
        let mut signals = Vec::new();
        for filing in &data.filings {
            if self.clock.days_ago(&filing.filing_date) > 90 {
                continue;
            }
            for holding in &filing.holdings {
                if holding.value < 50_000_000.0 {
                    continue;
                }
                let change_pct = holding.change_pct.unwrap_or(0.0);
                let qualifies = match holding.change_type {
                    Some(HoldingChange::New) => true,
                    Some(HoldingChange::Increased) => change_pct.abs() >= 10.0,
                    _ => false,
                };
                if !qualifies {
                    continue;
                }

                let display = if holding.ticker.is_empty() {
                    holding.issuer.chars().take(10).collect()
                } else {
                    holding.ticker.clone()
                };
                if display.is_empty() {
                    continue;
                }

                let action = if holding.change_type == Some(HoldingChange::New) {
                    "NEW position".to_string()
                } else {
                    format!("increased {change_pct:+.0}%")
                };

                signals.push(FormulaSignal {
                    ticker: display,
                    source: SourceKind::Institution,
                    direction: "Bullish".to_string(),
                    date: filing.filing_date.clone(),
                    weight: 0.6,
                    description: format!(
                        "{} {} (${:.0}M)",
                        filing.fund_name,
                        action,
                        holding.value / 1e6
                    ),
                    raw_data: to_map(json!({
                        "fund_name": filing.fund_name,
                        "value": holding.value,
                        "shares": holding.shares,
                        "change_type": holding.change_type,
                        "change_pct": change_pct,
                        "pct_portfolio": holding.pct_portfolio,
                    })),
                });
            }
        }
        signals
    }

    // ── Clustering ─────────────────────────────────────────────────────

    /// Pick the highest-total-weight cluster of signals within
    /// ±`window_days` of any anchor signal.
    pub fn find_best_cluster<'a>(&self, signals: &[&'a FormulaSignal]) -> Vec<&'a FormulaSignal> {
        if signals.len() <= 1 {
            return signals.to_vec();
        }

        let mut best_cluster = vec![signals[0]];
        let mut best_weight = signals[0].weight;

        for anchor in signals {
            let Some(anchor_date) = signal_core::clock::parse_date(&anchor.date) else {
                continue;
            };
            let mut cluster = Vec::new();
            let mut total_weight = 0.0;
            for s in signals {
                let Some(s_date) = signal_core::clock::parse_date(&s.date) else {
                    continue;
                };
                if (s_date - anchor_date).num_days().abs() <= self.window_days {
                    cluster.push(*s);
                    total_weight += s.weight;
                }
            }
            if total_weight > best_weight {
                best_cluster = cluster;
                best_weight = total_weight;
            }
        }

        best_cluster
    }

    /// Congress and ARK signals all count (more members / more ETFs is a
    /// stronger signal); for dark pool and institutions only the strongest
    /// survives.
    pub fn deduplicate_sources<'a>(&self, signals: &[&'a FormulaSignal]) -> Vec<&'a FormulaSignal> {
        let mut by_source: BTreeMap<SourceKind, Vec<&FormulaSignal>> = BTreeMap::new();
        for s in signals {
            by_source.entry(s.source).or_default().push(s);
        }

        let mut deduped = Vec::new();
        for (source, source_signals) in by_source {
            match source {
                SourceKind::Congress | SourceKind::Ark => deduped.extend(source_signals),
                _ => {
                    let strength = |s: &FormulaSignal| {
                        s.raw_data
                            .get("z_score")
                            .and_then(Value::as_f64)
                            .or_else(|| s.raw_data.get("value").and_then(Value::as_f64))
                            .unwrap_or(0.0)
                    };
                    if let Some(best) = source_signals
                        .into_iter()
                        .max_by(|a, b| strength(a).total_cmp(&strength(b)))
                    {
                        deduped.push(best);
                    }
                }
            }
        }
        deduped
    }

    // ── Scoring ────────────────────────────────────────────────────────

    pub fn score_cluster(&self, ticker: &str, signals: &[&FormulaSignal]) -> ConfluenceResult {
        let mut source_weights: BTreeMap<SourceKind, f64> = BTreeMap::new();
        for s in signals {
            source_weights.entry(s.source).or_insert(s.weight);
        }
        let base_score: f64 = source_weights.values().sum();

        let most_recent = signals
            .iter()
            .filter_map(|s| signal_core::clock::parse_date(&s.date))
            .max();
        let (days_since_last, signal_date) = match most_recent {
            Some(d) => (
                self.clock.days_since(&d.format("%Y-%m-%d").to_string()),
                d.format("%Y-%m-%d").to_string(),
            ),
            None => (30, String::new()),
        };

        let recency_multiplier = (1.0 - days_since_last as f64 / 30.0).max(0.0);

        let unique_source_count = source_weights.len();
        let signal_count_bonus = 0.5 * (unique_source_count as f64 - 1.0);

        let congress_excess = signals
            .iter()
            .filter(|s| s.source == SourceKind::Congress)
            .filter_map(|s| s.raw_data.get("excess_return_pct").and_then(Value::as_f64))
            .fold(0.0, f64::max);
        let excess_return_bonus = (congress_excess / 10.0).min(2.0);

        let raw_score = base_score * recency_multiplier + signal_count_bonus + excess_return_bonus;
        let normalized = (raw_score / self.max_possible_score * 10.0).min(10.0);

        let weight_of = |s: SourceKind| source_weights.get(&s).copied().unwrap_or(0.0);

        ConfluenceResult {
            ticker: ticker.to_string(),
            score: round2(normalized),
            direction: "Bullish".to_string(),
            sources: source_weights.keys().copied().collect(),
            source_count: unique_source_count,
            signal_date,
            congress_score: round2(weight_of(SourceKind::Congress) * recency_multiplier),
            ark_score: round2(weight_of(SourceKind::Ark) * recency_multiplier),
            darkpool_score: round2(weight_of(SourceKind::Darkpool) * recency_multiplier),
            institution_score: round2(weight_of(SourceKind::Institution) * recency_multiplier),
            base_score: round2(base_score),
            recency_multiplier: round3(recency_multiplier),
            signal_count_bonus: round2(signal_count_bonus),
            excess_return_bonus: round2(excess_return_bonus),
            raw_score: round2(raw_score),
            signals: signals.iter().map(|s| (*s).clone()).collect(),
        }
    }

    /// Full pipeline: extract → group → cluster → dedup → score → filter →
    /// sort by score descending.
    pub fn generate(&self, inputs: &FormulaInputs, min_score: Option<f64>) -> Vec<ConfluenceResult> {
        let min_score = min_score.unwrap_or(self.min_score);

        let mut all_signals = Vec::new();
        all_signals.extend(self.extract_congress(&inputs.congress));
        all_signals.extend(self.extract_ark(&inputs.ark_trades));
        all_signals.extend(self.extract_darkpool(&inputs.darkpool));
        all_signals.extend(self.extract_institutions(&inputs.institutions));

        if all_signals.is_empty() {
            return Vec::new();
        }

        let mut groups: BTreeMap<String, Vec<&FormulaSignal>> = BTreeMap::new();
        for s in &all_signals {
            let ticker = s.ticker.trim().to_uppercase();
            if ticker.is_empty() {
                continue;
            }
            groups.entry(ticker).or_default().push(s);
        }
        let group_count = groups.len();

        let mut results = Vec::new();
        for (ticker, signals) in groups {
            let cluster = self.find_best_cluster(&signals);
            let cluster = self.deduplicate_sources(&cluster);
            if !cluster.is_empty() {
                results.push(self.score_cluster(&ticker, &cluster));
            }
        }

        results.retain(|r| r.score >= min_score);
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::info!(
            "formula engine: {} confluence signals from {} tickers (min_score {min_score})",
            results.len(),
            group_count
        );
        results
    }
}

fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
