//! Conviction-based smart money scoring.
//!
//! Multi-source confluence rarely fires on its own (sources seldom overlap
//! on the same ticker in the same week), so each source gets a standalone
//! conviction score 0-100:
//!
//!   - Congress:     amount tier × recency + excess return + member count
//!   - ARK:          fund count × recency + position type + fund weight
//!   - Dark pool:    Z-score tier × recency + DPI + volume
//!   - Institutions: position value × recency + prestige + change + fund count
//!   - Insiders:     value tier × recency + cluster size + title seniority
//!
//! Final per-ticker score = max(source conviction) × source-count cap +
//! multi-source bonus (20 per extra source, capped at 40).

use serde_json::{json, Map, Value};
use signal_core::{
    clock::recency_decay, ArkHolding, ArkTrade, ArkHoldingsArtifact, ArkTradesArtifact,
    ChangeType, Clock, CongressArtifact, CongressTrade, DarkPoolArtifact, DarkPoolEntry,
    HoldingChange, InsidersArtifact, InsiderCluster, InsiderTrade, InstitutionFiling,
    InstitutionsArtifact, RawSignal, SignalDetail, SmartMoneySignal, SourceKind, TradeType,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Named congress amount ranges → approximate dollar midpoints, used when a
/// trade carries no explicit `amount_max`.
static AMOUNT_MAP: &[(&str, f64)] = &[
    ("$1,001 - $15,000", 8_000.0),
    ("$15,001 - $50,000", 32_500.0),
    ("$50,001 - $100,000", 75_000.0),
    ("$100,001 - $250,000", 175_000.0),
    ("$250,001 - $500,000", 375_000.0),
    ("$500,001 - $1,000,000", 750_000.0),
    ("$1,000,001 - $5,000,000", 3_000_000.0),
    ("$5,000,001 - $25,000,000", 15_000_000.0),
    ("$25,000,001 - $50,000,000", 37_500_000.0),
    ("Over $50,000,000", 75_000_000.0),
];

/// Fund names treated as top-tier for the institution prestige bonus.
static PRESTIGE_FUNDS: &[&str] = &[
    "berkshire",
    "citadel",
    "renaissance",
    "bridgewater",
    "two sigma",
    "de shaw",
    "millennium",
    "point72",
    "soros",
];

static SENIOR_TITLES: &[&str] = &["ceo", "cfo", "coo", "cto", "president", "chairman", "chief"];
static JUNIOR_TITLES: &[&str] = &["vp", "vice president", "director", "svp"];

/// Everything the engine scores in one pass.
#[derive(Debug, Default, Clone)]
pub struct SourceData {
    pub congress: CongressArtifact,
    pub ark_trades: ArkTradesArtifact,
    pub ark_holdings: ArkHoldingsArtifact,
    pub darkpool: DarkPoolArtifact,
    pub institutions: InstitutionsArtifact,
    pub insiders: InsidersArtifact,
}

/// Conviction-based scoring engine over the canonical artifacts.
pub struct ConvictionEngine {
    clock: Clock,
}

impl ConvictionEngine {
    pub fn new(clock: Clock) -> Self {
        ConvictionEngine { clock }
    }

    fn parse_amount(&self, amount_range: &str, amount_max: f64) -> f64 {
        if amount_max > 0.0 {
            return amount_max;
        }
        AMOUNT_MAP
            .iter()
            .find(|(range, _)| *range == amount_range)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    // ── Congress ───────────────────────────────────────────────────────

    /// Amount tier × 14-day recency decay, plus excess-return and
    /// multi-member bonuses. Buys within the last 60 days only.
    pub fn score_congress(&self, trades: &[CongressTrade]) -> Vec<RawSignal> {
        let mut by_ticker: BTreeMap<&str, Vec<&CongressTrade>> = BTreeMap::new();
        for t in trades {
            if t.trade_type != TradeType::Buy {
                continue;
            }
            let filter_date = t.filing_date.as_deref().unwrap_or(&t.transaction_date);
            if self.clock.days_ago(filter_date) > 60 {
                continue;
            }
            if t.ticker.is_empty() {
                continue;
            }
            by_ticker.entry(t.ticker.as_str()).or_default().push(t);
        }

        let mut results = Vec::new();
        for (ticker, ticker_trades) in by_ticker {
            let max_amount = ticker_trades
                .iter()
                .map(|t| self.parse_amount(&t.amount_range, t.amount_max))
                .fold(0.0, f64::max);

            let amount_score = if max_amount >= 5_000_000.0 {
                85.0
            } else if max_amount >= 1_000_000.0 {
                70.0
            } else if max_amount >= 500_000.0 {
                55.0
            } else if max_amount >= 250_000.0 {
                45.0
            } else if max_amount >= 100_000.0 {
                35.0
            } else if max_amount >= 50_000.0 {
                25.0
            } else if max_amount >= 15_000.0 {
                15.0
            } else {
                10.0
            };

            let days = ticker_trades
                .iter()
                .map(|t| {
                    let d = if t.transaction_date.is_empty() {
                        t.filing_date.as_deref().unwrap_or("")
                    } else {
                        &t.transaction_date
                    };
                    self.clock.days_ago(d)
                })
                .min()
                .unwrap_or(signal_core::clock::MALFORMED_DATE_DAYS);
            let recency = recency_decay(days, 14.0);

            let excess_bonus = ticker_trades
                .iter()
                .filter_map(|t| t.excess_return_pct)
                .filter(|er| *er > 0.0)
                .map(|er| (er * 1.5).min(15.0))
                .fold(0.0, f64::max);

            let unique_members: BTreeSet<&str> = ticker_trades
                .iter()
                .map(|t| t.representative.as_str())
                .collect();
            let member_bonus = (((unique_members.len() as f64) - 1.0) * 10.0).min(20.0);

            let conviction = (amount_score * recency + excess_bonus + member_bonus).min(100.0);

            let best = ticker_trades
                .iter()
                .max_by(|a, b| {
                    self.parse_amount(&a.amount_range, a.amount_max)
                        .total_cmp(&self.parse_amount(&b.amount_range, b.amount_max))
                })
                .copied()
                .unwrap_or(ticker_trades[0]);

            let party_initial = best.party.chars().next().unwrap_or('?');
            let mut desc = format!(
                "{} ({}) bought {}",
                best.representative, party_initial, best.amount_range
            );
            if unique_members.len() > 1 {
                desc.push_str(&format!(" + {} more", unique_members.len() - 1));
            }

            results.push(RawSignal {
                source: SourceKind::Congress,
                ticker: ticker.to_string(),
                direction: "Bullish".to_string(),
                date: best.transaction_date.clone(),
                description: desc,
                conviction: round1(conviction),
                raw_data: raw_map(json!({
                    "amount_score": amount_score,
                    "recency": round3(recency),
                    "excess_bonus": round1(excess_bonus),
                    "member_bonus": member_bonus,
                    "member_count": unique_members.len(),
                    "max_amount": max_amount,
                    "company": "",
                })),
            });
        }

        results
    }

    // ── ARK ────────────────────────────────────────────────────────────

    /// Fund-count tier × 14-day recency, NEW-position and weight bonuses.
    /// Buys within the last 30 days only.
    pub fn score_ark(&self, trades: &[ArkTrade], holdings: &[ArkHolding]) -> Vec<RawSignal> {
        let mut by_ticker: BTreeMap<&str, Vec<&ArkTrade>> = BTreeMap::new();
        for t in trades {
            if t.trade_type != TradeType::Buy {
                continue;
            }
            if self.clock.days_ago(&t.date) > 30 {
                continue;
            }
            if t.ticker.is_empty() {
                continue;
            }
            by_ticker.entry(t.ticker.as_str()).or_default().push(t);
        }

        let mut holdings_map: HashMap<&str, Vec<&ArkHolding>> = HashMap::new();
        for h in holdings {
            holdings_map.entry(h.ticker.as_str()).or_default().push(h);
        }

        let mut results = Vec::new();
        for (ticker, ticker_trades) in by_ticker {
            let funds: BTreeSet<&str> = ticker_trades.iter().map(|t| t.etf.as_str()).collect();
            let fund_score = match funds.len() {
                n if n >= 5 => 85.0,
                4 => 75.0,
                3 => 60.0,
                2 => 40.0,
                _ => 20.0,
            };

            let new_position = ticker_trades
                .iter()
                .any(|t| t.change_type == ChangeType::NewPosition);
            let type_bonus = if new_position { 15.0 } else { 5.0 };

            let max_weight = holdings_map
                .get(ticker)
                .map(|hs| hs.iter().map(|h| h.weight_pct).fold(0.0, f64::max))
                .unwrap_or(0.0);
            let weight_bonus = if max_weight > 5.0 {
                10.0
            } else if max_weight > 2.0 {
                5.0
            } else {
                0.0
            };

            let total_shares: i64 = ticker_trades.iter().map(|t| t.shares).sum();

            let days = ticker_trades
                .iter()
                .map(|t| self.clock.days_ago(&t.date))
                .min()
                .unwrap_or(signal_core::clock::MALFORMED_DATE_DAYS);
            let recency = recency_decay(days, 14.0);

            let conviction = (fund_score * recency + type_bonus + weight_bonus).min(100.0);

            let latest_date = ticker_trades
                .iter()
                .map(|t| t.date.as_str())
                .max()
                .unwrap_or("")
                .to_string();

            let fund_list: Vec<&str> = funds.iter().copied().collect();
            let mut desc = format!("ARK {}", fund_list.join("|"));
            if new_position {
                desc.push_str(" NEW");
            }
            desc.push_str(&format!(" bought {} shares", commas(total_shares)));

            let company = ticker_trades
                .iter()
                .find_map(|t| t.company.clone())
                .unwrap_or_default();

            results.push(RawSignal {
                source: SourceKind::Ark,
                ticker: ticker.to_string(),
                direction: "Bullish".to_string(),
                date: latest_date,
                description: desc,
                conviction: round1(conviction),
                raw_data: raw_map(json!({
                    "fund_count": funds.len(),
                    "funds": fund_list,
                    "total_shares": total_shares,
                    "new_position": new_position,
                    "weight_bonus": weight_bonus,
                    "recency": round3(recency),
                    "company": company,
                })),
            });
        }

        results
    }

    // ── Dark pool ──────────────────────────────────────────────────────

    /// Z-score tier × fast 7-day recency decay, DPI and volume bonuses.
    /// Entries with Z < 2 or older than 14 days are ignored; the strongest
    /// entry per ticker wins.
    pub fn score_darkpool(&self, entries: &[DarkPoolEntry]) -> Vec<RawSignal> {
        let mut strongest: BTreeMap<&str, &DarkPoolEntry> = BTreeMap::new();
        for e in entries {
            if self.clock.days_ago(&e.date) > 14 {
                continue;
            }
            if e.z_score < 2.0 {
                continue;
            }
            if e.ticker.is_empty() {
                continue;
            }
            strongest
                .entry(e.ticker.as_str())
                .and_modify(|cur| {
                    if e.z_score > cur.z_score {
                        *cur = e;
                    }
                })
                .or_insert(e);
        }

        let mut results = Vec::new();
        for (ticker, entry) in strongest {
            // Tolerate DPI stored as a percentage.
            let dpi = if entry.dpi > 1.0 {
                entry.dpi / 100.0
            } else {
                entry.dpi
            };
            let volume = entry.total_volume;

            let z_tier = if entry.z_score >= 5.0 {
                85.0
            } else if entry.z_score >= 4.0 {
                70.0
            } else if entry.z_score >= 3.0 {
                50.0
            } else {
                30.0
            };

            let dpi_bonus = if dpi >= 0.8 {
                15.0
            } else if dpi >= 0.6 {
                10.0
            } else if dpi >= 0.4 {
                5.0
            } else {
                0.0
            };

            let vol_bonus = if volume >= 10_000_000 {
                15.0
            } else if volume >= 5_000_000 {
                10.0
            } else if volume >= 1_000_000 {
                5.0
            } else {
                0.0
            };

            let days = self.clock.days_ago(&entry.date);
            let recency = recency_decay(days, 7.0);

            let conviction = (z_tier * recency + dpi_bonus + vol_bonus).min(100.0);

            results.push(RawSignal {
                source: SourceKind::Darkpool,
                ticker: ticker.to_string(),
                direction: "Bullish".to_string(),
                date: entry.date.clone(),
                description: format!(
                    "DPI {:.0}%, Z-score {:.1}σ, Vol {}",
                    dpi * 100.0,
                    entry.z_score,
                    commas(volume)
                ),
                conviction: round1(conviction),
                raw_data: raw_map(json!({
                    "z_score": entry.z_score,
                    "dpi": round4(dpi),
                    "total_volume": volume,
                    "z_tier": z_tier,
                    "dpi_bonus": dpi_bonus,
                    "vol_bonus": vol_bonus,
                    "recency": round3(recency),
                    "company": "",
                })),
            });
        }

        results
    }

    // ── Institutions ───────────────────────────────────────────────────

    /// Position-value tier × slow 30-day recency decay, fund prestige,
    /// change magnitude, and multi-fund bonuses. Positions ≥ $50M from
    /// filings within the last 120 days.
    pub fn score_institutions(&self, filings: &[InstitutionFiling]) -> Vec<RawSignal> {
        struct Candidate<'a> {
            value: f64,
            issuer: &'a str,
            fund_name: &'a str,
            filing_date: &'a str,
            is_prestige: bool,
            change_type: Option<HoldingChange>,
            change_pct: f64,
        }

        let mut by_ticker: BTreeMap<&str, Vec<Candidate<'_>>> = BTreeMap::new();
        for filing in filings {
            if self.clock.days_ago(&filing.filing_date) > 120 {
                continue;
            }
            let fund_lower = filing.fund_name.to_lowercase();
            let is_prestige = PRESTIGE_FUNDS.iter().any(|p| fund_lower.contains(p));

            for holding in &filing.holdings {
                if holding.value < 50_000_000.0 {
                    continue;
                }
                if holding.ticker.is_empty() {
                    continue;
                }
                by_ticker
                    .entry(holding.ticker.as_str())
                    .or_default()
                    .push(Candidate {
                        value: holding.value,
                        issuer: &holding.issuer,
                        fund_name: &filing.fund_name,
                        filing_date: &filing.filing_date,
                        is_prestige,
                        change_type: holding.change_type,
                        change_pct: holding.change_pct.unwrap_or(0.0),
                    });
            }
        }

        let mut results = Vec::new();
        for (ticker, holdings) in by_ticker {
            let Some(best) = holdings.iter().max_by(|a, b| a.value.total_cmp(&b.value)) else {
                continue;
            };
            let max_value = best.value;

            let val_tier = if max_value >= 1_000_000_000.0 {
                75.0
            } else if max_value >= 500_000_000.0 {
                55.0
            } else if max_value >= 100_000_000.0 {
                35.0
            } else {
                20.0
            };

            let prestige_bonus = if holdings.iter().any(|h| h.is_prestige) {
                15.0
            } else {
                0.0
            };

            let mut change_bonus: f64 = 0.0;
            for h in &holdings {
                if h.change_type == Some(HoldingChange::New) {
                    change_bonus = change_bonus.max(15.0);
                } else if h.change_pct.abs() >= 20.0 {
                    change_bonus = change_bonus.max(10.0);
                } else if h.change_pct.abs() >= 10.0 {
                    change_bonus = change_bonus.max(5.0);
                }
            }

            let unique_funds: BTreeSet<&str> = holdings.iter().map(|h| h.fund_name).collect();
            let fund_bonus = (((unique_funds.len() as f64) - 1.0) * 10.0).min(20.0);

            let days = holdings
                .iter()
                .map(|h| self.clock.days_ago(h.filing_date))
                .min()
                .unwrap_or(signal_core::clock::MALFORMED_DATE_DAYS);
            let recency = recency_decay(days, 30.0);

            let conviction =
                (val_tier * recency + prestige_bonus + change_bonus + fund_bonus).min(100.0);

            let ct = best
                .change_type
                .map(|c| format!("{c:?}"))
                .unwrap_or_else(|| "held".to_string());
            let mut desc = format!("{} {} ${:.0}M", best.fund_name, ct, max_value / 1e6);
            if unique_funds.len() > 1 {
                desc.push_str(&format!(" + {} more funds", unique_funds.len() - 1));
            }

            results.push(RawSignal {
                source: SourceKind::Institution,
                ticker: ticker.to_string(),
                direction: "Bullish".to_string(),
                date: best.filing_date.to_string(),
                description: desc,
                conviction: round1(conviction),
                raw_data: raw_map(json!({
                    "max_value": max_value,
                    "val_tier": val_tier,
                    "prestige_bonus": prestige_bonus,
                    "change_bonus": change_bonus,
                    "fund_bonus": fund_bonus,
                    "fund_count": unique_funds.len(),
                    "recency": round3(recency),
                    "company": best.issuer,
                })),
            });
        }

        results
    }

    // ── Insiders ───────────────────────────────────────────────────────

    /// Value tier × 14-day recency, cluster-size and title-seniority
    /// bonuses. Buys ≥ $10K within the last 45 days.
    pub fn score_insiders(
        &self,
        trades: &[InsiderTrade],
        clusters: &[InsiderCluster],
    ) -> Vec<RawSignal> {
        let cluster_map: HashMap<&str, &InsiderCluster> =
            clusters.iter().map(|c| (c.ticker.as_str(), c)).collect();

        let mut by_ticker: BTreeMap<&str, Vec<&InsiderTrade>> = BTreeMap::new();
        for t in trades {
            if t.transaction_type != TradeType::Buy {
                continue;
            }
            let filter_date = t.filing_date.as_deref().unwrap_or(&t.trade_date);
            if self.clock.days_ago(filter_date) > 45 {
                continue;
            }
            if t.value < 10_000.0 {
                continue;
            }
            if t.ticker.is_empty() {
                continue;
            }
            by_ticker.entry(t.ticker.as_str()).or_default().push(t);
        }

        let mut results = Vec::new();
        for (ticker, ticker_trades) in by_ticker {
            let max_value = ticker_trades.iter().map(|t| t.value).fold(0.0, f64::max);

            let val_tier = if max_value >= 5_000_000.0 {
                80.0
            } else if max_value >= 1_000_000.0 {
                65.0
            } else if max_value >= 500_000.0 {
                50.0
            } else if max_value >= 100_000.0 {
                30.0
            } else if max_value >= 50_000.0 {
                15.0
            } else {
                10.0
            };

            let unique_insiders: BTreeSet<&str> = ticker_trades
                .iter()
                .map(|t| t.insider_name.as_str())
                .collect();
            let insider_count = unique_insiders.len();
            let cluster_count = cluster_map
                .get(ticker)
                .map(|c| c.insider_count.max(insider_count))
                .unwrap_or(insider_count);

            let cluster_bonus = if cluster_count >= 5 {
                25.0
            } else if cluster_count >= 4 {
                20.0
            } else if cluster_count >= 3 {
                15.0
            } else {
                0.0
            };

            let mut title_bonus: f64 = 0.0;
            for t in &ticker_trades {
                let title = t.title.as_deref().unwrap_or("").to_lowercase();
                if SENIOR_TITLES.iter().any(|s| title.contains(s)) {
                    title_bonus = title_bonus.max(10.0);
                } else if JUNIOR_TITLES.iter().any(|s| title.contains(s)) {
                    title_bonus = title_bonus.max(5.0);
                }
            }

            let days = ticker_trades
                .iter()
                .map(|t| {
                    let d = if t.trade_date.is_empty() {
                        t.filing_date.as_deref().unwrap_or("")
                    } else {
                        &t.trade_date
                    };
                    self.clock.days_ago(d)
                })
                .min()
                .unwrap_or(signal_core::clock::MALFORMED_DATE_DAYS);
            let recency = recency_decay(days, 14.0);

            let conviction = (val_tier * recency + cluster_bonus + title_bonus).min(100.0);

            let best = ticker_trades
                .iter()
                .max_by(|a, b| a.value.total_cmp(&b.value))
                .copied()
                .unwrap_or(ticker_trades[0]);

            let mut desc = best.insider_name.clone();
            if let Some(title) = best.title.as_deref().filter(|t| !t.is_empty()) {
                desc.push_str(&format!(" ({title})"));
            }
            desc.push_str(&format!(" bought ${}", commas(max_value as i64)));
            if cluster_count >= 3 {
                desc.push_str(&format!(" [{cluster_count} insiders cluster]"));
            } else if insider_count > 1 {
                desc.push_str(&format!(" + {} more", insider_count - 1));
            }

            let company = ticker_trades
                .iter()
                .find_map(|t| t.company.clone())
                .unwrap_or_default();

            results.push(RawSignal {
                source: SourceKind::Insider,
                ticker: ticker.to_string(),
                direction: "Bullish".to_string(),
                date: best.trade_date.clone(),
                description: desc,
                conviction: round1(conviction),
                raw_data: raw_map(json!({
                    "max_value": max_value,
                    "val_tier": val_tier,
                    "cluster_bonus": cluster_bonus,
                    "title_bonus": title_bonus,
                    "insider_count": insider_count,
                    "cluster_count": cluster_count,
                    "recency": round3(recency),
                    "company": company,
                })),
            });
        }

        results
    }

    // ── Aggregation ────────────────────────────────────────────────────

    /// Score every source, merge per ticker, and apply the source-count
    /// cap and multi-source bonus. Sorted by `(score desc, source_count
    /// desc, ticker)`.
    pub fn generate(&self, data: &SourceData, min_score: f64) -> Vec<SmartMoneySignal> {
        let mut details_by_ticker: BTreeMap<String, Vec<RawSignal>> = BTreeMap::new();
        let mut add = |signals: Vec<RawSignal>| {
            for s in signals {
                details_by_ticker.entry(s.ticker.clone()).or_default().push(s);
            }
        };

        add(self.score_congress(&data.congress.trades));
        add(self.score_ark(&data.ark_trades.trades, &data.ark_holdings.holdings));
        add(self.score_darkpool(&data.darkpool.tickers));
        add(self.score_institutions(&data.institutions.filings));
        add(self.score_insiders(&data.insiders.trades, &data.insiders.clusters));

        let ticker_count = details_by_ticker.len();
        let mut results = Vec::new();
        for (ticker, details) in details_by_ticker {
            let mut source_convictions: BTreeMap<SourceKind, f64> = BTreeMap::new();
            for d in &details {
                let entry = source_convictions.entry(d.source).or_insert(0.0);
                *entry = entry.max(d.conviction);
            }

            let max_conviction = source_convictions.values().copied().fold(0.0, f64::max);
            let source_count = source_convictions.len();
            let multi_bonus = (((source_count as f64) - 1.0) * 20.0).min(40.0);

            // Single sources can't reach 100; confluence has to do that.
            let source_cap = match source_count {
                1 => 0.75,
                2 => 0.85,
                3 => 0.90,
                _ => 1.0,
            };

            let signal_date = details
                .iter()
                .map(|d| d.date.as_str())
                .filter(|d| !d.is_empty())
                .max()
                .unwrap_or("")
                .to_string();
            let recency_days = if signal_date.is_empty() {
                30
            } else {
                self.clock.days_ago(&signal_date)
            };

            let final_score = (max_conviction * source_cap + multi_bonus).min(100.0);

            let company = details
                .iter()
                .filter_map(|d| d.raw_data.get("company").and_then(|v| v.as_str()))
                .find(|c| !c.is_empty())
                .unwrap_or("")
                .to_string();

            let conviction_of = |s: SourceKind| round1(*source_convictions.get(&s).unwrap_or(&0.0));

            results.push(SmartMoneySignal {
                ticker,
                company,
                score: round1(final_score),
                direction: "Bullish".to_string(),
                sources: source_convictions.keys().copied().collect(),
                source_count,
                signal_date,
                congress_score: conviction_of(SourceKind::Congress),
                ark_score: conviction_of(SourceKind::Ark),
                darkpool_score: conviction_of(SourceKind::Darkpool),
                institution_score: conviction_of(SourceKind::Institution),
                insider_score: conviction_of(SourceKind::Insider),
                max_conviction: round1(max_conviction),
                multi_source_bonus: round1(multi_bonus),
                recency_factor: round3(recency_decay(recency_days, 14.0)),
                details: details.iter().map(SignalDetail::from).collect(),
            });
        }

        results.retain(|r| r.score >= min_score);
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.source_count.cmp(&a.source_count))
                .then(a.ticker.cmp(&b.ticker))
        });

        tracing::info!(
            "conviction engine: {} signals from {} tickers",
            results.len(),
            ticker_count
        );
        results
    }
}

fn raw_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Thousands-separated integer formatting for descriptions.
fn commas(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}
