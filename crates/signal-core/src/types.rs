//! Canonical data model shared by collectors, engines, and the ranker.
//!
//! Every struct here maps 1:1 onto the JSON artifact contract: collectors
//! write these shapes, the query layer flattens them into tables, and the
//! scoring engines read them back. Dates stay ISO `YYYY-MM-DD` strings at
//! the artifact boundary; parsing happens in [`crate::clock`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalized trade direction used across all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    Buy,
    Sell,
    Exchange,
}

/// ARK snapshot-diff change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NewPosition,
    Increased,
    Decreased,
    SoldOut,
}

impl ChangeType {
    /// NEW_POSITION / INCREASED map to Buy, DECREASED / SOLD_OUT to Sell.
    pub fn to_trade_type(self) -> TradeType {
        match self {
            ChangeType::NewPosition | ChangeType::Increased => TradeType::Buy,
            ChangeType::Decreased | ChangeType::SoldOut => TradeType::Sell,
        }
    }
}

/// Quarter-over-quarter change of a 13F holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldingChange {
    New,
    Increased,
    Decreased,
    Sold,
}

/// Superinvestor activity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    Buy,
    Add,
    Sell,
    Reduce,
}

impl ActivityType {
    pub fn is_buy(self) -> bool {
        matches!(self, ActivityType::Buy | ActivityType::Add)
    }
}

/// Whether a superinvestor row came from the aggregate grand-portfolio view
/// or from an individual manager's activity page. Both are kept; consumers
/// distinguish by this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOrigin {
    Aggregate,
    PerManager,
}

/// Signal source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Congress,
    Ark,
    Darkpool,
    Institution,
    Insider,
    Superinvestor,
    ShortInterest,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Congress,
        SourceKind::Insider,
        SourceKind::Ark,
        SourceKind::Darkpool,
        SourceKind::Institution,
        SourceKind::Superinvestor,
        SourceKind::ShortInterest,
    ];

    /// Confluence weight of the source.
    pub fn weight(self) -> f64 {
        match self {
            SourceKind::Congress => 20.0,
            SourceKind::Insider => 20.0,
            SourceKind::Ark => 15.0,
            SourceKind::Darkpool => 15.0,
            SourceKind::Institution => 10.0,
            SourceKind::Superinvestor => 10.0,
            SourceKind::ShortInterest => 10.0,
        }
    }

    /// Active sources reflect a deliberate human capital-allocation decision.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SourceKind::Congress
                | SourceKind::Insider
                | SourceKind::Ark
                | SourceKind::Darkpool
                | SourceKind::Institution
        )
    }

    /// Sources that never carry meaningful directional information.
    pub fn is_always_neutral(self) -> bool {
        matches!(
            self,
            SourceKind::Darkpool | SourceKind::Institution | SourceKind::ShortInterest
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Congress => "congress",
            SourceKind::Ark => "ark",
            SourceKind::Darkpool => "darkpool",
            SourceKind::Institution => "institution",
            SourceKind::Insider => "insider",
            SourceKind::Superinvestor => "superinvestor",
            SourceKind::ShortInterest => "short_interest",
        }
    }
}

/// Per-source or dominant direction in the confluence ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
    None,
}

// ── Source records ─────────────────────────────────────────────────────

/// A single legislator trade disclosure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CongressTrade {
    pub ticker: String,
    pub representative: String,
    #[serde(default)]
    pub bio_guide_id: Option<String>,
    #[serde(default)]
    pub party: String,
    #[serde(default)]
    pub chamber: String,
    pub trade_type: TradeType,
    #[serde(default)]
    pub amount_range: String,
    #[serde(default)]
    pub amount_min: f64,
    #[serde(default)]
    pub amount_max: f64,
    pub transaction_date: String,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub stock_return_pct: Option<f64>,
    #[serde(default)]
    pub spy_return_pct: Option<f64>,
    #[serde(default)]
    pub excess_return_pct: Option<f64>,
}

/// A derived ARK trade (from the daily snapshot diff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkTrade {
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    pub etf: String,
    pub trade_type: TradeType,
    pub date: String,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub weight_pct: Option<f64>,
    pub change_type: ChangeType,
    #[serde(default)]
    pub change_pct: Option<f64>,
}

/// An ARK ETF holding snapshot row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkHolding {
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    pub etf: String,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub weight_pct: f64,
    #[serde(default)]
    pub market_value: Option<f64>,
    #[serde(default)]
    pub date: String,
}

/// One day of off-exchange volume for one ticker (time-series input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarkPoolRecord {
    pub ticker: String,
    pub date: String,
    pub short_volume: i64,
    pub total_volume: i64,
    pub dpi: f64,
}

/// Analyzed dark-pool entry for the latest trading day of a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarkPoolEntry {
    pub ticker: String,
    pub date: String,
    pub short_volume: i64,
    pub total_volume: i64,
    pub dpi: f64,
    pub dpi_30d_mean: f64,
    pub dpi_30d_stddev: f64,
    pub z_score: f64,
    pub z_score_window: usize,
    pub is_anomaly: bool,
}

/// A single 13F holding, flattened from the infoTable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionHolding {
    pub cusip: String,
    /// Empty when the CUSIP is unmapped; `issuer` is the display fallback.
    #[serde(default)]
    pub ticker: String,
    pub issuer: String,
    #[serde(rename = "class", default)]
    pub security_class: String,
    /// Whole USD (the wire value is reported in thousands).
    pub value: f64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub put_call: Option<String>,
    #[serde(default)]
    pub pct_portfolio: f64,
    #[serde(default)]
    pub change_type: Option<HoldingChange>,
    #[serde(default)]
    pub change_pct: Option<f64>,
}

/// A quarterly 13F filing of one tracked institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionFiling {
    pub cik: String,
    pub fund_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub filing_date: String,
    pub quarter: String,
    #[serde(default)]
    pub accession: Option<String>,
    pub total_value: f64,
    pub holdings_count: usize,
    #[serde(default)]
    pub holdings: Vec<InstitutionHolding>,
}

/// A single insider (Form 4) trade row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    pub insider_name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub transaction_type: TradeType,
    pub trade_date: String,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub shares: Option<i64>,
}

/// Three or more distinct insiders buying the same ticker within 14 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsiderCluster {
    pub ticker: String,
    pub insider_count: usize,
    pub total_value: f64,
    pub insiders: Vec<String>,
    pub first_date: String,
    pub last_date: String,
}

/// One bi-monthly short-interest settlement row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortInterestRow {
    pub ticker: String,
    pub short_interest: i64,
    pub prior_short_interest: i64,
    pub change: i64,
    pub change_pct: f64,
    pub days_to_cover: f64,
    pub avg_daily_volume: i64,
    #[serde(default)]
    pub short_pct_float: f64,
    #[serde(default)]
    pub float_shares: i64,
    #[serde(default)]
    pub shares_outstanding: i64,
    pub settlement_date: String,
}

/// One superinvestor activity row (aggregate or per-manager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperinvestorActivity {
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub portfolio_pct: Option<f64>,
    /// How many tracked managers took this action (aggregate rows only).
    #[serde(default)]
    pub manager_count: Option<u32>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub portfolio_impact_pct: Option<f64>,
    #[serde(default)]
    pub quarter: String,
    pub source: ActivityOrigin,
}

/// A tracked manager's portfolio snapshot with its top holdings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerPortfolio {
    pub code: String,
    pub manager: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub portfolio_date: String,
    #[serde(default)]
    pub num_stocks: u32,
    #[serde(default)]
    pub portfolio_value: String,
    #[serde(default)]
    pub top_holdings: Vec<ManagerHolding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerHolding {
    pub ticker: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub portfolio_pct: f64,
    #[serde(default)]
    pub recent_activity: String,
    #[serde(default)]
    pub change_pct: f64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub reported_price: f64,
    #[serde(default)]
    pub value: f64,
}

// ── Engine output ──────────────────────────────────────────────────────

/// A single scored signal event from one source (ephemeral per ranking pass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub source: SourceKind,
    pub ticker: String,
    pub direction: String,
    pub date: String,
    pub description: String,
    /// 0-100 conviction within the source.
    pub conviction: f64,
    #[serde(default)]
    pub raw_data: serde_json::Map<String, serde_json::Value>,
}

/// The serialized form of a [`RawSignal`] without its raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDetail {
    pub source: SourceKind,
    pub description: String,
    pub date: String,
    pub conviction: f64,
}

impl From<&RawSignal> for SignalDetail {
    fn from(s: &RawSignal) -> Self {
        SignalDetail {
            source: s.source,
            description: s.description.clone(),
            date: s.date.clone(),
            conviction: s.conviction,
        }
    }
}

/// Conviction-scored smart money signal for one ticker (V2 output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartMoneySignal {
    pub ticker: String,
    #[serde(default)]
    pub company: String,
    /// 0-100 final score.
    pub score: f64,
    pub direction: String,
    pub sources: Vec<SourceKind>,
    pub source_count: usize,
    pub signal_date: String,
    #[serde(default)]
    pub congress_score: f64,
    #[serde(default)]
    pub ark_score: f64,
    #[serde(default)]
    pub darkpool_score: f64,
    #[serde(default)]
    pub institution_score: f64,
    #[serde(default)]
    pub insider_score: f64,
    #[serde(default)]
    pub max_conviction: f64,
    #[serde(default)]
    pub multi_source_bonus: f64,
    #[serde(default)]
    pub recency_factor: f64,
    #[serde(default)]
    pub details: Vec<SignalDetail>,
}

impl SmartMoneySignal {
    /// Per-source conviction for the confluence ranker. Sources the V2
    /// engine does not score report zero.
    pub fn conviction(&self, source: SourceKind) -> f64 {
        match source {
            SourceKind::Congress => self.congress_score,
            SourceKind::Ark => self.ark_score,
            SourceKind::Darkpool => self.darkpool_score,
            SourceKind::Institution => self.institution_score,
            SourceKind::Insider => self.insider_score,
            SourceKind::Superinvestor | SourceKind::ShortInterest => 0.0,
        }
    }
}

/// One source's contribution to a ticker's confluence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub source: SourceKind,
    pub weight: f64,
    pub conviction: f64,
    pub effective_conviction: f64,
    pub contribution: f64,
    pub status: ContributionStatus,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Aligned,
    Neutral,
    Opposing,
}

/// Weighted direction votes for a ticker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectionVotes {
    pub bullish: f64,
    pub bearish: f64,
}

/// Full scoring breakdown attached to every ranked ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceBreakdown {
    pub dominant: Direction,
    #[serde(default)]
    pub dir_votes: DirectionVotes,
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub extra: f64,
    #[serde(default)]
    pub dir_bonus: f64,
    #[serde(default)]
    pub confluence_multiplier: f64,
    #[serde(default)]
    pub total_sources: usize,
    #[serde(default)]
    pub penalty: f64,
    #[serde(default)]
    pub cap: f64,
    #[serde(default)]
    pub aligned_active: usize,
    #[serde(default)]
    pub aligned_passive: usize,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
}

/// Final user-visible ranking row (V7 output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTicker {
    pub ticker: String,
    #[serde(default)]
    pub company: String,
    pub score: f64,
    pub v2_score: f64,
    pub direction: Direction,
    pub sources: Vec<SourceKind>,
    pub source_count: usize,
    pub signal_date: String,
    #[serde(default)]
    pub congress_score: f64,
    #[serde(default)]
    pub ark_score: f64,
    #[serde(default)]
    pub darkpool_score: f64,
    #[serde(default)]
    pub institution_score: f64,
    #[serde(default)]
    pub insider_score: f64,
    #[serde(default)]
    pub superinvestor_score: f64,
    #[serde(default)]
    pub short_interest_score: f64,
    #[serde(default)]
    pub multi_source_bonus: f64,
    #[serde(default)]
    pub max_conviction: f64,
    pub v7_breakdown: ConfluenceBreakdown,
    #[serde(default)]
    pub details: Vec<SignalDetail>,
}

// ── Refresh log ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Failed,
}

/// Append-only refresh log row (one per collector/engine step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshLog {
    pub source: String,
    pub status: RefreshStatus,
    pub records_count: usize,
    pub duration_ms: u64,
    #[serde(default)]
    pub error_msg: Option<String>,
    pub timestamp: String,
}

// ── Artifact envelopes ─────────────────────────────────────────────────
//
// Every artifact is `{ <payload_key>: [...], "metadata": {...} }`. Readers
// tolerate missing keys; metadata stays schemaless at the envelope level so
// collector-specific summaries round-trip untouched.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CongressArtifact {
    #[serde(default)]
    pub trades: Vec<CongressTrade>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArkTradesArtifact {
    #[serde(default)]
    pub trades: Vec<ArkTrade>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArkHoldingsArtifact {
    #[serde(default)]
    pub holdings: Vec<ArkHolding>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DarkPoolArtifact {
    #[serde(default)]
    pub tickers: Vec<DarkPoolEntry>,
    #[serde(default)]
    pub anomalies: Vec<DarkPoolEntry>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstitutionsArtifact {
    #[serde(default)]
    pub filings: Vec<InstitutionFiling>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsidersArtifact {
    #[serde(default)]
    pub trades: Vec<InsiderTrade>,
    #[serde(default)]
    pub clusters: Vec<InsiderCluster>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortInterestArtifact {
    #[serde(default)]
    pub tickers: Vec<ShortInterestRow>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuperinvestorsArtifact {
    #[serde(default)]
    pub activity: Vec<SuperinvestorActivity>,
    #[serde(default)]
    pub holdings: BTreeMap<String, ManagerPortfolio>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingV2Artifact {
    #[serde(default)]
    pub signals: Vec<SmartMoneySignal>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingV3Artifact {
    #[serde(default)]
    pub signals: Vec<RankedTicker>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Uppercase, trim, and validate a ticker symbol. Returns `None` for empty
/// tickers, the `"--"` placeholder, and anything that is not 1-6 characters
/// (one dot allowed for multi-class shares).
pub fn clean_ticker(raw: &str) -> Option<String> {
    let t = raw.trim().to_uppercase();
    if t.is_empty() || t == "--" {
        return None;
    }
    let dots = t.matches('.').count();
    if dots > 1 {
        return None;
    }
    if t.len() > 6 && dots == 0 {
        return None;
    }
    Some(t)
}
