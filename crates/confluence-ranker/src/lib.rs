//! Directional confluence ranking on top of per-source convictions.
//!
//! Improvements over plain conviction aggregation:
//! - Direction detection: sources that agree on direction boost each other.
//! - Opposing signals create penalties instead of being ignored.
//! - Non-directional sources (dark pool, institutions, short interest) are
//!   discounted to 0.6× and never vote.
//! - A cap system keeps passive-only or single-active-source tickers from
//!   over-ranking.
//! - Additional sources past the top two earn diminishing returns.

pub mod direction;

use signal_core::{
    ConfluenceBreakdown, Contribution, ContributionStatus, Direction, DirectionVotes,
    RankedTicker, SmartMoneySignal, SourceKind,
};
use std::collections::BTreeMap;

pub use direction::{detect_directions, DirectionInputs, DirectionMap};

/// Discount applied to the effective conviction of neutral sources.
const NEUTRAL_BASE_DISCOUNT: f64 = 0.6;
/// Fraction of an opposing contribution charged as penalty.
const OPPOSITION_FACTOR: f64 = 0.7;
/// Diminishing-returns factors for the 3rd, 4th, ... positive source.
const EXTRA_RATES: [f64; 4] = [0.5, 0.3, 0.15, 0.1];

fn cap_by_aligned(aligned_active: usize) -> f64 {
    match aligned_active {
        0 => 40.0,
        1 => 55.0,
        2 => 85.0,
        3 => 95.0,
        _ => 100.0,
    }
}

fn cap_by_total(total_sources: usize) -> f64 {
    match total_sources.min(5) {
        1 => 45.0,
        2 => 65.0,
        3 => 80.0,
        4 => 92.0,
        5 => 97.0,
        _ => 100.0,
    }
}

fn confluence_multiplier(total_sources: usize) -> f64 {
    match total_sources.min(7) {
        1 => 1.0,
        2 => 1.08,
        3 => 1.18,
        4 => 1.28,
        5 => 1.35,
        _ => 1.40,
    }
}

/// Score one ticker given its per-source convictions and detected
/// directions. Returns `(score, breakdown)`.
pub fn score_ticker(
    source_convictions: &BTreeMap<SourceKind, f64>,
    ticker_directions: &BTreeMap<SourceKind, Direction>,
) -> (f64, ConfluenceBreakdown) {
    // Only sources with a non-zero conviction participate.
    let sources: Vec<(SourceKind, f64)> = source_convictions
        .iter()
        .filter(|(_, conv)| **conv > 0.0)
        .map(|(s, conv)| (*s, *conv))
        .collect();

    if sources.is_empty() {
        return (
            0.0,
            ConfluenceBreakdown {
                dominant: Direction::None,
                dir_votes: DirectionVotes::default(),
                base: 0.0,
                extra: 0.0,
                dir_bonus: 0.0,
                confluence_multiplier: 1.0,
                total_sources: 0,
                penalty: 0.0,
                cap: 0.0,
                aligned_active: 0,
                aligned_passive: 0,
                contributions: Vec::new(),
            },
        );
    }

    // The always-neutral set overrides any detected direction.
    let direction_of = |src: SourceKind| -> Direction {
        if src.is_always_neutral() {
            Direction::Neutral
        } else {
            ticker_directions
                .get(&src)
                .copied()
                .unwrap_or(Direction::Neutral)
        }
    };

    // Step 1: dominant direction by weighted conviction vote (ties bullish).
    let mut votes = DirectionVotes::default();
    for (src, conv) in &sources {
        match direction_of(*src) {
            Direction::Bullish => votes.bullish += src.weight() * conv,
            Direction::Bearish => votes.bearish += src.weight() * conv,
            _ => {}
        }
    }
    let dominant = if votes.bullish == 0.0 && votes.bearish == 0.0 {
        Direction::None
    } else if votes.bullish >= votes.bearish {
        Direction::Bullish
    } else {
        Direction::Bearish
    };

    // Step 2: classify every source's contribution.
    let mut contributions = Vec::with_capacity(sources.len());
    for (src, conv) in &sources {
        let weight = src.weight();
        let d = direction_of(*src);

        let (effective, contribution, status) = if d == Direction::Neutral || dominant == Direction::None {
            let eff = conv * NEUTRAL_BASE_DISCOUNT;
            (eff, weight * eff / 100.0, ContributionStatus::Neutral)
        } else if d == dominant {
            (*conv, weight * conv / 100.0, ContributionStatus::Aligned)
        } else {
            (
                0.0,
                -(weight * conv / 100.0 * OPPOSITION_FACTOR),
                ContributionStatus::Opposing,
            )
        };

        contributions.push(Contribution {
            source: *src,
            weight,
            conviction: *conv,
            effective_conviction: round2(effective),
            contribution: round2(contribution),
            status,
            direction: d,
        });
    }

    // Step 3: base from the top-2 positive contributions.
    let mut positive: Vec<&Contribution> = contributions
        .iter()
        .filter(|c| c.status != ContributionStatus::Opposing)
        .collect();
    positive.sort_by(|a, b| b.effective_conviction.total_cmp(&a.effective_conviction));
    let opposing: Vec<&Contribution> = contributions
        .iter()
        .filter(|c| c.status == ContributionStatus::Opposing)
        .collect();
    let penalty: f64 = opposing.iter().map(|c| c.contribution.abs()).sum();

    if positive.is_empty() {
        // Every source opposes the dominant direction; nothing to stand on.
        let breakdown = ConfluenceBreakdown {
            dominant,
            dir_votes: rounded_votes(&votes),
            base: 0.0,
            extra: 0.0,
            dir_bonus: 0.0,
            confluence_multiplier: 1.0,
            total_sources: 0,
            penalty: round2(penalty),
            cap: 50.0,
            aligned_active: 0,
            aligned_passive: 0,
            contributions,
        };
        return (0.0, breakdown);
    }

    let top2 = &positive[..positive.len().min(2)];
    let remaining = &positive[positive.len().min(2)..];

    let top2_contrib: f64 = top2.iter().map(|c| c.contribution).sum();
    let top2_weight: f64 = top2.iter().map(|c| c.weight).sum();
    let base = if top2_weight > 0.0 {
        top2_contrib / top2_weight * 100.0
    } else {
        0.0
    };

    // Step 4: diminishing-returns bonus for extra positive sources.
    let mut extra = 0.0;
    for (i, c) in remaining.iter().enumerate() {
        let rate = EXTRA_RATES.get(i).copied().unwrap_or(EXTRA_RATES[3]);
        extra += c.contribution * rate;
    }

    // Step 5: direction alignment bonus.
    let aligned_active = contributions
        .iter()
        .filter(|c| c.status == ContributionStatus::Aligned && c.source.is_active())
        .count();
    let aligned_passive = contributions
        .iter()
        .filter(|c| c.status == ContributionStatus::Aligned && !c.source.is_active())
        .count();
    let dir_bonus = (aligned_active.saturating_sub(1)) as f64 * 6.0 + aligned_passive as f64 * 2.0;

    // Step 7: the cap takes the more generous of the two ladders, so mixed
    // buy/sell tickers aren't punished just because alignment couldn't be
    // established.
    let total_sources = positive.len();
    let cap = cap_by_aligned(aligned_active).max(cap_by_total(total_sources));

    // Step 8: confluence multiplier.
    let confluence = confluence_multiplier(total_sources);

    let raw_score = (base + extra + dir_bonus - penalty) * confluence;
    let score = raw_score.clamp(0.0, cap);

    let breakdown = ConfluenceBreakdown {
        dominant,
        dir_votes: rounded_votes(&votes),
        base: round2(base),
        extra: round2(extra),
        dir_bonus: round2(dir_bonus),
        confluence_multiplier: confluence,
        total_sources,
        penalty: round2(penalty),
        cap,
        aligned_active,
        aligned_passive,
        contributions,
    };

    (round1(score), breakdown)
}

/// Rank conviction signals with directional confluence.
///
/// `directions` comes from [`detect_directions`] over the raw artifacts.
/// Output is sorted by `(score desc, source_count desc, ticker)`; pass a
/// `min_score` to filter.
pub fn rank(
    v2_signals: &[SmartMoneySignal],
    directions: &DirectionMap,
    min_score: f64,
) -> Vec<RankedTicker> {
    let mut ranked = Vec::with_capacity(v2_signals.len());

    for signal in v2_signals {
        if signal.ticker.is_empty() {
            continue;
        }

        let source_convictions: BTreeMap<SourceKind, f64> = SourceKind::ALL
            .iter()
            .map(|s| (*s, signal.conviction(*s)))
            .collect();

        let empty = BTreeMap::new();
        let ticker_directions = directions.get(&signal.ticker).unwrap_or(&empty);

        let (score, breakdown) = score_ticker(&source_convictions, ticker_directions);

        let multi_source_bonus = round1(breakdown.extra + breakdown.dir_bonus);

        ranked.push(RankedTicker {
            ticker: signal.ticker.clone(),
            company: signal.company.clone(),
            score,
            v2_score: signal.score,
            direction: breakdown.dominant,
            sources: signal.sources.clone(),
            source_count: signal.source_count,
            signal_date: signal.signal_date.clone(),
            congress_score: signal.congress_score,
            ark_score: signal.ark_score,
            darkpool_score: signal.darkpool_score,
            institution_score: signal.institution_score,
            insider_score: signal.insider_score,
            superinvestor_score: 0.0,
            short_interest_score: 0.0,
            multi_source_bonus,
            max_conviction: signal.max_conviction,
            v7_breakdown: breakdown,
            details: signal.details.clone(),
        });
    }

    ranked.retain(|r| r.score >= min_score);
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.source_count.cmp(&a.source_count))
            .then(a.ticker.cmp(&b.ticker))
    });

    tracing::info!("confluence ranker: {} tickers ranked", ranked.len());
    ranked
}

fn rounded_votes(v: &DirectionVotes) -> DirectionVotes {
    DirectionVotes {
        bullish: round2(v.bullish),
        bearish: round2(v.bearish),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn convictions(pairs: &[(SourceKind, f64)]) -> BTreeMap<SourceKind, f64> {
        pairs.iter().copied().collect()
    }

    fn dirs(pairs: &[(SourceKind, Direction)]) -> BTreeMap<SourceKind, Direction> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_no_sources_scores_zero() {
        let (score, breakdown) = score_ticker(&BTreeMap::new(), &BTreeMap::new());
        assert_eq!(score, 0.0);
        assert_eq!(breakdown.dominant, Direction::None);
    }

    // A lone dark-pool signal: always neutral, so no dominant direction,
    // effective conviction 0.6 × 80 = 48, and both cap ladders bind at 45.
    #[test]
    fn test_always_neutral_single_source_capped() {
        let conv = convictions(&[(SourceKind::Darkpool, 80.0)]);
        let (score, breakdown) = score_ticker(&conv, &BTreeMap::new());

        assert_eq!(breakdown.dominant, Direction::None);
        assert_eq!(breakdown.aligned_active, 0);
        assert_eq!(breakdown.total_sources, 1);
        assert_eq!(breakdown.cap, 45.0);
        assert_eq!(breakdown.confluence_multiplier, 1.0);
        assert_abs_diff_eq!(breakdown.base, 48.0, epsilon = 0.01);
        assert_eq!(score, 45.0);
    }

    #[test]
    fn test_darkpool_direction_override() {
        // Even a detected direction cannot make dark pool vote.
        let conv = convictions(&[(SourceKind::Darkpool, 80.0)]);
        let d = dirs(&[(SourceKind::Darkpool, Direction::Bullish)]);
        let (_, breakdown) = score_ticker(&conv, &d);
        assert_eq!(breakdown.contributions[0].direction, Direction::Neutral);
        assert_eq!(breakdown.dir_votes.bullish, 0.0);
    }

    #[test]
    fn test_aligned_sources_boost() {
        let conv = convictions(&[(SourceKind::Congress, 60.0), (SourceKind::Ark, 60.0)]);
        let d = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
        ]);
        let (score, breakdown) = score_ticker(&conv, &d);

        assert_eq!(breakdown.dominant, Direction::Bullish);
        assert_eq!(breakdown.aligned_active, 2);
        // base = (20·0.6 + 15·0.6) / 35 × 100 = 60, dir_bonus = 6
        assert_abs_diff_eq!(breakdown.base, 60.0, epsilon = 0.01);
        assert_eq!(breakdown.dir_bonus, 6.0);
        // (60 + 6) × 1.08 = 71.28, under cap 85
        assert_abs_diff_eq!(score, 71.3, epsilon = 0.05);
    }

    #[test]
    fn test_opposition_penalty_reduces_score() {
        // ARK bullish 60, insider bearish 50, institution neutral 40.
        let with_insider = convictions(&[
            (SourceKind::Ark, 60.0),
            (SourceKind::Insider, 50.0),
            (SourceKind::Institution, 40.0),
        ]);
        let without_insider = convictions(&[
            (SourceKind::Ark, 60.0),
            (SourceKind::Institution, 40.0),
        ]);
        let d = dirs(&[
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bearish),
        ]);

        let (with_score, with_breakdown) = score_ticker(&with_insider, &d);
        let (without_score, _) = score_ticker(&without_insider, &d);

        // The opposing source must strictly hurt.
        assert!(
            with_score < without_score,
            "with {with_score} vs without {without_score}"
        );
        assert!(with_breakdown.penalty > 0.0);
        let opposing: Vec<_> = with_breakdown
            .contributions
            .iter()
            .filter(|c| c.status == ContributionStatus::Opposing)
            .collect();
        assert_eq!(opposing.len(), 1);
        assert_eq!(opposing[0].effective_conviction, 0.0);
    }

    #[test]
    fn test_dominant_by_weighted_votes() {
        // Insider (20 × 50 = 1000) outvotes ARK (15 × 60 = 900).
        let conv = convictions(&[(SourceKind::Ark, 60.0), (SourceKind::Insider, 50.0)]);
        let d = dirs(&[
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bearish),
        ]);
        let (_, breakdown) = score_ticker(&conv, &d);
        assert_eq!(breakdown.dominant, Direction::Bearish);
        assert_abs_diff_eq!(breakdown.dir_votes.bullish, 900.0, epsilon = 0.01);
        assert_abs_diff_eq!(breakdown.dir_votes.bearish, 1000.0, epsilon = 0.01);
    }

    #[test]
    fn test_tie_votes_resolve_bullish() {
        let conv = convictions(&[(SourceKind::Congress, 50.0), (SourceKind::Insider, 50.0)]);
        let d = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Insider, Direction::Bearish),
        ]);
        let (_, breakdown) = score_ticker(&conv, &d);
        assert_eq!(breakdown.dominant, Direction::Bullish);
    }

    #[test]
    fn test_adding_aligned_source_never_decreases() {
        // Cap monotonicity: an extra aligned active source cannot hurt.
        let base_conv = convictions(&[(SourceKind::Congress, 70.0), (SourceKind::Ark, 60.0)]);
        let more_conv = convictions(&[
            (SourceKind::Congress, 70.0),
            (SourceKind::Ark, 60.0),
            (SourceKind::Insider, 50.0),
        ]);
        let d = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bullish),
        ]);
        let (base_score, _) = score_ticker(&base_conv, &d);
        let (more_score, _) = score_ticker(&more_conv, &d);
        assert!(more_score >= base_score, "{more_score} < {base_score}");
    }

    #[test]
    fn test_swapping_aligned_to_opposing_never_increases() {
        let conv = convictions(&[
            (SourceKind::Congress, 70.0),
            (SourceKind::Ark, 60.0),
            (SourceKind::Insider, 40.0),
        ]);
        let aligned = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bullish),
        ]);
        let opposing = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bearish),
        ]);
        let (aligned_score, _) = score_ticker(&conv, &aligned);
        let (opposed_score, _) = score_ticker(&conv, &opposing);
        assert!(opposed_score <= aligned_score);
    }

    #[test]
    fn test_diminishing_returns_extras() {
        let conv = convictions(&[
            (SourceKind::Congress, 80.0),
            (SourceKind::Ark, 70.0),
            (SourceKind::Insider, 60.0),
            (SourceKind::Darkpool, 50.0),
        ]);
        let d = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bullish),
        ]);
        let (_, breakdown) = score_ticker(&conv, &d);

        // Positive pool sorted by effective conviction:
        // congress 80, ark 70, insider 60, darkpool 30 (0.6 × 50).
        // Top-2 base from congress+insider (weights 20+20)... by effective
        // conviction congress(80) and ark(70) lead.
        assert_eq!(breakdown.total_sources, 4);
        // extras: insider contribution 20·60/100 = 12 × 0.5, darkpool
        // 15·30/100 = 4.5 × 0.3
        assert_abs_diff_eq!(breakdown.extra, 12.0 * 0.5 + 4.5 * 0.3, epsilon = 0.01);
    }

    #[test]
    fn test_score_bounds() {
        let conv = convictions(&[
            (SourceKind::Congress, 100.0),
            (SourceKind::Ark, 100.0),
            (SourceKind::Insider, 100.0),
            (SourceKind::Darkpool, 100.0),
            (SourceKind::Institution, 100.0),
        ]);
        let d = dirs(&[
            (SourceKind::Congress, Direction::Bullish),
            (SourceKind::Ark, Direction::Bullish),
            (SourceKind::Insider, Direction::Bullish),
        ]);
        let (score, _) = score_ticker(&conv, &d);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_rank_sorted_and_filtered() {
        let signal = |ticker: &str, congress: f64| SmartMoneySignal {
            ticker: ticker.to_string(),
            company: String::new(),
            score: congress,
            direction: "Bullish".to_string(),
            sources: vec![SourceKind::Congress],
            source_count: 1,
            signal_date: "2026-01-25".to_string(),
            congress_score: congress,
            ark_score: 0.0,
            darkpool_score: 0.0,
            institution_score: 0.0,
            insider_score: 0.0,
            max_conviction: congress,
            multi_source_bonus: 0.0,
            recency_factor: 1.0,
            details: Vec::new(),
        };

        let mut directions = DirectionMap::new();
        for t in ["AAA", "BBB"] {
            directions.insert(
                t.to_string(),
                dirs(&[(SourceKind::Congress, Direction::Bullish)]),
            );
        }

        let ranked = rank(&[signal("BBB", 40.0), signal("AAA", 90.0)], &directions, 0.0);
        assert_eq!(ranked[0].ticker, "AAA");
        assert!(ranked[0].score >= ranked[1].score);

        let filtered = rank(&[signal("BBB", 40.0), signal("AAA", 90.0)], &directions, ranked[1].score + 0.1);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_rank_deterministic() {
        let signal = SmartMoneySignal {
            ticker: "NVDA".to_string(),
            company: "NVIDIA Corp".to_string(),
            score: 80.0,
            direction: "Bullish".to_string(),
            sources: vec![SourceKind::Congress, SourceKind::Ark],
            source_count: 2,
            signal_date: "2026-01-25".to_string(),
            congress_score: 62.8,
            ark_score: 55.0,
            darkpool_score: 0.0,
            institution_score: 0.0,
            insider_score: 0.0,
            max_conviction: 62.8,
            multi_source_bonus: 20.0,
            recency_factor: 0.95,
            details: Vec::new(),
        };
        let mut directions = DirectionMap::new();
        directions.insert(
            "NVDA".to_string(),
            dirs(&[
                (SourceKind::Congress, Direction::Bullish),
                (SourceKind::Ark, Direction::Bullish),
            ]),
        );

        let a = rank(&[signal.clone()], &directions, 0.0);
        let b = rank(&[signal], &directions, 0.0);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
