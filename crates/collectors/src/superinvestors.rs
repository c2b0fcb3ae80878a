//! Superinvestor portfolio collector.
//!
//! Two kinds of activity are ingested and kept side by side, distinguished
//! by the `source` field:
//!
//!   - aggregate: per ticker, how many tracked managers are buying or
//!     selling this quarter,
//!   - per_manager: an individual manager's recent buys and sells.
//!
//! A holdings map (top holdings per tracked manager) rides along in the
//! same artifact. No dedup between the two activity kinds.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::{Deserialize, Serialize};
use signal_core::config::SUPERINVESTORS_FILE;
use signal_core::{
    clean_ticker, ActivityOrigin, ActivityType, ManagerPortfolio, Result, SuperinvestorActivity,
    SuperinvestorsArtifact,
};
use std::collections::{BTreeMap, BTreeSet};

/// One aggregate grand-portfolio row.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAggregateActivity {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub activity_type: String,
    #[serde(default)]
    pub portfolio_pct: f64,
    #[serde(default)]
    pub manager_count: u32,
    #[serde(default)]
    pub quarter: String,
}

/// One per-manager activity row.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManagerActivity {
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub company: Option<String>,
    /// Raw action text, e.g. "Buy", "Add 12.34%", "Reduce -33.76%".
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub portfolio_impact_pct: f64,
    #[serde(default)]
    pub quarter: String,
}

#[derive(Debug, Serialize)]
struct SuperinvestorsMetadata {
    schema_version: &'static str,
    total_count: usize,
    aggregate_count: usize,
    per_manager_count: usize,
    manager_count: usize,
    quarters: Vec<String>,
    skipped_count: usize,
    last_updated: String,
}

pub struct SuperinvestorsCollector {
    cache: CacheStore,
}

impl SuperinvestorsCollector {
    pub fn new(cache: CacheStore) -> Self {
        SuperinvestorsCollector { cache }
    }

    /// Classify a raw action string and pull out its percentage change.
    /// `None` for unrecognized actions.
    pub fn parse_action(action: &str) -> Option<(ActivityType, f64)> {
        let trimmed = action.trim();
        let activity_type = if trimmed.starts_with("Buy") {
            ActivityType::Buy
        } else if trimmed.starts_with("Add") {
            ActivityType::Add
        } else if trimmed.starts_with("Sell") {
            ActivityType::Sell
        } else if trimmed.starts_with("Reduce") {
            ActivityType::Reduce
        } else {
            return None;
        };

        let pct = extract_pct(trimmed).unwrap_or(0.0);
        let signed = match activity_type {
            ActivityType::Sell | ActivityType::Reduce => -pct.abs(),
            _ => pct,
        };
        Some((activity_type, signed))
    }

    fn normalize_aggregate(raw: &RawAggregateActivity) -> Option<SuperinvestorActivity> {
        let ticker = clean_ticker(&raw.ticker)?;
        let (activity_type, _) = Self::parse_action(&raw.activity_type)?;
        Some(SuperinvestorActivity {
            ticker,
            company: raw.company.clone(),
            manager: None,
            activity_type,
            portfolio_pct: Some(raw.portfolio_pct),
            manager_count: Some(raw.manager_count),
            change_pct: None,
            portfolio_impact_pct: None,
            quarter: raw.quarter.clone(),
            source: ActivityOrigin::Aggregate,
        })
    }

    fn normalize_per_manager(raw: &RawManagerActivity) -> Option<SuperinvestorActivity> {
        let ticker = clean_ticker(&raw.ticker)?;
        let (activity_type, change_pct) = Self::parse_action(&raw.activity)?;
        Some(SuperinvestorActivity {
            ticker,
            company: raw.company.clone(),
            manager: Some(raw.manager.clone()),
            activity_type,
            portfolio_pct: None,
            manager_count: None,
            change_pct: Some(change_pct),
            portfolio_impact_pct: Some(raw.portfolio_impact_pct),
            quarter: raw.quarter.clone(),
            source: ActivityOrigin::PerManager,
        })
    }

    /// Normalize both activity kinds plus the holdings map and write
    /// `superinvestors.json`.
    pub fn run(
        &self,
        aggregate: &[RawAggregateActivity],
        per_manager: &[RawManagerActivity],
        holdings: BTreeMap<String, ManagerPortfolio>,
    ) -> Result<CollectorReport> {
        let mut activity = Vec::new();
        let mut skipped = 0usize;

        for raw in aggregate {
            match Self::normalize_aggregate(raw) {
                Some(a) => activity.push(a),
                None => skipped += 1,
            }
        }
        for raw in per_manager {
            match Self::normalize_per_manager(raw) {
                Some(a) => activity.push(a),
                None => skipped += 1,
            }
        }

        let aggregate_count = activity
            .iter()
            .filter(|a| a.source == ActivityOrigin::Aggregate)
            .count();
        let quarters: BTreeSet<String> = activity
            .iter()
            .map(|a| a.quarter.clone())
            .filter(|q| !q.is_empty())
            .collect();

        let metadata = SuperinvestorsMetadata {
            schema_version: "1.0.0",
            total_count: activity.len(),
            aggregate_count,
            per_manager_count: activity.len() - aggregate_count,
            manager_count: holdings.len(),
            quarters: quarters.into_iter().collect(),
            skipped_count: skipped,
            last_updated: now_iso(),
        };

        let record_count = activity.len();
        self.cache.write(
            SUPERINVESTORS_FILE,
            &SuperinvestorsArtifact {
                metadata: serde_json::to_value(&metadata).unwrap_or_default(),
                activity,
                holdings,
            },
        )?;

        tracing::info!(
            "superinvestors: {record_count} activity rows, {} manager portfolios saved",
            metadata.manager_count
        );

        Ok(CollectorReport {
            source: "superinvestors",
            records: record_count,
            skipped,
        })
    }
}

fn extract_pct(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let tail = &text[start..];
    let end = tail
        .find('%')
        .unwrap_or(tail.len());
    tail[..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(
            SuperinvestorsCollector::parse_action("Buy"),
            Some((ActivityType::Buy, 0.0))
        );
        assert_eq!(
            SuperinvestorsCollector::parse_action("Add 12.34%"),
            Some((ActivityType::Add, 12.34))
        );
        assert_eq!(
            SuperinvestorsCollector::parse_action("Reduce -33.76%"),
            Some((ActivityType::Reduce, -33.76))
        );
        assert_eq!(
            SuperinvestorsCollector::parse_action("Reduce 33.76%"),
            Some((ActivityType::Reduce, -33.76))
        );
        assert_eq!(
            SuperinvestorsCollector::parse_action("Sell"),
            Some((ActivityType::Sell, 0.0))
        );
        assert_eq!(SuperinvestorsCollector::parse_action("Hold"), None);
    }

    #[test]
    fn test_run_keeps_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        let collector = SuperinvestorsCollector::new(cache);

        let aggregate = vec![RawAggregateActivity {
            ticker: "KO".to_string(),
            company: Some("Coca-Cola".to_string()),
            activity_type: "Buy".to_string(),
            portfolio_pct: 1.2,
            manager_count: 7,
            quarter: "Q3 2025".to_string(),
        }];
        let per_manager = vec![RawManagerActivity {
            manager: "Warren Buffett - Berkshire Hathaway".to_string(),
            ticker: "KO".to_string(),
            company: Some("Coca-Cola".to_string()),
            activity: "Add 4.20%".to_string(),
            portfolio_impact_pct: 0.8,
            quarter: "Q3 2025".to_string(),
        }];
        let mut holdings = BTreeMap::new();
        holdings.insert(
            "BRK".to_string(),
            ManagerPortfolio {
                code: "BRK".to_string(),
                manager: "Warren Buffett - Berkshire Hathaway".to_string(),
                period: "Q3 2025".to_string(),
                portfolio_date: "2025-09-30".to_string(),
                num_stocks: 40,
                portfolio_value: "266,378,899,000".to_string(),
                top_holdings: Vec::new(),
            },
        );

        let report = collector.run(&aggregate, &per_manager, holdings).unwrap();
        assert_eq!(report.records, 2);

        let artifact: SuperinvestorsArtifact = collector.cache.read_as(SUPERINVESTORS_FILE);
        assert_eq!(artifact.activity.len(), 2);
        // Both rows survive for the same ticker, distinguished by source.
        let origins: Vec<ActivityOrigin> = artifact.activity.iter().map(|a| a.source).collect();
        assert!(origins.contains(&ActivityOrigin::Aggregate));
        assert!(origins.contains(&ActivityOrigin::PerManager));
        assert!(artifact.holdings.contains_key("BRK"));
        assert_eq!(artifact.metadata["manager_count"], 1);
    }

    #[test]
    fn test_unknown_action_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        let collector = SuperinvestorsCollector::new(cache);

        let aggregate = vec![RawAggregateActivity {
            ticker: "X".to_string(),
            company: None,
            activity_type: "Hold".to_string(),
            portfolio_pct: 0.0,
            manager_count: 1,
            quarter: String::new(),
        }];
        let report = collector.run(&aggregate, &[], BTreeMap::new()).unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.skipped, 1);
    }
}
