//! Dark-pool (off-exchange volume) collector.
//!
//! Consumes daily RegSHO short-volume files, pipe-delimited with header
//! `Date|Symbol|ShortVolume|ShortExemptVolume|TotalVolume|Market`, builds
//! per-ticker DPI time series over a rolling window of trading days, runs
//! the anomaly detector, and writes `darkpool.json`.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use serde::Serialize;
use signal_core::config::{ARK_HOLDINGS_FILE, ARK_TRADES_FILE, CONGRESS_FILE, DARKPOOL_FILE};
use signal_core::normalize::dpi;
use signal_core::{
    ArkHoldingsArtifact, ArkTradesArtifact, Clock, CongressArtifact, DarkPoolArtifact,
    DarkPoolRecord, Result,
};
use std::collections::BTreeSet;
use std::path::Path;

/// Trading days of history the collector expects to be fed.
pub const HISTORY_DAYS: usize = 45;

/// One day of wire data: ISO date plus the raw file content.
#[derive(Debug, Clone)]
pub struct DayFile {
    pub date: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct DarkPoolMetadata {
    schema_version: &'static str,
    total_tickers: usize,
    anomaly_count: usize,
    avg_dpi: f64,
    highest_z: f64,
    trading_days: usize,
    date_range: String,
    last_updated: String,
}

pub struct DarkPoolCollector {
    cache: CacheStore,
    clock: Clock,
}

impl DarkPoolCollector {
    pub fn new(cache: CacheStore, clock: Clock) -> Self {
        DarkPoolCollector { cache, clock }
    }

    /// Parse one RegSHO day file into per-ticker volume records.
    ///
    /// Rows with zero total volume are excluded (no meaningful DPI).
    /// Short rows and unparseable numbers are skipped.
    pub fn parse_day(date: &str, content: &str) -> Vec<DarkPoolRecord> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut records = Vec::new();
        for row in reader.records() {
            let Ok(row) = row else { continue };
            if row.len() < 5 {
                continue;
            }
            let ticker = row.get(1).unwrap_or("").trim().to_string();
            if ticker.is_empty() {
                continue;
            }
            let (Ok(short_volume), Ok(total_volume)) = (
                row.get(2).unwrap_or("").trim().parse::<i64>(),
                row.get(4).unwrap_or("").trim().parse::<i64>(),
            ) else {
                continue;
            };
            if total_volume == 0 {
                continue;
            }

            records.push(DarkPoolRecord {
                ticker,
                date: date.to_string(),
                short_volume,
                total_volume,
                dpi: dpi(short_volume, total_volume),
            });
        }
        records
    }

    /// Tickers present in the congress and ARK artifacts. Restricting the
    /// dark-pool scan to this universe keeps the series manageable: one
    /// RegSHO day covers every listed symbol.
    pub fn signal_universe(&self) -> BTreeSet<String> {
        let mut universe = BTreeSet::new();

        let congress: CongressArtifact = self.cache.read_as(CONGRESS_FILE);
        for t in &congress.trades {
            add_universe_ticker(&mut universe, &t.ticker);
        }
        let ark_trades: ArkTradesArtifact = self.cache.read_as(ARK_TRADES_FILE);
        for t in &ark_trades.trades {
            add_universe_ticker(&mut universe, &t.ticker);
        }
        let ark_holdings: ArkHoldingsArtifact = self.cache.read_as(ARK_HOLDINGS_FILE);
        for h in &ark_holdings.holdings {
            add_universe_ticker(&mut universe, &h.ticker);
        }

        universe
    }

    /// Run the collection over pre-fetched day files (oldest or newest
    /// first; they are sorted internally). When `universe_only` is set,
    /// only tickers in [`Self::signal_universe`] are analyzed.
    pub fn run(&self, days: &[DayFile], universe_only: bool) -> Result<CollectorReport> {
        let universe = if universe_only {
            Some(self.signal_universe())
        } else {
            None
        };
        if let Some(u) = &universe {
            tracing::info!("dark pool: signal universe of {} tickers", u.len());
        }

        let mut sorted_days: Vec<&DayFile> = days.iter().collect();
        sorted_days.sort_by(|a, b| a.date.cmp(&b.date));

        let mut records = Vec::new();
        for day in &sorted_days {
            let mut day_records = Self::parse_day(&day.date, &day.content);
            if let Some(u) = &universe {
                day_records.retain(|r| u.contains(&r.ticker));
            }
            records.extend(day_records);
        }

        let result = darkpool_detector::detect(&records, &self.clock);

        let date_range = match (sorted_days.first(), sorted_days.last()) {
            (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
            _ => String::new(),
        };
        let avg_dpi = if result.entries.is_empty() {
            0.0
        } else {
            result.entries.iter().map(|e| e.dpi).sum::<f64>() / result.entries.len() as f64
        };
        let metadata = DarkPoolMetadata {
            schema_version: "1.0.0",
            total_tickers: result.entries.len(),
            anomaly_count: result.anomalies.len(),
            avg_dpi: (avg_dpi * 10_000.0).round() / 10_000.0,
            highest_z: result.anomalies.first().map(|a| a.z_score).unwrap_or(0.0),
            trading_days: sorted_days.len(),
            date_range,
            last_updated: now_iso(),
        };

        let ticker_count = result.entries.len();
        self.cache.write(
            DARKPOOL_FILE,
            &DarkPoolArtifact {
                tickers: result.entries,
                anomalies: result.anomalies,
                metadata: serde_json::to_value(&metadata).unwrap_or_default(),
            },
        )?;

        tracing::info!(
            "dark pool: {ticker_count} tickers processed, {} anomalies flagged",
            metadata.anomaly_count
        );

        Ok(CollectorReport {
            source: "darkpool",
            records: ticker_count,
            skipped: 0,
        })
    }

    /// Load day files from a directory of `shvol{YYYYMMDD}.txt`-style raw
    /// files and run. Weekend-dated files never exist, so the listing is
    /// simply everything parseable in the directory.
    pub fn run_from_dir(&self, dir: &Path, universe_only: bool) -> Result<CollectorReport> {
        let mut days = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(date) = extract_date(&name) else {
                continue;
            };
            let content = std::fs::read_to_string(entry.path())?;
            days.push(DayFile { date, content });
        }
        if days.is_empty() {
            return Err(signal_core::SignalError::InputMissing(format!(
                "no RegSHO day files in {}",
                dir.display()
            )));
        }
        self.run(&days, universe_only)
    }
}

fn add_universe_ticker(universe: &mut BTreeSet<String>, raw: &str) {
    let t = raw.trim().to_uppercase();
    if !t.is_empty() && t.len() <= 5 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        universe.insert(t);
    }
}

/// Pull an eight-digit `YYYYMMDD` out of a filename.
fn extract_date(name: &str) -> Option<String> {
    let digits: Vec<char> = name.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }
    let run: String = digits[digits.len() - 8..].iter().collect();
    let (y, md) = run.split_at(4);
    let (m, d) = md.split_at(2);
    let iso = format!("{y}-{m}-{d}");
    signal_core::clock::parse_date(&iso).map(|_| iso)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date|Symbol|ShortVolume|ShortExemptVolume|TotalVolume|Market\n";

    fn collector(reference: &str) -> (tempfile::TempDir, DarkPoolCollector) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        (dir, DarkPoolCollector::new(cache, Clock::fixed(reference)))
    }

    #[test]
    fn test_parse_day() {
        let content = format!(
            "{HEADER}20260126|AMC|45000000|12000|50800000|B,Q,N\n20260126|GME|900000|500|2000000|B\n"
        );
        let records = DarkPoolCollector::parse_day("2026-01-26", &content);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ticker, "AMC");
        assert_eq!(records[0].short_volume, 45_000_000);
        assert_eq!(records[0].total_volume, 50_800_000);
        assert!((records[0].dpi - 45_000_000.0 / 50_800_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_day_skips_bad_rows() {
        let content = format!(
            "{HEADER}20260126|AMC|x|12000|50800000|B\n20260126|ZERO|100|0|0|B\nshort|row\n20260126|OK|10|0|100|B\n"
        );
        let records = DarkPoolCollector::parse_day("2026-01-26", &content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ticker, "OK");
    }

    #[test]
    fn test_run_detects_spike() {
        let (_dir, c) = collector("2026-01-26");

        // 31 trading days ending at the reference date: 30 calm, 1 spike.
        let end = signal_core::clock::parse_date("2026-01-26").unwrap();
        let mut days = Vec::new();
        for i in 0..31 {
            let date = end - chrono::Duration::days(30 - i);
            let iso = date.format("%Y-%m-%d").to_string();
            let dpi = if i == 30 { 0.89 } else if i % 2 == 0 { 0.43 } else { 0.47 };
            let total = 50_800_000i64;
            let short = (dpi * total as f64) as i64;
            days.push(DayFile {
                date: iso.clone(),
                content: format!("{HEADER}{}|AMC|{short}|0|{total}|B\n", iso.replace('-', "")),
            });
        }

        let report = c.run(&days, false).unwrap();
        assert_eq!(report.records, 1);

        let artifact: DarkPoolArtifact = c.cache.read_as(DARKPOOL_FILE);
        assert_eq!(artifact.anomalies.len(), 1);
        let amc = &artifact.anomalies[0];
        assert_eq!(amc.ticker, "AMC");
        assert!((amc.dpi - 0.89).abs() < 1e-9);
        assert!(amc.z_score >= 2.0);
        assert!(amc.is_anomaly);
        assert_eq!(artifact.metadata["anomaly_count"], 1);
        assert_eq!(artifact.metadata["trading_days"], 31);
    }

    #[test]
    fn test_universe_restriction() {
        let (_dir, c) = collector("2026-01-26");
        // Congress artifact puts only NVDA in the universe.
        c.cache
            .write(
                CONGRESS_FILE,
                &serde_json::json!({"trades": [{
                    "ticker": "NVDA", "representative": "X", "trade_type": "Buy",
                    "transaction_date": "2026-01-20",
                }]}),
            )
            .unwrap();

        let universe = c.signal_universe();
        assert!(universe.contains("NVDA"));
        assert_eq!(universe.len(), 1);
    }

    #[test]
    fn test_extract_date() {
        assert_eq!(extract_date("CNMSshvol20260126.txt"), Some("2026-01-26".to_string()));
        assert_eq!(extract_date("notes.txt"), None);
        assert_eq!(extract_date("shvol99999999.txt"), None);
    }
}
