//! Dark-pool (off-exchange) anomaly detection.
//!
//! DPI = ShortVolume / TotalVolume per ticker-day. The detector compares
//! the latest day's DPI against a rolling baseline of prior trading days:
//!
//!   Z = (DPI_today - mean_30d) / stddev_30d
//!   anomaly ⇔ Z ≥ 2σ AND DPI ≥ 0.4 AND volume ≥ 500K AND ≤ 7 days old
//!
//! Stateless and referentially transparent given the time series and a
//! reference date; no persistence in here.

use signal_core::{Clock, DarkPoolEntry, DarkPoolRecord};
use statrs::statistics::Statistics;
use std::collections::HashMap;

/// Rolling window used as the statistical baseline.
pub const Z_SCORE_WINDOW: usize = 30;
/// Minimum observations required before a ticker is scored at all.
pub const MIN_HISTORY_DAYS: usize = 20;
/// 95% confidence gate.
pub const Z_SCORE_THRESHOLD: f64 = 2.0;
/// Minimum Dark Pool Index for an anomaly.
pub const MIN_DPI: f64 = 0.4;
/// Minimum daily off-exchange volume (shares) for an anomaly.
pub const MIN_VOLUME: i64 = 500_000;
/// Anomalies older than this are stale.
pub const RECENCY_DAYS: i64 = 7;
/// Floor for the baseline stddev so quiet tickers don't blow up the Z.
const MIN_STDDEV: f64 = 0.001;

/// Output of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    /// Latest entry per ticker, ranked by Z-score descending.
    pub entries: Vec<DarkPoolEntry>,
    /// The subset flagged as anomalies, ranked by Z-score descending.
    pub anomalies: Vec<DarkPoolEntry>,
}

/// Run anomaly detection over per-ticker DPI time series.
///
/// `records` may arrive in any order; they are grouped by ticker and
/// sorted oldest-first before the window is applied. Tickers with fewer
/// than [`MIN_HISTORY_DAYS`] observations are skipped.
pub fn detect(records: &[DarkPoolRecord], clock: &Clock) -> DetectionResult {
    let mut by_ticker: HashMap<&str, Vec<&DarkPoolRecord>> = HashMap::new();
    for r in records {
        if r.ticker.is_empty() {
            continue;
        }
        by_ticker.entry(r.ticker.as_str()).or_default().push(r);
    }

    let mut entries = Vec::new();
    for (ticker, mut series) in by_ticker {
        series.sort_by(|a, b| a.date.cmp(&b.date));
        if let Some(entry) = score_series(ticker, &series, clock) {
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| {
        b.z_score
            .partial_cmp(&a.z_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let anomalies: Vec<DarkPoolEntry> = entries.iter().filter(|e| e.is_anomaly).cloned().collect();

    tracing::info!(
        "dark pool: {} tickers scored, {} anomalies",
        entries.len(),
        anomalies.len()
    );

    DetectionResult { entries, anomalies }
}

/// Score one ticker's oldest-first series; `None` when history is too thin.
fn score_series(ticker: &str, series: &[&DarkPoolRecord], clock: &Clock) -> Option<DarkPoolEntry> {
    if series.len() < MIN_HISTORY_DAYS {
        tracing::debug!(
            "{ticker}: only {} days of history, need {MIN_HISTORY_DAYS}",
            series.len()
        );
        return None;
    }

    let dpis: Vec<f64> = series.iter().map(|r| r.dpi).collect();

    // Baseline excludes the current day: the 30 prior observations when
    // available, otherwise everything before the last.
    let (window, current) = if dpis.len() >= Z_SCORE_WINDOW + 1 {
        (&dpis[dpis.len() - (Z_SCORE_WINDOW + 1)..dpis.len() - 1], dpis[dpis.len() - 1])
    } else {
        (&dpis[..dpis.len() - 1], dpis[dpis.len() - 1])
    };

    let mean = window.mean();
    let stddev = window.std_dev().max(MIN_STDDEV);
    let z_score = (current - mean) / stddev;

    let latest = series[series.len() - 1];
    let is_anomaly = z_score >= Z_SCORE_THRESHOLD
        && current >= MIN_DPI
        && latest.total_volume >= MIN_VOLUME
        && clock.within_days(&latest.date, RECENCY_DAYS);

    Some(DarkPoolEntry {
        ticker: ticker.to_string(),
        date: latest.date.clone(),
        short_volume: latest.short_volume,
        total_volume: latest.total_volume,
        dpi: round4(current),
        dpi_30d_mean: round4(mean),
        dpi_30d_stddev: round4(stddev),
        z_score: round2(z_score),
        z_score_window: Z_SCORE_WINDOW,
        is_anomaly,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(ticker: &str, date: &str, short: i64, total: i64) -> DarkPoolRecord {
        DarkPoolRecord {
            ticker: ticker.to_string(),
            date: date.to_string(),
            short_volume: short,
            total_volume: total,
            dpi: signal_core::normalize::dpi(short, total),
        }
    }

    /// `days` DPI values ending the day before the reference date.
    fn series(ticker: &str, dpis: &[f64], total: i64, end: &str) -> Vec<DarkPoolRecord> {
        let end_date = signal_core::clock::parse_date(end).unwrap();
        dpis.iter()
            .enumerate()
            .map(|(i, &dpi)| {
                let date = end_date - chrono::Duration::days((dpis.len() - 1 - i) as i64);
                let short = (dpi * total as f64) as i64;
                record(ticker, &date.format("%Y-%m-%d").to_string(), short, total)
            })
            .collect()
    }

    #[test]
    fn test_spike_is_anomaly() {
        // 30 calm days around 0.45, then a 0.89 spike on heavy volume.
        let mut dpis: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 0.43 } else { 0.47 })
            .collect();
        dpis.push(0.89);
        let records = series("AMC", &dpis, 50_800_000, "2026-01-26");

        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);

        assert_eq!(result.entries.len(), 1);
        let amc = &result.entries[0];
        assert_relative_eq!(amc.dpi, 0.89, epsilon = 1e-9);
        assert!(amc.z_score >= Z_SCORE_THRESHOLD, "z = {}", amc.z_score);
        assert!(amc.is_anomaly);
        assert_eq!(result.anomalies.len(), 1);
    }

    #[test]
    fn test_z_score_matches_manual_computation() {
        let mut dpis: Vec<f64> = (0..30).map(|i| 0.40 + (i % 5) as f64 * 0.01).collect();
        dpis.push(0.75);
        let records = series("X", &dpis, 2_000_000, "2026-01-26");

        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        let entry = &result.entries[0];

        // Recompute by hand over the 30 prior days.
        let window = &dpis[..30];
        let mean: f64 = window.iter().sum::<f64>() / 30.0;
        let var: f64 = window.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / 29.0;
        let expected_z = (0.75 - mean) / var.sqrt().max(0.001);
        assert_relative_eq!(entry.z_score, (expected_z * 100.0).round() / 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_insufficient_history_skipped() {
        let dpis: Vec<f64> = vec![0.4; 10];
        let records = series("THIN", &dpis, 1_000_000, "2026-01-26");
        let clock = Clock::fixed("2026-01-26");
        assert!(detect(&records, &clock).entries.is_empty());
    }

    #[test]
    fn test_low_volume_not_anomaly() {
        let mut dpis: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 0.43 } else { 0.47 }).collect();
        dpis.push(0.89);
        let records = series("TINY", &dpis, 100_000, "2026-01-26");
        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        assert!(!result.entries[0].is_anomaly);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_low_dpi_not_anomaly() {
        // Big Z jump but absolute DPI below the 0.4 gate.
        let mut dpis: Vec<f64> = vec![0.10; 30];
        dpis.push(0.35);
        let records = series("LOW", &dpis, 2_000_000, "2026-01-26");
        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        assert!(result.entries[0].z_score >= 2.0);
        assert!(!result.entries[0].is_anomaly);
    }

    #[test]
    fn test_stale_not_anomaly() {
        let mut dpis: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 0.43 } else { 0.47 }).collect();
        dpis.push(0.89);
        // Series ends well before the reference date.
        let records = series("OLD", &dpis, 50_000_000, "2026-01-10");
        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        assert!(!result.entries[0].is_anomaly);
    }

    #[test]
    fn test_flat_series_stddev_clamped() {
        // Identical values would otherwise divide by zero.
        let mut dpis: Vec<f64> = vec![0.45; 30];
        dpis.push(0.45);
        let records = series("FLAT", &dpis, 1_000_000, "2026-01-26");
        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        assert_eq!(result.entries[0].z_score, 0.0);
        assert!(result.entries[0].z_score.is_finite());
    }

    #[test]
    fn test_dpi_bounds_invariant() {
        let mut dpis: Vec<f64> = (0..35).map(|i| 0.2 + (i % 7) as f64 * 0.1).collect();
        dpis.push(0.95);
        let records = series("B", &dpis, 3_000_000, "2026-01-26");
        let clock = Clock::fixed("2026-01-26");
        for e in detect(&records, &clock).entries {
            assert!((0.0..=1.0).contains(&e.dpi));
            if e.is_anomaly {
                assert!(e.z_score >= 2.0);
                assert!(e.dpi >= 0.4);
                assert!(e.total_volume >= 500_000);
                assert!(clock.days_ago(&e.date) <= 7);
            }
        }
    }

    #[test]
    fn test_ranked_by_z_desc() {
        let mut records = Vec::new();
        let mut calm: Vec<f64> = vec![0.45; 30];
        calm.push(0.50);
        records.extend(series("MILD", &calm, 1_000_000, "2026-01-26"));
        let mut wild: Vec<f64> = vec![0.45; 30];
        wild.push(0.90);
        records.extend(series("WILD", &wild, 1_000_000, "2026-01-26"));

        let clock = Clock::fixed("2026-01-26");
        let result = detect(&records, &clock);
        assert_eq!(result.entries[0].ticker, "WILD");
        assert_eq!(result.entries[1].ticker, "MILD");
    }
}
