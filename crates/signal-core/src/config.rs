//! Paths, artifact filenames, and environment-driven settings.

use std::path::PathBuf;

// ── Artifact filenames ─────────────────────────────────────────────────

pub const CONGRESS_FILE: &str = "congress.json";
pub const ARK_TRADES_FILE: &str = "ark_trades.json";
pub const ARK_HOLDINGS_FILE: &str = "ark_holdings.json";
pub const ARK_CHANGES_LOG: &str = "ark_changes.jsonl";
pub const DARKPOOL_FILE: &str = "darkpool.json";
pub const INSTITUTIONS_FILE: &str = "institutions.json";
pub const INSIDERS_FILE: &str = "insiders.json";
pub const SHORT_INTEREST_FILE: &str = "short_interest.json";
pub const SUPERINVESTORS_FILE: &str = "superinvestors.json";
pub const RANKING_V1_FILE: &str = "ranking.json";
pub const RANKING_V2_FILE: &str = "ranking_v2.json";
pub const RANKING_V3_FILE: &str = "ranking_v3.json";
pub const REFRESH_LOG_FILE: &str = "refresh_log.jsonl";

/// ARK ETF symbols covered by the daily collector.
pub const ARK_ETFS: [&str; 6] = ["ARKK", "ARKW", "ARKQ", "ARKG", "ARKF", "ARKX"];

/// Process-wide configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache root for JSON artifacts (`DATA_DIR`, default `data`).
    pub data_dir: PathBuf,
    /// Columnar store path (`DATABASE_URL`, default `<data_dir>/smartmoney.db`).
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));
        let db_path = std::env::var("DATABASE_URL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("smartmoney.db"));
        Config { data_dir, db_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        // Only assert the derivation logic, not the ambient environment.
        let cfg = Config {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data").join("smartmoney.db"),
        };
        assert!(cfg.db_path.starts_with(&cfg.data_dir));
    }
}
