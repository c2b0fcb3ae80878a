//! Per-source ingest collectors.
//!
//! Every collector follows the same pipeline: accept raw provider records
//! (in-memory, or read from a raw input file dropped by a fetcher) →
//! normalize into the canonical model → compute lightweight metadata →
//! write the artifact atomically through the cache store.
//!
//! Collectors are idempotent: identical input produces byte-equivalent
//! output modulo the `last_updated` timestamp. Malformed individual
//! records are skipped and counted; a collector never panics and never
//! takes the pipeline down with it.

pub mod ark;
pub mod congress;
pub mod darkpool;
pub mod insiders;
pub mod institutions;
pub mod short_interest;
pub mod superinvestors;

use chrono::Utc;

/// ISO timestamp for artifact metadata.
pub(crate) fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Outcome of one collector run, reported to the refresh log.
#[derive(Debug, Clone)]
pub struct CollectorReport {
    pub source: &'static str,
    pub records: usize,
    pub skipped: usize,
}
