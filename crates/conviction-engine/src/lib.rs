//! Conviction scoring engines.
//!
//! [`v2`] is the conviction-based engine: per-source 0-100 scores from
//! size, recency, clustering, and structural attributes, aggregated per
//! ticker. [`formula`] is the original weighted-confluence formula engine,
//! retained as a backward-compatible check; the confluence ranker built on
//! top of [`v2`] is the authoritative ranking.

pub mod formula;
pub mod v2;

pub use v2::{ConvictionEngine, SourceData};
pub use formula::{ConfluenceResult, FormulaEngine, FormulaSignal};
