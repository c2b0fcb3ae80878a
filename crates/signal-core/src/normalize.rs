//! Pure normalization and parsing helpers.
//!
//! These are deterministic functions with no side effects, used by every
//! collector and by the scoring engines. Where an input cannot be
//! normalized it passes through trimmed (party, chamber, trade type) or
//! maps to a sentinel (`Q0_0000` quarters, `(0, 0)` amounts).

use crate::types::{ChangeType, TradeType};

// ── Amount range parsing ───────────────────────────────────────────────

/// Parse a legislator trade amount range into `(min, max)` dollars.
///
/// ```
/// use signal_core::normalize::parse_amount_range;
/// assert_eq!(parse_amount_range("$1,001 - $15,000"), (1001.0, 15000.0));
/// assert_eq!(parse_amount_range("Over $1,000,000"), (1000000.0, 1000000.0));
/// assert_eq!(parse_amount_range(""), (0.0, 0.0));
/// ```
pub fn parse_amount_range(raw: &str) -> (f64, f64) {
    if raw.is_empty() {
        return (0.0, 0.0);
    }

    let numbers = extract_numbers(raw);
    match numbers.as_slice() {
        [] => (0.0, 0.0),
        [single] => (*single, *single),
        [lo, hi, ..] => (*lo, *hi),
    }
}

/// Pull out every `$1,234`-style number in order of appearance.
fn extract_numbers(raw: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == ',' && !current.is_empty() {
            // Thousands separator inside a number
        } else if !current.is_empty() {
            if let Ok(v) = current.parse::<f64>() {
                numbers.push(v);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(v) = current.parse::<f64>() {
            numbers.push(v);
        }
    }
    numbers
}

// ── Party / chamber / trade type ───────────────────────────────────────

/// Normalize a party code to its full name; unknown values pass through
/// trimmed. Idempotent.
pub fn normalize_party(raw: &str) -> String {
    let t = raw.trim();
    match t {
        "D" | "Democrat" => "Democrat".to_string(),
        "R" | "Republican" => "Republican".to_string(),
        "I" | "Independent" => "Independent".to_string(),
        other => other.to_string(),
    }
}

/// Normalize a chamber string to `House` or `Senate` by substring match;
/// unknown values pass through trimmed. Idempotent.
pub fn normalize_chamber(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("house") {
        "House".to_string()
    } else if lower.contains("senate") {
        "Senate".to_string()
    } else {
        raw.trim().to_string()
    }
}

/// Normalize a raw trade type string ("Purchase", "Sale (Partial)", …) to
/// the canonical Buy/Sell/Exchange vocabulary; unknown values pass through
/// trimmed. Idempotent.
pub fn normalize_trade_type(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("purchase") || lower.contains("buy") {
        "Buy".to_string()
    } else if lower.contains("sale") || lower.contains("sell") {
        "Sell".to_string()
    } else if lower.contains("exchange") {
        "Exchange".to_string()
    } else {
        raw.trim().to_string()
    }
}

/// Parse the canonical trade-type vocabulary into the typed enum.
pub fn parse_trade_type(raw: &str) -> Option<TradeType> {
    match normalize_trade_type(raw).as_str() {
        "Buy" => Some(TradeType::Buy),
        "Sell" => Some(TradeType::Sell),
        "Exchange" => Some(TradeType::Exchange),
        _ => None,
    }
}

/// Map an ARK change type to the trade type it implies.
pub fn ark_change_to_trade_type(change_type: ChangeType) -> TradeType {
    change_type.to_trade_type()
}

// ── 13F quarter derivation ─────────────────────────────────────────────

/// Derive the reported quarter from a 13F filing date.
///
/// 13F filings land ~45 days after quarter close, so a January-March
/// filing reports Q4 of the prior year, April-June reports Q1, and so on.
/// Malformed input maps to `Q0_0000`.
///
/// ```
/// use signal_core::normalize::filing_date_to_quarter;
/// assert_eq!(filing_date_to_quarter("2025-11-14"), "Q3_2025");
/// assert_eq!(filing_date_to_quarter("2025-02-14"), "Q4_2024");
/// ```
pub fn filing_date_to_quarter(filing_date: &str) -> String {
    if filing_date.len() < 10 {
        return "Q0_0000".to_string();
    }
    let year: i32 = match filing_date[..4].parse() {
        Ok(y) => y,
        Err(_) => return "Q0_0000".to_string(),
    };
    let month: u32 = match filing_date[5..7].parse() {
        Ok(m) if (1..=12).contains(&m) => m,
        _ => return "Q0_0000".to_string(),
    };

    match month {
        1..=3 => format!("Q4_{}", year - 1),
        4..=6 => format!("Q1_{year}"),
        7..=9 => format!("Q2_{year}"),
        _ => format!("Q3_{year}"),
    }
}

// ── CUSIP → ticker mapping ─────────────────────────────────────────────

/// Static CUSIP mappings covering the major holdings of the tracked
/// institutions. The issuer name is always preserved as display fallback
/// for anything not in this table.
static CUSIP_TO_TICKER: &[(&str, &str)] = &[
    ("02005N100", "ALLY"),
    ("023135106", "AMZN"),
    ("02079K107", "GOOGL"),
    ("02079K305", "GOOG"),
    ("030420103", "AIG"),
    ("03027X100", "AEO"),
    ("03783310", "AMAT"),
    ("037833100", "AAPL"),
    ("046353101", "ATVI"),
    ("05278C107", "AVTR"),
    ("064058100", "BAC"),
    ("084670702", "BRK.B"),
    ("11135F101", "BMY"),
    ("12504L109", "CB"),
    ("126650100", "CVS"),
    ("131347100", "C"),
    ("166764100", "CVX"),
    ("172967424", "C"),
    ("17275R102", "CSCO"),
    ("191216100", "KO"),
    ("20030N101", "COF"),
    ("22160K105", "COST"),
    ("23804L103", "DAL"),
    ("254709108", "DIS"),
    ("256219106", "DVA"),
    ("278642103", "EBAY"),
    ("30303M102", "META"),
    ("31428X106", "FDX"),
    ("345838106", "F"),
    ("369604103", "GE"),
    ("38141G104", "GS"),
    ("40412C101", "HPQ"),
    ("437076102", "HD"),
    ("459200101", "IBM"),
    ("46120E602", "ITOCY"),
    ("464287465", "IFF"),
    ("478160104", "JNJ"),
    ("48020Q107", "JPM"),
    ("500754106", "KHC"),
    ("513272104", "LLY"),
    ("532457108", "LMT"),
    ("571903202", "MARKEL"),
    ("580135101", "MCD"),
    ("585055106", "MDT"),
    ("594918104", "MSFT"),
    ("60871R209", "MHLD"),
    ("617446448", "MS"),
    ("629377508", "NUE"),
    ("637071101", "NRG"),
    ("654106103", "NKE"),
    ("68389X105", "ORCL"),
    ("693475105", "OXY"),
    ("698813102", "PM"),
    ("713448108", "PEP"),
    ("717081103", "PFE"),
    ("718172109", "PG"),
    ("742718109", "PNC"),
    ("74762E102", "QRVO"),
    ("806857108", "SLB"),
    ("808513105", "SNOW"),
    ("81369Y704", "SEN"),
    ("825690100", "SHEL"),
    ("83406F102", "SIRI"),
    ("842587107", "SPR"),
    ("871829107", "SYF"),
    ("87612E106", "TMUS"),
    ("88160R101", "TSLA"),
    ("89236T104", "TROW"),
    ("90184L102", "TWLO"),
    ("902973304", "UPS"),
    ("911312106", "UNP"),
    ("91324P102", "UNH"),
    ("92826C839", "V"),
    ("92343V104", "VRSN"),
    ("92556V106", "VZ"),
    ("931142103", "WMT"),
    ("949746101", "WFC"),
];

/// Map a CUSIP to its ticker symbol. `None` when unmapped.
pub fn cusip_to_ticker(cusip: &str) -> Option<&'static str> {
    CUSIP_TO_TICKER
        .iter()
        .find(|(c, _)| *c == cusip)
        .map(|(_, t)| *t)
}

// ── Dark pool index ────────────────────────────────────────────────────

/// DPI = short volume / total volume; zero when total volume is zero.
pub fn dpi(short_volume: i64, total_volume: i64) -> f64 {
    if total_volume <= 0 {
        return 0.0;
    }
    short_volume as f64 / total_volume as f64
}
