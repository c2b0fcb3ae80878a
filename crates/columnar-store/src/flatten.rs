//! Artifact → table flattening.
//!
//! One artifact maps to one or more tables. Nested arrays flatten with the
//! parent's identifying fields copied onto every child row; lists and
//! objects that remain after flattening are JSON-serialized to strings so
//! the tables stay flat.

use serde_json::{Map, Value};

/// Artifact filename → the tables it produces.
pub const FILE_TABLES: &[(&str, &[&str])] = &[
    ("congress.json", &["congress_trades"]),
    ("ark_trades.json", &["ark_trades"]),
    ("insiders.json", &["insider_trades", "insider_clusters"]),
    ("darkpool.json", &["darkpool_tickers", "darkpool_anomalies"]),
    ("institutions.json", &["institution_filings", "institution_holdings"]),
    ("short_interest.json", &["short_interest"]),
    ("superinvestors.json", &["superinvestor_activity", "superinvestor_holdings"]),
    ("ranking_v3.json", &["ranking"]),
];

/// Build `(table, rows)` pairs for one artifact.
pub fn tables_for(filename: &str, data: &Map<String, Value>) -> Vec<(String, Vec<Map<String, Value>>)> {
    match filename {
        "congress.json" => vec![("congress_trades".into(), array_rows(data, "trades"))],
        "ark_trades.json" => vec![("ark_trades".into(), array_rows(data, "trades"))],
        "insiders.json" => vec![
            ("insider_trades".into(), array_rows(data, "trades")),
            ("insider_clusters".into(), array_rows(data, "clusters")),
        ],
        "darkpool.json" => vec![
            ("darkpool_tickers".into(), array_rows(data, "tickers")),
            ("darkpool_anomalies".into(), array_rows(data, "anomalies")),
        ],
        "institutions.json" => institutions_tables(data),
        "short_interest.json" => vec![("short_interest".into(), array_rows(data, "tickers"))],
        "superinvestors.json" => superinvestors_tables(data),
        "ranking_v3.json" => vec![("ranking".into(), ranking_rows(data))],
        _ => Vec::new(),
    }
}

/// Top-level array of objects → normalized rows.
fn array_rows(data: &Map<String, Value>, key: &str) -> Vec<Map<String, Value>> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(normalize_row)
                .collect()
        })
        .unwrap_or_default()
}

/// Filings as top-level rows (without the nested holdings) plus holdings
/// flattened with the filing's identity copied down.
fn institutions_tables(data: &Map<String, Value>) -> Vec<(String, Vec<Map<String, Value>>)> {
    let mut filing_rows = Vec::new();
    let mut holding_rows = Vec::new();

    let filings = data
        .get("filings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for filing in filings.iter().filter_map(Value::as_object) {
        let mut row: Map<String, Value> = filing.clone();
        row.remove("holdings");
        filing_rows.push(normalize_row(&row));

        let total_value = filing
            .get("total_value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        for holding in filing
            .get("holdings")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
        {
            let mut h = holding.clone();
            for key in ["cik", "fund_name", "filing_date", "quarter"] {
                h.insert(
                    key.to_string(),
                    filing.get(key).cloned().unwrap_or(Value::Null),
                );
            }
            if !h.contains_key("pct_portfolio") {
                let value = holding.get("value").and_then(Value::as_f64).unwrap_or(0.0);
                let denom = if total_value > 0.0 { total_value } else { 1.0 };
                h.insert(
                    "pct_portfolio".to_string(),
                    Value::from(value / denom * 100.0),
                );
            }
            holding_rows.push(normalize_row(&h));
        }
    }

    vec![
        ("institution_filings".into(), filing_rows),
        ("institution_holdings".into(), holding_rows),
    ]
}

/// Activity as-is; the per-manager holdings map becomes one row per
/// (manager, holding) with the manager's metadata copied down.
fn superinvestors_tables(data: &Map<String, Value>) -> Vec<(String, Vec<Map<String, Value>>)> {
    let activity_rows = array_rows(data, "activity");

    let mut holding_rows = Vec::new();
    let holdings = data
        .get("holdings")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (code, manager) in &holdings {
        let Some(manager) = manager.as_object() else { continue };
        let meta: Vec<(&str, Value)> = vec![
            ("manager_code", Value::from(code.as_str())),
            ("manager", manager.get("manager").cloned().unwrap_or(Value::Null)),
            ("period", manager.get("period").cloned().unwrap_or(Value::Null)),
            (
                "portfolio_date",
                manager.get("portfolio_date").cloned().unwrap_or(Value::Null),
            ),
            (
                "num_stocks",
                manager.get("num_stocks").cloned().unwrap_or(Value::Null),
            ),
            (
                "portfolio_value",
                manager.get("portfolio_value").cloned().unwrap_or(Value::Null),
            ),
        ];

        for holding in manager
            .get("top_holdings")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
        {
            let mut row = holding.clone();
            for (key, value) in &meta {
                row.insert((*key).to_string(), value.clone());
            }
            holding_rows.push(normalize_row(&row));
        }
    }

    vec![
        ("superinvestor_activity".into(), activity_rows),
        ("superinvestor_holdings".into(), holding_rows),
    ]
}

/// Ranking rows keep the sources list (stringified) and add a
/// comma-joined `sources_str` column for SQL filtering.
fn ranking_rows(data: &Map<String, Value>) -> Vec<Map<String, Value>> {
    data.get("signals")
        .and_then(Value::as_array)
        .map(|signals| {
            signals
                .iter()
                .filter_map(Value::as_object)
                .map(|signal| {
                    let mut row = signal.clone();
                    let sources_str = signal
                        .get("sources")
                        .and_then(Value::as_array)
                        .map(|srcs| {
                            srcs.iter()
                                .filter_map(Value::as_str)
                                .collect::<Vec<_>>()
                                .join(",")
                        })
                        .unwrap_or_default();
                    row.insert("sources_str".to_string(), Value::from(sources_str));
                    normalize_row(&row)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Lists and nested objects become JSON strings; scalars pass through.
fn normalize_row(row: &Map<String, Value>) -> Map<String, Value> {
    row.iter()
        .map(|(k, v)| {
            let normalized = match v {
                Value::Array(_) | Value::Object(_) => {
                    Value::from(serde_json::to_string(v).unwrap_or_default())
                }
                scalar => scalar.clone(),
            };
            (k.clone(), normalized)
        })
        .collect()
}
