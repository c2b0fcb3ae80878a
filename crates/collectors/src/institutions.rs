//! 13F institutional filing collector.
//!
//! Parses EDGAR information-table XML for the tracked funds, maps CUSIPs
//! to tickers (issuer name preserved as the display fallback), derives the
//! reported quarter from the filing date, computes portfolio weights, and
//! detects quarter-over-quarter position changes against the previously
//! persisted artifact.

use crate::{now_iso, CollectorReport};
use cache_store::CacheStore;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use signal_core::config::INSTITUTIONS_FILE;
use signal_core::normalize::{cusip_to_ticker, filing_date_to_quarter};
use signal_core::{
    HoldingChange, InstitutionFiling, InstitutionHolding, InstitutionsArtifact, Result,
    SignalError,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// CIK → display name for the tracked institutions.
static TRACKED_INSTITUTIONS: &[(&str, &str)] = &[
    ("0001067983", "Berkshire Hathaway"),
    ("0001350694", "Bridgewater Associates"),
    ("0001037389", "Renaissance Technologies"),
    ("0001423053", "Citadel Advisors"),
    ("0001656456", "Appaloosa Management"),
    ("0001336528", "Pershing Square Capital"),
    ("0001029160", "Soros Fund Management"),
];

/// One raw filing as delivered by the EDGAR fetcher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInstitutionFiling {
    #[serde(default)]
    pub company: String,
    pub filing_date: String,
    #[serde(default)]
    pub accession: Option<String>,
    /// Information-table XML, when the fetcher hands us the raw document.
    #[serde(default)]
    pub info_table_xml: Option<String>,
    /// Pre-parsed holdings from the legacy path. Values here are USD
    /// multiplied by 1000 (the old collector applied the thousands→USD
    /// conversion to values that were already USD).
    #[serde(default)]
    pub holdings: Vec<RawLegacyHolding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyHolding {
    #[serde(default)]
    pub issuer: String,
    #[serde(default, rename = "class")]
    pub security_class: String,
    #[serde(default)]
    pub cusip: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub put_call: Option<String>,
}

/// A holding as it comes off the wire, value in whole USD.
#[derive(Debug, Clone, Default)]
struct WireHolding {
    issuer: String,
    security_class: String,
    cusip: String,
    value: f64,
    shares: i64,
    put_call: Option<String>,
}

#[derive(Debug, Serialize)]
struct InstitutionsMetadata {
    schema_version: &'static str,
    fund_count: usize,
    total_aum: f64,
    quarters: Vec<String>,
    top_fund: String,
    last_updated: String,
}

pub struct InstitutionsCollector {
    cache: CacheStore,
}

impl InstitutionsCollector {
    pub fn new(cache: CacheStore) -> Self {
        InstitutionsCollector { cache }
    }

    /// Parse an EDGAR information-table document. Namespace prefixes vary
    /// between filers, so tags are matched by local name. Values on the
    /// wire are thousands of USD and converted to whole USD here.
    pub fn parse_info_table(xml: &str) -> Result<Vec<(String, String, String, f64, i64, Option<String>)>> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut holdings = Vec::new();
        let mut current: Option<WireHolding> = None;
        let mut text_target: Option<&'static str> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.local_name();
                    match name.as_ref() {
                        b"infoTable" => current = Some(WireHolding::default()),
                        b"nameOfIssuer" => text_target = Some("issuer"),
                        b"titleOfClass" => text_target = Some("class"),
                        b"cusip" => text_target = Some("cusip"),
                        b"value" => text_target = Some("value"),
                        b"sshPrnamt" => text_target = Some("shares"),
                        b"putCall" => text_target = Some("put_call"),
                        _ => text_target = None,
                    }
                }
                Ok(Event::Text(t)) => {
                    let (Some(holding), Some(target)) = (current.as_mut(), text_target) else {
                        continue;
                    };
                    let text = t
                        .unescape()
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default();
                    match target {
                        "issuer" => holding.issuer = text,
                        "class" => holding.security_class = text,
                        "cusip" => holding.cusip = text,
                        "value" => {
                            holding.value =
                                text.replace(',', "").parse::<f64>().unwrap_or(0.0) * 1000.0
                        }
                        "shares" => {
                            holding.shares = text.replace(',', "").parse::<i64>().unwrap_or(0)
                        }
                        "put_call" => holding.put_call = Some(text),
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"infoTable" {
                        if let Some(h) = current.take() {
                            holdings.push((
                                h.issuer,
                                h.security_class,
                                h.cusip,
                                h.value,
                                h.shares,
                                h.put_call,
                            ));
                        }
                    }
                    text_target = None;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SignalError::InputMalformed(format!(
                        "13F XML parse error at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        Ok(holdings)
    }

    /// Normalize one filing: ticker mapping, quarter, portfolio weights,
    /// value-descending order.
    pub fn normalize_filing(cik: &str, raw: &RawInstitutionFiling) -> Result<InstitutionFiling> {
        let wire: Vec<WireHolding> = if let Some(xml) = &raw.info_table_xml {
            Self::parse_info_table(xml)?
                .into_iter()
                .map(
                    |(issuer, security_class, cusip, value, shares, put_call)| WireHolding {
                        issuer,
                        security_class,
                        cusip,
                        value,
                        shares,
                        put_call,
                    },
                )
                .collect()
        } else {
            raw.holdings
                .iter()
                .map(|h| WireHolding {
                    issuer: h.issuer.clone(),
                    security_class: if h.security_class.is_empty() {
                        "COM".to_string()
                    } else {
                        h.security_class.clone()
                    },
                    cusip: h.cusip.clone(),
                    // Undo the legacy double multiplication.
                    value: if h.value > 0.0 { h.value / 1000.0 } else { 0.0 },
                    shares: h.shares,
                    put_call: h.put_call.clone(),
                })
                .collect()
        };

        let mut holdings: Vec<InstitutionHolding> = wire
            .into_iter()
            .map(|h| InstitutionHolding {
                ticker: cusip_to_ticker(&h.cusip).unwrap_or("").to_string(),
                cusip: h.cusip,
                issuer: h.issuer,
                security_class: h.security_class,
                value: h.value.round(),
                shares: h.shares,
                put_call: h.put_call,
                pct_portfolio: 0.0,
                change_type: None,
                change_pct: None,
            })
            .collect();

        let total_value: f64 = holdings.iter().map(|h| h.value).sum();
        for h in &mut holdings {
            h.pct_portfolio = if total_value > 0.0 {
                round2(h.value / total_value * 100.0)
            } else {
                0.0
            };
        }
        holdings.sort_by(|a, b| b.value.total_cmp(&a.value));

        let fund_name = TRACKED_INSTITUTIONS
            .iter()
            .find(|(c, _)| *c == cik)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| raw.company.clone());

        Ok(InstitutionFiling {
            cik: cik.to_string(),
            fund_name,
            company_name: Some(raw.company.clone()),
            filing_date: raw.filing_date.clone(),
            quarter: filing_date_to_quarter(&raw.filing_date),
            accession: raw.accession.clone(),
            total_value,
            holdings_count: holdings.len(),
            holdings,
        })
    }

    /// Mark quarter-over-quarter changes against the prior filing of the
    /// same fund: New, Sold (logged only), and Increased/Decreased when
    /// the share count moved by more than 10%.
    fn mark_changes(current: &mut InstitutionFiling, previous: &InstitutionFiling) {
        let prev_by_cusip: HashMap<&str, &InstitutionHolding> = previous
            .holdings
            .iter()
            .map(|h| (h.cusip.as_str(), h))
            .collect();

        for h in &mut current.holdings {
            match prev_by_cusip.get(h.cusip.as_str()) {
                None => h.change_type = Some(HoldingChange::New),
                Some(prev) if prev.shares > 0 => {
                    let change_pct =
                        (h.shares - prev.shares) as f64 / prev.shares as f64 * 100.0;
                    if change_pct.abs() > 10.0 {
                        h.change_type = Some(if change_pct > 0.0 {
                            HoldingChange::Increased
                        } else {
                            HoldingChange::Decreased
                        });
                        h.change_pct = Some(round2(change_pct));
                    }
                }
                Some(_) => {}
            }
        }

        let current_cusips: BTreeSet<&str> =
            current.holdings.iter().map(|h| h.cusip.as_str()).collect();
        for prev in &previous.holdings {
            if !current_cusips.contains(prev.cusip.as_str()) {
                tracing::debug!(
                    "{}: sold out of {} ({})",
                    current.fund_name,
                    prev.issuer,
                    prev.cusip
                );
            }
        }
    }

    /// Process all raw filings and write `institutions.json`.
    pub fn run(&self, raw_filings: &BTreeMap<String, RawInstitutionFiling>) -> Result<CollectorReport> {
        let previous: InstitutionsArtifact = self.cache.read_as(INSTITUTIONS_FILE);
        let prev_by_cik: HashMap<&str, &InstitutionFiling> = previous
            .filings
            .iter()
            .map(|f| (f.cik.as_str(), f))
            .collect();

        let mut filings = Vec::new();
        let mut skipped = 0usize;
        for (cik, raw) in raw_filings {
            match Self::normalize_filing(cik, raw) {
                Ok(mut filing) => {
                    if let Some(prev) = prev_by_cik.get(cik.as_str()) {
                        Self::mark_changes(&mut filing, prev);
                    }
                    filings.push(filing);
                }
                Err(e) => {
                    tracing::warn!("institutions: skipping filing for {cik}: {e}");
                    skipped += 1;
                }
            }
        }

        filings.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));

        let metadata = Self::build_metadata(&filings);
        let holding_total: usize = filings.iter().map(|f| f.holdings_count).sum();
        self.cache.write(
            INSTITUTIONS_FILE,
            &InstitutionsArtifact {
                metadata: serde_json::to_value(&metadata).unwrap_or_default(),
                filings,
            },
        )?;

        tracing::info!(
            "13F: {} filings saved, total AUM ${:.1}B",
            metadata.fund_count,
            metadata.total_aum / 1e9
        );

        Ok(CollectorReport {
            source: "institutions",
            records: holding_total,
            skipped,
        })
    }

    fn build_metadata(filings: &[InstitutionFiling]) -> InstitutionsMetadata {
        let quarters: BTreeSet<String> = filings.iter().map(|f| f.quarter.clone()).collect();
        InstitutionsMetadata {
            schema_version: "1.0.0",
            fund_count: filings.len(),
            total_aum: filings.iter().map(|f| f.total_value).sum(),
            quarters: quarters.into_iter().collect(),
            top_fund: filings.first().map(|f| f.fund_name.clone()).unwrap_or_default(),
            last_updated: now_iso(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <infoTable>
    <nameOfIssuer>APPLE INC</nameOfIssuer>
    <titleOfClass>COM</titleOfClass>
    <cusip>037833100</cusip>
    <value>150000000</value>
    <shrsOrPrnAmt>
      <sshPrnamt>915560382</sshPrnamt>
      <sshPrnamtType>SH</sshPrnamtType>
    </shrsOrPrnAmt>
  </infoTable>
  <infoTable>
    <nameOfIssuer>FOO BAR CORP</nameOfIssuer>
    <titleOfClass>COM</titleOfClass>
    <cusip>999999999</cusip>
    <value>60000</value>
    <shrsOrPrnAmt>
      <sshPrnamt>1000000</sshPrnamt>
    </shrsOrPrnAmt>
    <putCall>Put</putCall>
  </infoTable>
</informationTable>"#;

    fn collector() -> (tempfile::TempDir, InstitutionsCollector) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path()).unwrap();
        (dir, InstitutionsCollector::new(cache))
    }

    fn raw_filing(xml: &str, filing_date: &str) -> RawInstitutionFiling {
        RawInstitutionFiling {
            company: "BERKSHIRE HATHAWAY INC".to_string(),
            filing_date: filing_date.to_string(),
            accession: Some("0000950123-26-001234".to_string()),
            info_table_xml: Some(xml.to_string()),
            holdings: Vec::new(),
        }
    }

    #[test]
    fn test_parse_info_table() {
        let holdings = InstitutionsCollector::parse_info_table(SAMPLE_XML).unwrap();
        assert_eq!(holdings.len(), 2);
        let (issuer, class, cusip, value, shares, put_call) = &holdings[0];
        assert_eq!(issuer, "APPLE INC");
        assert_eq!(class, "COM");
        assert_eq!(cusip, "037833100");
        // Wire thousands → whole USD
        assert_eq!(*value, 150_000_000_000.0);
        assert_eq!(*shares, 915_560_382);
        assert!(put_call.is_none());
        assert_eq!(holdings[1].5.as_deref(), Some("Put"));
    }

    #[test]
    fn test_cusip_mapping_with_issuer_fallback() {
        let filing =
            InstitutionsCollector::normalize_filing("0001067983", &raw_filing(SAMPLE_XML, "2026-01-15"))
                .unwrap();
        // Known CUSIP maps to AAPL.
        assert_eq!(filing.holdings[0].ticker, "AAPL");
        // Unknown CUSIP keeps an empty ticker but stays in the filing with
        // the issuer populated.
        let unmapped = filing.holdings.iter().find(|h| h.cusip == "999999999").unwrap();
        assert_eq!(unmapped.ticker, "");
        assert_eq!(unmapped.issuer, "FOO BAR CORP");
    }

    #[test]
    fn test_quarter_and_weights() {
        let filing =
            InstitutionsCollector::normalize_filing("0001067983", &raw_filing(SAMPLE_XML, "2026-02-14"))
                .unwrap();
        assert_eq!(filing.quarter, "Q4_2025");
        assert_eq!(filing.fund_name, "Berkshire Hathaway");
        // Sorted by value descending, weights sum to ~100.
        assert!(filing.holdings[0].value >= filing.holdings[1].value);
        let weight_sum: f64 = filing.holdings.iter().map(|h| h.pct_portfolio).sum();
        assert!((weight_sum - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_legacy_value_compensation() {
        let raw = RawInstitutionFiling {
            company: "SOME FUND".to_string(),
            filing_date: "2026-01-15".to_string(),
            accession: None,
            info_table_xml: None,
            holdings: vec![RawLegacyHolding {
                issuer: "APPLE INC".to_string(),
                security_class: String::new(),
                cusip: "037833100".to_string(),
                // Legacy path stored USD × 1000.
                value: 150_000_000_000.0,
                shares: 1_000_000,
                put_call: None,
            }],
        };
        let filing = InstitutionsCollector::normalize_filing("0009999999", &raw).unwrap();
        assert_eq!(filing.holdings[0].value, 150_000_000.0);
        assert_eq!(filing.holdings[0].security_class, "COM");
    }

    #[test]
    fn test_change_detection_across_runs() {
        let (_dir, c) = collector();

        let q3 = r#"<informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <infoTable><nameOfIssuer>APPLE INC</nameOfIssuer><titleOfClass>COM</titleOfClass>
    <cusip>037833100</cusip><value>100000</value>
    <shrsOrPrnAmt><sshPrnamt>1000000</sshPrnamt></shrsOrPrnAmt></infoTable>
  <infoTable><nameOfIssuer>COCA COLA CO</nameOfIssuer><titleOfClass>COM</titleOfClass>
    <cusip>191216100</cusip><value>50000</value>
    <shrsOrPrnAmt><sshPrnamt>500000</sshPrnamt></shrsOrPrnAmt></infoTable>
</informationTable>"#;
        let mut raw1 = BTreeMap::new();
        raw1.insert("0001067983".to_string(), raw_filing(q3, "2025-11-14"));
        c.run(&raw1).unwrap();

        // Next quarter: AAPL up 50%, KO gone, TSLA new.
        let q4 = r#"<informationTable xmlns="http://www.sec.gov/edgar/document/thirteenf/informationtable">
  <infoTable><nameOfIssuer>APPLE INC</nameOfIssuer><titleOfClass>COM</titleOfClass>
    <cusip>037833100</cusip><value>150000</value>
    <shrsOrPrnAmt><sshPrnamt>1500000</sshPrnamt></shrsOrPrnAmt></infoTable>
  <infoTable><nameOfIssuer>TESLA INC</nameOfIssuer><titleOfClass>COM</titleOfClass>
    <cusip>88160R101</cusip><value>80000</value>
    <shrsOrPrnAmt><sshPrnamt>300000</sshPrnamt></shrsOrPrnAmt></infoTable>
</informationTable>"#;
        let mut raw2 = BTreeMap::new();
        raw2.insert("0001067983".to_string(), raw_filing(q4, "2026-02-14"));
        c.run(&raw2).unwrap();

        let artifact: InstitutionsArtifact = c.cache.read_as(INSTITUTIONS_FILE);
        let filing = &artifact.filings[0];
        let aapl = filing.holdings.iter().find(|h| h.ticker == "AAPL").unwrap();
        assert_eq!(aapl.change_type, Some(HoldingChange::Increased));
        assert_eq!(aapl.change_pct, Some(50.0));
        let tsla = filing.holdings.iter().find(|h| h.ticker == "TSLA").unwrap();
        assert_eq!(tsla.change_type, Some(HoldingChange::New));
    }

    #[test]
    fn test_malformed_xml_skipped_not_fatal() {
        let (_dir, c) = collector();
        let mut raw = BTreeMap::new();
        raw.insert(
            "0001067983".to_string(),
            raw_filing("<informationTable><infoTable><unclosed", "2026-01-15"),
        );
        let report = c.run(&raw).unwrap();
        assert_eq!(report.records, 0);
    }
}
