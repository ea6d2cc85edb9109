//! Daily document catalog.
//!
//! `documents.json?date=YYYY-MM-DD&type=2` lists every filing submitted on one day together
//! with its metadata. The listing is the entry point of the whole pipeline: the fetcher
//! decides which bundles to download from it, the aggregator walks its persisted copy
//! (`doc_list.json`), and the checker diffs it against what it has already seen.
//!
//! [`DocumentDescriptor`] keeps the fields the pipeline reads as typed members and carries
//! every other field through untouched, so a persisted snapshot holds the same information
//! the endpoint returned.

use super::Edinet;
use super::core::Expect;
use super::error::{EdinetError, Result};
use super::traits::CatalogOperations;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Document type code (`docTypeCode`), e.g. 120 for an annual securities report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocTypeCode(pub u16);

impl DocTypeCode {
    /// Annual securities report (有価証券報告書).
    pub const SECURITIES_REPORT: DocTypeCode = DocTypeCode(120);
    /// Amended securities report.
    pub const AMENDED_SECURITIES_REPORT: DocTypeCode = DocTypeCode(130);
    /// Quarterly securities report.
    pub const QUARTERLY_REPORT: DocTypeCode = DocTypeCode(140);
    /// Large shareholding report (大量保有報告書).
    pub const LARGE_HOLDINGS_REPORT: DocTypeCode = DocTypeCode(350);
    /// Amended large shareholding report.
    pub const AMENDED_LARGE_HOLDINGS_REPORT: DocTypeCode = DocTypeCode(360);
}

impl fmt::Display for DocTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl std::str::FromStr for DocTypeCode {
    type Err = EdinetError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u16>()
            .map(DocTypeCode)
            .map_err(|_| EdinetError::ConfigError(format!("invalid document type code: {}", s)))
    }
}

impl Serialize for DocTypeCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocTypeCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CodeVisitor;

        impl serde::de::Visitor<'_> for CodeVisitor {
            type Value = DocTypeCode;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a document type code as integer or numeric string")
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u16::try_from(value)
                    .map(DocTypeCode)
                    .map_err(serde::de::Error::custom)
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u16::try_from(value)
                    .map(DocTypeCode)
                    .map_err(serde::de::Error::custom)
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value
                    .trim()
                    .parse::<u16>()
                    .map(DocTypeCode)
                    .map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(CodeVisitor)
    }
}

/// Metadata of one filing as listed by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    /// Position of the filing within the day's listing (1-based).
    #[serde(default)]
    pub seq_number: Option<u32>,

    /// Document id, e.g. `S100IKZ5`.
    #[serde(rename = "docID")]
    pub doc_id: String,

    #[serde(default)]
    pub edinet_code: Option<String>,

    /// Security code of the filer (five digits), absent for unlisted filers and funds.
    #[serde(default)]
    pub sec_code: Option<String>,

    #[serde(default)]
    pub filer_name: Option<String>,

    /// Cabinet ordinance code (府令コード), `010` for corporate disclosure.
    #[serde(default)]
    pub ordinance_code: Option<String>,

    /// Form code (様式コード), `030000` for the annual securities report form.
    #[serde(default)]
    pub form_code: Option<String>,

    #[serde(default)]
    pub doc_type_code: Option<DocTypeCode>,

    #[serde(default)]
    pub period_start: Option<String>,

    #[serde(default)]
    pub period_end: Option<String>,

    /// Submission timestamp, `YYYY-MM-DD HH:MM`.
    #[serde(default)]
    pub submit_date_time: Option<String>,

    #[serde(default)]
    pub doc_description: Option<String>,

    /// `0` for a regular filing, `1` for a withdrawal filing, `2` for a withdrawn one.
    #[serde(default)]
    pub withdrawal_status: Option<String>,

    #[serde(rename = "parentDocID", default)]
    pub parent_doc_id: Option<String>,

    /// Remaining fields, carried through unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentDescriptor {
    /// Creates a descriptor carrying only an id; mostly useful for tests and offline sources.
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            seq_number: None,
            doc_id: doc_id.into(),
            edinet_code: None,
            sec_code: None,
            filer_name: None,
            ordinance_code: None,
            form_code: None,
            doc_type_code: None,
            period_start: None,
            period_end: None,
            submit_date_time: None,
            doc_description: None,
            withdrawal_status: None,
            parent_doc_id: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether the filer has a non-empty security code.
    pub fn has_security_code(&self) -> bool {
        self.sec_code
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty())
    }

    /// Whether the filing is a withdrawal or has been withdrawn.
    pub fn is_withdrawn(&self) -> bool {
        matches!(self.withdrawal_status.as_deref(), Some("1") | Some("2"))
    }

    /// Submission timestamp, when present and well formed.
    pub fn submitted_at(&self) -> Option<NaiveDateTime> {
        let raw = self.submit_date_time.as_deref()?.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .ok()
    }

    /// Filing date derived from the submission timestamp.
    pub fn filing_date(&self) -> Option<NaiveDate> {
        let raw = self.submit_date_time.as_deref()?.trim();
        raw.get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
    }
}

/// Catalog of one day, as persisted in `doc_list.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub date: NaiveDate,
    pub count: usize,
    pub results: Vec<DocumentDescriptor>,
}

impl CatalogSnapshot {
    pub fn new(date: NaiveDate, results: Vec<DocumentDescriptor>) -> Self {
        Self {
            date,
            count: results.len(),
            results,
        }
    }

    /// Keeps the descriptors matching `predicate`, in catalog order.
    pub fn retain<F>(&mut self, predicate: F)
    where
        F: FnMut(&DocumentDescriptor) -> bool,
    {
        self.results.retain(predicate);
        self.count = self.results.len();
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|d| d.doc_id.as_str())
    }
}

/// Compares security codes on four characters: the catalog's five-digit `72030` and the
/// exchange's `7203` are the same issuer.
#[cfg(feature = "parse")]
pub(crate) fn normalize_sec_code(code: &str) -> &str {
    let code = code.trim();
    match code.len() {
        5 if code.ends_with('0') => code.get(..4).unwrap_or(code),
        _ => code,
    }
}

/// Calendar days of the closed range `from..=to`, in ascending order.
///
/// Fails with `InvalidRange` when `from` is after `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>> {
    if from > to {
        return Err(EdinetError::InvalidRange { from, to });
    }
    Ok(from.iter_days().take_while(|day| *day <= to).collect())
}

/// One response of the catalog endpoint.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    /// Number of documents the endpoint reports for the whole day.
    pub total: usize,
    pub results: Vec<DocumentDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    metadata: CatalogMetadata,
    #[serde(default)]
    results: Vec<DocumentDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CatalogMetadata {
    #[serde(default)]
    resultset: Option<ResultSet>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    count: usize,
}

impl CatalogPage {
    fn from_response(response: CatalogResponse, offset: usize) -> Self {
        let total = response
            .metadata
            .resultset
            .map(|r| r.count)
            .unwrap_or(response.results.len());
        Self {
            total,
            results: response.results.into_iter().skip(offset).collect(),
        }
    }
}

/// The endpoint returns the whole day in one answer, so a page at `offset` is the tail of
/// that answer. A truncated answer therefore surfaces as an incomplete catalog rather than
/// silently shrinking the day.
#[async_trait]
impl CatalogOperations for Edinet {
    async fn document_list_page(&self, date: NaiveDate, offset: usize) -> Result<CatalogPage> {
        let url = self.endpoint(
            "documents.json",
            &[
                ("date", date.format("%Y-%m-%d").to_string()),
                ("type", "2".to_string()),
            ],
        )?;
        tracing::info!("fetching document list (date: {})", date);
        let body = self.fetch(&url, Expect::Json).await?;
        let response: CatalogResponse = serde_json::from_slice(&body)?;
        Ok(CatalogPage::from_response(response, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "metadata": {
            "title": "提出された書類を把握するための API",
            "parameter": {"date": "2020-05-01", "type": "2"},
            "resultset": {"count": 2},
            "processDateTime": "2020-05-02 00:00",
            "status": "200",
            "message": "OK"
        },
        "results": [
            {
                "seqNumber": 1,
                "docID": "S100IKZ5",
                "edinetCode": "E00001",
                "secCode": "13010",
                "JCN": "1234567890123",
                "filerName": "株式会社テスト",
                "fundCode": null,
                "ordinanceCode": "010",
                "formCode": "030000",
                "docTypeCode": "120",
                "periodStart": "2019-04-01",
                "periodEnd": "2020-03-31",
                "submitDateTime": "2020-05-01 09:15",
                "docDescription": "有価証券報告書－第70期",
                "withdrawalStatus": "0",
                "parentDocID": null,
                "xbrlFlag": "1",
                "pdfFlag": "1"
            },
            {
                "seqNumber": 2,
                "docID": "S100IL00",
                "secCode": null,
                "docTypeCode": "350",
                "submitDateTime": "2020-05-01 10:00",
                "withdrawalStatus": "2"
            }
        ]
    }"#;

    #[test]
    fn parses_listing() {
        let response: CatalogResponse = serde_json::from_str(LISTING).unwrap();
        let page = CatalogPage::from_response(response, 0);
        assert_eq!(page.total, 2);

        let first = &page.results[0];
        assert_eq!(first.doc_id, "S100IKZ5");
        assert_eq!(first.doc_type_code, Some(DocTypeCode::SECURITIES_REPORT));
        assert!(first.has_security_code());
        assert!(!first.is_withdrawn());
        assert_eq!(
            first.filing_date(),
            Some(NaiveDate::from_ymd_opt(2020, 5, 1).unwrap())
        );
        assert_eq!(first.extra.get("xbrlFlag").unwrap(), "1");

        let second = &page.results[1];
        assert!(!second.has_security_code());
        assert!(second.is_withdrawn());
    }

    #[test]
    fn offset_returns_tail() {
        let response: CatalogResponse = serde_json::from_str(LISTING).unwrap();
        let page = CatalogPage::from_response(response, 1);
        assert_eq!(page.total, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].doc_id, "S100IL00");
    }

    #[test]
    fn descriptor_round_trips_unknown_fields() {
        let response: CatalogResponse = serde_json::from_str(LISTING).unwrap();
        let descriptor = &response.results[0];
        let value = serde_json::to_value(descriptor).unwrap();
        assert_eq!(value["JCN"], "1234567890123");
        assert_eq!(value["docTypeCode"], "120");
        assert_eq!(value["docID"], "S100IKZ5");

        let back: DocumentDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(&back, descriptor);
    }

    #[test]
    fn doc_type_code_formats_with_padding() {
        assert_eq!(DocTypeCode(30).to_string(), "030");
        assert_eq!("120".parse::<DocTypeCode>().unwrap(), DocTypeCode(120));
        let numeric: DocTypeCode = serde_json::from_str("350").unwrap();
        assert_eq!(numeric, DocTypeCode::LARGE_HOLDINGS_REPORT);
    }

    #[test]
    fn day_range_is_closed() {
        let from = NaiveDate::from_ymd_opt(2020, 2, 28).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let days = days_between(from, to).unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());

        assert_eq!(days_between(from, from).unwrap(), vec![from]);
        assert!(matches!(
            days_between(to, from),
            Err(EdinetError::InvalidRange { .. })
        ));
    }

    #[test]
    fn retain_updates_count() {
        let response: CatalogResponse = serde_json::from_str(LISTING).unwrap();
        let mut snapshot = CatalogSnapshot::new(
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            response.results,
        );
        snapshot.retain(|d| d.doc_type_code == Some(DocTypeCode::SECURITIES_REPORT));
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.doc_ids().collect::<Vec<_>>(), vec!["S100IKZ5"]);
    }
}
