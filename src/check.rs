//! Change detection over the daily catalog.
//!
//! The core of the checker is [`diff_ids`], a pure set difference between the document ids
//! seen before and the ids listed now. [`HoldingsChecker`] builds on it to report newly filed
//! large holdings reports (大量保有報告書), remembering what it has already inspected in a
//! [`History`] file so a filing alerts once.

use super::catalog::{DocTypeCode, DocumentDescriptor, days_between, normalize_sec_code};
use super::documents::ContentType;
use super::error::{EdinetError, Result};
use super::parsing::xbrl::{self, RawFactMap};
use super::store::write_atomic;
use super::traits::{CatalogOperations, DocumentOperations};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ids that appeared and disappeared between two listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// In the order of the current listing.
    pub added: Vec<String>,
    /// Sorted.
    pub removed: Vec<String>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes `(current - previous, previous - current)`.
pub fn diff_ids<'a, P, C>(previous: P, current: C) -> CatalogDiff
where
    P: IntoIterator<Item = &'a str>,
    C: IntoIterator<Item = &'a str>,
{
    let previous: HashSet<&str> = previous.into_iter().collect();
    let mut current_set = HashSet::new();
    let mut added = Vec::new();

    for id in current {
        if current_set.insert(id) && !previous.contains(id) {
            added.push(id.to_string());
        }
    }

    let mut removed: Vec<String> = previous
        .difference(&current_set)
        .map(|id| id.to_string())
        .collect();
    removed.sort();

    CatalogDiff { added, removed }
}

/// Document ids already inspected, grouped by security code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    seen: BTreeMap<String, BTreeSet<String>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a history file; a missing file is an empty history.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Writes the history atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_vec_pretty(self)?;
        content.push(b'\n');
        write_atomic(path, &content)
    }

    pub fn record(&mut self, code: impl Into<String>, doc_id: impl Into<String>) -> bool {
        self.seen
            .entry(code.into())
            .or_default()
            .insert(doc_id.into())
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.seen.values().any(|ids| ids.contains(doc_id))
    }

    pub fn seen_ids(&self) -> HashSet<&str> {
        self.seen
            .values()
            .flat_map(|ids| ids.iter().map(String::as_str))
            .collect()
    }

    /// Ids recorded under `code`.
    pub fn ids_for(&self, code: &str) -> Option<&BTreeSet<String>> {
        self.seen.get(code)
    }

    pub fn len(&self) -> usize {
        self.seen.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A newly filed large holdings report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HoldingsAlert {
    pub doc_id: String,
    pub submit_date_time: Option<String>,
    /// Filing date from the cover page.
    pub filing_date: Option<String>,
    pub title: Option<String>,
    pub issuer_name: Option<String>,
    pub issuer_sec_code: Option<String>,
    /// Security code of the filer, if listed.
    pub sec_code: Option<String>,
    pub filer_name: Option<String>,
    pub reason: Option<String>,
}

impl HoldingsAlert {
    fn from_facts(descriptor: &DocumentDescriptor, facts: &RawFactMap) -> Self {
        Self {
            doc_id: descriptor.doc_id.clone(),
            submit_date_time: descriptor.submit_date_time.clone(),
            filing_date: facts.text("jplvh_cor:FilingDateCoverPage"),
            title: facts.text("jplvh_cor:DocumentTitleCoverPage"),
            issuer_name: facts.text("jplvh_cor:NameOfIssuer"),
            issuer_sec_code: facts.text("jplvh_cor:SecurityCodeOfIssuer"),
            sec_code: facts.text("jpdei_cor:SecurityCodeDEI"),
            filer_name: facts.text("jpdei_cor:FilerNameInJapaneseDEI"),
            reason: facts.text("jplvh_cor:ReasonForFilingChangeReportCoverPage"),
        }
    }

    /// Reports filed only because an address changed.
    pub fn is_address_change(&self) -> bool {
        self.reason
            .as_deref()
            .is_some_and(|r| ADDRESS_CHANGE_KEYWORDS.iter().any(|k| r.contains(k)))
    }
}

/// A day or a document the checker could not inspect. Failed documents are not recorded in
/// the history and are retried on the next run.
#[derive(Debug)]
pub struct CheckFailure {
    pub date: NaiveDate,
    pub doc_id: Option<String>,
    pub error: EdinetError,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub alerts: Vec<HoldingsAlert>,
    /// New documents downloaded and inspected.
    pub inspected: usize,
    pub failures: Vec<CheckFailure>,
}

const SPECIAL_EXEMPTION: &str = "特例対象株券等";
const ADDRESS_CHANGE_KEYWORDS: [&str; 2] = ["所在地", "住所"];
const UNKNOWN_ISSUER: &str = "-";

/// Watches the catalog for new large holdings reports.
#[derive(Debug)]
pub struct HoldingsChecker<C> {
    client: C,
    history_path: Option<PathBuf>,
    sec_codes: Option<HashSet<String>>,
}

impl<C> HoldingsChecker<C>
where
    C: CatalogOperations + DocumentOperations,
{
    pub fn new(client: C) -> Self {
        Self {
            client,
            history_path: None,
            sec_codes: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Persists inspected ids in `path` between runs.
    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Alerts only for reports on these issuers. Five-digit EDINET codes are accepted and
    /// matched on their first four digits.
    pub fn with_sec_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sec_codes = Some(
            codes
                .into_iter()
                .map(|c| normalize_sec_code(c.as_ref()).to_string())
                .collect(),
        );
        self
    }

    /// Checks the last `days` days up to and including today (local time).
    pub async fn check(&self, days: u64) -> Result<CheckReport> {
        let today = chrono::Local::now().date_naive();
        let from = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        self.check_range(from, today).await
    }

    /// Checks `from..=to`, loading and saving the history file if one is configured.
    pub async fn check_range(&self, from: NaiveDate, to: NaiveDate) -> Result<CheckReport> {
        let mut history = match &self.history_path {
            Some(path) => History::load(path)?,
            None => History::new(),
        };
        let report = self.check_with_history(from, to, &mut history).await?;
        if let Some(path) = &self.history_path {
            history.save(path)?;
        }
        Ok(report)
    }

    /// Checks `from..=to` against an in-memory history, updating it.
    pub async fn check_with_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        history: &mut History,
    ) -> Result<CheckReport> {
        let days = days_between(from, to)?;
        let mut report = CheckReport::default();

        for date in days {
            let snapshot = match self.client.document_list(date).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    // today's listing is not always available early in the morning
                    warn!("Failed to fetch document list for {}: {}", date, error);
                    report.failures.push(CheckFailure {
                        date,
                        doc_id: None,
                        error,
                    });
                    continue;
                }
            };

            let candidates: Vec<&DocumentDescriptor> = snapshot
                .results
                .iter()
                .filter(|d| is_holdings_report(d))
                .collect();
            let diff = {
                let seen = history.seen_ids();
                diff_ids(seen, candidates.iter().map(|d| d.doc_id.as_str()))
            };
            if diff.added.is_empty() {
                info!("No updates in {}", date);
                continue;
            }

            for descriptor in candidates
                .iter()
                .filter(|d| diff.added.contains(&d.doc_id))
            {
                self.inspect(date, descriptor, history, &mut report).await;
            }
        }
        Ok(report)
    }

    async fn inspect(
        &self,
        date: NaiveDate,
        descriptor: &DocumentDescriptor,
        history: &mut History,
        report: &mut CheckReport,
    ) {
        let facts = match self.fetch_facts(&descriptor.doc_id).await {
            Ok(facts) => facts,
            Err(error) => {
                warn!("Failed to inspect {}: {}", descriptor.doc_id, error);
                report.failures.push(CheckFailure {
                    date,
                    doc_id: Some(descriptor.doc_id.clone()),
                    error,
                });
                return;
            }
        };
        report.inspected += 1;

        let alert = HoldingsAlert::from_facts(descriptor, &facts);
        let issuer = alert
            .issuer_sec_code
            .as_deref()
            .map(normalize_sec_code)
            .unwrap_or(UNKNOWN_ISSUER)
            .to_string();
        history.record(issuer.as_str(), descriptor.doc_id.as_str());

        if let Some(codes) = &self.sec_codes {
            if !codes.contains(&issuer) {
                debug!("{}: issuer {} not watched", descriptor.doc_id, issuer);
                return;
            }
        }
        if alert.is_address_change() {
            debug!("{}: address change only", descriptor.doc_id);
            return;
        }
        info!("Found: {:?}", alert);
        report.alerts.push(alert);
    }

    async fn fetch_facts(&self, doc_id: &str) -> Result<RawFactMap> {
        let bytes = self.client.document(doc_id, ContentType::Main).await?;
        xbrl::extract_archive(Cursor::new(bytes))
    }
}

fn is_holdings_report(descriptor: &DocumentDescriptor) -> bool {
    descriptor.doc_type_code == Some(DocTypeCode::LARGE_HOLDINGS_REPORT)
        && !descriptor.is_withdrawn()
        && !descriptor
            .doc_description
            .as_deref()
            .is_some_and(|d| d.contains(SPECIAL_EXEMPTION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_keeps_current_order() {
        let diff = diff_ids(["a", "b", "c"], ["d", "b", "e", "d"]);
        assert_eq!(diff.added, vec!["d", "e"]);
        assert_eq!(diff.removed, vec!["a", "c"]);
        assert!(diff_ids(["a"], ["a"]).is_empty());
    }

    #[test]
    fn history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        assert!(History::load(&path).unwrap().is_empty());

        let mut history = History::new();
        assert!(history.record("7203", "S100AAAA"));
        assert!(!history.record("7203", "S100AAAA"));
        history.record("6758", "S100BBBB");
        history.save(&path).unwrap();

        let loaded = History::load(&path).unwrap();
        assert_eq!(loaded, history);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("S100BBBB"));
        assert!(loaded.ids_for("7203").unwrap().contains("S100AAAA"));
    }

    #[test]
    fn selects_plain_holdings_reports() {
        let mut d = DocumentDescriptor::new("S100AAAA");
        d.doc_type_code = Some(DocTypeCode::LARGE_HOLDINGS_REPORT);
        d.doc_description = Some("大量保有報告書".to_string());
        assert!(is_holdings_report(&d));

        d.doc_description = Some("大量保有報告書（特例対象株券等）".to_string());
        assert!(!is_holdings_report(&d));

        d.doc_description = None;
        d.doc_type_code = Some(DocTypeCode::SECURITIES_REPORT);
        assert!(!is_holdings_report(&d));
    }

    #[test]
    fn sec_codes_are_compared_on_four_digits() {
        assert_eq!(normalize_sec_code("72030"), "7203");
        assert_eq!(normalize_sec_code(" 7203 "), "7203");
        assert_eq!(normalize_sec_code("130A0"), "130A");
    }

    #[test]
    fn address_change_detection() {
        let alert = HoldingsAlert {
            reason: Some("提出者の所在地の変更".to_string()),
            ..HoldingsAlert::default()
        };
        assert!(alert.is_address_change());
        assert!(!HoldingsAlert::default().is_address_change());
    }
}
