//! Best-effort parsing of a fetched date range.
//!
//! [`Aggregator::parse`] reads the persisted catalog of each day, hands every document that
//! has a submission bundle to the parser registered for its type and folds the results into
//! a [`ResultTable`]. Nothing is dropped silently: every document of every snapshot ends up
//! as a record, a skip with its reason, or a failure with its cause.
//!
//! ```ignore
//! use edinetkit::{Aggregator, ParserRegistry};
//! use chrono::NaiveDate;
//!
//! let day = NaiveDate::from_ymd_opt(2020, 6, 26).unwrap();
//! let table = Aggregator::new(ParserRegistry::default()).parse("edinet_data", day, day)?;
//! table.write_csv(std::io::stdout())?;
//! ```

use super::catalog::{DocTypeCode, DocumentDescriptor, days_between, normalize_sec_code};
use super::documents::ContentType;
use super::parsing::xbrl::RawFactMap;
use super::error::{EdinetError, Result};
use super::normalize::FinancialRecord;
use super::registry::ParserRegistry;
use super::store::ArtifactStore;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Why a listed document produced no record without counting as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The submission bundle was never fetched.
    NoPrimaryArtifact,
    /// The parser for the document type declined it.
    NotSelected,
    Withdrawn,
    /// The id already produced a record earlier in the range.
    Duplicate,
    /// The filer's security code is outside the configured watch list.
    NotWatched,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoPrimaryArtifact => "no primary artifact",
            SkipReason::NotSelected => "not selected by parser",
            SkipReason::Withdrawn => "withdrawn",
            SkipReason::Duplicate => "duplicate document id",
            SkipReason::NotWatched => "security code not watched",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub date: NaiveDate,
    pub document_id: String,
    pub reason: SkipReason,
}

/// A day or a document that could not be parsed.
#[derive(Debug)]
pub struct ParseFailure {
    pub date: NaiveDate,
    /// `None` when the whole day failed, e.g. on `MissingSnapshot`.
    pub document_id: Option<String>,
    pub doc_type: Option<DocTypeCode>,
    pub error: EdinetError,
}

/// Records of a date range plus the accounting of everything that did not become a record.
///
/// Records are in date order, then catalog order; no two share a document id.
#[derive(Debug, Default)]
pub struct ResultTable {
    pub records: Vec<FinancialRecord>,
    pub errors: Vec<ParseFailure>,
    pub skipped: Vec<SkippedDocument>,
}

const DESCRIPTOR_COLUMNS: [&str; 6] = [
    "document_id",
    "filing_date",
    "security_code",
    "filer_name",
    "period_start",
    "period_end",
];

impl ResultTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, document_id: &str) -> Option<&FinancialRecord> {
        self.records.iter().find(|r| r.document_id == document_id)
    }

    /// Field names across all records, in first-seen order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for record in &self.records {
            for (name, _) in &record.fields {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Writes the records as CSV: descriptor columns, then one column per field. Absent
    /// fields are empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let fields = self.field_names();
        let mut csv = csv::Writer::from_writer(writer);

        let header: Vec<&str> = DESCRIPTOR_COLUMNS
            .iter()
            .copied()
            .chain(fields.iter().copied())
            .collect();
        csv.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![
                record.document_id.clone(),
                record
                    .filing_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                record.security_code.clone().unwrap_or_default(),
                record.filer_name.clone().unwrap_or_default(),
                record.period_start.clone().unwrap_or_default(),
                record.period_end.clone().unwrap_or_default(),
            ];
            row.extend(fields.iter().map(|f| record.get(f).to_string()));
            csv.write_record(&row)?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// Walks an [`ArtifactStore`] and runs the registered parsers over it.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    registry: ParserRegistry,
    sec_codes: Option<HashSet<String>>,
    fact_dir: Option<PathBuf>,
    pdf_dir: Option<PathBuf>,
}

impl Aggregator {
    pub fn new(registry: ParserRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Parses only filers with these security codes; the rest are skipped as
    /// [`SkipReason::NotWatched`]. Four and five digit codes match each other.
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

    /// Writes every extracted fact of a document to `{dir}/{doc_id}.csv`.
    pub fn with_fact_dump(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fact_dir = Some(dir.into());
        self
    }

    /// Copies the PDF rendition of every parsed document into `dir`.
    pub fn with_pdf_copy(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pdf_dir = Some(dir.into());
        self
    }

    /// Parses every fetched day of `from..=to` under `root`.
    ///
    /// # Errors
    ///
    /// `InvalidRange` and `InvalidDirectory` abort before anything is read; all other
    /// problems are recorded in the returned table.
    pub fn parse(
        &self,
        root: impl Into<PathBuf>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ResultTable> {
        let days = days_between(from, to)?;
        let store = ArtifactStore::open(root)?;
        Ok(self.parse_days(&store, days))
    }

    /// Like [`parse`](Self::parse) over an already opened store.
    pub fn parse_store(
        &self,
        store: &ArtifactStore,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ResultTable> {
        let days = days_between(from, to)?;
        Ok(self.parse_days(store, days))
    }

    fn parse_days(&self, store: &ArtifactStore, days: Vec<NaiveDate>) -> ResultTable {
        let mut table = ResultTable::default();
        let mut seen = HashSet::new();

        for date in days {
            let snapshot = match store.read_snapshot(date) {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!("Document list for {} unavailable: {}", date, error);
                    table.errors.push(ParseFailure {
                        date,
                        document_id: None,
                        doc_type: None,
                        error,
                    });
                    continue;
                }
            };
            debug!("{}: {} documents listed", date, snapshot.count);

            for descriptor in &snapshot.results {
                self.parse_document(store, date, descriptor, &mut seen, &mut table);
            }
        }

        info!(
            "parse finished: {} records, {} skipped, {} failed",
            table.records.len(),
            table.skipped.len(),
            table.errors.len()
        );
        table
    }

    fn parse_document(
        &self,
        store: &ArtifactStore,
        date: NaiveDate,
        descriptor: &DocumentDescriptor,
        seen: &mut HashSet<String>,
        table: &mut ResultTable,
    ) {
        let id = descriptor.doc_id.as_str();
        let mut skip = |reason: SkipReason| {
            debug!("Skipping {} ({})", id, reason);
            table.skipped.push(SkippedDocument {
                date,
                document_id: id.to_string(),
                reason,
            });
        };

        if seen.contains(id) {
            skip(SkipReason::Duplicate);
            return;
        }
        if descriptor.is_withdrawn() {
            skip(SkipReason::Withdrawn);
            return;
        }
        if let Some(codes) = &self.sec_codes {
            let watched = descriptor
                .sec_code
                .as_deref()
                .is_some_and(|code| codes.contains(normalize_sec_code(code)));
            if !watched {
                skip(SkipReason::NotWatched);
                return;
            }
        }
        let artifacts = match store.artifacts(date, id) {
            Ok(artifacts) => artifacts,
            Err(error) => {
                warn!("Cannot locate artifacts of {:?}: {}", id, error);
                table.errors.push(ParseFailure {
                    date,
                    document_id: Some(id.to_string()),
                    doc_type: descriptor.doc_type_code,
                    error,
                });
                return;
            }
        };
        if artifacts.primary().is_none() {
            skip(SkipReason::NoPrimaryArtifact);
            return;
        }
        let parser = self.registry.resolve(descriptor.doc_type_code);
        if !parser.accepts(descriptor) {
            skip(SkipReason::NotSelected);
            return;
        }

        info!("parse {} with {}", id, parser.name());
        match parser.extract(&artifacts) {
            Ok(facts) => {
                self.write_debug_output(id, &facts, artifacts.get(ContentType::Pdf));
                let mut record = parser.normalize(&facts);
                record.tag(descriptor);
                if record.filing_date.is_none() {
                    record.filing_date = Some(date);
                }
                seen.insert(id.to_string());
                table.records.push(record);
            }
            Err(error) => {
                warn!("Failed to parse {}: {}", id, error);
                table.errors.push(ParseFailure {
                    date,
                    document_id: Some(id.to_string()),
                    doc_type: descriptor.doc_type_code,
                    error,
                });
            }
        }
    }

    /// Debug output never turns a parsed document into a failure.
    fn write_debug_output(&self, id: &str, facts: &RawFactMap, pdf: Option<&Path>) {
        if let Some(dir) = &self.fact_dir {
            if let Err(error) = dump_facts(&dir.join(format!("{}.csv", id)), facts) {
                warn!("Failed to dump facts of {}: {}", id, error);
            }
        }
        if let (Some(dir), Some(pdf)) = (&self.pdf_dir, pdf) {
            if let Err(error) = copy_into(dir, pdf) {
                warn!("Failed to copy {}: {}", pdf.display(), error);
            }
        }
    }
}

/// One row per tag, sorted by tag.
fn dump_facts(path: &Path, facts: &RawFactMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut rows: Vec<_> = facts.iter().collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    let mut csv = csv::Writer::from_path(path)?;
    csv.write_record(["tag", "value", "context_ref", "unit_ref", "decimals"])?;
    for (tag, fact) in rows {
        csv.write_record([
            tag,
            fact.value.as_str(),
            fact.context_ref.as_str(),
            fact.unit_ref.as_deref().unwrap_or_default(),
            fact.decimals.as_deref().unwrap_or_default(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

fn copy_into(dir: &Path, file: &Path) -> Result<()> {
    let name = file
        .file_name()
        .ok_or_else(|| EdinetError::InvalidDirectory(file.to_path_buf()))?;
    fs::create_dir_all(dir)?;
    fs::copy(file, dir.join(name))?;
    Ok(())
}
