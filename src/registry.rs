//! Document-type dispatch for the parse pipeline.
//!
//! A [`ParserRegistry`] maps document type codes to [`DocumentParser`] implementations.
//! Codes without a registered parser resolve to [`NoopParser`], which reports
//! `Unsupported` for every document instead of failing the whole run. Supporting a new
//! document type means registering one more parser; the aggregation driver stays as is.

use super::catalog::{DocTypeCode, DocumentDescriptor};
use super::error::{EdinetError, Result};
use super::normalize::{BasicFinancialDataParser, FactNormalizer, FinancialRecord};
use super::parsing::xbrl::{self, RawFactMap};
use super::store::DocumentArtifacts;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Extracts and normalizes the data of one document type.
pub trait DocumentParser: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the catalog entry is one this parser wants to read. Documents it declines are
    /// skipped rather than counted as failures.
    fn accepts(&self, _descriptor: &DocumentDescriptor) -> bool {
        true
    }

    /// Reads the raw facts out of the document's artifacts.
    ///
    /// # Errors
    ///
    /// `MalformedArtifact` when the expected structured file is missing, `UnreadableMarkup`
    /// when it is not well-formed.
    fn extract(&self, artifacts: &DocumentArtifacts) -> Result<RawFactMap>;

    /// Converts raw facts into a record. Never fails.
    fn normalize(&self, facts: &RawFactMap) -> FinancialRecord;
}

/// Fallback for document types nobody registered a parser for.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopParser;

impl DocumentParser for NoopParser {
    fn name(&self) -> &str {
        "noop"
    }

    fn extract(&self, artifacts: &DocumentArtifacts) -> Result<RawFactMap> {
        Err(EdinetError::Unsupported(format!(
            "no parser registered for the document type of {}",
            artifacts.doc_id
        )))
    }

    fn normalize(&self, _facts: &RawFactMap) -> FinancialRecord {
        FinancialRecord::new()
    }
}

/// Parser for annual securities reports (有価証券報告書, type 120) of listed companies.
///
/// The financial fields are produced by the normalizer `N`.
#[derive(Debug, Clone, Default)]
pub struct SecuritiesReportParser<N = BasicFinancialDataParser> {
    normalizer: N,
}

impl<N: FactNormalizer> SecuritiesReportParser<N> {
    pub const ORDINANCE_CODE: &'static str = "010";
    pub const FORM_CODE: &'static str = "030000";

    pub fn new(normalizer: N) -> Self {
        Self { normalizer }
    }
}

impl<N: FactNormalizer> DocumentParser for SecuritiesReportParser<N> {
    fn name(&self) -> &str {
        "securities-report"
    }

    fn accepts(&self, descriptor: &DocumentDescriptor) -> bool {
        if descriptor.doc_type_code != Some(DocTypeCode::SECURITIES_REPORT)
            || !descriptor.has_security_code()
        {
            return false;
        }
        let ordinance = descriptor.ordinance_code.as_deref();
        let form = descriptor.form_code.as_deref();
        if ordinance != Some(Self::ORDINANCE_CODE) || form != Some(Self::FORM_CODE) {
            warn!(
                "Skipping {} (ordinanceCode: {}, formCode: {})",
                descriptor.doc_id,
                ordinance.unwrap_or("-"),
                form.unwrap_or("-")
            );
            return false;
        }
        true
    }

    fn extract(&self, artifacts: &DocumentArtifacts) -> Result<RawFactMap> {
        let bundle = artifacts.primary().ok_or_else(|| {
            EdinetError::MalformedArtifact(format!("{} has no submission bundle", artifacts.doc_id))
        })?;
        xbrl::extract_file(bundle)
    }

    fn normalize(&self, facts: &RawFactMap) -> FinancialRecord {
        self.normalizer.normalize(facts)
    }
}

/// Lookup table from document type code to parser.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<DocTypeCode, Arc<dyn DocumentParser>>,
    fallback: Arc<dyn DocumentParser>,
}

impl ParserRegistry {
    /// A registry with no parsers; every code resolves to [`NoopParser`].
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            fallback: Arc::new(NoopParser),
        }
    }

    /// Registers `parser` for `code`, replacing any earlier registration.
    pub fn register<P>(&mut self, code: DocTypeCode, parser: P) -> &mut Self
    where
        P: DocumentParser + 'static,
    {
        self.parsers.insert(code, Arc::new(parser));
        self
    }

    pub fn with_parser<P>(mut self, code: DocTypeCode, parser: P) -> Self
    where
        P: DocumentParser + 'static,
    {
        self.register(code, parser);
        self
    }

    /// The parser for `code`, or the no-op fallback.
    pub fn resolve(&self, code: Option<DocTypeCode>) -> &dyn DocumentParser {
        code.and_then(|c| self.parsers.get(&c))
            .map(|p| p.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn is_registered(&self, code: DocTypeCode) -> bool {
        self.parsers.contains_key(&code)
    }
}

/// Registers [`SecuritiesReportParser`] for type 120.
impl Default for ParserRegistry {
    fn default() -> Self {
        Self::empty().with_parser(
            DocTypeCode::SECURITIES_REPORT,
            SecuritiesReportParser::new(BasicFinancialDataParser),
        )
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<_> = self.parsers.keys().collect();
        codes.sort();
        f.debug_struct("ParserRegistry")
            .field("codes", &codes)
            .finish()
    }
}
