//! Conversion of raw XBRL facts into typed financial records.

use super::catalog::DocumentDescriptor;
use super::parsing::xbrl::RawFactMap;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// A typed field value. `Absent` means the filing did not report the field (or reported
/// something that could not be read), which is distinct from a reported zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Whole currency units.
    Amount(i64),
    Count(i64),
    Date(NaiveDate),
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// The numeric value of an amount or a count.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Amount(v) | FieldValue::Count(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Absent values render as an empty string.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Amount(v) | FieldValue::Count(v) => write!(f, "{}", v),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Absent => Ok(()),
        }
    }
}

/// Typed financial data of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialRecord {
    pub document_id: String,
    pub filing_date: Option<NaiveDate>,
    pub security_code: Option<String>,
    pub filer_name: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    /// Fields in the order the normalizer produced them.
    pub fields: Vec<(String, FieldValue)>,
}

impl FinancialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `field`, `Absent` when the normalizer never set it.
    pub fn get(&self, field: &str) -> FieldValue {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| *value)
            .unwrap_or(FieldValue::Absent)
    }

    /// Sets `field`, replacing an earlier value while keeping its position.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Copies the identifying data of the catalog entry onto the record.
    pub fn tag(&mut self, descriptor: &DocumentDescriptor) {
        self.document_id = descriptor.doc_id.clone();
        self.filing_date = descriptor.filing_date();
        self.security_code = descriptor.sec_code.clone();
        self.filer_name = descriptor.filer_name.clone();
        self.period_start = descriptor.period_start.clone();
        self.period_end = descriptor.period_end.clone();
    }
}

/// Turns a [`RawFactMap`] into a [`FinancialRecord`].
///
/// Normalization never fails: unreadable or missing values become [`FieldValue::Absent`].
pub trait FactNormalizer: Send + Sync {
    fn normalize(&self, facts: &RawFactMap) -> FinancialRecord;
}

#[derive(Clone, Copy)]
enum Kind {
    Amount,
    Count,
    Date,
}

const FIELDS: &[(&str, &str, Kind)] = &[
    // balance sheet
    ("assets", "jppfs_cor:Assets", Kind::Amount),
    ("current_assets", "jppfs_cor:CurrentAssets", Kind::Amount),
    ("noncurrent_assets", "jppfs_cor:NoncurrentAssets", Kind::Amount),
    ("liabilities", "jppfs_cor:Liabilities", Kind::Amount),
    ("current_liabilities", "jppfs_cor:CurrentLiabilities", Kind::Amount),
    ("noncurrent_liabilities", "jppfs_cor:NoncurrentLiabilities", Kind::Amount),
    ("net_assets", "jppfs_cor:NetAssets", Kind::Amount),
    ("liabilities_and_net_assets", "jppfs_cor:LiabilitiesAndNetAssets", Kind::Amount),
    // income statement
    ("net_sales", "jppfs_cor:NetSales", Kind::Amount),
    ("operating_income", "jppfs_cor:OperatingIncome", Kind::Amount),
    ("ordinary_income", "jppfs_cor:OrdinaryIncome", Kind::Amount),
    ("profit_loss", "jppfs_cor:ProfitLoss", Kind::Amount),
    // cash flow
    (
        "operating_cashflow",
        "jppfs_cor:NetCashProvidedByUsedInOperatingActivities",
        Kind::Amount,
    ),
    (
        "investment_cashflow",
        "jppfs_cor:NetCashProvidedByUsedInInvestmentActivities",
        Kind::Amount,
    ),
    (
        "financing_cashflow",
        "jppfs_cor:NetCashProvidedByUsedInFinancingActivities",
        Kind::Amount,
    ),
    ("number_of_employees", "jpcrp_cor:NumberOfEmployees", Kind::Count),
    (
        "issued_shares",
        "jpcrp_cor:TotalNumberOfIssuedSharesSummaryOfBusinessResults",
        Kind::Count,
    ),
    ("fiscal_year_start", "jpdei_cor:CurrentFiscalYearStartDateDEI", Kind::Date),
    ("fiscal_year_end", "jpdei_cor:CurrentFiscalYearEndDateDEI", Kind::Date),
];

/// Basic balance sheet, income statement and cash flow figures of a securities report.
///
/// Only facts of a current-period context without a dimensional breakdown qualify. The
/// consolidated figure is used when reported, the non-consolidated one otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFinancialDataParser;

impl BasicFinancialDataParser {
    pub fn new() -> Self {
        Self
    }

    fn read(facts: &RawFactMap, field: &str, tag: &str, kind: Kind) -> FieldValue {
        let Some(fact) = facts.get(tag) else {
            return FieldValue::Absent;
        };
        if !fact.is_current() || fact.is_dimensional() {
            debug!(
                "{}: no current non-dimensional fact (best context {})",
                tag, fact.context_ref
            );
            return FieldValue::Absent;
        }

        let raw = fact.value.trim();
        let parsed = match kind {
            Kind::Amount => raw.parse::<i64>().map(FieldValue::Amount).ok(),
            Kind::Count => raw.parse::<i64>().map(FieldValue::Count).ok(),
            Kind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(FieldValue::Date)
                .ok(),
        };
        parsed.unwrap_or_else(|| {
            warn!("{}: cannot read '{}' from {}, leaving it absent", field, raw, tag);
            FieldValue::Absent
        })
    }
}

impl FactNormalizer for BasicFinancialDataParser {
    fn normalize(&self, facts: &RawFactMap) -> FinancialRecord {
        let mut record = FinancialRecord::new();
        for (field, tag, kind) in FIELDS {
            record.set(*field, Self::read(facts, field, tag, *kind));
        }

        let free_cashflow = match (
            record.get("operating_cashflow").as_i64(),
            record.get("investment_cashflow").as_i64(),
        ) {
            (Some(operating), Some(investment)) => operating
                .checked_add(investment)
                .map_or(FieldValue::Absent, FieldValue::Amount),
            _ => FieldValue::Absent,
        };
        record.set("free_cashflow", free_cashflow);

        if record.get("fiscal_year_end").is_absent() {
            if let Some(instance) = &facts.instance {
                record.set("fiscal_year_end", FieldValue::Date(instance.period_end));
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::xbrl::{Consolidation, InstanceName, PeriodKind, RawFact};

    fn fact(value: &str, context: &str) -> RawFact {
        RawFact {
            value: value.to_string(),
            context_ref: context.to_string(),
            unit_ref: Some("JPY".to_string()),
            decimals: Some("-6".to_string()),
            period: PeriodKind::from_context_id(context),
            consolidation: if context.ends_with("NonConsolidatedMember") {
                Consolidation::NonConsolidated
            } else if context.contains('_') {
                Consolidation::Dimensional
            } else {
                Consolidation::Consolidated
            },
        }
    }

    #[test]
    fn reads_amounts_and_keeps_zero() {
        let mut facts = RawFactMap::new();
        facts.insert("jppfs_cor:NetAssets", fact("123456789", "CurrentYearInstant"));
        facts.insert("jppfs_cor:OrdinaryIncome", fact("0", "CurrentYearDuration"));
        facts.insert("jppfs_cor:ProfitLoss", fact("-42", "CurrentYearDuration"));

        let record = BasicFinancialDataParser.normalize(&facts);
        assert_eq!(record.get("net_assets"), FieldValue::Amount(123456789));
        assert_eq!(record.get("ordinary_income"), FieldValue::Amount(0));
        assert_eq!(record.get("profit_loss"), FieldValue::Amount(-42));
        assert_eq!(record.get("net_sales"), FieldValue::Absent);
    }

    #[test]
    fn bad_value_is_absent_not_fatal() {
        let mut facts = RawFactMap::new();
        facts.insert("jppfs_cor:Assets", fact("n/a", "CurrentYearInstant"));
        facts.insert("jppfs_cor:Liabilities", fact("10", "CurrentYearInstant"));

        let record = BasicFinancialDataParser.normalize(&facts);
        assert!(record.get("assets").is_absent());
        assert_eq!(record.get("liabilities"), FieldValue::Amount(10));
    }

    #[test]
    fn prior_and_dimensional_facts_do_not_qualify() {
        let mut facts = RawFactMap::new();
        facts.insert("jppfs_cor:Assets", fact("1", "Prior1YearInstant"));
        facts.insert("jppfs_cor:NetSales", fact("2", "CurrentYearDuration_FoodMember"));
        facts.insert(
            "jppfs_cor:NetAssets",
            fact("3", "CurrentYearInstant_NonConsolidatedMember"),
        );

        let record = BasicFinancialDataParser.normalize(&facts);
        assert!(record.get("assets").is_absent());
        assert!(record.get("net_sales").is_absent());
        assert_eq!(record.get("net_assets"), FieldValue::Amount(3));
    }

    #[test]
    fn free_cashflow_needs_both_parts() {
        let mut facts = RawFactMap::new();
        facts.insert(
            "jppfs_cor:NetCashProvidedByUsedInOperatingActivities",
            fact("1000", "CurrentYearDuration"),
        );
        let record = BasicFinancialDataParser.normalize(&facts);
        assert!(record.get("free_cashflow").is_absent());

        facts.insert(
            "jppfs_cor:NetCashProvidedByUsedInInvestmentActivities",
            fact("-300", "CurrentYearDuration"),
        );
        let record = BasicFinancialDataParser.normalize(&facts);
        assert_eq!(record.get("free_cashflow"), FieldValue::Amount(700));
    }

    #[test]
    fn fiscal_year_end_falls_back_to_instance_name() {
        let mut facts = RawFactMap::new();
        facts.insert("jpcrp_cor:NumberOfEmployees", fact("1234", "CurrentYearInstant"));
        facts.instance = Some(
            InstanceName::parse("jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26.xbrl")
                .unwrap(),
        );

        let record = BasicFinancialDataParser.normalize(&facts);
        assert_eq!(record.get("number_of_employees"), FieldValue::Count(1234));
        assert_eq!(
            record.get("fiscal_year_end"),
            FieldValue::Date(NaiveDate::from_ymd_opt(2020, 3, 31).unwrap())
        );
        assert!(record.get("fiscal_year_start").is_absent());
    }

    #[test]
    fn display_leaves_absent_blank() {
        assert_eq!(FieldValue::Amount(5).to_string(), "5");
        assert_eq!(FieldValue::Absent.to_string(), "");
        assert_eq!(
            FieldValue::Date(NaiveDate::from_ymd_opt(2020, 3, 31).unwrap()).to_string(),
            "2020-03-31"
        );
    }
}
