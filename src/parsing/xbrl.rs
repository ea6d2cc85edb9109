//! XBRL instance extraction.
//!
//! An EDINET submission bundle (`{id}_1.zip`) carries exactly one public instance document at
//! `XBRL/PublicDoc/*.xbrl`, next to taxonomy schemas and linkbases that are of no interest here.
//! [`extract_file`] opens the bundle, locates that instance and flattens its facts into a
//! [`RawFactMap`] keyed by qualified tag name (`jppfs_cor:NetAssets`).
//!
//! When a tag is reported in several contexts the map keeps one fact per tag, chosen by
//! context rank: current period before other periods before prior periods, and within a
//! period consolidated before non-consolidated before any other dimensional breakdown. Equal
//! ranks keep the first occurrence in document order.

use crate::error::{EdinetError, Result};
use crate::parsing::utils::normalize_text;
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;

const INSTANCE_DIR: &str = "XBRL/PublicDoc/";
const INSTANCE_EXT: &str = ".xbrl";
const NON_CONSOLIDATED_MEMBER: &str = "NonConsolidatedMember";

/// Reporting period of a context, ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodKind {
    Current,
    Other,
    Prior,
}

impl PeriodKind {
    /// Classifies an EDINET context id such as `CurrentYearInstant` or
    /// `Prior1YearDuration_NonConsolidatedMember`.
    pub fn from_context_id(id: &str) -> Self {
        if id.starts_with("Current") || id.starts_with("Interim") || id.starts_with("FilingDate")
        {
            PeriodKind::Current
        } else if id.starts_with("Prior") {
            PeriodKind::Prior
        } else {
            PeriodKind::Other
        }
    }
}

/// Dimensional qualification of a context, ordered from most to least preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Consolidation {
    Consolidated,
    NonConsolidated,
    Dimensional,
}

/// One `xbrli:context` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub id: String,
    pub instant: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Explicit member values (`jppfs_cor:NonConsolidatedMember`) and typed member dimensions.
    pub members: Vec<String>,
}

impl Context {
    pub fn period(&self) -> PeriodKind {
        PeriodKind::from_context_id(&self.id)
    }

    pub fn consolidation(&self) -> Consolidation {
        if self.members.is_empty() {
            Consolidation::Consolidated
        } else if self
            .members
            .iter()
            .all(|m| local_part(m) == NON_CONSOLIDATED_MEMBER)
        {
            Consolidation::NonConsolidated
        } else {
            Consolidation::Dimensional
        }
    }
}

/// A single reported value together with the classification of its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFact {
    pub value: String,
    pub context_ref: String,
    pub unit_ref: Option<String>,
    pub decimals: Option<String>,
    pub period: PeriodKind,
    pub consolidation: Consolidation,
}

impl RawFact {
    /// Lower is better.
    pub fn rank(&self) -> (PeriodKind, Consolidation) {
        (self.period, self.consolidation)
    }

    pub fn is_current(&self) -> bool {
        self.period == PeriodKind::Current
    }

    pub fn is_dimensional(&self) -> bool {
        self.consolidation == Consolidation::Dimensional
    }
}

/// Flat mapping from qualified tag name to the preferred fact for that tag.
#[derive(Debug, Clone, Default)]
pub struct RawFactMap {
    facts: HashMap<String, RawFact>,
    /// Decoded name of the instance file the facts were read from, if any.
    pub instance: Option<InstanceName>,
}

impl RawFactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&RawFact> {
        self.facts.get(tag)
    }

    /// Raw value of `tag` as written in the instance.
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.facts.get(tag).map(|f| f.value.as_str())
    }

    /// Value of `tag` with whitespace flattened for display.
    pub fn text(&self, tag: &str) -> Option<String> {
        self.value(tag).map(normalize_text)
    }

    /// Stores `fact` unless a fact with a better or equal rank is already present.
    /// Returns whether the map changed.
    pub fn insert(&mut self, tag: impl Into<String>, fact: RawFact) -> bool {
        let tag = tag.into();
        match self.facts.get(&tag) {
            Some(existing) if existing.rank() <= fact.rank() => false,
            _ => {
                self.facts.insert(tag, fact);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawFact)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Information encoded in an instance file name such as
/// `jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26.xbrl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    /// `crp` in the example above.
    pub ordinance_code: String,
    /// `030000`
    pub form_code: String,
    /// `asr`
    pub report_code: String,
    pub serial_number: u32,
    /// EDINET code or fund code of the filer.
    pub edinet_code: String,
    pub additional_number: u32,
    /// End of the reporting period, or the date the filing obligation arose.
    pub period_end: NaiveDate,
    pub submission_number: u32,
    pub submission_date: NaiveDate,
}

impl InstanceName {
    pub fn parse(name: &str) -> Result<Self> {
        if !name.starts_with("jp") {
            return Err(EdinetError::MalformedArtifact(format!(
                "unsupported XBRL file name: {}",
                name
            )));
        }

        let slice = |from: usize, to: usize| {
            name.get(from..to).ok_or_else(|| {
                EdinetError::MalformedArtifact(format!("XBRL file name too short: {}", name))
            })
        };
        let number = |from: usize, to: usize| -> Result<u32> {
            slice(from, to)?.parse().map_err(|_| {
                EdinetError::MalformedArtifact(format!("bad number in XBRL file name: {}", name))
            })
        };
        let date = |from: usize, to: usize| -> Result<NaiveDate> {
            NaiveDate::parse_from_str(slice(from, to)?, "%Y-%m-%d").map_err(|_| {
                EdinetError::MalformedArtifact(format!("bad date in XBRL file name: {}", name))
            })
        };

        Ok(Self {
            ordinance_code: slice(2, 5)?.to_string(),
            form_code: slice(5, 11)?.to_string(),
            report_code: slice(12, 15)?.to_string(),
            serial_number: number(16, 19)?,
            edinet_code: slice(20, 26)?.to_string(),
            additional_number: number(27, 30)?,
            period_end: date(31, 41)?,
            submission_number: number(42, 44)?,
            submission_date: date(45, 55)?,
        })
    }
}

/// Picks the public instance document out of a bundle's entry names.
pub fn find_instance<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<&'a str> {
    let mut found = None;
    for name in names {
        if name.starts_with(INSTANCE_DIR) && name.ends_with(INSTANCE_EXT) {
            if let Some(first) = found {
                return Err(EdinetError::MalformedArtifact(format!(
                    "multiple XBRL instances in bundle: {} and {}",
                    first, name
                )));
            }
            found = Some(name);
        }
    }
    found.ok_or_else(|| {
        EdinetError::MalformedArtifact(format!("no {}*{} in bundle", INSTANCE_DIR, INSTANCE_EXT))
    })
}

/// Reads the instance document out of a zip bundle and parses it.
pub fn extract_archive<R: Read + Seek>(reader: R) -> Result<RawFactMap> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let entry = {
        let names: Vec<&str> = archive.file_names().collect();
        find_instance(names)?.to_string()
    };
    debug!("XBRL instance: {}", entry);

    let mut xml = Vec::new();
    archive
        .by_name(&entry)?
        .read_to_end(&mut xml)
        .map_err(|e| EdinetError::MalformedArtifact(format!("cannot inflate {}: {}", entry, e)))?;

    let file_name = entry.rsplit('/').next().unwrap_or(entry.as_str());
    let instance = InstanceName::parse(file_name)?;

    let mut facts = parse_instance(&xml)?;
    facts.instance = Some(instance);
    Ok(facts)
}

/// Opens a bundle on disk and parses its instance document.
pub fn extract_file(path: &Path) -> Result<RawFactMap> {
    let file = File::open(path)?;
    extract_archive(BufReader::new(file)).map_err(|e| match e {
        EdinetError::MalformedArtifact(msg) => {
            EdinetError::MalformedArtifact(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

struct PendingFact {
    tag: String,
    value: String,
    context_ref: String,
    unit_ref: Option<String>,
    decimals: Option<String>,
    nil: bool,
}

enum ContextField {
    Instant,
    StartDate,
    EndDate,
    Member,
}

/// Parses an XBRL instance document.
///
/// Facts are the direct children of the root `xbrl` element that carry a `contextRef`.
/// Nil facts are dropped. Contexts may appear anywhere among the root's children.
pub fn parse_instance(xml: &[u8]) -> Result<RawFactMap> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;

    let mut contexts: HashMap<String, Context> = HashMap::new();
    let mut context: Option<Context> = None;
    let mut context_field: Option<ContextField> = None;
    let mut fact: Option<PendingFact> = None;
    let mut pending: Vec<PendingFact> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth == 1 {
                    check_root(e)?;
                    saw_root = true;
                } else if depth == 2 {
                    if e.local_name().as_ref() == b"context" {
                        context = Some(Context {
                            id: attribute(e, b"id")?.unwrap_or_default(),
                            ..Context::default()
                        });
                    } else {
                        fact = pending_fact(e)?;
                    }
                } else if context.is_some() {
                    context_field = match e.local_name().as_ref() {
                        b"instant" => Some(ContextField::Instant),
                        b"startDate" => Some(ContextField::StartDate),
                        b"endDate" => Some(ContextField::EndDate),
                        b"explicitMember" => Some(ContextField::Member),
                        b"typedMember" => {
                            if let (Some(ctx), Some(dim)) =
                                (context.as_mut(), attribute(e, b"dimension")?)
                            {
                                ctx.members.push(dim);
                            }
                            None
                        }
                        _ => None,
                    };
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 {
                    check_root(e)?;
                    saw_root = true;
                } else if depth == 1 {
                    if e.local_name().as_ref() == b"context" {
                        if let Some(id) = attribute(e, b"id")? {
                            contexts.insert(id.clone(), Context { id, ..Context::default() });
                        }
                    } else if let Some(empty) = pending_fact(e)? {
                        pending.push(empty);
                    }
                } else if let Some(ctx) = context.as_mut() {
                    if e.local_name().as_ref() == b"typedMember" {
                        if let Some(dim) = attribute(e, b"dimension")? {
                            ctx.members.push(dim);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape()?;
                if let Some(f) = fact.as_mut() {
                    f.value.push_str(&text);
                } else if let (Some(ctx), Some(field)) = (context.as_mut(), context_field.as_ref())
                {
                    record_context_field(ctx, field, text.trim())?;
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(f) = fact.as_mut() {
                    f.value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some(ctx) = context.take() {
                        contexts.insert(ctx.id.clone(), ctx);
                    }
                    if let Some(done) = fact.take() {
                        pending.push(done);
                    }
                }
                context_field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(EdinetError::UnreadableMarkup(
            "document has no root element".to_string(),
        ));
    }
    if depth != 0 {
        return Err(EdinetError::UnreadableMarkup(format!(
            "unexpected end of document at position {}",
            reader.buffer_position()
        )));
    }

    let mut facts = RawFactMap::new();
    for p in pending {
        if p.nil {
            continue;
        }
        let (period, consolidation) = match contexts.get(&p.context_ref) {
            Some(ctx) => (ctx.period(), ctx.consolidation()),
            None => (PeriodKind::Prior, Consolidation::Dimensional),
        };
        facts.insert(
            p.tag,
            RawFact {
                value: p.value.trim().to_string(),
                context_ref: p.context_ref,
                unit_ref: p.unit_ref,
                decimals: p.decimals,
                period,
                consolidation,
            },
        );
    }
    debug!(
        "parsed XBRL instance: {} contexts, {} tags",
        contexts.len(),
        facts.len()
    );
    Ok(facts)
}

fn check_root(e: &BytesStart) -> Result<()> {
    if e.local_name().as_ref() == b"xbrl" {
        Ok(())
    } else {
        Err(EdinetError::MalformedArtifact(format!(
            "root element is <{}>, not <xbrl>",
            String::from_utf8_lossy(e.name().as_ref())
        )))
    }
}

fn pending_fact(e: &BytesStart) -> Result<Option<PendingFact>> {
    let mut context_ref = None;
    let mut unit_ref = None;
    let mut decimals = None;
    let mut nil = false;

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_ref() {
            b"contextRef" => context_ref = Some(attr.unescape_value()?.into_owned()),
            b"unitRef" => unit_ref = Some(attr.unescape_value()?.into_owned()),
            b"decimals" => decimals = Some(attr.unescape_value()?.into_owned()),
            _ if attr.key.local_name().as_ref() == b"nil" => {
                nil = attr.unescape_value()?.trim() == "true";
            }
            _ => {}
        }
    }

    Ok(context_ref.map(|context_ref| PendingFact {
        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        value: String::new(),
        context_ref,
        unit_ref,
        decimals,
        nil,
    }))
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    match e.try_get_attribute(key).map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn record_context_field(ctx: &mut Context, field: &ContextField, text: &str) -> Result<()> {
    match field {
        ContextField::Instant => ctx.instant = Some(context_date(text, &ctx.id)?),
        ContextField::StartDate => ctx.start_date = Some(context_date(text, &ctx.id)?),
        ContextField::EndDate => ctx.end_date = Some(context_date(text, &ctx.id)?),
        ContextField::Member => ctx.members.push(text.to_string()),
    }
    Ok(())
}

fn context_date(text: &str, context_id: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
        EdinetError::UnreadableMarkup(format!("bad date '{}' in context {}", text, context_id))
    })
}

fn local_part(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}
