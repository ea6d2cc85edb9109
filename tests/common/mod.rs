use async_trait::async_trait;
use chrono::NaiveDate;
use edinetkit::{
    CatalogOperations, CatalogPage, ContentType, DocumentDescriptor, DocumentOperations,
    EdinetError, Result,
};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[allow(dead_code)]
pub fn fixture_path(relative: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn read_fixture(relative: impl AsRef<Path>) -> String {
    fs::read_to_string(fixture_path(relative)).expect("fixture file should be readable")
}

#[allow(dead_code)]
pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Descriptors of the recorded 2020-05-01 listing.
#[allow(dead_code)]
pub fn fixture_catalog() -> Vec<DocumentDescriptor> {
    let content = read_fixture("documents/2020-05-01.json");
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    serde_json::from_value(value["results"].clone()).unwrap()
}

/// A listed annual securities report that the default parser accepts.
#[allow(dead_code)]
pub fn securities_report(doc_id: &str, submitted: &str) -> DocumentDescriptor {
    let mut d = DocumentDescriptor::new(doc_id);
    d.doc_type_code = Some(edinetkit::DocTypeCode::SECURITIES_REPORT);
    d.sec_code = Some("13010".to_string());
    d.filer_name = Some("極洋食品株式会社".to_string());
    d.ordinance_code = Some("010".to_string());
    d.form_code = Some("030000".to_string());
    d.period_start = Some("2019-04-01".to_string());
    d.period_end = Some("2020-03-31".to_string());
    d.submit_date_time = Some(submitted.to_string());
    d
}

const CONTEXTS: &str = r#"
  <xbrli:context id="FilingDateInstant">
    <xbrli:entity><xbrli:identifier scheme="http://disclosure.edinet-fsa.go.jp">E00001-000</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2020-06-26</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="Prior1YearInstant">
    <xbrli:entity><xbrli:identifier scheme="http://disclosure.edinet-fsa.go.jp">E00001-000</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2019-03-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearInstant">
    <xbrli:entity><xbrli:identifier scheme="http://disclosure.edinet-fsa.go.jp">E00001-000</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2020-03-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearInstant_NonConsolidatedMember">
    <xbrli:entity>
      <xbrli:identifier scheme="http://disclosure.edinet-fsa.go.jp">E00001-000</xbrli:identifier>
      <xbrli:segment><xbrldi:explicitMember dimension="jppfs_cor:ConsolidatedOrNonConsolidatedAxis">jppfs_cor:NonConsolidatedMember</xbrldi:explicitMember></xbrli:segment>
    </xbrli:entity>
    <xbrli:period><xbrli:instant>2020-03-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearDuration">
    <xbrli:entity><xbrli:identifier scheme="http://disclosure.edinet-fsa.go.jp">E00001-000</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:startDate>2019-04-01</xbrli:startDate><xbrli:endDate>2020-03-31</xbrli:endDate></xbrli:period>
  </xbrli:context>
"#;

/// An XBRL instance reporting `facts` as `(qualified tag, context id, value)`.
#[allow(dead_code)]
pub fn instance_xml(facts: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:xbrldi="http://xbrl.org/2006/xbrldi" xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:iso4217="http://www.xbrl.org/2003/iso4217" xmlns:jpdei_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jpdei/2013-08-31/jpdei_cor" xmlns:jpcrp_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jpcrp/2019-11-01/jpcrp_cor" xmlns:jppfs_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jppfs/2019-11-01/jppfs_cor" xmlns:jplvh_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jplvh/2019-11-01/jplvh_cor">
  <link:schemaRef xlink:type="simple" xlink:href="jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26.xsd"/>
  <xbrli:unit id="JPY"><xbrli:measure>iso4217:JPY</xbrli:measure></xbrli:unit>"#,
    );
    xml.push_str(CONTEXTS);
    for (tag, context, value) in facts {
        let unit = if tag.starts_with("jppfs_cor:") {
            r#" unitRef="JPY" decimals="-6""#
        } else {
            ""
        };
        xml.push_str(&format!(
            "  <{tag} contextRef=\"{context}\"{unit}>{value}</{tag}>\n"
        ));
    }
    xml.push_str("</xbrli:xbrl>\n");
    xml
}

/// Builds a zip archive in memory.
#[allow(dead_code)]
pub fn bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// A submission bundle laid out like EDINET's, carrying an instance with `facts`.
#[allow(dead_code)]
pub fn securities_bundle(facts: &[(&str, &str, &str)]) -> Vec<u8> {
    let xml = instance_xml(facts);
    bundle(&[
        ("XBRL/PublicDoc/0000000_header_jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26_ixbrl.htm", b"<html/>".as_slice()),
        ("XBRL/PublicDoc/jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26.xsd", b"<schema/>".as_slice()),
        ("XBRL/PublicDoc/jpcrp030000-asr-001_E00001-000_2020-03-31_01_2020-06-26.xbrl", xml.as_bytes()),
    ])
}

/// A large holdings report bundle.
#[allow(dead_code)]
pub fn holdings_bundle(issuer_code: &str, reason: &str) -> Vec<u8> {
    let xml = instance_xml(&[
        ("jplvh_cor:DocumentTitleCoverPage", "FilingDateInstant", "変更報告書"),
        ("jplvh_cor:FilingDateCoverPage", "FilingDateInstant", "2020-05-01"),
        ("jplvh_cor:NameOfIssuer", "FilingDateInstant", "極洋食品株式会社"),
        ("jplvh_cor:SecurityCodeOfIssuer", "FilingDateInstant", issuer_code),
        ("jplvh_cor:ReasonForFilingChangeReportCoverPage", "FilingDateInstant", reason),
        ("jpdei_cor:FilerNameInJapaneseDEI", "FilingDateInstant", "テスト投資顧問株式会社"),
    ]);
    bundle(&[(
        "XBRL/PublicDoc/jplvh010000-lvh-001_E10001-000_2020-05-01_01_2020-05-01.xbrl",
        xml.as_bytes(),
    )])
}

/// In-memory stand-in for the EDINET API.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockEdinet {
    catalogs: HashMap<NaiveDate, Vec<DocumentDescriptor>>,
    documents: HashMap<(String, ContentType), Vec<u8>>,
    page_size: Option<usize>,
    overlapping_pages: bool,
    failing_days: HashSet<NaiveDate>,
    failing_documents: HashSet<String>,
    cancel_on: Option<(String, Arc<AtomicBool>)>,
    pub page_calls: AtomicUsize,
    pub document_calls: Mutex<Vec<(String, ContentType)>>,
}

#[allow(dead_code)]
impl MockEdinet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, date: NaiveDate, descriptors: Vec<DocumentDescriptor>) -> Self {
        self.catalogs.insert(date, descriptors);
        self
    }

    pub fn with_document(mut self, doc_id: &str, content_type: ContentType, bytes: Vec<u8>) -> Self {
        self.documents
            .insert((doc_id.to_string(), content_type), bytes);
        self
    }

    /// Serves catalogs in pages of `size`. With `overlapping`, each page repeats the last
    /// descriptor of the previous one.
    pub fn with_page_size(mut self, size: usize, overlapping: bool) -> Self {
        self.page_size = Some(size);
        self.overlapping_pages = overlapping;
        self
    }

    pub fn failing_day(mut self, date: NaiveDate) -> Self {
        self.failing_days.insert(date);
        self
    }

    pub fn failing_document(mut self, doc_id: &str) -> Self {
        self.failing_documents.insert(doc_id.to_string());
        self
    }

    /// Raises `flag` when `doc_id` is downloaded.
    pub fn cancel_on(mut self, doc_id: &str, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on = Some((doc_id.to_string(), flag));
        self
    }

    pub fn downloads(&self) -> Vec<(String, ContentType)> {
        self.document_calls.lock().unwrap().clone()
    }

    pub fn downloaded_ids(&self) -> Vec<String> {
        self.downloads().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait]
impl CatalogOperations for MockEdinet {
    async fn document_list_page(&self, date: NaiveDate, offset: usize) -> Result<CatalogPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_days.contains(&date) {
            return Err(EdinetError::HttpStatus {
                status: 503,
                url: format!("mock://documents.json?date={}", date),
            });
        }

        let listing = self.catalogs.get(&date).cloned().unwrap_or_default();
        let total = listing.len();
        let start = if self.overlapping_pages && offset > 0 {
            offset - 1
        } else {
            offset
        };
        let end = match self.page_size {
            Some(size) => (start + size).min(total),
            None => total,
        };
        let results = listing
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect();
        Ok(CatalogPage { total, results })
    }
}

#[async_trait]
impl DocumentOperations for MockEdinet {
    async fn document(&self, doc_id: &str, content_type: ContentType) -> Result<Vec<u8>> {
        self.document_calls
            .lock()
            .unwrap()
            .push((doc_id.to_string(), content_type));

        if let Some((id, flag)) = &self.cancel_on {
            if id == doc_id {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.failing_documents.contains(doc_id) {
            return Err(EdinetError::HttpStatus {
                status: 500,
                url: format!("mock://documents/{}", doc_id),
            });
        }
        self.documents
            .get(&(doc_id.to_string(), content_type))
            .cloned()
            .ok_or(EdinetError::NotFound)
    }
}
