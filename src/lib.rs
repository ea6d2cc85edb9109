//! # EdinetKit - Resumable EDINET fetcher and securities report parser
//!
//! EdinetKit downloads filings from the EDINET API v2 of Japan's Financial Services Agency
//! into a plain directory tree and turns the XBRL inside them into typed financial records.
//!
//! ## Features
//!
//! - **Rate-limited HTTP client** - One request per second by default, with retries for
//!   transient failures and EDINET's in-band error envelopes
//! - **Resumable cache** - `{root}/{date}/doc_list.json` plus one directory per document;
//!   what is on disk is never fetched again
//! - **Layered parsing** - Document-type dispatch, XBRL instance extraction and a pluggable
//!   normalizer producing typed fields
//! - **Change detection** - Reports newly filed large holdings reports against a history file
//!
//! ## Requirements
//!
//! The network side is async and needs a runtime such as [tokio](https://tokio.rs). Parsing
//! is synchronous and works offline on a previously fetched tree.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use edinetkit::{Aggregator, ArtifactStore, DocTypeCode, Edinet, FetchOptions, Fetcher, ParserRegistry};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let edinet = Edinet::new("your-subscription-key")?;
//!     let fetcher = Fetcher::new(edinet, ArtifactStore::new("edinet_data"));
//!
//!     let from = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
//!     let to = NaiveDate::from_ymd_opt(2020, 6, 30).unwrap();
//!     let options = FetchOptions::new()
//!         .with_doc_code(DocTypeCode::SECURITIES_REPORT)
//!         .require_security_code(true);
//!     fetcher.run(from, to, &options).await?;
//!
//!     let table = Aggregator::new(ParserRegistry::default()).parse("edinet_data", from, to)?;
//!     for record in &table.records {
//!         println!("{}: net assets {}", record.document_id, record.get("net_assets"));
//!     }
//!     Ok(())
//! }
//! ```

mod catalog;
mod config;
mod core;
mod documents;
mod error;
mod store;
mod traits;

#[cfg(feature = "parse")]
pub mod parsing;

// Conditionally include modules
#[cfg(feature = "fetch")]
mod fetch;
#[cfg(feature = "fetch")]
mod options;

#[cfg(feature = "parse")]
mod aggregate;
#[cfg(feature = "parse")]
mod normalize;
#[cfg(feature = "parse")]
mod registry;

#[cfg(feature = "check")]
mod check;

// Core Edinet functionality (always available)
pub use catalog::{CatalogPage, CatalogSnapshot, DocTypeCode, DocumentDescriptor, days_between};
pub use config::{DEFAULT_BASE_URL, EdinetConfig};
pub use core::Edinet;
pub use documents::ContentType;
pub use error::{EdinetError, Result};
pub use store::{ArtifactRef, ArtifactStore, DocumentArtifacts, SNAPSHOT_FILE};
pub use traits::{CatalogOperations, DocumentOperations};

#[cfg(feature = "fetch")]
pub use fetch::{FetchFailure, FetchReport, Fetcher};
#[cfg(feature = "fetch")]
pub use options::FetchOptions;

#[cfg(feature = "parse")]
pub use aggregate::{Aggregator, ParseFailure, ResultTable, SkipReason, SkippedDocument};
#[cfg(feature = "parse")]
pub use normalize::{BasicFinancialDataParser, FactNormalizer, FieldValue, FinancialRecord};
#[cfg(feature = "parse")]
pub use registry::{DocumentParser, NoopParser, ParserRegistry, SecuritiesReportParser};

#[cfg(feature = "check")]
pub use check::{
    CatalogDiff, CheckFailure, CheckReport, History, HoldingsAlert, HoldingsChecker, diff_ids,
};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
