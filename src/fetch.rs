//! Resumable download of a date range into an [`ArtifactStore`].
//!
//! A run walks the closed range `from..=to` one day at a time:
//!
//! 1. the full catalog of the day is assembled (pages merged) and filtered,
//! 2. the filtered catalog is persisted as the day's `doc_list.json`,
//! 3. every requested rendition of every kept document is downloaded unless it is already
//!    on disk.
//!
//! Because step 3 consults the store before touching the network, re-running a range with
//! `overwrite = false` only downloads what is missing. Failures are collected into the
//! [`FetchReport`]: a failed catalog loses that day only, a failed download loses that
//! artifact only.
//!
//! # Examples
//!
//! ```ignore
//! use edinetkit::{ArtifactStore, DocTypeCode, Edinet, FetchOptions, Fetcher};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let edinet = Edinet::new("your-subscription-key")?;
//!     let fetcher = Fetcher::new(edinet, ArtifactStore::new("edinet_data"));
//!
//!     let options = FetchOptions::new()
//!         .with_doc_code(DocTypeCode::SECURITIES_REPORT)
//!         .require_security_code(true);
//!     let day = NaiveDate::from_ymd_opt(2020, 5, 1).unwrap();
//!     let report = fetcher.run(day, day, &options).await?;
//!
//!     println!("fetched {}, skipped {}, failed {}", report.fetched, report.skipped, report.failures.len());
//!     Ok(())
//! }
//! ```

use crate::catalog::{DocumentDescriptor, days_between};
use crate::documents::ContentType;
use crate::error::{EdinetError, Result};
use crate::options::FetchOptions;
use crate::store::{ArtifactRef, ArtifactStore};
use crate::traits::{CatalogOperations, DocumentOperations};
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A day or an artifact that could not be fetched.
#[derive(Debug)]
pub struct FetchFailure {
    pub date: NaiveDate,
    /// `None` when the whole day failed (catalog or snapshot).
    pub descriptor: Option<DocumentDescriptor>,
    pub content_type: Option<ContentType>,
    pub error: EdinetError,
}

/// Accounting of one fetch run. Counts are per artifact.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Days whose catalog was fetched and persisted.
    pub days_processed: usize,
    /// Artifacts downloaded and written.
    pub fetched: usize,
    /// Artifacts already present and left untouched.
    pub skipped: usize,
    /// Renditions the API does not have for a document.
    pub unavailable: usize,
    pub failures: Vec<FetchFailure>,
    /// The run stopped early on request.
    pub cancelled: bool,
}

impl FetchReport {
    /// True when every day was processed and nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Drives catalog and content retrieval for a date range.
#[derive(Debug)]
pub struct Fetcher<C> {
    client: C,
    store: ArtifactStore,
    cancel: Option<Arc<AtomicBool>>,
}

impl<C> Fetcher<C>
where
    C: CatalogOperations + DocumentOperations,
{
    pub fn new(client: C, store: ArtifactStore) -> Self {
        Self {
            client,
            store,
            cancel: None,
        }
    }

    /// Stops the run before the next day once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches every day of `from..=to`.
    ///
    /// # Errors
    ///
    /// Only `InvalidRange` aborts the run; everything else ends up in the report.
    pub async fn run(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        options: &FetchOptions,
    ) -> Result<FetchReport> {
        let days = days_between(from, to)?;
        let mut report = FetchReport::default();

        for date in days {
            if self.is_cancelled() {
                info!("fetch cancelled before {}", date);
                report.cancelled = true;
                break;
            }
            match self.fetch_day(date, options, &mut report).await {
                Ok(()) => report.days_processed += 1,
                Err(error) => {
                    warn!("Failed to fetch catalog for {}: {}", date, error);
                    report.failures.push(FetchFailure {
                        date,
                        descriptor: None,
                        content_type: None,
                        error,
                    });
                }
            }
        }

        info!(
            "fetch finished: {} days, {} fetched, {} skipped, {} unavailable, {} failed",
            report.days_processed,
            report.fetched,
            report.skipped,
            report.unavailable,
            report.failures.len()
        );
        Ok(report)
    }

    /// Fetches one day. Returns an error only for catalog or snapshot failures; document
    /// failures are recorded in `report`.
    pub async fn fetch_day(
        &self,
        date: NaiveDate,
        options: &FetchOptions,
        report: &mut FetchReport,
    ) -> Result<()> {
        let mut snapshot = self.client.document_list(date).await?;
        let listed = snapshot.count;
        snapshot.retain(|d| options.selects(d));
        info!(
            "{}: {} documents listed, {} selected",
            date, listed, snapshot.count
        );

        if !self.store.write_snapshot(&snapshot)? {
            debug!("{}: catalog snapshot unchanged", date);
        }

        for descriptor in &snapshot.results {
            self.fetch_document(date, descriptor, options, report).await;
        }
        Ok(())
    }

    /// Downloads the requested renditions of one document.
    pub async fn fetch_document(
        &self,
        date: NaiveDate,
        descriptor: &DocumentDescriptor,
        options: &FetchOptions,
        report: &mut FetchReport,
    ) {
        for content_type in &options.content_types {
            let artifact = ArtifactRef::new(date, descriptor.doc_id.as_str(), *content_type);
            if !options.overwrite && self.store.exists(&artifact) {
                debug!("{} already fetched", artifact.file_name());
                report.skipped += 1;
                continue;
            }

            let outcome = match self.client.document(&descriptor.doc_id, *content_type).await {
                Ok(bytes) if bytes.is_empty() => Err(EdinetError::EmptyBody),
                Ok(bytes) => self.store.write(&artifact, &bytes, options.overwrite),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(_) => report.fetched += 1,
                Err(EdinetError::NotFound) => {
                    info!(
                        "{} has no content of type {}, skipping",
                        descriptor.doc_id, content_type
                    );
                    report.unavailable += 1;
                }
                Err(EdinetError::AlreadyExists(_)) => report.skipped += 1,
                Err(error) => {
                    warn!(
                        "Failed to fetch a document (doc_id: {}, type: {}): {}",
                        descriptor.doc_id, content_type, error
                    );
                    report.failures.push(FetchFailure {
                        date,
                        descriptor: Some(descriptor.clone()),
                        content_type: Some(*content_type),
                        error,
                    });
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
