//! Trait definitions organizing EDINET operations by endpoint.
//!
//! The [`Edinet`](crate::Edinet) client implements both traits against the live API. The
//! fetch pipeline and the checker only depend on the traits, so tests and offline tools can
//! substitute an in-memory source that serves canned catalogs and bundles.

use super::catalog::{CatalogPage, CatalogSnapshot};
use super::documents::ContentType;
use super::error::{EdinetError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Operations on the daily document listing endpoint.
#[async_trait]
pub trait CatalogOperations: Send + Sync {
    /// Retrieves one page of the catalog for `date`, starting at `offset` descriptors in.
    async fn document_list_page(&self, date: NaiveDate, offset: usize) -> Result<CatalogPage>;

    /// Retrieves the complete catalog for `date`.
    ///
    /// Pages are requested until the number of distinct descriptors reaches the total the
    /// endpoint reports. Descriptors are appended in the order they arrive and a document id
    /// seen on an earlier page is never added twice. A page that adds nothing new while the
    /// listing is still short fails with `InvalidResponse` instead of looping.
    async fn document_list(&self, date: NaiveDate) -> Result<CatalogSnapshot> {
        let mut results = Vec::new();
        let mut seen = HashSet::new();

        loop {
            let page = self.document_list_page(date, results.len()).await?;
            let before = results.len();
            for descriptor in page.results {
                if seen.insert(descriptor.doc_id.clone()) {
                    results.push(descriptor);
                }
            }

            if results.len() >= page.total {
                break;
            }
            if results.len() == before {
                return Err(EdinetError::InvalidResponse(format!(
                    "catalog for {} stopped at {} of {} documents",
                    date,
                    results.len(),
                    page.total
                )));
            }
            tracing::debug!(
                "catalog for {} has {}/{} documents, requesting next page",
                date,
                results.len(),
                page.total
            );
        }

        Ok(CatalogSnapshot::new(date, results))
    }
}

/// Operations on the document content endpoint.
#[async_trait]
pub trait DocumentOperations: Send + Sync {
    /// Retrieves the raw bytes of one content type of a document.
    ///
    /// Returns `EdinetError::NotFound` when the document has no rendition of that type.
    async fn document(&self, doc_id: &str, content_type: ContentType) -> Result<Vec<u8>>;
}
