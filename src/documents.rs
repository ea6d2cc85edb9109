//! Document content retrieval.
//!
//! Every filing is served in up to four renditions, selected with the `type` query
//! parameter of `documents/{docID}`:
//!
//! | type | rendition                         | stored as |
//! |------|-----------------------------------|-----------|
//! | 1    | submission bundle (XBRL inside)   | `.zip`    |
//! | 2    | PDF                               | `.pdf`    |
//! | 3    | attachments                       | `.zip`    |
//! | 4    | English version                   | `.zip`    |
//!
//! A rendition that does not exist for a document comes back as `EdinetError::NotFound`.

use super::Edinet;
use super::core::Expect;
use super::error::{EdinetError, Result};
use super::traits::DocumentOperations;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContentType {
    /// Submission bundle containing the XBRL instance.
    Main = 1,
    Pdf = 2,
    Attachment = 3,
    English = 4,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Main,
        ContentType::Pdf,
        ContentType::Attachment,
        ContentType::English,
    ];

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// File extension used on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Main | ContentType::Attachment | ContentType::English => "zip",
        }
    }

    /// Whether a response `Content-Type` (lowercase, no spaces) carries this rendition.
    pub(crate) fn accepts_mime(&self, mime: &str) -> bool {
        match self {
            ContentType::Pdf => mime.starts_with("application/pdf"),
            _ => mime.starts_with("application/octet-stream") || mime.contains("zip"),
        }
    }
}

impl TryFrom<u8> for ContentType {
    type Error = EdinetError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ContentType::Main),
            2 => Ok(ContentType::Pdf),
            3 => Ok(ContentType::Attachment),
            4 => Ok(ContentType::English),
            other => Err(EdinetError::ConfigError(format!(
                "content type must be between 1 and 4, got {}",
                other
            ))),
        }
    }
}

impl From<ContentType> for u8 {
    fn from(value: ContentType) -> Self {
        value.as_u8()
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[async_trait]
impl DocumentOperations for Edinet {
    async fn document(&self, doc_id: &str, content_type: ContentType) -> Result<Vec<u8>> {
        let url = self.endpoint(
            &format!("documents/{}", doc_id),
            &[("type", content_type.as_u8().to_string())],
        )?;
        tracing::info!("fetching document (doc_id: {}, type: {})", doc_id, content_type);
        self.fetch(&url, Expect::Document(content_type)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_follow_rendition() {
        assert_eq!(ContentType::Main.extension(), "zip");
        assert_eq!(ContentType::Pdf.extension(), "pdf");
        assert_eq!(ContentType::English.extension(), "zip");
    }

    #[test]
    fn rejects_out_of_range_codes() {
        assert!(ContentType::try_from(0).is_err());
        assert!(ContentType::try_from(5).is_err());
        assert_eq!(ContentType::try_from(3).unwrap(), ContentType::Attachment);
    }

    #[test]
    fn mime_checks() {
        assert!(ContentType::Pdf.accepts_mime("application/pdf"));
        assert!(!ContentType::Pdf.accepts_mime("application/octet-stream"));
        assert!(ContentType::Main.accepts_mime("application/octet-stream"));
        assert!(ContentType::Attachment.accepts_mime("application/zip"));
    }
}
