use crate::catalog::{DocTypeCode, DocumentDescriptor};
use crate::documents::ContentType;
use std::collections::BTreeSet;

/// Options controlling which documents and renditions a fetch run downloads.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Document type codes to keep; `None` keeps every type.
    pub doc_codes: Option<BTreeSet<DocTypeCode>>,
    /// Renditions to download for every kept document.
    pub content_types: BTreeSet<ContentType>,
    /// Drop filings whose filer has no security code.
    pub require_security_code: bool,
    /// Replace artifacts that already exist on disk.
    pub overwrite: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            doc_codes: None,
            content_types: BTreeSet::from([ContentType::Main]),
            require_security_code: false,
            overwrite: false,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc_code(mut self, code: DocTypeCode) -> Self {
        self.doc_codes = Some(BTreeSet::from([code]));
        self
    }

    pub fn with_doc_codes(mut self, codes: impl IntoIterator<Item = DocTypeCode>) -> Self {
        self.doc_codes = Some(codes.into_iter().collect());
        self
    }

    pub fn with_content_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
        self.content_types = types.into_iter().collect();
        self
    }

    /// Downloads all four renditions.
    pub fn with_full(self) -> Self {
        self.with_content_types(ContentType::ALL)
    }

    pub fn require_security_code(mut self, require: bool) -> Self {
        self.require_security_code = require;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Whether a catalog entry passes the document type and security code filters.
    pub fn selects(&self, descriptor: &DocumentDescriptor) -> bool {
        if let Some(codes) = &self.doc_codes {
            match descriptor.doc_type_code {
                Some(code) if codes.contains(&code) => {}
                _ => return false,
            }
        }
        !self.require_security_code || descriptor.has_security_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(code: Option<u16>, sec_code: Option<&str>) -> DocumentDescriptor {
        let mut d = DocumentDescriptor::new("S100AAAA");
        d.doc_type_code = code.map(DocTypeCode);
        d.sec_code = sec_code.map(str::to_string);
        d
    }

    #[test]
    fn default_keeps_everything() {
        let options = FetchOptions::new();
        assert!(options.selects(&descriptor(None, None)));
        assert_eq!(
            options.content_types.iter().copied().collect::<Vec<_>>(),
            vec![ContentType::Main]
        );
    }

    #[test]
    fn doc_code_filter() {
        let options = FetchOptions::new().with_doc_code(DocTypeCode::SECURITIES_REPORT);
        assert!(options.selects(&descriptor(Some(120), None)));
        assert!(!options.selects(&descriptor(Some(140), None)));
        assert!(!options.selects(&descriptor(None, None)));
    }

    #[test]
    fn security_code_filter() {
        let options = FetchOptions::new().require_security_code(true);
        assert!(options.selects(&descriptor(Some(120), Some("13010"))));
        assert!(!options.selects(&descriptor(Some(120), Some(" "))));
        assert!(!options.selects(&descriptor(Some(120), None)));
    }

    #[test]
    fn full_requests_all_types() {
        let options = FetchOptions::new().with_full();
        assert_eq!(options.content_types.len(), 4);
    }
}
