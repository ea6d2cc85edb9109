//! On-disk artifact store.
//!
//! The store is index-free: the directory tree *is* the state. Layout:
//!
//! ```text
//! {root}/
//!   2020-05-01/
//!     doc_list.json               catalog snapshot of the day
//!     S100IKZ5/
//!       S100IKZ5_1.zip            submission bundle
//!       S100IKZ5_2.pdf            PDF rendition
//! ```
//!
//! A file at its final path is complete. Every write goes to a hidden temporary file in the
//! same directory and is renamed into place, so an interrupted run leaves at most a stray
//! `.tmp` file behind, never a truncated artifact.

use super::catalog::CatalogSnapshot;
use super::documents::ContentType;
use super::error::{EdinetError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the per-day catalog snapshot.
pub const SNAPSHOT_FILE: &str = "doc_list.json";

/// One artifact of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub date: NaiveDate,
    pub doc_id: String,
    pub content_type: ContentType,
}

impl ArtifactRef {
    pub fn new(date: NaiveDate, doc_id: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            date,
            doc_id: doc_id.into(),
            content_type,
        }
    }

    /// `{doc_id}_{type}.{ext}`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.doc_id,
            self.content_type.as_u8(),
            self.content_type.extension()
        )
    }
}

/// Artifacts present on disk for one document.
#[derive(Debug, Clone, Default)]
pub struct DocumentArtifacts {
    pub doc_id: String,
    pub paths: BTreeMap<ContentType, PathBuf>,
}

impl DocumentArtifacts {
    pub fn get(&self, content_type: ContentType) -> Option<&Path> {
        self.paths.get(&content_type).map(PathBuf::as_path)
    }

    /// The submission bundle, if it was fetched.
    pub fn primary(&self) -> Option<&Path> {
        self.get(ContentType::Main)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens an existing store, failing with `InvalidDirectory` if `root` is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EdinetError::InvalidDirectory(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    pub fn document_dir(&self, date: NaiveDate, doc_id: &str) -> PathBuf {
        self.day_dir(date).join(doc_id)
    }

    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.document_dir(artifact.date, &artifact.doc_id)
            .join(artifact.file_name())
    }

    /// Ids that cannot name a directory under the root never exist.
    pub fn exists(&self, artifact: &ArtifactRef) -> bool {
        validate_doc_id(&artifact.doc_id).is_ok() && self.path_for(artifact).is_file()
    }

    /// Writes an artifact.
    ///
    /// Fails with `AlreadyExists` when the artifact is present and `overwrite` is false;
    /// otherwise the file is replaced atomically.
    pub fn write(&self, artifact: &ArtifactRef, bytes: &[u8], overwrite: bool) -> Result<PathBuf> {
        validate_doc_id(&artifact.doc_id)?;
        let path = self.path_for(artifact);
        if !overwrite && path.is_file() {
            return Err(EdinetError::AlreadyExists(path));
        }
        write_atomic(&path, bytes)?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Lists the artifacts of a document that exist on disk.
    pub fn artifacts(&self, date: NaiveDate, doc_id: &str) -> Result<DocumentArtifacts> {
        validate_doc_id(doc_id)?;
        let paths = ContentType::ALL
            .iter()
            .map(|ct| ArtifactRef::new(date, doc_id, *ct))
            .filter(|artifact| self.exists(artifact))
            .map(|artifact| {
                let path = self.path_for(&artifact);
                (artifact.content_type, path)
            })
            .collect();
        Ok(DocumentArtifacts {
            doc_id: doc_id.to_string(),
            paths,
        })
    }

    pub fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.day_dir(date).join(SNAPSHOT_FILE)
    }

    pub fn has_snapshot(&self, date: NaiveDate) -> bool {
        self.snapshot_path(date).is_file()
    }

    /// Reads the catalog snapshot of a day, `MissingSnapshot` if the day was never fetched.
    pub fn read_snapshot(&self, date: NaiveDate) -> Result<CatalogSnapshot> {
        let path = self.snapshot_path(date);
        if !path.is_file() {
            return Err(EdinetError::MissingSnapshot(date));
        }
        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Replaces the catalog snapshot of a day wholesale.
    ///
    /// Returns `false` without touching the file when its content would not change.
    pub fn write_snapshot(&self, snapshot: &CatalogSnapshot) -> Result<bool> {
        let path = self.snapshot_path(snapshot.date);
        let mut content = serde_json::to_vec_pretty(snapshot)?;
        content.push(b'\n');

        if path.is_file() && fs::read(&path)? == content {
            return Ok(false);
        }
        write_atomic(&path, &content)?;
        Ok(true)
    }
}

/// Writes to `.{name}.tmp` next to `path`, then renames over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EdinetError::InvalidDirectory(path.to_path_buf()))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EdinetError::InvalidDirectory(path.to_path_buf()))?;
    let tmp_path = parent.join(format!(".{}.tmp", file_name));

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Document ids become path components, so only plain alphanumerics are accepted.
fn validate_doc_id(doc_id: &str) -> Result<()> {
    if doc_id.is_empty() || !doc_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EdinetError::InvalidResponse(format!(
            "invalid document id: {:?}",
            doc_id
        )));
    }
    Ok(())
}
