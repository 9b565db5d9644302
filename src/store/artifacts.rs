use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::errors::{PipelineError, Result};

/// Fixed registry of artifact kinds. Each kind maps to exactly one file name
/// under the URL's directory and one row in `artifact_types`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    RawHtml,
    Generic,
    Wordcount,
    Metadata,
    Keywords,
    Links,
    Images,
    Academic,
    Docs,
    Wiki,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 10] = [
        ArtifactKind::RawHtml,
        ArtifactKind::Generic,
        ArtifactKind::Wordcount,
        ArtifactKind::Metadata,
        ArtifactKind::Keywords,
        ArtifactKind::Links,
        ArtifactKind::Images,
        ArtifactKind::Academic,
        ArtifactKind::Docs,
        ArtifactKind::Wiki,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::RawHtml => "raw.html",
            ArtifactKind::Generic => "generic.yaml",
            ArtifactKind::Wordcount => "wordcount.txt",
            ArtifactKind::Metadata => "metadata.yaml",
            ArtifactKind::Keywords => "keywords.yaml",
            ArtifactKind::Links => "links.yaml",
            ArtifactKind::Images => "images.yaml",
            ArtifactKind::Academic => "academic.yaml",
            ArtifactKind::Docs => "docs.yaml",
            ArtifactKind::Wiki => "wiki.yaml",
        }
    }

    /// Registry name used in the `artifact_types` table.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArtifactKind::RawHtml => "html_raw",
            ArtifactKind::Generic => "yaml_parsed",
            ArtifactKind::Wordcount => "wordcount",
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Keywords => "keywords",
            ArtifactKind::Links => "links",
            ArtifactKind::Images => "images",
            ArtifactKind::Academic => "academic",
            ArtifactKind::Docs => "docs",
            ArtifactKind::Wiki => "wiki",
        }
    }

    /// Stable registry id, seeded at schema init.
    pub fn type_id(&self) -> i64 {
        match self {
            ArtifactKind::RawHtml => 1,
            ArtifactKind::Generic => 2,
            ArtifactKind::Wordcount => 3,
            ArtifactKind::Metadata => 4,
            ArtifactKind::Keywords => 5,
            ArtifactKind::Links => 6,
            ArtifactKind::Images => 7,
            ArtifactKind::Academic => 8,
            ArtifactKind::Docs => 9,
            ArtifactKind::Wiki => 10,
        }
    }
}

/// What a completed write reports back for index registration.
#[derive(Clone, Debug)]
pub struct StoredArtifact {
    pub kind: ArtifactKind,
    pub file_path: PathBuf,
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Content-addressed on-disk layout: one directory per URL id, fixed file
/// names per artifact kind. Files are partitioned by url_id, so concurrent
/// writers never collide as long as each URL is owned by one worker.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    base: PathBuf,
}

impl ArtifactStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn url_dir(&self, url_id: i64) -> PathBuf {
        self.base.join(url_id.to_string())
    }

    pub fn path(&self, url_id: i64, kind: ArtifactKind) -> PathBuf {
        self.url_dir(url_id).join(kind.file_name())
    }

    /// Read an artifact if it exists. The second tuple element reports
    /// freshness: mtime within `max_age`. A zero `max_age` is never fresh.
    pub fn read(
        &self,
        url_id: i64,
        kind: ArtifactKind,
        max_age: Duration,
    ) -> Result<Option<(Vec<u8>, bool)>> {
        let path = self.path(url_id, kind);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| PipelineError::CacheRead {
            url_id,
            message: format!("{}: {}", path.display(), e),
        })?;
        let fresh = self.is_fresh(&path, max_age);
        Ok(Some((bytes, fresh)))
    }

    pub fn is_fresh(&self, path: &Path, max_age: Duration) -> bool {
        if max_age.is_zero() {
            return false;
        }
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age <= max_age,
            // Clock skew puts the file in the future; treat as fresh.
            Err(_) => true,
        }
    }

    /// Atomic write: temp file in the target directory, then rename. The URL
    /// directory is created lazily. Returns hash + size for the index.
    pub fn write(&self, url_id: i64, kind: ArtifactKind, bytes: &[u8]) -> Result<StoredArtifact> {
        let dir = self.url_dir(url_id);
        fs::create_dir_all(&dir)?;

        let path = dir.join(kind.file_name());
        let tmp = dir.join(format!(".{}.tmp", kind.file_name()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        let content_hash = sha256_hex(bytes);
        debug!(
            "wrote artifact {} for url {} ({} bytes)",
            kind.type_name(),
            url_id,
            bytes.len()
        );

        Ok(StoredArtifact {
            kind,
            file_path: path,
            content_hash,
            size_bytes: bytes.len() as u64,
        })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
