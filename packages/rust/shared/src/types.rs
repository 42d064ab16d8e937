//! Domain types passed between conversion stages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The raw document a conversion starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Full HTML text as loaded.
    pub html: String,
    /// Where it was loaded from (`https://…` or `file://…`).
    pub url: Url,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Book-level metadata extracted from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// BCP 47 language tag.
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Publication date exactly as the document declares it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub source_url: Url,
    /// `urn:uuid:` identifier, unique per conversion.
    pub identifier: String,
}

impl BookMetadata {
    /// Metadata with only the required fields set and a fresh identifier.
    pub fn new(title: impl Into<String>, language: impl Into<String>, source_url: Url) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            language: language.into(),
            description: None,
            publisher: None,
            published: None,
            source_url,
            identifier: new_identifier(),
        }
    }
}

/// Generate a time-sortable `urn:uuid:` book identifier.
pub fn new_identifier() -> String {
    format!("urn:uuid:{}", Uuid::now_v7())
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

/// A titled slice of the main content, as an XHTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub html: String,
}

/// A chapter ready to be packaged as its own content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    /// Manifest id, e.g. `chapter-001`.
    pub id: String,
    /// Path relative to the package directory, e.g. `text/chapter-001.xhtml`.
    pub file_name: String,
    pub title: String,
    /// XHTML fragment placed inside `<body>`.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// One downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Path relative to the package directory, e.g. `images/3fa2c1d09b7e4a51.png`.
    pub href: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Loaded images keyed by the `src` attribute value found in the content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAssets {
    pub by_source: BTreeMap<String, ImageAsset>,
}

impl ImageAssets {
    pub fn get(&self, src: &str) -> Option<&ImageAsset> {
        self.by_source.get(src)
    }

    pub fn insert(&mut self, src: impl Into<String>, asset: ImageAsset) {
        self.by_source.insert(src.into(), asset);
    }

    /// Distinct assets; several sources may resolve to the same file.
    pub fn unique(&self) -> Vec<&ImageAsset> {
        let mut seen = BTreeMap::new();
        for asset in self.by_source.values() {
            seen.entry(asset.href.as_str()).or_insert(asset);
        }
        seen.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Summary of a written book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookResult {
    /// The book directory.
    pub path: PathBuf,
    pub identifier: String,
    pub title: String,
    pub chapter_count: usize,
    pub image_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(href: &str) -> ImageAsset {
        ImageAsset {
            href: href.into(),
            media_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn identifiers_are_urn_uuids() {
        let a = new_identifier();
        let b = new_identifier();
        assert!(a.starts_with("urn:uuid:"));
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_serializes_without_empty_optionals() {
        let url = Url::parse("https://example.com/post").unwrap();
        let meta = BookMetadata::new("Post", "en", url);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("publisher"));
        let parsed: BookMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn unique_assets_collapse_shared_files() {
        let mut assets = ImageAssets::default();
        assets.insert("a.png", asset("images/aa.png"));
        assets.insert("./a.png", asset("images/aa.png"));
        assets.insert("b.png", asset("images/bb.png"));

        assert_eq!(assets.len(), 3);
        assert_eq!(assets.unique().len(), 2);
        assert!(assets.get("./a.png").is_some());
    }
}
