//! EPUB container writer.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use pagebinder_document::xhtml::{self, NodePolicy};
use pagebinder_shared::{
    BookMetadata, BookResult, ChapterDocument, ImageAssets, PagebinderError, Result,
};

use crate::templates;

static WITH_ID: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[id]").expect("valid selector"));

/// Write the book as an EPUB container directory under `output_root`.
///
/// ```text
/// <output_root>/<slug>/
/// ├── mimetype
/// ├── META-INF/container.xml
/// └── OEBPS/
///     ├── content.opf
///     ├── nav.xhtml
///     ├── toc.ncx
///     ├── text/chapter-001.xhtml
///     └── images/<hash>.<ext>
/// ```
///
/// Rewriting an existing book replaces its `OEBPS` directory.
#[instrument(skip_all, fields(title = %metadata.title, chapters = chapters.len()))]
pub fn write_book(
    output_root: &Path,
    metadata: &BookMetadata,
    chapters: &[ChapterDocument],
    images: &ImageAssets,
) -> Result<BookResult> {
    if chapters.is_empty() {
        return Err(PagebinderError::Packaging("book has no chapters".into()));
    }

    let book_dir = output_root.join(slugify(&metadata.title));
    info!(path = %book_dir.display(), "writing book");

    let oebps = book_dir.join("OEBPS");
    if oebps.exists() {
        std::fs::remove_dir_all(&oebps).map_err(|e| PagebinderError::io(&oebps, e))?;
        debug!(path = %oebps.display(), "removed previous package");
    }
    for dir in [
        book_dir.join("META-INF"),
        oebps.join("text"),
        oebps.join("images"),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| PagebinderError::io(&dir, e))?;
    }

    write_atomic(&book_dir.join("mimetype"), templates::MIMETYPE.as_bytes())?;
    write_atomic(
        &book_dir.join("META-INF/container.xml"),
        templates::container_xml().as_bytes(),
    )?;

    let anchors = anchor_index(chapters);
    let mut packaged = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let policy = ContentPolicy {
            images,
            source_url: &metadata.source_url,
            anchors: &anchors,
            chapter: chapter_file(chapter),
        };
        let chapter = ChapterDocument {
            body: xhtml::serialize_fragment(&chapter.body, &policy),
            ..chapter.clone()
        };
        write_atomic(
            &oebps.join(&chapter.file_name),
            templates::chapter_xhtml(&chapter, &metadata.language).as_bytes(),
        )?;
        packaged.push(chapter);
    }

    let mut assets = images.unique();
    assets.sort_by(|a, b| a.href.cmp(&b.href));
    for asset in &assets {
        write_atomic(&oebps.join(&asset.href), &asset.bytes)?;
    }

    let created_at = Utc::now();
    write_atomic(
        &oebps.join("content.opf"),
        templates::content_opf(metadata, &packaged, &assets, created_at).as_bytes(),
    )?;
    write_atomic(
        &oebps.join("nav.xhtml"),
        templates::nav_xhtml(metadata, &packaged).as_bytes(),
    )?;
    write_atomic(
        &oebps.join("toc.ncx"),
        templates::toc_ncx(metadata, &packaged).as_bytes(),
    )?;

    info!(
        chapter_count = packaged.len(),
        image_count = assets.len(),
        path = %book_dir.display(),
        "book written"
    );

    Ok(BookResult {
        path: book_dir,
        identifier: metadata.identifier.clone(),
        title: metadata.title.clone(),
        chapter_count: packaged.len(),
        image_count: assets.len(),
        created_at,
    })
}

/// Directory name for a book title: lowercase ASCII words joined by `-`.
pub fn slugify(title: &str) -> String {
    let slug = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    let slug: String = slug.chars().take(80).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "book".to_string()
    } else {
        slug.to_string()
    }
}

/// Write through a temp file and rename so readers never see partial files.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp: PathBuf = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| PagebinderError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PagebinderError::io(path, e))?;
    debug!(path = %path.display(), size = bytes.len(), "wrote file");
    Ok(())
}

/// Chapter file (relative to `text/`) holding each element `id`; the first chapter wins.
fn anchor_index(chapters: &[ChapterDocument]) -> HashMap<String, String> {
    let mut anchors = HashMap::new();
    for chapter in chapters {
        let fragment = Html::parse_fragment(&chapter.body);
        for el in fragment.select(&WITH_ID) {
            if let Some(id) = el.value().attr("id") {
                anchors
                    .entry(id.to_string())
                    .or_insert_with(|| chapter_file(chapter).to_string());
            }
        }
    }
    anchors
}

fn chapter_file(chapter: &ChapterDocument) -> &str {
    chapter
        .file_name
        .rsplit_once('/')
        .map_or(chapter.file_name.as_str(), |(_, name)| name)
}

/// Points images at packaged assets, fragment links at the chapter holding
/// their target, and other links at the source site.
struct ContentPolicy<'a> {
    images: &'a ImageAssets,
    source_url: &'a Url,
    anchors: &'a HashMap<String, String>,
    chapter: &'a str,
}

impl NodePolicy for ContentPolicy<'_> {
    fn keep_element(&self, element: ElementRef<'_>) -> bool {
        let el = element.value();
        if el.name() != "img" {
            return true;
        }
        el.attr("src")
            .is_some_and(|src| self.images.get(src.trim()).is_some())
    }

    fn attribute<'v>(&self, element: &str, name: &str, value: &'v str) -> Option<Cow<'v, str>> {
        match (element, name) {
            ("img", "src") => self
                .images
                .get(value.trim())
                .map(|asset| Cow::Owned(format!("../{}", asset.href))),
            ("a", "href") if value.starts_with('#') => Some(
                self.anchors
                    .get(&value[1..])
                    .filter(|file| file.as_str() != self.chapter)
                    .map(|file| Cow::Owned(format!("{file}{value}")))
                    .unwrap_or(Cow::Borrowed(value)),
            ),
            ("a", "href") => Some(
                self.source_url
                    .join(value.trim())
                    .map(|url| Cow::Owned(url.to_string()))
                    .unwrap_or(Cow::Borrowed(value)),
            ),
            _ => Some(Cow::Borrowed(value)),
        }
    }
}
