//! Structural checks for a written EPUB container directory.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

use pagebinder_shared::{PagebinderError, Result};

use crate::templates::MIMETYPE;

static ROOTFILE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("rootfile[full-path]").expect("valid selector"));
static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("item").expect("valid selector"));
static ITEMREF: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("itemref").expect("valid selector"));

/// What [`validate_book`] found in a valid container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookCheck {
    pub package_path: String,
    pub manifest_items: usize,
    pub spine_items: usize,
}

/// Verify that a book directory is a well-formed EPUB container.
///
/// Checks the `mimetype` file, `META-INF/container.xml`, the package
/// document, that every manifest item exists on disk, and that the spine
/// only references manifest items.
pub fn validate_book(book_dir: &Path) -> Result<BookCheck> {
    let mimetype_path = book_dir.join("mimetype");
    if !mimetype_path.exists() {
        return Err(PagebinderError::validation("missing mimetype"));
    }
    let mimetype = std::fs::read_to_string(&mimetype_path)
        .map_err(|e| PagebinderError::io(&mimetype_path, e))?;
    if mimetype != MIMETYPE {
        return Err(PagebinderError::validation(format!(
            "mimetype must be {MIMETYPE}, found {mimetype:?}"
        )));
    }

    let container_path = book_dir.join("META-INF/container.xml");
    if !container_path.exists() {
        return Err(PagebinderError::validation("missing META-INF/container.xml"));
    }
    let container = std::fs::read_to_string(&container_path)
        .map_err(|e| PagebinderError::io(&container_path, e))?;
    let package_path = Html::parse_document(&container)
        .select(&ROOTFILE)
        .next()
        .and_then(|el| el.value().attr("full-path"))
        .map(str::to_string)
        .ok_or_else(|| PagebinderError::parse("container.xml has no rootfile"))?;

    let opf_path = book_dir.join(&package_path);
    if !opf_path.exists() {
        return Err(PagebinderError::validation(format!(
            "missing package document {package_path}"
        )));
    }
    let opf = std::fs::read_to_string(&opf_path).map_err(|e| PagebinderError::io(&opf_path, e))?;
    let package_dir = opf_path.parent().unwrap_or(book_dir);
    let doc = Html::parse_document(&opf);

    let mut ids = HashSet::new();
    let mut manifest_items = 0;
    for item in doc.select(&ITEM) {
        let el = item.value();
        let (Some(id), Some(href)) = (el.attr("id"), el.attr("href")) else {
            return Err(PagebinderError::parse("manifest item without id or href"));
        };
        if !package_dir.join(href).exists() {
            return Err(PagebinderError::validation(format!(
                "manifest item {id} points to missing file {href}"
            )));
        }
        ids.insert(id.to_string());
        manifest_items += 1;
    }

    let mut spine_items = 0;
    for itemref in doc.select(&ITEMREF) {
        let idref = itemref.value().attr("idref").unwrap_or_default();
        if !ids.contains(idref) {
            return Err(PagebinderError::validation(format!(
                "spine references unknown item {idref:?}"
            )));
        }
        spine_items += 1;
    }
    if spine_items == 0 {
        return Err(PagebinderError::validation("spine is empty"));
    }

    debug!(manifest_items, spine_items, "book validated");
    Ok(BookCheck {
        package_path,
        manifest_items,
        spine_items,
    })
}
