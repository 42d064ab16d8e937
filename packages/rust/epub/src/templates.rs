//! XML documents of the EPUB container.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use pagebinder_document::{escape_attribute as attr, escape_text as text};
use pagebinder_shared::{BookMetadata, ChapterDocument, ImageAsset};

pub const MIMETYPE: &str = "application/epub+zip";

/// Package document path, relative to the container root.
pub const PACKAGE_PATH: &str = "OEBPS/content.opf";

pub fn container_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{PACKAGE_PATH}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    )
}

/// A chapter content document; `body` must already be XHTML.
pub fn chapter_xhtml(chapter: &ChapterDocument, language: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#,
        lang = attr(language),
        title = text(&chapter.title),
        body = chapter.body,
    )
}

pub fn nav_xhtml(metadata: &BookMetadata, chapters: &[ChapterDocument]) -> String {
    let mut items = String::new();
    for chapter in chapters {
        let _ = writeln!(
            items,
            r#"      <li><a href="{}">{}</a></li>"#,
            attr(&chapter.file_name),
            text(&chapter.title)
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
        lang = attr(&metadata.language),
        title = text(&metadata.title),
    )
}

/// EPUB 2 table of contents, kept for older reading systems.
pub fn toc_ncx(metadata: &BookMetadata, chapters: &[ChapterDocument]) -> String {
    let mut points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let _ = write!(
            points,
            r#"    <navPoint id="nav-{id}" playOrder="{order}">
      <navLabel><text>{title}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            id = attr(&chapter.id),
            order = i + 1,
            title = text(&chapter.title),
            src = attr(&chapter.file_name),
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{uid}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
        uid = attr(&metadata.identifier),
        title = text(&metadata.title),
    )
}

/// The OPF package document: metadata, manifest and reading order.
pub fn content_opf(
    metadata: &BookMetadata,
    chapters: &[ChapterDocument],
    images: &[&ImageAsset],
    modified: DateTime<Utc>,
) -> String {
    let mut dc = String::new();
    let _ = writeln!(dc, r#"    <dc:identifier id="book-id">{}</dc:identifier>"#, text(&metadata.identifier));
    let _ = writeln!(dc, "    <dc:title>{}</dc:title>", text(&metadata.title));
    let _ = writeln!(dc, "    <dc:language>{}</dc:language>", text(&metadata.language));
    for author in &metadata.authors {
        let _ = writeln!(dc, "    <dc:creator>{}</dc:creator>", text(author));
    }
    if let Some(description) = &metadata.description {
        let _ = writeln!(dc, "    <dc:description>{}</dc:description>", text(description));
    }
    if let Some(publisher) = &metadata.publisher {
        let _ = writeln!(dc, "    <dc:publisher>{}</dc:publisher>", text(publisher));
    }
    if let Some(published) = &metadata.published {
        let _ = writeln!(dc, "    <dc:date>{}</dc:date>", text(published));
    }
    let _ = writeln!(dc, "    <dc:source>{}</dc:source>", text(metadata.source_url.as_str()));
    let _ = writeln!(
        dc,
        r#"    <meta property="dcterms:modified">{}</meta>"#,
        modified.format("%Y-%m-%dT%H:%M:%SZ")
    );

    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    let mut spine = String::new();
    for chapter in chapters {
        let _ = writeln!(
            manifest,
            r#"    <item id="{}" href="{}" media-type="application/xhtml+xml"/>"#,
            attr(&chapter.id),
            attr(&chapter.file_name)
        );
        let _ = writeln!(spine, r#"    <itemref idref="{}"/>"#, attr(&chapter.id));
    }
    for (i, image) in images.iter().enumerate() {
        let _ = writeln!(
            manifest,
            r#"    <item id="image-{:03}" href="{}" media-type="{}"/>"#,
            i + 1,
            attr(&image.href),
            attr(&image.media_type)
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id" xml:lang="{lang}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{dc}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        lang = attr(&metadata.language),
    )
}
