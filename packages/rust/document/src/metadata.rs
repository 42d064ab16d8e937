//! Book metadata extraction from the source document head.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use pagebinder_shared::BookMetadata;

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("head title"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("body h1"));
static HTML: LazyLock<Selector> = LazyLock::new(|| selector("html"));
static META: LazyLock<Selector> = LazyLock::new(|| selector("meta[content]"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Extract metadata from `html`, loaded from `url`.
///
/// `default_language` is used when the document declares none.
#[instrument(skip_all, fields(%url))]
pub fn extract_metadata(html: &str, url: &Url, default_language: &str) -> BookMetadata {
    let doc = Html::parse_document(html);
    let meta = MetaTags::collect(&doc);

    let title = meta
        .first(&["og:title", "twitter:title"])
        .or_else(|| first_text(&doc, &TITLE))
        .or_else(|| first_text(&doc, &H1))
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "Untitled".to_string());

    let mut authors: Vec<String> = Vec::new();
    for author in meta.all(&["author", "article:author", "dc.creator"]) {
        if !authors.iter().any(|a| a.eq_ignore_ascii_case(&author)) {
            authors.push(author);
        }
    }

    let language = doc
        .select(&HTML)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
        .or_else(|| meta.first(&["og:locale"]).map(|locale| locale.replace('_', "-")))
        .unwrap_or_else(|| default_language.to_string());

    let mut metadata = BookMetadata::new(title, language, url.clone());
    metadata.authors = authors;
    metadata.description = meta.first(&["description", "og:description"]);
    metadata.publisher = meta.first(&["og:site_name", "publisher"]);
    metadata.published = meta.first(&["article:published_time", "date", "dc.date"]);

    debug!(
        title = %metadata.title,
        authors = metadata.authors.len(),
        language = %metadata.language,
        "metadata extracted"
    );
    metadata
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|el| normalize(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `<meta>` tags keyed by lowercased `name` or `property`, in document order.
struct MetaTags {
    entries: Vec<(String, String)>,
}

impl MetaTags {
    fn collect(doc: &Html) -> Self {
        let entries = doc
            .select(&META)
            .filter_map(|el| {
                let el = el.value();
                let key = el.attr("name").or_else(|| el.attr("property"))?;
                let content = normalize(el.attr("content")?);
                (!content.is_empty()).then(|| (key.to_ascii_lowercase(), content))
            })
            .collect();
        Self { entries }
    }

    /// Value of the first key in `keys` that is present.
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.entries
                .iter()
                .find(|(k, _)| k.as_str() == *key)
                .map(|(_, v)| v.clone())
        })
    }

    fn all(&self, keys: &[&str]) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://blog.example.com/posts/rust").unwrap()
    }

    #[test]
    fn reads_open_graph_and_meta_tags() {
        let html = r#"<html lang="fr"><head>
            <title>Fallback</title>
            <meta property="og:title" content="  Learning   Rust ">
            <meta name="author" content="Ada Lovelace">
            <meta property="article:author" content="ada lovelace">
            <meta property="article:author" content="Grace Hopper">
            <meta name="description" content="A post.">
            <meta property="og:site_name" content="Example Blog">
            <meta property="article:published_time" content="2024-03-01T10:00:00Z">
        </head><body><h1>Heading</h1></body></html>"#;

        let meta = extract_metadata(html, &url(), "en");
        assert_eq!(meta.title, "Learning Rust");
        assert_eq!(meta.authors, vec!["Ada Lovelace", "Grace Hopper"]);
        assert_eq!(meta.language, "fr");
        assert_eq!(meta.description.as_deref(), Some("A post."));
        assert_eq!(meta.publisher.as_deref(), Some("Example Blog"));
        assert_eq!(meta.published.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(meta.source_url, url());
        assert!(meta.identifier.starts_with("urn:uuid:"));
    }

    #[test]
    fn title_falls_back_through_title_h1_and_host() {
        let with_title = "<html><head><title>Doc Title</title></head><body><h1>H</h1></body></html>";
        assert_eq!(extract_metadata(with_title, &url(), "en").title, "Doc Title");

        let with_h1 = "<html><body><h1>Only <em>Heading</em></h1></body></html>";
        assert_eq!(extract_metadata(with_h1, &url(), "en").title, "Only Heading");

        let bare = "<html><body><p>text</p></body></html>";
        assert_eq!(extract_metadata(bare, &url(), "en").title, "blog.example.com");
    }

    #[test]
    fn language_falls_back_to_locale_then_default() {
        let locale = r#"<html><head><meta property="og:locale" content="pt_BR"></head></html>"#;
        assert_eq!(extract_metadata(locale, &url(), "en").language, "pt-BR");

        let none = "<html><body></body></html>";
        assert_eq!(extract_metadata(none, &url(), "de").language, "de");
    }
}
