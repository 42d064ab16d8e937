//! Main content selection.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::xhtml;

/// Content containers in priority order.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "#content",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-body",
    "#main",
];

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("valid selector"));

/// Extract the main content of a document as an XHTML fragment.
///
/// Picks the first non-empty container from the priority list and falls
/// back to the whole `<body>`.
pub fn extract_main_content(html: &str) -> String {
    let doc = Html::parse_document(html);

    for css in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).find(|el| has_content(*el)) {
            debug!(selector = css, "main content container found");
            return xhtml::inner_xhtml(el, &xhtml::Identity);
        }
    }

    debug!("no content container, using body");
    doc.select(&BODY)
        .next()
        .map(|body| xhtml::inner_xhtml(body, &xhtml::Identity))
        .unwrap_or_default()
}

fn has_content(el: ElementRef<'_>) -> bool {
    el.text().any(|t| !t.trim().is_empty()) || el.select(&IMG).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_over_main() {
        let html = "<html><body><main><article><p>story</p></article><p>extra</p></main></body></html>";
        assert_eq!(extract_main_content(html), "<p>story</p>");
    }

    #[test]
    fn skips_empty_containers() {
        let html = r#"<html><body><article> </article><div id="content"><p>real</p></div></body></html>"#;
        assert_eq!(extract_main_content(html), "<p>real</p>");
    }

    #[test]
    fn image_only_container_counts_as_content() {
        let html = r#"<html><body><main><img src="a.png"></main><p>other</p></body></html>"#;
        assert_eq!(extract_main_content(html), r#"<img src="a.png"/>"#);
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><h1>T</h1><p>text</p></body></html>";
        assert_eq!(extract_main_content(html), "<h1>T</h1><p>text</p>");
    }
}
