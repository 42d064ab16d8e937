//! Document cleaning passes.
//!
//! Each pass rewrites the full document through an [`xhtml`](crate::xhtml)
//! policy. [`clean_document`] chains them as a nested [`StageGraph`] so every
//! pass is reported like any other pipeline stage.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::{debug, instrument};

use pagebinder_graph::{GraphError, Stage, StageGraph, StageReporter};
use pagebinder_shared::CleanConfig;

use crate::xhtml::{self, NodePolicy};

/// Elements removed with their whole subtree.
const UNWANTED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "form", "input",
    "select", "textarea", "button", "nav", "footer", "aside", "dialog", "canvas", "link", "meta",
];

/// Attributes that survive [`remove_attributes`].
const ALLOWED_ATTRIBUTES: &[&str] = &[
    "href", "src", "alt", "title", "id", "lang", "dir", "colspan", "rowspan", "headers", "scope",
    "start", "reversed", "type", "cite", "datetime", "width", "height",
];

/// Elements kept even when they hold no text.
const ALWAYS_KEPT: &[&str] = &[
    "img", "picture", "video", "audio", "source", "track", "svg", "math", "br", "hr", "wbr", "col",
    "colgroup", "td", "th", "tr", "area",
];

static MEDIA: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img, picture, video, audio, svg, math, hr, br").expect("valid selector")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Extra tags and attributes on top of the built-in lists.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub remove_tags: Vec<String>,
    pub keep_attributes: Vec<String>,
}

impl From<&CleanConfig> for CleanOptions {
    fn from(config: &CleanConfig) -> Self {
        Self {
            remove_tags: config.remove_tags.clone(),
            keep_attributes: config.keep_attributes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

struct RemoveElements {
    tags: HashSet<String>,
}

impl NodePolicy for RemoveElements {
    fn keep_element(&self, element: ElementRef<'_>) -> bool {
        !self.tags.contains(element.value().name())
    }
}

/// Drop scripts, styles, navigation chrome, forms and configured extra tags.
pub fn remove_elements(html: &str, options: &CleanOptions) -> String {
    let tags = UNWANTED_ELEMENTS
        .iter()
        .map(|tag| tag.to_string())
        .chain(options.remove_tags.iter().map(|tag| tag.to_ascii_lowercase()))
        .collect();
    xhtml::serialize_document(html, &RemoveElements { tags })
}

struct RemoveHidden;

impl NodePolicy for RemoveHidden {
    fn keep_element(&self, element: ElementRef<'_>) -> bool {
        !is_hidden(element)
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    let el = element.value();
    if el.attr("hidden").is_some() {
        return true;
    }
    if el
        .attr("aria-hidden")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

/// Drop elements marked hidden by attribute or inline style.
pub fn remove_hidden_elements(html: &str) -> String {
    xhtml::serialize_document(html, &RemoveHidden)
}

struct RemoveComments;

impl NodePolicy for RemoveComments {
    fn keep_comments(&self) -> bool {
        false
    }
}

pub fn remove_comments(html: &str) -> String {
    xhtml::serialize_document(html, &RemoveComments)
}

struct RemoveEmpty;

impl NodePolicy for RemoveEmpty {
    fn keep_element(&self, element: ElementRef<'_>) -> bool {
        ALWAYS_KEPT.contains(&element.value().name())
            || element.text().any(|t| !t.trim().is_empty())
            || element.select(&MEDIA).next().is_some()
    }
}

/// Drop elements with neither text nor media inside.
pub fn remove_empty_elements(html: &str) -> String {
    xhtml::serialize_document(html, &RemoveEmpty)
}

struct RemoveDataAttributes;

impl NodePolicy for RemoveDataAttributes {
    fn attribute<'v>(&self, _element: &str, name: &str, value: &'v str) -> Option<Cow<'v, str>> {
        (!name.starts_with("data-")).then_some(Cow::Borrowed(value))
    }
}

pub fn remove_data_attributes(html: &str) -> String {
    xhtml::serialize_document(html, &RemoveDataAttributes)
}

struct KeepAttributes {
    allowed: HashSet<String>,
}

impl NodePolicy for KeepAttributes {
    fn attribute<'v>(&self, _element: &str, name: &str, value: &'v str) -> Option<Cow<'v, str>> {
        self.allowed
            .contains(name)
            .then_some(Cow::Borrowed(value))
    }
}

/// Drop every attribute outside the allow-list.
pub fn remove_attributes(html: &str, options: &CleanOptions) -> String {
    let allowed = ALLOWED_ATTRIBUTES
        .iter()
        .map(|name| name.to_string())
        .chain(options.keep_attributes.iter().map(|name| name.to_ascii_lowercase()))
        .collect();
    xhtml::serialize_document(html, &KeepAttributes { allowed })
}

/// Merge adjacent text nodes.
///
/// Serializing and re-parsing yields one text node per run of text.
pub fn merge_text_nodes(html: &str) -> String {
    xhtml::serialize_document(html, &xhtml::Identity)
}

struct CollapseWhitespace;

impl NodePolicy for CollapseWhitespace {
    fn text<'t>(&self, text: &'t str, preformatted: bool) -> Cow<'t, str> {
        if preformatted {
            Cow::Borrowed(text)
        } else {
            WHITESPACE_RE.replace_all(text, " ")
        }
    }
}

/// Collapse whitespace runs to one space outside preformatted elements.
pub fn remove_extra_whitespace(html: &str) -> String {
    xhtml::serialize_document(html, &CollapseWhitespace)
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

type Pass = fn(&str, &CleanOptions) -> String;

/// Cleaning passes in execution order.
const PASSES: &[(&str, Pass)] = &[
    ("Removing unwanted elements", remove_elements),
    ("Removing hidden elements", |html, _| remove_hidden_elements(html)),
    ("Removing comments", |html, _| remove_comments(html)),
    ("Removing empty elements", |html, _| remove_empty_elements(html)),
    ("Removing data attributes", |html, _| remove_data_attributes(html)),
    ("Removing attributes", remove_attributes),
    ("Merging text nodes", |html, _| merge_text_nodes(html)),
    ("Removing extra whitespace", |html, _| remove_extra_whitespace(html)),
];

/// Run every cleaning pass in order, each one as a stage of a nested graph.
#[instrument(skip_all, fields(len = html.len()))]
pub async fn clean_document(
    html: String,
    options: CleanOptions,
    reporter: Arc<dyn StageReporter>,
) -> Result<String, GraphError> {
    let options = Arc::new(options);
    let mut graph = StageGraph::with_reporter(reporter);

    let mut previous = graph.add_step(Stage::constant(html), &[])?;

    for &(description, pass) in PASSES {
        let options = options.clone();
        let stage = Stage::new(description, move |inputs| {
            Ok(pass(inputs.get::<String>(0)?, &options))
        });
        previous = graph.add_step(stage, &[previous.id()])?;
    }

    debug!(stages = graph.len(), "cleaning graph built");
    let cleaned = graph.process_as::<String>().await?;
    Ok(cleaned.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pagebinder_graph::{SilentReporter, StagePhase};

    use super::*;

    fn body(html: &str) -> &str {
        let start = html.find("<body>").map(|i| i + 6).unwrap_or(0);
        let end = html.rfind("</body>").unwrap_or(html.len());
        &html[start..end]
    }

    #[test]
    fn unwanted_and_configured_elements_are_removed() {
        let html = "<body><nav>menu</nav><p>text</p><script>x()</script><figure>f</figure></body>";
        let options = CleanOptions {
            remove_tags: vec!["FIGURE".into()],
            ..Default::default()
        };
        assert_eq!(body(&remove_elements(html, &options)), "<p>text</p>");
    }

    #[test]
    fn hidden_elements_are_removed() {
        let html = r#"<body><p hidden>a</p><p aria-hidden="true">b</p><p style="DISPLAY: none">c</p><p style="visibility:hidden">d</p><p aria-hidden="false">e</p></body>"#;
        assert_eq!(
            body(&remove_hidden_elements(html)),
            r#"<p aria-hidden="false">e</p>"#
        );
    }

    #[test]
    fn comments_are_removed_in_body_only() {
        let html = "<html><head><!-- keep --></head><body><p>a<!-- gone -->b</p></body></html>";
        let out = remove_comments(html);
        assert!(out.contains("<!-- keep -->"));
        assert_eq!(body(&out), "<p>ab</p>");
    }

    #[test]
    fn empty_elements_are_removed_but_media_stays() {
        let html = r#"<body><div> <span> </span></div><p><img src="a.png"></p><table><tr><td></td><td>x</td></tr></table></body>"#;
        let out = remove_empty_elements(html);
        assert_eq!(
            body(&out),
            r#"<p><img src="a.png"/></p><table><tbody><tr><td></td><td>x</td></tr></tbody></table>"#
        );
    }

    #[test]
    fn attributes_are_filtered() {
        let html = r#"<body><a href="/x" class="btn" data-track="1" onclick="go()">x</a></body>"#;
        let no_data = remove_data_attributes(html);
        assert!(!no_data.contains("data-track"));
        assert!(no_data.contains("class=\"btn\""));

        let options = CleanOptions {
            keep_attributes: vec!["class".into()],
            ..Default::default()
        };
        let kept = remove_attributes(html, &options);
        assert!(kept.contains(r#"href="/x""#));
        assert!(kept.contains(r#"class="btn""#));
        assert!(!kept.contains("onclick"));
        assert!(!kept.contains("data-track"));
    }

    #[test]
    fn whitespace_collapses_outside_pre() {
        let html = "<body><p>a   \n  b</p><pre>  keep\n   this </pre></body>";
        assert_eq!(
            body(&remove_extra_whitespace(html)),
            "<p>a b</p><pre>  keep\n   this </pre>"
        );
    }

    #[tokio::test]
    async fn clean_document_runs_every_pass_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter = Arc::new(move |description: Option<&str>, phase: StagePhase| {
            if phase == StagePhase::Started {
                sink.lock().unwrap().push(description.unwrap_or("-").to_string());
            }
        });

        let html = r#"<html><head><title>T</title></head><body>
            <nav>menu</nav>
            <div class="post" data-id="7"><!-- c --><p>Hello   <span hidden>x</span>world</p><div></div></div>
        </body></html>"#
            .to_string();

        let cleaned = clean_document(html, CleanOptions::default(), reporter)
            .await
            .unwrap();

        assert_eq!(body(&cleaned).trim(), "<div><p>Hello world</p></div>");
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 9);
        assert_eq!(events[0], "-");
        assert_eq!(events[1], "Removing unwanted elements");
        assert_eq!(events[8], "Removing extra whitespace");
    }

    #[tokio::test]
    async fn clean_document_keeps_head() {
        let html = "<html><head><title>Kept</title></head><body><p>x</p></body></html>".to_string();
        let cleaned = clean_document(html, CleanOptions::default(), Arc::new(SilentReporter))
            .await
            .unwrap();
        assert!(cleaned.contains("<title>Kept</title>"));
    }
}
