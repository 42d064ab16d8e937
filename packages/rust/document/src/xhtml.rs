//! Policy-driven XHTML serialization of parsed HTML.
//!
//! `scraper` trees are read-only, so every transformation in this crate is a
//! [`NodePolicy`] applied while writing the tree back out. The output is
//! well-formed XML: escaped text and attribute values, self-closed void
//! elements, and only attribute names that are valid XML names.

use std::borrow::Cow;

use scraper::{ElementRef, Html, Node};

/// Elements that never have content and are written as `<name/>`.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is preformatted and must not be reflowed.
const PREFORMATTED: &[&str] = &["pre", "code", "textarea", "script", "style"];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Decides what the writer keeps and how it is rewritten.
///
/// Policies apply to nodes inside `<body>` (or to every node of a fragment).
/// Everything else is copied unchanged.
pub trait NodePolicy {
    /// `false` drops the element together with its subtree.
    fn keep_element(&self, _element: ElementRef<'_>) -> bool {
        true
    }

    /// `true` drops the element's own tags but keeps its children.
    fn unwrap_element(&self, _element: ElementRef<'_>) -> bool {
        false
    }

    /// Replacement tag name.
    fn element_name<'a>(&self, element: ElementRef<'a>) -> Cow<'a, str> {
        Cow::Borrowed(element.value().name())
    }

    /// Attribute value to write, or `None` to drop the attribute.
    fn attribute<'v>(&self, _element: &str, _name: &str, value: &'v str) -> Option<Cow<'v, str>> {
        Some(Cow::Borrowed(value))
    }

    fn keep_comments(&self) -> bool {
        true
    }

    /// Text content to write; `preformatted` is set inside `pre`, `code` and friends.
    fn text<'t>(&self, text: &'t str, _preformatted: bool) -> Cow<'t, str> {
        Cow::Borrowed(text)
    }
}

/// Writes the tree back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl NodePolicy for Identity {}

/// Serialize a whole document, applying `policy` inside `<body>`.
pub fn serialize_document(html: &str, policy: &dyn NodePolicy) -> String {
    let document = Html::parse_document(html);
    let mut writer = Writer::new(policy, false);
    writer.out.push_str("<!DOCTYPE html>\n");
    writer.element(document.root_element(), 0);
    writer.out
}

/// Serialize an HTML fragment, applying `policy` to every node.
pub fn serialize_fragment(html: &str, policy: &dyn NodePolicy) -> String {
    let fragment = Html::parse_fragment(html);
    inner_xhtml(fragment.root_element(), policy)
}

/// Serialize the children of `element`, applying `policy` to all of them.
pub fn inner_xhtml(element: ElementRef<'_>, policy: &dyn NodePolicy) -> String {
    let mut writer = Writer::new(policy, true);
    writer.children(element, preformatted_depth(element));
    writer.out
}

/// Serialize `element` itself, applying `policy` to it and its subtree.
pub fn outer_xhtml(element: ElementRef<'_>, policy: &dyn NodePolicy) -> String {
    let mut writer = Writer::new(policy, true);
    let depth = element
        .parent()
        .and_then(ElementRef::wrap)
        .map(preformatted_depth)
        .unwrap_or(0);
    writer.element(element, depth);
    writer.out
}

/// Escape text content for XML.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

/// Escape an attribute value for a double-quoted XML attribute.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;"),
    )
}

/// Simplified XML `Name` check; HTML allows attribute names XML rejects.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn preformatted_depth(element: ElementRef<'_>) -> usize {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .chain(std::iter::once(element))
        .filter(|el| PREFORMATTED.contains(&el.value().name()))
        .count()
}

struct Writer<'p> {
    policy: &'p dyn NodePolicy,
    /// Whether policies apply at the current position.
    active: bool,
    out: String,
}

impl<'p> Writer<'p> {
    fn new(policy: &'p dyn NodePolicy, active: bool) -> Self {
        Self {
            policy,
            active,
            out: String::new(),
        }
    }

    fn children(&mut self, element: ElementRef<'_>, preformatted: usize) {
        for child in element.children() {
            match child.value() {
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child, preformatted);
                    }
                }
                Node::Text(text) => {
                    let text: &str = text;
                    if self.active {
                        let text = self.policy.text(text, preformatted > 0);
                        self.out.push_str(&escape_text(&text));
                    } else {
                        self.out.push_str(&escape_text(text));
                    }
                }
                Node::Comment(comment) => {
                    if self.active && !self.policy.keep_comments() {
                        continue;
                    }
                    let comment: &str = comment;
                    // `--` is not allowed inside XML comments.
                    self.out.push_str("<!--");
                    self.out.push_str(&comment.replace("--", "- -"));
                    if comment.ends_with('-') {
                        self.out.push(' ');
                    }
                    self.out.push_str("-->");
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>, preformatted: usize) {
        let tag = element.value().name();
        let entering_body = !self.active && tag == "body";
        if entering_body {
            self.active = true;
        }

        if self.active && !entering_body {
            if !self.policy.keep_element(element) {
                return;
            }
            if self.policy.unwrap_element(element) {
                self.children(element, preformatted);
                return;
            }
        }

        let name = if self.active && !entering_body {
            self.policy.element_name(element)
        } else {
            Cow::Borrowed(tag)
        };
        let preformatted = preformatted + usize::from(PREFORMATTED.contains(&tag));

        self.out.push('<');
        self.out.push_str(&name);
        for (attr, value) in element.value().attrs() {
            if !is_xml_name(attr) {
                continue;
            }
            let value = if self.active {
                match self.policy.attribute(&name, attr, value) {
                    Some(value) => value,
                    None => continue,
                }
            } else {
                Cow::Borrowed(value)
            };
            self.out.push(' ');
            self.out.push_str(attr);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attribute(&value));
            self.out.push('"');
        }

        if is_void(&name) {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            self.children(element, preformatted);
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }

        if entering_body {
            self.active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropSpans;

    impl NodePolicy for DropSpans {
        fn keep_element(&self, element: ElementRef<'_>) -> bool {
            element.value().name() != "span"
        }
    }

    struct Shout;

    impl NodePolicy for Shout {
        fn text<'t>(&self, text: &'t str, preformatted: bool) -> Cow<'t, str> {
            if preformatted {
                Cow::Borrowed(text)
            } else {
                Cow::Owned(text.to_uppercase())
            }
        }
    }

    #[test]
    fn void_elements_are_self_closed() {
        let out = serialize_fragment("<p>a<br>b<img src=x.png></p>", &Identity);
        assert_eq!(out, r#"<p>a<br/>b<img src="x.png"/></p>"#);
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let out = serialize_fragment(r#"<a title="&quot;q&quot; &amp; more">1 &lt; 2</a>"#, &Identity);
        assert_eq!(out, r#"<a title="&quot;q&quot; &amp; more">1 &lt; 2</a>"#);
    }

    #[test]
    fn invalid_xml_attribute_names_are_dropped() {
        let out = serialize_fragment(r#"<div @click="go" x-data="1">hi</div>"#, &Identity);
        assert_eq!(out, r#"<div x-data="1">hi</div>"#);
    }

    #[test]
    fn policy_applies_only_inside_body() {
        let html = "<html><head><title>T</title><span>h</span></head><body><p>keep<span>drop</span></p></body></html>";
        let out = serialize_document(html, &DropSpans);
        assert!(out.starts_with("<!DOCTYPE html>\n<html>"));
        assert!(out.contains("<title>T</title>"));
        assert!(out.contains("<p>keep</p>"));
        assert!(!out.contains("drop"));
    }

    #[test]
    fn preformatted_text_is_flagged() {
        let out = serialize_fragment("<p>loud</p><pre>quiet <b>still</b></pre>", &Shout);
        assert_eq!(out, "<p>LOUD</p><pre>quiet <b>still</b></pre>");
    }

    #[test]
    fn comments_cannot_break_out() {
        let out = serialize_fragment("<p><!-- a -- b --></p>", &Identity);
        assert_eq!(out, "<p><!-- a - - b --></p>");
    }

    #[test]
    fn inner_and_outer_serialization() {
        let doc = Html::parse_fragment("<p>one</p>");
        let p = doc.root_element().first_child().and_then(ElementRef::wrap).unwrap();
        assert_eq!(outer_xhtml(p, &Identity), "<p>one</p>");
        assert_eq!(inner_xhtml(p, &Identity), "one");
    }
}
