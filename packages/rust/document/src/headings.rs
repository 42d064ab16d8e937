//! Heading level normalization.

use std::borrow::Cow;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::xhtml::{self, NodePolicy};

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body h1, body h2, body h3, body h4, body h5, body h6").expect("valid selector"));

/// Level of a heading element name (`h1` → 1), `None` for anything else.
pub fn heading_level(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b'h', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

struct ShiftHeadings {
    by: u8,
}

impl NodePolicy for ShiftHeadings {
    fn element_name<'a>(&self, element: ElementRef<'a>) -> Cow<'a, str> {
        let name = element.value().name();
        match heading_level(name) {
            Some(level) => Cow::Owned(format!("h{}", level.saturating_sub(self.by).clamp(1, 6))),
            None => Cow::Borrowed(name),
        }
    }
}

/// Shift every body heading up so the shallowest level present becomes `h1`.
pub fn reduce_heading_levels(html: &str) -> String {
    let doc = Html::parse_document(html);
    let shallowest = doc
        .select(&HEADINGS)
        .filter_map(|el| heading_level(el.value().name()))
        .min();

    match shallowest {
        Some(level) if level > 1 => {
            debug!(from = level, "shifting heading levels");
            xhtml::serialize_document(html, &ShiftHeadings { by: level - 1 })
        }
        _ => html.to_string(),
    }
}
