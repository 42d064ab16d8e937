//! Splitting main content into chapters at headings.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Node};
use tracing::{debug, instrument};

use pagebinder_shared::{Chapter, ChapterDocument};

use crate::headings::heading_level;
use crate::xhtml::{self, Identity};

/// Pick the level chapters are split at.
///
/// The shallowest level that occurs at least twice, otherwise the shallowest
/// level present. `None` when there are no headings.
pub fn split_level(counts: &BTreeMap<u8, usize>) -> Option<u8> {
    counts
        .iter()
        .find(|&(_, &count)| count >= 2)
        .or_else(|| counts.iter().next())
        .map(|(&level, _)| level)
}

/// Split an XHTML fragment into chapters.
///
/// Content before the first split heading becomes a chapter titled
/// `book_title`. Chapters without text or images are dropped.
#[instrument(skip(html), fields(len = html.len()))]
pub fn split_chapters(html: &str, book_title: &str) -> Vec<Chapter> {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let mut counts = BTreeMap::new();
    for el in root.descendants().filter_map(ElementRef::wrap) {
        if let Some(level) = heading_level(el.value().name()) {
            *counts.entry(level).or_insert(0_usize) += 1;
        }
    }

    let mut splitter = Splitter::new(split_level(&counts), book_title);
    splitter.children(root);
    let chapters = splitter.finish();

    debug!(chapters = chapters.len(), levels = ?counts, "content split");
    chapters
}

/// Turn chapters into packaged content documents with stable ids.
pub fn render_chapters(chapters: &[Chapter]) -> Vec<ChapterDocument> {
    chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| {
            let id = format!("chapter-{:03}", i + 1);
            ChapterDocument {
                file_name: format!("text/{id}.xhtml"),
                id,
                title: chapter.title.clone(),
                body: xhtml::serialize_fragment(&chapter.html, &Identity),
            }
        })
        .collect()
}

struct Draft {
    title: String,
    html: String,
    has_content: bool,
}

struct Splitter<'t> {
    level: Option<u8>,
    book_title: &'t str,
    current: Draft,
    done: Vec<Chapter>,
}

impl<'t> Splitter<'t> {
    fn new(level: Option<u8>, book_title: &'t str) -> Self {
        Self {
            level,
            book_title,
            current: Draft {
                title: book_title.to_string(),
                html: String::new(),
                has_content: false,
            },
            done: Vec::new(),
        }
    }

    fn is_split_heading(&self, el: ElementRef<'_>) -> bool {
        self.level.is_some() && heading_level(el.value().name()) == self.level
    }

    fn contains_split_heading(&self, el: ElementRef<'_>) -> bool {
        el.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .any(|d| self.is_split_heading(d))
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let text: &str = text;
                    if !text.trim().is_empty() {
                        self.current.has_content = true;
                    }
                    self.current.html.push_str(&xhtml::escape_text(text));
                }
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_split_heading(child) {
                        self.start_chapter(child);
                    } else if self.contains_split_heading(child) {
                        // Flatten containers so every heading starts its own chapter.
                        self.children(child);
                    } else {
                        if child.text().any(|t| !t.trim().is_empty())
                            || child.value().name() == "img"
                            || child.descendants().filter_map(ElementRef::wrap).any(|d| d.value().name() == "img")
                        {
                            self.current.has_content = true;
                        }
                        self.current.html.push_str(&xhtml::outer_xhtml(child, &Identity));
                    }
                }
                _ => {}
            }
        }
    }

    fn start_chapter(&mut self, heading: ElementRef<'_>) {
        let title = heading.text().collect::<String>();
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        let title = if title.is_empty() {
            format!("Section {}", self.done.len() + 1)
        } else {
            title
        };

        let next = Draft {
            title,
            html: xhtml::outer_xhtml(heading, &Identity),
            has_content: true,
        };
        let previous = std::mem::replace(&mut self.current, next);
        self.push(previous);
    }

    fn push(&mut self, draft: Draft) {
        if draft.has_content {
            self.done.push(Chapter {
                title: draft.title,
                html: draft.html.trim().to_string(),
            });
        }
    }

    fn finish(mut self) -> Vec<Chapter> {
        let last = std::mem::replace(
            &mut self.current,
            Draft {
                title: self.book_title.to_string(),
                html: String::new(),
                has_content: false,
            },
        );
        self.push(last);
        self.done
    }
}
