//! Document transformations for the conversion pipeline.
//!
//! Every function here takes and returns owned strings of XHTML so results
//! can move between pipeline stages; parsed `scraper` trees stay local to a
//! single call.

pub mod clean;
pub mod content;
pub mod headings;
pub mod images;
pub mod metadata;
pub mod split;
pub mod xhtml;

pub use clean::{CleanOptions, clean_document};
pub use content::extract_main_content;
pub use headings::{heading_level, reduce_heading_levels};
pub use images::{ImageLoader, collect_image_sources, media_type_from_path};
pub use metadata::extract_metadata;
pub use split::{render_chapters, split_chapters, split_level};
pub use xhtml::{NodePolicy, escape_attribute, escape_text};
