//! Shared types, error model, and configuration for Pagebinder.
//!
//! This crate is the foundation depended on by all other Pagebinder crates.
//! It provides:
//! - [`PagebinderError`], the unified error type
//! - Domain types ([`SourceDocument`], [`BookMetadata`], [`ChapterDocument`], [`ImageAssets`])
//! - Configuration ([`AppConfig`], [`ImageOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CleanConfig, DefaultsConfig, ImageOptions, ImagesConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PagebinderError, Result};
pub use types::{
    BookMetadata, BookResult, Chapter, ChapterDocument, ImageAsset, ImageAssets, SourceDocument,
    new_identifier,
};
