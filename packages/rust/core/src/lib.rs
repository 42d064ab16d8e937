//! Core pipeline orchestration for Pagebinder.
//!
//! This crate ties together source loading, document transformations and
//! EPUB packaging into one stage graph (see [`pipeline::convert_document`]).

pub mod pipeline;
pub mod source;

pub use pipeline::{ConvertConfig, convert, convert_document};
pub use source::load_source;
