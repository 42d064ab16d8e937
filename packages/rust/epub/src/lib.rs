//! EPUB 3 packaging for converted documents.
//!
//! Books are written as an unzipped OCF container directory and can be
//! checked again later with [`validate_book`].

pub mod package;
pub mod templates;
pub mod validate;

pub use package::{slugify, write_book};
pub use validate::{BookCheck, validate_book};
