//! Error types for Pagebinder.
//!
//! Library crates use [`PagebinderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use pagebinder_graph::{ConfigurationError, GraphError};

/// Top-level error type for all Pagebinder operations.
#[derive(Debug, thiserror::Error)]
pub enum PagebinderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching the source document or its images.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed book, missing file, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Writing the EPUB container failed.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// A conversion pipeline stage failed or the pipeline was miswired.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] GraphError),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagebinderError>;

impl PagebinderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigurationError> for PagebinderError {
    fn from(err: ConfigurationError) -> Self {
        Self::Pipeline(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PagebinderError::config("unknown key");
        assert_eq!(err.to_string(), "config error: unknown key");

        let err = PagebinderError::validation("mimetype must be application/epub+zip");
        assert!(err.to_string().contains("application/epub+zip"));
    }

    #[test]
    fn graph_errors_convert() {
        let err: PagebinderError = GraphError::from(ConfigurationError::Empty).into();
        assert!(err.to_string().starts_with("pipeline error:"));

        let err: PagebinderError = ConfigurationError::Empty.into();
        assert!(matches!(
            err,
            PagebinderError::Pipeline(GraphError::Configuration(ConfigurationError::Empty))
        ));
    }
}
