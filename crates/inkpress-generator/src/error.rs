//! Build error taxonomy.

use std::path::{Path, PathBuf};

use inkpress_core::CoreError;
use inkpress_parser::{ParserError, markdown::MarkdownError};
use thiserror::Error;

use crate::{hero::LookupError, stylesheet::StylesheetError, template::TemplateError};

/// Errors that fail an assembly or a write.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Malformed post file name, metadata block or hero source.
    #[error("format error in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Missing or unreadable source, or a failed write.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hero image service failed after retries.
    #[error("remote lookup failed: {0}")]
    RemoteLookup(#[from] LookupError),

    /// Layout, partial, helper or variable problem.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Stylesheet could not be processed.
    #[error("stylesheet error: {0}")]
    Stylesheet(#[from] StylesheetError),

    /// Two manifest entries share a key.
    #[error("duplicate manifest key: {0}")]
    DuplicateKey(String),

    /// A fan-out task panicked or was cancelled.
    #[error("build task failed: {0}")]
    Task(String),
}

impl BuildError {
    /// Create a format error.
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an IO error for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for BuildError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl From<MarkdownError> for BuildError {
    fn from(err: MarkdownError) -> Self {
        match err {
            MarkdownError::Frontmatter(CoreError::Frontmatter { path, message }) => {
                Self::Format { path, message }
            }
            MarkdownError::Frontmatter(other) => Self::Format {
                path: PathBuf::new(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ParserError> for BuildError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::Markdown(e) => e.into(),
            other => Self::Format {
                path: PathBuf::new(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
