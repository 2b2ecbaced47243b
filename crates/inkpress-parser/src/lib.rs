//! Inkpress Parser Library
//!
//! Markdown rendering and syntax highlighting for posts.

pub mod markdown;
pub mod syntax;

use std::path::Path;

pub use markdown::{MarkdownParser, ParsedPost, TocEntry, slugify};
pub use syntax::{SyntaxHighlighter, available_themes};
use thiserror::Error;

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Markdown parsing error.
    #[error("markdown error: {0}")]
    Markdown(#[from] markdown::MarkdownError),

    /// Highlighter setup error.
    #[error("syntax error: {0}")]
    Syntax(#[from] syntax::SyntaxError),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;

/// Trait for post parsers.
pub trait PostParser: Send + Sync {
    /// Parse a post from its raw text and source path.
    fn parse_post(&self, content: &str, path: &Path) -> Result<ParsedPost>;
}

impl PostParser for MarkdownParser {
    fn parse_post(&self, content: &str, path: &Path) -> Result<ParsedPost> {
        Ok(self.parse(content, path)?)
    }
}

/// Build a markdown parser highlighting with the named theme.
pub fn markdown_with_theme(theme: &str) -> Result<MarkdownParser> {
    Ok(MarkdownParser::new(SyntaxHighlighter::new(theme)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_parser_trait() {
        let parser = MarkdownParser::default();
        let content = "---\ntitle: \"Trait Test\"\ndate: 2023-04-01\nlayout: post\n---\n\nContent";

        let result = PostParser::parse_post(&parser, content, Path::new("test.md"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_metadata_is_markdown_error() {
        let parser = MarkdownParser::default();
        let result = parser.parse_post("# no metadata", Path::new("test.md"));
        assert!(matches!(result, Err(ParserError::Markdown(_))));
    }

    #[test]
    fn test_markdown_with_theme() {
        assert!(markdown_with_theme("InspiredGitHub").is_ok());
        assert!(matches!(
            markdown_with_theme("nope"),
            Err(ParserError::Syntax(_))
        ));
    }
}
