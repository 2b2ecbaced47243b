//! Syntax highlighting for code blocks.

use std::sync::LazyLock;

use syntect::{
    highlighting::{Theme, ThemeSet},
    html::highlighted_html_for_string,
    parsing::SyntaxSet,
};
use thiserror::Error;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Syntax highlighting errors.
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// The configured theme is not bundled.
    #[error("unknown syntax theme '{name}' (available: {available})")]
    UnknownTheme { name: String, available: String },
}

/// Syntax highlighter using syntect's bundled syntaxes and themes.
#[derive(Debug, Clone)]
pub struct SyntaxHighlighter {
    theme: Theme,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self {
            theme: THEMES.themes["base16-ocean.dark"].clone(),
        }
    }
}

impl SyntaxHighlighter {
    /// Create a highlighter for a bundled theme.
    pub fn new(theme: &str) -> Result<Self, SyntaxError> {
        let theme = THEMES
            .themes
            .get(theme)
            .cloned()
            .ok_or_else(|| SyntaxError::UnknownTheme {
                name: theme.to_string(),
                available: available_themes().join(", "),
            })?;
        Ok(Self { theme })
    }

    /// Highlight a fenced code block.
    ///
    /// Unknown or missing languages are emitted as escaped plain text.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let syntax = lang.and_then(|l| SYNTAXES.find_syntax_by_token(l));

        let body = match syntax {
            Some(syntax) => highlighted_html_for_string(code, &SYNTAXES, syntax, &self.theme)
                .unwrap_or_else(|_| plain_block(code, lang)),
            None => plain_block(code, lang),
        };

        match lang {
            Some(lang) => format!(
                "<div class=\"code-block\" data-lang=\"{}\">{body}</div>\n",
                html_escape(lang)
            ),
            None => format!("<div class=\"code-block\">{body}</div>\n"),
        }
    }
}

/// Names of all bundled themes.
pub fn available_themes() -> Vec<&'static str> {
    let mut names: Vec<_> = THEMES.themes.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

fn plain_block(code: &str, lang: Option<&str>) -> String {
    let lang_class = lang
        .map(|l| format!(" class=\"language-{}\"", html_escape(l)))
        .unwrap_or_default();
    format!("<pre><code{lang_class}>{}</code></pre>", html_escape(code))
}

/// Escape HTML special characters.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
