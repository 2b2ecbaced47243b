//! Markdown rendering using pulldown-cmark.
//!
//! Posts get a few site-specific touches on top of CommonMark:
//! permalink anchors on headings up to level 4, syntect-highlighted fenced
//! code, and `<figure>` wrappers for images hosted under `/images/`.
//!
//! When the parser knows where those images live, each figure is sized from
//! the file's pixel dimensions and gets a fixed aspect ratio wrapper. A
//! `-2x` style suffix on the file name marks a high density image, which is
//! shown at its pixel size divided by the density.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use inkpress_core::{PostMetadata, frontmatter::parse_post};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::syntax::{SyntaxHighlighter, html_escape};

/// Deepest heading level that gets a permalink anchor.
const ANCHOR_MAX_LEVEL: HeadingLevel = HeadingLevel::H4;

/// Images below this prefix are rendered as figures.
const LOCAL_IMAGE_PREFIX: &str = "/images/";

static PIXEL_DENSITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d)x\.[^./]+$").expect("density pattern is valid"));

/// Markdown parsing errors.
#[derive(Debug, Error)]
pub enum MarkdownError {
    /// Failed to parse the metadata block.
    #[error("frontmatter error: {0}")]
    Frontmatter(#[from] inkpress_core::CoreError),
}

/// Result type for markdown operations.
pub type Result<T> = std::result::Result<T, MarkdownError>;

/// Table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Heading level (1-6).
    pub level: u8,

    /// Heading text.
    pub text: String,

    /// Anchor ID for linking.
    pub id: String,
}

/// A post split into metadata and rendered body.
#[derive(Debug, Clone)]
pub struct ParsedPost {
    /// Parsed metadata block.
    pub metadata: PostMetadata,

    /// Rendered HTML fragment.
    pub html: String,

    /// Headings found in the body.
    pub toc: Vec<TocEntry>,
}

/// Markdown parser with syntax highlighting support.
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    highlighter: SyntaxHighlighter,
    options: Options,
    image_root: Option<PathBuf>,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new(SyntaxHighlighter::default())
    }
}

/// Heading being collected until its end tag.
struct PendingHeading<'a> {
    level: HeadingLevel,
    id: Option<String>,
    classes: Vec<String>,
    inner: Vec<Event<'a>>,
}

/// Image being collected until its end tag.
struct PendingFigure {
    src: String,
    title: String,
    alt: String,
}

impl MarkdownParser {
    /// Create a parser using the given highlighter.
    pub fn new(highlighter: SyntaxHighlighter) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            highlighter,
            options,
            image_root: None,
        }
    }

    /// Size local figures from files under `root`, where `/images/a.png`
    /// lives at `root/images/a.png`.
    #[must_use]
    pub fn with_image_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.image_root = Some(root.into());
        self
    }

    /// Parse a post: metadata block followed by a markdown body.
    pub fn parse(&self, content: &str, path: &Path) -> Result<ParsedPost> {
        let (metadata, body) = parse_post(content, path)?;
        let (html, toc) = self.render(&body);

        Ok(ParsedPost {
            metadata,
            html,
            toc,
        })
    }

    /// Render a markdown body to HTML with TOC extraction.
    pub fn render(&self, content: &str) -> (String, Vec<TocEntry>) {
        let parser = Parser::new_ext(content, self.options);
        let mut events: Vec<Event<'_>> = Vec::new();
        let mut toc = Vec::new();
        let mut ids: HashMap<String, usize> = HashMap::new();

        let mut heading: Option<PendingHeading<'_>> = None;
        let mut code: Option<(Option<String>, String)> = None;
        let mut figure: Option<PendingFigure> = None;

        for event in parser {
            if let Some((lang, buffer)) = code.as_mut() {
                match event {
                    Event::Text(text) => buffer.push_str(&text),
                    Event::End(TagEnd::CodeBlock) => {
                        let html = self.highlighter.highlight(buffer, lang.as_deref());
                        events.push(Event::Html(CowStr::from(html)));
                        code = None;
                    }
                    _ => {}
                }
                continue;
            }

            if let Some(pending) = figure.as_mut() {
                match event {
                    Event::Text(text) | Event::Code(text) => pending.alt.push_str(&text),
                    Event::End(TagEnd::Image) => {
                        let size = self.image_size(&pending.src);
                        let html = figure_html(pending, size);
                        push_event(&mut heading, &mut events, Event::Html(CowStr::from(html)));
                        figure = None;
                    }
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::Heading {
                    level, id, classes, ..
                }) => {
                    heading = Some(PendingHeading {
                        level,
                        id: id.map(|i| i.to_string()),
                        classes: classes.iter().map(|c| c.to_string()).collect(),
                        inner: Vec::new(),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(pending) = heading.take() {
                        let (html, entry) = heading_html(pending, &mut ids);
                        toc.push(entry);
                        events.push(Event::Html(CowStr::from(html)));
                    }
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::Start(Tag::Image {
                    dest_url, title, ..
                }) if dest_url.starts_with(LOCAL_IMAGE_PREFIX) => {
                    figure = Some(PendingFigure {
                        src: dest_url.to_string(),
                        title: title.to_string(),
                        alt: String::new(),
                    });
                }
                other => push_event(&mut heading, &mut events, other),
            }
        }

        let mut html = String::with_capacity(content.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html, events.into_iter());
        (html, toc)
    }

    /// Display size of a local image, in CSS pixels.
    fn image_size(&self, src: &str) -> Option<(f64, f64)> {
        let root = self.image_root.as_ref()?;
        let path = root.join(src.trim_start_matches('/'));
        let (width, height) = match image::image_dimensions(&path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read image size");
                return None;
            }
        };
        if width == 0 || height == 0 {
            return None;
        }
        let density = pixel_density(src);
        Some((f64::from(width) / density, f64::from(height) / density))
    }
}

/// Pixel density from a `-<N>x` file name suffix, 1 without one.
fn pixel_density(src: &str) -> f64 {
    PIXEL_DENSITY
        .captures(src)
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .filter(|d| *d > 0)
        .map_or(1.0, f64::from)
}

/// Up to four decimals, without trailing zeros.
fn css_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    rounded.to_string()
}

fn push_event<'a>(
    heading: &mut Option<PendingHeading<'a>>,
    events: &mut Vec<Event<'a>>,
    event: Event<'a>,
) {
    match heading {
        Some(pending) => pending.inner.push(event),
        None => events.push(event),
    }
}

fn heading_html(
    pending: PendingHeading<'_>,
    ids: &mut HashMap<String, usize>,
) -> (String, TocEntry) {
    let text: String = pending
        .inner
        .iter()
        .filter_map(|e| match e {
            Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
            _ => None,
        })
        .collect();

    let base = pending.id.unwrap_or_else(|| slugify(&text));
    let id = unique_id(base, ids);
    let level = pending.level as u8;

    let mut inner = String::new();
    pulldown_cmark::html::push_html(&mut inner, pending.inner.into_iter());

    let class_attr = if pending.classes.is_empty() {
        String::new()
    } else {
        format!(" class=\"{}\"", html_escape(&pending.classes.join(" ")))
    };

    let anchor = if pending.level <= ANCHOR_MAX_LEVEL {
        format!("<a class=\"header-anchor\" href=\"#{id}\">#</a> ")
    } else {
        String::new()
    };

    let html = format!("<h{level} id=\"{id}\"{class_attr}>{anchor}{inner}</h{level}>\n");
    (html, TocEntry { level, text, id })
}

fn unique_id(base: String, ids: &mut HashMap<String, usize>) -> String {
    let count = ids.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base
    } else {
        format!("{base}-{}", *count - 1)
    }
}

fn figure_html(figure: &PendingFigure, size: Option<(f64, f64)>) -> String {
    let caption = if figure.title.is_empty() {
        String::new()
    } else {
        format!("<figcaption>{}</figcaption>", html_escape(&figure.title))
    };
    let src = html_escape(&figure.src);
    let alt = html_escape(&figure.alt);

    let Some((width, height)) = size else {
        return format!(
            "<figure class=\"article-image\"><img src=\"{src}\" alt=\"{alt}\" loading=\"lazy\">{caption}</figure>"
        );
    };

    // Padding-bottom is relative to the width, so it reserves the height.
    let ratio = css_number(100.0 / width * height);
    format!(
        "<figure class=\"article-image\">\
         <div style=\"max-width: {}px; margin-left: auto; margin-right: auto;\">\
         <div style=\"width: 100%; height: 0; padding-bottom: {ratio}%;\">\
         <img src=\"{src}\" alt=\"{alt}\" style=\"width: 100%;\" loading=\"lazy\">\
         </div></div>{caption}</figure>",
        css_number(width)
    )
}

/// Convert text to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_post() {
        let parser = MarkdownParser::default();
        let content = r#"---
title: "Hello"
date: 2023-04-01
layout: post
draft: false
---

# Hi

This is a test."#;

        let result = parser
            .parse(content, Path::new("2023-04-01-hello-world.md"))
            .unwrap();

        assert_eq!(result.metadata.title, "Hello");
        assert!(result.html.contains("<h1 id=\"hi\">"));
        assert!(result.html.contains("Hi</h1>"));
        assert!(result.html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_heading_anchor_levels() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render("## Two\n\n##### Five");

        assert!(html.contains(
            "<h2 id=\"two\"><a class=\"header-anchor\" href=\"#two\">#</a> Two</h2>"
        ));
        assert!(html.contains("<h5 id=\"five\">Five</h5>"));
    }

    #[test]
    fn test_duplicate_heading_ids() {
        let parser = MarkdownParser::default();
        let (html, toc) = parser.render("## Setup\n\n## Setup\n\n## Setup");

        let ids: Vec<_> = toc.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["setup", "setup-1", "setup-2"]);
        assert!(html.contains("id=\"setup-2\""));
    }

    #[test]
    fn test_heading_with_inline_markup() {
        let parser = MarkdownParser::default();
        let (html, toc) = parser.render("## Using `cargo` *today*");

        assert_eq!(toc[0].text, "Using cargo today");
        assert_eq!(toc[0].id, "using-cargo-today");
        assert!(html.contains("<code>cargo</code>"));
        assert!(html.contains("<em>today</em>"));
    }

    #[test]
    fn test_parse_code_block() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render("```rust\nfn main() {\n    println!(\"Hello\");\n}\n```");

        assert!(html.contains("data-lang=\"rust\""));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_toc_extraction() {
        let parser = MarkdownParser::default();
        let (_, toc) = parser.render("# Heading 1\n## Heading 2\n### Heading 3");

        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].level, 1);
        assert_eq!(toc[0].text, "Heading 1");
        assert_eq!(toc[1].level, 2);
        assert_eq!(toc[2].level, 3);
    }

    #[test]
    fn test_local_image_figure() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render("![A *cat*](/images/cat.png \"Our cat\")");

        assert!(html.contains("<figure class=\"article-image\">"));
        assert!(html.contains("src=\"/images/cat.png\""));
        assert!(html.contains("alt=\"A cat\""));
        assert!(html.contains("<figcaption>Our cat</figcaption>"));
    }

    fn write_png(root: &Path, name: &str, width: u32, height: u32) {
        let path = root.join("images").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbImage::new(width, height).save(&path).unwrap();
    }

    #[test]
    fn test_sized_figure() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "chart.png", 640, 360);
        let parser = MarkdownParser::default().with_image_root(dir.path());

        let (html, _) = parser.render("![Chart](/images/chart.png)");

        assert!(html.contains(
            "<div style=\"max-width: 640px; margin-left: auto; margin-right: auto;\">"
        ));
        assert!(html.contains("padding-bottom: 56.25%;"));
        assert!(html.contains(
            "<img src=\"/images/chart.png\" alt=\"Chart\" style=\"width: 100%;\""
        ));
    }

    #[test]
    fn test_high_density_figure_is_halved() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "screen-2x.png", 1200, 900);
        let parser = MarkdownParser::default().with_image_root(dir.path());

        let (html, _) = parser.render("![Screen](/images/screen-2x.png \"Settings\")");

        assert!(html.contains("max-width: 600px;"));
        assert!(html.contains("padding-bottom: 75%;"));
        assert!(html.ends_with("</div></div><figcaption>Settings</figcaption></figure></p>\n"));
    }

    #[test]
    fn test_missing_image_falls_back_to_plain_figure() {
        let dir = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::default().with_image_root(dir.path());

        let (html, _) = parser.render("![Gone](/images/gone.png)");

        assert!(html.contains("<figure class=\"article-image\"><img src=\"/images/gone.png\""));
        assert!(!html.contains("padding-bottom"));
    }

    #[test]
    fn test_pixel_density() {
        assert_eq!(pixel_density("/images/a.png"), 1.0);
        assert_eq!(pixel_density("/images/a-2x.png"), 2.0);
        assert_eq!(pixel_density("/images/a-3x.jpeg"), 3.0);
        assert_eq!(pixel_density("/images/a-0x.png"), 1.0);
        assert_eq!(pixel_density("/images/a-2x.tar.gz"), 1.0);
    }

    #[test]
    fn test_remote_image_untouched() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render("![logo](https://example.com/logo.png)");

        assert!(!html.contains("<figure"));
        assert!(html.contains("<img src=\"https://example.com/logo.png\" alt=\"logo\""));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Test 123 Post"), "test-123-post");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("Special!@#Chars"), "specialchars");
    }

    #[test]
    fn test_table_rendering() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render(
            r#"| Header 1 | Header 2 |
|----------|----------|
| Cell 1   | Cell 2   |"#,
        );

        assert!(html.contains("<table>"));
        assert!(html.contains("<thead>"));
        assert!(html.contains("<td>Cell 1</td>"));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let parser = MarkdownParser::default();
        let (html, _) = parser.render("<div class=\"note\">Note</div>");
        assert!(html.contains("<div class=\"note\">Note</div>"));
    }
}
