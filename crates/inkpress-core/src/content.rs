//! Content types shared by the build pipeline.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

static POST_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<year>\d{4})-(?<month>\d{2})-(?<day>\d{2})-(?<slug>.+)$")
        .expect("post name pattern is valid")
});

/// Category of a discovered source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Markdown blog post.
    Post,
    /// File mirrored from the static tree.
    StaticAsset,
    /// Layout or partial template.
    Template,
}

/// A file read from the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    /// Path on disk.
    pub path: PathBuf,

    /// Category of the file.
    pub kind: SourceKind,

    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl SourceArtifact {
    /// Create a new artifact.
    pub fn new(path: impl Into<PathBuf>, kind: SourceKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            kind,
            bytes: bytes.into(),
        }
    }

    /// File name without its final extension.
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    /// Path relative to `root`, using `/` separators.
    pub fn relative_to(&self, root: &Path) -> Option<String> {
        let relative = self.path.strip_prefix(root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// Content of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBody {
    /// Content produced by the build.
    Rendered(String),
    /// Copied byte-for-byte from a source file.
    Passthrough(PathBuf),
}

/// One entry of the build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Stable logical id used for cross references.
    pub key: String,

    /// Public URL path, possibly fingerprinted.
    pub url_path: String,

    /// Path relative to the output directory, with a leading `/`.
    pub file_path: String,

    /// Rendered content or a source reference.
    pub body: OutputBody,
}

impl OutputFile {
    /// Create an entry with rendered content.
    pub fn rendered(
        key: impl Into<String>,
        url_path: impl Into<String>,
        file_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            url_path: url_path.into(),
            file_path: file_path.into(),
            body: OutputBody::Rendered(content.into()),
        }
    }

    /// Create an entry copied from a source file.
    pub fn passthrough(
        key: impl Into<String>,
        url_path: impl Into<String>,
        file_path: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key: key.into(),
            url_path: url_path.into(),
            file_path: file_path.into(),
            body: OutputBody::Passthrough(source.into()),
        }
    }
}

/// How a build context will be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildMode {
    /// Written to disk once.
    OneShot,
    /// Served from memory by the dev server.
    Watch,
}

impl BuildMode {
    /// Whether this is a watch-mode build.
    pub fn is_watch(self) -> bool {
        matches!(self, Self::Watch)
    }
}

/// A post file name split into its `YYYY-MM-DD-slug` parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostName {
    /// Date encoded in the file name.
    pub date: Option<NaiveDate>,

    /// URL slug.
    pub slug: String,
}

impl PostName {
    /// Parse a post file stem. Returns `None` when the stem does not match.
    pub fn parse(stem: &str) -> Option<Self> {
        let caps = POST_NAME.captures(stem)?;
        let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());

        let date = match (number("year"), number("month"), number("day")) {
            (Some(year), Some(month), Some(day)) => {
                NaiveDate::from_ymd_opt(year as i32, month, day)
            }
            _ => None,
        };

        Some(Self {
            date,
            slug: caps["slug"].to_string(),
        })
    }
}

/// Public URL of a post: `/blog/posts/<year>/<MM>/<DD>/<slug>`.
pub fn post_url_path(date: NaiveDate, slug: &str) -> String {
    format!(
        "/blog/posts/{}/{:02}/{:02}/{slug}",
        date.year(),
        date.month(),
        date.day()
    )
}

/// Output file for a URL: directory-style URLs get an `index.html`.
pub fn html_file_path(url_path: &str) -> String {
    if url_path.ends_with('/') {
        format!("{url_path}index.html")
    } else {
        format!("{url_path}.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_name_parse() {
        let name = PostName::parse("2023-04-01-hello-world").expect("valid");
        assert_eq!(name.slug, "hello-world");
        assert_eq!(name.date, NaiveDate::from_ymd_opt(2023, 4, 1));
    }

    #[test]
    fn test_post_name_rejects_bad_stems() {
        assert!(PostName::parse("hello-world").is_none());
        assert!(PostName::parse("2023-4-01-hello").is_none());
        assert!(PostName::parse("2023-04-01").is_none());
        assert!(PostName::parse("2023-04-01-").is_none());
    }

    #[test]
    fn test_post_name_impossible_date() {
        let name = PostName::parse("2023-02-30-leap").expect("matches pattern");
        assert!(name.date.is_none());
        assert_eq!(name.slug, "leap");
    }

    #[test]
    fn test_post_url_path_zero_pads() {
        let date = NaiveDate::from_ymd_opt(2023, 4, 1).unwrap();
        assert_eq!(
            post_url_path(date, "hello-world"),
            "/blog/posts/2023/04/01/hello-world"
        );

        for (y, m, d) in [(1999, 12, 31), (2024, 1, 9), (2020, 10, 5)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let stem = format!("{y:04}-{m:02}-{d:02}-slug");
            let name = PostName::parse(&stem).unwrap();
            assert_eq!(
                post_url_path(name.date.unwrap(), &name.slug),
                format!("/blog/posts/{y}/{m:02}/{d:02}/slug")
            );
            assert_eq!(name.date, Some(date));
        }
    }

    #[test]
    fn test_html_file_path() {
        assert_eq!(html_file_path("/"), "/index.html");
        assert_eq!(html_file_path("/blog"), "/blog.html");
        assert_eq!(html_file_path("/docs/"), "/docs/index.html");
    }

    #[test]
    fn test_relative_to() {
        let artifact = SourceArtifact::new(
            "/site/static/css/a.css",
            SourceKind::StaticAsset,
            b"".to_vec(),
        );
        assert_eq!(
            artifact.relative_to(Path::new("/site/static")).as_deref(),
            Some("css/a.css")
        );
        assert!(artifact.relative_to(Path::new("/other")).is_none());
        assert_eq!(artifact.stem(), Some("a"));
    }
}
