//! Post front-matter parsing.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

/// Metadata block at the top of every post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    /// Post title (required).
    pub title: String,

    /// Publication date; drives the post URL and listing order.
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,

    /// Layout template used to render the post.
    pub layout: String,

    /// Drafts are rendered but never listed.
    #[serde(default)]
    pub draft: bool,

    /// Description for meta tags and listings.
    #[serde(default)]
    pub description: Option<String>,

    /// Older posts carry `summary` instead of `description`.
    #[serde(default)]
    pub summary: Option<String>,

    /// Optional externally hosted hero image.
    #[serde(default, rename = "heroImage", alias = "hero_image")]
    pub hero_image: Option<HeroImageRef>,

    /// Everything else in the block.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Reference to a hero image hosted by an external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroImageRef {
    /// Service name, e.g. "unsplash".
    pub source: String,

    /// Service-specific image id.
    pub id: String,
}

impl PostMetadata {
    /// The description shown for the post: `description`, else `summary`, else empty.
    pub fn description_or_summary(&self) -> &str {
        self.description
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or_default()
    }

    /// Validate required fields.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::frontmatter(path, "title is required"));
        }
        if self.layout.trim().is_empty() {
            return Err(CoreError::frontmatter(path, "layout is required"));
        }
        Ok(())
    }
}

/// A date as written in YAML (always text) or TOML (text or a native date).
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Toml(toml::value::Datetime),
}

fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match RawDate::deserialize(deserializer)? {
        RawDate::Text(raw) => parse_date(&raw).ok_or(raw),
        RawDate::Toml(datetime) => parse_date(&datetime.to_string())
            .or_else(|| {
                datetime.date.and_then(|d| {
                    NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))
                })
            })
            .ok_or_else(|| datetime.to_string()),
    };

    parsed.map_err(|raw| {
        serde::de::Error::custom(format!(
            "invalid date '{raw}', expected YYYY-MM-DD or an RFC 3339 timestamp"
        ))
    })
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp into its UTC calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.naive_utc().date())
    })
}

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
///
/// The closing delimiter must start a line.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start_matches('\u{feff}').trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();
    let after_first = &content[delimiter.len()..];
    let closing = format!("\n{delimiter}");
    let closing_pos = after_first.find(&closing)?;

    let frontmatter = after_first[..closing_pos].trim();
    let body = after_first[closing_pos + closing.len()..].trim_start();

    Some((format, frontmatter, body))
}

/// Parse a post's metadata block and return it with the remaining body.
pub fn parse_post(content: &str, path: &Path) -> Result<(PostMetadata, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Err(CoreError::frontmatter(path, "missing metadata block"));
    };

    let metadata: PostMetadata = match format {
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
    };

    metadata.validate(path)?;
    Ok((metadata, body.to_string()))
}
