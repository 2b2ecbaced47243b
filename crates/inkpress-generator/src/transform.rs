//! Content transforms: one source plus global context in, rendered output out.
//!
//! Transforms never write anything; the assembler collects their results.

use std::{path::PathBuf, sync::Arc};

use chrono::NaiveDate;
use inkpress_core::{
    BuildMode, Config, OutputFile, PostMetadata, PostName, SourceArtifact,
    config::PageConfig,
    content::{html_file_path, post_url_path},
};
use inkpress_parser::{MarkdownParser, PostParser, TocEntry};
use tracing::{debug, warn};

use crate::{
    error::{BuildError, Result},
    hero::{HeroClient, HeroImage},
    template::{TemplateContext, TemplateEngine},
};

/// A rendered blog post.
#[derive(Debug, Clone)]
pub struct Post {
    /// Parsed metadata block.
    pub metadata: PostMetadata,

    /// Public URL, `/blog/posts/<year>/<MM>/<DD>/<slug>`.
    pub url_path: String,

    /// Output path, `<url_path>.html`.
    pub file_path: String,

    /// Markdown source.
    pub source_path: PathBuf,

    /// Full page HTML.
    pub html: String,

    /// Resolved hero image, when the post declares one.
    pub hero: Option<HeroImage>,
}

impl Post {
    /// Manifest entry for this post. The key is the URL path.
    #[must_use]
    pub fn output_file(&self) -> OutputFile {
        OutputFile::rendered(&self.url_path, &self.url_path, &self.file_path, &self.html)
    }

    /// Listing entry for templates.
    #[must_use]
    pub fn summary_context(&self, config: &Config) -> TemplateContext {
        let mut ctx = TemplateContext::new()
            .with_var("title", self.metadata.title.as_str())
            .with_var("url", self.url_path.as_str())
            .with_var("permalink", config.url_for(&self.url_path))
            .with_var("date", format_date(self.metadata.date))
            .with_var("date_iso", self.metadata.date.to_string())
            .with_var("description", self.metadata.description_or_summary());
        if let Some(hero) = &self.hero {
            insert_hero(&mut ctx, hero);
        }
        ctx
    }
}

/// Post listings shared by every standalone page.
#[derive(Debug, Clone, Default)]
pub struct Listings {
    /// Published posts, newest first.
    pub published: Vec<Arc<Post>>,

    /// First N published posts.
    pub latest: Vec<Arc<Post>>,

    /// Remaining published posts.
    pub older: Vec<Arc<Post>>,
}

/// Dates as shown on the site, e.g. `1 April 2023`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%-d %B %Y").to_string()
}

/// Variables available to every layout.
#[must_use]
pub fn site_context(config: &Config, mode: BuildMode) -> TemplateContext {
    TemplateContext::new()
        .with_var("site_title", config.site.title.as_str())
        .with_var(
            "site_description",
            config.site.description.clone().unwrap_or_default(),
        )
        .with_var("base_url", config.site.base_url.trim_end_matches('/'))
        .with_var("watch_mode", mode.is_watch())
}

fn insert_hero(ctx: &mut TemplateContext, hero: &HeroImage) {
    ctx.insert("hero_url", hero.url.as_str());
    ctx.insert("hero_alt", hero.alt.as_str());
    ctx.insert("hero_author", hero.author_name.as_str());
    ctx.insert("hero_author_url", hero.author_url.as_str());
    ctx.insert("hero_page_url", hero.page_url.as_str());
}

/// Scalar front-matter fields beyond the known ones.
fn insert_extra(ctx: &mut TemplateContext, metadata: &PostMetadata) {
    for (key, value) in &metadata.extra {
        if ctx.contains(key) {
            continue;
        }
        let text = match value {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => {
                ctx.insert(key.as_str(), *b);
                continue;
            }
            _ => continue,
        };
        ctx.insert(key.as_str(), text);
    }
}

/// Renders markdown posts into their layouts.
#[derive(Debug)]
pub struct PostTransform {
    config: Arc<Config>,
    parser: MarkdownParser,
    engine: Arc<TemplateEngine>,
    hero: HeroClient,
    mode: BuildMode,
}

impl PostTransform {
    /// Create a post transform over a frozen engine.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        parser: MarkdownParser,
        engine: Arc<TemplateEngine>,
        hero: HeroClient,
        mode: BuildMode,
    ) -> Self {
        Self {
            config,
            parser,
            engine,
            hero,
            mode,
        }
    }

    /// Render one post.
    pub async fn render(&self, artifact: SourceArtifact) -> Result<Post> {
        let path = artifact.path;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BuildError::format(&path, "post file name is not UTF-8"))?;
        let (name, file_date) = PostName::parse(stem)
            .and_then(|name| name.date.map(|date| (name, date)))
            .ok_or_else(|| {
                BuildError::format(
                    &path,
                    format!("post file name '{stem}' does not match YYYY-MM-DD-slug"),
                )
            })?;

        let content = String::from_utf8(artifact.bytes)
            .map_err(|_| BuildError::format(&path, "post is not valid UTF-8"))?;
        let parsed = self.parser.parse_post(&content, &path)?;
        let metadata = parsed.metadata;

        if file_date != metadata.date {
            warn!(
                path = %path.display(),
                %file_date,
                metadata_date = %metadata.date,
                "file name date differs from metadata date; using metadata"
            );
        }

        let url_path = post_url_path(metadata.date, &name.slug);
        let file_path = format!("{url_path}.html");

        let hero = match &metadata.hero_image {
            Some(reference) => Some(self.hero.lookup(reference, &path).await?),
            None => None,
        };

        let mut ctx = site_context(&self.config, self.mode);
        ctx.insert("title", metadata.title.as_str());
        ctx.insert("date", format_date(metadata.date));
        ctx.insert("date_iso", metadata.date.to_string());
        ctx.insert("description", metadata.description_or_summary());
        ctx.insert("draft", metadata.draft);
        ctx.insert("url", url_path.as_str());
        ctx.insert("canonical_url", self.config.url_for(&url_path));
        ctx.insert_html("content", parsed.html);
        ctx.insert("toc", toc_context(&parsed.toc));
        if let Some(hero) = &hero {
            insert_hero(&mut ctx, hero);
        }
        insert_extra(&mut ctx, &metadata);

        let html = self.engine.render(&metadata.layout, &ctx)?;

        if metadata.draft {
            if self.mode.is_watch() {
                warn!(
                    url = %format!("http://127.0.0.1:{}{url_path}", self.config.watch.port),
                    "draft blog post"
                );
            } else {
                debug!(url = %url_path, "draft blog post");
            }
        }

        debug!(path = %path.display(), url = %url_path, "rendered post");

        Ok(Post {
            metadata,
            url_path,
            file_path,
            source_path: path,
            html,
            hero,
        })
    }
}

/// Headings as a `toc` list of `level`, `text` and `id` items.
fn toc_context(toc: &[TocEntry]) -> Vec<TemplateContext> {
    toc.iter()
        .map(|entry| {
            TemplateContext::new()
                .with_var("level", entry.level.to_string())
                .with_var("text", entry.text.as_str())
                .with_var("id", entry.id.as_str())
        })
        .collect()
}

/// Renders configured standalone pages.
#[derive(Debug)]
pub struct PageTransform {
    config: Arc<Config>,
    engine: Arc<TemplateEngine>,
    mode: BuildMode,
}

impl PageTransform {
    /// Create a page transform over a frozen engine.
    #[must_use]
    pub fn new(config: Arc<Config>, engine: Arc<TemplateEngine>, mode: BuildMode) -> Self {
        Self {
            config,
            engine,
            mode,
        }
    }

    /// Render one page against the complete listings.
    pub fn render(&self, page: &PageConfig, listings: &Listings) -> Result<OutputFile> {
        let summaries = |posts: &[Arc<Post>]| -> Vec<TemplateContext> {
            posts
                .iter()
                .map(|p| p.summary_context(&self.config))
                .collect()
        };

        let mut ctx = site_context(&self.config, self.mode);
        ctx.insert("title", page.title.as_str());
        ctx.insert("url", page.url.as_str());
        ctx.insert("canonical_url", self.config.url_for(&page.url));
        ctx.insert("published_posts", summaries(&listings.published));
        ctx.insert("latest_posts", summaries(&listings.latest));
        ctx.insert("older_posts", summaries(&listings.older));

        let html = self.engine.render(&page.layout, &ctx)?;
        debug!(url = %page.url, layout = %page.layout, "rendered page");

        Ok(OutputFile::rendered(
            &page.url,
            &page.url,
            html_file_path(&page.url),
            html,
        ))
    }
}
