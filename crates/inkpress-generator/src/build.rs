//! Build orchestration.
//!
//! [`Assembler::assemble`] turns the source tree into one immutable
//! [`BuildContext`]. The phases run in a fixed order: templates, static
//! assets, posts, listings, pages and sitemap. Within a phase every item is
//! processed concurrently and the first failure aborts the rest.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use inkpress_core::{BuildMode, Config, OutputFile, SourceArtifact, SourceKind};
use inkpress_parser::MarkdownParser;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::{
    assets::{AssetManifest, AssetProcessor},
    discovery::{SourceFilter, SourceManifest, discover},
    error::{BuildError, Result},
    hero::HeroClient,
    sitemap::SitemapGenerator,
    template::TemplateEngine,
    transform::{Listings, PageTransform, Post, PostTransform},
};

/// Build statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Manifest entries.
    pub files: usize,

    /// Posts rendered, drafts included.
    pub posts: usize,

    /// Published posts.
    pub published: usize,

    /// Static assets processed.
    pub assets: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// The result of one assembly.
#[derive(Debug, Clone)]
pub struct BuildContext {
    manifest: Vec<OutputFile>,
    by_url: HashMap<String, usize>,
    listings: Listings,
    mode: BuildMode,
    stats: BuildStats,
}

impl BuildContext {
    /// Build a context, rejecting duplicate keys.
    pub fn new(
        manifest: Vec<OutputFile>,
        listings: Listings,
        mode: BuildMode,
        stats: BuildStats,
    ) -> Result<Self> {
        let mut keys = HashSet::with_capacity(manifest.len());
        for file in &manifest {
            if !keys.insert(file.key.as_str()) {
                return Err(BuildError::DuplicateKey(file.key.clone()));
            }
        }

        let by_url = manifest
            .iter()
            .enumerate()
            .map(|(i, f)| (f.url_path.clone(), i))
            .collect();

        Ok(Self {
            manifest,
            by_url,
            listings,
            mode,
            stats,
        })
    }

    /// Every output entry.
    #[must_use]
    pub fn manifest(&self) -> &[OutputFile] {
        &self.manifest
    }

    /// Entry whose public URL is exactly `url_path`.
    #[must_use]
    pub fn find(&self, url_path: &str) -> Option<&OutputFile> {
        self.by_url.get(url_path).map(|&i| &self.manifest[i])
    }

    /// Published posts, newest first.
    #[must_use]
    pub fn published_posts(&self) -> &[Arc<Post>] {
        &self.listings.published
    }

    /// The first N published posts.
    #[must_use]
    pub fn latest_posts(&self) -> &[Arc<Post>] {
        &self.listings.latest
    }

    /// Published posts after the latest N.
    #[must_use]
    pub fn older_posts(&self) -> &[Arc<Post>] {
        &self.listings.older
    }

    /// Mode this context was assembled for.
    #[must_use]
    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Counters for logging and `check`.
    #[must_use]
    pub fn stats(&self) -> BuildStats {
        self.stats
    }
}

/// Order posts for listings: date descending, then title ascending.
pub fn sort_posts(posts: &mut [Arc<Post>]) {
    posts.sort_by(|a, b| {
        b.metadata
            .date
            .cmp(&a.metadata.date)
            .then_with(|| a.metadata.title.cmp(&b.metadata.title))
    });
}

/// Drop drafts, sort, and split into latest and older.
#[must_use]
pub fn derive_listings(posts: &[Arc<Post>], latest: usize) -> Listings {
    let mut published: Vec<_> = posts
        .iter()
        .filter(|p| !p.metadata.draft)
        .cloned()
        .collect();
    sort_posts(&mut published);

    let split = latest.min(published.len());
    Listings {
        latest: published[..split].to_vec(),
        older: published[split..].to_vec(),
        published,
    }
}

/// Assembles build contexts from the source tree.
#[derive(Debug, Clone)]
pub struct Assembler {
    config: Arc<Config>,
    parser: MarkdownParser,
    hero: HeroClient,
}

impl Assembler {
    /// Create an assembler. Fails on an unknown syntax theme.
    pub fn new(config: Config) -> Result<Self> {
        let parser = inkpress_parser::markdown_with_theme(&config.build.syntax_theme)?
            .with_image_root(config.paths.statics());
        let hero = HeroClient::from_config(&config.hero)?;
        Ok(Self {
            config: Arc::new(config),
            parser,
            hero,
        })
    }

    /// Replace the hero image client.
    #[must_use]
    pub fn with_hero_client(mut self, hero: HeroClient) -> Self {
        self.hero = hero;
        self
    }

    /// Site configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one full assembly.
    #[instrument(skip(self), fields(source = %self.config.paths.source_dir.display()))]
    pub async fn assemble(&self, mode: BuildMode) -> Result<BuildContext> {
        let start = Instant::now();
        info!(?mode, "assembling build context");

        // 1. Templates, partials included, before anything renders.
        let (templates, statics) = tokio::try_join!(
            self.discover(self.config.paths.templates(), self.template_filter()),
            self.discover(self.config.paths.statics(), self.static_filter()),
        )?;
        let sources = SourceManifest::classify(&self.config, templates, statics)?;

        let mut engine = TemplateEngine::new();
        for entry in sources.templates.iter().filter(|t| t.is_partial) {
            engine.register_partial(&entry.name, &entry.source)?;
        }
        for entry in sources.templates.iter().filter(|t| !t.is_partial) {
            engine.register_layout(&entry.name, &entry.source)?;
        }
        let (layouts, partials) = engine.counts();
        debug!(layouts, partials, "registered templates");

        // 2. Static assets, then the resolver behind the asset helper.
        let assets = self.process_assets(sources.assets, mode).await?;
        engine.set_asset_resolver(Arc::new(assets.iter().collect::<AssetManifest>()));
        let engine = Arc::new(engine);

        // 3. Posts.
        let posts = self.render_posts(engine.clone(), mode).await?;

        // 4. Listings.
        let listings = derive_listings(&posts, self.config.build.latest_posts);

        // 5. Pages and sitemap against the complete context.
        let pages = PageTransform::new(self.config.clone(), engine, mode);
        let mut manifest = assets;
        let asset_count = manifest.len();
        manifest.extend(posts.iter().map(|p| p.output_file()));
        for page in &self.config.pages {
            manifest.push(pages.render(page, &listings)?);
        }
        let sitemap = SitemapGenerator::new(&self.config);
        manifest.push(sitemap.generate(listings.published.iter().map(Arc::as_ref)));

        // 6. Nothing is observable before this point.
        let stats = BuildStats {
            files: manifest.len(),
            posts: posts.len(),
            published: listings.published.len(),
            assets: asset_count,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        let context = BuildContext::new(manifest, listings, mode, stats)?;

        info!(
            files = stats.files,
            posts = stats.posts,
            published = stats.published,
            assets = stats.assets,
            duration_ms = stats.duration_ms,
            "built build context"
        );
        Ok(context)
    }

    fn template_filter(&self) -> SourceFilter {
        SourceFilter::new(SourceKind::Template).with_extension(&self.config.templates.extension)
    }

    fn static_filter(&self) -> SourceFilter {
        SourceFilter::new(SourceKind::StaticAsset).excluding(self.config.assets.excluded.clone())
    }

    async fn discover(&self, root: PathBuf, filter: SourceFilter) -> Result<Vec<SourceArtifact>> {
        tokio::task::spawn_blocking(move || discover(&root, &filter)).await?
    }

    async fn process_assets(
        &self,
        entries: Vec<crate::discovery::AssetEntry>,
        mode: BuildMode,
    ) -> Result<Vec<OutputFile>> {
        let processor = AssetProcessor::new(mode, self.config.assets.hash_marker.clone());
        let mut join_set = JoinSet::new();

        for entry in entries {
            let processor = processor.clone();
            join_set.spawn_blocking(move || processor.process(&entry));
        }

        let mut outputs = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            outputs.push(joined??);
        }

        debug!(count = outputs.len(), "processed static assets");
        Ok(outputs)
    }

    async fn render_posts(
        &self,
        engine: Arc<TemplateEngine>,
        mode: BuildMode,
    ) -> Result<Vec<Arc<Post>>> {
        let filter = SourceFilter::new(SourceKind::Post).with_extension("md");
        let artifacts = self.discover(self.config.paths.posts(), filter).await?;

        let transform = Arc::new(PostTransform::new(
            self.config.clone(),
            self.parser.clone(),
            engine,
            self.hero.clone(),
            mode,
        ));

        let mut join_set = JoinSet::new();
        for artifact in artifacts {
            let transform = transform.clone();
            join_set.spawn(async move { transform.render(artifact).await });
        }

        let mut posts = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            posts.push(Arc::new(joined??));
        }

        debug!(count = posts.len(), "rendered posts");
        Ok(posts)
    }
}
