//! Site configuration management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Main configuration structure for inkpress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    pub site: SiteConfig,

    /// Source and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Dev server and rebuild scheduling settings.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Template discovery rules.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Static asset rules.
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Standalone pages rendered after all posts.
    #[serde(default = "default_pages")]
    pub pages: Vec<PageConfig>,

    /// External hero-image metadata service.
    #[serde(default)]
    pub hero: HeroConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    pub title: String,

    /// Base URL for the site (e.g., "https://www.example.com").
    pub base_url: String,

    /// Site description for meta tags.
    #[serde(default)]
    pub description: Option<String>,
}

/// Source tree and output locations.
///
/// `posts_dir`, `templates_dir` and `static_dir` are relative to `source_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_posts_dir")]
    pub posts_dir: PathBuf,

    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Number of posts in the "latest" listing.
    #[serde(default = "default_latest_posts")]
    pub latest_posts: usize,

    /// Syntax highlighting theme name.
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,
}

/// Watch mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period required before a rebuild starts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Dev server port.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Template discovery rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// File extension of template files (without the dot).
    #[serde(default = "default_template_extension")]
    pub extension: String,

    /// File name prefix marking a partial.
    #[serde(default = "default_partial_prefix")]
    pub partial_prefix: String,

    /// Additional partials, by file name relative to the templates directory.
    #[serde(default)]
    pub partials: Vec<String>,
}

/// Static asset rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// File name flag requesting a content hash in the output path.
    #[serde(default = "default_hash_marker")]
    pub hash_marker: String,

    /// Additional asset keys (e.g. "/css/site.css") to fingerprint.
    #[serde(default)]
    pub hashed: Vec<String>,

    /// File names never copied from the static tree.
    #[serde(default = "default_excluded")]
    pub excluded: Vec<String>,
}

/// A standalone page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Public URL path ("/", "/blog", ...).
    pub url: String,

    /// Layout template name.
    pub layout: String,

    /// Static page title.
    pub title: String,
}

/// Hero-image lookup service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroConfig {
    /// Base URL of the image metadata API.
    #[serde(default = "default_hero_endpoint")]
    pub endpoint: String,

    /// API access key. Usually supplied through `INKPRESS__HERO__ACCESS_KEY`.
    #[serde(default)]
    pub access_key: Option<String>,

    /// Attempts per lookup before the build fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

// Default value functions
fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_posts_dir() -> PathBuf {
    PathBuf::from("posts")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_latest_posts() -> usize {
    6
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_port() -> u16 {
    8001
}

fn default_template_extension() -> String {
    "html".to_string()
}

fn default_partial_prefix() -> String {
    "_".to_string()
}

fn default_hash_marker() -> String {
    ".HASH".to_string()
}

fn default_excluded() -> Vec<String> {
    vec![".DS_Store".to_string()]
}

fn default_hero_endpoint() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_pages() -> Vec<PageConfig> {
    [
        ("/", "index", "Home"),
        ("/blog", "blog", "Blog"),
        ("/legal", "legal", "Legal"),
        ("/privacy", "privacy", "Privacy"),
    ]
    .into_iter()
    .map(|(url, layout, title)| PageConfig {
        url: url.to_string(),
        layout: layout.to_string(),
        title: title.to_string(),
    })
    .collect()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            posts_dir: default_posts_dir(),
            templates_dir: default_templates_dir(),
            static_dir: default_static_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl PathsConfig {
    /// Directory holding the markdown posts.
    pub fn posts(&self) -> PathBuf {
        self.source_dir.join(&self.posts_dir)
    }

    /// Directory holding layouts and partials.
    pub fn templates(&self) -> PathBuf {
        self.source_dir.join(&self.templates_dir)
    }

    /// Directory mirrored into the output tree.
    pub fn statics(&self) -> PathBuf {
        self.source_dir.join(&self.static_dir)
    }

    /// Re-root every relative path under `root`.
    pub fn rooted_at(&self, root: &Path) -> Self {
        Self {
            source_dir: root.join(&self.source_dir),
            output_dir: root.join(&self.output_dir),
            ..self.clone()
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            latest_posts: default_latest_posts(),
            syntax_theme: default_syntax_theme(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            port: default_port(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            extension: default_template_extension(),
            partial_prefix: default_partial_prefix(),
            partials: Vec::new(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            hash_marker: default_hash_marker(),
            hashed: Vec::new(),
            excluded: default_excluded(),
        }
    }
}

impl Default for HeroConfig {
    fn default() -> Self {
        Self {
            endpoint: default_hero_endpoint(),
            access_key: None,
            max_attempts: default_max_attempts(),
        }
    }
}

impl Config {
    /// Create a configuration with defaults for everything but the site identity.
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            site: SiteConfig {
                title: title.into(),
                base_url: base_url.into(),
                description: None,
            },
            paths: PathsConfig::default(),
            build: BuildConfig::default(),
            watch: WatchConfig::default(),
            templates: TemplatesConfig::default(),
            assets: AssetsConfig::default(),
            pages: default_pages(),
            hero: HeroConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered with `INKPRESS__SECTION__KEY` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("INKPRESS").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.site.title.is_empty() {
            return Err(CoreError::config("site.title cannot be empty"));
        }

        if self.site.base_url.is_empty() {
            return Err(CoreError::config("site.base_url cannot be empty"));
        }

        if self.build.latest_posts == 0 {
            return Err(CoreError::config("build.latest_posts must be at least 1"));
        }

        if self.hero.max_attempts == 0 {
            return Err(CoreError::config("hero.max_attempts must be at least 1"));
        }

        if self.assets.hash_marker.is_empty() {
            return Err(CoreError::config("assets.hash_marker cannot be empty"));
        }

        for page in &self.pages {
            if !page.url.starts_with('/') {
                return Err(CoreError::config(format!(
                    "page url must start with '/': {}",
                    page.url
                )));
            }
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        Ok(())
    }

    /// Get the full URL for a path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.site.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    fn create_test_config() -> String {
        r#"
[site]
title = "Middle Engine"
base_url = "https://www.example.com"

[paths]
source_dir = "content"
output_dir = "dist"

[build]
latest_posts = 4
syntax_theme = "InspiredGitHub"

[watch]
debounce_ms = 250
port = 3000

[templates]
partials = ["footer.html"]

[assets]
hashed = ["/css/site.css"]

[[pages]]
url = "/"
layout = "home"
title = "Welcome"

[hero]
max_attempts = 5
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("site.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.site.title, "Middle Engine");
        assert_eq!(config.paths.source_dir, PathBuf::from("content"));
        assert_eq!(config.paths.posts(), PathBuf::from("content/posts"));
        assert_eq!(config.paths.output_dir, PathBuf::from("dist"));
        assert_eq!(config.build.latest_posts, 4);
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.watch.port, 3000);
        assert_eq!(config.templates.partials, vec!["footer.html"]);
        assert_eq!(config.assets.hashed, vec!["/css/site.css"]);
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.pages[0].layout, "home");
        assert_eq!(config.hero.max_attempts, 5);
        assert!(config.hero.access_key.is_none());
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("site.toml");
        let minimal_config = r#"
[site]
title = "Minimal Site"
base_url = "https://example.com"
"#;
        std::fs::write(&config_path, minimal_config).expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.paths.templates(), PathBuf::from("src/templates"));
        assert_eq!(config.paths.statics(), PathBuf::from("src/static"));
        assert_eq!(config.paths.output_dir, PathBuf::from("build"));
        assert_eq!(config.build.latest_posts, 6);
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.templates.partial_prefix, "_");
        assert_eq!(config.assets.hash_marker, ".HASH");
        assert_eq!(config.assets.excluded, vec![".DS_Store"]);
        assert_eq!(config.hero.max_attempts, 3);

        let urls: Vec<_> = config.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["/", "/blog", "/legal", "/privacy"]);
    }

    #[test]
    #[serial]
    fn test_load_with_env_reads_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("site.toml");
        std::fs::write(&config_path, create_test_config()).expect("write");

        let config = Config::load_with_env(&config_path).expect("load config");
        assert_eq!(config.site.title, "Middle Engine");
        assert_eq!(config.build.latest_posts, 4);
    }

    #[test]
    #[serial]
    fn test_load_with_env_overrides_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("site.toml");
        std::fs::write(&config_path, create_test_config()).expect("write");

        let config = temp_env::with_vars(
            [
                ("INKPRESS__HERO__ACCESS_KEY", Some("secret-key")),
                ("INKPRESS__SITE__TITLE", Some("Overridden")),
            ],
            || Config::load_with_env(&config_path).expect("load config"),
        );

        assert_eq!(config.hero.access_key.as_deref(), Some("secret-key"));
        assert_eq!(config.site.title, "Overridden");
        assert_eq!(config.build.latest_posts, 4);
    }

    #[test]
    fn test_url_for() {
        let config = Config::new("Test", "https://example.com");

        assert_eq!(
            config.url_for("/blog/posts/2023/04/01/hello"),
            "https://example.com/blog/posts/2023/04/01/hello"
        );
        assert_eq!(config.url_for("blog"), "https://example.com/blog");
        assert_eq!(config.url_for("/"), "https://example.com/");
    }

    #[test]
    fn test_rooted_paths() {
        let paths = PathsConfig::default().rooted_at(Path::new("/site"));
        assert_eq!(paths.posts(), PathBuf::from("/site/src/posts"));
        assert_eq!(paths.output_dir, PathBuf::from("/site/build"));
    }

    #[test]
    fn test_config_validation_empty_title() {
        let config = Config::new("", "https://example.com");
        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("title cannot be empty")
        );
    }

    #[test]
    fn test_config_validation_page_url() {
        let mut config = Config::new("Test", "https://example.com");
        config.pages[0].url = "about".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_attempts() {
        let mut config = Config::new("Test", "https://example.com");
        config.hero.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/site.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
