//! Plain-text sitemap generation.
//!
//! One absolute URL per line: the site root, the blog index, then every
//! published post in listing order.

use inkpress_core::{Config, OutputFile};
use tracing::debug;

use crate::transform::Post;

/// Manifest key and path of the sitemap.
pub const SITEMAP_PATH: &str = "/sitemap.txt";

/// Sitemap generator.
#[derive(Debug, Clone)]
pub struct SitemapGenerator {
    base_url: String,
}

impl SitemapGenerator {
    /// Create a generator for the configured site.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.site.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sitemap URLs for the given published posts.
    pub fn urls<'p>(&self, posts: impl IntoIterator<Item = &'p Post>) -> Vec<String> {
        let mut urls = vec![format!("{}/", self.base_url), format!("{}/blog", self.base_url)];
        urls.extend(posts.into_iter().map(|p| format!("{}{}", self.base_url, p.url_path)));
        urls
    }

    /// Manifest entry for the sitemap.
    pub fn generate<'p>(&self, posts: impl IntoIterator<Item = &'p Post>) -> OutputFile {
        let urls = self.urls(posts);
        debug!(entries = urls.len(), "generated sitemap");
        OutputFile::rendered(SITEMAP_PATH, SITEMAP_PATH, SITEMAP_PATH, urls.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use inkpress_core::{OutputBody, PostMetadata};

    use super::*;

    fn post(url_path: &str) -> Post {
        Post {
            metadata: PostMetadata {
                title: "T".to_string(),
                date: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
                layout: "post".to_string(),
                draft: false,
                description: None,
                summary: None,
                hero_image: None,
                extra: Default::default(),
            },
            url_path: url_path.to_string(),
            file_path: format!("{url_path}.html"),
            source_path: PathBuf::from("p.md"),
            html: String::new(),
            hero: None,
        }
    }

    #[test]
    fn test_generate_sitemap() {
        let config = Config::new("Site", "https://www.example.com/");
        let generator = SitemapGenerator::new(&config);
        let posts = [post("/blog/posts/2023/04/02/b"), post("/blog/posts/2023/04/01/a")];

        let file = generator.generate(posts.iter());

        assert_eq!(file.key, "/sitemap.txt");
        assert_eq!(file.file_path, "/sitemap.txt");
        assert_eq!(
            file.body,
            OutputBody::Rendered(
                "https://www.example.com/\n\
                 https://www.example.com/blog\n\
                 https://www.example.com/blog/posts/2023/04/02/b\n\
                 https://www.example.com/blog/posts/2023/04/01/a"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_empty_sitemap_has_root_and_blog() {
        let config = Config::new("Site", "https://example.com");
        let urls = SitemapGenerator::new(&config).urls(std::iter::empty());
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/blog"]);
    }
}
