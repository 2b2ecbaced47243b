//! Inkpress Generator Library
//!
//! Build pipeline for the inkpress static site generator.
//!
//! # Modules
//!
//! - [`discovery`] - Source walking and classification
//! - [`template`] - Layout and partial engine
//! - [`assets`] - Static asset processing with fingerprinting
//! - [`stylesheet`] - CSS import inlining, variables, prefixes, minification
//! - [`hero`] - Hero image lookup
//! - [`retry`] - Bounded retry combinator
//! - [`transform`] - Post and page rendering
//! - [`sitemap`] - Plain-text sitemap
//! - [`build`] - Build orchestration
//! - [`materialize`] - Writing a build to disk

pub mod assets;
pub mod build;
pub mod discovery;
pub mod error;
pub mod hero;
pub mod materialize;
pub mod retry;
pub mod sitemap;
pub mod stylesheet;
pub mod template;
pub mod transform;

pub use assets::{AssetManifest, AssetProcessor, Fingerprinter, fingerprint};
pub use build::{Assembler, BuildContext, BuildStats};
pub use discovery::{AssetEntry, SourceFilter, SourceManifest, TemplateEntry, discover};
pub use error::{BuildError, Result};
pub use hero::{HeroClient, HeroImage, LookupError};
pub use materialize::write_manifest;
pub use retry::{RetryPolicy, retry};
pub use sitemap::SitemapGenerator;
pub use template::{TemplateContext, TemplateEngine, TemplateError};
pub use transform::{Listings, PageTransform, Post, PostTransform};
