//! inkpress Core Library
//!
//! Core types, configuration, and error handling for the inkpress static site generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;

pub use config::Config;
pub use content::{BuildMode, OutputBody, OutputFile, PostName, SourceArtifact, SourceKind};
pub use error::{CoreError, Result};
pub use frontmatter::{HeroImageRef, PostMetadata};
