//! Source discovery and classification.
//!
//! [`discover`] walks one source subtree and reads every matching file.
//! [`SourceManifest::classify`] turns the raw artifacts into explicit
//! template and asset records, so naming conventions live only here.

use std::path::{Path, PathBuf};

use inkpress_core::{Config, SourceArtifact, SourceKind};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BuildError, Result};

/// Predicate deciding which files under a root are yielded.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    kind: SourceKind,
    extension: Option<String>,
    excluded: Vec<String>,
}

impl SourceFilter {
    /// Accept every regular file, tagging it with `kind`.
    #[must_use]
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            extension: None,
            excluded: Vec::new(),
        }
    }

    /// Only accept files with this extension (without the dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Reject files with these exact names.
    #[must_use]
    pub fn excluding(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether `path` passes the filter.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if self.excluded.iter().any(|e| e == name) {
            return false;
        }

        match &self.extension {
            Some(ext) => path.extension().and_then(|e| e.to_str()) == Some(ext.as_str()),
            None => true,
        }
    }
}

/// Recursively read every regular file under `root` accepted by `filter`.
///
/// Any unreadable entry fails the whole call. Order is unspecified.
pub fn discover(root: &Path, filter: &SourceFilter) -> Result<Vec<SourceArtifact>> {
    let mut artifacts = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            BuildError::io(path, source)
        })?;

        if !entry.file_type().is_file() || !filter.accepts(entry.path()) {
            continue;
        }

        let bytes = std::fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
        debug!(path = %entry.path().display(), kind = ?filter.kind, "discovered");
        artifacts.push(SourceArtifact::new(entry.path(), filter.kind, bytes));
    }

    Ok(artifacts)
}

/// A layout or partial ready for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Source file.
    pub path: PathBuf,

    /// Registration name, without extension or partial prefix.
    pub name: String,

    /// Whether this registers as a partial.
    pub is_partial: bool,

    /// Template source.
    pub source: String,
}

/// A static file ready for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Source file.
    pub path: PathBuf,

    /// Logical key: `/` plus the path below the static root.
    pub key: String,

    /// Whether the public path is fingerprinted.
    pub should_hash: bool,

    /// File content.
    pub bytes: Vec<u8>,
}

/// Templates and assets of one assembly, classified.
#[derive(Debug, Clone, Default)]
pub struct SourceManifest {
    /// Layouts and partials.
    pub templates: Vec<TemplateEntry>,

    /// Static files.
    pub assets: Vec<AssetEntry>,
}

impl SourceManifest {
    /// Classify discovered templates and static files.
    pub fn classify(
        config: &Config,
        templates: Vec<SourceArtifact>,
        assets: Vec<SourceArtifact>,
    ) -> Result<Self> {
        let templates_root = config.paths.templates();
        let static_root = config.paths.statics();
        let prefix = config.templates.partial_prefix.as_str();

        let templates = templates
            .into_iter()
            .map(|artifact| {
                let stem = artifact.stem().ok_or_else(|| {
                    BuildError::format(&artifact.path, "template name is not UTF-8")
                })?;
                let relative = artifact
                    .relative_to(&templates_root)
                    .unwrap_or_else(|| stem.to_string());

                let stripped = stem.strip_prefix(prefix).filter(|_| !prefix.is_empty());
                let (name, is_partial) = match stripped {
                    Some(stripped) => (stripped.to_string(), true),
                    None => {
                        let listed = config
                            .templates
                            .partials
                            .iter()
                            .any(|p| p == stem || *p == relative);
                        (stem.to_string(), listed)
                    }
                };

                let source = String::from_utf8(artifact.bytes).map_err(|_| {
                    BuildError::format(&artifact.path, "template is not valid UTF-8")
                })?;

                Ok(TemplateEntry {
                    path: artifact.path,
                    name,
                    is_partial,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let marker = config.assets.hash_marker.as_str();
        let assets = assets
            .into_iter()
            .map(|artifact| {
                let relative = artifact.relative_to(&static_root).ok_or_else(|| {
                    BuildError::format(
                        &artifact.path,
                        "static file is outside the static directory",
                    )
                })?;
                let key = format!("/{relative}");
                let should_hash = has_marker(&key, marker)
                    || config.assets.hashed.iter().any(|h| *h == key);

                Ok(AssetEntry {
                    path: artifact.path,
                    key,
                    should_hash,
                    bytes: artifact.bytes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { templates, assets })
    }
}

/// Whether the file name carries `marker` directly before its extension.
fn has_marker(key: &str, marker: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].ends_with(marker),
        _ => false,
    }
}
