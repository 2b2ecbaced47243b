//! Static asset processing and fingerprinting.
//!
//! Stylesheets are post-processed, files carrying the hash marker get a
//! content-derived name for cache busting, everything else is copied as-is.

use std::{collections::HashMap, path::Path};

use inkpress_core::{BuildMode, OutputFile};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    discovery::AssetEntry,
    error::{BuildError, Result},
    stylesheet,
    template::AssetResolver,
};

/// Marker in file names requesting a fingerprint.
pub const DEFAULT_HASH_MARKER: &str = ".HASH";

/// Hex characters of the digest kept in fingerprinted names.
pub const FINGERPRINT_LEN: usize = 10;

/// Short content hash: the first [`FINGERPRINT_LEN`] hex characters of SHA-256.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..FINGERPRINT_LEN].to_string()
}

/// Splices a content hash into logical paths.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    marker: String,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_MARKER)
    }
}

impl Fingerprinter {
    /// Create a fingerprinter removing `marker` from names.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Path with the content hash placed before the extension.
    ///
    /// `/css/site.HASH.css` becomes `/css/site.<hash>.css`.
    #[must_use]
    pub fn fingerprint(&self, bytes: &[u8], logical_path: &str) -> String {
        let hash = content_hash(bytes);
        let name_start = logical_path.rfind('/').map_or(0, |i| i + 1);

        let (base, ext) = match logical_path[name_start..].rfind('.') {
            Some(dot) if dot > 0 => logical_path.split_at(name_start + dot),
            _ => (logical_path, ""),
        };
        let base = base.strip_suffix(self.marker.as_str()).unwrap_or(base);

        format!("{base}.{hash}{ext}")
    }
}

/// `fingerprint` with the default marker.
#[must_use]
pub fn fingerprint(bytes: &[u8], logical_path: &str) -> String {
    Fingerprinter::default().fingerprint(bytes, logical_path)
}

/// Mapping from asset key to public URL, consulted by the `asset` helper.
#[derive(Debug, Clone, Default)]
pub struct AssetManifest {
    assets: HashMap<String, String>,
}

impl AssetManifest {
    /// Create a new empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset to the manifest.
    pub fn add(&mut self, key: impl Into<String>, url_path: impl Into<String>) {
        self.assets.insert(key.into(), url_path.into());
    }

    /// Get the public URL for an asset key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.assets.get(key).map(String::as_str)
    }

    /// Number of known assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether no assets are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetResolver for AssetManifest {
    fn resolve(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }
}

impl<'a> FromIterator<&'a OutputFile> for AssetManifest {
    fn from_iter<I: IntoIterator<Item = &'a OutputFile>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for file in iter {
            manifest.add(file.key.clone(), file.url_path.clone());
        }
        manifest
    }
}

/// Turns asset entries into manifest entries.
#[derive(Debug, Clone)]
pub struct AssetProcessor {
    fingerprinter: Fingerprinter,
    mode: BuildMode,
}

impl AssetProcessor {
    /// Create a processor for the given build mode.
    #[must_use]
    pub fn new(mode: BuildMode, marker: impl Into<String>) -> Self {
        Self {
            fingerprinter: Fingerprinter::new(marker),
            mode,
        }
    }

    /// Process one asset.
    ///
    /// Watch mode never fingerprints, so the public path equals the key.
    pub fn process(&self, entry: &AssetEntry) -> Result<OutputFile> {
        let rendered = if is_stylesheet(&entry.path) {
            let source = std::str::from_utf8(&entry.bytes)
                .map_err(|_| BuildError::format(&entry.path, "stylesheet is not valid UTF-8"))?;
            Some(stylesheet::process(&entry.path, source)?)
        } else {
            None
        };

        let url_path = if entry.should_hash && !self.mode.is_watch() {
            let bytes = rendered.as_deref().map_or(entry.bytes.as_slice(), str::as_bytes);
            self.fingerprinter.fingerprint(bytes, &entry.key)
        } else {
            entry.key.clone()
        };

        debug!(key = %entry.key, url = %url_path, "processed asset");

        Ok(match rendered {
            Some(css) => OutputFile::rendered(&entry.key, &url_path, &url_path, css),
            None => OutputFile::passthrough(&entry.key, &url_path, &url_path, &entry.path),
        })
    }
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("css")
}
