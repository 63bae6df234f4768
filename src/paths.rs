//! Path resolution for source images and their derived WebP siblings.
//!
//! Everything in this module is pure path/string computation — no I/O. The
//! engine owns the existence checks; this module only answers two questions:
//!
//! 1. Where does a public upload URL live on disk? ([`UploadBase::resolve_source`])
//! 2. Where does the derived `.webp` go? ([`derive_destination`])
//!
//! ## Naming convention
//!
//! The derived file is always a sibling of the source with the final
//! extension swapped for `webp`:
//!
//! ```text
//! /var/www/u/2024/01/sample.jpeg  →  /var/www/u/2024/01/sample.webp
//! https://host/u/2024/01/sample.jpeg  →  https://host/u/2024/01/sample.webp
//! ```
//!
//! The swap is a strict final-extension replacement. Sources without any
//! extension gain a `.webp` suffix. This is deliberately stricter than a
//! first-occurrence substring replace, which corrupts paths whose directory
//! names contain the extension (e.g. `/u/a.jpg.d/a.jpg`).

use std::path::{Path, PathBuf};

/// Maps the public upload URL prefix to the local upload directory.
///
/// Built once at startup from host configuration and handed to the
/// [`ConversionEngine`](crate::engine::ConversionEngine) by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBase {
    base_url: String,
    base_dir: PathBuf,
}

impl UploadBase {
    /// Create an upload base. Trailing slashes on either side are ignored.
    pub fn new(base_url: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            base_dir: base_dir.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a source URL to its absolute on-disk path.
    ///
    /// When the host already knows the attached file's absolute path it is
    /// used verbatim. Otherwise the public base-URL prefix is substituted
    /// with the local base directory. URLs outside the upload base (or empty
    /// ones) do not resolve.
    pub fn resolve_source(&self, url: &str, known_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(known) = known_path {
            if known.as_os_str().is_empty() {
                return None;
            }
            return Some(known.to_path_buf());
        }

        let rest = url.strip_prefix(&self.base_url)?;
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return None;
        }
        Some(self.base_dir.join(rest))
    }

    /// Map an absolute path under the base directory back to its public URL.
    pub fn to_public_url(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.base_dir).ok()?;
        let rest = rest.to_str()?;
        Some(format!("{}/{}", self.base_url, rest.replace('\\', "/")))
    }
}

/// The deterministic destination pair for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPath {
    /// Absolute filesystem path of the WebP sibling.
    pub absolute: PathBuf,
    /// Public URL of the WebP sibling.
    pub public: String,
}

/// Compute the WebP sibling path for an absolute source path.
pub fn webp_sibling(source: &Path) -> PathBuf {
    let mut dest = source.to_path_buf();
    dest.set_extension("webp");
    dest
}

/// Swap the final extension of a URL's last segment for `webp`.
///
/// Only the last path segment is inspected, so dots in directory names are
/// untouched. Segments without a dot gain a `.webp` suffix.
pub fn webp_url(url: &str) -> String {
    let segment_start = url.rfind('/').map_or(0, |i| i + 1);
    match url[segment_start..].rfind('.') {
        Some(dot) => format!("{}.webp", &url[..segment_start + dot]),
        None => format!("{url}.webp"),
    }
}

/// Derive the destination pair from a resolved source path and its URL.
///
/// Same input always maps to the same output; idempotent naming is what
/// makes the engine's existence short-circuit safe to rely on.
pub fn derive_destination(abs_source: &Path, source_url: &str) -> DerivedPath {
    DerivedPath {
        absolute: webp_sibling(abs_source),
        public: webp_url(source_url),
    }
}
