//! Encoder backends — the pluggable strategies that turn a source bitmap
//! into WebP bytes.
//!
//! | Backend | Name in config | Mechanism |
//! |---|---|---|
//! | [`BitmapEncoder`] | `gd` | in-process: `image` crate decode + libwebp encode |
//! | [`CwebpEncoder`] | `cwebp` | external `cwebp` binary |
//! | [`FfmpegEncoder`] | `ffmpeg` | external `ffmpeg` binary |
//! | [`ImagickEncoder`] | `imagick` | external ImageMagick `convert` |
//! | [`GmagickEncoder`] | `gmagick` | external GraphicsMagick `gm convert` |
//!
//! Every backend implements the single-operation [`WebpEncoder`] trait so the
//! engine stays backend-agnostic and tests can substitute a recording mock.
//! Backends are stateless; the [`BackendRegistry`] owns one instance of each
//! and is built once at startup, then handed to the engine — no ambient
//! global lookup.

mod bitmap;
mod process;

pub use bitmap::BitmapEncoder;
pub use process::{CwebpEncoder, FfmpegEncoder, GmagickEncoder, ImagickEncoder};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    EncoderExit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
}

/// The five encoder strategies, keyed by their configuration names.
///
/// `gd` is the historical name of the in-process bitmap re-encode (the
/// library default of the system this replaces); it maps to [`Bitmap`].
///
/// [`Bitmap`]: BackendKind::Bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendKind {
    #[default]
    Bitmap,
    Cwebp,
    Ffmpeg,
    Imagick,
    Gmagick,
}

impl BackendKind {
    /// Map a configuration string to a backend. Empty or unrecognized values
    /// degrade to the default in-process backend.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cwebp" => Self::Cwebp,
            "ffmpeg" => Self::Ffmpeg,
            "imagick" => Self::Imagick,
            "gmagick" => Self::Gmagick,
            _ => Self::Bitmap,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bitmap => "gd",
            Self::Cwebp => "cwebp",
            Self::Ffmpeg => "ffmpeg",
            Self::Imagick => "imagick",
            Self::Gmagick => "gmagick",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for WebP encoder backends.
///
/// One operation: re-encode `source` into a WebP file at `dest` with the
/// given quality. Implementations must be stateless and `Sync` so a single
/// registry instance can serve every conversion.
pub trait WebpEncoder: Send + Sync {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError>;
}

/// Explicit backend registry, built once and passed to the engine.
///
/// Selection falls back to the default kind when the requested backend was
/// never registered, mirroring how unrecognized configuration values degrade.
pub struct BackendRegistry {
    encoders: BTreeMap<BackendKind, Box<dyn WebpEncoder>>,
}

impl BackendRegistry {
    /// An empty registry. Useful for tests that register a single mock.
    pub fn new() -> Self {
        Self {
            encoders: BTreeMap::new(),
        }
    }

    /// Registry with all five production encoders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(BackendKind::Bitmap, Box::new(BitmapEncoder::new()));
        registry.register(BackendKind::Cwebp, Box::new(CwebpEncoder::new()));
        registry.register(BackendKind::Ffmpeg, Box::new(FfmpegEncoder::new()));
        registry.register(BackendKind::Imagick, Box::new(ImagickEncoder::new()));
        registry.register(BackendKind::Gmagick, Box::new(GmagickEncoder::new()));
        registry
    }

    pub fn register(&mut self, kind: BackendKind, encoder: Box<dyn WebpEncoder>) {
        self.encoders.insert(kind, encoder);
    }

    /// Look up an encoder, falling back to the default kind.
    pub fn select(&self, kind: BackendKind) -> Option<&dyn WebpEncoder> {
        self.encoders
            .get(&kind)
            .or_else(|| self.encoders.get(&BackendKind::default()))
            .map(Box::as_ref)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
