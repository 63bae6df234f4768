//! In-process bitmap re-encode backend.
//!
//! Decodes the source with the `image` crate (pure Rust JPEG/PNG decoders)
//! and encodes lossy WebP with libwebp via the `webp` crate. The `image`
//! crate's own WebP encoder is lossless-only and ignores quality, which is
//! why the two crates are paired here.

use super::{BackendError, WebpEncoder};
use image::ImageReader;
use std::path::Path;

/// The default backend: no external binaries, statically linked.
pub struct BitmapEncoder;

impl BitmapEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BitmapEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpEncoder for BitmapEncoder {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError> {
        let img = ImageReader::open(source)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::EncodingFailed(format!(
                    "failed to decode {}: {e}",
                    source.display()
                ))
            })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let encoded = webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode(f32::from(quality));
        std::fs::write(dest, &*encoded)?;
        Ok(())
    }
}
