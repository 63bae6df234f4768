//! The conversion engine — backend-agnostic orchestration of one
//! source-to-WebP conversion.
//!
//! Each call to [`ConversionEngine::convert`] walks a fixed sequence, no
//! retries, no state carried between calls:
//!
//! ```text
//! resolve source → derive destination → validate type →
//! short-circuit on existing destination → resolve options → encode
//! ```
//!
//! Every failure is captured at its boundary and returned as a
//! [`ConversionError`] — nothing escapes as a panic or an unmapped backend
//! fault. The engine holds no per-request state; the source is a parameter,
//! so concurrent calls on different sources cannot interfere.
//!
//! ## Existence short-circuit
//!
//! If the destination file already exists the engine returns its public URL
//! without touching the backend. The check is purely path-based — a stale or
//! corrupted destination is treated as valid and never re-encoded. That makes
//! repeated conversion requests cheap and side-effect-free, at the cost of
//! never detecting staleness.

use crate::backend::{BackendKind, BackendRegistry};
use crate::config::Settings;
use crate::options::{self, OptionsFilter};
use crate::paths::{self, UploadBase};
use crate::types::ImageSource;
use image::{ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Terminal failure of one conversion. Detail strings are data for logging,
/// never control flow.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("{} does not exist", .path.display())]
    SourceNotFound { path: PathBuf },
    #[error("{} is not an image", .path.display())]
    NotAnImage { path: PathBuf },
    #[error("{backend} encoder failed: {detail}")]
    Encode {
        backend: BackendKind,
        detail: String,
    },
}

/// Stateless conversion orchestrator.
///
/// Built once at startup with an [`UploadBase`], a [`BackendRegistry`] and
/// the stored [`Settings`]; every per-call input arrives as a parameter.
pub struct ConversionEngine {
    base: UploadBase,
    registry: BackendRegistry,
    settings: Settings,
    filter: Option<OptionsFilter>,
}

impl ConversionEngine {
    pub fn new(base: UploadBase, registry: BackendRegistry, settings: Settings) -> Self {
        Self {
            base,
            registry,
            settings,
            filter: None,
        }
    }

    /// Install an options filter hook, applied once per conversion.
    pub fn with_options_filter(mut self, filter: OptionsFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn upload_base(&self) -> &UploadBase {
        &self.base
    }

    /// Convert one source image, resolving its on-disk path from the URL.
    ///
    /// Returns the public URL of the derived WebP file.
    pub fn convert(&self, source: &ImageSource) -> Result<String, ConversionError> {
        self.convert_at(source, None)
    }

    /// Convert one source image with a host-supplied absolute path.
    ///
    /// The known path takes precedence over URL-based resolution; the URL is
    /// still used to derive the public destination.
    pub fn convert_at(
        &self,
        source: &ImageSource,
        known_path: Option<&Path>,
    ) -> Result<String, ConversionError> {
        // 1. Resolve source.
        let abs_source = self
            .base
            .resolve_source(&source.url, known_path)
            .ok_or_else(|| ConversionError::SourceNotFound {
                path: PathBuf::from(&source.url),
            })?;

        // 2. Derive destination (pure, never fails).
        let dest = paths::derive_destination(&abs_source, &source.url);

        // 3. Validate the source exists and is a supported raster image.
        if !abs_source.is_file() {
            return Err(ConversionError::SourceNotFound { path: abs_source });
        }
        match sniff_format(&abs_source) {
            Ok(Some(ImageFormat::Jpeg | ImageFormat::Png)) => {}
            Ok(_) => {
                return Err(ConversionError::NotAnImage { path: abs_source });
            }
            // The file vanished or became unreadable between the checks.
            Err(_) => {
                return Err(ConversionError::SourceNotFound { path: abs_source });
            }
        }

        // 4. Short-circuit if the destination already exists.
        if dest.absolute.is_file() {
            debug!(dest = %dest.absolute.display(), "destination exists, skipping encode");
            return Ok(dest.public);
        }

        // 5. Resolve options (recomputed per call).
        let options = options::resolve(&self.settings, self.filter.as_ref());

        // 6. Encode via the selected backend.
        let encoder = self.registry.select(options.backend).ok_or_else(|| {
            ConversionError::Encode {
                backend: options.backend,
                detail: "no encoder registered".to_string(),
            }
        })?;

        debug!(
            source = %abs_source.display(),
            dest = %dest.absolute.display(),
            backend = %options.backend,
            quality = options.quality,
            "encoding"
        );

        if let Err(e) = encoder.encode(&abs_source, &dest.absolute, options.quality) {
            warn!(source = %abs_source.display(), error = %e, "conversion failed");
            return Err(ConversionError::Encode {
                backend: options.backend,
                detail: e.to_string(),
            });
        }

        Ok(dest.public)
    }
}

/// Content-sniff the image format from the file's magic bytes.
///
/// Extension is ignored on purpose: a `.jpg` that holds text must fail the
/// type gate, and a misnamed real JPEG must pass it.
fn sniff_format(path: &Path) -> std::io::Result<Option<ImageFormat>> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.format())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::RecordingEncoder;
    use crate::options::OptionsPatch;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const BASE_URL: &str = "https://example.com/wp-content/uploads";

    // JPEG SOI + APP0 marker: enough for content sniffing without a decoder.
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    struct Fixture {
        tmp: TempDir,
        encoder: Arc<RecordingEncoder>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_encoder(RecordingEncoder::new())
        }

        fn with_encoder(encoder: RecordingEncoder) -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                encoder: Arc::new(encoder),
            }
        }

        fn engine(&self) -> ConversionEngine {
            self.engine_with_settings(Settings::default())
        }

        fn engine_with_settings(&self, settings: Settings) -> ConversionEngine {
            let mut registry = BackendRegistry::new();
            registry.register(BackendKind::Bitmap, Box::new(SharedEncoder(self.encoder.clone())));
            ConversionEngine::new(
                UploadBase::new(BASE_URL, self.tmp.path()),
                registry,
                settings,
            )
        }

        fn write_source(&self, rel: &str, bytes: &[u8]) -> PathBuf {
            let path = self.tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, bytes).unwrap();
            path
        }

        fn source(&self, rel: &str) -> ImageSource {
            ImageSource::new(7, format!("{BASE_URL}/{rel}"))
        }
    }

    /// Adapter so a fixture can keep inspecting the encoder it handed to the
    /// registry.
    struct SharedEncoder(Arc<RecordingEncoder>);

    impl crate::backend::WebpEncoder for SharedEncoder {
        fn encode(
            &self,
            source: &Path,
            dest: &Path,
            quality: u8,
        ) -> Result<(), crate::backend::BackendError> {
            self.0.encode(source, dest, quality)
        }
    }

    #[test]
    fn successful_conversion_returns_public_webp_url() {
        let fx = Fixture::new();
        fx.write_source("2024/01/sample.jpeg", JPEG_MAGIC);

        let url = fx.engine().convert(&fx.source("2024/01/sample.jpeg")).unwrap();

        assert_eq!(url, format!("{BASE_URL}/2024/01/sample.webp"));
        assert!(fx.tmp.path().join("2024/01/sample.webp").is_file());
        let calls = fx.encoder.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].quality, 20);
    }

    #[test]
    fn png_sources_pass_the_type_gate() {
        let fx = Fixture::new();
        fx.write_source("shot.png", PNG_MAGIC);

        let url = fx.engine().convert(&fx.source("shot.png")).unwrap();
        assert_eq!(url, format!("{BASE_URL}/shot.webp"));
    }

    #[test]
    fn unresolvable_url_is_source_not_found_without_backend_call() {
        let fx = Fixture::new();
        let src = ImageSource::new(7, "https://cdn.elsewhere.com/sample.jpeg");

        let err = fx.engine().convert(&src).unwrap_err();
        assert!(matches!(err, ConversionError::SourceNotFound { .. }));
        assert_eq!(fx.encoder.call_count(), 0);
    }

    #[test]
    fn missing_file_is_source_not_found_without_backend_call() {
        let fx = Fixture::new();

        let err = fx.engine().convert(&fx.source("2024/ghost.jpeg")).unwrap_err();
        assert!(matches!(err, ConversionError::SourceNotFound { .. }));
        assert_eq!(fx.encoder.call_count(), 0);
    }

    #[test]
    fn non_image_content_fails_the_type_gate() {
        let fx = Fixture::new();
        // Recognized extension, plain-text content.
        fx.write_source("notes.jpg", b"just some notes\n");

        let err = fx.engine().convert(&fx.source("notes.jpg")).unwrap_err();
        assert!(matches!(err, ConversionError::NotAnImage { .. }));
        assert_eq!(fx.encoder.call_count(), 0);
    }

    #[test]
    fn unsupported_image_format_fails_the_type_gate() {
        let fx = Fixture::new();
        // GIF magic sniffs as an image format, but not a supported one.
        fx.write_source("anim.jpg", b"GIF89a\x01\x00\x01\x00");

        let err = fx.engine().convert(&fx.source("anim.jpg")).unwrap_err();
        assert!(matches!(err, ConversionError::NotAnImage { .. }));
    }

    #[test]
    fn existing_destination_short_circuits_without_encode() {
        let fx = Fixture::new();
        fx.write_source("2024/sample.jpeg", JPEG_MAGIC);
        fx.write_source("2024/sample.webp", b"RIFF\0\0\0\0WEBP");

        let url = fx.engine().convert(&fx.source("2024/sample.jpeg")).unwrap();

        assert_eq!(url, format!("{BASE_URL}/2024/sample.webp"));
        assert_eq!(fx.encoder.call_count(), 0);
    }

    #[test]
    fn repeated_conversion_is_idempotent() {
        let fx = Fixture::new();
        fx.write_source("sample.jpeg", JPEG_MAGIC);
        let engine = fx.engine();
        let src = fx.source("sample.jpeg");

        let first = engine.convert(&src).unwrap();
        let second = engine.convert(&src).unwrap();

        assert_eq!(first, second);
        // The second call hit the existence short-circuit: one encode total.
        assert_eq!(fx.encoder.call_count(), 1);
    }

    #[test]
    fn backend_failure_is_mapped_to_encode_error() {
        let fx = Fixture::with_encoder(RecordingEncoder::failing("corrupt scanline"));
        fx.write_source("bad.jpeg", JPEG_MAGIC);

        let err = fx.engine().convert(&fx.source("bad.jpeg")).unwrap_err();
        match err {
            ConversionError::Encode { backend, detail } => {
                assert_eq!(backend, BackendKind::Bitmap);
                assert!(detail.contains("corrupt scanline"));
            }
            other => panic!("expected Encode error, got {other}"),
        }
    }

    #[test]
    fn empty_registry_is_encode_error_not_panic() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpeg"), JPEG_MAGIC).unwrap();
        let engine = ConversionEngine::new(
            UploadBase::new(BASE_URL, tmp.path()),
            BackendRegistry::new(),
            Settings::default(),
        );

        let err = engine
            .convert(&ImageSource::new(1, format!("{BASE_URL}/a.jpeg")))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Encode { .. }));
    }

    #[test]
    fn known_path_overrides_url_resolution() {
        let fx = Fixture::new();
        let abs = fx.write_source("stored/elsewhere.jpeg", JPEG_MAGIC);
        // URL outside the upload base resolves only via the known path.
        let src = ImageSource::new(3, format!("{BASE_URL}/2024/visible.jpeg"));

        let url = fx.engine().convert_at(&src, Some(&abs)).unwrap();

        assert_eq!(url, format!("{BASE_URL}/2024/visible.webp"));
        assert!(fx.tmp.path().join("stored/elsewhere.webp").is_file());
    }

    #[test]
    fn options_filter_drives_quality_and_backend() {
        let fx = Fixture::new();
        fx.write_source("sample.jpeg", JPEG_MAGIC);
        let filter: OptionsFilter = Box::new(|_| OptionsPatch {
            quality: Some(55),
            backend: None,
        });
        let engine = fx.engine().with_options_filter(filter);

        engine.convert(&fx.source("sample.jpeg")).unwrap();

        assert_eq!(fx.encoder.recorded()[0].quality, 55);
    }

    #[test]
    fn settings_quality_reaches_the_backend() {
        let fx = Fixture::new();
        fx.write_source("sample.jpeg", JPEG_MAGIC);
        let engine = fx.engine_with_settings(Settings {
            quality: 88,
            ..Settings::default()
        });

        engine.convert(&fx.source("sample.jpeg")).unwrap();

        assert_eq!(fx.encoder.recorded()[0].quality, 88);
    }
}
