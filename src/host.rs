//! Host boundary: the CMS-facing trait and the thin trigger adapters.
//!
//! The hosting application owns attachments, their size variants, the
//! metadata store and the error-log store. This module models that boundary
//! as the [`Host`] trait and translates the host's lifecycle events into
//! engine calls:
//!
//! | Host event | Adapter | Gate |
//! |---|---|---|
//! | image added | [`TriggerAdapters::on_attachment_added`] | `upload` |
//! | size variants generated | [`TriggerAdapters::on_metadata_generated`] | `upload` |
//! | attachment deleted | [`TriggerAdapters::on_attachment_deleted`] | — |
//! | page render | [`TriggerAdapters::render_url`] | `page_load` |
//!
//! Adapters fan every conversion outcome out to the metadata recorder and
//! the error logger; failures never propagate past this module — render
//! callers always get a usable URL back.

use crate::engine::{ConversionEngine, ConversionError};
use crate::lifecycle::{
    DeletionCascade, ErrorLogEntry, ErrorLogStore, ErrorLogger, EventSink, MetadataRecorder,
};
use crate::types::{AttachmentId, ImageSource};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The hosting application's attachment store, as seen by this crate.
///
/// Implementations use interior mutability where needed; every method takes
/// `&self` so one host instance can serve engine, reactors and adapters.
pub trait Host {
    /// Public URL of the attachment's main image file.
    fn attachment_url(&self, id: AttachmentId) -> Option<String>;
    /// Absolute on-disk path of the attachment's main image file.
    fn attached_file(&self, id: AttachmentId) -> Option<PathBuf>;
    /// Whether the attachment is an image at all.
    fn is_image(&self, id: AttachmentId) -> bool;
    /// Filenames of the resized copies generated at upload time, all
    /// siblings of the main file.
    fn size_variants(&self, id: AttachmentId) -> Vec<String>;
    /// The recorded WebP URL for this attachment, if any.
    fn webp_meta(&self, id: AttachmentId) -> Option<String>;
    /// Record the WebP URL for this attachment.
    fn set_webp_meta(&self, id: AttachmentId, url: &str);
}

/// Wires host lifecycle events to the engine and the reactors.
pub struct TriggerAdapters<'a> {
    engine: &'a ConversionEngine,
    host: &'a dyn Host,
    logs: &'a dyn ErrorLogStore,
    events: &'a dyn EventSink,
}

impl<'a> TriggerAdapters<'a> {
    pub fn new(
        engine: &'a ConversionEngine,
        host: &'a dyn Host,
        logs: &'a dyn ErrorLogStore,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            engine,
            host,
            logs,
            events,
        }
    }

    /// A new image was added to the media store.
    pub fn on_attachment_added(&self, id: AttachmentId) {
        if !self.engine.settings().convert_on_upload() {
            return;
        }
        let Some(url) = self.host.attachment_url(id) else {
            return;
        };
        let source = ImageSource::new(id, url);
        let known = self.host.attached_file(id);
        let outcome = self.engine.convert_at(&source, known.as_deref());
        self.dispatch(&outcome, id);
    }

    /// The host finished generating size variants for an attachment.
    ///
    /// Each variant is a sibling of the main image, so its URL is the main
    /// URL's directory prefix plus the variant filename.
    pub fn on_metadata_generated(&self, id: AttachmentId) {
        if !self.engine.settings().convert_on_upload() {
            return;
        }
        let Some(url) = self.host.attachment_url(id) else {
            return;
        };
        let Some(prefix) = url.rfind('/').map(|i| &url[..i]) else {
            return;
        };
        for variant in self.host.size_variants(id) {
            let source = ImageSource::new(id, format!("{prefix}/{variant}"));
            let outcome = self.engine.convert(&source);
            self.dispatch(&outcome, id);
        }
    }

    /// The source attachment was deleted; drop its derived files.
    pub fn on_attachment_deleted(&self, id: AttachmentId) {
        DeletionCascade::new(self.host, self.events).on_source_deleted(id);
    }

    /// On-demand conversion during page render.
    ///
    /// Returns the WebP URL when conversion succeeds (or already happened),
    /// and the original URL on any failure — the viewer never sees an error.
    pub fn render_url(&self, id: AttachmentId, url: &str) -> String {
        if !self.engine.settings().convert_on_page_load() {
            return url.to_string();
        }
        let source = ImageSource::new(id, url.to_string());
        let outcome = self.engine.convert(&source);
        self.dispatch(&outcome, id);
        match outcome {
            Ok(webp_url) => webp_url,
            Err(e) => {
                debug!(id, error = %e, "render falls back to original image");
                url.to_string()
            }
        }
    }

    /// Fan one conversion outcome out to the reactors.
    fn dispatch(&self, outcome: &Result<String, ConversionError>, id: AttachmentId) {
        MetadataRecorder::new(self.host).on_converted(self.engine, outcome, id);
        ErrorLogger::new(self.logs, self.engine.settings().log_errors()).on_converted(outcome, id);
    }
}

/// A derived-image deletion signal captured by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    DerivedDeleted { path: PathBuf, id: AttachmentId },
    MetadataDerivedDeleted { path: PathBuf, id: AttachmentId },
}

/// In-memory [`Host`], [`ErrorLogStore`] and [`EventSink`] in one.
///
/// The reference implementation used by the test suite; also handy for
/// embedding the engine without a real CMS behind it.
#[derive(Default)]
pub struct MemoryHost {
    inner: std::sync::Mutex<MemoryHostState>,
}

#[derive(Default)]
struct MemoryHostState {
    attachments: std::collections::BTreeMap<AttachmentId, Attachment>,
    webp_meta: std::collections::BTreeMap<AttachmentId, String>,
    log: Vec<ErrorLogEntry>,
    events: Vec<RecordedEvent>,
}

struct Attachment {
    url: Option<String>,
    file: PathBuf,
    is_image: bool,
    variants: Vec<String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image attachment with its public URL and on-disk path.
    pub fn add_attachment(&self, id: AttachmentId, url: String, file: PathBuf) {
        self.inner.lock().unwrap().attachments.insert(
            id,
            Attachment {
                url: Some(url),
                file,
                is_image: true,
                variants: Vec::new(),
            },
        );
    }

    /// Register a non-image attachment (ignored by the deletion cascade).
    pub fn add_non_image(&self, id: AttachmentId, file: PathBuf) {
        self.inner.lock().unwrap().attachments.insert(
            id,
            Attachment {
                url: None,
                file,
                is_image: false,
                variants: Vec::new(),
            },
        );
    }

    /// Register size-variant filenames for an existing attachment.
    pub fn add_size_variants(&self, id: AttachmentId, names: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(attachment) = inner.attachments.get_mut(&id) {
            attachment
                .variants
                .extend(names.iter().map(|n| n.to_string()));
        }
    }

    pub fn log_entries(&self) -> Vec<ErrorLogEntry> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().unwrap().events.clone()
    }
}

impl Host for MemoryHost {
    fn attachment_url(&self, id: AttachmentId) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .attachments
            .get(&id)
            .and_then(|a| a.url.clone())
    }

    fn attached_file(&self, id: AttachmentId) -> Option<PathBuf> {
        self.inner
            .lock()
            .unwrap()
            .attachments
            .get(&id)
            .map(|a| a.file.clone())
    }

    fn is_image(&self, id: AttachmentId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .attachments
            .get(&id)
            .is_some_and(|a| a.is_image)
    }

    fn size_variants(&self, id: AttachmentId) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .attachments
            .get(&id)
            .map(|a| a.variants.clone())
            .unwrap_or_default()
    }

    fn webp_meta(&self, id: AttachmentId) -> Option<String> {
        self.inner.lock().unwrap().webp_meta.get(&id).cloned()
    }

    fn set_webp_meta(&self, id: AttachmentId, url: &str) {
        self.inner
            .lock()
            .unwrap()
            .webp_meta
            .insert(id, url.to_string());
    }
}

impl ErrorLogStore for MemoryHost {
    fn append(&self, entry: ErrorLogEntry) {
        self.inner.lock().unwrap().log.push(entry);
    }
}

impl EventSink for MemoryHost {
    fn derived_deleted(&self, path: &Path, id: AttachmentId) {
        self.inner.lock().unwrap().events.push(RecordedEvent::DerivedDeleted {
            path: path.to_path_buf(),
            id,
        });
    }

    fn metadata_derived_deleted(&self, path: &Path, id: AttachmentId) {
        self.inner
            .lock()
            .unwrap()
            .events
            .push(RecordedEvent::MetadataDerivedDeleted {
                path: path.to_path_buf(),
                id,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::RecordingEncoder;
    use crate::backend::{BackendKind, BackendRegistry};
    use crate::config::Settings;
    use crate::paths::UploadBase;
    use tempfile::TempDir;

    const BASE_URL: &str = "https://example.com/u";
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

    fn engine(tmp: &TempDir, settings: Settings) -> ConversionEngine {
        let mut registry = BackendRegistry::new();
        registry.register(BackendKind::Bitmap, Box::new(RecordingEncoder::new()));
        ConversionEngine::new(UploadBase::new(BASE_URL, tmp.path()), registry, settings)
    }

    fn seed_image(tmp: &TempDir, host: &MemoryHost, id: AttachmentId, name: &str) {
        let path = tmp.path().join(name);
        std::fs::write(&path, JPEG_MAGIC).unwrap();
        host.add_attachment(id, format!("{BASE_URL}/{name}"), path);
    }

    #[test]
    fn attachment_added_converts_and_records_metadata() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "sample.jpeg");
        let engine = engine(&tmp, Settings::default());
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        adapters.on_attachment_added(4);

        assert!(tmp.path().join("sample.webp").is_file());
        assert_eq!(host.webp_meta(4), Some(format!("{BASE_URL}/sample.webp")));
    }

    #[test]
    fn upload_gate_off_skips_conversion() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "sample.jpeg");
        let engine = engine(
            &tmp,
            Settings {
                upload: false,
                ..Settings::default()
            },
        );
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        adapters.on_attachment_added(4);

        assert!(!tmp.path().join("sample.webp").exists());
        assert_eq!(host.webp_meta(4), None);
    }

    #[test]
    fn metadata_generated_converts_every_size_variant() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "sample.jpeg");
        for name in ["sample-150.jpeg", "sample-300.jpeg"] {
            std::fs::write(tmp.path().join(name), JPEG_MAGIC).unwrap();
        }
        host.add_size_variants(4, &["sample-150.jpeg", "sample-300.jpeg"]);
        let engine = engine(&tmp, Settings::default());
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        adapters.on_metadata_generated(4);

        assert!(tmp.path().join("sample-150.webp").is_file());
        assert!(tmp.path().join("sample-300.webp").is_file());
    }

    #[test]
    fn attachment_deleted_runs_the_cascade() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "sample.jpeg");
        std::fs::write(tmp.path().join("sample.webp"), b"RIFF").unwrap();
        let engine = engine(&tmp, Settings::default());
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        adapters.on_attachment_deleted(4);

        assert!(!tmp.path().join("sample.webp").exists());
        assert_eq!(host.events().len(), 1);
    }

    #[test]
    fn render_url_returns_webp_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "legacy.jpeg");
        let engine = engine(
            &tmp,
            Settings {
                page_load: true,
                ..Settings::default()
            },
        );
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        let url = adapters.render_url(4, &format!("{BASE_URL}/legacy.jpeg"));
        assert_eq!(url, format!("{BASE_URL}/legacy.webp"));
    }

    #[test]
    fn render_url_gate_off_returns_original() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        seed_image(&tmp, &host, 4, "legacy.jpeg");
        let engine = engine(&tmp, Settings::default());
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        let url = adapters.render_url(4, &format!("{BASE_URL}/legacy.jpeg"));
        assert_eq!(url, format!("{BASE_URL}/legacy.jpeg"));
        assert!(!tmp.path().join("legacy.webp").exists());
    }

    #[test]
    fn render_url_falls_back_to_original_on_failure() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        // URL points at a file that does not exist.
        let engine = engine(
            &tmp,
            Settings {
                page_load: true,
                logs: true,
                ..Settings::default()
            },
        );
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        let url = adapters.render_url(9, &format!("{BASE_URL}/ghost.jpeg"));

        assert_eq!(url, format!("{BASE_URL}/ghost.jpeg"));
        // The failure was logged exactly once (logs gate is on).
        assert_eq!(host.log_entries().len(), 1);
    }

    #[test]
    fn failed_conversion_is_logged_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let host = MemoryHost::new();
        // Text content behind a .jpeg name: fails the type gate.
        let path = tmp.path().join("fake.jpeg");
        std::fs::write(&path, b"plain text").unwrap();
        host.add_attachment(8, format!("{BASE_URL}/fake.jpeg"), path);
        let engine = engine(
            &tmp,
            Settings {
                logs: true,
                ..Settings::default()
            },
        );
        let adapters = TriggerAdapters::new(&engine, &host, &host, &host);

        adapters.on_attachment_added(8);

        let entries = host.log_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "WebP error log, ID - 8");
        assert_eq!(host.webp_meta(8), None);
    }
}
