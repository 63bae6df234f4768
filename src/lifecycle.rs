//! Lifecycle reactors — thin consumers of conversion outcomes.
//!
//! Three reactors observe the engine's results and the host's deletion
//! events:
//!
//! - [`MetadataRecorder`] persists the derived WebP URL once per attachment
//!   and runs the extra conversion pass for platform-scaled uploads.
//! - [`ErrorLogger`] appends one log entry per failed conversion, gated by
//!   the `logs` setting.
//! - [`DeletionCascade`] removes derived WebP files (main image + every size
//!   variant) when the source attachment is deleted.
//!
//! All reactors treat a failed conversion as terminal: nothing retries.

use crate::engine::{ConversionEngine, ConversionError};
use crate::host::Host;
use crate::paths;
use crate::types::{AttachmentId, ImageSource};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Filename marker the platform appends to its scaled large-image derivative.
const SCALED_MARKER: &str = "-scaled";

/// One persisted error-log record. Appended, never mutated or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub title: String,
    pub content: String,
    pub status: LogStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Published,
}

/// External append-only store for error log entries.
pub trait ErrorLogStore {
    fn append(&self, entry: ErrorLogEntry);
}

/// Sink for derived-image deletion signals emitted by the cascade.
pub trait EventSink {
    /// The main image's derived WebP file was deleted.
    fn derived_deleted(&self, path: &Path, id: AttachmentId);
    /// A size variant's derived WebP file was deleted.
    fn metadata_derived_deleted(&self, path: &Path, id: AttachmentId);
}

/// Persists the derived WebP URL into the host's metadata store.
pub struct MetadataRecorder<'a> {
    host: &'a dyn Host,
}

impl<'a> MetadataRecorder<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    /// React to one conversion outcome.
    ///
    /// Successful conversions are recorded write-once-if-absent: an existing
    /// non-empty record is never overwritten. When the attachment's URL
    /// carries the platform's scaled marker, the unscaled original gets one
    /// extra conversion pass (its outcome is not recorded — the marker is
    /// absent from the derived URL, so there is no second record to keep).
    pub fn on_converted(
        &self,
        engine: &ConversionEngine,
        outcome: &Result<String, ConversionError>,
        id: AttachmentId,
    ) {
        let Ok(webp_url) = outcome else {
            return;
        };

        let existing = self.host.webp_meta(id);
        if existing.map_or(true, |m| m.is_empty()) {
            self.host.set_webp_meta(id, webp_url);
        }

        if let Some(attachment_url) = self.host.attachment_url(id) {
            if let Some(original_url) = strip_scaled_marker(&attachment_url) {
                debug!(id, url = %original_url, "converting unscaled original");
                let source = ImageSource::new(id, original_url);
                if let Err(e) = engine.convert(&source) {
                    warn!(id, error = %e, "unscaled original conversion failed");
                }
            }
        }
    }
}

/// Appends an [`ErrorLogEntry`] per failed conversion when enabled.
pub struct ErrorLogger<'a> {
    store: &'a dyn ErrorLogStore,
    enabled: bool,
}

impl<'a> ErrorLogger<'a> {
    pub fn new(store: &'a dyn ErrorLogStore, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Persist the failure detail. Silent no-op when logging is disabled or
    /// the conversion succeeded.
    pub fn on_converted(&self, outcome: &Result<String, ConversionError>, id: AttachmentId) {
        if !self.enabled {
            return;
        }
        let Err(error) = outcome else {
            return;
        };
        self.store.append(ErrorLogEntry {
            title: format!("WebP error log, ID - {id}"),
            content: error.to_string(),
            status: LogStatus::Published,
        });
    }
}

/// Removes derived WebP files when their source attachment is deleted.
pub struct DeletionCascade<'a> {
    host: &'a dyn Host,
    sink: &'a dyn EventSink,
}

impl<'a> DeletionCascade<'a> {
    pub fn new(host: &'a dyn Host, sink: &'a dyn EventSink) -> Self {
        Self { host, sink }
    }

    /// Delete the main image's WebP sibling and every size variant's, each
    /// followed by a deletion signal. Missing files are skipped silently.
    pub fn on_source_deleted(&self, id: AttachmentId) {
        if !self.host.is_image(id) {
            return;
        }
        let Some(main_image) = self.host.attached_file(id) else {
            return;
        };

        let main_webp = paths::webp_sibling(&main_image);
        if self.remove(&main_webp, id) {
            self.sink.derived_deleted(&main_webp, id);
        }

        let Some(dir) = main_image.parent() else {
            return;
        };
        for variant in self.host.size_variants(id) {
            let variant_webp = paths::webp_sibling(&dir.join(&variant));
            if self.remove(&variant_webp, id) {
                self.sink.metadata_derived_deleted(&variant_webp, id);
            }
        }
    }

    fn remove(&self, path: &Path, id: AttachmentId) -> bool {
        if !path.is_file() {
            return false;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(id, path = %path.display(), "derived image deleted");
                true
            }
            Err(e) => {
                warn!(id, path = %path.display(), error = %e, "failed to delete derived image");
                false
            }
        }
    }
}

/// Strip the scaled marker from a URL's final segment.
///
/// Returns `None` when the URL does not reference a scaled derivative.
fn strip_scaled_marker(url: &str) -> Option<String> {
    let marker_pos = url.rfind(SCALED_MARKER)?;
    // Marker must belong to the final path segment.
    if url[marker_pos..].contains('/') {
        return None;
    }
    // Marker must sit immediately before the extension (or the end).
    let after = &url[marker_pos + SCALED_MARKER.len()..];
    if !after.is_empty() && !after.starts_with('.') {
        return None;
    }
    Some(format!("{}{after}", &url[..marker_pos]))
}
