//! Shared types passed between the engine, reactors and host adapters.

/// Attachment identifier assigned by the hosting CMS. `0` means "none" —
/// used for conversions that are not tied to a stored attachment (CLI runs).
pub type AttachmentId = u64;

/// A source image as handed over by the host for one conversion request.
///
/// Request-scoped: built per call, never cached, never mutated. The engine
/// takes it by reference so concurrent conversions of different sources
/// cannot observe each other's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    /// Attachment id (`0` = none).
    pub id: AttachmentId,
    /// Absolute public URL of the source image.
    pub url: String,
}

impl ImageSource {
    pub fn new(id: AttachmentId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }
}
