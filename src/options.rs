//! Conversion options resolution.
//!
//! Options are rebuilt on every conversion from three layers, lowest
//! precedence first:
//!
//! 1. Stock defaults: quality 20, ceiling 100, `gd` (in-process) backend.
//! 2. Stored settings ([`Settings`]) — any key present overrides the default.
//! 3. An optional filter hook that may override a *subset* of keys; keys it
//!    leaves out keep the merged value from layers 1-2, and a hook returning
//!    an empty patch is a harmless no-op.
//!
//! The resolver is the only place quality gets clamped. The engine trusts
//! whatever comes out of [`resolve`].

use crate::backend::BackendKind;
use crate::config::Settings;

/// Hard ceiling for encode quality.
pub const MAX_QUALITY: u8 = 100;

/// Fully resolved options for one encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Encode quality, always within `0..=max_quality`.
    pub quality: u8,
    /// Quality ceiling. Constant today, carried so hooks can read it.
    pub max_quality: u8,
    /// Selected encoder backend.
    pub backend: BackendKind,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            quality: 20,
            max_quality: MAX_QUALITY,
            backend: BackendKind::default(),
        }
    }
}

/// Partial override returned by an options filter hook.
///
/// Every field is optional; `None` means "keep the merged value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsPatch {
    pub quality: Option<u8>,
    pub backend: Option<BackendKind>,
}

/// Extensibility hook applied once per [`resolve`] call.
pub type OptionsFilter = Box<dyn Fn(&ConversionOptions) -> OptionsPatch + Send + Sync>;

/// Merge stored settings over defaults, then apply the filter hook.
pub fn resolve(settings: &Settings, filter: Option<&OptionsFilter>) -> ConversionOptions {
    let mut options = ConversionOptions {
        quality: settings.quality,
        max_quality: MAX_QUALITY,
        backend: settings.backend(),
    };
    options.quality = options.quality.min(options.max_quality);

    if let Some(filter) = filter {
        let patch = filter(&options);
        if let Some(quality) = patch.quality {
            options.quality = quality.min(options.max_quality);
        }
        if let Some(backend) = patch.backend {
            options.backend = backend;
        }
    }

    options
}
