//! Plugin settings module.
//!
//! Handles loading and validating the `config.toml` settings file. All keys
//! are optional — absent keys fall back to stock defaults, so a sparse file
//! like this is valid:
//!
//! ```toml
//! # Only override the encode quality
//! quality = 75
//! ```
//!
//! ## Settings
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! quality = 20          # WebP encode quality (0-100)
//! converter = "gd"      # Encoder backend: gd | cwebp | ffmpeg | imagick | gmagick
//! upload = true         # Convert images when they are added
//! page_load = false     # Convert untouched legacy images during page render
//! logs = false          # Persist an error log entry per failed conversion
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::backend::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Plugin settings loaded from `config.toml`.
///
/// Mirrors the host's stored option map: `quality`, `converter`, `upload`,
/// `page_load`, `logs`. Each setting has a plain typed accessor — no dynamic
/// nested lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// WebP encode quality (0-100).
    pub quality: u8,
    /// Encoder backend name. Empty or unrecognized values select the default.
    pub converter: String,
    /// Convert images when they are added to the media store.
    pub upload: bool,
    /// Convert untouched legacy images on the fly during page render.
    pub page_load: bool,
    /// Persist an error log entry for every failed conversion.
    pub logs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 20,
            converter: "gd".to_string(),
            upload: true,
            page_load: false,
            logs: false,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to stock defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality > 100 {
            return Err(ConfigError::Validation("quality must be 0-100".into()));
        }
        Ok(())
    }

    /// The configured encoder backend, defaulting on unrecognized names.
    pub fn backend(&self) -> BackendKind {
        BackendKind::from_config_value(&self.converter)
    }

    pub fn convert_on_upload(&self) -> bool {
        self.upload
    }

    pub fn convert_on_page_load(&self) -> bool {
        self.page_load
    }

    pub fn log_errors(&self) -> bool {
        self.logs
    }
}

/// Stock config.toml with all settings documented.
///
/// Printed by the `gen-config` CLI subcommand so users start from a fully
/// commented file instead of a blank one.
pub fn stock_config_toml() -> String {
    let defaults = Settings::default();
    format!(
        r#"# webp-sidecar settings
# All options are optional - defaults shown below.

# WebP encode quality (0-100).
quality = {quality}

# Encoder backend: "gd" (in-process), "cwebp", "ffmpeg", "imagick", "gmagick".
# Unrecognized values fall back to "gd".
converter = "{converter}"

# Convert images when they are added to the media store.
upload = {upload}

# Convert untouched legacy images on the fly during page render.
page_load = {page_load}

# Persist an error log entry for every failed conversion.
logs = {logs}
"#,
        quality = defaults.quality,
        converter = defaults.converter,
        upload = defaults.upload,
        page_load = defaults.page_load,
        logs = defaults.logs,
    )
}
