//! External-process encoder backends.
//!
//! Each encoder shells out to a system binary and treats a missing binary or
//! a non-zero exit as a [`BackendError`] with the captured stderr as detail —
//! nothing here panics or leaks a raw process failure.
//!
//! | Encoder | Invocation |
//! |---|---|
//! | [`CwebpEncoder`] | `cwebp -q <q> <src> -o <dest>` |
//! | [`FfmpegEncoder`] | `ffmpeg -y -loglevel error -i <src> -quality <q> <dest>` |
//! | [`ImagickEncoder`] | `convert <src> -quality <q> <dest>` |
//! | [`GmagickEncoder`] | `gm convert <src> -quality <q> <dest>` |

use super::{BackendError, WebpEncoder};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

/// Run a prepared encoder command, mapping launch and exit failures.
fn run_encoder(program: &str, mut command: Command) -> Result<(), BackendError> {
    let output = command.output().map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            BackendError::Spawn {
                program: program.to_string(),
                source,
            }
        } else {
            BackendError::Io(source)
        }
    })?;

    if !output.status.success() {
        return Err(BackendError::EncoderExit {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Google's reference WebP encoder.
pub struct CwebpEncoder;

impl CwebpEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CwebpEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpEncoder for CwebpEncoder {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError> {
        let mut cmd = Command::new("cwebp");
        cmd.arg("-quiet")
            .arg("-q")
            .arg(quality.to_string())
            .arg(source)
            .arg("-o")
            .arg(dest);
        run_encoder("cwebp", cmd)
    }
}

/// FFmpeg's libwebp wrapper.
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpEncoder for FfmpegEncoder {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(source)
            .arg("-quality")
            .arg(quality.to_string())
            .arg(dest);
        run_encoder("ffmpeg", cmd)
    }
}

/// ImageMagick's `convert`.
pub struct ImagickEncoder;

impl ImagickEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImagickEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpEncoder for ImagickEncoder {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError> {
        let mut cmd = Command::new("convert");
        cmd.arg(source)
            .arg("-quality")
            .arg(quality.to_string())
            .arg(dest);
        run_encoder("convert", cmd)
    }
}

/// GraphicsMagick's `gm convert`.
pub struct GmagickEncoder;

impl GmagickEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GmagickEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebpEncoder for GmagickEncoder {
    fn encode(&self, source: &Path, dest: &Path, quality: u8) -> Result<(), BackendError> {
        let mut cmd = Command::new("gm");
        cmd.arg("convert")
            .arg(source)
            .arg("-quality")
            .arg(quality.to_string())
            .arg(dest);
        run_encoder("gm", cmd)
    }
}
