//! Configuration and request types for PDF-to-HTML conversion.
//!
//! Two types split the knobs by lifetime:
//!
//! * [`ConversionConfig`]: how the runner behaves (time budget, where
//!   scratch directories go). Built once, shared by every conversion.
//! * [`ConversionRequest`]: one file and the options chosen for it.
//!   Validated on construction and immutable afterwards.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest zoom factor accepted by [`ConversionRequest`].
pub const MIN_ZOOM: f64 = 0.5;

/// Largest zoom factor accepted by [`ConversionRequest`].
pub const MAX_ZOOM: f64 = 2.0;

/// Zoom used when the caller does not pick one.
pub const DEFAULT_ZOOM: f64 = 1.3;

/// Wall-clock budget for one conversion.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the conversion runner.
///
/// # Example
/// ```rust
/// use pdf2html::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout_secs, 120);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Hard time limit for one pdf2htmlEX run, in seconds. Default: 300.
    ///
    /// On expiry the converter and everything it spawned are killed and the
    /// call fails with [`ConversionError::ConversionTimedOut`].
    pub timeout_secs: u64,

    /// Parent directory for per-conversion work areas. Default: the OS temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            scratch_dir: None,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConversionError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(ConversionError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref dir) = c.scratch_dir {
            if !dir.is_dir() {
                return Err(ConversionError::InvalidConfig(format!(
                    "Scratch directory '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// One PDF to convert, with the options chosen for it.
#[derive(Clone, PartialEq)]
pub struct ConversionRequest {
    input_bytes: Vec<u8>,
    original_file_name: String,
    zoom_factor: f64,
    embed_fonts: bool,
}

impl ConversionRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    /// [`ConversionError::InvalidRequest`] when `zoom_factor` is outside
    /// [`MIN_ZOOM`]..=[`MAX_ZOOM`] or `input_bytes` is not a PDF.
    pub fn new(
        input_bytes: impl Into<Vec<u8>>,
        original_file_name: impl Into<String>,
        zoom_factor: f64,
        embed_fonts: bool,
    ) -> Result<Self, ConversionError> {
        let input_bytes = input_bytes.into();

        if !zoom_factor.is_finite() || !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom_factor) {
            return Err(ConversionError::InvalidRequest(format!(
                "zoom must be {MIN_ZOOM}–{MAX_ZOOM}, got {zoom_factor}"
            )));
        }
        if input_bytes.is_empty() {
            return Err(ConversionError::InvalidRequest("input is empty".into()));
        }
        if !input_bytes.starts_with(b"%PDF") {
            let magic: Vec<u8> = input_bytes.iter().take(4).copied().collect();
            return Err(ConversionError::InvalidRequest(format!(
                "input is not a PDF (first bytes: {magic:?})"
            )));
        }

        Ok(Self {
            input_bytes,
            original_file_name: original_file_name.into(),
            zoom_factor,
            embed_fonts,
        })
    }

    /// Read `path` into a request named after its file name.
    pub async fn from_path(
        path: impl AsRef<Path>,
        zoom_factor: f64,
        embed_fonts: bool,
    ) -> Result<Self, ConversionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ConversionError::InvalidRequest(format!("cannot read '{}': {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(bytes, name, zoom_factor, embed_fonts)
    }

    pub fn input_bytes(&self) -> &[u8] {
        &self.input_bytes
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn zoom_factor(&self) -> f64 {
        self.zoom_factor
    }

    pub fn embed_fonts(&self) -> bool {
        self.embed_fonts
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("input_bytes", &format_args!("<{} bytes>", self.input_bytes.len()))
            .field("original_file_name", &self.original_file_name)
            .field("zoom_factor", &self.zoom_factor)
            .field("embed_fonts", &self.embed_fonts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.4\n%fake\n";

    #[test]
    fn default_config() {
        let c = ConversionConfig::default();
        assert_eq!(c.timeout_secs, 300);
        assert_eq!(c.timeout(), Duration::from_secs(300));
        assert!(c.scratch_dir.is_none());
    }

    #[test]
    fn builder_clamps_timeout() {
        let c = ConversionConfig::builder().timeout_secs(0).build().unwrap();
        assert_eq!(c.timeout_secs, 1);
    }

    #[test]
    fn builder_rejects_missing_scratch_dir() {
        let err = ConversionConfig::builder()
            .scratch_dir("/definitely/not/a/dir")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidConfig(_)));
    }

    #[test]
    fn zoom_bounds_are_inclusive() {
        assert!(ConversionRequest::new(PDF, "a.pdf", MIN_ZOOM, true).is_ok());
        assert!(ConversionRequest::new(PDF, "a.pdf", MAX_ZOOM, true).is_ok());
        assert!(ConversionRequest::new(PDF, "a.pdf", 0.49, true).is_err());
        assert!(ConversionRequest::new(PDF, "a.pdf", 2.01, true).is_err());
        assert!(ConversionRequest::new(PDF, "a.pdf", f64::NAN, true).is_err());
    }

    #[test]
    fn rejects_non_pdf_input() {
        let err = ConversionRequest::new(b"PK\x03\x04zip".to_vec(), "a.pdf", 1.0, true).unwrap_err();
        assert!(err.to_string().contains("not a PDF"), "got: {err}");

        let err = ConversionRequest::new(Vec::new(), "a.pdf", 1.0, true).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn debug_hides_payload() {
        let r = ConversionRequest::new(PDF, "report.pdf", 1.3, false).unwrap();
        let dbg = format!("{r:?}");
        assert!(dbg.contains("<15 bytes>"), "got: {dbg}");
        assert!(dbg.contains("report.pdf"));
    }
}
