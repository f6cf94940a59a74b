//! Error types for the pdf2html library.
//!
//! [`ConversionError`] is the single failure type returned by every
//! conversion entry point. It falls into two groups:
//!
//! * **Provisioning**: pdf2htmlEX could not be made available
//!   ([`DownloadFailed`](ConversionError::DownloadFailed),
//!   [`ExtractionFailed`](ConversionError::ExtractionFailed),
//!   [`ResourceDirNotFound`](ConversionError::ResourceDirNotFound),
//!   [`SetupError`](ConversionError::SetupError)). These are cached by the
//!   provisioner until it is reset.
//!
//! * **Conversion**: one run of the converter failed. Never cached; the
//!   caller decides whether to try again.

use std::path::PathBuf;

use pdf2htmlex_auto::{ProvisionError, ReadyState};
use thiserror::Error;

/// All errors returned by the pdf2html library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Provisioning errors ───────────────────────────────────────────────
    /// The pdf2htmlEX release could not be downloaded.
    #[error("Failed to download pdf2htmlEX from '{url}': {reason}\nCheck your internet connection and try again.")]
    DownloadFailed { url: String, reason: String },

    /// The AppImage could not be extracted, or contained no entry point.
    #[error("pdf2htmlEX extraction failed: {0}")]
    ExtractionFailed(String),

    /// The converter is present but its data directory is missing.
    #[error("pdf2htmlEX data directory not found under '{}'", root.display())]
    ResourceDirNotFound { root: PathBuf },

    /// Any other provisioning failure.
    #[error(
        "pdf2htmlEX setup error: {0}\n\n\
pdf2htmlEX is normally downloaded automatically on first run.\n\
If that is not possible, install it and set PDF2HTMLEX_PATH=/path/to/pdf2htmlEX.\n"
    )]
    SetupError(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// A run was attempted with a handle that is not ready.
    #[error("pdf2htmlEX is not ready (state: {state})")]
    ToolNotReady { state: ReadyState },

    /// The converter exceeded its wall-clock budget and was killed.
    #[error("Conversion timed out after {secs}s\nThe PDF may be too large or complex.")]
    ConversionTimedOut { secs: u64 },

    /// The converter exited without writing an output file.
    #[error("Conversion failed: pdf2htmlEX wrote no output (exit code {})\n{}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()), stderr.trim())]
    ConversionFailed {
        exit_code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    /// The converter wrote an output file of zero bytes.
    #[error("Conversion produced an empty HTML file")]
    EmptyOutput,

    /// The converter process could not be started or waited on.
    #[error("Failed to run pdf2htmlEX '{}': {reason}", path.display())]
    ProcessError { path: PathBuf, reason: String },

    // ── Request / I/O errors ──────────────────────────────────────────────
    /// The request failed validation (zoom out of range, not a PDF, …).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The per-conversion scratch directory could not be created or used.
    #[error("Work area error: {source}")]
    WorkAreaFailed {
        #[source]
        source: std::io::Error,
    },

    /// Could not write the converted HTML file.
    #[error("Failed to write output file '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (e.g. the blocking wrapper's runtime).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// `true` for failures that came from provisioning pdf2htmlEX.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            ConversionError::DownloadFailed { .. }
                | ConversionError::ExtractionFailed(_)
                | ConversionError::ResourceDirNotFound { .. }
                | ConversionError::SetupError(_)
        )
    }
}

impl From<ProvisionError> for ConversionError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::DownloadFailed { url, reason } => {
                ConversionError::DownloadFailed { url, reason }
            }
            ProvisionError::ExtractionFailed(msg) => ConversionError::ExtractionFailed(msg),
            ProvisionError::ResourceDirNotFound { root } => {
                ConversionError::ResourceDirNotFound { root }
            }
            ProvisionError::SetupError(msg) => ConversionError::SetupError(msg),
        }
    }
}
