//! # pdf2htmlex-auto
//!
//! Auto-download, extract and cache the [pdf2htmlEX](https://github.com/pdf2htmlEX/pdf2htmlEX)
//! converter at runtime, so that users of `pdf2html` never have to install
//! it by hand.
//!
//! ## How it works
//!
//! On first call to [`ToolProvisioner::ensure`] (or [`ensure_tool`]):
//!
//! 1. Checks `~/.cache/pdf2html/pdf2htmlex-{VERSION}/pdf2htmlex_extracted/AppRun`.
//! 2. If absent, downloads the release AppImage to the cache directory.
//! 3. Runs `pdf2htmlEX.AppImage --appimage-extract` (no FUSE required) and
//!    moves the extracted tree into place, replacing any earlier extraction.
//! 4. Locates the data directory (`usr/local/share/pdf2htmlEX`, or wherever
//!    the `manifest` file lives) that must be passed as `--data-dir`.
//!
//! Subsequent calls skip the network entirely. Concurrent callers share one
//! in-flight attempt, and a failed attempt is remembered until
//! [`ToolProvisioner::reset`] is called.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), pdf2htmlex_auto::ProvisionError> {
//! let handle = pdf2htmlex_auto::ensure_tool().await?;
//! println!("converter: {}", handle.executable_path().display());
//! if let Some(dir) = handle.resource_dir() {
//!     println!("data dir:  {}", dir.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform support
//!
//! The published AppImage targets Linux x86_64 only. On other platforms,
//! point `PDF2HTMLEX_PATH` at a locally installed `pdf2htmlEX`.
//!
//! ## Environment variable overrides
//!
//! - `PDF2HTMLEX_PATH`: path to an existing pdf2htmlEX executable; skips download.
//! - `PDF2HTMLEX_DATA_DIR`: data directory to pass along with `PDF2HTMLEX_PATH`.
//! - `PDF2HTMLEX_AUTO_CACHE_DIR`: override the default cache directory.

use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error;

mod config;
mod fetch;
mod handle;
mod layout;
mod provisioner;

pub use config::ProvisionerConfig;
pub use fetch::{ArtifactFetcher, DownloadProgress, HttpFetcher};
pub use handle::{ReadyState, ToolHandle};
pub use layout::find_resource_dir;
pub use provisioner::ToolProvisioner;

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdf2htmlEX release used for downloads.
pub const PDF2HTMLEX_VERSION: &str = "0.18.8.rc1";

/// Fixed release artifact (Ubuntu bionic x86_64 AppImage).
pub const RELEASE_URL: &str = "https://github.com/pdf2htmlEX/pdf2htmlEX/releases/download/v0.18.8.rc1/pdf2htmlEX-0.18.8.rc1-master-20200630-Ubuntu-bionic-x86_64.AppImage";

/// File name of the downloaded AppImage inside the cache directory.
pub const ARTIFACT_NAME: &str = "pdf2htmlEX.AppImage";

/// Directory the AppImage payload is moved into after extraction.
pub const EXTRACTED_DIR_NAME: &str = "pdf2htmlex_extracted";

/// Entry point at the root of the extracted AppImage.
pub const ENTRY_POINT: &str = "AppRun";

/// Where the AppImage normally keeps its data files, relative to the extraction root.
pub const CONVENTIONAL_DATA_DIR: &str = "usr/local/share/pdf2htmlEX";

/// File that identifies a pdf2htmlEX data directory.
pub const DATA_DIR_MARKER: &str = "manifest";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by provisioning.
///
/// `Clone` because one outcome is shared by every caller waiting on the same
/// attempt, and cached for later callers until reset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// The release artifact could not be fetched.
    #[error("Failed to download pdf2htmlEX from '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// `--appimage-extract` failed, timed out, or produced no entry point.
    #[error("pdf2htmlEX extraction failed: {0}")]
    ExtractionFailed(String),

    /// The entry point exists but no data directory was found under `root`.
    #[error("pdf2htmlEX data directory not found under '{}'", root.display())]
    ResourceDirNotFound { root: PathBuf },

    /// Any other provisioning failure.
    #[error("pdf2htmlEX setup error: {0}")]
    SetupError(String),
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the per-version cache directory for pdf2htmlEX.
///
/// Default locations:
/// - **Linux**: `~/.cache/pdf2html/pdf2htmlex-{VERSION}/`
/// - **macOS**: `~/Library/Caches/pdf2html/pdf2htmlex-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\pdf2html\pdf2htmlex-{VERSION}\`
///
/// Override by setting `PDF2HTMLEX_AUTO_CACHE_DIR`.
pub fn tool_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("PDF2HTMLEX_AUTO_CACHE_DIR") {
        if !override_dir.is_empty() {
            return PathBuf::from(override_dir).join(format!("pdf2htmlex-{PDF2HTMLEX_VERSION}"));
        }
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("pdf2html")
        .join(format!("pdf2htmlex-{PDF2HTMLEX_VERSION}"))
}

// ── Process-wide provisioner ─────────────────────────────────────────────────

static DEFAULT_PROVISIONER: OnceLock<ToolProvisioner> = OnceLock::new();

/// The process-wide provisioner, configured from the environment on first use.
pub fn default_provisioner() -> &'static ToolProvisioner {
    DEFAULT_PROVISIONER.get_or_init(|| ToolProvisioner::new(ProvisionerConfig::from_env()))
}

/// Ensures pdf2htmlEX is ready using the process-wide provisioner.
pub async fn ensure_tool() -> Result<ToolHandle, ProvisionError> {
    default_provisioner().ensure().await
}

/// Forgets the process-wide provisioner's cached outcome.
///
/// Returns `false` when an attempt is currently in flight.
pub fn reset_tool() -> bool {
    default_provisioner().reset()
}

/// Returns `true` if a usable pdf2htmlEX is already on disk (no network
/// access needed on the next [`ensure_tool`]).
pub fn is_tool_cached() -> bool {
    let config = ProvisionerConfig::from_env();
    match config.tool_override {
        Some(ref tool) => layout::is_executable(tool),
        None => layout::is_executable(&config.entry_point_path()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_deterministic() {
        let d1 = tool_cache_dir();
        let d2 = tool_cache_dir();
        assert_eq!(d1, d2);
        assert!(d1.to_str().unwrap().contains(PDF2HTMLEX_VERSION));
    }

    #[test]
    fn cache_dir_override_via_env() {
        std::env::set_var("PDF2HTMLEX_AUTO_CACHE_DIR", "/tmp/test_pdf2html_override");
        let d = tool_cache_dir();
        std::env::remove_var("PDF2HTMLEX_AUTO_CACHE_DIR");
        assert!(d.starts_with("/tmp/test_pdf2html_override"));
        assert!(d.to_str().unwrap().contains(PDF2HTMLEX_VERSION));
    }

    #[test]
    fn release_url_matches_version() {
        assert!(RELEASE_URL.starts_with("https://"));
        assert!(RELEASE_URL.contains(PDF2HTMLEX_VERSION));
        assert!(RELEASE_URL.ends_with(".AppImage"));
    }

    #[test]
    fn provision_error_display() {
        let e = ProvisionError::DownloadFailed {
            url: "https://example.com/x".into(),
            reason: "HTTP 404 Not Found".into(),
        };
        assert!(e.to_string().contains("404"));

        let e = ProvisionError::ResourceDirNotFound {
            root: PathBuf::from("/tmp/pdf2htmlex_extracted"),
        };
        assert!(e.to_string().contains("/tmp/pdf2htmlex_extracted"));
    }
}
