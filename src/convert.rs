//! Conversion entry points.
//!
//! ## Why a `Converter` on top of the runner?
//!
//! [`ConversionRunner`] only knows how to run an already provisioned tool.
//! [`Converter`] pairs it with a [`ToolProvisioner`] so callers make one
//! call: the first conversion downloads pdf2htmlEX, later ones reuse it, and
//! a failed download keeps failing fast until someone calls
//! [`ToolProvisioner::reset`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use pdf2htmlex_auto::{default_provisioner, ToolHandle, ToolProvisioner};
use tracing::{debug, info};

use crate::config::{ConversionConfig, ConversionRequest};
use crate::error::ConversionError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::progress::{ConversionProgressCallback, ProgressCallback};
use crate::runner::ConversionRunner;

/// Provisions pdf2htmlEX on demand and runs conversions with it.
///
/// Cheap to clone; clones share the provisioner state.
#[derive(Clone)]
pub struct Converter {
    provisioner: ToolProvisioner,
    runner: ConversionRunner,
    progress: Option<ProgressCallback>,
}

impl Default for Converter {
    /// Uses the process-wide provisioner and the default configuration.
    fn default() -> Self {
        Self::new(default_provisioner().clone(), ConversionConfig::default())
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("provisioner", &self.provisioner)
            .field("config", self.runner.config())
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Converter {
    pub fn new(provisioner: ToolProvisioner, config: ConversionConfig) -> Self {
        Self {
            provisioner,
            runner: ConversionRunner::new(config),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: Arc<dyn ConversionProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn provisioner(&self) -> &ToolProvisioner {
        &self.provisioner
    }

    pub fn config(&self) -> &ConversionConfig {
        self.runner.config()
    }

    /// Make sure pdf2htmlEX is available without converting anything.
    pub async fn prepare(&self) -> Result<ToolHandle, ConversionError> {
        if let Some(ref cb) = self.progress {
            cb.on_provision_start();
        }
        let result = self.provisioner.ensure().await;
        if let Some(ref cb) = self.progress {
            cb.on_provision_complete(result.is_ok());
        }
        match result {
            Ok(handle) => {
                debug!("Using {}", handle.executable_path().display());
                Ok(handle)
            }
            Err(e) => Err(self.report(e.into())),
        }
    }

    /// Convert one validated request.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConversionError> {
        let handle = self.prepare().await?;

        info!("Converting {}", request.original_file_name());
        if let Some(ref cb) = self.progress {
            cb.on_conversion_start(request.original_file_name(), request.input_bytes().len());
        }

        match self.runner.run(&handle, request).await {
            Ok(output) => {
                if let Some(ref cb) = self.progress {
                    cb.on_conversion_complete(output.html_bytes.len());
                }
                Ok(output)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Read the PDF at `path` and convert it.
    pub async fn convert_file(
        &self,
        path: impl AsRef<Path>,
        zoom_factor: f64,
        embed_fonts: bool,
    ) -> Result<ConversionOutput, ConversionError> {
        let request = ConversionRequest::from_path(path, zoom_factor, embed_fonts).await?;
        self.convert(&request).await
    }

    /// Convert the PDF at `input` and write the HTML to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn convert_to_file(
        &self,
        input: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        zoom_factor: f64,
        embed_fonts: bool,
    ) -> Result<ConversionStats, ConversionError> {
        let output = self.convert_file(input, zoom_factor, embed_fonts).await?;
        let path = output_path.as_ref();
        let write_failed = |source: std::io::Error| ConversionError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        let tmp_path = path.with_extension("html.tmp");
        tokio::fs::write(&tmp_path, &output.html_bytes)
            .await
            .map_err(write_failed)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_failed(e));
        }

        info!("Wrote {}", path.display());
        Ok(output.stats)
    }

    fn report(&self, err: ConversionError) -> ConversionError {
        if let Some(ref cb) = self.progress {
            cb.on_conversion_error(&err.to_string());
        }
        err
    }
}

/// Convert PDF bytes to HTML.
///
/// This is the primary entry point for the library. Uses the process-wide
/// provisioner (downloading pdf2htmlEX on first use) and the default
/// 300-second time limit.
///
/// # Example
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("report.pdf")?;
/// let output = pdf2html::convert(bytes, "report.pdf", 1.3, true).await?;
/// assert_eq!(output.suggested_file_name, "report.html");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// [`ConversionError::InvalidRequest`] before anything runs when the zoom is
/// out of range or the bytes are not a PDF; otherwise any provisioning or
/// conversion error.
pub async fn convert(
    input_bytes: impl Into<Vec<u8>>,
    file_name: &str,
    zoom_factor: f64,
    embed_fonts: bool,
) -> Result<ConversionOutput, ConversionError> {
    let request = ConversionRequest::new(input_bytes, file_name, zoom_factor, embed_fonts)?;
    Converter::default().convert(&request).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_bytes: impl Into<Vec<u8>>,
    file_name: &str,
    zoom_factor: f64,
    embed_fonts: bool,
) -> Result<ConversionOutput, ConversionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_bytes, file_name, zoom_factor, embed_fonts))
}
