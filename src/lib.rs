//! # pdf2html
//!
//! Convert PDF documents to self-contained HTML with
//! [pdf2htmlEX](https://github.com/pdf2htmlEX/pdf2htmlEX), which is
//! downloaded and cached automatically on first use.
//!
//! ## Why wrap a subprocess?
//!
//! pdf2htmlEX reproduces page layout, fonts and vector graphics far more
//! faithfully than text extraction ever could, but it is a large C++ program
//! with its own data files. Rather than linking it, this crate provisions the
//! official AppImage once (see the `pdf2htmlex-auto` crate) and runs it in an
//! isolated scratch directory for every conversion.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Validate   zoom in 0.5–2.0, input starts with %PDF
//!  ├─ 2. Provision  locate / download / extract pdf2htmlEX (once per process)
//!  ├─ 3. Stage      write input.pdf into a fresh work area
//!  ├─ 4. Run        AppRun --data-dir=… --zoom=… [--embed-font=0] input.pdf output.html
//!  └─ 5. Collect    output.html → ConversionOutput, work area removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("document.pdf")?;
//!     let output = pdf2html::convert(bytes, "document.pdf", 1.3, true).await?;
//!     std::fs::write(&output.suggested_file_name, &output.html_bytes)?;
//!     eprintln!("{} bytes in {}ms", output.stats.output_bytes, output.stats.duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2html` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2html = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod progress;
pub mod runner;
pub mod workarea;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, ConversionRequest, DEFAULT_TIMEOUT_SECS,
    DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM,
};
pub use convert::{convert, convert_sync, Converter};
pub use error::ConversionError;
pub use output::{suggested_file_name, ConversionOutput, ConversionStats};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use runner::{build_args, ConversionRunner};
pub use workarea::WorkArea;

pub use pdf2htmlex_auto::{
    ProvisionError, ProvisionerConfig, ReadyState, ToolHandle, ToolProvisioner,
};
