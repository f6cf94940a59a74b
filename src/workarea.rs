//! Per-conversion scratch directory.
//!
//! Every run gets its own uniquely named directory holding exactly one input
//! and one output file. The directory is a [`tempfile::TempDir`], so it is
//! removed when the [`WorkArea`] drops: on success, on error, on timeout and
//! when the surrounding future is cancelled.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Name of the PDF written into the work area.
pub const INPUT_FILE_NAME: &str = "input.pdf";

/// Name the converter is told to write, relative to the work area.
pub const OUTPUT_FILE_NAME: &str = "output.html";

const PREFIX: &str = "pdf2html-";

/// An exclusively owned scratch directory.
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Create a fresh directory under `parent`, or the OS temp dir.
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match parent {
            Some(p) => builder.tempdir_in(p)?,
            None => builder.tempdir()?,
        };
        debug!("Work area: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.path().join(INPUT_FILE_NAME)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_FILE_NAME)
    }

    /// Write the PDF that will be handed to the converter.
    pub async fn write_input(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.input_path();
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read the converter's output.
    ///
    /// `Ok(None)` when no output file exists.
    pub async fn read_output(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.output_path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
