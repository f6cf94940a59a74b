//! Conversion results.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    /// The HTML document exactly as pdf2htmlEX wrote it.
    pub html_bytes: Vec<u8>,
    /// Input file name with its extension replaced by `.html`.
    pub suggested_file_name: String,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// The HTML as text; invalid UTF-8 sequences are replaced.
    pub fn html_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.html_bytes)
    }
}

/// Numbers about one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// `None` when the converter was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Derive the download name for a converted file.
///
/// Only the last path component is kept (uploads can carry `/` or `\`
/// separators), and its extension becomes `html`. Names without a stem fall
/// back to `output.html`.
pub fn suggested_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = std::path::Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if stem.trim().is_empty() {
        "output.html".to_string()
    } else {
        format!("{stem}.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_pdf_extension() {
        assert_eq!(suggested_file_name("report.pdf"), "report.html");
        assert_eq!(suggested_file_name("Report.PDF"), "Report.html");
        assert_eq!(suggested_file_name("q3.final.pdf"), "q3.final.html");
    }

    #[test]
    fn adds_extension_when_missing() {
        assert_eq!(suggested_file_name("scan"), "scan.html");
    }

    #[test]
    fn strips_directories() {
        assert_eq!(suggested_file_name("/home/ana/docs/cv.pdf"), "cv.html");
        assert_eq!(suggested_file_name("C:\\Users\\ana\\cv.pdf"), "cv.html");
    }

    #[test]
    fn empty_names_fall_back() {
        assert_eq!(suggested_file_name(""), "output.html");
        assert_eq!(suggested_file_name("dir/"), "output.html");
    }

    #[test]
    fn html_lossy_tolerates_bad_utf8() {
        let out = ConversionOutput {
            html_bytes: b"<p>caf\xe9</p>".to_vec(),
            suggested_file_name: "a.html".into(),
            stats: ConversionStats::default(),
        };
        assert!(out.html_lossy().starts_with("<p>caf"));
    }
}
