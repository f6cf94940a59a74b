use std::path::PathBuf;
use std::time::Duration;

use crate::{tool_cache_dir, ARTIFACT_NAME, ENTRY_POINT, EXTRACTED_DIR_NAME, RELEASE_URL};

/// Where and how the converter is provisioned.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Release artifact URL. Default: [`RELEASE_URL`].
    pub release_url: String,

    /// Directory holding the downloaded artifact and its extraction.
    pub cache_dir: PathBuf,

    /// Bound on the whole download. Default: 120 s.
    pub download_timeout: Duration,

    /// Bound on `--appimage-extract`. Default: 60 s.
    pub extract_timeout: Duration,

    /// Maximum depth of the data-directory scan below the extraction root. Default: 8.
    pub scan_depth: usize,

    /// Pre-installed executable to use instead of the AppImage (`PDF2HTMLEX_PATH`).
    pub tool_override: Option<PathBuf>,

    /// Data directory to pair with `tool_override` (`PDF2HTMLEX_DATA_DIR`).
    pub data_dir_override: Option<PathBuf>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProvisionerConfig {
    /// Defaults rooted at `cache_dir`, ignoring the environment.
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            release_url: RELEASE_URL.to_string(),
            cache_dir: cache_dir.into(),
            download_timeout: Duration::from_secs(120),
            extract_timeout: Duration::from_secs(60),
            scan_depth: 8,
            tool_override: None,
            data_dir_override: None,
        }
    }

    /// Defaults rooted at [`tool_cache_dir`], honouring `PDF2HTMLEX_PATH`
    /// and `PDF2HTMLEX_DATA_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::in_dir(tool_cache_dir());
        config.tool_override = env_path("PDF2HTMLEX_PATH");
        config.data_dir_override = env_path("PDF2HTMLEX_DATA_DIR");
        config
    }

    pub fn with_release_url(mut self, url: impl Into<String>) -> Self {
        self.release_url = url.into();
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_scan_depth(mut self, depth: usize) -> Self {
        self.scan_depth = depth.max(1);
        self
    }

    pub fn with_tool_override(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool_override = Some(tool.into());
        self
    }

    pub fn with_data_dir_override(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir_override = Some(dir.into());
        self
    }

    /// `<cache_dir>/pdf2htmlEX.AppImage`
    pub fn artifact_path(&self) -> PathBuf {
        self.cache_dir.join(ARTIFACT_NAME)
    }

    /// `<cache_dir>/pdf2htmlex_extracted`
    pub fn extracted_dir(&self) -> PathBuf {
        self.cache_dir.join(EXTRACTED_DIR_NAME)
    }

    /// `<cache_dir>/pdf2htmlex_extracted/AppRun`
    pub fn entry_point_path(&self) -> PathBuf {
        self.extracted_dir().join(ENTRY_POINT)
    }

    pub(crate) fn uses_default_release(&self) -> bool {
        self.release_url == RELEASE_URL
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
