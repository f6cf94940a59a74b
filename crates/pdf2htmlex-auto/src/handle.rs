use std::fmt;
use std::path::{Path, PathBuf};

/// Provisioning phase of the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReadyState {
    #[default]
    Missing = 0,
    Downloading = 1,
    Extracting = 2,
    Ready = 3,
    Failed = 4,
}

impl ReadyState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadyState::Downloading,
            2 => ReadyState::Extracting,
            3 => ReadyState::Ready,
            4 => ReadyState::Failed,
            _ => ReadyState::Missing,
        }
    }

    /// `Ready` and `Failed` end an attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadyState::Ready | ReadyState::Failed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadyState::Missing => "missing",
            ReadyState::Downloading => "downloading",
            ReadyState::Extracting => "extracting",
            ReadyState::Ready => "ready",
            ReadyState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A located pdf2htmlEX installation.
///
/// Handles returned by [`crate::ToolProvisioner::ensure`] are always
/// [`ReadyState::Ready`] and read-only from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolHandle {
    executable_path: PathBuf,
    resource_dir: Option<PathBuf>,
    app_dir: Option<PathBuf>,
    ready_state: ReadyState,
}

impl ToolHandle {
    /// A ready handle for `executable_path` with no data or AppImage directory.
    pub fn ready(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            resource_dir: None,
            app_dir: None,
            ready_state: ReadyState::Ready,
        }
    }

    /// Data directory passed to the converter as `--data-dir`.
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = Some(dir.into());
        self
    }

    /// AppImage root exported to the converter as `APPDIR`.
    pub fn with_app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_dir = Some(dir.into());
        self
    }

    pub fn with_state(mut self, state: ReadyState) -> Self {
        self.ready_state = state;
        self
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    pub fn resource_dir(&self) -> Option<&Path> {
        self.resource_dir.as_deref()
    }

    pub fn app_dir(&self) -> Option<&Path> {
        self.app_dir.as_deref()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn is_ready(&self) -> bool {
        self.ready_state == ReadyState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_round_trips_through_u8() {
        for state in [
            ReadyState::Missing,
            ReadyState::Downloading,
            ReadyState::Extracting,
            ReadyState::Ready,
            ReadyState::Failed,
        ] {
            assert_eq!(ReadyState::from_u8(state as u8), state);
        }
        assert_eq!(ReadyState::from_u8(200), ReadyState::Missing);
    }

    #[test]
    fn builder_sets_optional_dirs() {
        let h = ToolHandle::ready("/opt/pdf2htmlEX/AppRun")
            .with_resource_dir("/opt/pdf2htmlEX/usr/local/share/pdf2htmlEX")
            .with_app_dir("/opt/pdf2htmlEX");
        assert!(h.is_ready());
        assert_eq!(h.app_dir(), Some(Path::new("/opt/pdf2htmlEX")));
        assert!(h.resource_dir().unwrap().ends_with("pdf2htmlEX"));

        let failed = h.with_state(ReadyState::Failed);
        assert!(!failed.is_ready());
        assert!(failed.ready_state().is_terminal());
    }
}
