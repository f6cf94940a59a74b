//! Memoized, single-flight provisioning.
//!
//! State lives in one slot per install location (the canonical cache
//! directory), shared by every provisioner pointed at that directory:
//!
//! ```text
//! Uninitialized ──ensure()──▶ InProgress(shared future) ──▶ Ready(handle)
//!       ▲                                                └─▶ Failed(error)
//!       └──────────────────────────── reset() ◀──────────────────┘
//! ```
//!
//! Concurrent `ensure()` calls clone the same shared future, so at most one
//! download/extraction runs per location and every caller sees the same
//! outcome. The slot lock is never held across an `.await`.

use std::collections::HashMap;
use std::ffi::OsString;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::fetch::{ArtifactFetcher, HttpFetcher};
use crate::handle::{ReadyState, ToolHandle};
use crate::layout;
use crate::{ProvisionError, ProvisionerConfig, PDF2HTMLEX_VERSION};

type ProvisionFuture = Shared<BoxFuture<'static, Result<ToolHandle, ProvisionError>>>;

enum Slot {
    Uninitialized,
    InProgress(ProvisionFuture),
    Ready(ToolHandle),
    Failed(ProvisionError),
}

/// Provisioning state of one install location.
struct Location {
    slot: Mutex<Slot>,
    phase: AtomicU8,
    fetch_attempts: AtomicUsize,
}

impl Location {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Uninitialized),
            phase: AtomicU8::new(ReadyState::Missing as u8),
            fetch_attempts: AtomicUsize::new(0),
        }
    }
}

/// Live locations by canonical cache directory. Entries die with the last
/// provisioner that uses them.
static LOCATIONS: OnceLock<Mutex<HashMap<PathBuf, Weak<Location>>>> = OnceLock::new();

fn shared_location(config: &ProvisionerConfig) -> Arc<Location> {
    // An override installs nothing, so it shares nothing.
    if config.tool_override.is_some() {
        return Arc::new(Location::new());
    }

    let key = location_key(&config.cache_dir);
    let mut locations = LOCATIONS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = locations.get(&key).and_then(Weak::upgrade) {
        return existing;
    }

    locations.retain(|_, location| location.strong_count() > 0);
    let location = Arc::new(Location::new());
    locations.insert(key, Arc::downgrade(&location));
    location
}

/// Canonical form of `dir`, which may not exist yet: the deepest existing
/// ancestor is resolved and the missing tail appended.
fn location_key(dir: &Path) -> PathBuf {
    let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    let mut missing: Vec<OsString> = Vec::new();
    let mut base = absolute.as_path();
    loop {
        if let Ok(resolved) = std::fs::canonicalize(base) {
            return missing
                .iter()
                .rev()
                .fold(resolved, |path, part| path.join(part));
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                base = parent;
            }
            _ => return absolute,
        }
    }
}

/// Ensures a working pdf2htmlEX exists on disk, once.
///
/// Cheap to clone. Clones, and any other provisioner whose cache directory
/// resolves to the same place, share state. The first caller's fetcher and
/// configuration drive a shared attempt.
#[derive(Clone)]
pub struct ToolProvisioner {
    inner: Arc<Inner>,
}

struct Inner {
    config: ProvisionerConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
    location: Arc<Location>,
}

impl ToolProvisioner {
    /// A provisioner that downloads over HTTPS.
    pub fn new(config: ProvisionerConfig) -> Self {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    pub fn with_fetcher(config: ProvisionerConfig, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                location: shared_location(&config),
                config,
                fetcher,
            }),
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.inner.config
    }

    /// Current phase; `Downloading`/`Extracting` while an attempt is in flight.
    pub fn state(&self) -> ReadyState {
        ReadyState::from_u8(self.inner.location.phase.load(Ordering::SeqCst))
    }

    /// Number of downloads started for this install location.
    pub fn fetch_attempts(&self) -> usize {
        self.inner.location.fetch_attempts.load(Ordering::SeqCst)
    }

    /// Returns a ready handle, provisioning on first use.
    ///
    /// A cached `Ready` or `Failed` outcome is returned without touching the
    /// network or the filesystem.
    pub async fn ensure(&self) -> Result<ToolHandle, ProvisionError> {
        let pending = {
            let mut slot = self.lock_slot();
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Failed(err) => return Err(err.clone()),
                Slot::InProgress(pending) => pending.clone(),
                Slot::Uninitialized => {
                    let pending = Arc::clone(&self.inner).provision_guarded().boxed().shared();
                    *slot = Slot::InProgress(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut slot = self.lock_slot();
        if let Slot::InProgress(current) = &*slot {
            if current.ptr_eq(&pending) {
                let (next, phase) = match &outcome {
                    Ok(handle) => (Slot::Ready(handle.clone()), ReadyState::Ready),
                    Err(err) => (Slot::Failed(err.clone()), ReadyState::Failed),
                };
                *slot = next;
                self.inner.set_phase(phase);
            }
        }
        outcome
    }

    /// Forgets a cached outcome so the next [`ensure`](Self::ensure) starts over.
    ///
    /// Files already on disk are kept, so a reset after success costs only a
    /// path check. Returns `false` (and does nothing) while an attempt is in
    /// flight. Every provisioner sharing the install location sees the reset.
    pub fn reset(&self) -> bool {
        let mut slot = self.lock_slot();
        if matches!(*slot, Slot::InProgress(_)) {
            return false;
        }
        *slot = Slot::Uninitialized;
        self.inner.set_phase(ReadyState::Missing);
        true
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .location
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ToolProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProvisioner")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn set_phase(&self, phase: ReadyState) {
        self.location.phase.store(phase as u8, Ordering::SeqCst);
    }

    async fn provision_guarded(self: Arc<Self>) -> Result<ToolHandle, ProvisionError> {
        match AssertUnwindSafe(self.provision()).catch_unwind().await {
            Ok(outcome) => {
                if let Err(ref e) = outcome {
                    warn!("pdf2htmlEX provisioning failed: {e}");
                }
                outcome
            }
            Err(_) => Err(ProvisionError::SetupError(
                "provisioning task panicked".to_string(),
            )),
        }
    }

    async fn provision(&self) -> Result<ToolHandle, ProvisionError> {
        let config = &self.config;

        if let Some(ref tool) = config.tool_override {
            return self.use_override(tool);
        }

        if config.uses_default_release()
            && !(cfg!(target_os = "linux") && cfg!(target_arch = "x86_64"))
        {
            return Err(ProvisionError::SetupError(format!(
                "the pdf2htmlEX AppImage needs linux/x86_64, this is {}/{}; set PDF2HTMLEX_PATH instead",
                std::env::consts::OS,
                std::env::consts::ARCH
            )));
        }

        let extracted = config.extracted_dir();
        let entry = config.entry_point_path();

        // Fast path: a complete extraction from an earlier run.
        if layout::is_executable(&entry) {
            if let Some(resource_dir) = self.scan_resources(&extracted).await? {
                debug!("pdf2htmlEX already extracted at {}", extracted.display());
                return Ok(ready_handle(entry, resource_dir, extracted));
            }
            debug!("Existing extraction has no data directory; extracting again");
        }

        tokio::fs::create_dir_all(&config.cache_dir).await.map_err(|e| {
            ProvisionError::SetupError(format!(
                "cannot create cache directory '{}': {e}",
                config.cache_dir.display()
            ))
        })?;

        let artifact = config.artifact_path();
        if artifact.is_file() {
            debug!("Reusing downloaded artifact {}", artifact.display());
        } else {
            self.set_phase(ReadyState::Downloading);
            self.download(&artifact).await?;
        }

        layout::mark_executable(&artifact).await.map_err(|e| {
            ProvisionError::SetupError(format!("cannot chmod '{}': {e}", artifact.display()))
        })?;

        self.set_phase(ReadyState::Extracting);
        let entry = match layout::extract_appimage(
            &artifact,
            &config.cache_dir,
            &extracted,
            config.extract_timeout,
        )
        .await
        {
            Ok(entry) => entry,
            Err(e) => {
                // A corrupt artifact must not survive into the next attempt.
                let _ = tokio::fs::remove_file(&artifact).await;
                return Err(e);
            }
        };

        let resource_dir = self
            .scan_resources(&extracted)
            .await?
            .ok_or_else(|| ProvisionError::ResourceDirNotFound {
                root: extracted.clone(),
            })?;

        layout::mark_executable(&entry).await.map_err(|e| {
            ProvisionError::SetupError(format!("cannot chmod '{}': {e}", entry.display()))
        })?;

        info!(
            "pdf2htmlEX {} ready at {} (data: {})",
            PDF2HTMLEX_VERSION,
            entry.display(),
            resource_dir.display()
        );
        Ok(ready_handle(entry, resource_dir, extracted))
    }

    fn use_override(&self, tool: &Path) -> Result<ToolHandle, ProvisionError> {
        if !layout::is_executable(tool) {
            return Err(ProvisionError::SetupError(format!(
                "PDF2HTMLEX_PATH '{}' is not an executable file",
                tool.display()
            )));
        }

        let mut handle = ToolHandle::ready(tool);
        if let Some(ref dir) = self.config.data_dir_override {
            if !dir.is_dir() {
                return Err(ProvisionError::ResourceDirNotFound { root: dir.clone() });
            }
            handle = handle.with_resource_dir(dir);
        }

        info!("Using pre-installed pdf2htmlEX at {}", tool.display());
        Ok(handle)
    }

    async fn download(&self, artifact: &Path) -> Result<(), ProvisionError> {
        let partial = artifact.with_extension("AppImage.part");
        let url = &self.config.release_url;

        self.location.fetch_attempts.fetch_add(1, Ordering::SeqCst);
        info!("Downloading pdf2htmlEX {} from {}", PDF2HTMLEX_VERSION, url);

        if let Err(e) = self
            .fetcher
            .fetch(url, &partial, self.config.download_timeout)
            .await
        {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, artifact).await.map_err(|e| {
            ProvisionError::SetupError(format!(
                "cannot move download to '{}': {e}",
                artifact.display()
            ))
        })
    }

    async fn scan_resources(&self, root: &Path) -> Result<Option<PathBuf>, ProvisionError> {
        let root = root.to_path_buf();
        let depth = self.config.scan_depth;
        tokio::task::spawn_blocking(move || layout::find_resource_dir(&root, depth))
            .await
            .map_err(|e| ProvisionError::SetupError(format!("data directory scan failed: {e}")))
    }
}

fn ready_handle(entry: PathBuf, resource_dir: PathBuf, app_dir: PathBuf) -> ToolHandle {
    ToolHandle::ready(entry)
        .with_resource_dir(resource_dir)
        .with_app_dir(app_dir)
}
