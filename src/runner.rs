//! Runs pdf2htmlEX once against one PDF.
//!
//! A run is single-pass: write the input into a fresh [`WorkArea`], start the
//! converter with a deterministic argument list, wait for it under a hard
//! time limit, then classify what it left behind. Nothing is retried.
//!
//! ## Why a process group?
//!
//! `AppRun` is a shell wrapper that starts the real binary as its own child.
//! Killing only the direct child on timeout would leave the converter running
//! and holding our pipes. On Unix the child is therefore started as the
//! leader of a new process group and the whole group is killed: on timeout,
//! and after a normal exit so that stray descendants cannot keep the pipes
//! open. Pipe output still pending after [`PIPE_GRACE`] is dropped.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use pdf2htmlex_auto::ToolHandle;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConversionConfig, ConversionRequest};
use crate::error::ConversionError;
use crate::output::{suggested_file_name, ConversionOutput, ConversionStats};
use crate::workarea::{WorkArea, OUTPUT_FILE_NAME};

/// How long stdout/stderr may stay open once the converter has exited.
const PIPE_GRACE: Duration = Duration::from_secs(5);

/// Executes conversions with a fixed [`ConversionConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConversionRunner {
    config: ConversionConfig,
}

impl ConversionRunner {
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert `request` with the converter described by `handle`.
    ///
    /// # Errors
    /// * [`ConversionError::ToolNotReady`] if `handle` is not ready (nothing is spawned).
    /// * [`ConversionError::ProcessError`] if the converter cannot be started or waited on.
    /// * [`ConversionError::ConversionTimedOut`] if the time limit expires.
    /// * [`ConversionError::ConversionFailed`] if no output file was written.
    /// * [`ConversionError::EmptyOutput`] if the output file is empty.
    /// * [`ConversionError::WorkAreaFailed`] on scratch-directory I/O errors.
    pub async fn run(
        &self,
        handle: &ToolHandle,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConversionError> {
        if !handle.is_ready() {
            return Err(ConversionError::ToolNotReady {
                state: handle.ready_state(),
            });
        }

        let start = Instant::now();
        let work = WorkArea::create(self.config.scratch_dir.as_deref())
            .map_err(|source| ConversionError::WorkAreaFailed { source })?;

        let input_path = work
            .write_input(request.input_bytes())
            .await
            .map_err(|source| ConversionError::WorkAreaFailed { source })?;
        let input_path = std::path::absolute(&input_path).unwrap_or(input_path);

        let args = build_args(handle, request, &input_path);
        debug!(
            "Running {} {:?}",
            handle.executable_path().display(),
            args
        );

        let exe = handle.executable_path();
        let mut cmd = Command::new(exe);
        cmd.args(&args)
            .current_dir(work.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(app_dir) = handle.app_dir() {
            cmd.env("APPDIR", app_dir);
        }
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| ConversionError::ProcessError {
            path: exe.to_path_buf(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        let stdout = tokio::spawn(drain(child.stdout.take()));
        let stderr = tokio::spawn(drain(child.stderr.take()));

        let timeout = self.config.timeout();
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, pid).await;
                stdout.abort();
                stderr.abort();
                return Err(ConversionError::ProcessError {
                    path: exe.to_path_buf(),
                    reason: format!("waiting for converter: {e}"),
                });
            }
            Err(_) => {
                warn!("pdf2htmlEX exceeded {:?}; killing it", timeout);
                terminate(&mut child, pid).await;
                stdout.abort();
                stderr.abort();
                return Err(ConversionError::ConversionTimedOut {
                    secs: self.config.timeout_secs,
                });
            }
        };

        // The converter is done; anything it left running goes with it.
        kill_group(pid).await;
        let (stdout, stderr) = tokio::join!(collect(stdout), collect(stderr));

        let elapsed = start.elapsed();
        debug!("pdf2htmlEX exited with {} after {:?}", status, elapsed);

        let html = work
            .read_output()
            .await
            .map_err(|source| ConversionError::WorkAreaFailed { source })?;

        classify(status, stdout, stderr, html).map(|html_bytes| {
            if !status.success() {
                warn!("pdf2htmlEX exited with {} but wrote output", status);
            }
            let stats = ConversionStats {
                input_bytes: request.input_bytes().len() as u64,
                output_bytes: html_bytes.len() as u64,
                exit_code: status.code(),
                duration_ms: elapsed.as_millis() as u64,
            };
            info!(
                "Converted {} ({} → {} bytes) in {}ms",
                request.original_file_name(),
                stats.input_bytes,
                stats.output_bytes,
                stats.duration_ms
            );
            ConversionOutput {
                html_bytes,
                suggested_file_name: suggested_file_name(request.original_file_name()),
                stats,
            }
        })
    }
}

/// Arguments passed to the converter, in order.
///
/// `--data-dir` only when the handle knows the data directory, `--zoom`
/// always, `--embed-font=0` only when fonts are not embedded, then the input
/// path and the output name relative to the working directory.
pub fn build_args(
    handle: &ToolHandle,
    request: &ConversionRequest,
    input_path: &Path,
) -> Vec<OsString> {
    let mut args = Vec::with_capacity(5);
    if let Some(dir) = handle.resource_dir() {
        let mut arg = OsString::from("--data-dir=");
        arg.push(dir);
        args.push(arg);
    }
    args.push(format!("--zoom={}", request.zoom_factor()).into());
    if !request.embed_fonts() {
        args.push("--embed-font=0".into());
    }
    args.push(input_path.into());
    args.push(OUTPUT_FILE_NAME.into());
    args
}

fn classify(
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    html: Option<Vec<u8>>,
) -> Result<Vec<u8>, ConversionError> {
    match html {
        None => Err(ConversionError::ConversionFailed {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
        }),
        Some(bytes) if bytes.is_empty() => Err(ConversionError::EmptyOutput),
        Some(bytes) => Ok(bytes),
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Reading converter output failed: {}", e);
        }
    }
    buf
}

/// Waits up to [`PIPE_GRACE`] for a drain task, giving up on pipes that a
/// process outside the group still holds.
async fn collect(mut task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(PIPE_GRACE, &mut task).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            debug!("Converter output task failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            task.abort();
            debug!("Converter output still open after {:?}; ignoring it", PIPE_GRACE);
            Vec::new()
        }
    }
}

/// Kill the child's process group, then the child itself, and reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid).await;
    if let Err(e) = child.start_kill() {
        debug!("start_kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Reaping pdf2htmlEX failed: {}", e);
    }
}

/// SIGKILL every process in the group led by `pid`. Failure (including an
/// already empty group) is only logged.
async fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            let group = format!("-{pid}");
            let killed = Command::new("kill")
                .args(["-KILL", "--", &group])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = killed {
                debug!("Killing process group {} failed: {}", group, e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}
