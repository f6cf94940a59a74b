//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::Converter::with_progress`] to hear when provisioning starts and
//! ends and when each conversion starts, completes or fails.
//!
//! # Why callbacks instead of channels?
//!
//! The first call may spend minutes downloading pdf2htmlEX. Callers that want
//! to show that (a spinner, a log line, a status field in a web response)
//! forward these events wherever they like; the library never prints.
//!
//! # Example
//!
//! ```rust
//! use pdf2html::{ConversionProgressCallback, Converter};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_conversion_complete(&self, output_len: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n}: {output_len} bytes of HTML");
//!     }
//! }
//!
//! let converter = Converter::default()
//!     .with_progress(Arc::new(CountingCallback { done: AtomicUsize::new(0) }));
//! ```

use std::sync::Arc;

/// Called by [`crate::Converter`] around provisioning and each run.
///
/// Implementations must be `Send + Sync`: one converter may serve many
/// concurrent conversions. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called before the converter is located or downloaded.
    fn on_provision_start(&self) {}

    /// Called once provisioning settles.
    ///
    /// # Arguments
    /// * `ok`: `false` when pdf2htmlEX could not be made available
    fn on_provision_complete(&self, ok: bool) {
        let _ = ok;
    }

    /// Called just before pdf2htmlEX is started.
    ///
    /// # Arguments
    /// * `file_name`: the request's original file name
    /// * `input_len`: size of the PDF in bytes
    fn on_conversion_start(&self, file_name: &str, input_len: usize) {
        let _ = (file_name, input_len);
    }

    /// Called when HTML was produced.
    fn on_conversion_complete(&self, output_len: usize) {
        let _ = output_len;
    }

    /// Called when provisioning or the run failed.
    fn on_conversion_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Shared handle stored by [`crate::Converter`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_provision_complete(&self, ok: bool) {
            self.events.lock().unwrap().push(format!("provisioned:{ok}"));
        }

        fn on_conversion_error(&self, error: &str) {
            self.events.lock().unwrap().push(format!("error:{error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_provision_start();
        cb.on_provision_complete(true);
        cb.on_conversion_start("a.pdf", 10);
        cb.on_conversion_complete(42);
        cb.on_conversion_error("boom");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_provision_start();
        rec.on_provision_complete(false);
        rec.on_conversion_error("download failed");
        assert_eq!(
            *rec.events.lock().unwrap(),
            ["provisioned:false", "error:download failed"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start("x.pdf", 1);
        cb.on_conversion_complete(1);
    }
}
