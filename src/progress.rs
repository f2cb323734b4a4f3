//! Observer trait for session progress events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::session::Session::with_observer`] to hear about each blocking
//! model call as it starts and ends. The CLI uses this to drive a spinner;
//! other front-ends can forward events to a log, a socket or a status bar
//! without the library knowing how the host application displays them.
//!
//! # Example
//!
//! ```rust
//! use rex_report::{ReportId, SessionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     reports: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountingObserver {
//!     fn on_generation_complete(&self, id: &ReportId, body_len: usize) {
//!         let n = self.reports.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("report #{n}: {id} ({body_len} chars)");
//!     }
//! }
//! ```

use crate::error::Stage;
use crate::report::ReportId;
use std::sync::Arc;

/// Called by the session around each external model call.
///
/// All methods have default no-op implementations so observers only
/// override what they care about.
pub trait SessionObserver: Send + Sync {
    /// Called after a valid image was encoded, before the vision call.
    ///
    /// # Arguments
    /// * `image_name` — file name of the upload, or `<upload>`
    /// * `byte_len`   — size of the original image
    fn on_extraction_start(&self, image_name: &str, byte_len: usize) {
        let _ = (image_name, byte_len);
    }

    /// Called when the vision model returned text.
    fn on_extraction_complete(&self, text_len: usize) {
        let _ = text_len;
    }

    /// Called just before the generation request is sent.
    fn on_generation_start(&self, text_len: usize) {
        let _ = text_len;
    }

    /// Called when a report was generated and stamped.
    fn on_generation_complete(&self, id: &ReportId, body_len: usize) {
        let _ = (id, body_len);
    }

    /// Called when a stage produced no result.
    ///
    /// # Arguments
    /// * `stage` — which stage failed
    /// * `error` — human-readable error description
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias matching the type stored in the session.
pub type ObserverHandle = Arc<dyn SessionObserver>;
