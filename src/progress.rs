//! Progress reporting and batch lifecycle.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] through any operation
//! config's `progress_callback` setter to receive events as a batch runs.
//!
//! Items are processed one at a time, so events arrive in strict index order
//! from a single task. The trait is still `Send + Sync` because the pipeline
//! runs on a multi-threaded Tokio runtime.
//!
//! # Example
//!
//! ```rust
//! use edgequake_imgpdf::{BatchProgressCallback, CompressionConfig, ProgressUpdate};
//! use std::sync::Arc;
//!
//! struct PrintProgress;
//!
//! impl BatchProgressCallback for PrintProgress {
//!     fn on_progress(&self, update: &ProgressUpdate) {
//!         eprintln!("{:>5.1}%  {}", update.percent, update.message);
//!     }
//! }
//!
//! let config = CompressionConfig::builder()
//!     .progress_callback(Arc::new(PrintProgress))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ImgPdfError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One progress observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// 0-based index of the item about to be processed; equals `total` on
    /// the final observation.
    pub index: usize,
    pub total: usize,
    /// `index / total × 100`.
    pub percent: f32,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(index: usize, total: usize, message: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            index as f32 / total as f32 * 100.0
        };
        Self {
            index,
            total,
            percent,
            message: message.into(),
        }
    }
}

/// Called by the batch orchestrator as it works through its items.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first item.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before each item, then once more at 100% on success.
    fn on_progress(&self, update: &ProgressUpdate) {
        let _ = update;
    }

    /// Called after an item produced its output.
    ///
    /// # Arguments
    /// * `index`      — 0-based item index
    /// * `total`      — number of items in the batch
    /// * `output_len` — byte length of what the item produced
    fn on_item_complete(&self, index: usize, total: usize, output_len: u64) {
        let _ = (index, total, output_len);
    }

    /// Called when an item fails. No further events follow.
    fn on_batch_failed(&self, index: usize, error: &str) {
        let _ = (index, error);
    }

    /// Called once after every item succeeded.
    fn on_batch_complete(&self, total: usize, total_bytes: u64) {
        let _ = (total, total_bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the operation configs.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Lifecycle of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Enforces `Idle → Running → Completed | Failed`.
///
/// A terminal run goes back to `Idle` only through [`BatchRun::reset`].
#[derive(Debug, Default)]
pub struct BatchRun {
    state: BatchState,
}

impl BatchRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), ImgPdfError> {
        self.transition(BatchState::Idle, BatchState::Running)
    }

    pub fn complete(&mut self) -> Result<(), ImgPdfError> {
        self.transition(BatchState::Running, BatchState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), ImgPdfError> {
        self.transition(BatchState::Running, BatchState::Failed)
    }

    /// Return a finished run to `Idle`. A running batch cannot be reset.
    pub fn reset(&mut self) -> Result<(), ImgPdfError> {
        if self.state == BatchState::Running {
            return Err(ImgPdfError::Internal("cannot reset a running batch".into()));
        }
        self.state = BatchState::Idle;
        Ok(())
    }

    fn transition(&mut self, from: BatchState, to: BatchState) -> Result<(), ImgPdfError> {
        if self.state != from {
            return Err(ImgPdfError::Internal(format!(
                "invalid batch transition {} → {}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}
