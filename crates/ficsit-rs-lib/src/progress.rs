//! Progress notification and cancellation shared by long running operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives progress notifications.
///
/// Methods are called from whichever task is doing the work and must return quickly.
/// All methods default to doing nothing.
pub trait ProgressReporter: Send + Sync {
	/// A reconcile phase has started.
	fn phase_started(&self, _phase: crate::reconcile::Phase) {}
	/// A short status line about a single mod, e.g. "Downloading SML 3.7.0".
	fn mod_status(&self, _identifier: &str, _status: &str) {}
	/// Bytes received for a download. `total` is `None` when the server didn't send a length.
	fn download_progress(&self, _identifier: &str, _downloaded: u64, _total: Option<u64>) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Forwards progress to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
	fn phase_started(&self, phase: crate::reconcile::Phase) {
		log::info!("Starting phase {}", phase);
	}

	fn mod_status(&self, identifier: &str, status: &str) {
		log::info!("[{}] {}", identifier, status);
	}

	fn download_progress(&self, identifier: &str, downloaded: u64, total: Option<u64>) {
		match total {
			Some(total) => log::trace!("[{}] {}KB / {}KB", identifier, downloaded / 1024, total / 1024),
			None => log::trace!("[{}] {}KB", identifier, downloaded / 1024),
		}
	}
}

/// Cooperative cancellation flag.
///
/// Clones share the same flag. Checked at phase boundaries and between download chunks.
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
	cancelled: Arc<AtomicBool>,
}

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}
