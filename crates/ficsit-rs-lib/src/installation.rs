//! Getting mod archives onto disk.
//!
//! Downloads run in parallel up to `max_parallel_fetches`, deploying into the mods directory happens one mod at a time.
//! Every download goes to its own scratch directory which is removed however the install ends.

use std::path::PathBuf;
use std::sync::Arc;

pub mod download;
pub mod content;
pub mod external_tool;

use download::{DownloadError, Fetcher};
use content::ContentError;
use crate::progress::{CancelToken, NoProgress, ProgressReporter};

/// Why an install failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFailure {
	/// Network or HTTP failure.
	Transport,
	/// Downloaded file is below the minimum plausible size.
	TooSmall,
	CorruptArchive,
	/// Extraction or copying failed after the download succeeded.
	Installation,
	Cancelled,
	/// No artifact for the configured platform.
	NoArtifact,
	Broken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
	pub identifier: String,
	pub success: bool,
	pub message: String,
	pub files_installed: usize,
	pub version: Option<String>,
	pub failure: Option<InstallFailure>,
}

impl InstallResult {
	pub fn failed(identifier: impl Into<String>, failure: InstallFailure, message: impl Into<String>) -> Self {
		Self {
			identifier: identifier.into(),
			success: false,
			message: message.into(),
			files_installed: 0,
			version: None,
			failure: Some(failure),
		}
	}

	fn installed(identifier: &str, files_installed: usize) -> Self {
		Self {
			identifier: identifier.to_string(),
			success: true,
			message: format!("Installed {} files", files_installed),
			files_installed,
			version: None,
			failure: None,
		}
	}
}

/// One mod to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
	pub identifier: String,
	pub version: Option<String>,
	pub download_url: Option<String>,
}

impl From<&crate::relationship_resolver::ResolvedMod> for InstallRequest {
	fn from(m: &crate::relationship_resolver::ResolvedMod) -> Self {
		Self {
			identifier: m.identifier.clone(),
			version: Some(m.version.clone()),
			download_url: m.download_url.clone(),
		}
	}
}

type FetchFailure = (InstallFailure, String);

pub struct Installer<F: Fetcher> {
	fetcher: Arc<F>,
	instance: crate::game_instance::GameInstance,
	min_download_size: u64,
	max_parallel: usize,
	progress: Arc<dyn ProgressReporter>,
	cancel: CancelToken,
}

impl<F: Fetcher + 'static> Installer<F> {
	pub fn new(fetcher: Arc<F>, instance: crate::game_instance::GameInstance, config: &crate::Config) -> Self {
		Self {
			fetcher,
			instance,
			min_download_size: config.min_download_size(),
			max_parallel: config.max_parallel_fetches(),
			progress: Arc::new(NoProgress),
			cancel: CancelToken::new(),
		}
	}

	pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
		self.progress = progress;
		self
	}

	pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn instance(&self) -> &crate::game_instance::GameInstance {
		&self.instance
	}

	/// Downloads and installs a single mod.
	pub async fn install(&self, identifier: &str, download_url: &str) -> InstallResult {
		if let Some(rejected) = reject_identifier(identifier) {
			return rejected;
		}
		let fetched = fetch_to_scratch(
			self.fetcher.as_ref(), self.progress.as_ref(), &self.cancel, self.min_download_size, identifier, download_url,
		).await;
		self.deploy(identifier, fetched).await
	}

	/// Installs every request, results are in request order.
	///
	/// Requests without a download url fail with [`InstallFailure::NoArtifact`] without touching the network.
	pub async fn install_all(&self, requests: &[InstallRequest]) -> Vec<InstallResult> {
		let mut results: Vec<Option<InstallResult>> = vec![None; requests.len()];
		let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_parallel));
		let mut set = tokio::task::JoinSet::new();

		for (index, request) in requests.iter().enumerate() {
			if let Some(rejected) = reject_identifier(&request.identifier) {
				results[index] = Some(rejected);
				continue;
			}
			let Some(url) = request.download_url.clone() else {
				results[index] = Some(InstallResult::failed(&request.identifier, InstallFailure::NoArtifact, "No download available for this platform"));
				continue;
			};

			let fetcher = self.fetcher.clone();
			let progress = self.progress.clone();
			let cancel = self.cancel.clone();
			let semaphore = semaphore.clone();
			let min = self.min_download_size;
			let identifier = request.identifier.clone();
			set.spawn(async move {
				let _permit = semaphore.acquire_owned().await;
				let fetched = fetch_to_scratch(fetcher.as_ref(), progress.as_ref(), &cancel, min, &identifier, &url).await;
				(index, fetched)
			});
		}

		/* Deploys happen here one at a time as downloads finish. */
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((index, fetched)) => {
					let request = &requests[index];
					let mut result = self.deploy(&request.identifier, fetched).await;
					result.version = request.version.clone();
					results[index] = Some(result);
				},
				Err(e) => log::error!("Download task failed: {}", e),
			}
		}

		results.into_iter()
			.zip(requests)
			.map(|(r, req)| r.unwrap_or_else(|| InstallResult::failed(&req.identifier, InstallFailure::Installation, "Download task did not complete")))
			.collect()
	}

	async fn deploy(&self, identifier: &str, fetched: Result<(tempfile::TempDir, PathBuf), FetchFailure>) -> InstallResult {
		let (scratch, archive) = match fetched {
			Ok(f) => f,
			Err((failure, message)) => {
				log::warn!("{}: {}", identifier, message);
				self.progress.mod_status(identifier, &message);
				return InstallResult::failed(identifier, failure, message);
			},
		};

		let dest = self.instance.mod_dir(identifier);
		if let Err(e) = self.instance.ensure_mods_dir() {
			return InstallResult::failed(identifier, InstallFailure::Installation, format!("Installation error: {}", e));
		}

		self.progress.mod_status(identifier, "Extracting");
		let id = identifier.to_string();
		let deployed = tokio::task::spawn_blocking(move || {
			let result = content::install_archive(&archive, scratch.path(), &dest, &id);
			drop(scratch);
			result
		}).await;

		let result = match deployed {
			Ok(Ok(files)) => InstallResult::installed(identifier, files),
			Ok(Err(ContentError::CorruptArchive(e))) => InstallResult::failed(identifier, InstallFailure::CorruptArchive, format!("Invalid archive format: {}", e)),
			Ok(Err(ContentError::NoFilesInstalled)) => InstallResult::failed(identifier, InstallFailure::Installation, "No files extracted from archive"),
			Ok(Err(e)) => InstallResult::failed(identifier, InstallFailure::Installation, format!("Installation error: {}", e)),
			Err(e) => InstallResult::failed(identifier, InstallFailure::Installation, format!("Installation error: {}", e)),
		};
		self.progress.mod_status(identifier, &result.message);
		result
	}
}

/// A failed result for identifiers that can't name a mod directory.
fn reject_identifier(identifier: &str) -> Option<InstallResult> {
	if crate::game_instance::scanner::is_valid_identifier(identifier) {
		return None;
	}
	log::warn!("Refusing to install '{}', not a valid mod identifier", identifier);
	Some(InstallResult::failed(identifier, InstallFailure::Installation, "Not a valid mod identifier"))
}

/// Downloads into a fresh scratch directory.
///
/// The scratch directory is handed back with the archive so it lives until the deploy is done.
async fn fetch_to_scratch<F: Fetcher>(fetcher: &F, progress: &dyn ProgressReporter, cancel: &CancelToken, min_download_size: u64, identifier: &str, url: &str)
-> Result<(tempfile::TempDir, PathBuf), FetchFailure> {
	if cancel.is_cancelled() {
		return Err((InstallFailure::Cancelled, "Cancelled before download".to_string()));
	}

	let scratch = tempfile::Builder::new()
		.prefix("ficsit-rs-")
		.tempdir()
		.map_err(|e| (InstallFailure::Installation, format!("Installation error: {}", e)))?;
	let archive = scratch.path().join(format!("{}.smod", identifier));

	progress.mod_status(identifier, "Downloading");
	let size = match fetcher.fetch(identifier, url, &archive, progress, cancel).await {
		Ok(size) => size,
		Err(DownloadError::Cancelled) => return Err((InstallFailure::Cancelled, "Download cancelled".to_string())),
		Err(e) => return Err((InstallFailure::Transport, format!("Download error: {}", e))),
	};

	if size < min_download_size {
		return Err((InstallFailure::TooSmall, format!("Download too small ({} bytes), likely corrupt or empty", size)));
	}
	Ok((scratch, archive))
}
