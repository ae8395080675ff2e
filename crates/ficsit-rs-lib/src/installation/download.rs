//! Downloads a mod's archive.

use std::future::Future;
use std::path::Path;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::progress::{CancelToken, ProgressReporter};

#[derive(Debug, Error)]
pub enum DownloadError {
	#[error("server responded with status {0}")]
	Status(u16),
	#[error("download cancelled.")]
	Cancelled,
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// Fetches an artifact to a local file.
pub trait Fetcher: Send + Sync {
	/// Writes the body at `url` to `dest` and returns the number of bytes written.
	///
	/// Implementations should check `cancel` between chunks and report progress as they go.
	fn fetch(&self, identifier: &str, url: &str, dest: &Path, progress: &dyn ProgressReporter, cancel: &CancelToken)
	-> impl Future<Output = Result<u64, DownloadError>> + Send;
}

/// Streams downloads over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
	client: reqwest::Client,
}

impl HttpFetcher {
	pub fn new(config: &crate::Config) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.timeout(config.download_timeout())
			.user_agent(concat!("ficsit-rs/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { client })
	}

	pub fn with_client(client: reqwest::Client) -> Self {
		Self { client }
	}
}

impl Fetcher for HttpFetcher {
	async fn fetch(&self, identifier: &str, url: &str, dest: &Path, progress: &dyn ProgressReporter, cancel: &CancelToken) -> Result<u64, DownloadError> {
		log::info!("Downloading {} from {}", identifier, url);
		let mut response = self.client.get(url).send().await?;
		if !response.status().is_success() {
			return Err(DownloadError::Status(response.status().as_u16()));
		}

		let total = response.content_length();
		let mut file = tokio::fs::File::create(dest).await?;
		let mut downloaded = 0u64;

		while let Some(chunk) = response.chunk().await? {
			if cancel.is_cancelled() {
				return Err(DownloadError::Cancelled);
			}
			file.write_all(&chunk).await?;
			downloaded += chunk.len() as u64;
			progress.download_progress(identifier, downloaded, total);
		}
		file.flush().await?;

		log::debug!("Downloaded {} bytes for {}", downloaded, identifier);
		Ok(downloaded)
	}
}
