//! Various helpers for testing
//!
//! Test doubles for the catalog, downloads and the external tool, plus builders for game directories and mod archives.
//! functions in this module should use results and not use any panics to avoid confusion in callers

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use ficsit_rs::catalog::{Catalog, CatalogEntry, CatalogError, CatalogVersion, Compatibility, Target};
use ficsit_rs::game_instance::GameInstance;
use ficsit_rs::installation::download::{DownloadError, Fetcher};
use ficsit_rs::installation::external_tool::{ExternalTool, ToolError, ToolOutput};
use ficsit_rs::progress::{CancelToken, ProgressReporter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("copy error: {0}")]
	Copy(#[from] fs_extra::error::Error),
	#[error("game instance error: {0}")]
	GameInstance(#[from] ficsit_rs::game_instance::GameInstanceError),
}

pub type FixtureResult<T> = Result<T, FixtureError>;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Download url the mock catalog gives a mod.
pub fn download_url(identifier: &str) -> String {
	format!("https://mods.invalid/{}.smod", identifier)
}

/* Catalog */

/// In memory catalog. Every mod gets a `Windows` target at [`download_url()`].
#[derive(Debug, Default)]
pub struct MockCatalog {
	entries: HashMap<String, CatalogEntry>,
	versions: HashMap<String, Vec<CatalogVersion>>,
	lookups: Mutex<Vec<String>>,
}

impl MockCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_mod(mut self, identifier: &str, version: &str, dependencies: &[&str]) -> Self {
		self.entries.insert(identifier.to_string(), CatalogEntry {
			identifier: identifier.to_string(),
			version: version.to_string(),
			dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
			targets: vec![Target { platform: "Windows".to_string(), link: download_url(identifier) }],
			compatibility: HashMap::new(),
		});
		self
	}

	/// Marks an added mod as broken on the `EA` branch.
	pub fn broken(mut self, identifier: &str, note: &str) -> Self {
		if let Some(entry) = self.entries.get_mut(identifier) {
			entry.compatibility.insert("EA".to_string(), Compatibility { state: "Broken".to_string(), note: Some(note.to_string()) });
		}
		self
	}

	/// Drops every download target of an added mod.
	pub fn without_targets(mut self, identifier: &str) -> Self {
		if let Some(entry) = self.entries.get_mut(identifier) {
			entry.targets.clear();
		}
		self
	}

	/// Versions as `(version, created_at)`, in any order.
	pub fn with_versions(mut self, identifier: &str, versions: &[(&str, &str)]) -> Self {
		self.versions.insert(identifier.to_string(), versions.iter()
			.map(|(v, c)| CatalogVersion { version: v.to_string(), created_at: c.to_string() })
			.collect());
		self
	}

	/// Every identifier looked up so far, in call order.
	pub fn lookups(&self) -> Vec<String> {
		locked(&self.lookups).clone()
	}
}

impl Catalog for MockCatalog {
	async fn lookup(&self, identifier: &str) -> Result<CatalogEntry, CatalogError> {
		locked(&self.lookups).push(identifier.to_string());
		self.entries.get(identifier).cloned().ok_or(CatalogError::NotFound)
	}

	async fn versions(&self, identifier: &str) -> Result<Vec<CatalogVersion>, CatalogError> {
		locked(&self.lookups).push(identifier.to_string());
		match self.versions.get(identifier) {
			Some(v) => Ok(v.clone()),
			None => self.entries.get(identifier)
				.map(|e| vec![CatalogVersion { version: e.version.clone(), created_at: "2024-01-01T00:00:00Z".to_string() }])
				.ok_or(CatalogError::NotFound),
		}
	}
}

/* Downloads */

/// Serves bodies from memory. Unknown urls answer 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
	bodies: HashMap<String, Vec<u8>>,
	fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_body(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
		self.bodies.insert(url.into(), body);
		self
	}

	/// Serves a valid archive of the mod at its [`download_url()`].
	pub fn with_mod(self, identifier: &str, version: &str, dependencies: &[&str]) -> FixtureResult<Self> {
		let body = mod_archive(identifier, version, dependencies)?;
		Ok(self.with_body(download_url(identifier), body))
	}

	pub fn fetched(&self) -> Vec<String> {
		locked(&self.fetched).clone()
	}
}

impl Fetcher for MockFetcher {
	async fn fetch(&self, identifier: &str, url: &str, dest: &Path, progress: &dyn ProgressReporter, cancel: &CancelToken) -> Result<u64, DownloadError> {
		locked(&self.fetched).push(identifier.to_string());
		if cancel.is_cancelled() {
			return Err(DownloadError::Cancelled);
		}
		let body = self.bodies.get(url).ok_or(DownloadError::Status(404))?;
		tokio::fs::write(dest, body).await?;
		progress.download_progress(identifier, body.len() as u64, Some(body.len() as u64));
		Ok(body.len() as u64)
	}
}

/* External tool */

/// Records every invocation. Answers with the first response whose prefix matches the arguments, success otherwise.
#[derive(Debug, Default)]
pub struct MockTool {
	responses: Vec<(Vec<String>, ToolOutput)>,
	calls: Mutex<Vec<Vec<String>>>,
}

impl MockTool {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn respond(mut self, prefix: &[&str], success: bool, text: &str) -> Self {
		self.responses.push((
			prefix.iter().map(|p| p.to_string()).collect(),
			ToolOutput { success, text: text.to_string() },
		));
		self
	}

	pub fn calls(&self) -> Vec<Vec<String>> {
		locked(&self.calls).clone()
	}
}

impl ExternalTool for MockTool {
	async fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
		locked(&self.calls).push(args.to_vec());
		Ok(self.responses.iter()
			.find(|(prefix, _)| args.starts_with(prefix))
			.map(|(_, output)| output.clone())
			.unwrap_or(ToolOutput { success: true, text: String::new() }))
	}
}

/* Fixtures */

/// A zip laid out like a published mod: `<id>/<id>.uplugin` and a pak well above the minimum download size.
pub fn mod_archive(identifier: &str, version: &str, dependencies: &[&str]) -> FixtureResult<Vec<u8>> {
	let manifest = manifest_json(version, dependencies);
	zip_archive(&[
		(format!("{0}/{0}.uplugin", identifier), manifest.into_bytes()),
		(format!("{0}/Content/Paks/Windows/{0}.pak", identifier), vec![0x5A; 2048]),
	])
}

/// Builds an uncompressed zip from `(path, contents)` pairs.
pub fn zip_archive(files: &[(String, Vec<u8>)]) -> FixtureResult<Vec<u8>> {
	let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
	let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
	for (path, contents) in files {
		zip.start_file(path.as_str(), options)?;
		zip.write_all(contents)?;
	}
	Ok(zip.finish()?.into_inner())
}

fn manifest_json(version: &str, dependencies: &[&str]) -> String {
	let plugins: Vec<_> = dependencies.iter()
		.map(|d| serde_json::json!({ "Name": d, "Enabled": true }))
		.collect();
	serde_json::json!({
		"FileVersion": 3,
		"SemVersion": version,
		"VersionName": version,
		"Plugins": plugins,
	}).to_string()
}

/// An empty game install in a temporary directory.
pub fn fake_game() -> FixtureResult<(tempfile::TempDir, GameInstance)> {
	let dir = tempfile::tempdir()?;
	std::fs::create_dir_all(dir.path().join("FactoryGame").join("Mods"))?;
	let game = GameInstance::new(dir.path())?;
	Ok((dir, game))
}

/// Writes an installed mod directly into the game's mods directory.
pub fn install_fake_mod(game: &GameInstance, identifier: &str, version: &str, dependencies: &[&str]) -> FixtureResult<()> {
	let dir = game.mod_dir(identifier);
	std::fs::create_dir_all(dir.join("Content/Paks/Windows"))?;
	std::fs::write(dir.join(format!("{}.uplugin", identifier)), manifest_json(version, dependencies))?;
	std::fs::write(dir.join(format!("Content/Paks/Windows/{}.pak", identifier)), [0x5A; 64])?;
	Ok(())
}

/// Copies a whole game directory into a new temporary one.
pub fn clone_game(game: &GameInstance) -> FixtureResult<(tempfile::TempDir, GameInstance)> {
	let dir = tempfile::tempdir()?;
	let options = fs_extra::dir::CopyOptions::new().content_only(true);
	fs_extra::dir::copy(game.game_dir(), dir.path(), &options)?;
	let copy = GameInstance::new(dir.path())?;
	Ok((dir, copy))
}

/// Lists every file under `path` relative to it, sorted.
pub fn list_files(path: &Path) -> FixtureResult<Vec<String>> {
	let mut files = Vec::new();
	if !path.exists() {
		return Ok(files);
	}
	let content = fs_extra::dir::get_dir_content(path)?;
	for file in content.files {
		if let Ok(relative) = Path::new(&file).strip_prefix(path) {
			files.push(relative.to_string_lossy().replace('\\', "/"));
		}
	}
	files.sort();
	Ok(files)
}
