//! Library configuration.
//!
//! Saved as `config.json` in the data directory. Any field missing from the file takes its default value.

use serde::{Serialize, Deserialize};

pub const DEFAULT_CATALOG_URL: &str = "https://api.ficsit.app";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	data_dir: std::path::PathBuf,
	/// Origin of the catalog API, relative download links are joined onto this.
	catalog_url: String,
	https_only: bool,
	/// Target name used to pick a download link from the catalog, e.g. `Windows` or `LinuxServer`.
	platform: String,
	/// Game branch whose compatibility state gates installs, `EA` or `EXP`.
	game_branch: String,
	/// Identifiers always added to a resolve regardless of what was requested. The first is the mod loader runtime.
	mandatory_mods: Vec<String>,
	/// Downloads smaller than this are treated as corrupt.
	min_download_size: u64,
	max_parallel_fetches: usize,
	request_timeout_secs: u64,
	download_timeout_secs: u64,
	external_tool: Option<std::path::PathBuf>,
	profile_name: String,
	/// Remove mod directories that are not part of the desired set before installing.
	remove_unlisted: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: default_data_dir(),
			catalog_url: DEFAULT_CATALOG_URL.to_string(),
			https_only: true,
			platform: "Windows".to_string(),
			game_branch: "EA".to_string(),
			mandatory_mods: vec!["SML".to_string()],
			min_download_size: 1000,
			max_parallel_fetches: 4,
			request_timeout_secs: 60,
			download_timeout_secs: 300,
			external_tool: None,
			profile_name: "ficsit-rs".to_string(),
			remove_unlisted: true,
		}
	}
}

fn default_data_dir() -> std::path::PathBuf {
	#[cfg(target_os = "windows")]
	let path = std::env::var("APPDATA")
		.map(std::path::PathBuf::from)
		.unwrap_or_else(|_| std::env::temp_dir());

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_DATA_HOME") {
		std::path::PathBuf::from(e)
	} else if let Ok(home) = std::env::var("HOME") {
		std::path::PathBuf::from(home).join(".local/share")
	} else {
		std::env::temp_dir()
	};

	path.join("ficsit-rs")
}

impl Config {
	/// Loads `config.json` from the default data directory.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the file can't be read.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when the file isn't a valid config.
	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_file(default_data_dir().join("config.json"))
	}

	pub fn load_from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path.as_ref())?;
		let config: Config = serde_json::from_reader(std::io::BufReader::new(file))?;
		log::debug!("Loaded config from {}", path.as_ref().display());
		Ok(config)
	}

	/// Saves the config to `config.json` in [`data_dir()`](Config::data_dir()).
	pub fn save_to_disk(&self) -> crate::Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		let file = std::fs::File::create(self.data_dir.join("config.json"))?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	pub fn data_dir(&self) -> &std::path::Path {
		&self.data_dir
	}
	pub fn set_data_dir(&mut self, data_dir: std::path::PathBuf) {
		self.data_dir = data_dir;
	}

	pub fn catalog_url(&self) -> &str {
		&self.catalog_url
	}
	pub fn set_catalog_url(&mut self, catalog_url: impl Into<String>) {
		self.catalog_url = catalog_url.into();
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn platform(&self) -> &str {
		&self.platform
	}
	pub fn set_platform(&mut self, platform: impl Into<String>) {
		self.platform = platform.into();
	}

	pub fn game_branch(&self) -> &str {
		&self.game_branch
	}
	pub fn set_game_branch(&mut self, branch: impl Into<String>) {
		self.game_branch = branch.into();
	}

	pub fn mandatory_mods(&self) -> &[String] {
		&self.mandatory_mods
	}
	pub fn set_mandatory_mods(&mut self, mandatory_mods: Vec<String>) {
		self.mandatory_mods = mandatory_mods;
	}

	pub fn min_download_size(&self) -> u64 {
		self.min_download_size
	}
	pub fn set_min_download_size(&mut self, size: u64) {
		self.min_download_size = size;
	}

	/// Always at least 1.
	pub fn max_parallel_fetches(&self) -> usize {
		self.max_parallel_fetches.max(1)
	}
	pub fn set_max_parallel_fetches(&mut self, value: usize) {
		self.max_parallel_fetches = value;
	}

	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}
	pub fn download_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.download_timeout_secs)
	}

	pub fn external_tool(&self) -> Option<&std::path::Path> {
		self.external_tool.as_deref()
	}
	/// returns if the path is a file or not, the path is only stored when it is.
	pub fn set_external_tool(&mut self, path: Option<std::path::PathBuf>) -> bool {
		match path {
			Some(p) if !p.is_file() => false,
			p => {
				self.external_tool = p;
				true
			},
		}
	}

	pub fn profile_name(&self) -> &str {
		&self.profile_name
	}
	pub fn set_profile_name(&mut self, name: impl Into<String>) {
		self.profile_name = name.into();
	}

	pub fn remove_unlisted(&self) -> bool {
		self.remove_unlisted
	}
	pub fn set_remove_unlisted(&mut self, value: bool) {
		self.remove_unlisted = value;
	}

	pub fn version_cache_path(&self) -> std::path::PathBuf {
		self.data_dir.join("version-cache.bin")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_use_defaults() {
		let config: Config = serde_json::from_str(r#"{ "platform": "LinuxServer", "max_parallel_fetches": 0 }"#).expect("config should parse");
		assert_eq!(config.platform(), "LinuxServer");
		assert_eq!(config.mandatory_mods(), ["SML".to_string()]);
		assert_eq!(config.min_download_size(), 1000);
		assert_eq!(config.max_parallel_fetches(), 1);
		assert!(config.remove_unlisted());
	}

	#[test]
	fn save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = Config::default();
		config.set_data_dir(dir.path().to_path_buf());
		config.set_profile_name("server");
		config.save_to_disk().unwrap();

		let loaded = Config::load_from_file(dir.path().join("config.json")).unwrap();
		assert_eq!(loaded.profile_name(), "server");
		assert_eq!(loaded.data_dir(), dir.path());
	}
}
