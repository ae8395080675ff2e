//! Inventories the mods directory and judges whether each installed mod is usable.
//!
//! A mod directory is usable when it has a manifest (`*.uplugin`) or at least one content archive.
//! Only a directory with neither is invalid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const MANIFEST_EXTENSION: &str = "uplugin";
/// Packaged game content. `ucas`/`utoc` are the IO store companions of a `pak`.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["pak", "ucas", "utoc"];
pub const BINARY_EXTENSIONS: &[&str] = &["dll", "so"];

#[derive(Debug, Error)]
pub enum ScanError {
	/// The mods directory exists but can't be listed.
	#[error("cannot read mods directory {}: {source}", path.display())]
	ReadDir {
		path: PathBuf,
		source: std::io::Error,
	},
}

/// How usable an installed mod directory is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
	/// Manifest and content present.
	Valid,
	/// Content present, some distributions ship without a manifest.
	ValidNoManifest,
	/// Manifest present without any content archive.
	ValidNoContent,
	Invalid(String),
}

impl Validity {
	pub fn is_valid(&self) -> bool {
		!matches!(self, Validity::Invalid(_))
	}

	fn judge(has_manifest: bool, archive_files: usize) -> Self {
		match (has_manifest, archive_files > 0) {
			(true, true) => Validity::Valid,
			(false, true) => Validity::ValidNoManifest,
			(true, false) => Validity::ValidNoContent,
			(false, false) => Validity::Invalid("missing manifest and no content files".to_string()),
		}
	}
}

/// The parts of a `.uplugin` file we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
	pub file_name: String,
	/// `None` when the manifest couldn't be parsed or declares no version.
	pub version: Option<String>,
	/// Names of other plugins this one requires.
	pub dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UPlugin {
	sem_version: Option<String>,
	version_name: Option<String>,
	#[serde(default)]
	plugins: Vec<UPluginReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UPluginReference {
	name: String,
}

impl Manifest {
	/// Finds and reads the first manifest directly inside `dir`.
	pub fn find(dir: &Path) -> Option<Manifest> {
		let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir).ok()?
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter(|p| p.is_file() && has_extension(p, &[MANIFEST_EXTENSION]))
			.collect();
		candidates.sort();
		candidates.first().map(|p| Manifest::read(p))
	}

	/// Reads a manifest. A file that fails to parse is still a manifest, just without a version.
	pub fn read(path: &Path) -> Manifest {
		let file_name = path.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();

		let parsed = std::fs::read_to_string(path)
			.map_err(crate::Error::from)
			.and_then(|raw| serde_json::from_str::<UPlugin>(raw.trim_start_matches('\u{feff}')).map_err(crate::Error::from));

		match parsed {
			Ok(p) => Manifest {
				file_name,
				version: p.sem_version.or(p.version_name).filter(|v| !v.trim().is_empty()),
				dependencies: p.plugins.into_iter().map(|r| r.name).collect(),
			},
			Err(e) => {
				log::debug!("Unreadable manifest {}: {}", path.display(), e);
				Manifest { file_name, ..Default::default() }
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModStatus {
	pub identifier: String,
	pub installed: bool,
	pub validity: Validity,
	pub manifest: Option<Manifest>,
	pub archive_files: usize,
	pub binary_files: usize,
}

impl InstalledModStatus {
	fn not_installed(identifier: &str) -> Self {
		Self {
			identifier: identifier.to_string(),
			installed: false,
			validity: Validity::Invalid("not installed".to_string()),
			manifest: None,
			archive_files: 0,
			binary_files: 0,
		}
	}

	/// Installed and usable.
	pub fn valid(&self) -> bool {
		self.installed && self.validity.is_valid()
	}

	pub fn version(&self) -> Option<&str> {
		self.manifest.as_ref().and_then(|m| m.version.as_deref())
	}

	pub fn message(&self) -> String {
		match &self.validity {
			Validity::Valid => format!("valid ({} content files)", self.archive_files),
			Validity::ValidNoManifest => format!("valid, no manifest ({} content files)", self.archive_files),
			Validity::ValidNoContent => "valid but content-less, manifest without content files".to_string(),
			Validity::Invalid(reason) => reason.clone(),
		}
	}
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
	path.extension()
		.and_then(|e| e.to_str())
		.map_or(false, |e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Whether `identifier` names a directory directly under the mods directory.
///
/// Rejects separators, `.`, `..` and hidden names.
pub fn is_valid_identifier(identifier: &str) -> bool {
	let mut components = Path::new(identifier).components();
	matches!(
		(components.next(), components.next()),
		(Some(std::path::Component::Normal(name)), None) if name == identifier && !identifier.starts_with('.')
	)
}

/// Checks a single mod directory under `mods_dir`.
pub fn check(mods_dir: &Path, identifier: &str) -> InstalledModStatus {
	if !is_valid_identifier(identifier) {
		return InstalledModStatus::not_installed(identifier);
	}
	let dir = mods_dir.join(identifier);
	if !dir.is_dir() {
		return InstalledModStatus::not_installed(identifier);
	}

	let mut archive_files = 0;
	let mut binary_files = 0;
	for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
		if !entry.file_type().is_file() {
			continue;
		}
		if has_extension(entry.path(), ARCHIVE_EXTENSIONS) {
			archive_files += 1;
		} else if has_extension(entry.path(), BINARY_EXTENSIONS) {
			binary_files += 1;
		}
	}

	let manifest = Manifest::find(&dir);
	let validity = Validity::judge(manifest.is_some(), archive_files);
	log::trace!("{}: {:?}, {} archives, {} binaries", identifier, validity, archive_files, binary_files);

	InstalledModStatus {
		identifier: identifier.to_string(),
		installed: true,
		validity,
		manifest,
		archive_files,
		binary_files,
	}
}

/// Every directory name directly under `mods_dir`, sorted. A missing directory has no mods.
///
/// # Errors
/// - [`ScanError::ReadDir`] when the directory exists but can't be read.
pub fn installed_dirs(mods_dir: &Path) -> Result<Vec<String>, ScanError> {
	let read = match std::fs::read_dir(mods_dir) {
		Ok(r) => r,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(source) => return Err(ScanError::ReadDir { path: mods_dir.to_path_buf(), source }),
	};

	let mut dirs = Vec::new();
	for entry in read {
		let entry = entry.map_err(|source| ScanError::ReadDir { path: mods_dir.to_path_buf(), source })?;
		let name = entry.file_name().to_string_lossy().into_owned();
		/* Hidden entries are staging directories and the run lock. */
		if entry.path().is_dir() && !name.starts_with('.') {
			dirs.push(name);
		}
	}
	dirs.sort();
	Ok(dirs)
}

/// Checks every mod directory under `mods_dir`.
pub fn scan_installed(mods_dir: &Path) -> Result<HashMap<String, InstalledModStatus>, ScanError> {
	let statuses: HashMap<_, _> = installed_dirs(mods_dir)?
		.into_iter()
		.map(|id| {
			let status = check(mods_dir, &id);
			(id, status)
		})
		.collect();
	log::debug!("Scanned {} installed mods in {}", statuses.len(), mods_dir.display());
	Ok(statuses)
}

/// The identifiers in `required` that are absent or invalid, in the given order.
pub fn get_missing_mods(mods_dir: &Path, required: &[String]) -> Vec<String> {
	required.iter()
		.filter(|id| !check(mods_dir, id).valid())
		.cloned()
		.collect()
}
