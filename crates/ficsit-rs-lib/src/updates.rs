//! Finding and applying newer versions of installed mods.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::catalog::{Catalog, CatalogError, CatalogVersion};
use crate::game_instance::GameInstance;
use crate::installation::{InstallFailure, InstallRequest, InstallResult, Installer};
use crate::installation::download::Fetcher;
use crate::relationship_resolver::ResolvedMod;

/// Published versions per mod, newest first.
///
/// Entries stay until [`invalidate()`](VersionCache::invalidate()) or [`clear()`](VersionCache::clear()), there is no expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionCache {
	entries: HashMap<String, Vec<CatalogVersion>>,
}

impl VersionCache {
	/// Reads a cache written by [`save()`](VersionCache::save()), a missing file gives an empty cache.
	///
	/// # Errors
	/// - [`Bincode`](crate::error::Error::Bincode) when the file isn't a cache.
	pub fn load(path: &std::path::Path) -> crate::Result<Self> {
		match std::fs::File::open(path) {
			Ok(f) => Ok(bincode::deserialize_from(std::io::BufReader::new(f))?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
			Err(e) => Err(e.into()),
		}
	}

	pub fn save(&self, path: &std::path::Path) -> crate::Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		bincode::serialize_into(std::io::BufWriter::new(file), self)?;
		Ok(())
	}

	/// Versions of `identifier`, asking the catalog only when not cached.
	pub async fn get_or_fetch<C: Catalog>(&mut self, catalog: &C, identifier: &str) -> Result<&[CatalogVersion], CatalogError> {
		if !self.entries.contains_key(identifier) {
			let mut versions = catalog.versions(identifier).await?;
			versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
			log::trace!("Cached {} versions of {}", versions.len(), identifier);
			self.entries.insert(identifier.to_string(), versions);
		}
		Ok(self.entries.get(identifier).map(Vec::as_slice).unwrap_or_default())
	}

	pub fn get(&self, identifier: &str) -> Option<&[CatalogVersion]> {
		self.entries.get(identifier).map(Vec::as_slice)
	}

	pub fn invalidate(&mut self, identifier: &str) {
		self.entries.remove(identifier);
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
	pub identifier: String,
	pub name: String,
	/// `None` when the mod isn't installed or its manifest has no version.
	pub installed_version: Option<String>,
	pub latest_version: String,
	/// Installed and the version strings differ. No semantic comparison is made.
	pub needs_update: bool,
}

pub struct UpdateChecker<C: Catalog> {
	catalog: Arc<C>,
	cache: VersionCache,
	cache_path: Option<std::path::PathBuf>,
	platform: String,
	branch: String,
}

impl<C: Catalog> UpdateChecker<C> {
	/// A checker with an in memory cache.
	pub fn new(catalog: Arc<C>, config: &crate::Config) -> Self {
		Self {
			catalog,
			cache: VersionCache::default(),
			cache_path: None,
			platform: config.platform().to_string(),
			branch: config.game_branch().to_string(),
		}
	}

	/// A checker whose cache is loaded from and saved to [`Config::version_cache_path()`](crate::Config::version_cache_path()).
	///
	/// An unreadable cache is discarded.
	pub fn with_persistence(catalog: Arc<C>, config: &crate::Config) -> Self {
		let path = config.version_cache_path();
		let cache = VersionCache::load(&path).unwrap_or_else(|e| {
			log::warn!("Discarding unreadable version cache {}: {}", path.display(), e);
			VersionCache::default()
		});
		Self {
			cache,
			cache_path: Some(path),
			..Self::new(catalog, config)
		}
	}

	pub fn cache(&self) -> &VersionCache {
		&self.cache
	}

	fn persist(&self) {
		if let Some(path) = &self.cache_path {
			if let Err(e) = self.cache.save(path) {
				log::warn!("Failed to save version cache: {}", e);
			}
		}
	}

	/// Compares installed versions against the newest published ones.
	///
	/// Mods the catalog can't answer for are left out.
	pub async fn check_for_updates(&mut self, game: &GameInstance, identifiers: &[String], names: &crate::ModList) -> Vec<UpdateInfo> {
		let mut updates = Vec::new();
		for identifier in identifiers {
			let latest = match self.cache.get_or_fetch(self.catalog.as_ref(), identifier).await {
				Ok(versions) => match versions.first() {
					Some(v) => v.version.clone(),
					None => {
						log::warn!("{} has no published versions", identifier);
						continue;
					},
				},
				Err(e) => {
					log::warn!("Failed to get versions of {}: {}", identifier, e);
					continue;
				},
			};

			let status = game.check(identifier);
			let installed_version = if status.valid() { status.version().map(str::to_string) } else { None };
			let needs_update = installed_version.as_deref().map_or(false, |v| v != latest);
			if needs_update {
				log::info!("{} can be updated from {:?} to {}", identifier, installed_version, latest);
			}

			updates.push(UpdateInfo {
				identifier: identifier.clone(),
				name: names.name_of(identifier).to_string(),
				installed_version,
				latest_version: latest,
				needs_update,
			});
		}
		self.persist();
		updates
	}

	/// Installs the latest version of every mod that needs an update.
	///
	/// Successfully updated mods are dropped from the cache so the next check asks the catalog again.
	pub async fn apply_updates<F: Fetcher + 'static>(&mut self, installer: &Installer<F>, updates: &[UpdateInfo]) -> Vec<InstallResult> {
		let mut requests = Vec::new();
		let mut results = Vec::new();

		for update in updates.iter().filter(|u| u.needs_update) {
			match self.catalog.lookup(&update.identifier).await {
				Ok(entry) => {
					let resolved = ResolvedMod::from_entry(entry, &self.platform, &self.branch);
					if resolved.is_broken() {
						let warning = resolved.compatibility_warning.clone().unwrap_or_default();
						results.push(InstallResult::failed(&update.identifier, InstallFailure::Broken, warning));
					} else {
						requests.push(InstallRequest::from(&resolved));
					}
				},
				Err(e) => results.push(InstallResult::failed(&update.identifier, InstallFailure::Transport, format!("Lookup failed: {}", e))),
			}
		}

		for result in installer.install_all(&requests).await {
			if result.success {
				self.cache.invalidate(&result.identifier);
			}
			results.push(result);
		}
		self.persist();
		results
	}
}
