use std::collections::HashMap;

use thiserror::Error;

pub mod scanner;
pub mod run_guard;
pub mod detect;

use scanner::{InstalledModStatus, ScanError};

#[derive(Debug, Error)]
pub enum GameInstanceError {
	#[error("required game files missing: {0}")]
	RequiredFilesMissing(std::io::Error),
	#[error("'{0}' is not a valid mod identifier")]
	InvalidIdentifier(String),
}

/// A single install (instance) of the game.
#[derive(Debug, Clone)]
pub struct GameInstance {
	path: std::path::PathBuf,
	mods_dir: std::path::PathBuf,
}

impl GameInstance {
	/// # Errors
	/// - [`GameInstanceError::RequiredFilesMissing`] when the root or its `FactoryGame` directory doesn't exist.
	pub fn new(game_root_directory: impl AsRef<std::path::Path>) -> Result<GameInstance, GameInstanceError> {
		let game_root_directory = game_root_directory.as_ref();
		std::fs::metadata(game_root_directory).map_err(GameInstanceError::RequiredFilesMissing)?;

		let factory_game = game_root_directory.join("FactoryGame");
		std::fs::metadata(&factory_game).map_err(GameInstanceError::RequiredFilesMissing)?;

		log::info!("Created new game instance at path {}", game_root_directory.display());

		Ok(GameInstance {
			path: game_root_directory.to_path_buf(),
			mods_dir: factory_game.join("Mods"),
		})
	}

	/// Looks for an install in the usual Steam and Epic locations.
	pub fn detect() -> Option<GameInstance> {
		let path = detect::detect()?;
		log::info!("Found game at {}", path.display());
		GameInstance::new(path).ok()
	}

	pub fn game_dir(&self) -> &std::path::Path {
		&self.path
	}

	/// `FactoryGame/Mods`, may not exist yet.
	pub fn mods_dir(&self) -> &std::path::Path {
		&self.mods_dir
	}

	pub fn mod_dir(&self, identifier: &str) -> std::path::PathBuf {
		self.mods_dir.join(identifier)
	}

	pub fn ensure_mods_dir(&self) -> std::io::Result<()> {
		std::fs::create_dir_all(&self.mods_dir)
	}

	/// Takes the in-flight lock for this instance.
	pub fn lock(&self) -> crate::Result<run_guard::RunGuard> {
		run_guard::RunGuard::acquire(&self.mods_dir)
	}

	/* Installed mods */

	pub fn installed_dirs(&self) -> Result<Vec<String>, ScanError> {
		scanner::installed_dirs(&self.mods_dir)
	}

	pub fn scan_installed(&self) -> Result<HashMap<String, InstalledModStatus>, ScanError> {
		scanner::scan_installed(&self.mods_dir)
	}

	pub fn check(&self, identifier: &str) -> InstalledModStatus {
		scanner::check(&self.mods_dir, identifier)
	}

	pub fn get_missing_mods(&self, required: &[String]) -> Vec<String> {
		scanner::get_missing_mods(&self.mods_dir, required)
	}

	/// Deletes an installed mod directory.
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the directory can't be removed.
	/// - [`GameInstance`](crate::Error::GameInstance) when `identifier` isn't a plain directory name.
	pub fn remove_mod(&self, identifier: &str) -> crate::Result<()> {
		if !scanner::is_valid_identifier(identifier) {
			return Err(GameInstanceError::InvalidIdentifier(identifier.to_string()).into());
		}
		log::info!("Removing mod {} from {}", identifier, self.mods_dir.display());
		std::fs::remove_dir_all(self.mod_dir(identifier))?;
		Ok(())
	}
}
