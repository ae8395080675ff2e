//! Finds a game install without being told where it is.
//!
//! Tries the usual Steam and Epic install locations, then every library listed in Steam's
//! `steamapps/libraryfolders.vdf`. A candidate counts when it has a `FactoryGame` directory.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Steam's directory name for the game under `steamapps/common`.
const STEAM_GAME_DIR: &str = "Satisfactory";

pub fn is_game_dir(path: &Path) -> bool {
	path.join("FactoryGame").is_dir()
}

/// Library paths from the contents of a `libraryfolders.vdf`.
pub fn library_paths(vdf: &str) -> Vec<PathBuf> {
	static PATH_VALUE: OnceLock<Regex> = OnceLock::new();
	let re = PATH_VALUE.get_or_init(|| Regex::new(r#""path"\s+"([^"]+)""#).expect("invalid library path regex"));

	re.captures_iter(vdf)
		.map(|c| PathBuf::from(c[1].replace("\\\\", "\\")))
		.collect()
}

fn steam_library_games(steam_root: &Path) -> Vec<PathBuf> {
	let vdf = steam_root.join("steamapps").join("libraryfolders.vdf");
	match std::fs::read_to_string(&vdf) {
		Ok(contents) => library_paths(&contents)
			.into_iter()
			.map(|library| library.join("steamapps").join("common").join(STEAM_GAME_DIR))
			.collect(),
		Err(e) => {
			log::trace!("No Steam libraries at {}: {}", vdf.display(), e);
			Vec::new()
		},
	}
}

/// Returns the first game directory among `candidates`, then among the libraries of each of `steam_roots`.
pub fn detect_in(candidates: &[PathBuf], steam_roots: &[PathBuf]) -> Option<PathBuf> {
	candidates.iter()
		.cloned()
		.chain(steam_roots.iter().flat_map(|root| steam_library_games(root)))
		.find(|p| {
			let found = is_game_dir(p);
			log::debug!("Checking {} for a game install: {}", p.display(), found);
			found
		})
}

#[cfg(target_os = "windows")]
pub fn default_steam_roots() -> Vec<PathBuf> {
	[r"C:\Program Files (x86)\Steam", r"C:\Program Files\Steam", r"D:\Steam", r"E:\Steam"]
		.iter()
		.map(PathBuf::from)
		.collect()
}

#[cfg(not(target_os = "windows"))]
pub fn default_steam_roots() -> Vec<PathBuf> {
	let Ok(home) = std::env::var("HOME") else {
		return Vec::new();
	};
	let home = PathBuf::from(home);
	vec![home.join(".steam/steam"), home.join(".local/share/Steam")]
}

/// Well known install locations.
#[cfg(target_os = "windows")]
pub fn default_candidates() -> Vec<PathBuf> {
	let steam = ["C:\\Steam", "D:\\Steam", "D:\\SteamLibrary", "E:\\Steam", "E:\\SteamLibrary", "F:\\Steam", "F:\\SteamLibrary"]
		.iter()
		.map(PathBuf::from)
		.chain(default_steam_roots())
		.map(|root| root.join("steamapps").join("common").join(STEAM_GAME_DIR));
	let epic = [
		r"C:\Program Files\Epic Games\Satisfactory",
		r"C:\Program Files\Epic Games\SatisfactoryExperimental",
		r"D:\Epic Games\Satisfactory",
		r"D:\Games\Satisfactory",
		r"E:\Epic Games\Satisfactory",
		r"F:\Epic Games\Satisfactory",
	].iter().map(PathBuf::from);
	steam.chain(epic).collect()
}

#[cfg(not(target_os = "windows"))]
pub fn default_candidates() -> Vec<PathBuf> {
	default_steam_roots()
		.into_iter()
		.map(|root| root.join("steamapps").join("common").join(STEAM_GAME_DIR))
		.collect()
}

/// Searches the default locations.
pub fn detect() -> Option<PathBuf> {
	detect_in(&default_candidates(), &default_steam_roots())
}
