//! Keeps two runs from writing to the same mods directory at once.

use std::io::Write;

pub const LOCK_FILE_NAME: &str = ".ficsit-rs.lock";

/// Held for the duration of a run, the lock file is removed on drop.
#[derive(Debug)]
pub struct RunGuard {
	path: std::path::PathBuf,
}

impl RunGuard {
	/// # Errors
	/// - [`AlreadyExists`](crate::Error::AlreadyExists) when another run holds the lock.
	/// - [`IO`](crate::Error::IO) when the lock file can't be created.
	pub fn acquire(mods_dir: &std::path::Path) -> crate::Result<RunGuard> {
		std::fs::create_dir_all(mods_dir)?;
		let path = mods_dir.join(LOCK_FILE_NAME);
		let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
			Ok(f) => f,
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
				log::warn!("Another run holds {}", path.display());
				return Err(crate::Error::AlreadyExists);
			},
			Err(e) => return Err(e.into()),
		};
		writeln!(file, "{}", std::process::id())?;
		log::trace!("Acquired run lock {}", path.display());
		Ok(RunGuard { path })
	}
}

impl Drop for RunGuard {
	fn drop(&mut self) {
		if let Err(e) = std::fs::remove_file(&self.path) {
			log::error!("Failed to remove run lock {}: {}", self.path.display(), e);
		}
	}
}
