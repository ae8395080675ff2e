//! Unpacks a mod archive and deploys it into the mods directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
	/// The file isn't a zip archive.
	#[error("invalid archive format: {0}")]
	CorruptArchive(zip::result::ZipError),
	#[error("zip error: {0}")]
	Zip(zip::result::ZipError),
	#[error("no files were installed")]
	NoFilesInstalled,
	#[error("path {0} is outside the content root")]
	OutsideRoot(PathBuf),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ContentError {
	fn from(e: zip::result::ZipError) -> Self {
		match e {
			zip::result::ZipError::InvalidArchive(_) | zip::result::ZipError::UnsupportedArchive(_) => ContentError::CorruptArchive(e),
			zip::result::ZipError::Io(io) => ContentError::IO(io),
			e => ContentError::Zip(e),
		}
	}
}

pub fn extract(archive: &Path, dest: &Path) -> Result<(), ContentError> {
	let file = std::fs::File::open(archive)?;
	let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))?;
	log::trace!("Extracting {} entries from {}", zip.len(), archive.display());
	zip.extract(dest)?;
	Ok(())
}

/// Finds the directory inside an extracted archive that holds the mod itself.
///
/// In order: a directory named after the mod, the root when it holds a manifest, the only directory when there
/// is exactly one, otherwise the root.
pub fn find_content_root(extracted: &Path, identifier: &str) -> Result<PathBuf, ContentError> {
	let named = extracted.join(identifier);
	if named.is_dir() {
		return Ok(named);
	}

	let mut dirs = Vec::new();
	for entry in std::fs::read_dir(extracted)? {
		let path = entry?.path();
		if path.is_dir() {
			dirs.push(path);
		} else if path.extension().map_or(false, |e| e.eq_ignore_ascii_case(crate::game_instance::scanner::MANIFEST_EXTENSION)) {
			return Ok(extracted.to_path_buf());
		}
	}

	if dirs.len() == 1 {
		Ok(dirs.remove(0))
	} else {
		Ok(extracted.to_path_buf())
	}
}

/// Copies every file under `src` into `dest` keeping the layout. Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize, ContentError> {
	let mut copied = 0;
	for entry in walkdir::WalkDir::new(src) {
		let entry = entry.map_err(|e| ContentError::IO(e.into()))?;
		let relative = pathdiff::diff_paths(entry.path(), src)
			.ok_or_else(|| ContentError::OutsideRoot(entry.path().to_path_buf()))?;
		let target = dest.join(relative);

		if entry.file_type().is_dir() {
			std::fs::create_dir_all(&target)?;
		} else if entry.file_type().is_file() {
			if let Some(parent) = target.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::copy(entry.path(), &target)?;
			copied += 1;
		}
	}
	Ok(copied)
}

/// Staging directory used while replacing `dest`, a hidden sibling of it.
pub fn staging_path(dest: &Path) -> Result<PathBuf, ContentError> {
	let name = dest.file_name().ok_or_else(|| ContentError::OutsideRoot(dest.to_path_buf()))?;
	Ok(dest.with_file_name(format!(".{}.partial", name.to_string_lossy())))
}

fn discard_staging(staging: &Path) {
	if let Err(e) = std::fs::remove_dir_all(staging) {
		log::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
	}
}

/// Fills a staging directory with `fill` then swaps it in for `dest`.
///
/// `dest` is only touched once `fill` has succeeded, and is then either the new content or missing.
/// The staging directory never outlives the call.
///
/// # Errors
/// - Whatever `fill` returns.
/// - [`ContentError::NoFilesInstalled`] when `fill` reports zero files.
pub fn replace_dir<F>(dest: &Path, fill: F) -> Result<usize, ContentError>
where
	F: FnOnce(&Path) -> Result<usize, ContentError>,
{
	let staging = staging_path(dest)?;
	if staging.exists() {
		log::debug!("Removing stale staging directory {}", staging.display());
		std::fs::remove_dir_all(&staging)?;
	}
	std::fs::create_dir_all(&staging)?;

	let filled = match fill(&staging) {
		Ok(0) => Err(ContentError::NoFilesInstalled),
		r => r,
	};
	let copied = match filled {
		Ok(c) => c,
		Err(e) => {
			discard_staging(&staging);
			return Err(e);
		},
	};

	let swapped = (|| {
		if dest.exists() {
			std::fs::remove_dir_all(dest)?;
		}
		std::fs::rename(&staging, dest)
	})();
	if let Err(e) = swapped {
		discard_staging(&staging);
		return Err(e.into());
	}
	Ok(copied)
}

/// Extracts `archive` in `scratch` and replaces `dest` with the mod's content.
///
/// The content is copied into a staging directory first, so a failed or interrupted copy never leaves a
/// partly written `dest`.
///
/// # Errors
/// - [`ContentError::CorruptArchive`] when `archive` isn't a zip.
/// - [`ContentError::NoFilesInstalled`] when nothing would be copied, `dest` is left as it was.
pub fn install_archive(archive: &Path, scratch: &Path, dest: &Path, identifier: &str) -> Result<usize, ContentError> {
	let extracted = scratch.join("extracted");
	std::fs::create_dir_all(&extracted)?;
	extract(archive, &extracted)?;

	let root = find_content_root(&extracted, identifier)?;
	log::debug!("Content root for {} is {}", identifier, root.display());

	let copied = replace_dir(dest, |staging| copy_tree(&root, staging))?;
	log::info!("Installed {} files for {}", copied, identifier);
	Ok(copied)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_zip(path: &Path, files: &[(&str, &str)]) {
		let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
		for (name, contents) in files {
			zip.start_file(*name, zip::write::FileOptions::default()).unwrap();
			zip.write_all(contents.as_bytes()).unwrap();
		}
		zip.finish().unwrap();
	}

	#[test]
	fn content_root_rules() {
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path();

		std::fs::create_dir_all(root.join("named/Mod/Content")).unwrap();
		std::fs::create_dir_all(root.join("named/Other")).unwrap();
		assert_eq!(find_content_root(&root.join("named"), "Mod").unwrap(), root.join("named/Mod"));

		std::fs::create_dir_all(root.join("manifest/Content")).unwrap();
		std::fs::create_dir_all(root.join("manifest/Binaries")).unwrap();
		std::fs::write(root.join("manifest/Mod.uplugin"), "{}").unwrap();
		assert_eq!(find_content_root(&root.join("manifest"), "Mod").unwrap(), root.join("manifest"));

		std::fs::create_dir_all(root.join("single/Wrapped/Content")).unwrap();
		assert_eq!(find_content_root(&root.join("single"), "Mod").unwrap(), root.join("single/Wrapped"));

		std::fs::create_dir_all(root.join("many/A")).unwrap();
		std::fs::create_dir_all(root.join("many/B")).unwrap();
		assert_eq!(find_content_root(&root.join("many"), "Mod").unwrap(), root.join("many"));
	}

	#[test]
	fn install_replaces_existing_directory() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("Mod.smod");
		write_zip(&archive, &[("Mod.uplugin", "{}"), ("Content/Paks/Windows/Mod.pak", "pak")]);

		let dest = dir.path().join("Mods/Mod");
		std::fs::create_dir_all(&dest).unwrap();
		std::fs::write(dest.join("stale.txt"), "old").unwrap();

		let scratch = tempfile::tempdir().unwrap();
		let copied = install_archive(&archive, scratch.path(), &dest, "Mod").unwrap();
		assert_eq!(copied, 2);
		assert!(dest.join("Content/Paks/Windows/Mod.pak").is_file());
		assert!(!dest.join("stale.txt").exists());
	}

	#[test]
	fn not_a_zip_is_corrupt() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("bad.smod");
		std::fs::write(&archive, vec![b'x'; 2000]).unwrap();
		let result = install_archive(&archive, dir.path(), &dir.path().join("Mods/Bad"), "Bad");
		assert!(matches!(result, Err(ContentError::CorruptArchive(_))));
		assert!(!dir.path().join("Mods/Bad").exists());
	}

	#[test]
	fn empty_archive_installs_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let archive = dir.path().join("empty.smod");
		write_zip(&archive, &[]);
		let dest = dir.path().join("Mods/Empty");
		let result = install_archive(&archive, dir.path(), &dest, "Empty");
		assert!(matches!(result, Err(ContentError::NoFilesInstalled)));
		assert!(!dest.exists());
	}

	#[test]
	fn failed_copy_keeps_the_old_install() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("Mods/Mod");
		std::fs::create_dir_all(&dest).unwrap();
		std::fs::write(dest.join("Mod.uplugin"), "old").unwrap();

		let result = replace_dir(&dest, |staging| {
			std::fs::write(staging.join("Mod.uplugin"), "new")?;
			Err(ContentError::IO(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
		});
		assert!(matches!(result, Err(ContentError::IO(_))));
		assert_eq!(std::fs::read_to_string(dest.join("Mod.uplugin")).unwrap(), "old");
		assert!(!staging_path(&dest).unwrap().exists());
	}

	#[test]
	fn failed_copy_of_new_mod_leaves_it_missing() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("Mods/Mod");
		std::fs::create_dir_all(dir.path().join("Mods")).unwrap();

		let result = replace_dir(&dest, |staging| {
			std::fs::write(staging.join("Mod.uplugin"), "{}")?;
			Err(ContentError::IO(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
		});
		assert!(result.is_err());
		assert!(!dest.exists());
		assert_eq!(std::fs::read_dir(dir.path().join("Mods")).unwrap().count(), 0);
	}

	#[test]
	fn stale_staging_is_replaced() {
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("Mods/Mod");
		let staging = staging_path(&dest).unwrap();
		assert_eq!(staging, dir.path().join("Mods/.Mod.partial"));
		std::fs::create_dir_all(&staging).unwrap();
		std::fs::write(staging.join("leftover"), "x").unwrap();

		let copied = replace_dir(&dest, |s| {
			std::fs::write(s.join("Mod.uplugin"), "{}")?;
			Ok(1)
		}).unwrap();
		assert_eq!(copied, 1);
		assert!(!dest.join("leftover").exists());
		assert!(!staging.exists());
	}
}
