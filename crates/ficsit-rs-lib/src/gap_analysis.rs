//! Difference between the resolved mods and what's on disk.

use std::collections::{HashMap, HashSet};

use crate::game_instance::scanner::InstalledModStatus;
use crate::relationship_resolver::ResolvedMod;

#[derive(Debug, Clone, Default)]
pub struct GapAnalysisResult {
	/// Resolved identifiers that should be installed, broken mods excluded.
	pub needed_mods: Vec<String>,
	pub installed: HashMap<String, InstalledModStatus>,
	/// Needed but not on disk.
	pub missing: Vec<String>,
	/// Needed and on disk but unusable.
	pub invalid: Vec<String>,
	pub valid: Vec<String>,
}

impl GapAnalysisResult {
	pub fn all_ok(&self) -> bool {
		self.missing.is_empty() && self.invalid.is_empty()
	}

	/// Missing mods first then invalid ones, each in resolve order.
	pub fn mods_to_install(&self) -> Vec<String> {
		self.missing.iter().chain(self.invalid.iter()).cloned().collect()
	}
}

/// Sorts every installable mod in `resolved` into missing, invalid or valid.
///
/// Broken mods are dropped here too so callers can pass the raw resolve output.
pub fn analyze<'a>(resolved: impl IntoIterator<Item = &'a ResolvedMod>, installed: HashMap<String, InstalledModStatus>) -> GapAnalysisResult {
	let mut result = GapAnalysisResult::default();
	let mut seen = HashSet::<&str>::new();

	for m in resolved.into_iter().filter(|m| !m.is_broken()) {
		if !seen.insert(m.identifier.as_str()) {
			continue;
		}
		let id = m.identifier.clone();
		match installed.get(&id) {
			None => result.missing.push(id.clone()),
			Some(status) if !status.valid() => result.invalid.push(id.clone()),
			Some(_) => result.valid.push(id.clone()),
		}
		result.needed_mods.push(id);
	}

	log::debug!("Gap analysis: {} missing, {} invalid, {} valid", result.missing.len(), result.invalid.len(), result.valid.len());
	result.installed = installed;
	result
}
