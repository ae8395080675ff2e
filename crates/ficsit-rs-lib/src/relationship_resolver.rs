//! Computes the full set of mods to install from a list of desired mods.
//!
//! # Usage
//! 1. Create a [`RelationshipResolver`] over a [`Catalog`](crate::catalog::Catalog).
//! 1. [`RelationshipResolver::resolve_all()`] with the requested identifiers.
//! 1. Read [`ResolveOutcome::resolved`] for the install order, dependencies always come before their dependants
//! and the mandatory mods come first.
//!
//! Lookups that fail are recorded in [`ResolveOutcome::errors`] and don't stop the rest of the resolve.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogEntry, CatalogError};
use crate::game_instance::scanner::is_valid_identifier;

mod dependency_graph;
use dependency_graph::DependencyGraph;

/// A mod as resolved against the catalog for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMod {
	pub identifier: String,
	pub version: String,
	/// `None` when the mod has no artifact for the configured platform.
	pub download_url: Option<String>,
	/// Identifiers only, resolve them through the [`ResolveOutcome`].
	pub dependencies: Vec<String>,
	pub compatibility_warning: Option<String>,
}

impl ResolvedMod {
	pub fn from_entry(entry: CatalogEntry, platform: &str, branch: &str) -> Self {
		Self {
			download_url: entry.download_link(platform).map(str::to_string),
			compatibility_warning: entry.compatibility_warning(branch),
			identifier: entry.identifier,
			version: entry.version,
			dependencies: entry.dependencies,
		}
	}

	/// Broken mods are kept in the resolve output but must never be installed.
	pub fn is_broken(&self) -> bool {
		self.compatibility_warning
			.as_deref()
			.map_or(false, |w| w.contains(crate::catalog::BROKEN_MARKER))
	}
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
	/// Dependency first ordering.
	pub resolved: Vec<ResolvedMod>,
	/// Identifiers that couldn't be looked up and why.
	pub errors: BTreeMap<String, String>,
}

impl ResolveOutcome {
	pub fn is_empty(&self) -> bool {
		self.resolved.is_empty()
	}

	pub fn get(&self, identifier: &str) -> Option<&ResolvedMod> {
		self.resolved.iter().find(|m| m.identifier == identifier)
	}

	/// Resolved mods that can be installed, in install order.
	pub fn installable(&self) -> impl Iterator<Item = &ResolvedMod> {
		self.resolved.iter().filter(|m| !m.is_broken())
	}

	pub fn broken(&self) -> impl Iterator<Item = &ResolvedMod> {
		self.resolved.iter().filter(|m| m.is_broken())
	}
}

fn reject(errors: &mut BTreeMap<String, String>, identifier: &str) {
	log::warn!("Refusing to resolve '{}', not a valid mod identifier", identifier);
	errors.insert(identifier.to_string(), "not a valid mod identifier".to_string());
}

pub struct RelationshipResolver<C: Catalog> {
	catalog: Arc<C>,
	mandatory: Vec<String>,
	platform: String,
	branch: String,
	max_parallel: usize,
}

impl<C: Catalog + 'static> RelationshipResolver<C> {
	pub fn new(catalog: Arc<C>, config: &crate::Config) -> Self {
		Self {
			catalog,
			mandatory: config.mandatory_mods().to_vec(),
			platform: config.platform().to_string(),
			branch: config.game_branch().to_string(),
			max_parallel: config.max_parallel_fetches(),
		}
	}

	pub fn mandatory(&self) -> &[String] {
		&self.mandatory
	}

	/// Resolves the dependency closure of `identifiers` plus the mandatory mods.
	///
	/// Each call starts from an empty state, nothing is carried between runs.
	/// Lookups are issued in waves of at most `max_parallel_fetches` concurrent requests.
	pub async fn resolve_all(&self, identifiers: &[String]) -> ResolveOutcome {
		let roots = self.roots(identifiers);
		log::info!("Resolving {} requested mods", roots.len());

		let mut entries = HashMap::<String, ResolvedMod>::new();
		let mut errors = BTreeMap::<String, String>::new();
		let mut queued: HashSet<String> = roots.iter().cloned().collect();
		let mut queue = VecDeque::<String>::new();
		for identifier in &roots {
			if is_valid_identifier(identifier) {
				queue.push_back(identifier.clone());
			} else {
				reject(&mut errors, identifier);
			}
		}

		while !queue.is_empty() {
			let take = queue.len().min(self.max_parallel);
			let wave: Vec<String> = queue.drain(..take).collect();
			let mut results = self.lookup_wave(&wave).await;

			for identifier in wave {
				match results.remove(&identifier) {
					Some(Ok(entry)) => {
						let resolved = ResolvedMod::from_entry(entry, &self.platform, &self.branch);
						if let Some(warning) = &resolved.compatibility_warning {
							log::warn!("{} {}: {}", identifier, resolved.version, warning);
						}
						for dep in &resolved.dependencies {
							if !queued.insert(dep.clone()) {
								continue;
							}
							if is_valid_identifier(dep) {
								log::trace!("Queueing {} as a dependency of {}", dep, identifier);
								queue.push_back(dep.clone());
							} else {
								reject(&mut errors, dep);
							}
						}
						entries.insert(identifier, resolved);
					},
					Some(Err(e)) => {
						log::warn!("Failed to resolve {}: {}", identifier, e);
						errors.insert(identifier, e.to_string());
					},
					None => {
						errors.insert(identifier, "lookup task did not complete".to_string());
					},
				}
			}
		}

		let order = DependencyGraph::from_resolved(&entries).install_order(&roots, &self.mandatory);
		let resolved = order.into_iter()
			.filter_map(|id| entries.remove(&id))
			.collect::<Vec<_>>();

		log::info!("Resolved {} mods, {} failed", resolved.len(), errors.len());
		ResolveOutcome { resolved, errors }
	}

	/// Mandatory mods first then the requested ones, without duplicates or blanks.
	fn roots(&self, identifiers: &[String]) -> Vec<String> {
		let mut seen = HashSet::<&str>::new();
		self.mandatory.iter()
			.chain(identifiers.iter())
			.map(|s| s.trim())
			.filter(|s| !s.is_empty() && seen.insert(*s))
			.map(str::to_string)
			.collect()
	}

	async fn lookup_wave(&self, wave: &[String]) -> HashMap<String, Result<CatalogEntry, CatalogError>> {
		let mut set = tokio::task::JoinSet::new();
		for identifier in wave {
			let catalog = self.catalog.clone();
			let identifier = identifier.clone();
			set.spawn(async move {
				let result = catalog.lookup(&identifier).await;
				(identifier, result)
			});
		}

		let mut results = HashMap::new();
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((identifier, result)) => { results.insert(identifier, result); },
				Err(e) => log::error!("Catalog lookup task failed: {}", e),
			}
		}
		results
	}
}
