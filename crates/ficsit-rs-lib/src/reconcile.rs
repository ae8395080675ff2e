//! Brings a game's mods directory in line with a list of desired mods.
//!
//! A run moves through the [`Phase`]s in order, each adding a [`PhaseResult`] to the [`ReconcileReport`]:
//! 1. Cleanup, removes mod directories nothing desired needs. The dependency closure is looked up here
//!    so that it can be kept.
//! 1. Resolve, reports that closure. Nothing resolving ends the run.
//! 1. ExternalInstall, only when an external tool is configured.
//! 1. Scan, what is on disk. Failing to read the mods directory ends the run.
//! 1. GapAnalysis, ends the run successfully when nothing needs installing.
//! 1. Install, downloads whatever is missing or invalid.
//! 1. Verify, the final scan which decides whether the run succeeded.
//!
//! Cancellation is checked before each phase.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::game_instance::GameInstance;
use crate::gap_analysis::GapAnalysisResult;
use crate::installation::{InstallRequest, InstallResult, Installer};
use crate::installation::download::Fetcher;
use crate::installation::external_tool::{ExternalTool, ExternalToolBackend, FicsitCli};
use crate::progress::{CancelToken, NoProgress, ProgressReporter};
use crate::relationship_resolver::{RelationshipResolver, ResolveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Cleanup,
	Resolve,
	ExternalInstall,
	Scan,
	GapAnalysis,
	Install,
	Verify,
}

impl std::fmt::Display for Phase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Phase::Cleanup => "cleanup",
			Phase::Resolve => "resolve",
			Phase::ExternalInstall => "external install",
			Phase::Scan => "scan",
			Phase::GapAnalysis => "gap analysis",
			Phase::Install => "install",
			Phase::Verify => "verify",
		};
		f.write_str(name)
	}
}

/// Outcome of one phase. Not changed once the phase is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResult {
	pub phase: Phase,
	pub success: bool,
	pub message: String,
	pub details: Vec<String>,
}

impl PhaseResult {
	fn new(phase: Phase, success: bool, message: impl Into<String>, details: Vec<String>) -> Self {
		Self { phase, success, message: message.into(), details }
	}
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
	pub success: bool,
	pub cancelled: bool,
	pub phases: Vec<PhaseResult>,
	pub resolved: Option<ResolveOutcome>,
	pub gap: Option<GapAnalysisResult>,
	/// Direct installs attempted in this run.
	pub install_results: Vec<InstallResult>,
}

impl ReconcileReport {
	pub fn phase(&self, phase: Phase) -> Option<&PhaseResult> {
		self.phases.iter().find(|p| p.phase == phase)
	}

	fn finish(mut self, success: bool) -> Self {
		self.success = success;
		self
	}
}

pub struct Orchestrator<C: Catalog, F: Fetcher, T: ExternalTool = FicsitCli> {
	catalog: Arc<C>,
	fetcher: Arc<F>,
	tool: Option<ExternalToolBackend<T>>,
	config: crate::Config,
	progress: Arc<dyn ProgressReporter>,
	cancel: CancelToken,
}

impl<C: Catalog + 'static, F: Fetcher + 'static> Orchestrator<C, F, FicsitCli> {
	/// An orchestrator using only direct downloads.
	pub fn new(catalog: Arc<C>, fetcher: Arc<F>, config: crate::Config) -> Self {
		Self {
			catalog,
			fetcher,
			tool: None,
			config,
			progress: Arc::new(NoProgress),
			cancel: CancelToken::new(),
		}
	}
}

impl<C: Catalog + 'static, F: Fetcher + 'static, T: ExternalTool> Orchestrator<C, F, T> {
	/// Installs through `tool` first, falling back to direct downloads for anything it didn't install.
	pub fn with_external_tool<U: ExternalTool>(self, tool: U) -> Orchestrator<C, F, U> {
		let backend = ExternalToolBackend::new(tool, self.config.profile_name());
		Orchestrator {
			catalog: self.catalog,
			fetcher: self.fetcher,
			tool: Some(backend),
			config: self.config,
			progress: self.progress,
			cancel: self.cancel,
		}
	}

	pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
		self.progress = progress;
		self
	}

	pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn config(&self) -> &crate::Config {
		&self.config
	}

	pub fn cancel_token(&self) -> &CancelToken {
		&self.cancel
	}

	fn resolver(&self) -> RelationshipResolver<C> {
		RelationshipResolver::new(self.catalog.clone(), &self.config)
	}

	fn installer(&self, game: &GameInstance) -> Installer<F> {
		Installer::new(self.fetcher.clone(), game.clone(), &self.config)
			.with_progress(self.progress.clone())
			.with_cancel(self.cancel.clone())
	}

	/// Returns false and marks the report cancelled when the run should stop before `phase`.
	fn checkpoint(&self, report: &mut ReconcileReport, phase: Phase) -> bool {
		if self.cancel.is_cancelled() {
			log::warn!("Run cancelled before {}", phase);
			report.cancelled = true;
			return false;
		}
		log::info!("Starting {}", phase);
		self.progress.phase_started(phase);
		true
	}

	/// Runs every phase against `game`.
	///
	/// # Errors
	/// - [`AlreadyExists`](crate::Error::AlreadyExists) when another run holds the lock on this game's mods.
	/// - [`IO`](crate::Error::IO) when the lock can't be taken.
	///
	/// Everything else is reported through the phases.
	pub async fn run(&self, game: &GameInstance, requested: &[String]) -> crate::Result<ReconcileReport> {
		let _guard = game.lock()?;
		let mut report = ReconcileReport::default();

		/* Cleanup */
		if !self.checkpoint(&mut report, Phase::Cleanup) {
			return Ok(report.finish(false));
		}
		let outcome = self.resolver().resolve_all(requested).await;
		report.phases.push(self.cleanup(game, requested, &outcome));

		/* Resolve */
		if !self.checkpoint(&mut report, Phase::Resolve) {
			report.resolved = Some(outcome);
			return Ok(report.finish(false));
		}
		report.phases.push(resolve_phase(&outcome));
		if outcome.is_empty() {
			report.resolved = Some(outcome);
			return Ok(report.finish(false));
		}
		let installable: Vec<String> = outcome.installable().map(|m| m.identifier.clone()).collect();

		/* External tool */
		let mut confirmed = HashSet::<String>::new();
		if let Some(tool) = &self.tool {
			if !self.checkpoint(&mut report, Phase::ExternalInstall) {
				report.resolved = Some(outcome);
				return Ok(report.finish(false));
			}
			let external = tool.install(game.game_dir(), &installable).await;
			let mut details = external.details;
			details.extend(external.failed.iter().map(|(id, e)| format!("{}: {}", id, e)));
			let message = if external.ok {
				format!("Installed {} mods with the external tool", external.succeeded.len())
			} else {
				format!("External tool confirmed {} of {} mods, falling back to direct download", external.succeeded.len(), installable.len())
			};
			report.phases.push(PhaseResult::new(Phase::ExternalInstall, external.ok, message, details));
			confirmed.extend(external.succeeded);
		}

		/* Scan */
		if !self.checkpoint(&mut report, Phase::Scan) {
			report.resolved = Some(outcome);
			return Ok(report.finish(false));
		}
		let installed = match game.scan_installed() {
			Ok(i) => i,
			Err(e) => {
				report.phases.push(PhaseResult::new(Phase::Scan, false, e.to_string(), vec![]));
				report.resolved = Some(outcome);
				return Ok(report.finish(false));
			},
		};
		report.phases.push(PhaseResult::new(
			Phase::Scan, true,
			format!("Found {} installed mods", installed.len()),
			scan_details(&installed),
		));

		/* Gap analysis */
		if !self.checkpoint(&mut report, Phase::GapAnalysis) {
			report.resolved = Some(outcome);
			return Ok(report.finish(false));
		}
		let gap = crate::gap_analysis::analyze(&outcome.resolved, installed);
		report.phases.push(gap_phase(&gap, &outcome));
		if gap.all_ok() {
			log::info!("All {} mods are installed and valid", gap.needed_mods.len());
			report.resolved = Some(outcome);
			report.gap = Some(gap);
			return Ok(report.finish(true));
		}

		/* Install */
		if !self.checkpoint(&mut report, Phase::Install) {
			report.resolved = Some(outcome);
			report.gap = Some(gap);
			return Ok(report.finish(false));
		}
		let requests: Vec<InstallRequest> = gap.mods_to_install()
			.iter()
			.filter(|id| !confirmed.contains(*id))
			.filter_map(|id| outcome.get(id))
			.map(InstallRequest::from)
			.collect();
		let results = self.installer(game).install_all(&requests).await;
		report.phases.push(install_phase(&results));
		report.install_results = results;

		/* Verify */
		if !self.checkpoint(&mut report, Phase::Verify) {
			report.resolved = Some(outcome);
			report.gap = Some(gap);
			return Ok(report.finish(false));
		}
		let verify = verify_phase(game, &installable);
		let success = verify.success;
		report.phases.push(verify);
		report.resolved = Some(outcome);
		report.gap = Some(gap);
		Ok(report.finish(success))
	}

	/// Resolve, scan and gap analysis without changing anything on disk.
	///
	/// Succeeds when nothing would need installing.
	pub async fn verify(&self, game: &GameInstance, requested: &[String]) -> crate::Result<ReconcileReport> {
		let mut report = ReconcileReport::default();

		let outcome = self.resolver().resolve_all(requested).await;
		report.phases.push(resolve_phase(&outcome));
		if outcome.is_empty() {
			report.resolved = Some(outcome);
			return Ok(report.finish(false));
		}

		let installed = game.scan_installed()?;
		report.phases.push(PhaseResult::new(
			Phase::Scan, true,
			format!("Found {} installed mods", installed.len()),
			scan_details(&installed),
		));

		let gap = crate::gap_analysis::analyze(&outcome.resolved, installed);
		report.phases.push(gap_phase(&gap, &outcome));
		let ok = gap.all_ok();
		report.resolved = Some(outcome);
		report.gap = Some(gap);
		Ok(report.finish(ok))
	}

	/// Identifiers that must survive cleanup.
	///
	/// The requested and mandatory mods, everything the catalog resolved for them, and everything their installed
	/// manifests say they depend on. Ids whose lookup failed are kept too.
	fn desired_on_disk(&self, game: &GameInstance, requested: &[String], outcome: &ResolveOutcome) -> HashSet<String> {
		let mut desired = HashSet::<String>::new();
		let mut queue: VecDeque<String> = self.config.mandatory_mods().iter()
			.chain(requested)
			.chain(outcome.resolved.iter().flat_map(|m| std::iter::once(&m.identifier).chain(&m.dependencies)))
			.chain(outcome.errors.keys())
			.cloned()
			.collect();
		while let Some(id) = queue.pop_front() {
			if !desired.insert(id.clone()) {
				continue;
			}
			if let Some(manifest) = game.check(&id).manifest {
				queue.extend(manifest.dependencies.into_iter().filter(|d| !desired.contains(d)));
			}
		}
		desired
	}

	fn cleanup(&self, game: &GameInstance, requested: &[String], outcome: &ResolveOutcome) -> PhaseResult {
		if !self.config.remove_unlisted() {
			return PhaseResult::new(Phase::Cleanup, true, "Skipped, removing unlisted mods is disabled", vec![]);
		}

		let installed = match game.installed_dirs() {
			Ok(d) => d,
			Err(e) => return PhaseResult::new(Phase::Cleanup, false, e.to_string(), vec![]),
		};

		let desired = self.desired_on_disk(game, requested, outcome);
		let mut details = Vec::new();
		let mut failures = 0;
		for id in installed.iter().filter(|id| !desired.contains(*id)) {
			match game.remove_mod(id) {
				Ok(_) => details.push(format!("Removed {}", id)),
				Err(e) => {
					log::warn!("Failed to remove {}: {}", id, e);
					details.push(format!("Failed to remove {}: {}", id, e));
					failures += 1;
				},
			}
		}

		let removed = details.len() - failures;
		let message = if failures == 0 {
			format!("Removed {} unlisted mods", removed)
		} else {
			format!("Removed {} unlisted mods, {} could not be removed", removed, failures)
		};
		PhaseResult::new(Phase::Cleanup, failures == 0, message, details)
	}
}

fn resolve_phase(outcome: &ResolveOutcome) -> PhaseResult {
	let mut details = Vec::new();
	for m in &outcome.resolved {
		match &m.compatibility_warning {
			Some(w) => details.push(format!("{} {} ({})", m.identifier, m.version, w)),
			None => details.push(format!("{} {}", m.identifier, m.version)),
		}
	}
	for (id, e) in &outcome.errors {
		details.push(format!("{}: {}", id, e));
	}

	let success = !outcome.is_empty();
	let message = if success {
		format!("Resolved {} mods, {} broken, {} failed", outcome.resolved.len(), outcome.broken().count(), outcome.errors.len())
	} else {
		"No mods could be resolved".to_string()
	};
	PhaseResult::new(Phase::Resolve, success, message, details)
}

fn scan_details(installed: &std::collections::HashMap<String, crate::game_instance::scanner::InstalledModStatus>) -> Vec<String> {
	let mut details: Vec<String> = installed.values()
		.map(|s| format!("{}: {}", s.identifier, s.message()))
		.collect();
	details.sort();
	details
}

fn gap_phase(gap: &GapAnalysisResult, outcome: &ResolveOutcome) -> PhaseResult {
	let mut details = Vec::new();
	details.extend(gap.missing.iter().map(|id| format!("{}: missing", id)));
	details.extend(gap.invalid.iter().map(|id| format!("{}: invalid", id)));
	details.extend(outcome.broken().map(|m| format!("{}: skipped, {}", m.identifier, m.compatibility_warning.as_deref().unwrap_or_default())));

	let message = if gap.all_ok() {
		format!("All {} mods are installed and valid", gap.valid.len())
	} else {
		format!("{} missing, {} invalid, {} valid", gap.missing.len(), gap.invalid.len(), gap.valid.len())
	};
	PhaseResult::new(Phase::GapAnalysis, true, message, details)
}

fn install_phase(results: &[InstallResult]) -> PhaseResult {
	let failed = results.iter().filter(|r| !r.success).count();
	let details = results.iter()
		.map(|r| format!("{}: {}", r.identifier, r.message))
		.collect();
	let message = format!("Installed {} of {} mods", results.len() - failed, results.len());
	PhaseResult::new(Phase::Install, failed == 0, message, details)
}

fn verify_phase(game: &GameInstance, installable: &[String]) -> PhaseResult {
	let missing = game.get_missing_mods(installable);
	if missing.is_empty() {
		PhaseResult::new(Phase::Verify, true, format!("All {} mods verified", installable.len()), vec![])
	} else {
		let details = missing.iter().map(|id| format!("{}: {}", id, game.check(id).message())).collect();
		PhaseResult::new(Phase::Verify, false, format!("{} mods missing or invalid", missing.len()), details)
	}
}
