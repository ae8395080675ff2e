//! Installing through the `ficsit-cli` command line tool.
//!
//! The tool has no structured output, whether a failed step was actually a no-op is worked out by matching
//! known phrases in its text in [`classify_tool_output()`]. Anything unrecognised counts as a failure.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
	#[error("failed to start tool: {0}")]
	Spawn(std::io::Error),
	#[error("tool timed out after {0:?}")]
	Timeout(Duration),
}

/// Exit state and combined stdout/stderr of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
	pub success: bool,
	pub text: String,
}

pub trait ExternalTool: Send + Sync {
	fn run(&self, args: &[String]) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;
}

impl<T: ExternalTool> ExternalTool for std::sync::Arc<T> {
	fn run(&self, args: &[String]) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send {
		(**self).run(args)
	}
}

/// Runs the `ficsit-cli` binary.
#[derive(Debug, Clone)]
pub struct FicsitCli {
	path: PathBuf,
	timeout: Duration,
}

impl FicsitCli {
	pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
		Self { path: path.into(), timeout }
	}

	/// Uses the tool from [`Config::external_tool()`](crate::Config::external_tool()) if set.
	pub fn from_config(config: &crate::Config) -> Option<Self> {
		config.external_tool().map(|p| Self::new(p, config.download_timeout()))
	}
}

impl ExternalTool for FicsitCli {
	async fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
		log::debug!("Running {} {}", self.path.display(), args.join(" "));
		let child = tokio::process::Command::new(&self.path)
			.args(args)
			.stdin(std::process::Stdio::null())
			.stdout(std::process::Stdio::piped())
			.stderr(std::process::Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(ToolError::Spawn)?;

		let output = tokio::time::timeout(self.timeout, child.wait_with_output())
			.await
			.map_err(|_| ToolError::Timeout(self.timeout))?
			.map_err(ToolError::Spawn)?;

		let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
		text.push_str(&String::from_utf8_lossy(&output.stderr));
		Ok(ToolOutput { success: output.status.success(), text })
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
	Done,
	/// Failed exit but the tool says the work was already done.
	AlreadyDone,
	Failed(String),
}

impl StepOutcome {
	pub fn is_ok(&self) -> bool {
		!matches!(self, StepOutcome::Failed(_))
	}
}

fn already_done_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r"(?i)already\s+(exists|present|registered|added)").expect("invalid already-done regex"))
}

/// Maps a tool result onto a step outcome.
pub fn classify_tool_output(output: &ToolOutput) -> StepOutcome {
	if output.success {
		StepOutcome::Done
	} else if already_done_pattern().is_match(&output.text) {
		StepOutcome::AlreadyDone
	} else {
		let text = output.text.trim();
		StepOutcome::Failed(if text.is_empty() { "tool exited with an error".to_string() } else { text.to_string() })
	}
}

/// Result of an install through the tool.
#[derive(Debug, Clone, Default)]
pub struct ExternalInstallReport {
	/// Every step completed.
	pub ok: bool,
	/// Identifiers confirmed installed. Empty unless the profile was applied.
	pub succeeded: Vec<String>,
	pub failed: BTreeMap<String, String>,
	/// One line per step for the phase report.
	pub details: Vec<String>,
}

pub struct ExternalToolBackend<T: ExternalTool> {
	tool: T,
	profile: String,
}

impl<T: ExternalTool> ExternalToolBackend<T> {
	pub fn new(tool: T, profile: impl Into<String>) -> Self {
		Self { tool, profile: profile.into() }
	}

	async fn step(&self, args: &[&str], details: &mut Vec<String>) -> StepOutcome {
		let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
		let outcome = match self.tool.run(&args).await {
			Ok(output) => classify_tool_output(&output),
			Err(e) => StepOutcome::Failed(e.to_string()),
		};
		let line = match &outcome {
			StepOutcome::Done => format!("{}: ok", args.join(" ")),
			StepOutcome::AlreadyDone => format!("{}: already done", args.join(" ")),
			StepOutcome::Failed(e) => format!("{}: failed: {}", args.join(" "), e),
		};
		log::debug!("{}", line);
		details.push(line);
		outcome
	}

	/// Registers the game, builds the profile from `identifiers` and applies it.
	///
	/// Failing to register or create the profile fails every identifier, as does failing to bind or apply.
	/// A failed `mod add` only fails that identifier.
	pub async fn install(&self, game_path: &Path, identifiers: &[String]) -> ExternalInstallReport {
		let mut report = ExternalInstallReport::default();
		let game_path = game_path.to_string_lossy().into_owned();
		let game = game_path.as_str();
		let profile = self.profile.as_str();

		let fail_all = |report: &mut ExternalInstallReport, ids: &[String], reason: &str| {
			for id in ids {
				report.failed.insert(id.clone(), reason.to_string());
			}
		};

		for setup in [vec!["installation", "add", game], vec!["profile", "new", profile]] {
			if let StepOutcome::Failed(e) = self.step(&setup, &mut report.details).await {
				fail_all(&mut report, identifiers, &format!("{} failed: {}", setup[..2].join(" "), e));
				return report;
			}
		}

		let mut added = Vec::new();
		for id in identifiers {
			match self.step(&["profile", "mod", "add", profile, id.as_str()], &mut report.details).await {
				StepOutcome::Failed(e) => { report.failed.insert(id.clone(), e); },
				_ => added.push(id.clone()),
			}
		}

		for finish in [vec!["installation", "set-profile", game, profile], vec!["apply", game]] {
			if let StepOutcome::Failed(e) = self.step(&finish, &mut report.details).await {
				fail_all(&mut report, &added, &format!("{} failed: {}", finish[0], e));
				return report;
			}
		}

		report.ok = report.failed.is_empty();
		report.succeeded = added;
		report
	}
}
