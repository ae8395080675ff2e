use std::sync::Arc;

use ficsit_rs::catalog::FicsitCatalog;
use ficsit_rs::game_instance::{detect, GameInstance};
use ficsit_rs::installation::download::HttpFetcher;
use ficsit_rs::installation::external_tool::{ExternalTool, FicsitCli};
use ficsit_rs::progress::{CancelToken, LogProgress};
use ficsit_rs::reconcile::{Orchestrator, ReconcileReport};

const USAGE: &str = "Usage:
    ficsit-rs install [game-path] [mod...]
    ficsit-rs verify [game-path] [mod...]
    ficsit-rs updates [game-path] [--apply]
    ficsit-rs list

The game is searched for in the usual Steam and Epic locations when no path is given.";

#[tokio::main]
async fn main() -> std::process::ExitCode {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased verbosity");
		opts.optopt(  "c", "mods-list",  "Mod list to read instead of the built in one", "FILE");
		opts.optopt(  "",  "tool",       "Install through ficsit-cli at this path, falling back to direct downloads", "PATH");
		opts.optopt(  "",  "category",   "Install the mods of a category along with the required ones", "NAME");
		opts.optflag( "",  "apply",      "Install available updates");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return std::process::ExitCode::FAILURE }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage(USAGE));
			return std::process::ExitCode::SUCCESS;
		}

		parsed_options
	};

	let filter = if parsed_options.opt_present("v") { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

	let mut config = ficsit_rs::Config::load_from_disk().unwrap_or_else(|e| {
		log::warn!("Failed to read config file: {}", e);
		log::warn!("Using default config.");
		ficsit_rs::Config::default()
	});

	if let Some(tool) = parsed_options.opt_str("tool") {
		if !config.set_external_tool(Some(std::path::PathBuf::from(&tool))) {
			log::error!("External tool {} is not a file.", tool);
			return std::process::ExitCode::FAILURE;
		}
	}

	let mod_list = match ficsit_rs::ModList::load_or_embedded(parsed_options.opt_str("c").as_deref().map(std::path::Path::new)) {
		Ok(l) => l,
		Err(e) => { log::error!("Failed to read mod list: {}", e); return std::process::ExitCode::FAILURE },
	};

	let result = match parsed_options.free.first().map(String::as_str) {
		Some("list") => { list_mods(&mod_list); Ok(true) },
		Some("install") => install(&config, &mod_list, &parsed_options).await,
		Some("verify") => verify(&config, &mod_list, &parsed_options).await,
		Some("updates") => updates(&config, &mod_list, &parsed_options).await,
		_ => { eprintln!("{}", opts.usage(USAGE)); Ok(false) },
	};

	match result {
		Ok(true) => std::process::ExitCode::SUCCESS,
		Ok(false) => std::process::ExitCode::FAILURE,
		Err(e) => {
			log::error!("{}", e);
			std::process::ExitCode::FAILURE
		},
	}
}

fn list_mods(mod_list: &ficsit_rs::ModList) {
	for (category, mods) in mod_list.by_category() {
		println!("{}:", category);
		for m in mods {
			let required = if m.required { " (required)" } else { "" };
			println!("\t{} [{}]{} - {}", m.name, m.identifier, required, m.description);
		}
	}
}

/// Whether the argument after the command is a game path rather than a mod.
fn has_game_path(parsed_options: &getopts::Matches) -> bool {
	parsed_options.free.get(1).map_or(false, |p| detect::is_game_dir(std::path::Path::new(p)))
}

fn game_instance(parsed_options: &getopts::Matches) -> Result<GameInstance, Error> {
	if has_game_path(parsed_options) {
		return Ok(GameInstance::new(&parsed_options.free[1]).map_err(ficsit_rs::Error::from)?);
	}
	log::info!("No game path given, searching the usual install locations.");
	GameInstance::detect().ok_or(Error::GameNotFound)
}

/// Mods named on the command line, otherwise the required mods plus any `--category`.
fn requested_mods(mod_list: &ficsit_rs::ModList, parsed_options: &getopts::Matches) -> Vec<String> {
	let first = if has_game_path(parsed_options) { 2 } else { 1 };
	let named = &parsed_options.free[first.min(parsed_options.free.len())..];
	if !named.is_empty() {
		return named.to_vec();
	}

	let mut ids = mod_list.required_identifiers();
	if let Some(category) = parsed_options.opt_str("category") {
		for m in mod_list.in_category(&category) {
			if !ids.contains(&m.identifier) {
				ids.push(m.identifier.clone());
			}
		}
	}
	ids
}

fn print_report(report: &ReconcileReport) {
	for phase in &report.phases {
		let mark = if phase.success { "OK" } else { "FAIL" };
		println!("[{}] {}: {}", mark, phase.phase, phase.message);
		for line in &phase.details {
			println!("\t{}", line);
		}
	}
	if report.cancelled {
		println!("Cancelled.");
	}
	println!("{}", if report.success { "Success." } else { "Failed." });
}

fn cancel_on_ctrl_c() -> CancelToken {
	let cancel = CancelToken::new();
	let token = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			log::warn!("Cancelling after the current phase.");
			token.cancel();
		}
	});
	cancel
}

async fn run_with<T: ExternalTool>(orchestrator: &Orchestrator<FicsitCatalog, HttpFetcher, T>, game: &GameInstance, requested: &[String]) -> Result<bool, Error> {
	let report = orchestrator.run(game, requested).await?;
	print_report(&report);
	Ok(report.success)
}

async fn install(config: &ficsit_rs::Config, mod_list: &ficsit_rs::ModList, parsed_options: &getopts::Matches) -> Result<bool, Error> {
	let game = game_instance(parsed_options)?;
	let requested = requested_mods(mod_list, parsed_options);
	log::info!("Installing {} mods into {}", requested.len(), game.game_dir().display());

	let catalog = FicsitCatalog::new(config)?;
	if !catalog.test_connection().await {
		log::warn!("Catalog at {} is not reachable, lookups will likely fail.", config.catalog_url());
	}

	let orchestrator = Orchestrator::new(
		Arc::new(catalog),
		Arc::new(HttpFetcher::new(config)?),
		config.clone(),
	)
		.with_progress(Arc::new(LogProgress))
		.with_cancel(cancel_on_ctrl_c());

	match FicsitCli::from_config(config) {
		Some(tool) => run_with(&orchestrator.with_external_tool(tool), &game, &requested).await,
		None => run_with(&orchestrator, &game, &requested).await,
	}
}

async fn verify(config: &ficsit_rs::Config, mod_list: &ficsit_rs::ModList, parsed_options: &getopts::Matches) -> Result<bool, Error> {
	let game = game_instance(parsed_options)?;
	let requested = requested_mods(mod_list, parsed_options);

	let orchestrator = Orchestrator::new(
		Arc::new(FicsitCatalog::new(config)?),
		Arc::new(HttpFetcher::new(config)?),
		config.clone(),
	);
	let report = orchestrator.verify(&game, &requested).await?;
	print_report(&report);
	Ok(report.success)
}

async fn updates(config: &ficsit_rs::Config, mod_list: &ficsit_rs::ModList, parsed_options: &getopts::Matches) -> Result<bool, Error> {
	use ficsit_rs::updates::UpdateChecker;

	let game = game_instance(parsed_options)?;
	let installed = game.installed_dirs().map_err(ficsit_rs::Error::from)?;

	let mut checker = UpdateChecker::with_persistence(Arc::new(FicsitCatalog::new(config)?), config);
	let updates = checker.check_for_updates(&game, &installed, mod_list).await;

	for update in &updates {
		let installed = update.installed_version.as_deref().unwrap_or("unknown");
		if update.needs_update {
			println!("{} [{}]: {} -> {}", update.name, update.identifier, installed, update.latest_version);
		} else {
			println!("{} [{}]: {} (latest)", update.name, update.identifier, installed);
		}
	}

	let pending = updates.iter().filter(|u| u.needs_update).count();
	println!("{} updates available.", pending);
	if pending == 0 || !parsed_options.opt_present("apply") {
		return Ok(true);
	}

	let installer = ficsit_rs::installation::Installer::new(Arc::new(HttpFetcher::new(config)?), game, config)
		.with_progress(Arc::new(LogProgress))
		.with_cancel(cancel_on_ctrl_c());
	let results = checker.apply_updates(&installer, &updates).await;
	for result in &results {
		let mark = if result.success { "OK" } else { "FAIL" };
		println!("[{}] {}: {}", mark, result.identifier, result.message);
	}
	Ok(results.iter().all(|r| r.success))
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("ficsit-rs error: {0}")]
	FicsitRs(#[from] ficsit_rs::Error),
	#[error("No game path given and no install was found, pass the game directory.")]
	GameNotFound,
}
