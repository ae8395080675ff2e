use std::sync::Arc;

use ficsit_rs::installation::external_tool::ExternalToolBackend;
use ficsit_rs::reconcile::{Orchestrator, Phase};
use ficsit_rs_test_utils::*;

fn ids(list: &[&str]) -> Vec<String> {
	list.iter().map(|s| s.to_string()).collect()
}

fn args(call: &[String]) -> String {
	call.join(" ")
}

#[tokio::test]
async fn steps_run_in_order() {
	let _ = env_logger::builder().is_test(true).try_init();
	let tool = Arc::new(MockTool::new());
	let backend = ExternalToolBackend::new(tool.clone(), "server");

	let report = backend.install(std::path::Path::new("/games/sf"), &ids(&["SML", "A"])).await;
	assert!(report.ok);
	assert_eq!(report.succeeded, ["SML", "A"]);

	let calls: Vec<String> = tool.calls().iter().map(|c| args(c)).collect();
	assert_eq!(calls, [
		"installation add /games/sf",
		"profile new server",
		"profile mod add server SML",
		"profile mod add server A",
		"installation set-profile /games/sf server",
		"apply /games/sf",
	]);
}

#[tokio::test]
async fn already_exists_counts_as_done() {
	let tool = Arc::new(MockTool::new()
		.respond(&["installation", "add"], false, "Error: installation already present")
		.respond(&["profile", "new"], false, "Error: profile with name server already exists"));
	let backend = ExternalToolBackend::new(tool.clone(), "server");

	let report = backend.install(std::path::Path::new("/games/sf"), &ids(&["A"])).await;
	assert!(report.ok, "{:?}", report.details);
	assert_eq!(report.succeeded, ["A"]);
	assert_eq!(tool.calls().len(), 5);
	assert!(report.details[1].ends_with("already done"));
}

#[tokio::test]
async fn unrecognised_failure_stops_the_tool() {
	let tool = Arc::new(MockTool::new().respond(&["profile", "new"], false, "permission denied"));
	let backend = ExternalToolBackend::new(tool.clone(), "server");

	let report = backend.install(std::path::Path::new("/games/sf"), &ids(&["SML", "A"])).await;
	assert!(!report.ok);
	assert!(report.succeeded.is_empty());
	assert_eq!(report.failed.len(), 2);
	assert_eq!(tool.calls().len(), 2);
}

#[tokio::test]
async fn failed_mod_add_falls_back_for_that_mod_only() {
	let (_dir, game) = fake_game().unwrap();
	/* The tool would have deployed SML itself. */
	install_fake_mod(&game, "SML", "3.7.0", &[]).unwrap();

	let catalog = MockCatalog::new()
		.with_mod("SML", "3.7.0", &[])
		.with_mod("A", "1.0.0", &["B"])
		.with_mod("B", "2.0.0", &[]);
	let fetcher = Arc::new(MockFetcher::new()
		.with_mod("A", "1.0.0", &["B"]).unwrap()
		.with_mod("B", "2.0.0", &[]).unwrap());
	let tool = Arc::new(MockTool::new().respond(&["profile", "mod", "add", "ficsit-rs", "B"], false, "mod B not found"));

	let orchestrator = Orchestrator::new(Arc::new(catalog), fetcher.clone(), ficsit_rs::Config::default())
		.with_external_tool(tool.clone());
	let report = orchestrator.run(&game, &ids(&["A"])).await.unwrap();

	let external = report.phase(Phase::ExternalInstall).unwrap();
	assert!(!external.success);
	/* A was confirmed by the tool so it is never downloaded, even though the mock left it off disk. */
	assert_eq!(fetcher.fetched(), ["B"]);
	assert!(game.check("B").valid());
	let verify = report.phase(Phase::Verify).unwrap();
	assert!(!verify.success);
	assert!(verify.details.iter().any(|d| d.starts_with("A:")));
}

#[tokio::test]
async fn failed_apply_falls_back_for_everything() {
	let (_dir, game) = fake_game().unwrap();
	let catalog = MockCatalog::new()
		.with_mod("SML", "3.7.0", &[])
		.with_mod("A", "1.0.0", &[]);
	let fetcher = Arc::new(MockFetcher::new()
		.with_mod("SML", "3.7.0", &[]).unwrap()
		.with_mod("A", "1.0.0", &[]).unwrap());
	let tool = Arc::new(MockTool::new().respond(&["apply"], false, "failed to download"));

	let orchestrator = Orchestrator::new(Arc::new(catalog), fetcher.clone(), ficsit_rs::Config::default())
		.with_external_tool(tool);
	let report = orchestrator.run(&game, &ids(&["A"])).await.unwrap();

	assert!(report.success, "{:#?}", report.phases);
	let mut fetched = fetcher.fetched();
	fetched.sort();
	assert_eq!(fetched, ["A", "SML"]);
	assert_eq!(
		report.phases.iter().map(|p| p.phase).collect::<Vec<_>>(),
		[Phase::Cleanup, Phase::Resolve, Phase::ExternalInstall, Phase::Scan, Phase::GapAnalysis, Phase::Install, Phase::Verify],
	);
}
