use std::sync::Arc;

use ficsit_rs::installation::{InstallFailure, InstallRequest, Installer};
use ficsit_rs::progress::CancelToken;
use ficsit_rs_test_utils::*;

fn request(identifier: &str) -> InstallRequest {
	InstallRequest {
		identifier: identifier.to_string(),
		version: Some("1.0.0".to_string()),
		download_url: Some(download_url(identifier)),
	}
}

#[tokio::test]
async fn installs_archive_into_mods_dir() {
	let _ = env_logger::builder().is_test(true).try_init();
	let (_dir, game) = fake_game().unwrap();
	let fetcher = Arc::new(MockFetcher::new().with_mod("RefinedPower", "3.2.0", &["SML"]).unwrap());
	let installer = Installer::new(fetcher, game.clone(), &ficsit_rs::Config::default());

	let result = installer.install("RefinedPower", &download_url("RefinedPower")).await;
	assert!(result.success, "{}", result.message);
	assert_eq!(result.files_installed, 2);
	assert_eq!(
		list_files(&game.mod_dir("RefinedPower")).unwrap(),
		["Content/Paks/Windows/RefinedPower.pak", "RefinedPower.uplugin"],
	);

	let status = game.check("RefinedPower");
	assert!(status.valid());
	assert_eq!(status.version(), Some("3.2.0"));
}

#[tokio::test]
async fn tiny_download_is_rejected_without_touching_the_destination() {
	let (_dir, game) = fake_game().unwrap();
	let fetcher = Arc::new(MockFetcher::new().with_body(download_url("Y"), vec![0u8; 900]));
	let installer = Installer::new(fetcher, game.clone(), &ficsit_rs::Config::default());

	let result = installer.install("Y", &download_url("Y")).await;
	assert!(!result.success);
	assert_eq!(result.failure, Some(InstallFailure::TooSmall));
	assert!(result.message.contains("too small"));
	assert!(!game.mod_dir("Y").exists());
}

#[tokio::test]
async fn tiny_download_keeps_existing_install() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "Y", "1.0.0", &[]).unwrap();
	let before = list_files(&game.mod_dir("Y")).unwrap();

	let fetcher = Arc::new(MockFetcher::new().with_body(download_url("Y"), vec![0u8; 900]));
	let installer = Installer::new(fetcher, game.clone(), &ficsit_rs::Config::default());
	let result = installer.install("Y", &download_url("Y")).await;

	assert_eq!(result.failure, Some(InstallFailure::TooSmall));
	assert_eq!(list_files(&game.mod_dir("Y")).unwrap(), before);
}

#[tokio::test]
async fn failure_kinds_are_distinct() {
	let (_dir, game) = fake_game().unwrap();
	let fetcher = Arc::new(MockFetcher::new()
		.with_body(download_url("Garbage"), vec![b'x'; 4096])
		.with_mod("Good", "1.0.0", &[]).unwrap());
	let mut config = ficsit_rs::Config::default();
	config.set_min_download_size(10);
	let installer = Installer::new(fetcher.clone(), game.clone(), &config);

	let mut no_artifact = request("NoArtifact");
	no_artifact.download_url = None;
	let results = installer.install_all(&[
		request("Garbage"),
		request("Unknown"),
		no_artifact,
		request("Good"),
	]).await;

	let ids: Vec<_> = results.iter().map(|r| r.identifier.as_str()).collect();
	assert_eq!(ids, ["Garbage", "Unknown", "NoArtifact", "Good"]);
	assert_eq!(results[0].failure, Some(InstallFailure::CorruptArchive));
	assert_eq!(results[1].failure, Some(InstallFailure::Transport));
	assert_eq!(results[2].failure, Some(InstallFailure::NoArtifact));
	assert!(results[3].success);
	assert_eq!(results[3].version.as_deref(), Some("1.0.0"));
	assert!(!fetcher.fetched().contains(&"NoArtifact".to_string()));
	assert!(!game.mod_dir("Garbage").exists());
}

#[tokio::test]
async fn archive_without_files_is_an_installation_failure() {
	let (_dir, game) = fake_game().unwrap();
	let body = zip_archive(&[]).unwrap();
	let fetcher = Arc::new(MockFetcher::new().with_body(download_url("Hollow"), body));
	let mut config = ficsit_rs::Config::default();
	config.set_min_download_size(1);
	let installer = Installer::new(fetcher, game.clone(), &config);

	let result = installer.install("Hollow", &download_url("Hollow")).await;
	assert_eq!(result.failure, Some(InstallFailure::Installation));
	assert!(!game.mod_dir("Hollow").exists());
}

#[tokio::test]
async fn cancelled_installs_do_not_download() {
	let (_dir, game) = fake_game().unwrap();
	let fetcher = Arc::new(MockFetcher::new().with_mod("A", "1.0.0", &[]).unwrap());
	let cancel = CancelToken::new();
	cancel.cancel();
	let installer = Installer::new(fetcher.clone(), game.clone(), &ficsit_rs::Config::default()).with_cancel(cancel);

	let results = installer.install_all(&[request("A")]).await;
	assert_eq!(results[0].failure, Some(InstallFailure::Cancelled));
	assert!(fetcher.fetched().is_empty());
	assert!(!game.mod_dir("A").exists());
}

#[tokio::test]
async fn identifier_outside_mods_dir_is_refused() {
	let (_dir, game) = fake_game().unwrap();
	std::fs::write(game.game_dir().join("FactoryGame/keep.txt"), "x").unwrap();
	let fetcher = Arc::new(MockFetcher::new().with_body(download_url(".."), vec![0u8; 4096]));
	let installer = Installer::new(fetcher.clone(), game.clone(), &ficsit_rs::Config::default());

	let result = installer.install("..", &download_url("..")).await;
	assert!(!result.success);
	assert_eq!(result.failure, Some(InstallFailure::Installation));
	assert!(fetcher.fetched().is_empty());
	assert!(game.game_dir().join("FactoryGame/keep.txt").exists());
	assert!(game.remove_mod("..").is_err());
}
