use std::sync::Arc;

use ficsit_rs::installation::{InstallFailure, Installer};
use ficsit_rs::updates::{UpdateChecker, VersionCache};
use ficsit_rs_test_utils::*;

fn ids(list: &[&str]) -> Vec<String> {
	list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn versions_are_sorted_newest_first_and_memoized() {
	let catalog = MockCatalog::new()
		.with_mod("A", "1.2.0", &[])
		.with_versions("A", &[("1.0.0", "2023-01-01T00:00:00Z"), ("1.2.0", "2024-05-01T00:00:00Z"), ("1.1.0", "2023-06-01T00:00:00Z")]);
	let mut cache = VersionCache::default();

	let versions: Vec<String> = cache.get_or_fetch(&catalog, "A").await.unwrap().iter().map(|v| v.version.clone()).collect();
	assert_eq!(versions, ["1.2.0", "1.1.0", "1.0.0"]);
	cache.get_or_fetch(&catalog, "A").await.unwrap();
	assert_eq!(catalog.lookups().len(), 1);

	cache.invalidate("A");
	cache.get_or_fetch(&catalog, "A").await.unwrap();
	assert_eq!(catalog.lookups().len(), 2);

	cache.clear();
	assert!(cache.is_empty());
}

#[tokio::test]
async fn update_check_compares_version_strings() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "A", "1.0.0", &[]).unwrap();
	install_fake_mod(&game, "B", "2.0.0", &[]).unwrap();

	let catalog = Arc::new(MockCatalog::new()
		.with_mod("A", "1.1.0", &[])
		.with_mod("B", "2.0.0", &[])
		.with_mod("C", "1.0.0", &[]));
	let mut checker = UpdateChecker::new(catalog.clone(), &ficsit_rs::Config::default());
	let names = ficsit_rs::ModList::from_json(r#"{"mods": [{"name": "Mod A", "mod_reference": "A"}]}"#).unwrap();

	let updates = checker.check_for_updates(&game, &ids(&["A", "B", "C", "Unknown"]), &names).await;
	assert_eq!(updates.len(), 3);

	assert_eq!(updates[0].name, "Mod A");
	assert_eq!(updates[0].installed_version.as_deref(), Some("1.0.0"));
	assert_eq!(updates[0].latest_version, "1.1.0");
	assert!(updates[0].needs_update);

	assert!(!updates[1].needs_update);

	assert_eq!(updates[2].installed_version, None);
	assert!(!updates[2].needs_update);

	let before = catalog.lookups().len();
	checker.check_for_updates(&game, &ids(&["A", "B"]), &names).await;
	assert_eq!(catalog.lookups().len(), before);
}

#[tokio::test]
async fn applying_updates_installs_and_invalidates() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "A", "1.0.0", &[]).unwrap();
	install_fake_mod(&game, "D", "1.0.0", &[]).unwrap();

	let catalog = Arc::new(MockCatalog::new()
		.with_mod("A", "1.1.0", &[])
		.with_mod("D", "2.0.0", &[])
		.broken("D", "crashes"));
	let fetcher = Arc::new(MockFetcher::new().with_mod("A", "1.1.0", &[]).unwrap());
	let config = ficsit_rs::Config::default();
	let installer = Installer::new(fetcher, game.clone(), &config);
	let mut checker = UpdateChecker::new(catalog, &config);

	let updates = checker.check_for_updates(&game, &ids(&["A", "D"]), &ficsit_rs::ModList::default()).await;
	assert!(updates.iter().all(|u| u.needs_update));

	let results = checker.apply_updates(&installer, &updates).await;
	let a = results.iter().find(|r| r.identifier == "A").unwrap();
	assert!(a.success);
	let d = results.iter().find(|r| r.identifier == "D").unwrap();
	assert_eq!(d.failure, Some(InstallFailure::Broken));

	assert_eq!(game.check("A").version(), Some("1.1.0"));
	assert_eq!(game.check("D").version(), Some("1.0.0"));
	assert!(checker.cache().get("A").is_none());
	assert!(checker.cache().get("D").is_some());
}

#[tokio::test]
async fn persisted_cache_survives_restart() {
	let dir = tempfile::tempdir().unwrap();
	let (_game_dir, game) = fake_game().unwrap();
	let mut config = ficsit_rs::Config::default();
	config.set_data_dir(dir.path().to_path_buf());

	let catalog = Arc::new(MockCatalog::new().with_mod("A", "1.0.0", &[]));
	let mut checker = UpdateChecker::with_persistence(catalog.clone(), &config);
	checker.check_for_updates(&game, &ids(&["A"]), &ficsit_rs::ModList::default()).await;
	assert!(config.version_cache_path().is_file());

	let restarted = UpdateChecker::with_persistence(catalog, &config);
	assert_eq!(restarted.cache().get("A").unwrap()[0].version, "1.0.0");
}
