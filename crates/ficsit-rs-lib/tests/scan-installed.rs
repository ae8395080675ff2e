use ficsit_rs::game_instance::scanner::Validity;
use ficsit_rs_test_utils::*;

#[test]
fn manifest_only_mod_is_content_less_but_valid() {
	let (_dir, game) = fake_game().unwrap();
	std::fs::create_dir_all(game.mod_dir("X")).unwrap();
	std::fs::write(game.mod_dir("X").join("X.uplugin"), r#"{"SemVersion": "1.0.0"}"#).unwrap();

	let scan = game.scan_installed().unwrap();
	let x = &scan["X"];
	assert!(x.valid());
	assert_eq!(x.validity, Validity::ValidNoContent);
	assert!(x.message().contains("content-less"));
}

#[test]
fn scan_of_copied_game_matches() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "SML", "3.7.0", &[]).unwrap();
	install_fake_mod(&game, "A", "1.0.0", &["SML"]).unwrap();
	std::fs::create_dir_all(game.mod_dir("Broken")).unwrap();

	let (_copy_dir, copy) = clone_game(&game).unwrap();
	let original = game.scan_installed().unwrap();
	let copied = copy.scan_installed().unwrap();

	assert_eq!(original.len(), 3);
	for (id, status) in &original {
		assert_eq!(copied[id].validity, status.validity);
		assert_eq!(copied[id].version(), status.version());
	}
	assert!(!copied["Broken"].valid());
}

#[test]
fn missing_mods_lists_absent_and_invalid() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "SML", "3.7.0", &[]).unwrap();
	std::fs::create_dir_all(game.mod_dir("Hollow")).unwrap();

	let required: Vec<String> = ["SML", "Hollow", "Absent"].iter().map(|s| s.to_string()).collect();
	assert_eq!(game.get_missing_mods(&required), ["Hollow", "Absent"]);
}

#[test]
fn stray_files_in_mods_dir_are_not_mods() {
	let (_dir, game) = fake_game().unwrap();
	std::fs::write(game.mods_dir().join("old.pak"), "x").unwrap();
	assert!(game.scan_installed().unwrap().is_empty());
}
