use std::sync::Arc;

use ficsit_rs::gap_analysis::analyze;
use ficsit_rs::relationship_resolver::RelationshipResolver;
use ficsit_rs_test_utils::*;

#[tokio::test]
async fn resolved_against_disk() {
	let (_dir, game) = fake_game().unwrap();
	install_fake_mod(&game, "SML", "3.7.0", &[]).unwrap();
	std::fs::create_dir_all(game.mod_dir("B")).unwrap();

	let catalog = Arc::new(MockCatalog::new()
		.with_mod("SML", "3.7.0", &[])
		.with_mod("A", "1.0.0", &["B", "C"])
		.with_mod("B", "1.0.0", &[])
		.with_mod("C", "1.0.0", &[])
		.broken("C", "incompatible"));
	let outcome = RelationshipResolver::new(catalog, &ficsit_rs::Config::default())
		.resolve_all(&["A".to_string()])
		.await;

	let gap = analyze(&outcome.resolved, game.scan_installed().unwrap());
	assert!(!gap.needed_mods.contains(&"C".to_string()));
	assert_eq!(gap.missing, ["A"]);
	assert_eq!(gap.invalid, ["B"]);
	assert_eq!(gap.valid, ["SML"]);
	assert_eq!(gap.mods_to_install(), ["A", "B"]);
	assert!(!gap.all_ok());

	/* Pure, repeated calls agree. */
	let again = analyze(&outcome.resolved, game.scan_installed().unwrap());
	assert_eq!(again.mods_to_install(), gap.mods_to_install());
}
