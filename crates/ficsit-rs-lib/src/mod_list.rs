//! The list of mods offered to the user, read from `mods-list.json`.

use serde::{Serialize, Deserialize};

/// A mod the user can select.
///
/// Loaded once from the mod list and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDescriptor {
	pub name: String,
	/// Catalog identifier, case sensitive.
	#[serde(rename = "mod_reference")]
	pub identifier: String,
	#[serde(default = "default_category")]
	pub category: String,
	#[serde(default)]
	pub required: bool,
	/// Lower installs earlier.
	#[serde(default = "default_priority")]
	pub priority: i32,
	#[serde(default)]
	pub description: String,
}

fn default_category() -> String {
	"other".to_string()
}

fn default_priority() -> i32 {
	99
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModList {
	mods: Vec<ModDescriptor>,
}

impl ModList {
	/// Creates a list sorted by priority. Mods of equal priority keep their given order.
	pub fn new(mut mods: Vec<ModDescriptor>) -> Self {
		mods.sort_by_key(|m| m.priority);
		Self { mods }
	}

	/// Reads a mod list in the form `{"mods": [...]}`.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when the file can't be read.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when an entry is missing `name` or `mod_reference`.
	pub fn load_from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let raw = std::fs::read_to_string(path.as_ref())?;
		let list = Self::from_json(&raw)?;
		log::info!("Loaded {} mods from {}", list.mods.len(), path.as_ref().display());
		Ok(list)
	}

	pub fn from_json(raw: &str) -> crate::Result<Self> {
		let list: ModList = serde_json::from_str(raw)?;
		Ok(Self::new(list.mods))
	}

	/// Loads from `path` when it exists, otherwise uses [`ModList::embedded()`].
	pub fn load_or_embedded(path: Option<&std::path::Path>) -> crate::Result<Self> {
		match path {
			Some(p) if p.exists() => Self::load_from_file(p),
			Some(p) => {
				log::warn!("Mod list not found at {}, using embedded list.", p.display());
				Ok(Self::embedded())
			},
			None => Ok(Self::embedded()),
		}
	}

	/// The built in mod list.
	pub fn embedded() -> Self {
		/* (name, identifier, category, required, priority, description) */
		const EMBEDDED: &[(&str, &str, &str, bool, i32, &str)] = &[
			("Satisfactory Mod Loader", "SML", "dependency", true, 0, "Required for ALL mods"),
			("Pak Utility Mod", "UtilityMod", "dependency", true, 1, "Required dependency for most mods"),
			("Smart!", "SmartFoundations", "quality-of-life", false, 2, "Mass building of foundations, walls, and more"),
			("Micro Manage", "MicroManage", "quality-of-life", false, 2, "Precise object positioning, rotation, and scaling"),
			("Efficiency Checker", "EfficiencyCheckerMod", "quality-of-life", false, 2, "Monitor production efficiency"),
			("Infinite Zoop", "InfiniteZoop", "quality-of-life", false, 2, "Unlimited zoop range"),
			("Infinite Nudge", "InfiniteNudge", "quality-of-life", false, 2, "Unlimited nudge range"),
			("Structural Solutions", "SS_Mod", "quality-of-life", false, 2, "More building options"),
			("Load Balancers", "LoadBalancers", "quality-of-life", false, 2, "Better load balancing"),
			("MAM Enhancer", "MAMTips", "quality-of-life", false, 2, "Enhanced MAM interface"),
			("MiniMap", "MiniMap", "quality-of-life", false, 2, "In-game minimap"),
			("Refined Power", "RefinedPower", "content", false, 3, "New power generation options"),
			("Ficsit Farming", "FicsitFarming", "content", false, 3, "Farming mechanics"),
			("Teleporter", "Teleporter", "content", false, 3, "Instant travel"),
			("Linear Motion", "LinearMotion", "content", false, 3, "Moving platforms and elevators"),
			("Mk++", "MK22k20", "content", false, 3, "Higher tier machines"),
			("Fluid Extras", "AB_FluidExtras", "content", false, 3, "Additional fluid handling"),
			("Storage Teleporter", "StorageTeleporter", "content", false, 3, "Teleport items between storage"),
			("Big Storage Tank", "BigStorageTank", "content", false, 3, "Large fluid storage"),
			("Container Screens", "ContainerScreen", "content", false, 3, "Display screens for containers"),
			("Item Dispenser", "Dispenser", "content", false, 3, "Automatic item dispensing"),
			("EasyCheat", "EasyCheat", "cheat", false, 4, "Cheat menu"),
			("PowerSuit", "PowerSuit", "cheat", false, 4, "Enhanced player abilities"),
			("Extra Inventory", "Additional_300_Inventory_Slots", "cheat", false, 4, "300 extra inventory slots"),
		];

		Self::new(
			EMBEDDED.iter()
				.map(|(name, identifier, category, required, priority, description)| ModDescriptor {
					name: name.to_string(),
					identifier: identifier.to_string(),
					category: category.to_string(),
					required: *required,
					priority: *priority,
					description: description.to_string(),
				})
				.collect()
		)
	}

	pub fn mods(&self) -> &[ModDescriptor] {
		&self.mods
	}

	pub fn get(&self, identifier: &str) -> Option<&ModDescriptor> {
		self.mods.iter().find(|m| m.identifier == identifier)
	}

	/// Display name for an identifier, the identifier itself when it isn't in the list.
	pub fn name_of<'a>(&'a self, identifier: &'a str) -> &'a str {
		self.get(identifier).map(|m| m.name.as_str()).unwrap_or(identifier)
	}

	pub fn required_identifiers(&self) -> Vec<String> {
		self.mods.iter().filter(|m| m.required).map(|m| m.identifier.clone()).collect()
	}

	/// Mods in a category, in priority order.
	pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ModDescriptor> + 'a {
		self.mods.iter().filter(move |m| m.category == category)
	}

	/// Groups the mods by category keeping the order categories first appear in.
	pub fn by_category(&self) -> Vec<(&str, Vec<&ModDescriptor>)> {
		let mut groups = Vec::<(&str, Vec<&ModDescriptor>)>::new();
		for m in &self.mods {
			match groups.iter_mut().find(|(c, _)| *c == m.category) {
				Some((_, v)) => v.push(m),
				None => groups.push((m.category.as_str(), vec![m])),
			}
		}
		groups
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_and_priority_order() {
		let list = ModList::from_json(r#"{"mods": [
			{"name": "B", "mod_reference": "B", "priority": 3},
			{"name": "A", "mod_reference": "A", "required": true, "priority": 1, "category": "dependency"},
			{"name": "C", "mod_reference": "C"}
		]}"#).unwrap();

		let ids: Vec<_> = list.mods().iter().map(|m| m.identifier.as_str()).collect();
		assert_eq!(ids, ["A", "B", "C"]);
		let c = list.get("C").unwrap();
		assert_eq!(c.category, "other");
		assert_eq!(c.priority, 99);
		assert!(!c.required);
		assert_eq!(list.required_identifiers(), ["A".to_string()]);
	}

	#[test]
	fn missing_reference_is_an_error() {
		assert!(ModList::from_json(r#"{"mods": [{"name": "B"}]}"#).is_err());
	}

	#[test]
	fn embedded_list_starts_with_the_loader() {
		let list = ModList::embedded();
		assert_eq!(list.mods()[0].identifier, "SML");
		assert!(list.get("SML").unwrap().required);
		let groups = list.by_category();
		assert_eq!(groups[0].0, "dependency");
		assert_eq!(groups.iter().map(|g| g.1.len()).sum::<usize>(), list.mods().len());
		assert_eq!(list.name_of("Unknown"), "Unknown");
	}
}
