//! Remote mod catalog.
//!
//! The resolver and version cache only need the [`Catalog`] trait, [`FicsitCatalog`] implements it
//! against the ficsit.app GraphQL API.

use std::collections::HashMap;
use std::future::Future;

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// State value marking a mod as incompatible with a game branch.
pub const BROKEN_STATE: &str = "Broken";
/// Prefix given to compatibility warnings of broken mods. The resolver keys off this.
pub const BROKEN_MARKER: &str = "BROKEN";

#[derive(Debug, Error)]
pub enum CatalogError {
	/// The catalog has no mod with this identifier.
	#[error("mod not found in catalog.")]
	NotFound,
	/// The mod exists but has no published versions.
	#[error("mod has no published versions.")]
	NoVersions,
	/// The API answered with an error response.
	#[error("catalog API error: {0}")]
	Api(String),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
}

/// A downloadable artifact for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
	pub platform: String,
	pub link: String,
}

/// Compatibility report of a mod for a game branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
	pub state: String,
	pub note: Option<String>,
}

/// The latest version of a mod as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
	pub identifier: String,
	pub version: String,
	/// Identifiers of required dependencies, optional dependencies are not included.
	pub dependencies: Vec<String>,
	pub targets: Vec<Target>,
	/// Keyed by game branch.
	pub compatibility: HashMap<String, Compatibility>,
}

impl CatalogEntry {
	/// The download link for `platform`, `None` when the mod isn't built for it.
	pub fn download_link(&self, platform: &str) -> Option<&str> {
		self.targets.iter().find(|t| t.platform == platform).map(|t| t.link.as_str())
	}

	/// A warning when the mod is broken on `branch`.
	///
	/// The warning always starts with [`BROKEN_MARKER`].
	pub fn compatibility_warning(&self, branch: &str) -> Option<String> {
		let compat = self.compatibility.get(branch)?;
		if compat.state != BROKEN_STATE {
			return None;
		}
		Some(match compat.note.as_deref().map(str::trim) {
			Some(note) if !note.is_empty() => format!("{}: {}", BROKEN_MARKER, note),
			_ => BROKEN_MARKER.to_string(),
		})
	}
}

/// A single published version, used by the version cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVersion {
	pub version: String,
	/// RFC 3339 timestamp, sorts lexically.
	pub created_at: String,
}

/// Source of mod metadata.
///
/// Implementations must be shareable between tasks as lookups are run concurrently.
pub trait Catalog: Send + Sync {
	/// Gets the latest version of a mod.
	fn lookup(&self, identifier: &str) -> impl Future<Output = Result<CatalogEntry, CatalogError>> + Send;

	/// Lists every published version of a mod in no particular order.
	fn versions(&self, identifier: &str) -> impl Future<Output = Result<Vec<CatalogVersion>, CatalogError>> + Send;
}

const LOOKUP_QUERY: &str = r#"
query GetMod($modReference: ModReference!) {
	getModByReference(modReference: $modReference) {
		mod_reference
		compatibility {
			EA { state note }
			EXP { state note }
		}
		versions(filter: {limit: 1, order_by: created_at, order: desc}) {
			version
			created_at
			targets { targetName link }
			dependencies { mod_id optional }
		}
	}
}
"#;

const VERSIONS_QUERY: &str = r#"
query GetModVersions($modReference: ModReference!) {
	getModByReference(modReference: $modReference) {
		mod_reference
		versions(filter: {limit: 100, order_by: created_at, order: desc}) {
			version
			created_at
		}
	}
}
"#;

/* Wire format */

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
	data: Option<T>,
	#[serde(default)]
	errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
	message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModQuery {
	get_mod_by_reference: Option<ApiMod>,
}

#[derive(Debug, Deserialize)]
struct ApiMod {
	mod_reference: String,
	#[serde(default)]
	compatibility: Option<HashMap<String, Option<ApiCompatibility>>>,
	#[serde(default)]
	versions: Vec<ApiVersion>,
}

#[derive(Debug, Deserialize)]
struct ApiCompatibility {
	state: String,
	note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
	version: String,
	#[serde(default)]
	created_at: String,
	#[serde(default)]
	targets: Vec<ApiTarget>,
	#[serde(default)]
	dependencies: Vec<ApiDependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTarget {
	target_name: String,
	link: String,
}

#[derive(Debug, Deserialize)]
struct ApiDependency {
	mod_id: String,
	#[serde(default)]
	optional: bool,
}

/// Client for the ficsit.app GraphQL API.
#[derive(Debug, Clone)]
pub struct FicsitCatalog {
	client: reqwest::Client,
	origin: String,
}

impl FicsitCatalog {
	/// # Errors
	/// - [`Reqwest`](crate::error::Error::Reqwest) when the client can't be built.
	pub fn new(config: &crate::Config) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.timeout(config.request_timeout())
			.user_agent(concat!("ficsit-rs/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self::with_client(client, config.catalog_url()))
	}

	pub fn with_client(client: reqwest::Client, origin: impl Into<String>) -> Self {
		Self {
			client,
			origin: origin.into().trim_end_matches('/').to_string(),
		}
	}

	fn endpoint(&self) -> String {
		format!("{}/v2/query", self.origin)
	}

	/// Checks the API origin answers with a success status.
	pub async fn test_connection(&self) -> bool {
		match self.client.get(&self.origin).send().await {
			Ok(r) => r.status().is_success(),
			Err(e) => {
				log::debug!("Catalog connection test failed: {}", e);
				false
			},
		}
	}

	async fn query_mod(&self, query: &str, identifier: &str) -> Result<ApiMod, CatalogError> {
		let body = serde_json::json!({
			"query": query,
			"variables": { "modReference": identifier },
		});

		log::debug!("Querying catalog for {}", identifier);
		let response: GraphQLResponse<ModQuery> = self.client
			.post(self.endpoint())
			.json(&body)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		if !response.errors.is_empty() {
			let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
			return Err(CatalogError::Api(messages.join("; ")));
		}

		response.data
			.and_then(|d| d.get_mod_by_reference)
			.ok_or(CatalogError::NotFound)
	}

	/// Makes site relative links absolute.
	fn absolute_link(&self, link: String) -> String {
		if link.starts_with("http") {
			link
		} else {
			format!("{}{}", self.origin, link)
		}
	}
}

impl Catalog for FicsitCatalog {
	async fn lookup(&self, identifier: &str) -> Result<CatalogEntry, CatalogError> {
		let api_mod = self.query_mod(LOOKUP_QUERY, identifier).await?;
		let version = api_mod.versions.into_iter().next().ok_or(CatalogError::NoVersions)?;

		Ok(CatalogEntry {
			identifier: api_mod.mod_reference,
			version: version.version,
			dependencies: version.dependencies.into_iter()
				.filter(|d| !d.optional)
				.map(|d| d.mod_id)
				.collect(),
			targets: version.targets.into_iter()
				.map(|t| Target { platform: t.target_name, link: self.absolute_link(t.link) })
				.collect(),
			compatibility: api_mod.compatibility
				.unwrap_or_default()
				.into_iter()
				.filter_map(|(branch, c)| c.map(|c| (branch, Compatibility { state: c.state, note: c.note })))
				.collect(),
		})
	}

	async fn versions(&self, identifier: &str) -> Result<Vec<CatalogVersion>, CatalogError> {
		let api_mod = self.query_mod(VERSIONS_QUERY, identifier).await?;
		Ok(api_mod.versions.into_iter()
			.map(|v| CatalogVersion { version: v.version, created_at: v.created_at })
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry_with_state(state: &str, note: Option<&str>) -> CatalogEntry {
		CatalogEntry {
			identifier: "A".to_string(),
			version: "1.0.0".to_string(),
			compatibility: HashMap::from([
				("EA".to_string(), Compatibility { state: state.to_string(), note: note.map(str::to_string) }),
			]),
			..Default::default()
		}
	}

	#[test]
	fn broken_state_produces_marked_warning() {
		let entry = entry_with_state("Broken", Some("crashes on load"));
		assert_eq!(entry.compatibility_warning("EA").as_deref(), Some("BROKEN: crashes on load"));
		assert_eq!(entry_with_state("Broken", None).compatibility_warning("EA").as_deref(), Some("BROKEN"));
		assert!(entry.compatibility_warning("EXP").is_none());
		assert!(entry_with_state("Works", None).compatibility_warning("EA").is_none());
	}

	#[test]
	fn download_link_matches_platform_exactly() {
		let entry = CatalogEntry {
			targets: vec![
				Target { platform: "LinuxServer".to_string(), link: "https://x/linux".to_string() },
				Target { platform: "Windows".to_string(), link: "https://x/win".to_string() },
			],
			..Default::default()
		};
		assert_eq!(entry.download_link("Windows"), Some("https://x/win"));
		assert_eq!(entry.download_link("WindowsServer"), None);
	}

	#[test]
	fn relative_links_are_joined_to_origin() {
		let catalog = FicsitCatalog::with_client(reqwest::Client::new(), "https://api.ficsit.app/");
		assert_eq!(catalog.absolute_link("/v1/version/x/Windows/download".to_string()), "https://api.ficsit.app/v1/version/x/Windows/download");
		assert_eq!(catalog.absolute_link("https://cdn/x".to_string()), "https://cdn/x");
	}

	#[test]
	fn api_response_parses() {
		let raw = r#"{"data": {"getModByReference": {
			"mod_reference": "RefinedPower",
			"compatibility": {"EA": {"state": "Works", "note": ""}, "EXP": null},
			"versions": [{
				"version": "3.2.0",
				"created_at": "2024-01-01T00:00:00Z",
				"targets": [{"targetName": "Windows", "link": "/v1/x"}],
				"dependencies": [{"mod_id": "SML", "optional": false}, {"mod_id": "Other", "optional": true}]
			}]
		}}}"#;
		let parsed: GraphQLResponse<ModQuery> = serde_json::from_str(raw).unwrap();
		let api_mod = parsed.data.unwrap().get_mod_by_reference.unwrap();
		assert_eq!(api_mod.mod_reference, "RefinedPower");
		assert_eq!(api_mod.versions[0].dependencies.len(), 2);
		assert!(api_mod.compatibility.unwrap()["EXP"].is_none());
	}

	#[tokio::test]
	async fn unreachable_origin_fails_connection_test() {
		let catalog = FicsitCatalog::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
		assert!(!catalog.test_connection().await);
	}
}
