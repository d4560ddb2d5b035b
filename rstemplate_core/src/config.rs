use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::DEFAULT_OUTFMT;
use crate::TemplateError;
use crate::TemplateResult;
use crate::validate_outfmt;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["rstemplate.toml", ".rstemplate.toml", ".config/rstemplate.toml"];

/// Configuration loaded from an `rstemplate.toml` file.
///
/// ```toml
/// outfmt = "gen_{}"
/// split_tests = true
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
	/// File stem pattern for generated units. `{}` is replaced by the
	/// snake_case instantiation name.
	#[serde(default = "default_outfmt")]
	pub outfmt: String,
	/// Move test-only items into a separate `<stem>_test.rs` unit.
	#[serde(default)]
	pub split_tests: bool,
}

fn default_outfmt() -> String {
	DEFAULT_OUTFMT.to_string()
}

impl Default for TemplateConfig {
	fn default() -> Self {
		Self {
			outfmt: default_outfmt(),
			split_tests: false,
		}
	}
}

impl TemplateConfig {
	/// Resolve the first existing config file path from supported candidates.
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load config from the first supported location under `root`.
	pub fn load(root: &Path) -> TemplateResult<Option<TemplateConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: TemplateConfig =
			toml::from_str(&content).map_err(|e| TemplateError::ConfigParse(e.to_string()))?;
		validate_outfmt(&config.outfmt)?;
		tracing::debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}
}
