use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use crate::InstantiationRequest;
use crate::TemplateError;
use crate::TemplateResult;

/// Prepended to every generated unit.
pub const GENERATED_HEADER: &str = "// Code generated by rstemplate. DO NOT EDIT.\n\n";

/// Output file stem pattern used when nothing else is configured.
pub const DEFAULT_OUTFMT: &str = "rstemplate_{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
	Primary,
	Tests,
}

/// A fully rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
	pub path: PathBuf,
	pub kind: UnitKind,
	pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
	Written,
	Unchanged,
}

/// Check that `outfmt` has exactly one `{}` placeholder.
pub fn validate_outfmt(outfmt: &str) -> TemplateResult<()> {
	if outfmt.matches("{}").count() == 1 {
		Ok(())
	} else {
		Err(TemplateError::InvalidOutputFormat(outfmt.to_string()))
	}
}

/// `rstemplate_{}` + `mySet` → `rstemplate_my_set`.
pub fn output_stem(outfmt: &str, request: &InstantiationRequest) -> TemplateResult<String> {
	validate_outfmt(outfmt)?;
	Ok(outfmt.replacen("{}", &request.file_stem(), 1))
}

pub fn primary_file_name(stem: &str) -> String {
	format!("{stem}.rs")
}

pub fn test_file_name(stem: &str) -> String {
	format!("{stem}_test.rs")
}

/// The module name under which the primary unit mounts its test unit.
pub fn test_module_name(stem: &str) -> String {
	let name: String = format!("{stem}_test")
		.chars()
		.map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
		.collect();
	if name.starts_with(|c: char| c.is_ascii_digit()) {
		format!("_{name}")
	} else {
		name
	}
}

/// Print `file`, check the printed text parses again and prepend the
/// generated-code header.
pub fn render_unit(path: &Path, file: &syn::File) -> TemplateResult<String> {
	let printed = prettyplease::unparse(file);
	syn::parse_file(&printed).map_err(|e| {
		TemplateError::Normalize {
			path: path.display().to_string(),
			reason: e.to_string(),
		}
	})?;

	Ok(format!("{GENERATED_HEADER}{printed}"))
}

/// Whether `content` was produced by this tool.
pub fn is_generated(content: &str) -> bool {
	content.starts_with(GENERATED_HEADER.trim_end())
}

/// The current bytes at `path`, or `None` when there is no file yet. Files
/// that aren't valid UTF-8 are still read so they can be replaced.
pub fn read_existing(path: &Path) -> TemplateResult<Option<Vec<u8>>> {
	match std::fs::read(path) {
		Ok(content) => Ok(Some(content)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => {
			Err(TemplateError::Read {
				path: path.display().to_string(),
				reason: e.to_string(),
			})
		}
	}
}

/// Whether writing `unit` would change the file on disk.
pub fn is_stale(unit: &OutputUnit) -> TemplateResult<bool> {
	Ok(read_existing(&unit.path)?.as_deref() != Some(unit.content.as_bytes()))
}

/// Write `unit` only when its bytes differ from the existing file.
pub fn write_if_changed(unit: &OutputUnit) -> TemplateResult<WriteOutcome> {
	if !is_stale(unit)? {
		tracing::debug!(path = %unit.path.display(), "output unchanged");
		return Ok(WriteOutcome::Unchanged);
	}

	std::fs::write(&unit.path, &unit.content).map_err(|e| {
		TemplateError::Write {
			path: unit.path.display().to_string(),
			reason: e.to_string(),
		}
	})?;
	tracing::info!(path = %unit.path.display(), "wrote output");

	Ok(WriteOutcome::Written)
}
