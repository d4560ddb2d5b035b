use std::path::Path;
use std::path::PathBuf;

use proc_macro2::Span;
use syn::Ident;
use syn::Item;

use crate::DEFAULT_OUTFMT;
use crate::InstantiationRequest;
use crate::Module;
use crate::OutputUnit;
use crate::TemplateConfig;
use crate::TemplateResult;
use crate::TestPartition;
use crate::UnitKind;
use crate::WriteOutcome;
use crate::analyze;
use crate::bind;
use crate::classify;
use crate::directive::scan_directive;
use crate::format::inject;
use crate::load_module;
use crate::locate_template;
use crate::output_stem;
use crate::partition_tests;
use crate::primary_file_name;
use crate::read_existing;
use crate::render_unit;
use crate::restrict_visibility;
use crate::rewrite::rewrite;
use crate::scan_generate_directives;
use crate::test_file_name;
use crate::test_module_name;
use crate::write_if_changed;

/// Settings shared by every instantiation in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiateOptions {
	pub outfmt: String,
	pub split_tests: bool,
}

impl Default for InstantiateOptions {
	fn default() -> Self {
		Self {
			outfmt: DEFAULT_OUTFMT.to_string(),
			split_tests: false,
		}
	}
}

impl From<&TemplateConfig> for InstantiateOptions {
	fn from(config: &TemplateConfig) -> Self {
		Self {
			outfmt: config.outfmt.clone(),
			split_tests: config.split_tests,
		}
	}
}

/// The rendered units for one instantiation request, not yet written.
#[derive(Debug, Clone)]
pub struct Instantiation {
	pub template: PathBuf,
	pub request: InstantiationRequest,
	pub units: Vec<OutputUnit>,
}

/// A unit whose file is missing or differs from the rendered content.
#[derive(Debug, Clone)]
pub struct StaleUnit {
	pub path: PathBuf,
	pub kind: UnitKind,
	/// Content currently on disk, `None` when the file doesn't exist.
	/// Invalid UTF-8 is replaced lossily.
	pub current: Option<String>,
	pub expected: String,
}

/// Result of comparing instantiations against the files on disk.
#[derive(Debug, Default)]
pub struct CheckResult {
	pub stale: Vec<StaleUnit>,
}

impl CheckResult {
	pub fn is_ok(&self) -> bool {
		self.stale.is_empty()
	}
}

/// What happened to one unit when an instantiation was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
	pub path: PathBuf,
	pub kind: UnitKind,
	pub outcome: WriteOutcome,
}

/// Instantiate the template at `template` (a file, or a directory with one
/// `.rs` file) into units placed in `output_dir`.
pub fn instantiate(
	template: &Path,
	request: &InstantiationRequest,
	output_dir: &Path,
	options: &InstantiateOptions,
) -> TemplateResult<Instantiation> {
	let template = locate_template(template)?;
	let module = load_module(&template)?;
	build(module, request, output_dir, options)
}

/// Instantiate template source that is already in memory. `path` is only
/// used in diagnostics.
pub fn instantiate_source(
	path: &Path,
	source: &str,
	request: &InstantiationRequest,
	output_dir: &Path,
	options: &InstantiateOptions,
) -> TemplateResult<Instantiation> {
	let module = analyze(path, source)?;
	build(module, request, output_dir, options)
}

fn build(
	module: Module,
	request: &InstantiationRequest,
	output_dir: &Path,
	options: &InstantiateOptions,
) -> TemplateResult<Instantiation> {
	let directive = scan_directive(&module.path, &module.comments)?;
	let bindings = bind(&directive, request)?;
	let classification = classify(&module, &directive, &bindings, request)?;

	let Module {
		path,
		mut syntax,
		symbols,
		..
	} = module;
	syntax.items.retain(|item| !classification.eliminates(item));
	rewrite(&mut syntax, &symbols, &classification.substitutions)?;
	inject(&mut syntax, &classification.format_stubs)?;
	if !request.is_public() {
		restrict_visibility(&mut syntax.items);
	}
	syntax.attrs.push(allow_mangled_names());

	let stem = output_stem(&options.outfmt, request)?;
	let primary_path = output_dir.join(primary_file_name(&stem));
	let mut units = Vec::with_capacity(2);

	if options.split_tests && classification.has_test_code {
		let TestPartition { mut primary, tests } = partition_tests(std::mem::take(&mut syntax.items));
		let test_file = test_file_name(&stem);
		let test_module = Ident::new(&test_module_name(&stem), Span::call_site());
		primary.push(syn::parse_quote! {
			#[cfg(test)]
			#[path = #test_file]
			mod #test_module;
		});
		syntax.items = primary;

		let mut test_items: Vec<Item> = vec![syn::parse_quote!(use super::*;)];
		test_items.extend(tests);
		let test_syntax = syn::File {
			shebang: None,
			attrs: vec![allow_mangled_names()],
			items: test_items,
		};

		units.push(OutputUnit {
			content: render_unit(&path, &syntax)?,
			path: primary_path,
			kind: UnitKind::Primary,
		});
		units.push(OutputUnit {
			content: render_unit(&path, &test_syntax)?,
			path: output_dir.join(test_file),
			kind: UnitKind::Tests,
		});
	} else {
		units.push(OutputUnit {
			content: render_unit(&path, &syntax)?,
			path: primary_path,
			kind: UnitKind::Primary,
		});
	}

	tracing::debug!(
		template = %path.display(),
		request = %request,
		units = units.len(),
		"instantiated template"
	);

	Ok(Instantiation {
		template: path,
		request: request.clone(),
		units,
	})
}

/// Inner attribute silencing the naming lints that mangled names trip.
fn allow_mangled_names() -> syn::Attribute {
	syn::parse_quote!(#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)])
}

/// Instantiate every `// rstemplate:generate` request under `root`, each
/// into the directory of the file that holds it.
pub fn instantiate_project(root: &Path, options: &InstantiateOptions) -> TemplateResult<Vec<Instantiation>> {
	scan_generate_directives(root)?
		.iter()
		.map(|directive| {
			instantiate(
				&directive.template,
				&directive.request,
				directive.output_dir(),
				options,
			)
		})
		.collect()
}

/// Compare rendered units with the files on disk without writing.
pub fn check_instantiations(instantiations: &[Instantiation]) -> TemplateResult<CheckResult> {
	let mut result = CheckResult::default();

	for unit in instantiations.iter().flat_map(|instantiation| &instantiation.units) {
		let current = read_existing(&unit.path)?;
		if current.as_deref() != Some(unit.content.as_bytes()) {
			result.stale.push(StaleUnit {
				path: unit.path.clone(),
				kind: unit.kind,
				current: current.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
				expected: unit.content.clone(),
			});
		}
	}

	Ok(result)
}

/// Write every unit whose content changed.
pub fn write_instantiations(instantiations: &[Instantiation]) -> TemplateResult<Vec<UnitOutcome>> {
	instantiations
		.iter()
		.flat_map(|instantiation| &instantiation.units)
		.map(|unit| {
			Ok(UnitOutcome {
				path: unit.path.clone(),
				kind: unit.kind,
				outcome: write_if_changed(unit)?,
			})
		})
		.collect()
}
