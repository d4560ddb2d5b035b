use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use rstemplate_cli::Commands;
use rstemplate_cli::OutputFormat;
use rstemplate_cli::RstemplateCli;
use rstemplate_core::CheckResult;
use rstemplate_core::InstantiateOptions;
use rstemplate_core::Instantiation;
use rstemplate_core::InstantiationRequest;
use rstemplate_core::TemplateConfig;
use rstemplate_core::UnitKind;
use rstemplate_core::WriteOutcome;
use rstemplate_core::check_instantiations;
use rstemplate_core::instantiate;
use rstemplate_core::instantiate_project;
use rstemplate_core::validate_outfmt;
use rstemplate_core::write_instantiations;
use serde::Serialize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
	let args = RstemplateCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	let default_level = if args.verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_ansi(use_color)
		.with_writer(std::io::stderr)
		.init();

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Instantiate {
			template,
			request,
			out_dir,
			dry_run,
		}) => run_instantiate(&args, template, request, out_dir.as_deref(), *dry_run),
		Some(Commands::Check {
			template,
			request,
			out_dir,
			diff,
			format,
		}) => {
			run_check(
				&args,
				template.as_deref(),
				request.as_deref(),
				out_dir.as_deref(),
				*diff,
				*format,
			)
		}
		Some(Commands::Generate { dry_run }) => run_generate(&args, *dry_run),
		None => {
			eprintln!("No subcommand specified. Run `rstemplate --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<rstemplate_core::TemplateError>() {
			Ok(template_err) => {
				let report: miette::Report = (*template_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn resolve_root(args: &RstemplateCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Config file settings, overridden by command line flags.
fn resolve_options(args: &RstemplateCli, root: &Path) -> Result<InstantiateOptions, Box<dyn std::error::Error>> {
	let config = TemplateConfig::load(root)?.unwrap_or_default();
	let mut options = InstantiateOptions::from(&config);

	if let Some(outfmt) = &args.outfmt {
		validate_outfmt(outfmt)?;
		options.outfmt.clone_from(outfmt);
	}
	if args.split_tests {
		options.split_tests = true;
	}

	Ok(options)
}

fn run_instantiate(
	args: &RstemplateCli,
	template: &Path,
	request: &str,
	out_dir: Option<&Path>,
	dry_run: bool,
) -> CliResult {
	let root = resolve_root(args);
	let options = resolve_options(args, &root)?;
	let request = InstantiationRequest::parse(request)?;
	let out_dir = out_dir.map_or_else(|| root.clone(), Path::to_path_buf);

	let instantiation = instantiate(template, &request, &out_dir, &options)?;
	write_or_preview(args, &[instantiation], &root, dry_run)
}

fn run_generate(args: &RstemplateCli, dry_run: bool) -> CliResult {
	let root = resolve_root(args);
	let options = resolve_options(args, &root)?;
	let instantiations = instantiate_project(&root, &options)?;

	if instantiations.is_empty() {
		println!("No `// rstemplate:generate` comments found.");
		return Ok(());
	}

	write_or_preview(args, &instantiations, &root, dry_run)
}

fn write_or_preview(args: &RstemplateCli, instantiations: &[Instantiation], root: &Path, dry_run: bool) -> CliResult {
	if dry_run {
		let result = check_instantiations(instantiations)?;
		if result.is_ok() {
			println!("All generated files are already up to date.");
			return Ok(());
		}

		println!("Dry run: would write {} file(s):", result.stale.len());
		for unit in &result.stale {
			println!("  {}", make_relative(&unit.path, root));
		}
		return Ok(());
	}

	let outcomes = write_instantiations(instantiations)?;
	let written: Vec<_> = outcomes
		.iter()
		.filter(|outcome| outcome.outcome == WriteOutcome::Written)
		.collect();

	if written.is_empty() {
		println!("All generated files are already up to date.");
	} else {
		println!("Wrote {} file(s):", written.len());
		for outcome in &written {
			println!("  {}", colored!(make_relative(&outcome.path, root), green));
		}
	}

	if args.verbose {
		for outcome in outcomes
			.iter()
			.filter(|outcome| outcome.outcome == WriteOutcome::Unchanged)
		{
			println!("  unchanged: {}", make_relative(&outcome.path, root));
		}
	}

	Ok(())
}

fn run_check(
	args: &RstemplateCli,
	template: Option<&Path>,
	request: Option<&str>,
	out_dir: Option<&Path>,
	show_diff: bool,
	format: OutputFormat,
) -> CliResult {
	let root = resolve_root(args);
	let options = resolve_options(args, &root)?;

	let instantiations = match (template, request) {
		(Some(template), Some(request)) => {
			let request = InstantiationRequest::parse(request)?;
			let out_dir = out_dir.map_or_else(|| root.clone(), Path::to_path_buf);
			vec![instantiate(template, &request, &out_dir, &options)?]
		}
		_ => instantiate_project(&root, &options)?,
	};
	let unit_count: usize = instantiations
		.iter()
		.map(|instantiation| instantiation.units.len())
		.sum();
	let result = check_instantiations(&instantiations)?;

	match format {
		OutputFormat::Json => println!("{}", serde_json::to_string(&CheckReport::new(&result, &root))?),
		OutputFormat::Text if result.is_ok() => {
			println!("Check passed: {unit_count} generated file(s) are up to date.");
		}
		OutputFormat::Text => print_stale(&result, &root, show_diff),
	}

	if !result.is_ok() {
		process::exit(1);
	}

	Ok(())
}

#[derive(Serialize)]
struct CheckReport {
	ok: bool,
	stale: Vec<StaleReport>,
}

#[derive(Serialize)]
struct StaleReport {
	file: String,
	kind: &'static str,
	missing: bool,
}

impl CheckReport {
	fn new(result: &CheckResult, root: &Path) -> Self {
		Self {
			ok: result.is_ok(),
			stale: result
				.stale
				.iter()
				.map(|unit| {
					StaleReport {
						file: make_relative(&unit.path, root),
						kind: unit_kind_label(unit.kind),
						missing: unit.current.is_none(),
					}
				})
				.collect(),
		}
	}
}

fn unit_kind_label(kind: UnitKind) -> &'static str {
	match kind {
		UnitKind::Primary => "primary",
		UnitKind::Tests => "tests",
	}
}

fn print_stale(result: &CheckResult, root: &Path, show_diff: bool) {
	eprintln!("{}", colored!("Check failed.", bold));
	eprintln!();
	eprintln!("Stale files:");

	let mut stale: Vec<_> = result.stale.iter().collect();
	stale.sort_by(|a, b| a.path.cmp(&b.path));
	for unit in stale {
		let rel = make_relative(&unit.path, root);
		let state = if unit.current.is_some() { "out of date" } else { "missing" };
		eprintln!("  {rel} ({state})");

		if show_diff {
			print_diff(unit.current.as_deref().unwrap_or_default(), &unit.expected);
		}
	}

	eprintln!();
	eprintln!(
		"{} generated file(s) are out of date. Run `rstemplate instantiate` or `rstemplate \
		 generate` to fix.",
		result.stale.len()
	);
}

fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
