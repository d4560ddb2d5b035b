use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Instantiate generic Rust source templates into concrete modules.",
	long_about = "rstemplate turns a template module, marked with a `// template type \
	              Name(A, B)` comment, into a concrete module for one set of type or value \
	              arguments. Every top-level item is renamed after the instantiation so several \
	              instantiations can live in the same crate.\n\nQuick start:\n  rstemplate \
	              instantiate templates/set.rs 'mySet(String)'  Write rstemplate_my_set.rs\n  \
	              rstemplate check templates/set.rs 'mySet(String)'        Verify it is up to \
	              date\n  rstemplate generate                                      Process every \
	              `// rstemplate:generate` comment"
)]
pub struct RstemplateCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory. Configuration is read from here
	/// and `generate` scans it.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,

	/// Output file name pattern. Must contain exactly one `{}`, which is
	/// replaced by the snake_case instantiation name.
	#[arg(long, global = true)]
	pub outfmt: Option<String>,

	/// Move test-only items into a separate `<stem>_test.rs` file.
	#[arg(long, global = true, default_value_t = false)]
	pub split_tests: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Instantiate a template and write the generated module.
	///
	/// The template is a `.rs` file, or a directory holding exactly one. The
	/// request names the instantiation and its arguments, for example
	/// `mySet(String)`. Files are only rewritten when their content changes.
	Instantiate {
		/// Template file or directory.
		template: PathBuf,

		/// Instantiation request such as `mySet(String)`.
		request: String,

		/// Directory the generated files are written to. Defaults to the
		/// project root.
		#[arg(long, short)]
		out_dir: Option<PathBuf>,

		/// Print what would be written without touching the disk.
		#[arg(long, default_value_t = false)]
		dry_run: bool,
	},
	/// Check that generated modules are up to date.
	///
	/// With a template and request, checks that single instantiation. Without
	/// them, checks every `// rstemplate:generate` comment in the project.
	/// Exits with status 1 when anything is missing or stale.
	Check {
		/// Template file or directory.
		#[arg(requires = "request")]
		template: Option<PathBuf>,

		/// Instantiation request such as `mySet(String)`.
		request: Option<String>,

		/// Directory the generated files live in. Defaults to the project
		/// root.
		#[arg(long, short)]
		out_dir: Option<PathBuf>,

		/// Show a unified diff for each stale file.
		#[arg(long, default_value_t = false)]
		diff: bool,

		/// Output format for check results. Use `text` for human-readable
		/// output or `json` for programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Process every `// rstemplate:generate <template> <request>` comment.
	///
	/// Walks the project's `.rs` files, respecting `.gitignore`, and writes
	/// each instantiation next to the file holding the comment. Template
	/// paths are relative to that file.
	Generate {
		/// Print what would be written without touching the disk.
		#[arg(long, default_value_t = false)]
		dry_run: bool,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption. Each stale entry includes
	/// the file path, unit kind, and whether the file exists.
	Json,
}
