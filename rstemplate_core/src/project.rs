use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;

use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use regex::Regex;

use crate::InstantiationRequest;
use crate::TemplateError;
use crate::TemplateResult;
use crate::directive::scan_comments;
use crate::is_generated;

static GENERATE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^//\s*rstemplate:generate\s+(\S+)\s+(.+?)\s*$").unwrap_or_else(|e| panic!("{e}"))
});

/// A `// rstemplate:generate <template> <Request>` comment found in a
/// project source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateDirective {
	/// The file holding the comment. Output is written next to it.
	pub file: PathBuf,
	/// 1-indexed line of the comment.
	pub line: usize,
	/// Template path, resolved relative to `file`.
	pub template: PathBuf,
	pub request: InstantiationRequest,
}

impl GenerateDirective {
	/// Directory the instantiated units are written to.
	pub fn output_dir(&self) -> &Path {
		self.file.parent().unwrap_or_else(|| Path::new("."))
	}
}

/// Resolve a template argument to a single `.rs` file. A directory must
/// contain exactly one.
pub fn locate_template(path: &Path) -> TemplateResult<PathBuf> {
	if path.is_file() {
		return Ok(path.to_path_buf());
	}
	if !path.is_dir() {
		return Err(TemplateError::TemplateNotFound(path.display().to_string()));
	}

	let mut candidates = Vec::new();
	for entry in std::fs::read_dir(path)? {
		let candidate = entry?.path();
		if candidate.is_file() && is_rust_file(&candidate) {
			candidates.push(candidate);
		}
	}

	match candidates.len() {
		0 => Err(TemplateError::TemplateNotFound(path.display().to_string())),
		1 => Ok(candidates.remove(0)),
		count => {
			Err(TemplateError::AmbiguousTemplate {
				path: path.display().to_string(),
				count,
			})
		}
	}
}

fn is_rust_file(path: &Path) -> bool {
	path.extension().is_some_and(|extension| extension == "rs")
}

/// Parse every generate directive in `content`, the source of `file`.
pub fn parse_generate_directives(file: &Path, content: &str) -> TemplateResult<Vec<GenerateDirective>> {
	let base = file.parent().unwrap_or_else(|| Path::new("."));
	let mut directives = Vec::new();

	for comment in scan_comments(content) {
		let Some(captures) = GENERATE_DIRECTIVE.captures(&comment.text) else {
			continue;
		};
		directives.push(GenerateDirective {
			file: file.to_path_buf(),
			line: comment.line,
			template: base.join(&captures[1]),
			request: InstantiationRequest::parse(&captures[2])?,
		});
	}

	Ok(directives)
}

/// Walk `root` for `.rs` files and collect their generate directives in
/// path order. Generated units are skipped.
pub fn scan_generate_directives(root: &Path) -> TemplateResult<Vec<GenerateDirective>> {
	let mut directives = Vec::new();

	for file in collect_source_files(root)? {
		let content = std::fs::read_to_string(&file).map_err(|e| {
			TemplateError::Read {
				path: file.display().to_string(),
				reason: e.to_string(),
			}
		})?;
		if is_generated(&content) {
			continue;
		}
		directives.extend(parse_generate_directives(&file, &content)?);
	}
	tracing::debug!(root = %root.display(), count = directives.len(), "scanned generate directives");

	Ok(directives)
}

/// All `.rs` files under `root` not excluded by its `.gitignore`, sorted.
pub fn collect_source_files(root: &Path) -> TemplateResult<Vec<PathBuf>> {
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();
	let gitignore = build_gitignore(root);
	walk_dir(root, &mut files, &gitignore, &mut visited_dirs)?;
	files.sort();

	Ok(files)
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		if let Some(error) = builder.add(&gitignore_path) {
			tracing::warn!(path = %gitignore_path.display(), %error, "ignoring unreadable .gitignore");
		}
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "target" || name == "node_modules"
}

fn walk_dir(
	dir: &Path,
	files: &mut Vec<PathBuf>,
	gitignore: &Gitignore,
	visited_dirs: &mut HashSet<PathBuf>,
) -> TemplateResult<()> {
	let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
	if !visited_dirs.insert(canonical) {
		return Ok(());
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let is_dir = path.is_dir();

		if is_dir
			&& path
				.file_name()
				.and_then(|name| name.to_str())
				.is_some_and(is_ignored_directory_name)
		{
			continue;
		}
		if gitignore.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if is_dir {
			walk_dir(&path, files, gitignore, visited_dirs)?;
		} else if is_rust_file(&path) {
			files.push(path);
		}
	}

	Ok(())
}
