#![allow(dead_code)]

use std::path::Path;
use std::path::PathBuf;

use assert_cmd::Command;

pub const SET_TEMPLATE: &str = "// template type Set(A)

use std::collections::BTreeSet;

type A = u32;

#[derive(Debug, Default)]
pub struct Set {
	items: BTreeSet<A>,
}

pub fn newSet() -> Set {
	Set::default()
}
";

pub const LIST_TEMPLATE: &str = "// template type List(A)

type A = i32;

#[derive(Debug, Default)]
pub struct List {
	items: Vec<A>,
}

#[test]
fn list_starts_empty() {
	assert!(List::default().items.is_empty());
}
";

pub fn rstemplate_cmd() -> Command {
	let mut cmd = Command::new(env!("CARGO_BIN_EXE_rstemplate"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}

/// Write `content` to `templates/<name>` under `root` and return its path.
pub fn write_template(root: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
	let dir = root.join("templates");
	std::fs::create_dir_all(&dir)?;
	let path = dir.join(name);
	std::fs::write(&path, content)?;
	Ok(path)
}
