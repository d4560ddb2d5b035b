use std::sync::LazyLock;

use regex::Regex;

static FIRST_CAP: LazyLock<Regex> =
	LazyLock::new(|| Regex::new("(.)([A-Z][a-z]+)").unwrap_or_else(|e| panic!("{e}")));
static ALL_CAP: LazyLock<Regex> =
	LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").unwrap_or_else(|e| panic!("{e}")));

/// `mySet` → `my_set`, `HTTPServer` → `http_server`.
pub fn snake_case(name: &str) -> String {
	let snake = FIRST_CAP.replace_all(name, "${1}_${2}");
	let snake = ALL_CAP.replace_all(&snake, "${1}_${2}");
	snake.to_lowercase()
}

/// Whether an identifier reads as exported (upper-case leading character).
pub fn is_exported(name: &str) -> bool {
	name.chars().next().is_some_and(char::is_uppercase)
}

pub(crate) fn capitalize(name: &str) -> String {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

pub(crate) fn decapitalize(name: &str) -> String {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) => first.to_lowercase().chain(chars).collect(),
		None => String::new(),
	}
}

/// Derive the instantiated name of a non-placeholder top-level symbol.
///
/// Names containing the template name get its first occurrence replaced by
/// the instantiation name (capitalised unless the match is at the very
/// start). Other names get the capitalised instantiation name appended. An
/// unexported instantiation never produces an exported-looking name.
pub fn mangle(name: &str, template_name: &str, instantiation: &str, public: bool) -> String {
	let replacement = match name.find(template_name) {
		Some(index) if !template_name.is_empty() => {
			let inner = if index == 0 {
				instantiation.to_string()
			} else {
				capitalize(instantiation)
			};
			name.replacen(template_name, &inner, 1)
		}
		_ => {
			let replacement = format!("{name}{}", capitalize(instantiation));
			tracing::debug!(
				name,
				template_name,
				%replacement,
				"top-level definition doesn't contain template name"
			);
			replacement
		}
	};

	if !public && is_exported(&replacement) {
		decapitalize(&replacement)
	} else {
		replacement
	}
}
