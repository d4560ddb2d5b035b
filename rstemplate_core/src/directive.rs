use std::path::Path;
use std::sync::LazyLock;

use quote::ToTokens;
use regex::Regex;
use syn::Expr;
use syn::Ident;
use syn::Token;
use syn::Type;
use syn::parenthesized;
use syn::parse::Parse;
use syn::parse::ParseStream;
use syn::parse::discouraged::Speculative;

use crate::TemplateError;
use crate::TemplateResult;

static TEMPLATE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^//\s*template\s+type\s+(\w+\s*.*?)\s*$").unwrap_or_else(|e| panic!("{e}"))
});
static TEMPLATE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^//\s*template\s+format\s*$").unwrap_or_else(|e| panic!("{e}"))
});

/// A comment found in the raw module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
	/// 1-indexed line the comment starts on.
	pub line: usize,
	/// The full comment text including its `//` or `/*` opener.
	pub text: String,
	/// True when nothing but whitespace precedes the comment on its line.
	pub own_line: bool,
}

impl Comment {
	/// Whether this comment is a `// template format` marker.
	pub fn is_format_directive(&self) -> bool {
		TEMPLATE_FORMAT.is_match(&self.text)
	}
}

/// The `// template type Name(A, B)` header of a template module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
	/// The template's own name (`Set` in `template type Set(A)`).
	pub name: String,
	/// Formal parameter names in declaration order.
	pub formal_params: Vec<String>,
	/// 1-indexed line of the directive comment.
	pub line: usize,
}

/// `Name(Arg, ...)`, the grammar shared by template directives and
/// instantiation requests.
#[derive(Debug, Clone)]
pub struct CallSyntax {
	pub name: Ident,
	pub args: Vec<CallArgument>,
}

/// A single argument of a [`CallSyntax`], kept as printed tokens.
#[derive(Debug, Clone)]
pub struct CallArgument {
	pub text: String,
	pub is_ident: bool,
}

impl Parse for CallSyntax {
	fn parse(input: ParseStream) -> syn::Result<Self> {
		let name: Ident = input.parse()?;
		let content;
		parenthesized!(content in input);
		let mut args = Vec::new();
		while !content.is_empty() {
			args.push(parse_argument(&content)?);
			if content.is_empty() {
				break;
			}
			content.parse::<Token![,]>()?;
		}

		Ok(Self { name, args })
	}
}

/// Types win over expressions so `Vec<u8>` is not read as a comparison.
fn parse_argument(input: ParseStream) -> syn::Result<CallArgument> {
	let fork = input.fork();
	if let Ok(ty) = fork.parse::<Type>() {
		if fork.is_empty() || fork.peek(Token![,]) {
			input.advance_to(&fork);
			let is_ident = matches!(&ty, Type::Path(path) if path.qself.is_none() && path.path.get_ident().is_some());
			return Ok(CallArgument {
				text: ty.to_token_stream().to_string(),
				is_ident,
			});
		}
	}

	let expr: Expr = input.parse()?;
	Ok(CallArgument {
		text: expr.to_token_stream().to_string(),
		is_ident: false,
	})
}

/// Parse `Name(Arg, ...)`.
pub fn parse_call(text: &str) -> TemplateResult<CallSyntax> {
	syn::parse_str::<CallSyntax>(text.trim()).map_err(|e| {
		TemplateError::InvalidCall {
			text: text.to_string(),
			reason: e.to_string(),
		}
	})
}

/// Extract every `//` and `/* */` comment from Rust source text, skipping
/// string, byte string, raw string and character literals.
pub fn scan_comments(source: &str) -> Vec<Comment> {
	let chars: Vec<char> = source.chars().collect();
	let mut comments = Vec::new();
	let mut index = 0;
	let mut line = 1;
	let mut line_has_code = false;

	while index < chars.len() {
		let ch = chars[index];
		let next = chars.get(index + 1).copied();

		match ch {
			'\n' => {
				line += 1;
				line_has_code = false;
				index += 1;
			}
			'/' if next == Some('/') => {
				let start = index;
				while index < chars.len() && chars[index] != '\n' {
					index += 1;
				}
				comments.push(Comment {
					line,
					text: chars[start..index].iter().collect::<String>().trim_end().to_string(),
					own_line: !line_has_code,
				});
			}
			'/' if next == Some('*') => {
				let start = index;
				let start_line = line;
				let mut depth = 0usize;
				while index < chars.len() {
					if chars[index] == '/' && chars.get(index + 1) == Some(&'*') {
						depth += 1;
						index += 2;
					} else if chars[index] == '*' && chars.get(index + 1) == Some(&'/') {
						depth -= 1;
						index += 2;
						if depth == 0 {
							break;
						}
					} else {
						if chars[index] == '\n' {
							line += 1;
						}
						index += 1;
					}
				}
				comments.push(Comment {
					line: start_line,
					text: chars[start..index].iter().collect(),
					own_line: !line_has_code,
				});
				line_has_code = true;
			}
			'r' if is_raw_string_start(&chars, index) => {
				line_has_code = true;
				index = skip_raw_string(&chars, index, &mut line);
			}
			'"' => {
				line_has_code = true;
				index = skip_quoted(&chars, index, '"', &mut line);
			}
			'\'' => {
				line_has_code = true;
				index = skip_char_literal(&chars, index);
			}
			c if c.is_whitespace() => index += 1,
			_ => {
				line_has_code = true;
				index += 1;
			}
		}
	}

	comments
}

fn is_raw_string_start(chars: &[char], index: usize) -> bool {
	let is_ident_char = |c: char| c.is_alphanumeric() || c == '_';
	if index > 0 && is_ident_char(chars[index - 1]) {
		// `br"..."` starts at `b`; anything else is an identifier ending in r.
		let byte_prefix = chars[index - 1] == 'b' && (index < 2 || !is_ident_char(chars[index - 2]));
		if !byte_prefix {
			return false;
		}
	}
	let mut cursor = index + 1;
	while chars.get(cursor) == Some(&'#') {
		cursor += 1;
	}
	chars.get(cursor) == Some(&'"')
}

fn skip_raw_string(chars: &[char], index: usize, line: &mut usize) -> usize {
	let mut cursor = index + 1;
	let mut hashes = 0;
	while chars.get(cursor) == Some(&'#') {
		hashes += 1;
		cursor += 1;
	}
	cursor += 1;
	while cursor < chars.len() {
		if chars[cursor] == '\n' {
			*line += 1;
		}
		if chars[cursor] == '"' && (1..=hashes).all(|n| chars.get(cursor + n) == Some(&'#')) {
			return cursor + 1 + hashes;
		}
		cursor += 1;
	}
	cursor
}

fn skip_quoted(chars: &[char], index: usize, quote: char, line: &mut usize) -> usize {
	let mut cursor = index + 1;
	while cursor < chars.len() {
		match chars[cursor] {
			'\\' => {
				if chars.get(cursor + 1) == Some(&'\n') {
					*line += 1;
				}
				cursor += 2;
			}
			'\n' => {
				*line += 1;
				cursor += 1;
			}
			c if c == quote => return cursor + 1,
			_ => cursor += 1,
		}
	}
	cursor
}

/// Character literals end at the next quote; lifetimes (`'a`) have none.
fn skip_char_literal(chars: &[char], index: usize) -> usize {
	match (chars.get(index + 1), chars.get(index + 2)) {
		(Some('\\'), _) => {
			let mut cursor = index + 3;
			while cursor < chars.len() && chars[cursor] != '\'' && chars[cursor] != '\n' {
				cursor += 1;
			}
			cursor + 1
		}
		(Some(_), Some('\'')) => index + 3,
		_ => index + 1,
	}
}

/// Find the single `template type` directive among the module's comments.
pub fn scan_directive(path: &Path, comments: &[Comment]) -> TemplateResult<Directive> {
	let mut found: Option<Directive> = None;

	for comment in comments {
		let Some(captures) = TEMPLATE_TYPE.captures(&comment.text) else {
			continue;
		};
		if let Some(existing) = &found {
			return Err(TemplateError::DuplicateDirective {
				path: path.display().to_string(),
				first: existing.line,
				second: comment.line,
			});
		}

		let call = parse_call(&captures[1])?;
		let mut formal_params = Vec::with_capacity(call.args.len());
		for arg in call.args {
			if !arg.is_ident {
				return Err(TemplateError::InvalidCall {
					text: captures[1].to_string(),
					reason: format!("formal parameter `{}` must be an identifier", arg.text),
				});
			}
			formal_params.push(arg.text);
		}

		found = Some(Directive {
			name: call.name.to_string(),
			formal_params,
			line: comment.line,
		});
	}

	let directive = found.ok_or_else(|| TemplateError::MissingDirective(path.display().to_string()))?;
	tracing::debug!(
		name = %directive.name,
		params = ?directive.formal_params,
		"found template directive"
	);

	Ok(directive)
}

/// Comments attached to an item spanning `start_line..=keyword_line`: the
/// unbroken run of own-line comments directly above it plus any comments
/// interleaved with its attributes.
pub fn leading_comments(comments: &[Comment], start_line: usize, keyword_line: usize) -> Vec<&Comment> {
	let mut attached: Vec<&Comment> = comments
		.iter()
		.filter(|c| c.line >= start_line && c.line < keyword_line)
		.collect();

	let mut expected = start_line;
	for comment in comments.iter().rev().filter(|c| c.line < start_line) {
		if !comment.own_line || comment.line + 1 != expected {
			break;
		}
		attached.push(comment);
		expected = comment.line;
	}

	attached
}
