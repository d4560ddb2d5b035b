use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use proc_macro2::Literal;
use proc_macro2::Span;
use syn::Arm;
use syn::Attribute;
use syn::Block;
use syn::Expr;
use syn::ExprLit;
use syn::ExprClosure;
use syn::ExprForLoop;
use syn::ExprIf;
use syn::ExprLet;
use syn::ExprPath;
use syn::ExprStruct;
use syn::ExprWhile;
use syn::Fields;
use syn::GenericArgument;
use syn::GenericParam;
use syn::Generics;
use syn::Ident;
use syn::ImplItemFn;
use syn::Item;
use syn::ItemEnum;
use syn::ItemFn;
use syn::ItemImpl;
use syn::ItemMod;
use syn::ItemStruct;
use syn::ItemTrait;
use syn::ItemType;
use syn::ItemUnion;
use syn::ItemUse;
use syn::Lit;
use syn::LitStr;
use syn::Local;
use syn::Macro;
use syn::Member;
use syn::PatIdent;
use syn::PatStruct;
use syn::PatTupleStruct;
use syn::Stmt;
use syn::Token;
use syn::TraitItemFn;
use syn::Type;
use syn::TypePath;
use syn::UseTree;
use syn::parse::ParseStream;
use syn::visit;
use syn::visit::Visit;

use crate::Comment;
use crate::TemplateError;
use crate::TemplateResult;
use crate::directive::scan_comments;

/// Line and column of an identifier token in the template source. Every
/// identifier occurrence has a distinct site, so sites key the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site {
	/// 1-indexed line.
	pub line: usize,
	/// 0-indexed column in characters.
	pub column: usize,
}

impl Site {
	pub fn of(ident: &Ident) -> Self {
		Self::from_span(ident.span())
	}

	pub fn from_span(span: Span) -> Self {
		let start = span.start();
		Self {
			line: start.line,
			column: start.column,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
	Type,
	Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
	Const,
	Static,
	Function,
	Struct,
	TupleStruct,
	UnitStruct,
	Enum,
	Union,
	TypeAlias,
	Trait,
	Module,
	Import,
	Local,
	TypeParam,
	ConstParam,
}

impl SymbolKind {
	pub fn namespaces(self) -> &'static [Namespace] {
		match self {
			Self::Const | Self::Static | Self::Function | Self::Local | Self::ConstParam => {
				&[Namespace::Value]
			}
			Self::Struct
			| Self::Enum
			| Self::Union
			| Self::TypeAlias
			| Self::Trait
			| Self::Module
			| Self::TypeParam => &[Namespace::Type],
			Self::TupleStruct | Self::UnitStruct | Self::Import => {
				&[Namespace::Type, Namespace::Value]
			}
		}
	}

	/// Kinds an identifier pattern refers to instead of binding a new name.
	fn is_pattern_constant(self) -> bool {
		matches!(self, Self::Const | Self::UnitStruct)
	}
}

/// A resolved identifier: one definition site and every use site.
#[derive(Debug, Clone)]
pub struct Symbol {
	pub name: String,
	pub kind: SymbolKind,
	/// Defined directly in the module's root scope.
	pub top_level: bool,
	pub definition: Site,
	pub uses: Vec<Site>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
	/// `Config { capacity }` where `capacity` names a module-level value.
	FieldShorthand,
	/// `use super::Set;` inside an inline module.
	Import,
	/// `limit` captured inline by `format!("{limit}")`. The site lies inside
	/// the string literal.
	FormatArgument,
}

/// An occurrence that names a field or import and also denotes `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
	pub kind: AliasKind,
	pub target: SymbolId,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
	symbols: Vec<Symbol>,
	definitions: HashMap<Site, SymbolId>,
	uses: HashMap<Site, SymbolId>,
	aliases: HashMap<Site, Alias>,
}

impl SymbolTable {
	pub fn get(&self, id: SymbolId) -> &Symbol {
		&self.symbols[id.0]
	}

	pub fn definition_at(&self, site: Site) -> Option<SymbolId> {
		self.definitions.get(&site).copied()
	}

	pub fn use_at(&self, site: Site) -> Option<SymbolId> {
		self.uses.get(&site).copied()
	}

	pub fn alias_at(&self, site: Site) -> Option<Alias> {
		self.aliases.get(&site).copied()
	}

	/// The symbol an occurrence at `site` denotes, whether it defines it, uses
	/// it or aliases it.
	pub fn resolve(&self, site: Site) -> Option<SymbolId> {
		self.definition_at(site)
			.or_else(|| self.use_at(site))
			.or_else(|| self.alias_at(site).map(|alias| alias.target))
	}

	pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
		self.symbols
			.iter()
			.enumerate()
			.map(|(index, symbol)| (SymbolId(index), symbol))
	}

	pub fn top_level(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
		self.iter().filter(|(_, symbol)| symbol.top_level)
	}

	/// All symbols with the given source name, across every scope.
	pub fn named(&self, name: &str) -> Vec<SymbolId> {
		self.iter()
			.filter(|(_, symbol)| symbol.name == name)
			.map(|(id, _)| id)
			.collect()
	}

	fn push(&mut self, symbol: Symbol) -> SymbolId {
		let id = SymbolId(self.symbols.len());
		self.definitions.insert(symbol.definition, id);
		self.symbols.push(symbol);
		id
	}

	fn record_use(&mut self, site: Site, id: SymbolId) {
		self.uses.insert(site, id);
		self.symbols[id.0].uses.push(site);
	}
}

/// A parsed and resolved template module.
#[derive(Debug, Clone)]
pub struct Module {
	pub path: PathBuf,
	pub syntax: syn::File,
	pub comments: Vec<Comment>,
	pub symbols: SymbolTable,
}

/// Read, parse and resolve the template module at `path`.
pub fn load_module(path: &Path) -> TemplateResult<Module> {
	let source = std::fs::read_to_string(path).map_err(|e| {
		TemplateError::Read {
			path: path.display().to_string(),
			reason: e.to_string(),
		}
	})?;
	analyze(path, &source)
}

/// Parse and resolve template source that was already read from `path`.
pub fn analyze(path: &Path, source: &str) -> TemplateResult<Module> {
	let syntax = syn::parse_file(source).map_err(|e| {
		let start = e.span().start();
		TemplateError::Parse {
			path: path.display().to_string(),
			message: format!("{}:{}: {e}", start.line, start.column + 1),
		}
	})?;
	let comments = scan_comments(source);
	let symbols = resolve(path, &syntax)?;
	tracing::debug!(
		path = %path.display(),
		items = syntax.items.len(),
		comments = comments.len(),
		"loaded template module"
	);

	Ok(Module {
		path: path.to_path_buf(),
		syntax,
		comments,
		symbols,
	})
}

/// Resolve every identifier occurrence in `file` to its symbol.
pub fn resolve(path: &Path, file: &syn::File) -> TemplateResult<SymbolTable> {
	let mut resolver = Resolver::default();
	resolver.enter_module();
	resolver.declare_items(&file.items);
	for item in &file.items {
		resolver.visit_item(item);
	}

	match resolver.errors.into_iter().next() {
		Some(message) => {
			Err(TemplateError::Semantic {
				path: path.display().to_string(),
				message,
			})
		}
		None => Ok(resolver.table),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScopeKind {
	/// File root or inline module. Lookups stop here unless the module
	/// glob-imports its parent.
	Module { glob_parent: bool },
	#[default]
	Block,
}

#[derive(Debug, Default)]
struct Scope {
	kind: ScopeKind,
	types: HashMap<String, SymbolId>,
	values: HashMap<String, SymbolId>,
}

impl Scope {
	fn get(&self, name: &str, namespace: Namespace) -> Option<SymbolId> {
		match namespace {
			Namespace::Type => self.types.get(name),
			Namespace::Value => self.values.get(name),
		}
		.copied()
	}

	fn names_mut(&mut self, namespace: Namespace) -> &mut HashMap<String, SymbolId> {
		match namespace {
			Namespace::Type => &mut self.types,
			Namespace::Value => &mut self.values,
		}
	}
}

/// Where a `use` tree currently points while it is being declared.
#[derive(Debug, Clone, Copy)]
enum UseAnchor {
	Start,
	/// Inside `crate::`, `self::` or `super::`; the value indexes `modules`.
	Module(usize),
	/// Past anything the resolver tracks.
	Opaque,
}

#[derive(Default)]
struct Resolver {
	table: SymbolTable,
	scopes: Vec<Scope>,
	/// Indices into `scopes` of the enclosing module scopes, outermost first.
	modules: Vec<usize>,
	errors: Vec<String>,
}

impl Resolver {
	fn enter_module(&mut self) {
		self.modules.push(self.scopes.len());
		self.scopes.push(Scope {
			kind: ScopeKind::Module { glob_parent: false },
			..Scope::default()
		});
	}

	fn exit_module(&mut self) {
		self.modules.pop();
		self.scopes.pop();
	}

	fn enter_block(&mut self) {
		self.scopes.push(Scope::default());
	}

	fn exit_block(&mut self) {
		self.scopes.pop();
	}

	fn define(&mut self, ident: &Ident, kind: SymbolKind) -> SymbolId {
		let name = ident.to_string();
		let id = self.table.push(Symbol {
			name: name.clone(),
			kind,
			top_level: self.scopes.len() == 1,
			definition: Site::of(ident),
			uses: Vec::new(),
		});
		self.bind(&name, id, kind.namespaces());
		id
	}

	/// Make `name` denote `id` in the innermost scope. Module scopes reject a
	/// second, different definition of the same name.
	fn bind(&mut self, name: &str, id: SymbolId, namespaces: &[Namespace]) {
		let Some(scope) = self.scopes.last_mut() else {
			return;
		};
		let is_module = matches!(scope.kind, ScopeKind::Module { .. });
		let mut duplicate = false;
		for namespace in namespaces {
			let names = scope.names_mut(*namespace);
			if let Some(existing) = names.insert(name.to_string(), id) {
				duplicate |= is_module && existing != id;
			}
		}
		if duplicate {
			self.errors
				.push(format!("the name `{name}` is defined multiple times"));
		}
	}

	fn record_use(&mut self, ident: &Ident, id: SymbolId) {
		self.table.record_use(Site::of(ident), id);
	}

	fn lookup(&self, name: &str, namespace: Namespace) -> Option<SymbolId> {
		let mut modules_only = false;
		for scope in self.scopes.iter().rev() {
			let module = match scope.kind {
				ScopeKind::Module { glob_parent } => Some(glob_parent),
				ScopeKind::Block => None,
			};
			if modules_only && module.is_none() {
				continue;
			}
			if let Some(id) = scope.get(name, namespace) {
				return Some(id);
			}
			match module {
				Some(true) => modules_only = true,
				Some(false) => return None,
				None => {}
			}
		}
		None
	}

	fn lookup_in_module(&self, position: usize, name: &str, namespace: Namespace) -> Option<SymbolId> {
		let scope = self.modules.get(position)?;
		self.scopes[*scope].get(name, namespace)
	}

	/// Pre-declare the items of a module or block so that they are visible
	/// throughout it.
	fn declare_items(&mut self, items: &[Item]) {
		for item in items {
			self.declare_item(item);
		}
	}

	fn declare_item(&mut self, item: &Item) {
		match item {
			Item::Const(item) => {
				self.define(&item.ident, SymbolKind::Const);
			}
			Item::Static(item) => {
				self.define(&item.ident, SymbolKind::Static);
			}
			Item::Fn(item) => {
				self.define(&item.sig.ident, SymbolKind::Function);
			}
			Item::Struct(item) => {
				let kind = match item.fields {
					Fields::Named(_) => SymbolKind::Struct,
					Fields::Unnamed(_) => SymbolKind::TupleStruct,
					Fields::Unit => SymbolKind::UnitStruct,
				};
				self.define(&item.ident, kind);
			}
			Item::Enum(item) => {
				self.define(&item.ident, SymbolKind::Enum);
			}
			Item::Union(item) => {
				self.define(&item.ident, SymbolKind::Union);
			}
			Item::Type(item) => {
				self.define(&item.ident, SymbolKind::TypeAlias);
			}
			Item::Trait(item) => {
				self.define(&item.ident, SymbolKind::Trait);
			}
			Item::TraitAlias(item) => {
				self.define(&item.ident, SymbolKind::Trait);
			}
			Item::Mod(item) => {
				self.define(&item.ident, SymbolKind::Module);
			}
			Item::Use(item) => self.declare_use(&item.tree, UseAnchor::Start),
			_ => {}
		}
	}

	fn declare_use(&mut self, tree: &UseTree, anchor: UseAnchor) {
		let current = self.modules.len() - 1;
		match tree {
			UseTree::Path(path) => {
				let name = path.ident.to_string();
				let next = match (anchor, name.as_str()) {
					(UseAnchor::Start, "crate") => UseAnchor::Module(0),
					(UseAnchor::Start, "self") => UseAnchor::Module(current),
					(UseAnchor::Start, "super") => {
						current
							.checked_sub(1)
							.map_or(UseAnchor::Opaque, UseAnchor::Module)
					}
					(UseAnchor::Module(position), "super") => {
						position
							.checked_sub(1)
							.map_or(UseAnchor::Opaque, UseAnchor::Module)
					}
					(UseAnchor::Module(position), _) => {
						if let Some(id) = self.lookup_in_module(position, &name, Namespace::Type) {
							self.record_use(&path.ident, id);
						}
						UseAnchor::Opaque
					}
					_ => UseAnchor::Opaque,
				};
				self.declare_use(&path.tree, next);
			}
			UseTree::Name(leaf) => {
				if leaf.ident == "self" {
					return;
				}
				let name = leaf.ident.to_string();
				match self.import_target(anchor, &name) {
					Some(id) => {
						self.record_use(&leaf.ident, id);
						self.table.aliases.insert(
							Site::of(&leaf.ident),
							Alias {
								kind: AliasKind::Import,
								target: id,
							},
						);
						let namespaces = self.table.get(id).kind.namespaces();
						self.bind(&name, id, namespaces);
					}
					None => {
						self.define(&leaf.ident, SymbolKind::Import);
					}
				}
			}
			UseTree::Rename(rename) => {
				if let Some(id) = self.import_target(anchor, &rename.ident.to_string()) {
					self.record_use(&rename.ident, id);
				}
				if rename.rename != "_" {
					self.define(&rename.rename, SymbolKind::Import);
				}
			}
			UseTree::Glob(_) => {
				if let UseAnchor::Module(position) = anchor {
					if position < current {
						let scope = self.modules[current];
						self.scopes[scope].kind = ScopeKind::Module { glob_parent: true };
					}
				}
			}
			UseTree::Group(group) => {
				for tree in &group.items {
					self.declare_use(tree, anchor);
				}
			}
		}
	}

	fn import_target(&self, anchor: UseAnchor, name: &str) -> Option<SymbolId> {
		let UseAnchor::Module(position) = anchor else {
			return None;
		};
		self.lookup_in_module(position, name, Namespace::Type)
			.or_else(|| self.lookup_in_module(position, name, Namespace::Value))
	}

	/// Record the values a format string captures by name. Names passed as
	/// `name = value` arguments are not captures.
	fn resolve_captures(&mut self, format: &LitStr, args: &[Expr]) {
		let named: Vec<String> = args
			.iter()
			.filter_map(|arg| {
				match arg {
					Expr::Assign(assign) => {
						match assign.left.as_ref() {
							Expr::Path(path) => path.path.get_ident().map(ToString::to_string),
							_ => None,
						}
					}
					_ => None,
				}
			})
			.collect();

		for capture in format_captures(&format.token()) {
			if named.contains(&capture.name) {
				continue;
			}
			let Some(id) = self.lookup(&capture.name, Namespace::Value) else {
				continue;
			};
			self.table.record_use(capture.site, id);
			self.table.aliases.insert(
				capture.site,
				Alias {
					kind: AliasKind::FormatArgument,
					target: id,
				},
			);
		}
	}

	/// Resolve the first meaningful segment of `path`. Later segments name
	/// associated items or variants, which are never renamed.
	fn resolve_path(&mut self, path: &syn::Path, namespace: Namespace) {
		if path.leading_colon.is_some() {
			return;
		}
		let segments: Vec<_> = path.segments.iter().collect();
		let Some(first) = segments.first() else {
			return;
		};
		let last = segments.len() - 1;
		let first_name = first.ident.to_string();
		let current = self.modules.len() - 1;

		let mut position = match first_name.as_str() {
			"crate" => Some(0),
			"self" => Some(current),
			"super" => current.checked_sub(1),
			"Self" => return,
			_ => {
				let namespace = if last == 0 { namespace } else { Namespace::Type };
				if let Some(id) = self.lookup(&first_name, namespace) {
					self.record_use(&first.ident, id);
				}
				return;
			}
		};

		for (index, segment) in segments.iter().enumerate().skip(1) {
			let Some(module) = position else {
				return;
			};
			if segment.ident == "super" {
				position = module.checked_sub(1);
				continue;
			}
			let namespace = if index == last { namespace } else { Namespace::Type };
			if let Some(id) = self.lookup_in_module(module, &segment.ident.to_string(), namespace) {
				self.record_use(&segment.ident, id);
			}
			return;
		}
	}
}

/// Macros taking a format string, with the argument position it sits at.
const FORMAT_MACROS: [(&str, usize); 21] = [
	("format", 0),
	("format_args", 0),
	("print", 0),
	("println", 0),
	("eprint", 0),
	("eprintln", 0),
	("panic", 0),
	("unreachable", 0),
	("todo", 0),
	("unimplemented", 0),
	("anyhow", 0),
	("bail", 0),
	("write", 1),
	("writeln", 1),
	("assert", 1),
	("debug_assert", 1),
	("ensure", 1),
	("assert_eq", 2),
	("assert_ne", 2),
	("debug_assert_eq", 2),
	("debug_assert_ne", 2),
];

/// Logging macros whose message is the first string literal, after any
/// fields.
const LOG_MACROS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// The format string of a `format!`-like macro call, if `args` has one.
fn format_string<'a>(node: &Macro, args: &'a [Expr]) -> Option<&'a LitStr> {
	let name = node.path.segments.last()?.ident.to_string();
	let string = |expr: &'a Expr| {
		match expr {
			Expr::Lit(ExprLit {
				lit: Lit::Str(lit), ..
			}) => Some(lit),
			_ => None,
		}
	};

	if LOG_MACROS.contains(&name.as_str()) {
		return args.iter().find_map(string);
	}
	let (_, position) = FORMAT_MACROS.iter().find(|(macro_name, _)| *macro_name == name)?;
	args.get(*position).and_then(string)
}

/// An identifier a format string captures from the surrounding scope, such
/// as `limit` in `"{limit}"` or `width` in `"{:>width$}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
	pub name: String,
	/// Where the name sits in the template source, inside the literal.
	pub site: Site,
	/// Byte range of the name within the literal's text.
	pub range: std::ops::Range<usize>,
}

/// Every inline capture in a string literal used as a format string. Byte,
/// C and non-string literals capture nothing.
pub fn format_captures(literal: &Literal) -> Vec<Capture> {
	let text = literal.to_string();
	let chars: Vec<(usize, char)> = text.char_indices().collect();
	let Some((body_start, body_end)) = string_body(&text, chars.len()) else {
		return Vec::new();
	};

	let start = literal.span().start();
	let mut sites = Vec::with_capacity(chars.len());
	let (mut line, mut column) = (start.line, start.column);
	for (_, c) in &chars {
		sites.push(Site { line, column });
		if *c == '\n' {
			line += 1;
			column = 0;
		} else {
			column += 1;
		}
	}

	let mut captures = Vec::new();
	let mut push = |from: usize, to: usize| {
		let name: String = chars[from..to].iter().map(|(_, c)| c).collect();
		if is_capture_name(&name) {
			let end = chars.get(to).map_or(text.len(), |(offset, _)| *offset);
			captures.push(Capture {
				name,
				site: sites[from],
				range: chars[from].0..end,
			});
		}
	};

	let mut index = body_start;
	while index < body_end {
		if chars[index].1 != '{' {
			index += 1;
			continue;
		}
		if chars.get(index + 1).is_some_and(|(_, c)| *c == '{') {
			index += 2;
			continue;
		}
		let Some(close) = (index + 1..body_end).find(|position| chars[*position].1 == '}') else {
			break;
		};
		let colon = (index + 1..close)
			.find(|position| chars[*position].1 == ':')
			.unwrap_or(close);
		push(index + 1, colon);

		// `width$` and `precision$` in the format spec capture too.
		let mut position = colon + 1;
		while position < close {
			if !is_identifier_start(chars[position].1) {
				position += 1;
				continue;
			}
			let end = (position..close)
				.find(|end| !is_identifier_continue(chars[*end].1))
				.unwrap_or(close);
			if end < close && chars[end].1 == '$' {
				push(position, end);
			}
			position = end;
		}
		index = close + 1;
	}

	captures
}

/// Char indices of the first and one past the last character between the
/// quotes of a plain or raw string literal.
fn string_body(text: &str, len: usize) -> Option<(usize, usize)> {
	if text.starts_with('"') {
		return (len >= 2).then_some((1, len - 1));
	}
	let raw = text.strip_prefix('r')?;
	let hashes = raw.chars().take_while(|c| *c == '#').count();
	if !raw[hashes..].starts_with('"') {
		return None;
	}
	let start = hashes + 2;
	let end = len.checked_sub(hashes + 1)?;
	(start <= end).then_some((start, end))
}

fn is_identifier_start(c: char) -> bool {
	c.is_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

fn is_capture_name(name: &str) -> bool {
	name != "_" && name.starts_with(is_identifier_start) && name.chars().all(is_identifier_continue)
}

/// Macro bodies that read as a list of expressions separated by `,` or `;`,
/// which covers `println!`, `assert_eq!`, `vec![x; n]` and friends.
pub(crate) fn parse_macro_args(input: ParseStream) -> syn::Result<Vec<Expr>> {
	let mut exprs = Vec::new();
	while !input.is_empty() {
		exprs.push(input.parse::<Expr>()?);
		if input.is_empty() {
			break;
		}
		if input.peek(Token![,]) {
			input.parse::<Token![,]>()?;
		} else {
			input.parse::<Token![;]>()?;
		}
	}
	Ok(exprs)
}

impl<'ast> Visit<'ast> for Resolver {
	fn visit_attribute(&mut self, _node: &'ast Attribute) {}

	fn visit_item_use(&mut self, _node: &'ast ItemUse) {}

	fn visit_item_mod(&mut self, node: &'ast ItemMod) {
		let Some((_, items)) = &node.content else {
			return;
		};
		self.enter_module();
		self.declare_items(items);
		for item in items {
			self.visit_item(item);
		}
		self.exit_module();
	}

	fn visit_item_fn(&mut self, node: &'ast ItemFn) {
		self.enter_block();
		visit::visit_item_fn(self, node);
		self.exit_block();
	}

	fn visit_impl_item_fn(&mut self, node: &'ast ImplItemFn) {
		self.enter_block();
		visit::visit_impl_item_fn(self, node);
		self.exit_block();
	}

	fn visit_trait_item_fn(&mut self, node: &'ast TraitItemFn) {
		self.enter_block();
		visit::visit_trait_item_fn(self, node);
		self.exit_block();
	}

	fn visit_item_impl(&mut self, node: &'ast ItemImpl) {
		self.enter_block();
		visit::visit_item_impl(self, node);
		self.exit_block();
	}

	fn visit_item_struct(&mut self, node: &'ast ItemStruct) {
		self.enter_block();
		visit::visit_item_struct(self, node);
		self.exit_block();
	}

	fn visit_item_enum(&mut self, node: &'ast ItemEnum) {
		self.enter_block();
		visit::visit_item_enum(self, node);
		self.exit_block();
	}

	fn visit_item_union(&mut self, node: &'ast ItemUnion) {
		self.enter_block();
		visit::visit_item_union(self, node);
		self.exit_block();
	}

	fn visit_item_type(&mut self, node: &'ast ItemType) {
		self.enter_block();
		visit::visit_item_type(self, node);
		self.exit_block();
	}

	fn visit_item_trait(&mut self, node: &'ast ItemTrait) {
		self.enter_block();
		visit::visit_item_trait(self, node);
		self.exit_block();
	}

	fn visit_generics(&mut self, node: &'ast Generics) {
		for param in &node.params {
			match param {
				GenericParam::Type(param) => {
					self.define(&param.ident, SymbolKind::TypeParam);
				}
				GenericParam::Const(param) => {
					self.define(&param.ident, SymbolKind::ConstParam);
				}
				GenericParam::Lifetime(_) => {}
			}
		}
		visit::visit_generics(self, node);
	}

	fn visit_block(&mut self, node: &'ast Block) {
		self.enter_block();
		for stmt in &node.stmts {
			if let Stmt::Item(item) = stmt {
				self.declare_item(item);
			}
		}
		for stmt in &node.stmts {
			self.visit_stmt(stmt);
		}
		self.exit_block();
	}

	fn visit_local(&mut self, node: &'ast Local) {
		if let Some(init) = &node.init {
			self.visit_expr(&init.expr);
			if let Some((_, diverge)) = &init.diverge {
				self.visit_expr(diverge);
			}
		}
		self.visit_pat(&node.pat);
	}

	fn visit_expr_closure(&mut self, node: &'ast ExprClosure) {
		self.enter_block();
		for input in &node.inputs {
			self.visit_pat(input);
		}
		self.visit_return_type(&node.output);
		self.visit_expr(&node.body);
		self.exit_block();
	}

	fn visit_arm(&mut self, node: &'ast Arm) {
		self.enter_block();
		self.visit_pat(&node.pat);
		if let Some((_, guard)) = &node.guard {
			self.visit_expr(guard);
		}
		self.visit_expr(&node.body);
		self.exit_block();
	}

	fn visit_expr_for_loop(&mut self, node: &'ast ExprForLoop) {
		self.visit_expr(&node.expr);
		self.enter_block();
		self.visit_pat(&node.pat);
		self.visit_block(&node.body);
		self.exit_block();
	}

	fn visit_expr_if(&mut self, node: &'ast ExprIf) {
		self.enter_block();
		self.visit_expr(&node.cond);
		self.visit_block(&node.then_branch);
		self.exit_block();
		if let Some((_, else_branch)) = &node.else_branch {
			self.visit_expr(else_branch);
		}
	}

	fn visit_expr_while(&mut self, node: &'ast ExprWhile) {
		self.enter_block();
		self.visit_expr(&node.cond);
		self.visit_block(&node.body);
		self.exit_block();
	}

	fn visit_expr_let(&mut self, node: &'ast ExprLet) {
		self.visit_expr(&node.expr);
		self.visit_pat(&node.pat);
	}

	fn visit_pat_ident(&mut self, node: &'ast PatIdent) {
		if node.by_ref.is_none() && node.mutability.is_none() && node.subpat.is_none() {
			if let Some(id) = self.lookup(&node.ident.to_string(), Namespace::Value) {
				if self.table.get(id).kind.is_pattern_constant() {
					self.record_use(&node.ident, id);
					return;
				}
			}
		}
		self.define(&node.ident, SymbolKind::Local);
		if let Some((_, subpat)) = &node.subpat {
			self.visit_pat(subpat);
		}
	}

	fn visit_pat_struct(&mut self, node: &'ast PatStruct) {
		if node.qself.is_none() {
			self.resolve_path(&node.path, Namespace::Type);
		}
		visit::visit_pat_struct(self, node);
	}

	fn visit_pat_tuple_struct(&mut self, node: &'ast PatTupleStruct) {
		if node.qself.is_none() {
			self.resolve_path(&node.path, Namespace::Value);
		}
		visit::visit_pat_tuple_struct(self, node);
	}

	fn visit_expr_path(&mut self, node: &'ast ExprPath) {
		if node.qself.is_none() {
			self.resolve_path(&node.path, Namespace::Value);
		}
		visit::visit_expr_path(self, node);
	}

	fn visit_type_path(&mut self, node: &'ast TypePath) {
		if node.qself.is_none() {
			self.resolve_path(&node.path, Namespace::Type);
		}
		visit::visit_type_path(self, node);
	}

	fn visit_expr_struct(&mut self, node: &'ast ExprStruct) {
		if let Some(qself) = &node.qself {
			self.visit_qself(qself);
		} else {
			self.resolve_path(&node.path, Namespace::Type);
		}
		self.visit_path(&node.path);

		for field in &node.fields {
			self.visit_expr(&field.expr);
			let Member::Named(member) = &field.member else {
				continue;
			};
			if field.colon_token.is_some() {
				continue;
			}
			let site = Site::of(member);
			if let Some(id) = self.table.use_at(site) {
				if self.table.get(id).top_level {
					self.table.aliases.insert(
						site,
						Alias {
							kind: AliasKind::FieldShorthand,
							target: id,
						},
					);
				}
			}
		}

		if let Some(rest) = &node.rest {
			self.visit_expr(rest);
		}
	}

	/// `Buf<N>` parses `N` as a type; fall back to the value namespace so
	/// const arguments resolve.
	fn visit_generic_argument(&mut self, node: &'ast GenericArgument) {
		if let GenericArgument::Type(Type::Path(path)) = node {
			if path.qself.is_none() {
				if let Some(ident) = path.path.get_ident() {
					let name = ident.to_string();
					if self.lookup(&name, Namespace::Type).is_none() {
						if let Some(id) = self.lookup(&name, Namespace::Value) {
							self.record_use(ident, id);
							return;
						}
					}
				}
			}
		}
		visit::visit_generic_argument(self, node);
	}

	fn visit_macro(&mut self, node: &'ast Macro) {
		if let Ok(exprs) = node.parse_body_with(parse_macro_args) {
			for expr in &exprs {
				self.visit_expr(expr);
			}
			if let Some(format) = format_string(node, &exprs) {
				self.resolve_captures(format, &exprs);
			}
		}
	}
}
