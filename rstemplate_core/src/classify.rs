use std::collections::HashMap;
use std::collections::HashSet;

use syn::Attribute;
use syn::FnArg;
use syn::Ident;
use syn::Item;
use syn::ItemFn;
use syn::ItemImpl;
use syn::ItemMacro;
use syn::ItemMod;
use syn::ItemUse;
use syn::Type;
use syn::UseTree;
use syn::Visibility;
use syn::spanned::Spanned;

use crate::Bindings;
use crate::Directive;
use crate::InstantiationRequest;
use crate::Module;
use crate::Namespace;
use crate::Site;
use crate::SymbolId;
use crate::SymbolTable;
use crate::TemplateError;
use crate::TemplateResult;
use crate::directive::leading_comments;
use crate::mangle::mangle;

/// Free functions that keep their names in every instantiation.
pub const PASS_THROUGH_FUNCTIONS: [&str; 2] = ["init", "main"];

/// Crates whose types mark a function parameter as test-only.
const TESTING_ORIGINS: [&str; 3] = ["test", "proptest", "quickcheck"];

/// Crates whose imports are only needed by test code.
const TEST_IMPORT_ROOTS: [&str; 7] = [
	"test",
	"proptest",
	"quickcheck",
	"rstest",
	"insta",
	"pretty_assertions",
	"similar_asserts",
];

/// The closed set of top-level declaration shapes a template may contain.
#[derive(Debug, Clone, Copy)]
pub enum Declaration<'a> {
	Import(&'a ItemUse),
	/// `const` or `static`.
	Value(&'a Ident),
	/// `struct`, `enum`, `union`, `type` or `trait`.
	Type(&'a Ident),
	Function(&'a ItemFn),
	/// Receiver methods in an `impl` block.
	Methods(&'a ItemImpl),
	Module(&'a ItemMod),
	Macro(&'a ItemMacro),
}

impl<'a> Declaration<'a> {
	pub fn of(item: &'a Item) -> TemplateResult<Self> {
		let declaration = match item {
			Item::Use(item) => Self::Import(item),
			Item::Const(item) => Self::Value(&item.ident),
			Item::Static(item) => Self::Value(&item.ident),
			Item::Struct(item) => Self::Type(&item.ident),
			Item::Enum(item) => Self::Type(&item.ident),
			Item::Union(item) => Self::Type(&item.ident),
			Item::Type(item) => Self::Type(&item.ident),
			Item::Trait(item) => Self::Type(&item.ident),
			Item::Fn(item) => Self::Function(item),
			Item::Impl(item) => Self::Methods(item),
			Item::Mod(item) => Self::Module(item),
			Item::Macro(item) => Self::Macro(item),
			Item::ExternCrate(_) => return Err(unsupported("extern crate", item)),
			Item::ForeignMod(_) => return Err(unsupported("extern block", item)),
			Item::TraitAlias(_) => return Err(unsupported("trait alias", item)),
			Item::Verbatim(_) => return Err(unsupported("unparsed item", item)),
			_ => return Err(unsupported("unknown item", item)),
		};

		Ok(declaration)
	}

	/// The identifier this declaration may rename or eliminate.
	pub fn symbol_ident(&self) -> Option<&'a Ident> {
		match self {
			Self::Value(ident) | Self::Type(ident) => Some(ident),
			Self::Function(item) => Some(&item.sig.ident),
			Self::Import(_) | Self::Methods(_) | Self::Module(_) | Self::Macro(_) => None,
		}
	}
}

fn unsupported(kind: &str, item: &Item) -> TemplateError {
	TemplateError::UnsupportedDeclaration {
		kind: kind.to_string(),
		line: item.span().start().line,
	}
}

/// What a top-level symbol becomes in the instantiated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
	/// A placeholder bound to an actual argument; its declaration is removed.
	Bound { formal: String, actual: String },
	/// A kept symbol under its mangled name.
	Renamed(String),
}

#[derive(Debug, Clone, Default)]
pub struct SubstitutionMap {
	entries: HashMap<SymbolId, Replacement>,
}

impl SubstitutionMap {
	pub fn get(&self, id: SymbolId) -> Option<&Replacement> {
		self.entries.get(&id)
	}

	pub fn insert(&mut self, id: SymbolId, replacement: Replacement) {
		self.entries.insert(id, replacement);
	}

	pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Replacement)> {
		self.entries.iter().map(|(id, replacement)| (*id, replacement))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// The result of walking the template's top-level declarations once.
#[derive(Debug, Clone, Default)]
pub struct Classification {
	pub substitutions: SubstitutionMap,
	/// Definition sites of placeholder declarations to delete.
	pub eliminated: HashSet<Site>,
	/// Definition sites of `// template format` stubs.
	pub format_stubs: HashSet<Site>,
	/// Whether any top-level test function or `#[cfg(test)]` item exists.
	pub has_test_code: bool,
}

impl Classification {
	/// Whether `item` is a placeholder declaration that must not be emitted.
	pub fn eliminates(&self, item: &Item) -> bool {
		Declaration::of(item)
			.ok()
			.and_then(|declaration| declaration.symbol_ident())
			.is_some_and(|ident| self.eliminated.contains(&Site::of(ident)))
	}
}

/// Decide, for every top-level declaration of `module`, whether it is
/// eliminated, renamed or passed through.
pub fn classify(
	module: &Module,
	directive: &Directive,
	bindings: &Bindings,
	request: &InstantiationRequest,
) -> TemplateResult<Classification> {
	let mut classification = Classification::default();
	let mut defines_template = false;
	let public = request.is_public();

	for item in &module.syntax.items {
		let declaration = Declaration::of(item)?;
		classification.has_test_code |= is_test_code(item);
		if let Some(site) = format_stub_site(module, item) {
			classification.format_stubs.insert(site);
		}

		let Some(ident) = declaration.symbol_ident() else {
			continue;
		};
		let name = ident.to_string();
		if matches!(declaration, Declaration::Function(_)) && PASS_THROUGH_FUNCTIONS.contains(&name.as_str()) {
			continue;
		}
		defines_template |= name == directive.name;

		let site = Site::of(ident);
		let Some(id) = module.symbols.definition_at(site) else {
			continue;
		};

		if let Some(actual) = bindings.get(&name) {
			tracing::debug!(formal = %name, actual, "eliminating placeholder declaration");
			classification.eliminated.insert(site);
			classification.substitutions.insert(
				id,
				Replacement::Bound {
					formal: name,
					actual: actual.to_string(),
				},
			);
		} else {
			let renamed = mangle(&name, &directive.name, &request.name, public);
			tracing::debug!(from = %name, to = %renamed, "renaming top-level symbol");
			classification
				.substitutions
				.insert(id, Replacement::Renamed(renamed));
		}
	}

	if !defines_template {
		return Err(TemplateError::MissingTemplateDefinition(directive.name.clone()));
	}
	check_collisions(&module.symbols, &classification)?;

	Ok(classification)
}

/// Two surviving top-level symbols must not end up with the same name in
/// the same namespace.
fn check_collisions(symbols: &SymbolTable, classification: &Classification) -> TemplateResult<()> {
	let mut seen: HashMap<(Namespace, String), SymbolId> = HashMap::new();
	let mut ids: Vec<_> = symbols.top_level().map(|(id, _)| id).collect();
	ids.sort();

	for id in ids {
		let symbol = symbols.get(id);
		let final_name = match classification.substitutions.get(id) {
			Some(Replacement::Bound { .. }) => continue,
			Some(Replacement::Renamed(name)) => name.clone(),
			None => symbol.name.clone(),
		};

		for namespace in symbol.kind.namespaces() {
			let key = (*namespace, final_name.clone());
			if let Some(existing) = seen.get(&key) {
				if *existing != id {
					return Err(TemplateError::NameCollision {
						name: final_name,
						first: symbols.get(*existing).name.clone(),
						second: symbol.name.clone(),
					});
				}
			}
			seen.insert(key, id);
		}
	}

	Ok(())
}

/// A `const` or `static` preceded by a `// template format` comment.
fn format_stub_site(module: &Module, item: &Item) -> Option<Site> {
	let (keyword_line, ident) = match item {
		Item::Static(item) => (item.static_token.span.start().line, &item.ident),
		Item::Const(item) => (item.const_token.span.start().line, &item.ident),
		_ => return None,
	};
	let start_line = item.span().start().line.min(keyword_line);

	leading_comments(&module.comments, start_line, keyword_line)
		.iter()
		.any(|comment| comment.is_format_directive())
		.then(|| Site::of(ident))
}

/// Whether a function only exists for tests: a `#[test]`-like attribute,
/// `#[cfg(test)]`, or parameters that all borrow a testing harness type such
/// as `&mut test::Bencher`.
pub fn is_test_fn(function: &ItemFn) -> bool {
	let inputs = &function.sig.inputs;
	function.attrs.iter().any(is_test_attribute)
		|| (!inputs.is_empty()
			&& inputs.iter().all(|input| {
				match input {
					FnArg::Typed(pat) => is_testing_reference(&pat.ty),
					FnArg::Receiver(_) => false,
				}
			}))
}

/// A test function or any `#[cfg(test)]` item, such as `mod tests`.
/// Test-only imports alone don't count.
pub fn is_test_code(item: &Item) -> bool {
	match item {
		Item::Use(_) => false,
		Item::Fn(function) => is_test_fn(function),
		_ => item_attrs(item).iter().any(is_cfg_test),
	}
}

fn is_test_attribute(attr: &Attribute) -> bool {
	attr.path()
		.segments
		.last()
		.is_some_and(|segment| segment.ident == "test" || segment.ident == "rstest")
		|| is_cfg_test(attr)
}

fn is_cfg_test(attr: &Attribute) -> bool {
	attr.path().is_ident("cfg") && attr.parse_args::<Ident>().is_ok_and(|ident| ident == "test")
}

fn is_testing_reference(ty: &Type) -> bool {
	let Type::Reference(reference) = ty else {
		return false;
	};
	let Type::Path(path) = reference.elem.as_ref() else {
		return false;
	};
	path.qself.is_none()
		&& path.path.segments.len() > 1
		&& path
			.path
			.segments
			.first()
			.is_some_and(|segment| TESTING_ORIGINS.iter().any(|origin| segment.ident == origin))
}

fn use_root(tree: &UseTree) -> Option<&Ident> {
	match tree {
		UseTree::Path(path) => Some(&path.ident),
		UseTree::Name(name) => Some(&name.ident),
		UseTree::Rename(rename) => Some(&rename.ident),
		UseTree::Glob(_) | UseTree::Group(_) => None,
	}
}

fn is_test_use_tree(tree: &UseTree) -> bool {
	use_root(tree).is_some_and(|root| TEST_IMPORT_ROOTS.iter().any(|name| root == name))
}

/// Narrow top-level `pub` items to `pub(crate)`. Used for unexported
/// instantiations, whose items must not leak out of the crate.
pub fn restrict_visibility(items: &mut [Item]) {
	for item in items {
		if let Some(vis) = item_vis_mut(item) {
			if matches!(vis, Visibility::Public(_)) {
				*vis = syn::parse_quote!(pub(crate));
			}
		}
	}
}

fn item_vis_mut(item: &mut Item) -> Option<&mut Visibility> {
	match item {
		Item::Const(item) => Some(&mut item.vis),
		Item::Enum(item) => Some(&mut item.vis),
		Item::ExternCrate(item) => Some(&mut item.vis),
		Item::Fn(item) => Some(&mut item.vis),
		Item::Mod(item) => Some(&mut item.vis),
		Item::Static(item) => Some(&mut item.vis),
		Item::Struct(item) => Some(&mut item.vis),
		Item::Trait(item) => Some(&mut item.vis),
		Item::TraitAlias(item) => Some(&mut item.vis),
		Item::Type(item) => Some(&mut item.vis),
		Item::Union(item) => Some(&mut item.vis),
		Item::Use(item) => Some(&mut item.vis),
		_ => None,
	}
}

fn item_attrs(item: &Item) -> &[Attribute] {
	match item {
		Item::Const(item) => &item.attrs,
		Item::Enum(item) => &item.attrs,
		Item::ExternCrate(item) => &item.attrs,
		Item::Fn(item) => &item.attrs,
		Item::ForeignMod(item) => &item.attrs,
		Item::Impl(item) => &item.attrs,
		Item::Macro(item) => &item.attrs,
		Item::Mod(item) => &item.attrs,
		Item::Static(item) => &item.attrs,
		Item::Struct(item) => &item.attrs,
		Item::Trait(item) => &item.attrs,
		Item::TraitAlias(item) => &item.attrs,
		Item::Type(item) => &item.attrs,
		Item::Union(item) => &item.attrs,
		Item::Use(item) => &item.attrs,
		_ => &[],
	}
}

/// Items of a unit split into regular code and test-only code.
#[derive(Debug, Clone, Default)]
pub struct TestPartition {
	pub primary: Vec<Item>,
	pub tests: Vec<Item>,
}

/// Route test-only functions, imports and `#[cfg(test)]` items into
/// `tests`. A `use {a, b}` group mixing test and regular entries is split.
pub fn partition_tests(items: Vec<Item>) -> TestPartition {
	let mut partition = TestPartition::default();

	for item in items {
		if item_attrs(&item).iter().any(is_cfg_test) {
			partition.tests.push(item);
			continue;
		}

		match item {
			Item::Fn(function) if is_test_fn(&function) => partition.tests.push(Item::Fn(function)),
			Item::Use(import) => {
				let (primary, tests) = split_use(import);
				partition.primary.extend(primary.map(Item::Use));
				partition.tests.extend(tests.map(Item::Use));
			}
			item => partition.primary.push(item),
		}
	}

	partition
}

fn split_use(import: ItemUse) -> (Option<ItemUse>, Option<ItemUse>) {
	let UseTree::Group(group) = &import.tree else {
		return if is_test_use_tree(&import.tree) {
			(None, Some(import))
		} else {
			(Some(import), None)
		};
	};

	let (tests, primary): (Vec<_>, Vec<_>) = group.items.iter().cloned().partition(is_test_use_tree);
	let with_entries = |entries: Vec<UseTree>| {
		if entries.is_empty() {
			return None;
		}
		let mut group = group.clone();
		group.items = entries.into_iter().collect();
		let mut import = import.clone();
		import.tree = UseTree::Group(group);
		Some(import)
	};

	(with_entries(primary), with_entries(tests))
}
