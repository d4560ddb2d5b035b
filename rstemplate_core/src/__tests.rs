use std::fs;
use std::path::Path;
use std::path::PathBuf;

use proc_macro2::TokenStream;
use proc_macro2::TokenTree;
use rstest::rstest;
use similar_asserts::assert_eq;
use syn::Item;
use syn::ItemFn;
use syn::UseTree;
use syn::Visibility;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::format::catalog;

fn tempdir() -> tempfile::TempDir {
	tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"))
}

fn identifiers(tokens: TokenStream, found: &mut Vec<String>) {
	for tree in tokens {
		match tree {
			TokenTree::Ident(ident) => found.push(ident.to_string()),
			TokenTree::Group(group) => identifiers(group.stream(), found),
			_ => {}
		}
	}
}

fn top_level_names(content: &str) -> Vec<String> {
	let file = syn::parse_file(content).unwrap_or_else(|e| panic!("output doesn't parse: {e}"));
	file.items
		.iter()
		.filter_map(|item| {
			match item {
				Item::Const(item) => Some(item.ident.to_string()),
				Item::Static(item) => Some(item.ident.to_string()),
				Item::Struct(item) => Some(item.ident.to_string()),
				Item::Enum(item) => Some(item.ident.to_string()),
				Item::Type(item) => Some(item.ident.to_string()),
				Item::Fn(item) => Some(item.sig.ident.to_string()),
				_ => None,
			}
		})
		.collect()
}

#[rstest]
#[case::type_argument("mySet(String)", "mySet", vec!["String"])]
#[case::several_arguments("Ring(u16, 8)", "Ring", vec!["u16", "8"])]
#[case::generic_type("bytes(Vec<u8>)", "bytes", vec!["Vec < u8 >"])]
#[case::expression("sized(2 * 4)", "sized", vec!["2 * 4"])]
#[case::no_arguments("empty()", "empty", vec![])]
fn parse_instantiation_request(
	#[case] text: &str,
	#[case] name: &str,
	#[case] args: Vec<&str>,
) -> TemplateResult<()> {
	let request = InstantiationRequest::parse(text)?;
	assert_eq!(request.name, name);
	assert_eq!(request.args, args);

	Ok(())
}

#[rstest]
#[case::missing_parens("mySet")]
#[case::unclosed("mySet(String")]
#[case::trailing_tokens("mySet(String) extra")]
fn reject_malformed_request(#[case] text: &str) {
	let result = InstantiationRequest::parse(text);
	assert!(matches!(result, Err(TemplateError::InvalidCall { .. })));
}

#[rstest]
#[case("mySet", false, "my_set")]
#[case("MySet", true, "my_set")]
#[case("IntList", true, "int_list")]
#[case("HTTPServer", true, "http_server")]
#[case("parseV2", false, "parse_v2")]
fn request_visibility_and_file_stem(#[case] name: &str, #[case] public: bool, #[case] stem: &str) {
	let request = InstantiationRequest::new(name, ["u8"]);
	assert_eq!(request.is_public(), public);
	assert_eq!(request.file_stem(), stem);
	assert_eq!(request.to_string(), format!("{name}(u8)"));
}

#[rstest]
#[case::template_name_prefix("Set", false, "mySet")]
#[case::template_name_inside("newSet", false, "newMySet")]
#[case::exported_name_lowered("NewSet", false, "newMySet")]
#[case::exported_instantiation("SetIter", true, "MySetIter")]
#[case::exported_keeps_case("newSet", true, "newMySet")]
#[case::helper_suffix("helper", false, "helperMySet")]
#[case::exported_helper_lowered("Helper", false, "helperMySet")]
#[case::exported_helper("Node", true, "NodeMySet")]
fn mangle_top_level_names(#[case] name: &str, #[case] public: bool, #[case] expected: &str) {
	let instantiation = if public { "MySet" } else { "mySet" };
	assert_eq!(mangle(name, "Set", instantiation, public), expected);
}

#[test]
#[traced_test]
fn mangle_logs_names_without_template_name() {
	assert_eq!(mangle("helper", "Set", "mySet", false), "helperMySet");
	assert!(logs_contain("doesn't contain template name"));
}

#[test]
fn scan_comments_skips_literals() {
	let source = "let url = \"http://example.com\"; // trailing\n/* block\n comment */\nlet c = '/'; // after char\nfn f<'a>(s: &'a str) {}\n// own line\n";
	let comments = scan_comments(source);
	let summary: Vec<_> = comments
		.iter()
		.map(|comment| (comment.line, comment.text.as_str(), comment.own_line))
		.collect();

	assert_eq!(
		summary,
		vec![
			(1, "// trailing", false),
			(2, "/* block\n comment */", true),
			(4, "// after char", false),
			(6, "// own line", true),
		]
	);
}

#[test]
fn scan_directive_with_formal_parameters() -> TemplateResult<()> {
	let comments = scan_comments(RING_TEMPLATE);
	let directive = scan_directive(Path::new("ring.rs"), &comments)?;

	assert_eq!(
		directive,
		Directive {
			name: "Ring".to_string(),
			formal_params: vec!["T".to_string(), "N".to_string()],
			line: 1,
		}
	);

	Ok(())
}

#[test]
fn scan_directive_rejects_non_identifier_parameter() {
	let comments = scan_comments("// template type Set(Vec<u8>)\n");
	let result = scan_directive(Path::new("set.rs"), &comments);
	assert!(matches!(result, Err(TemplateError::InvalidCall { .. })));
}

#[test]
fn missing_directive_is_fatal() {
	let result = render("type A = u8;\npub struct Set;\n", "mySet(String)");
	assert!(matches!(result, Err(TemplateError::MissingDirective(_))));
}

#[test]
fn duplicate_directive_is_fatal() {
	let source = "// template type Set(A)\n// template type Set(B)\ntype A = u8;\npub struct Set;\n";
	let result = render(source, "mySet(String)");
	assert!(matches!(
		result,
		Err(TemplateError::DuplicateDirective {
			first: 1,
			second: 2,
			..
		})
	));
}

#[rstest]
#[case::too_many("mySet(String, u8)", 2)]
#[case::too_few("mySet()", 0)]
fn arity_mismatch_is_fatal(#[case] text: &str, #[case] got: usize) {
	let result = render(SET_TEMPLATE, text);
	assert!(matches!(
		result,
		Err(TemplateError::Arity { expected: 1, got: actual, .. }) if actual == got
	));
}

#[test]
fn arity_mismatch_writes_nothing() -> TemplateResult<()> {
	let tmp = tempdir();
	let template_dir = tmp.path().join("template");
	fs::create_dir(&template_dir)?;
	fs::write(template_dir.join("set.rs"), SET_TEMPLATE)?;

	let result = instantiate(
		&template_dir,
		&request("mySet(String, u8)"),
		tmp.path(),
		&InstantiateOptions::default(),
	);
	assert!(result.is_err());
	assert!(!tmp.path().join("rstemplate_my_set.rs").exists());

	Ok(())
}

#[test]
fn missing_template_definition_is_fatal() {
	let source = "// template type Set(A)\ntype A = u8;\npub struct Other;\n";
	let result = render(source, "mySet(String)");
	assert!(matches!(
		result,
		Err(TemplateError::MissingTemplateDefinition(ref name)) if name == "Set"
	));
}

#[test]
fn unsupported_declaration_is_fatal() {
	let source = "// template type Set(A)\nextern crate alloc;\ntype A = u8;\npub struct Set;\n";
	let result = render(source, "mySet(String)");
	assert!(matches!(
		result,
		Err(TemplateError::UnsupportedDeclaration { line: 2, .. })
	));
}

#[rstest]
#[case::parse_error("// template type Set(A)\npub struct Set {\n")]
#[case::duplicate_definition("// template type Set(A)\ntype A = u8;\npub struct Set;\npub struct Set;\n")]
fn broken_template_is_fatal(#[case] source: &str) {
	let result = render(source, "mySet(String)");
	assert!(matches!(
		result,
		Err(TemplateError::Parse { .. } | TemplateError::Semantic { .. })
	));
}

#[test]
fn name_collision_is_fatal() {
	let source = "// template type Set(A)\ntype A = u8;\npub struct Set;\nfn helper() {}\nfn helperSet() {}\n";
	let result = render(source, "mySet(String)");
	assert!(matches!(
		result,
		Err(TemplateError::NameCollision { ref name, ref first, ref second })
			if name == "helperMySet" && first == "helper" && second == "helperSet"
	));
}

#[test]
fn argument_unusable_as_type_is_fatal() {
	let result = render(CELL_TEMPLATE, "sumCell(1 + 2)");
	assert!(matches!(
		result,
		Err(TemplateError::InvalidArgument { ref parameter, .. }) if parameter == "A"
	));
}

#[test]
fn invalid_output_format_is_fatal() {
	let options = InstantiateOptions {
		outfmt: "generated".to_string(),
		split_tests: false,
	};
	let result = instantiate_with(SET_TEMPLATE, "mySet(String)", &options);
	assert!(matches!(result, Err(TemplateError::InvalidOutputFormat(_))));
}

#[test]
fn instantiate_concrete_set() -> TemplateResult<()> {
	let content = render(SET_TEMPLATE, "mySet(String)")?;

	assert!(content.starts_with(GENERATED_HEADER));
	assert!(content.contains("BTreeSet<String>"));
	assert!(content.contains("pub(crate) struct mySet {"));
	assert!(content.contains("impl mySet {"));
	assert!(content.contains("pub fn insert(&mut self, item: String) -> bool"));
	assert!(content.contains("pub fn contains(&self, item: &String) -> bool"));
	assert!(content.contains("pub(crate) fn newMySet() -> mySet {"));
	assert!(content.contains("mySet::default()"));
	assert!(content.contains("pub(crate) fn union_ofMySet(left: &mySet, right: &mySet) -> mySet"));
	assert!(content.contains("fn init() {}"));
	assert!(!content.contains("u32"));

	Ok(())
}

#[test]
fn placeholders_are_eliminated() -> TemplateResult<()> {
	let content = render(SET_TEMPLATE, "mySet(String)")?;
	let names = top_level_names(&content);
	assert_eq!(names, vec!["mySet", "newMySet", "union_ofMySet", "init"]);

	let tokens: TokenStream = content
		.parse()
		.unwrap_or_else(|e| panic!("output doesn't lex: {e:?}"));
	let mut found = Vec::new();
	identifiers(tokens, &mut found);
	assert!(!found.iter().any(|ident| ident == "A" || ident == "Set"));

	Ok(())
}

#[test]
fn unexported_instantiation_never_exports() -> TemplateResult<()> {
	let source = "// template type Set(A)\ntype A = u8;\npub struct Set;\npub struct SetIter;\npub const Limit: usize = 4;\n";
	let content = render(source, "mySet(String)")?;
	let names = top_level_names(&content);

	assert_eq!(names, vec!["mySet", "mySetIter", "limitMySet"]);
	assert!(!names.iter().any(|name| is_exported(name)));

	Ok(())
}

#[test]
fn exported_instantiation_keeps_unexported_names() -> TemplateResult<()> {
	let content = render(SET_TEMPLATE, "MySet(String)")?;
	let names = top_level_names(&content);
	assert_eq!(names, vec!["MySet", "newMySet", "union_ofMySet", "init"]);

	Ok(())
}

#[rstest]
#[case::unexported("mySet(String)", "mySet", false)]
#[case::exported("MySet(String)", "MySet", true)]
fn request_case_decides_item_visibility(
	#[case] text: &str,
	#[case] name: &str,
	#[case] public: bool,
) -> TemplateResult<()> {
	let content = render(SET_TEMPLATE, text)?;
	let file = syn::parse_file(&content).unwrap_or_else(|e| panic!("output doesn't parse: {e}"));
	let vis = file
		.items
		.iter()
		.find_map(|item| {
			match item {
				Item::Struct(item) if item.ident == name => Some(item.vis.clone()),
				_ => None,
			}
		})
		.unwrap_or_else(|| panic!("no struct {name}"));

	if public {
		assert!(matches!(vis, Visibility::Public(_)));
	} else {
		assert!(matches!(&vis, Visibility::Restricted(restricted) if restricted.path.is_ident("crate")));
		assert!(!file.items.iter().any(|item| {
			matches!(item, Item::Fn(function) if matches!(function.vis, Visibility::Public(_)))
		}));
	}
	assert!(file.attrs.iter().any(|attr| attr.path().is_ident("allow")));

	Ok(())
}

#[test]
fn renaming_follows_scopes() -> TemplateResult<()> {
	let content = render(SCOPING_TEMPLATE, "mySet(u16)")?;

	assert!(content.contains("items: Vec<u16>"));
	assert!(content.contains("fn helperMySet() -> usize"));
	assert!(content.contains("pub(crate) fn firstMySet<A: Clone>(items: &[A]) -> Option<A>"));
	assert!(content.contains("pub(crate) fn applyMySet(helper: usize) -> usize"));
	assert!(content.contains("helper + self::helperMySet()"));

	Ok(())
}

#[test]
fn resolver_distinguishes_same_named_symbols() -> TemplateResult<()> {
	let module = analyze(Path::new("template.rs"), SCOPING_TEMPLATE)?;
	let describe = |name: &str| {
		module
			.symbols
			.named(name)
			.into_iter()
			.map(|id| {
				let symbol = module.symbols.get(id);
				(symbol.kind, symbol.top_level, symbol.uses.len())
			})
			.collect::<Vec<_>>()
	};

	assert_eq!(
		describe("helper"),
		vec![(SymbolKind::Function, true, 1), (SymbolKind::Local, false, 1)]
	);
	assert_eq!(
		describe("A"),
		vec![(SymbolKind::TypeAlias, true, 1), (SymbolKind::TypeParam, false, 2)]
	);

	Ok(())
}

#[test]
fn value_arguments_substitute_by_context() -> TemplateResult<()> {
	let content = render(RING_TEMPLATE, "byteRing(u16, 8)")?;

	assert!(content.contains("slots: [Option<u16>; 8]"));
	assert!(content.contains("pub const CAPACITY: usize = 8;"));
	assert!(content.contains("self.head == 8"));
	assert!(content.contains("pub(crate) struct fixedByteRing<const M: usize>;"));
	assert!(content.contains("pub(crate) type byteRingFixed = fixedByteRing<8>;"));
	assert!(!content.contains("const N"));

	Ok(())
}

#[test]
fn compound_value_arguments_are_parenthesized() -> TemplateResult<()> {
	let content = render(RING_TEMPLATE, "byteRing(u16, 2 * 4)")?;
	assert!(content.contains("(2 * 4)"));
	assert!(!content.contains("self.head == 2 * 4"));

	Ok(())
}

#[test]
fn field_shorthand_keeps_field_name() -> TemplateResult<()> {
	let content = render(POOL_TEMPLATE, "bytePool(u8)")?;

	assert!(content.contains("const maxBytePool: usize = 8;"));
	assert!(content.contains("pub(crate) struct limitsBytePool {"));
	assert!(content.contains("max: usize"));
	assert!(content.contains("max: maxBytePool"));
	assert!(content.contains("pub(crate) fn new_poolBytePool() -> bytePool"));

	Ok(())
}

#[test]
fn resolver_records_field_shorthand_alias() -> TemplateResult<()> {
	let module = analyze(Path::new("pool.rs"), POOL_TEMPLATE)?;
	let ids = module.symbols.named("max");
	assert_eq!(ids.len(), 1);

	let symbol = module.symbols.get(ids[0]);
	assert_eq!(symbol.kind, SymbolKind::Const);
	let aliases: Vec<_> = symbol
		.uses
		.iter()
		.filter_map(|site| module.symbols.alias_at(*site))
		.map(|alias| alias.kind)
		.collect();
	assert_eq!(aliases, vec![AliasKind::FieldShorthand]);

	Ok(())
}

#[test]
fn inline_modules_follow_imports_and_crate_paths() -> TemplateResult<()> {
	let content = render(NESTED_TEMPLATE, "mySet(String)")?;

	assert!(content.contains("pub(crate) fn makeMySet() -> self::mySet"));
	assert!(content.contains("self::mySet { items: Vec::new() }"));
	assert!(content.contains("use super::mySet;"));
	assert!(!content.contains("use super::A"));
	assert!(content.contains("pub fn size(set: &mySet) -> usize"));
	assert!(content.contains("pub fn single(item: String) -> mySet"));
	assert!(content.contains("pub fn fresh() -> super::mySet"));
	assert!(content.contains("super::makeMySet()"));
	assert!(!content.contains("crate::"));

	Ok(())
}

#[test]
fn resolver_records_import_alias() -> TemplateResult<()> {
	let module = analyze(Path::new("nested.rs"), NESTED_TEMPLATE)?;
	let ids = module.symbols.named("Set");
	assert_eq!(ids.len(), 1);

	let imports = module
		.symbols
		.get(ids[0])
		.uses
		.iter()
		.filter(|site| {
			module
				.symbols
				.alias_at(**site)
				.is_some_and(|alias| alias.kind == AliasKind::Import)
		})
		.count();
	assert_eq!(imports, 1);

	Ok(())
}

#[rstest]
#[case::generic_path("bytesCell(Vec<u8>)", "value: Vec<u8>", "Vec::<u8>::default()")]
#[case::array("arrayCell([u8; 4])", "value: [u8; 4]", "<[u8; 4]>::default()")]
#[case::plain("textCell(String)", "value: String", "String::default()")]
fn path_prefix_arguments(#[case] text: &str, #[case] field: &str, #[case] call: &str) -> TemplateResult<()> {
	let content = render(CELL_TEMPLATE, text)?;
	assert!(content.contains(field));
	assert!(content.contains(call));

	Ok(())
}

#[test]
fn macro_bodies_are_rewritten() -> TemplateResult<()> {
	let content = render(CELL_TEMPLATE, "textCell(String)")?;
	assert!(content.contains("pub fn all() -> Vec<textCell>"));
	assert!(content.contains("textCell::empty()"));

	Ok(())
}

#[test]
fn format_string_captures_follow_substitutions() -> TemplateResult<()> {
	let content = render(GAUGE_TEMPLATE, "myGauge(u16, 16)")?;

	assert!(content.contains(r#""{N}/{limitMyGauge:>width$} {limit} {}""#));
	assert!(content.contains("16, N = 16"));
	assert!(content.contains(r#""over {limitMyGauge}""#));
	assert!(content.contains("const limitMyGauge: usize = 10;"));
	assert!(!content.contains("{Limit"));
	assert!(!content.contains("const N"));

	Ok(())
}

#[test]
fn resolver_records_format_captures() -> TemplateResult<()> {
	let module = analyze(Path::new("gauge.rs"), GAUGE_TEMPLATE)?;
	let capture_kinds = |name: &str| {
		let ids = module.symbols.named(name);
		assert_eq!(ids.len(), 1, "{name} is defined once");
		module
			.symbols
			.get(ids[0])
			.uses
			.iter()
			.filter(|site| {
				module
					.symbols
					.alias_at(**site)
					.is_some_and(|alias| alias.kind == AliasKind::FormatArgument)
			})
			.count()
	};

	assert_eq!(capture_kinds("Limit"), 2);
	assert_eq!(capture_kinds("N"), 1);
	assert_eq!(capture_kinds("width"), 1);
	assert_eq!(capture_kinds("limit"), 1);

	Ok(())
}

#[rstest]
#[case::plain(r#""{a} {{b}} {c:>w$} {0} {} {_}""#, vec!["a", "c", "w"])]
#[case::raw(r##"r#"{x:.prec$}"#"##, vec!["x", "prec"])]
#[case::positional_width(r#""{:1$}""#, vec![])]
#[case::byte_string(r#"b"{x}""#, vec![])]
fn format_capture_names(#[case] literal: &str, #[case] expected: Vec<&str>) {
	let literal: proc_macro2::Literal = literal.parse().unwrap_or_else(|e| panic!("literal: {e}"));
	let names: Vec<_> = format_captures(&literal).into_iter().map(|capture| capture.name).collect();
	assert_eq!(names, expected);
}

#[test]
fn format_capture_sites_span_lines() {
	let tokens: TokenStream = "format!(\"x\n  {b}\")".parse().unwrap_or_else(|e| panic!("tokens: {e}"));
	let Some(TokenTree::Group(group)) = tokens.into_iter().nth(2) else {
		panic!("expected macro arguments");
	};
	let Some(TokenTree::Literal(literal)) = group.stream().into_iter().next() else {
		panic!("expected a literal");
	};

	let captures = format_captures(&literal);
	assert_eq!(captures.len(), 1);
	assert_eq!(captures[0].site, Site { line: 2, column: 3 });
	assert_eq!(&literal.to_string()[captures[0].range.clone()], "b");
}

#[test]
fn format_stub_injects_catalog_fragment() -> TemplateResult<()> {
	let content = render(PARSE_TEMPLATE, "intParse(i64)")?;

	assert!(content.contains("static parse_aIntParse: fn(&dyn Any) -> i64"));
	assert!(content.contains("downcast_ref::<u128>()"));
	assert!(content.contains("unknown type"));
	assert!(!content.contains("unimplemented!()"));
	assert!(content.contains("pub fn parse(value: &dyn Any) -> i64"));
	assert!(content.contains("parse_aIntParse(value)"));

	Ok(())
}

#[test]
fn format_stub_for_string_passes_strings_through() -> TemplateResult<()> {
	let content = render(PARSE_TEMPLATE, "textParse(String)")?;
	assert!(content.contains("downcast_ref::<&'static str>()"));
	assert!(content.contains("value.to_string()"));

	Ok(())
}

#[test]
fn format_stub_for_unknown_type_is_untouched() -> TemplateResult<()> {
	let content = render(PARSE_TEMPLATE, "uuidParse(Uuid)")?;

	assert!(content.contains("fn(&dyn Any) -> Uuid"));
	assert!(content.contains("unimplemented!()"));
	assert!(!content.contains("downcast_ref"));

	Ok(())
}

#[test]
fn format_catalog_covers_primitive_types() -> TemplateResult<()> {
	let catalog = catalog()?;
	let keys: Vec<_> = catalog.keys().collect();
	assert_eq!(keys.len(), 15);

	for key in keys {
		let fragment = catalog.get(key).unwrap_or_else(|| panic!("missing `{key}`"));
		assert!(fragment.contains(&format!("-> {key}")));
		assert!(syn::parse_str::<syn::Expr>(fragment).is_ok());
	}
	assert!(catalog.get("bool").is_none());

	Ok(())
}

#[test]
fn test_items_stay_in_primary_unit_by_default() -> TemplateResult<()> {
	let instantiation = instantiate_with(LIST_TEMPLATE, "IntList(i64)", &InstantiateOptions::default())?;

	assert_eq!(instantiation.units.len(), 1);
	let content = unit_content(&instantiation, UnitKind::Primary);
	assert!(content.contains("pub struct IntList {"));
	assert!(content.contains("fn list_pushIntList()"));
	assert!(content.contains("i64::default()"));

	Ok(())
}

#[test]
fn test_items_split_into_test_unit() -> TemplateResult<()> {
	let options = InstantiateOptions {
		split_tests: true,
		..InstantiateOptions::default()
	};
	let instantiation = instantiate_with(LIST_TEMPLATE, "IntList(i64)", &options)?;

	let paths: Vec<_> = instantiation.units.iter().map(|unit| unit.path.clone()).collect();
	assert_eq!(
		paths,
		vec![
			PathBuf::from("out/rstemplate_int_list.rs"),
			PathBuf::from("out/rstemplate_int_list_test.rs"),
		]
	);

	let primary = unit_content(&instantiation, UnitKind::Primary);
	assert!(primary.contains("pub struct IntList {"));
	assert!(primary.contains("#[path = \"rstemplate_int_list_test.rs\"]"));
	assert!(primary.contains("mod rstemplate_int_list_test;"));
	assert!(!primary.contains("fn list_push"));
	assert!(!primary.contains("similar_asserts"));

	let tests = unit_content(&instantiation, UnitKind::Tests);
	assert!(tests.starts_with(GENERATED_HEADER));
	assert!(tests.contains("use super::*;"));
	assert!(tests.contains("use similar_asserts::assert_eq;"));
	assert!(tests.contains("#[test]"));
	assert!(tests.contains("fn list_pushIntList()"));
	assert!(tests.contains("i64::default()"));
	assert!(!tests.contains("pub struct IntList"));

	Ok(())
}

#[test]
fn split_requires_a_test_function() -> TemplateResult<()> {
	let options = InstantiateOptions {
		split_tests: true,
		..InstantiateOptions::default()
	};
	let instantiation = instantiate_with(SET_TEMPLATE, "mySet(String)", &options)?;
	assert_eq!(instantiation.units.len(), 1);

	Ok(())
}

#[test]
fn cfg_test_module_splits_into_test_unit() -> TemplateResult<()> {
	let options = InstantiateOptions {
		split_tests: true,
		..InstantiateOptions::default()
	};
	let instantiation = instantiate_with(COUNTER_TEMPLATE, "Hits(u64)", &options)?;
	assert_eq!(instantiation.units.len(), 2);

	let primary = unit_content(&instantiation, UnitKind::Primary);
	assert!(primary.contains("pub struct Hits {"));
	assert!(primary.contains("mod rstemplate_hits_test;"));
	assert!(!primary.contains("fn bumps()"));
	assert!(!primary.contains("#[cfg(test)]\nmod tests"));

	let tests = unit_content(&instantiation, UnitKind::Tests);
	assert!(tests.contains("use super::*;"));
	assert!(tests.contains("fn bumps()"));
	assert!(tests.contains("bumpHits(&mut counter, u64::default());"));
	assert!(!tests.contains("pub struct Hits"));

	Ok(())
}

#[test]
fn detect_test_functions() {
	let bench: ItemFn = syn::parse_quote! {
		fn bench(b: &mut test::Bencher) {}
	};
	let async_test: ItemFn = syn::parse_quote! {
		#[tokio::test]
		async fn runs() {}
	};
	let case: ItemFn = syn::parse_quote! {
		#[rstest]
		fn case() {}
	};
	let helper: ItemFn = syn::parse_quote! {
		fn helper(buffer: &mut Vec<u8>) {}
	};
	let mixed: ItemFn = syn::parse_quote! {
		fn bench_with(b: &mut test::Bencher, extra: usize) {}
	};
	let no_params: ItemFn = syn::parse_quote! {
		fn plain() {}
	};

	assert!(is_test_fn(&bench));
	assert!(is_test_fn(&async_test));
	assert!(is_test_fn(&case));
	assert!(!is_test_fn(&helper));
	assert!(!is_test_fn(&mixed));
	assert!(!is_test_fn(&no_params));
}

#[test]
fn partition_splits_mixed_import_groups() {
	let items: Vec<Item> = vec![
		syn::parse_quote!(use {std::fmt, proptest::prelude::*};),
		syn::parse_quote!(use quickcheck::Arbitrary;),
		syn::parse_quote!(
			pub fn keep() {}
		),
		syn::parse_quote!(
			#[cfg(test)]
			mod tests {}
		),
	];
	let partition = partition_tests(items);

	assert_eq!(partition.primary.len(), 2);
	assert_eq!(partition.tests.len(), 3);
	let Item::Use(primary_import) = &partition.primary[0] else {
		panic!("expected an import");
	};
	let UseTree::Group(group) = &primary_import.tree else {
		panic!("expected a group");
	};
	assert_eq!(group.items.len(), 1);
}

#[test]
fn write_is_idempotent() -> TemplateResult<()> {
	let tmp = tempdir();
	let template_dir = tmp.path().join("template");
	fs::create_dir(&template_dir)?;
	fs::write(template_dir.join("set.rs"), SET_TEMPLATE)?;
	let options = InstantiateOptions::default();
	let output = tmp.path().join("rstemplate_my_set.rs");

	let first = instantiate(&template_dir, &request("mySet(String)"), tmp.path(), &options)?;
	let outcomes = write_instantiations(std::slice::from_ref(&first))?;
	assert_eq!(outcomes.len(), 1);
	assert_eq!(outcomes[0].outcome, WriteOutcome::Written);
	assert_eq!(outcomes[0].path, output);
	let written = fs::read_to_string(&output)?;

	let second = instantiate(&template_dir, &request("mySet(String)"), tmp.path(), &options)?;
	assert_eq!(second.units[0].content, written);
	let outcomes = write_instantiations(std::slice::from_ref(&second))?;
	assert_eq!(outcomes[0].outcome, WriteOutcome::Unchanged);
	assert!(check_instantiations(&[second])?.is_ok());

	Ok(())
}

#[test]
fn check_reports_stale_and_missing_units() -> TemplateResult<()> {
	let tmp = tempdir();
	let template = tmp.path().join("set.rs.template");
	fs::write(&template, SET_TEMPLATE)?;
	let options = InstantiateOptions::default();

	let instantiation = instantiate(&template, &request("mySet(String)"), tmp.path(), &options)?;
	let result = check_instantiations(std::slice::from_ref(&instantiation))?;
	assert_eq!(result.stale.len(), 1);
	assert!(result.stale[0].current.is_none());

	fs::write(&instantiation.units[0].path, "// edited\n")?;
	let result = check_instantiations(std::slice::from_ref(&instantiation))?;
	assert_eq!(result.stale.len(), 1);
	assert_eq!(result.stale[0].current.as_deref(), Some("// edited\n"));
	assert_eq!(result.stale[0].expected, instantiation.units[0].content);

	Ok(())
}

#[test]
fn non_utf8_output_is_replaced() -> TemplateResult<()> {
	let tmp = tempdir();
	let template = tmp.path().join("set.rs.template");
	fs::write(&template, SET_TEMPLATE)?;
	let options = InstantiateOptions::default();
	let instantiation = instantiate(&template, &request("mySet(String)"), tmp.path(), &options)?;
	let output = &instantiation.units[0].path;
	fs::write(output, [0xff, 0xfe, b'\n'])?;

	let result = check_instantiations(std::slice::from_ref(&instantiation))?;
	assert_eq!(result.stale.len(), 1);
	assert_eq!(result.stale[0].current.as_deref(), Some("\u{fffd}\u{fffd}\n"));

	let outcomes = write_instantiations(std::slice::from_ref(&instantiation))?;
	assert_eq!(outcomes[0].outcome, WriteOutcome::Written);
	assert_eq!(fs::read_to_string(output)?, instantiation.units[0].content);
	assert!(check_instantiations(&[instantiation])?.is_ok());

	Ok(())
}

#[test]
fn split_units_are_written_together() -> TemplateResult<()> {
	let tmp = tempdir();
	let template = tmp.path().join("list.rs.template");
	fs::write(&template, LIST_TEMPLATE)?;
	let options = InstantiateOptions {
		outfmt: "gen_{}".to_string(),
		split_tests: true,
	};

	let instantiation = instantiate(&template, &request("IntList(i64)"), tmp.path(), &options)?;
	let outcomes = write_instantiations(&[instantiation])?;
	let kinds: Vec<_> = outcomes.iter().map(|outcome| (outcome.kind, outcome.outcome)).collect();
	assert_eq!(
		kinds,
		vec![
			(UnitKind::Primary, WriteOutcome::Written),
			(UnitKind::Tests, WriteOutcome::Written),
		]
	);
	assert!(tmp.path().join("gen_int_list.rs").is_file());
	assert!(tmp.path().join("gen_int_list_test.rs").is_file());

	Ok(())
}

#[test]
fn locate_template_in_directory() -> TemplateResult<()> {
	let tmp = tempdir();
	let empty = tmp.path().join("empty");
	fs::create_dir(&empty)?;
	assert!(matches!(
		locate_template(&empty),
		Err(TemplateError::TemplateNotFound(_))
	));
	assert!(matches!(
		locate_template(&tmp.path().join("missing")),
		Err(TemplateError::TemplateNotFound(_))
	));

	let single = tmp.path().join("single");
	fs::create_dir(&single)?;
	fs::write(single.join("set.rs"), SET_TEMPLATE)?;
	fs::write(single.join("notes.md"), "# notes\n")?;
	assert_eq!(locate_template(&single)?, single.join("set.rs"));

	fs::write(single.join("other.rs"), SET_TEMPLATE)?;
	assert!(matches!(
		locate_template(&single),
		Err(TemplateError::AmbiguousTemplate { count: 2, .. })
	));

	Ok(())
}

#[test]
fn generate_directives_instantiate_next_to_their_file() -> TemplateResult<()> {
	let tmp = tempdir();
	let templates = tmp.path().join("templates");
	let src = tmp.path().join("src");
	fs::create_dir(&templates)?;
	fs::create_dir(&src)?;
	fs::write(templates.join("set.rs"), SET_TEMPLATE)?;
	fs::write(
		src.join("lib.rs"),
		"// rstemplate:generate ../templates/set.rs mySet(String)\nmod rstemplate_my_set;\n",
	)?;

	let directives = scan_generate_directives(tmp.path())?;
	assert_eq!(directives.len(), 1);
	assert_eq!(directives[0].line, 1);
	assert_eq!(directives[0].request, request("mySet(String)"));
	assert_eq!(directives[0].template, src.join("../templates/set.rs"));

	let options = InstantiateOptions::default();
	let instantiations = instantiate_project(tmp.path(), &options)?;
	assert_eq!(instantiations.len(), 1);
	assert_eq!(instantiations[0].units[0].path, src.join("rstemplate_my_set.rs"));
	write_instantiations(&instantiations)?;

	let rescanned = scan_generate_directives(tmp.path())?;
	assert_eq!(rescanned.len(), 1);

	Ok(())
}

#[test]
fn load_config_from_project_root() -> TemplateResult<()> {
	let tmp = tempdir();
	assert!(TemplateConfig::load(tmp.path())?.is_none());

	fs::write(
		tmp.path().join("rstemplate.toml"),
		"outfmt = \"gen_{}\"\nsplit_tests = true\n",
	)?;
	let config = TemplateConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config expected"));
	assert_eq!(
		config,
		TemplateConfig {
			outfmt: "gen_{}".to_string(),
			split_tests: true,
		}
	);

	let options = InstantiateOptions::from(&config);
	assert!(options.split_tests);

	Ok(())
}

#[rstest]
#[case::missing_placeholder("outfmt = \"generated\"\n")]
#[case::unknown_key("output = \"gen_{}\"\n")]
fn reject_invalid_config(#[case] content: &str) -> TemplateResult<()> {
	let tmp = tempdir();
	fs::create_dir(tmp.path().join(".config"))?;
	fs::write(tmp.path().join(".config/rstemplate.toml"), content)?;

	let result = TemplateConfig::load(tmp.path());
	assert!(matches!(
		result,
		Err(TemplateError::InvalidOutputFormat(_) | TemplateError::ConfigParse(_))
	));

	Ok(())
}
