use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::LazyLock;

use minijinja::Environment;
use minijinja::context;
use syn::Expr;
use syn::Item;
use syn::ReturnType;
use syn::Type;

use crate::Site;
use crate::TemplateError;
use crate::TemplateResult;

/// Primitive numeric types a format function converts between.
pub const NUMERIC_TYPES: [&str; 14] = [
	"i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32",
	"f64",
];

/// The catalog's only non-numeric key.
pub const STRING_TYPE: &str = "String";

const FRAGMENT_TEMPLATE: &str = r#"
|value: &dyn ::std::any::Any| -> {{ target }} {
{%- if target == "String" %}
	if let Some(value) = value.downcast_ref::<::std::string::String>() {
		return value.clone();
	}
	if let Some(value) = value.downcast_ref::<&'static str>() {
		return (*value).to_string();
	}
{%- for source in numeric %}
	if let Some(value) = value.downcast_ref::<{{ source }}>() {
		return value.to_string();
	}
{%- endfor %}
{%- else %}
{%- for source in numeric %}
	if let Some(value) = value.downcast_ref::<{{ source }}>() {
		return *value as {{ target }};
	}
{%- endfor %}
	if let Some(value) = value.downcast_ref::<::std::string::String>() {
		return value.parse::<{{ target }}>().unwrap_or_else(|error| panic!("{error}"));
	}
	if let Some(value) = value.downcast_ref::<&'static str>() {
		return value.parse::<{{ target }}>().unwrap_or_else(|error| panic!("{error}"));
	}
{%- endif %}
	panic!("unknown type")
}
"#;

/// Type name → closure source converting `&dyn Any` into that type.
#[derive(Debug, Clone)]
pub struct FormatCatalog {
	fragments: BTreeMap<&'static str, String>,
}

impl FormatCatalog {
	fn render() -> Result<Self, String> {
		let mut env = Environment::new();
		env.add_template("fragment", FRAGMENT_TEMPLATE)
			.map_err(|e| e.to_string())?;
		let template = env.get_template("fragment").map_err(|e| e.to_string())?;

		let mut fragments = BTreeMap::new();
		for target in NUMERIC_TYPES.into_iter().chain([STRING_TYPE]) {
			let fragment = template
				.render(context! { target => target, numeric => NUMERIC_TYPES })
				.map_err(|e| e.to_string())?;
			syn::parse_str::<Expr>(&fragment).map_err(|e| format!("fragment for `{target}`: {e}"))?;
			fragments.insert(target, fragment);
		}

		Ok(Self { fragments })
	}

	/// The closure source for `type_name`, if the catalog covers it.
	pub fn get(&self, type_name: &str) -> Option<&str> {
		self.fragments.get(type_name).map(String::as_str)
	}

	pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.fragments.keys().copied()
	}
}

static CATALOG: LazyLock<Result<FormatCatalog, String>> = LazyLock::new(FormatCatalog::render);

/// The process-wide catalog, rendered on first use.
pub fn catalog() -> TemplateResult<&'static FormatCatalog> {
	CATALOG
		.as_ref()
		.map_err(|message| TemplateError::FormatCatalog(message.clone()))
}

/// The catalog key of a stub's declared type: the single result of a
/// function pointer, named by a plain path.
fn result_type_name(ty: &Type) -> Option<String> {
	let Type::BareFn(function) = ty else {
		return None;
	};
	let ReturnType::Type(_, output) = &function.output else {
		return None;
	};
	let Type::Path(path) = output.as_ref() else {
		return None;
	};
	if path.qself.is_some() || path.path.segments.iter().any(|segment| !segment.arguments.is_none()) {
		return None;
	}
	path.path.segments.last().map(|segment| segment.ident.to_string())
}

/// Replace the initialiser of every format stub whose result type is in the
/// catalog. Runs after substitution so the result type is the bound one.
/// Returns how many stubs were replaced.
pub fn inject(file: &mut syn::File, stubs: &HashSet<Site>) -> TemplateResult<usize> {
	if stubs.is_empty() {
		return Ok(0);
	}
	let catalog = catalog()?;
	let mut injected = 0;

	for item in &mut file.items {
		let (ident, ty, expr) = match item {
			Item::Static(item) => (&item.ident, &item.ty, &mut item.expr),
			Item::Const(item) => (&item.ident, &item.ty, &mut item.expr),
			_ => continue,
		};
		if !stubs.contains(&Site::of(ident)) {
			continue;
		}
		let Some(type_name) = result_type_name(ty) else {
			tracing::debug!(stub = %ident, "format stub is not a function with one result");
			continue;
		};
		let Some(fragment) = catalog.get(&type_name) else {
			tracing::debug!(stub = %ident, %type_name, "no format function for type");
			continue;
		};

		**expr = syn::parse_str::<Expr>(fragment).map_err(|e| TemplateError::FormatCatalog(e.to_string()))?;
		tracing::debug!(stub = %ident, %type_name, "injected format function");
		injected += 1;
	}

	Ok(injected)
}
