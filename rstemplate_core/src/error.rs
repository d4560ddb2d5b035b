use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum TemplateError {
	#[error(transparent)]
	#[diagnostic(code(rstemplate::io_error))]
	Io(#[from] std::io::Error),

	#[error("template not found: `{0}`")]
	#[diagnostic(
		code(rstemplate::template_not_found),
		help("pass a `.rs` file or a directory containing exactly one `.rs` file")
	)]
	TemplateNotFound(String),

	#[error("found {count} rust files in `{path}` - a template must be a single file")]
	#[diagnostic(
		code(rstemplate::ambiguous_template),
		help("point at the template file itself instead of its directory")
	)]
	AmbiguousTemplate { path: String, count: usize },

	#[error("failed to read `{path}`: {reason}")]
	#[diagnostic(code(rstemplate::read))]
	Read { path: String, reason: String },

	#[error("failed to write `{path}`: {reason}")]
	#[diagnostic(code(rstemplate::write))]
	Write { path: String, reason: String },

	#[error("failed to parse `{path}`: {message}")]
	#[diagnostic(code(rstemplate::parse))]
	Parse { path: String, message: String },

	#[error("name resolution failed in `{path}`: {message}")]
	#[diagnostic(code(rstemplate::semantic))]
	Semantic { path: String, message: String },

	#[error("didn't find template definition in `{0}`")]
	#[diagnostic(
		code(rstemplate::missing_directive),
		help("add a comment such as `// template type Set(A)` to the template module")
	)]
	MissingDirective(String),

	#[error("found multiple template definitions in `{path}` (lines {first} and {second})")]
	#[diagnostic(
		code(rstemplate::duplicate_directive),
		help("a template module declares exactly one `template type` directive")
	)]
	DuplicateDirective {
		path: String,
		first: usize,
		second: usize,
	},

	#[error("failed to parse `{text}`: {reason}")]
	#[diagnostic(
		code(rstemplate::invalid_call),
		help("expected `Name(Arg, ...)`, for example `mySet(String)`")
	)]
	InvalidCall { text: String, reason: String },

	#[error("wrong number of arguments for `{template}` - template is expecting {expected} but {got} supplied")]
	#[diagnostic(code(rstemplate::arity))]
	Arity {
		template: String,
		expected: usize,
		got: usize,
	},

	#[error("no definition for template type `{0}`")]
	#[diagnostic(
		code(rstemplate::missing_template_definition),
		help("declare a top-level item named after the directive, e.g. `struct {0} {{ .. }}`")
	)]
	MissingTemplateDefinition(String),

	#[error("unsupported top-level declaration `{kind}` on line {line}")]
	#[diagnostic(code(rstemplate::unsupported_declaration))]
	UnsupportedDeclaration { kind: String, line: usize },

	#[error("argument `{argument}` bound to `{parameter}` cannot be used {position}")]
	#[diagnostic(code(rstemplate::invalid_argument))]
	InvalidArgument {
		parameter: String,
		argument: String,
		position: String,
	},

	#[error("name collision: `{first}` and `{second}` both become `{name}`")]
	#[diagnostic(
		code(rstemplate::name_collision),
		help("rename one of the template items so the instantiated names stay distinct")
	)]
	NameCollision {
		name: String,
		first: String,
		second: String,
	},

	#[error("format catalog is unavailable: {0}")]
	#[diagnostic(code(rstemplate::format_catalog))]
	FormatCatalog(String),

	#[error("failed to normalize generated output for `{path}`: {reason}")]
	#[diagnostic(code(rstemplate::normalize))]
	Normalize { path: String, reason: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(rstemplate::config_parse),
		help("check that rstemplate.toml is valid TOML with `outfmt` and `split_tests` keys")
	)]
	ConfigParse(String),

	#[error("invalid output format `{0}`")]
	#[diagnostic(
		code(rstemplate::invalid_outfmt),
		help("the output format must contain a single `{{}}` placeholder, e.g. `rstemplate_{{}}`")
	)]
	InvalidOutputFormat(String),
}

pub type TemplateResult<T> = Result<T, TemplateError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
