use std::fmt;

use crate::TemplateResult;
use crate::directive::parse_call;
use crate::mangle::snake_case;

/// A concrete instantiation such as `mySet(String)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationRequest {
	/// The instantiation name. Its leading character decides visibility.
	pub name: String,
	/// Actual arguments, positionally matched against the formal parameters.
	pub args: Vec<String>,
}

impl InstantiationRequest {
	pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			name: name.into(),
			args: args.into_iter().map(Into::into).collect(),
		}
	}

	/// Parse `Name(Arg, ...)` using the same grammar as template directives.
	pub fn parse(text: &str) -> TemplateResult<Self> {
		let call = parse_call(text)?;
		Ok(Self {
			name: call.name.to_string(),
			args: call.args.into_iter().map(|arg| arg.text).collect(),
		})
	}

	/// Upper-case leading character means the instantiated symbols may be
	/// exported.
	pub fn is_public(&self) -> bool {
		self.name.chars().next().is_some_and(char::is_uppercase)
	}

	/// The snake_case stem used to derive output file names.
	pub fn file_stem(&self) -> String {
		snake_case(&self.name)
	}
}

impl fmt::Display for InstantiationRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.name, self.args.join(", "))
	}
}
