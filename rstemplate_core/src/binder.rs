use crate::Directive;
use crate::InstantiationRequest;
use crate::TemplateError;
use crate::TemplateResult;

/// A formal parameter paired with the actual argument bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
	pub formal: String,
	pub actual: String,
}

/// Positional formal → actual mapping for one instantiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
	bindings: Vec<Binding>,
}

impl Bindings {
	/// The actual argument bound to `formal`, if `formal` is a parameter.
	pub fn get(&self, formal: &str) -> Option<&str> {
		self.bindings
			.iter()
			.find(|binding| binding.formal == formal)
			.map(|binding| binding.actual.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = &Binding> {
		self.bindings.iter()
	}

	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}
}

/// Match the directive's formal parameters against the request's actual
/// arguments. Arguments are not checked against their use sites.
pub fn bind(directive: &Directive, request: &InstantiationRequest) -> TemplateResult<Bindings> {
	if directive.formal_params.len() != request.args.len() {
		return Err(TemplateError::Arity {
			template: directive.name.clone(),
			expected: directive.formal_params.len(),
			got: request.args.len(),
		});
	}

	let bindings = directive
		.formal_params
		.iter()
		.zip(&request.args)
		.map(|(formal, actual)| {
			Binding {
				formal: formal.clone(),
				actual: actual.clone(),
			}
		})
		.collect();

	Ok(Bindings { bindings })
}
