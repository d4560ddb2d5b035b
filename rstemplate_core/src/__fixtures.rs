use std::path::Path;

use crate::InstantiateOptions;
use crate::Instantiation;
use crate::InstantiationRequest;
use crate::TemplateResult;
use crate::UnitKind;
use crate::instantiate_source;

pub const SET_TEMPLATE: &str = r"// template type Set(A)

use std::collections::BTreeSet;

type A = u32;

/// A sorted set of values.
#[derive(Debug, Default, Clone)]
pub struct Set {
	items: BTreeSet<A>,
}

impl Set {
	pub fn insert(&mut self, item: A) -> bool {
		self.items.insert(item)
	}

	pub fn contains(&self, item: &A) -> bool {
		self.items.contains(item)
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}
}

pub fn newSet() -> Set {
	Set::default()
}

pub fn union_of(left: &Set, right: &Set) -> Set {
	let mut merged = left.clone();
	for item in &right.items {
		merged.insert(item.clone());
	}
	merged
}

fn init() {}
";

pub const SCOPING_TEMPLATE: &str = r"// template type Set(A)

type A = u8;

pub struct Set {
	items: Vec<A>,
}

fn helper() -> usize {
	1
}

pub fn first<A: Clone>(items: &[A]) -> Option<A> {
	items.first().cloned()
}

pub fn apply(helper: usize) -> usize {
	helper + self::helper()
}
";

pub const RING_TEMPLATE: &str = r"// template type Ring(T, N)

type T = u8;
const N: usize = 4;

pub struct Fixed<const M: usize>;

pub type RingFixed = Fixed<N>;

pub struct Ring {
	slots: [Option<T>; N],
	head: usize,
}

impl Ring {
	pub const CAPACITY: usize = N;

	pub fn is_full(&self) -> bool {
		self.head == N
	}
}
";

pub const POOL_TEMPLATE: &str = r"// template type Pool(A)

type A = u8;

pub struct Limits {
	max: usize,
}

#[allow(non_upper_case_globals)]
const max: usize = 8;

pub struct Pool {
	items: Vec<A>,
	limits: Limits,
}

pub fn new_pool() -> Pool {
	Pool {
		items: Vec::new(),
		limits: Limits { max },
	}
}
";

pub const NESTED_TEMPLATE: &str = r"// template type Set(A)

type A = u8;

pub struct Set {
	items: Vec<A>,
}

pub fn make() -> crate::Set {
	crate::Set { items: Vec::new() }
}

pub mod ops {
	use super::A;
	use super::Set;

	pub fn size(set: &Set) -> usize {
		set.items.len()
	}

	pub fn single(item: A) -> Set {
		Set { items: vec![item] }
	}

	pub fn fresh() -> crate::Set {
		crate::make()
	}
}
";

pub const CELL_TEMPLATE: &str = r#"// template type Cell(A)

type A = u8;

pub struct Cell {
	value: A,
}

impl Cell {
	pub fn empty() -> Self {
		Self { value: A::default() }
	}

	pub fn all() -> Vec<Cell> {
		vec![Cell::empty()]
	}
}
"#;

pub const COUNTER_TEMPLATE: &str = r"// template type Counter(A)

type A = u32;

pub struct Counter {
	total: A,
}

pub fn bump(counter: &mut Counter, by: A) {
	counter.total += by;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bumps() {
		let mut counter = Counter { total: A::default() };
		bump(&mut counter, A::default());
	}
}
";

pub const GAUGE_TEMPLATE: &str = r#"// template type Gauge(A, N)

type A = u8;
const N: usize = 4;

const Limit: usize = 10;

pub struct Gauge {
	value: A,
}

pub fn describe(limit: usize) -> String {
	let width = 6;
	format!("{N}/{Limit:>width$} {limit} {}", N)
}

pub fn check(gauge: &Gauge) {
	assert!(Limit >= gauge.value as usize, "over {Limit}");
}
"#;

pub const PARSE_TEMPLATE: &str = r"// template type Parse(A)

use std::any::Any;

type A = i32;

// template format
static parse_a: fn(&dyn Any) -> A = |_| unimplemented!();

pub struct Parse;

impl Parse {
	pub fn parse(value: &dyn Any) -> A {
		parse_a(value)
	}
}
";

pub const LIST_TEMPLATE: &str = r"// template type List(A)

type A = i32;

#[derive(Debug, Default)]
pub struct List {
	items: Vec<A>,
}

impl List {
	pub fn push(&mut self, item: A) {
		self.items.push(item);
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}
}

#[cfg(test)]
use similar_asserts::assert_eq;

#[test]
fn list_push() {
	let mut list = List::default();
	list.push(A::default());
	assert_eq!(list.len(), 1);
}
";

pub fn request(text: &str) -> InstantiationRequest {
	InstantiationRequest::parse(text).unwrap_or_else(|e| panic!("invalid request `{text}`: {e}"))
}

pub fn instantiate_with(source: &str, text: &str, options: &InstantiateOptions) -> TemplateResult<Instantiation> {
	instantiate_source(
		Path::new("template.rs"),
		source,
		&request(text),
		Path::new("out"),
		options,
	)
}

/// The rendered primary unit for `source` instantiated as `text`.
pub fn render(source: &str, text: &str) -> TemplateResult<String> {
	let instantiation = instantiate_with(source, text, &InstantiateOptions::default())?;
	Ok(unit_content(&instantiation, UnitKind::Primary))
}

pub fn unit_content(instantiation: &Instantiation, kind: UnitKind) -> String {
	instantiation
		.units
		.iter()
		.find(|unit| unit.kind == kind)
		.map(|unit| unit.content.clone())
		.unwrap_or_else(|| panic!("no {kind:?} unit"))
}
