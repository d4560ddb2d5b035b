use proc_macro2::Delimiter;
use proc_macro2::Group;
use proc_macro2::Literal;
use proc_macro2::Punct;
use proc_macro2::Spacing;
use proc_macro2::Span;
use proc_macro2::TokenStream;
use proc_macro2::TokenTree;
use syn::Expr;
use syn::ExprParen;
use syn::ExprStruct;
use syn::FieldValue;
use syn::GenericArgument;
use syn::Ident;
use syn::Item;
use syn::ItemMod;
use syn::ItemUse;
use syn::Macro;
use syn::Member;
use syn::Pat;
use syn::PatStruct;
use syn::PatTupleStruct;
use syn::PathArguments;
use syn::PathSegment;
use syn::QSelf;
use syn::Token;
use syn::Type;
use syn::UseTree;
use syn::Visibility;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::visit_mut;
use syn::visit_mut::VisitMut;

use crate::AliasKind;
use crate::Namespace;
use crate::Replacement;
use crate::Site;
use crate::format_captures;
use crate::SubstitutionMap;
use crate::SymbolTable;
use crate::TemplateError;
use crate::TemplateResult;

/// Apply `substitutions` to every definition, use and alias site in `file`
/// and retarget `crate::` paths at the instantiated unit itself.
pub fn rewrite(file: &mut syn::File, symbols: &SymbolTable, substitutions: &SubstitutionMap) -> TemplateResult<()> {
	let mut rewriter = Rewriter {
		symbols,
		substitutions,
		depth: 0,
		errors: Vec::new(),
	};
	rewriter.visit_file_mut(file);

	match rewriter.errors.into_iter().next() {
		Some(error) => Err(error),
		None => Ok(()),
	}
}

struct Rewriter<'a> {
	symbols: &'a SymbolTable,
	substitutions: &'a SubstitutionMap,
	/// Inline module nesting depth.
	depth: usize,
	errors: Vec<TemplateError>,
}

impl<'a> Rewriter<'a> {
	fn replacement_at(&self, site: Site) -> Option<&'a Replacement> {
		let id = self.symbols.resolve(site)?;
		self.substitutions.get(id)
	}

	fn bound_at(&self, site: Site) -> Option<(&'a str, &'a str)> {
		match self.replacement_at(site)? {
			Replacement::Bound { formal, actual } => Some((formal.as_str(), actual.as_str())),
			Replacement::Renamed(_) => None,
		}
	}

	/// Whether the symbol at `site` lives only in the value namespace.
	fn is_value_only(&self, site: Site) -> bool {
		self.symbols
			.resolve(site)
			.is_some_and(|id| !self.symbols.get(id).kind.namespaces().contains(&Namespace::Type))
	}

	/// The segment of `path` that resolved to a placeholder.
	fn bound_segment(&self, path: &syn::Path) -> Option<(usize, &'a str, &'a str)> {
		path.segments.iter().enumerate().find_map(|(index, segment)| {
			self.bound_at(Site::of(&segment.ident))
				.map(|(formal, actual)| (index, formal, actual))
		})
	}

	fn invalid(&mut self, formal: &str, actual: &str, position: &str) {
		self.errors.push(TemplateError::InvalidArgument {
			parameter: formal.to_string(),
			argument: actual.to_string(),
			position: position.to_string(),
		});
	}

	fn parse_type(&mut self, formal: &str, actual: &str, position: &str) -> Option<Type> {
		let parsed = syn::parse_str::<Type>(actual).ok();
		if parsed.is_none() {
			self.invalid(formal, actual, position);
		}
		parsed
	}

	fn parse_expr(&mut self, formal: &str, actual: &str, position: &str) -> Option<Expr> {
		let parsed = syn::parse_str::<Expr>(actual).ok();
		if parsed.is_none() {
			self.invalid(formal, actual, position);
		}
		parsed
	}

	/// Replace `path[..=index]` with the argument's own path, keeping the
	/// trailing segments. Arguments that are not paths become a qualified
	/// self type: `<[u8; 4]>::len`.
	fn splice(
		&mut self,
		qself: &mut Option<QSelf>,
		path: &mut syn::Path,
		index: usize,
		(formal, actual): (&str, &str),
		turbofish: bool,
	) {
		let mut rest: Punctuated<PathSegment, Token![::]> = path.segments.iter().skip(index + 1).cloned().collect();
		for segment in &mut rest {
			self.visit_path_arguments_mut(&mut segment.arguments);
		}
		let Some(ty) = self.parse_type(formal, actual, "as a path prefix") else {
			return;
		};

		match ty {
			Type::Path(syn::TypePath { qself: None, path: mut prefix }) => {
				if turbofish {
					for segment in &mut prefix.segments {
						if let PathArguments::AngleBracketed(arguments) = &mut segment.arguments {
							arguments.colon2_token = Some(Token![::](segment.ident.span()));
						}
					}
				}
				prefix.segments.extend(rest);
				*path = prefix;
			}
			ty if !rest.is_empty() => {
				*qself = Some(QSelf {
					lt_token: Token![<](path.segments[0].ident.span()),
					ty: Box::new(ty),
					position: 0,
					as_token: None,
					gt_token: Token![>](path.segments[0].ident.span()),
				});
				*path = syn::Path {
					leading_colon: Some(Token![::](path.segments[0].ident.span())),
					segments: rest,
				};
			}
			_ => self.invalid(formal, actual, "as a path"),
		}
	}

	/// Splice a placeholder prefix in expression or pattern context, where
	/// generic arguments need a turbofish.
	fn splice_value_path(&mut self, qself: &mut Option<QSelf>, path: &mut syn::Path) -> bool {
		if qself.is_some() {
			return false;
		}
		let Some((index, formal, actual)) = self.bound_segment(path) else {
			return false;
		};
		self.splice(qself, path, index, (formal, actual), true);
		true
	}

	/// `crate` → `self` at file level, `super::super` two modules down.
	fn retarget(&self, span: proc_macro2::Span) -> Vec<Ident> {
		if self.depth == 0 {
			vec![Ident::new("self", span)]
		} else {
			(0..self.depth).map(|_| Ident::new("super", span)).collect()
		}
	}

	fn retarget_use_tree(&self, tree: &mut UseTree) {
		let UseTree::Path(path) = tree else {
			return;
		};
		if path.ident != "crate" {
			return;
		}
		let span = path.ident.span();
		let mut retargeted = std::mem::replace(&mut *path.tree, UseTree::Glob(syn::UseGlob {
			star_token: Token![*](span),
		}));
		for ident in self.retarget(span).into_iter().rev() {
			retargeted = UseTree::Path(syn::UsePath {
				ident,
				colon2_token: Token![::](span),
				tree: Box::new(retargeted),
			});
		}
		*tree = retargeted;
	}

	/// Drop `use` leaves that import a placeholder, which no longer exists.
	fn retain_use_tree(&self, tree: &mut UseTree) -> bool {
		match tree {
			UseTree::Path(path) => self.retain_use_tree(&mut path.tree),
			UseTree::Name(name) => self.bound_at(Site::of(&name.ident)).is_none(),
			UseTree::Rename(_) | UseTree::Glob(_) => true,
			UseTree::Group(group) => {
				group.items = std::mem::take(&mut group.items)
					.into_iter()
					.filter_map(|mut tree| self.retain_use_tree(&mut tree).then_some(tree))
					.collect();
				!group.items.is_empty()
			}
		}
	}

	fn prune_imports(&self, items: &mut Vec<Item>) {
		items.retain_mut(|item| {
			match item {
				Item::Use(import) => self.retain_use_tree(&mut import.tree),
				_ => true,
			}
		});
	}

	/// Rename the symbols a format string captures inline. Captured
	/// placeholders keep their name in the literal and are collected into
	/// `bound`, to be passed as named arguments.
	fn rewrite_format_string(&self, literal: &Literal, bound: &mut Vec<(&'a str, &'a str)>) -> Literal {
		let mut renames = Vec::new();
		for capture in format_captures(literal) {
			let is_capture = self
				.symbols
				.alias_at(capture.site)
				.is_some_and(|alias| alias.kind == AliasKind::FormatArgument);
			if !is_capture {
				continue;
			}
			match self.replacement_at(capture.site) {
				Some(Replacement::Renamed(name)) => renames.push((capture.range, name)),
				Some(Replacement::Bound { formal, actual }) => {
					if !bound.iter().any(|(existing, _)| *existing == formal.as_str()) {
						bound.push((formal.as_str(), actual.as_str()));
					}
				}
				None => {}
			}
		}
		if renames.is_empty() {
			return literal.clone();
		}

		let mut text = literal.to_string();
		for (range, name) in renames.into_iter().rev() {
			text.replace_range(range, name);
		}
		match text.parse::<Literal>() {
			Ok(mut rewritten) => {
				rewritten.set_span(literal.span());
				rewritten
			}
			Err(_) => literal.clone(),
		}
	}

	/// Append `formal = actual` for every placeholder a format string in
	/// `output` captured.
	fn append_named_arguments(&mut self, output: &mut Vec<TokenTree>, bound: Vec<(&str, &str)>) {
		for (formal, actual) in bound {
			let Ok(value) = actual.parse::<TokenStream>() else {
				self.invalid(formal, actual, "as a format argument");
				continue;
			};
			if !matches!(output.last(), Some(TokenTree::Punct(punct)) if punct.as_char() == ',') {
				output.push(Punct::new(',', Spacing::Alone).into());
			}
			output.push(Ident::new(formal, Span::call_site()).into());
			output.push(Punct::new('=', Spacing::Alone).into());
			output.extend(value);
		}
	}

	fn rewrite_tokens(&mut self, tokens: TokenStream) -> TokenStream {
		let trees: Vec<TokenTree> = tokens.into_iter().collect();
		let mut output: Vec<TokenTree> = Vec::with_capacity(trees.len());
		let mut bound = Vec::new();

		for (index, tree) in trees.iter().enumerate() {
			let ident = match tree {
				TokenTree::Group(group) => {
					let mut rewritten = Group::new(group.delimiter(), self.rewrite_tokens(group.stream()));
					rewritten.set_span(group.span());
					output.push(rewritten.into());
					continue;
				}
				TokenTree::Literal(literal) => {
					output.push(self.rewrite_format_string(literal, &mut bound).into());
					continue;
				}
				TokenTree::Ident(ident) => ident,
				_ => {
					output.push(tree.clone());
					continue;
				}
			};

			let followed_by_path = matches!(
				(trees.get(index + 1), trees.get(index + 2)),
				(Some(TokenTree::Punct(first)), Some(TokenTree::Punct(second)))
					if first.as_char() == ':' && first.spacing() == Spacing::Joint && second.as_char() == ':'
			);
			let after_dollar = index
				.checked_sub(1)
				.and_then(|previous| trees.get(previous))
				.is_some_and(|previous| matches!(previous, TokenTree::Punct(punct) if punct.as_char() == '$'));

			if ident == "crate" && followed_by_path && !after_dollar {
				let retargeted = self.retarget(ident.span());
				let count = retargeted.len();
				for (position, segment) in retargeted.into_iter().enumerate() {
					output.push(segment.into());
					if position + 1 < count {
						output.push(Punct::new(':', Spacing::Joint).into());
						output.push(Punct::new(':', Spacing::Alone).into());
					}
				}
				continue;
			}

			let site = Site::of(ident);
			let replacement = match self.replacement_at(site) {
				Some(Replacement::Renamed(name)) => {
					TokenStream::from(TokenTree::Ident(Ident::new(name, ident.span())))
				}
				Some(Replacement::Bound { formal, actual }) => {
					let Some(tokens) = self.bound_tokens(site, formal, actual, followed_by_path) else {
						continue;
					};
					tokens
				}
				None => {
					output.push(tree.clone());
					continue;
				}
			};

			if self
				.symbols
				.alias_at(site)
				.is_some_and(|alias| alias.kind == AliasKind::FieldShorthand)
			{
				output.push(tree.clone());
				output.push(Punct::new(':', Spacing::Alone).into());
			}
			output.extend(replacement);
		}

		self.append_named_arguments(&mut output, bound);
		output.into_iter().collect()
	}

	fn bound_tokens(&mut self, site: Site, formal: &str, actual: &str, followed_by_path: bool) -> Option<TokenStream> {
		let tokens: TokenStream = match actual.parse() {
			Ok(tokens) => tokens,
			Err(_) => {
				self.invalid(formal, actual, "inside a macro");
				return None;
			}
		};
		let is_ident = syn::parse_str::<Ident>(actual).is_ok();

		if followed_by_path && !is_ident {
			let mut wrapped = TokenStream::new();
			wrapped.extend([TokenTree::from(Punct::new('<', Spacing::Alone))]);
			wrapped.extend(tokens);
			wrapped.extend([TokenTree::from(Punct::new('>', Spacing::Alone))]);
			return Some(wrapped);
		}
		if self.is_value_only(site) {
			let expr = self.parse_expr(formal, actual, "inside a macro")?;
			if !is_atomic(&expr) {
				return Some(TokenTree::from(Group::new(Delimiter::Parenthesis, tokens)).into());
			}
		}

		Some(tokens)
	}
}

fn is_atomic(expr: &Expr) -> bool {
	matches!(
		expr,
		Expr::Lit(_)
			| Expr::Path(_)
			| Expr::Paren(_)
			| Expr::Tuple(_)
			| Expr::Array(_)
			| Expr::Block(_)
			| Expr::Call(_)
			| Expr::MethodCall(_)
			| Expr::Macro(_)
			| Expr::Field(_)
			| Expr::Index(_)
			| Expr::Struct(_)
	)
}

fn parenthesize(expr: Expr) -> Expr {
	if is_atomic(&expr) {
		expr
	} else {
		Expr::Paren(ExprParen {
			attrs: Vec::new(),
			paren_token: syn::token::Paren::default(),
			expr: Box::new(expr),
		})
	}
}

impl VisitMut for Rewriter<'_> {
	fn visit_file_mut(&mut self, node: &mut syn::File) {
		self.prune_imports(&mut node.items);
		visit_mut::visit_file_mut(self, node);
	}

	fn visit_item_mod_mut(&mut self, node: &mut ItemMod) {
		self.visit_ident_mut(&mut node.ident);
		if let Some((_, items)) = &mut node.content {
			self.prune_imports(items);
			self.depth += 1;
			for item in items {
				self.visit_item_mut(item);
			}
			self.depth -= 1;
		}
	}

	fn visit_item_use_mut(&mut self, node: &mut ItemUse) {
		self.retarget_use_tree(&mut node.tree);
		visit_mut::visit_item_use_mut(self, node);
	}

	fn visit_visibility_mut(&mut self, _node: &mut Visibility) {}

	fn visit_member_mut(&mut self, _node: &mut Member) {}

	fn visit_ident_mut(&mut self, node: &mut Ident) {
		if let Some(Replacement::Renamed(name)) = self.replacement_at(Site::of(node)) {
			*node = Ident::new(name, node.span());
		}
	}

	fn visit_path_mut(&mut self, node: &mut syn::Path) {
		if node.leading_colon.is_none() {
			if let Some(first) = node.segments.first_mut() {
				if first.ident == "crate" && first.arguments.is_none() {
					let span = first.ident.span();
					let mut segments: Punctuated<PathSegment, Token![::]> =
						self.retarget(span).into_iter().map(PathSegment::from).collect();
					segments.extend(node.segments.iter().skip(1).cloned());
					node.segments = segments;
				}
			}
		}

		if let Some((index, formal, actual)) = self.bound_segment(node) {
			let mut qself = None;
			self.splice(&mut qself, node, index, (formal, actual), false);
			if qself.is_some() {
				self.invalid(formal, actual, "as a path");
			}
			return;
		}
		visit_mut::visit_path_mut(self, node);
	}

	fn visit_type_mut(&mut self, node: &mut Type) {
		if let Type::Path(path) = node {
			if path.qself.is_none() {
				if let Some((index, formal, actual)) = self.bound_segment(&path.path) {
					if index + 1 == path.path.segments.len() {
						if let Some(ty) = self.parse_type(formal, actual, "as a type") {
							*node = ty;
						}
					} else {
						self.splice(&mut path.qself, &mut path.path, index, (formal, actual), false);
					}
					return;
				}
			}
		}
		visit_mut::visit_type_mut(self, node);
	}

	fn visit_expr_mut(&mut self, node: &mut Expr) {
		if let Expr::Path(path) = node {
			if path.qself.is_none() {
				if let Some((index, formal, actual)) = self.bound_segment(&path.path) {
					if index + 1 == path.path.segments.len() {
						if let Some(value) = self.parse_expr(formal, actual, "as an expression") {
							*node = parenthesize(value);
						}
					} else {
						self.splice(&mut path.qself, &mut path.path, index, (formal, actual), true);
					}
					return;
				}
			}
		}
		visit_mut::visit_expr_mut(self, node);
	}

	fn visit_pat_mut(&mut self, node: &mut Pat) {
		let bound = match node {
			Pat::Ident(ident) if ident.subpat.is_none() => self.bound_at(Site::of(&ident.ident)),
			Pat::Path(path) if path.qself.is_none() && path.path.segments.len() == 1 => {
				self.bound_at(Site::of(&path.path.segments[0].ident))
			}
			_ => None,
		};
		if let Some((formal, actual)) = bound {
			match Pat::parse_single.parse_str(actual) {
				Ok(pat) => *node = pat,
				Err(_) => self.invalid(formal, actual, "as a pattern"),
			}
			return;
		}
		if let Pat::Path(path) = node {
			if self.splice_value_path(&mut path.qself, &mut path.path) {
				return;
			}
		}
		visit_mut::visit_pat_mut(self, node);
	}

	fn visit_expr_struct_mut(&mut self, node: &mut ExprStruct) {
		if self.splice_value_path(&mut node.qself, &mut node.path) {
			for field in &mut node.fields {
				self.visit_field_value_mut(field);
			}
			if let Some(rest) = &mut node.rest {
				self.visit_expr_mut(rest);
			}
			return;
		}
		visit_mut::visit_expr_struct_mut(self, node);
	}

	fn visit_pat_struct_mut(&mut self, node: &mut PatStruct) {
		if self.splice_value_path(&mut node.qself, &mut node.path) {
			for field in &mut node.fields {
				self.visit_field_pat_mut(field);
			}
			return;
		}
		visit_mut::visit_pat_struct_mut(self, node);
	}

	fn visit_pat_tuple_struct_mut(&mut self, node: &mut PatTupleStruct) {
		if self.splice_value_path(&mut node.qself, &mut node.path) {
			for elem in &mut node.elems {
				self.visit_pat_mut(elem);
			}
			return;
		}
		visit_mut::visit_pat_tuple_struct_mut(self, node);
	}

	/// `Config { capacity }` keeps its field name: `Config { capacity: new }`.
	fn visit_field_value_mut(&mut self, node: &mut FieldValue) {
		if node.colon_token.is_none() {
			if let Member::Named(member) = &node.member {
				if self.replacement_at(Site::of(member)).is_some() {
					node.colon_token = Some(Token![:](member.span()));
				}
			}
		}
		visit_mut::visit_field_value_mut(self, node);
	}

	/// `Buffer<N>` parses `N` as a type; a bound value becomes a const
	/// argument.
	fn visit_generic_argument_mut(&mut self, node: &mut GenericArgument) {
		let bound_value = match node {
			GenericArgument::Type(Type::Path(path)) if path.qself.is_none() => {
				path.path
					.get_ident()
					.map(Site::of)
					.filter(|site| self.is_value_only(*site))
					.and_then(|site| self.bound_at(site))
			}
			_ => None,
		};
		if let Some((formal, actual)) = bound_value {
			if let Some(value) = self.parse_expr(formal, actual, "as a const generic argument") {
				let value = if matches!(value, Expr::Lit(_)) {
					value
				} else {
					syn::parse_quote!({ #value })
				};
				*node = GenericArgument::Const(value);
			}
			return;
		}
		visit_mut::visit_generic_argument_mut(self, node);
	}

	fn visit_macro_mut(&mut self, node: &mut Macro) {
		self.visit_path_mut(&mut node.path);
		node.tokens = self.rewrite_tokens(std::mem::take(&mut node.tokens));
	}
}
