//! `rstemplate_core` is the engine behind [rstemplate](https://docs.rs/rstemplate_cli). It turns a generic Rust source module (a template) into a concrete module for one set of type or value arguments, renaming every top-level item so several instantiations can live side by side.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template module (.rs)
//!   → Directive scanner (finds `// template type Set(A)`)
//!   → Semantic loader (parses with syn, resolves every identifier to a symbol)
//!   → Parameter binder (formal parameters ↔ actual arguments)
//!   → Declaration classifier (eliminate placeholders, mangle the rest, spot tests)
//!   → Rewriter (applies the substitution map to definitions, uses and aliases)
//!   → Format injector (fills `// template format` stubs from a fixed catalog)
//!   → Emitter (prettyplease, header, write only when the bytes change)
//! ```
//!
//! ## Template Language
//!
//! ```rust,ignore
//! // template type Set(A)
//!
//! type A = u32;
//!
//! pub type SetItems = Vec<A>;
//!
//! pub struct Set {
//! 	items: SetItems,
//! }
//! ```
//!
//! Instantiating it as `mySet(String)` removes `A`, replaces every use of it
//! with `String`, and renames `Set` to `mySet` and `SetItems` to `mySetItems`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rstemplate_core::InstantiateOptions;
//! use rstemplate_core::InstantiationRequest;
//! use rstemplate_core::instantiate;
//! use rstemplate_core::write_instantiations;
//! use std::path::Path;
//!
//! let request = InstantiationRequest::parse("mySet(String)").unwrap();
//! let instantiation = instantiate(
//! 	Path::new("templates/set.rs"),
//! 	&request,
//! 	Path::new("src"),
//! 	&InstantiateOptions::default(),
//! )
//! .unwrap();
//! write_instantiations(&[instantiation]).unwrap();
//! ```

pub use binder::*;
pub use classify::*;
pub use config::*;
pub use directive::*;
pub use emit::*;
pub use engine::*;
pub use error::*;
pub use loader::*;
pub use mangle::*;
pub use project::*;
pub use request::*;

mod binder;
mod classify;
pub mod config;
mod directive;
mod emit;
mod engine;
#[allow(unused_assignments)]
mod error;
pub mod format;
mod loader;
mod mangle;
pub mod project;
mod request;
pub mod rewrite;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
