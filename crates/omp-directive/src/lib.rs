//! omp-directive: the directive grammar for rompy.
//!
//! Splits a directive string (`"parallel for schedule(static, 2)"`) into
//! tokens, validates it against the declarative schema, and produces the
//! parsed item tree the AST rewriter consumes. The crate is pure: no
//! runtime, no AST rewriting, just grammar.

pub mod argsparser;
pub mod directive;
pub mod names;
pub mod schema;
pub mod tokenizer;

pub use argsparser::{ItemValue, OmpArgs, OmpItem};
pub use directive::{parse_line, OmpClause, OmpDirective};
pub use schema::{ArgSpec, ClauseSpec, DirectiveSpec, ItemFlags, ItemTransform, ModifierSpec};
