//! omp-frontend: the host-language front end for rompy.
//!
//! Owns everything below the directive layer: source files and spans,
//! tokens, the indentation-aware lexer, the AST and its parser, the
//! canonical unparser, spanned syntax diagnostics, and the AST walkers the
//! transformer builds on. Nothing in this crate knows what a directive is.

pub mod ast;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod unparse;
pub mod walk;

pub use ast::{Expr, Module, Stmt};
pub use diag::{SourceFile, SyntaxError};
pub use span::{LineCol, LineMap, Span};
pub use token::{Token, TokenKind};
