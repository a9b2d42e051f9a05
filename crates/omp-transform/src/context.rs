//! Transform-time context threaded through the rewriter and processors.

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use omp_frontend::ast::{build, Const, Expr, Stmt};
use omp_frontend::diag::{SourceFile, SyntaxError};
use omp_frontend::span::Span;

use crate::reduction::{builtin_templates, Template};
use crate::symtab::Variables;

/// Name the lowered code uses to reach the runtime bindings.
pub const RUNTIME: &str = "__omp";

/// Prefix for generated helper names (`__omp_parallel`, `__omp_bounds`, …).
pub const GEN_PREFIX: &str = "__omp_";

/// Prefix for renamed user variables (`_omp_1x`).
pub const VAR_PREFIX: &str = "_omp_";

pub struct NodeContext<'a> {
    pub src: &'a SourceFile,
    /// Name the user imported the directive function under.
    pub alias: String,
    pub variables: Variables,
    pub threadprivate: HashSet<String>,
    pub reductions: HashMap<String, Template>,
    /// Span of the directive string currently being lowered; synthesized
    /// nodes inherit it.
    pub directive_span: Span,
    /// Enclosing rewriter stack, innermost last: (node kind, span).
    pub stack: Vec<(&'static str, Span)>,
    /// Induction variable of the innermost work-shared loop, for `ordered`.
    pub ordered_iter: Option<String>,
    id_gen: HashMap<String, u32>,
    var_gen: HashMap<String, u32>,
}

impl<'a> NodeContext<'a> {
    pub fn new(src: &'a SourceFile, alias: impl Into<String>) -> Self {
        Self {
            src,
            alias: alias.into(),
            variables: Variables::new(),
            threadprivate: HashSet::new(),
            reductions: builtin_templates(),
            directive_span: Span::default(),
            stack: Vec::new(),
            ordered_iter: None,
            id_gen: HashMap::new(),
            var_gen: HashMap::new(),
        }
    }

    pub fn error(&self, msg: impl Into<String>, span: Span) -> SyntaxError {
        self.src.error(msg, span)
    }

    /// Fresh generated name: `__omp_parallel`, then `__omp_parallel_1`, …
    pub fn new_id(&mut self, base: &str) -> String {
        let n = self.id_gen.entry(base.to_string()).or_insert(0);
        let name = if *n == 0 {
            format!("{GEN_PREFIX}{base}")
        } else {
            format!("{GEN_PREFIX}{base}_{n}")
        };
        *n += 1;
        name
    }

    /// Fresh rename for a user variable, recorded in the scope:
    /// `x` → `_omp_1x`, then `_omp_2x`, …
    pub fn new_variable(&mut self, name: &str) -> String {
        let n = self.var_gen.entry(name.to_string()).or_insert(0);
        *n += 1;
        let new = format!("{VAR_PREFIX}{n}{name}");
        self.variables.record_rename(name, &new);
        new
    }

    /// Call into the runtime binding namespace: `__omp.<name>(args)`.
    pub fn rt_call(&self, name: &str, args: Vec<Expr>) -> Expr {
        build::call(&format!("{RUNTIME}.{name}"), args, self.directive_span)
    }

    pub fn rt_stmt(&self, name: &str, args: Vec<Expr>) -> Stmt {
        build::expr_stmt(self.rt_call(name, args), self.directive_span)
    }

    /// Wrap `expr` in an `int(...)` / `bool(...)` conversion unless it is
    /// already a constant of that kind.
    pub fn cast_expression(&self, target: &str, expr: Expr) -> Expr {
        if let Expr::Constant(c) = &expr {
            let already = match target {
                "int" => matches!(c.value, Const::Int(_)),
                "bool" => matches!(c.value, Const::Bool(_)),
                _ => false,
            };
            if already {
                return expr;
            }
        }
        build::call(target, vec![expr], self.directive_span)
    }

    /// Is this expression head the directive-marker function? Any of: the
    /// canonical name, the user's alias, or an attribute chain ending in
    /// either (`mylib.omp`).
    pub fn is_omp(&self, expr: &Expr) -> bool {
        let tail = match expr {
            Expr::Call(c) => c.func.tail_name(),
            other => other.tail_name(),
        };
        matches!(tail, Some(name) if name == self.alias || name == "omp")
    }
}
