//! AST walkers used by the transformer: name collection, consistent
//! renaming, and the structural checks regions impose on their bodies.
//!
//! All walkers follow the same scoping conventions as the rewriter itself:
//! attribute names are opaque (only the head of a dotted chain is a
//! variable), nested `def`/`class` bodies contribute just the bound name to
//! the enclosing scope, and lambda bodies are never entered.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::span::Span;

/// Names written and read by a statement list, at the granularity the
/// data-sharing clauses need.
#[derive(Debug, Default, Clone)]
pub struct VarUse {
    pub stored: HashSet<String>,
    pub loaded: HashSet<String>,
    pub globals: HashSet<String>,
    /// Annotations seen on simple names (`x: int = ...`), keyed by name.
    pub annotations: HashMap<String, Expr>,
}

/// Collect variable usage over `stmts`.
pub fn collect_vars(stmts: &[Stmt]) -> VarUse {
    let mut use_ = VarUse::default();
    for stmt in stmts {
        collect_stmt(stmt, &mut use_);
    }
    use_
}

fn collect_stmt(stmt: &Stmt, out: &mut VarUse) {
    match stmt {
        Stmt::FunctionDef(f) => {
            out.stored.insert(f.name.clone());
            for dec in &f.decorators {
                collect_expr(dec, false, out);
            }
            // The nested body is a separate scope; only the name leaks out.
        }
        Stmt::ClassDef(c) => {
            out.stored.insert(c.name.clone());
            for dec in &c.decorators {
                collect_expr(dec, false, out);
            }
        }
        Stmt::If(s) => {
            collect_expr(&s.test, false, out);
            for st in s.body.iter().chain(&s.orelse) {
                collect_stmt(st, out);
            }
        }
        Stmt::While(s) => {
            collect_expr(&s.test, false, out);
            for st in &s.body {
                collect_stmt(st, out);
            }
        }
        Stmt::For(s) => {
            collect_expr(&s.target, true, out);
            collect_expr(&s.iter, false, out);
            for st in &s.body {
                collect_stmt(st, out);
            }
        }
        Stmt::With(s) => {
            for item in &s.items {
                collect_expr(&item.context, false, out);
                if let Some(b) = &item.binding {
                    out.stored.insert(b.clone());
                }
            }
            for st in &s.body {
                collect_stmt(st, out);
            }
        }
        Stmt::Try(s) => {
            for st in s.body.iter().chain(&s.finalbody) {
                collect_stmt(st, out);
            }
        }
        Stmt::Return(s) => {
            if let Some(v) = &s.value {
                collect_expr(v, false, out);
            }
        }
        Stmt::Yield(s) => {
            if let Some(v) = &s.value {
                collect_expr(v, false, out);
            }
        }
        Stmt::Assign(s) => {
            for t in &s.targets {
                collect_expr(t, true, out);
            }
            collect_expr(&s.value, false, out);
        }
        Stmt::AnnAssign(s) => {
            collect_expr(&s.target, true, out);
            if let Expr::Name(n) = &s.target {
                out.annotations.insert(n.id.clone(), s.annotation.clone());
            }
            if let Some(v) = &s.value {
                collect_expr(v, false, out);
            }
        }
        Stmt::AugAssign(s) => {
            // An augmented target is both read and written.
            collect_expr(&s.target, true, out);
            collect_expr(&s.target, false, out);
            collect_expr(&s.value, false, out);
        }
        Stmt::Expr(s) => collect_expr(&s.value, false, out),
        Stmt::Delete(s) => {
            for t in &s.targets {
                collect_expr(t, true, out);
            }
        }
        Stmt::Global(s) => {
            for n in &s.names {
                out.globals.insert(n.clone());
            }
        }
        Stmt::Nonlocal(s) => {
            for n in &s.names {
                out.stored.insert(n.clone());
            }
        }
        Stmt::Import(s) => {
            for alias in &s.names {
                out.stored.insert(alias.bound_name().to_string());
            }
        }
        Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn collect_expr(expr: &Expr, store: bool, out: &mut VarUse) {
    match expr {
        Expr::Name(n) => {
            if store {
                out.stored.insert(n.id.clone());
            } else {
                out.loaded.insert(n.id.clone());
            }
        }
        // Attribute chains: only the base object is a variable reference.
        Expr::Attribute(a) => collect_expr(&a.value, false, out),
        Expr::Call(c) => {
            collect_expr(&c.func, false, out);
            for a in &c.args {
                collect_expr(a, false, out);
            }
        }
        Expr::Subscript(s) => {
            // `x[i] = v` reads `x` (and `i`) rather than rebinding it.
            collect_expr(&s.value, false, out);
            collect_expr(&s.index, false, out);
        }
        Expr::Constant(_) => {}
        Expr::Tuple(t) | Expr::List(t) => {
            for e in &t.elts {
                collect_expr(e, store, out);
            }
        }
        Expr::BinOp(b) => {
            collect_expr(&b.left, false, out);
            collect_expr(&b.right, false, out);
        }
        Expr::BoolOp(b) => {
            for v in &b.values {
                collect_expr(v, false, out);
            }
        }
        Expr::UnaryOp(u) => collect_expr(&u.operand, false, out),
        Expr::Compare(c) => {
            collect_expr(&c.left, false, out);
            for e in &c.comparators {
                collect_expr(e, false, out);
            }
        }
        Expr::IfExp(e) => {
            collect_expr(&e.test, false, out);
            collect_expr(&e.body, false, out);
            collect_expr(&e.orelse, false, out);
        }
        Expr::Lambda(_) => {}
    }
}

/// Rewrite every reference to a key of `names` into its mapped name,
/// including `nonlocal` lists and import aliases. Attribute names and
/// lambda bodies stay untouched.
pub fn rename(stmts: &mut [Stmt], names: &HashMap<String, String>) {
    for stmt in stmts {
        rename_stmt(stmt, names);
    }
}

fn rename_stmt(stmt: &mut Stmt, names: &HashMap<String, String>) {
    match stmt {
        Stmt::FunctionDef(f) => {
            if let Some(n) = names.get(&f.name) {
                f.name = n.clone();
            }
            for dec in &mut f.decorators {
                rename_expr(dec, names);
            }
            for p in &mut f.params {
                if let Some(n) = names.get(&p.name) {
                    p.name = n.clone();
                }
            }
            rename(&mut f.body, names);
        }
        Stmt::ClassDef(c) => {
            if let Some(n) = names.get(&c.name) {
                c.name = n.clone();
            }
            for dec in &mut c.decorators {
                rename_expr(dec, names);
            }
            rename(&mut c.body, names);
        }
        Stmt::If(s) => {
            rename_expr(&mut s.test, names);
            rename(&mut s.body, names);
            rename(&mut s.orelse, names);
        }
        Stmt::While(s) => {
            rename_expr(&mut s.test, names);
            rename(&mut s.body, names);
        }
        Stmt::For(s) => {
            rename_expr(&mut s.target, names);
            rename_expr(&mut s.iter, names);
            rename(&mut s.body, names);
        }
        Stmt::With(s) => {
            for item in &mut s.items {
                rename_expr(&mut item.context, names);
                if let Some(b) = &mut item.binding {
                    if let Some(n) = names.get(b.as_str()) {
                        *b = n.clone();
                    }
                }
            }
            rename(&mut s.body, names);
        }
        Stmt::Try(s) => {
            rename(&mut s.body, names);
            rename(&mut s.finalbody, names);
        }
        Stmt::Return(s) => {
            if let Some(v) = &mut s.value {
                rename_expr(v, names);
            }
        }
        Stmt::Yield(s) => {
            if let Some(v) = &mut s.value {
                rename_expr(v, names);
            }
        }
        Stmt::Assign(s) => {
            for t in &mut s.targets {
                rename_expr(t, names);
            }
            rename_expr(&mut s.value, names);
        }
        Stmt::AnnAssign(s) => {
            rename_expr(&mut s.target, names);
            if let Some(v) = &mut s.value {
                rename_expr(v, names);
            }
        }
        Stmt::AugAssign(s) => {
            rename_expr(&mut s.target, names);
            rename_expr(&mut s.value, names);
        }
        Stmt::Expr(s) => rename_expr(&mut s.value, names),
        Stmt::Delete(s) => {
            for t in &mut s.targets {
                rename_expr(t, names);
            }
        }
        Stmt::Global(s) | Stmt::Nonlocal(s) => {
            for n in &mut s.names {
                if let Some(new) = names.get(n.as_str()) {
                    *n = new.clone();
                }
            }
        }
        Stmt::Import(s) => {
            for alias in &mut s.names {
                match &mut alias.asname {
                    Some(a) => {
                        if let Some(new) = names.get(a.as_str()) {
                            *a = new.clone();
                        }
                    }
                    None => {
                        if let Some(new) = names.get(&alias.name) {
                            alias.asname = Some(new.clone());
                        }
                    }
                }
            }
        }
        Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn rename_expr(expr: &mut Expr, names: &HashMap<String, String>) {
    match expr {
        Expr::Name(n) => {
            if let Some(new) = names.get(&n.id) {
                n.id = new.clone();
            }
        }
        Expr::Attribute(a) => rename_expr(&mut a.value, names),
        Expr::Call(c) => {
            rename_expr(&mut c.func, names);
            for a in &mut c.args {
                rename_expr(a, names);
            }
        }
        Expr::Subscript(s) => {
            rename_expr(&mut s.value, names);
            rename_expr(&mut s.index, names);
        }
        Expr::Constant(_) => {}
        Expr::Tuple(t) | Expr::List(t) => {
            for e in &mut t.elts {
                rename_expr(e, names);
            }
        }
        Expr::BinOp(b) => {
            rename_expr(&mut b.left, names);
            rename_expr(&mut b.right, names);
        }
        Expr::BoolOp(b) => {
            for v in &mut b.values {
                rename_expr(v, names);
            }
        }
        Expr::UnaryOp(u) => rename_expr(&mut u.operand, names),
        Expr::Compare(c) => {
            rename_expr(&mut c.left, names);
            for e in &mut c.comparators {
                rename_expr(e, names);
            }
        }
        Expr::IfExp(e) => {
            rename_expr(&mut e.test, names);
            rename_expr(&mut e.body, names);
            rename_expr(&mut e.orelse, names);
        }
        Expr::Lambda(_) => {}
    }
}

/// Kinds of statements a parallel region body may not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    Return,
    Yield,
}

/// Find a `return` or `yield` that would escape a lifted region. Nested
/// `def`/`class` bodies are their own scopes and are skipped.
pub fn find_escape(stmts: &[Stmt]) -> Option<(EscapeKind, Span)> {
    for stmt in stmts {
        let found = match stmt {
            Stmt::Return(r) => Some((EscapeKind::Return, r.span)),
            Stmt::Yield(y) => Some((EscapeKind::Yield, y.span)),
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => None,
            Stmt::If(s) => find_escape(&s.body).or_else(|| find_escape(&s.orelse)),
            Stmt::While(s) => find_escape(&s.body),
            Stmt::For(s) => find_escape(&s.body),
            Stmt::With(s) => find_escape(&s.body),
            Stmt::Try(s) => find_escape(&s.body).or_else(|| find_escape(&s.finalbody)),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Find a `break` that would terminate the *enclosing* loop: recursion stops
/// at nested loops (their `break`s are theirs) and at nested scopes.
pub fn find_loop_break(stmts: &[Stmt]) -> Option<Span> {
    for stmt in stmts {
        let found = match stmt {
            Stmt::Break(sp) => Some(*sp),
            Stmt::If(s) => find_loop_break(&s.body).or_else(|| find_loop_break(&s.orelse)),
            Stmt::With(s) => find_loop_break(&s.body),
            Stmt::Try(s) => {
                find_loop_break(&s.body).or_else(|| find_loop_break(&s.finalbody))
            }
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SourceFile;
    use crate::parser::parse_module;

    fn body(src: &str) -> Vec<Stmt> {
        parse_module(&SourceFile::new("t.py", src)).unwrap().body
    }

    #[test]
    fn collect_loads_and_stores() {
        let stmts = body("x = y + 1\nq.put(x)\nz[0] = x\n");
        let vars = collect_vars(&stmts);
        assert!(vars.stored.contains("x"));
        assert!(vars.loaded.contains("y"));
        assert!(vars.loaded.contains("q"));
        // subscript store reads the base
        assert!(vars.loaded.contains("z"));
        assert!(!vars.stored.contains("z"));
        // attribute name is not a variable
        assert!(!vars.loaded.contains("put"));
    }

    #[test]
    fn nested_def_contributes_only_its_name() {
        let stmts = body("def g():\n    hidden = 1\n");
        let vars = collect_vars(&stmts);
        assert!(vars.stored.contains("g"));
        assert!(!vars.stored.contains("hidden"));
    }

    #[test]
    fn rename_rewrites_nonlocal_lists() {
        let mut stmts = body("def g():\n    nonlocal x\n    x = x + 1\n");
        let map = HashMap::from([("x".to_string(), "_omp_1x".to_string())]);
        rename(&mut stmts, &map);
        let out = crate::unparse::unparse_stmts(&stmts);
        assert!(out.contains("nonlocal _omp_1x"));
        assert!(out.contains("_omp_1x = _omp_1x + 1"));
        assert!(!out.contains("nonlocal x\n"));
    }

    #[test]
    fn find_escape_skips_nested_functions() {
        let stmts = body("def g():\n    return 2\nx = g()\n");
        assert!(find_escape(&stmts).is_none());
        let stmts = body("if a:\n    return 2\n");
        assert!(matches!(find_escape(&stmts), Some((EscapeKind::Return, _))));
    }

    #[test]
    fn break_binding_respects_inner_loops() {
        let stmts = body("for j in range(3):\n    break\n");
        // the break belongs to the inner loop, not the one we guard
        let Stmt::For(f) = &stmts[0] else { panic!() };
        assert!(find_loop_break(&f.body).is_some());
        let stmts = body("while a:\n    break\n");
        assert!(find_loop_break(&stmts).is_none());
    }
}
