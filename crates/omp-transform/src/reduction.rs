//! Reduction templates.
//!
//! A template is a pair of statement fragments written in terms of the
//! placeholder names `omp_priv`/`omp_orig` (initialization) and
//! `omp_in`/`omp_out` (combination). Instantiation clones the fragments and
//! renames the placeholders to the region's private binding and the
//! original one. `declare reduction` adds user entries, optionally
//! qualified by a type name (`int.myop` beats `myop` when the reduced
//! variable carries a matching annotation).

use std::collections::HashMap as StdHashMap;

use ahash::{HashMap, HashMapExt};
use omp_frontend::ast::{build, BinOpKind, BoolOp, BoolOpKind, Const, Expr, Stmt};
use omp_frontend::span::Span;
use omp_frontend::walk::rename;

#[derive(Debug, Clone)]
pub struct Template {
    pub init: Vec<Stmt>,
    pub combine: Vec<Stmt>,
}

fn placeholder(name: &str) -> Expr {
    build::name(name, Span::default())
}

fn symbol_template(op: BinOpKind, neutral: Const) -> Template {
    let init = vec![build::assign(
        placeholder("omp_priv"),
        build::constant(neutral, Span::default()),
        Span::default(),
    )];
    let combine = vec![build::aug_assign(
        placeholder("omp_out"),
        op,
        placeholder("omp_in"),
        Span::default(),
    )];
    Template { init, combine }
}

fn bool_template(op: BoolOpKind, neutral: bool) -> Template {
    let init = vec![build::assign(
        placeholder("omp_priv"),
        build::bool_(neutral, Span::default()),
        Span::default(),
    )];
    let combine = vec![build::assign(
        placeholder("omp_out"),
        Expr::BoolOp(BoolOp {
            op,
            values: vec![placeholder("omp_out"), placeholder("omp_in")],
            span: Span::default(),
        }),
        Span::default(),
    )];
    Template { init, combine }
}

/// Canonical table key for a reduction operator token.
pub fn op_key(token: &str) -> String {
    match token {
        "&&" => "and".to_string(),
        "||" => "or".to_string(),
        other => other.to_string(),
    }
}

pub fn builtin_templates() -> HashMap<String, Template> {
    let mut table = HashMap::new();
    table.insert("+".to_string(), symbol_template(BinOpKind::Add, Const::Int(0)));
    table.insert("-".to_string(), symbol_template(BinOpKind::Sub, Const::Int(0)));
    table.insert("*".to_string(), symbol_template(BinOpKind::Mul, Const::Int(1)));
    table.insert(
        "&".to_string(),
        symbol_template(BinOpKind::BitAnd, Const::Int(-1)),
    );
    table.insert("|".to_string(), symbol_template(BinOpKind::BitOr, Const::Int(0)));
    table.insert("^".to_string(), symbol_template(BinOpKind::BitXor, Const::Int(0)));
    table.insert("and".to_string(), bool_template(BoolOpKind::And, true));
    table.insert("or".to_string(), bool_template(BoolOpKind::Or, false));
    table
}

/// Instantiate the initializer: statements binding `priv_name` from
/// `orig_name`'s neutral element (or the user initializer's recipe).
pub fn instantiate_init(template: &Template, priv_name: &str, orig_name: &str, span: Span) -> Vec<Stmt> {
    instantiate(
        &template.init,
        &[("omp_priv", priv_name), ("omp_orig", orig_name)],
        span,
    )
}

/// Instantiate the combiner: statements folding `priv_name` into
/// `orig_name`.
pub fn instantiate_combine(
    template: &Template,
    priv_name: &str,
    orig_name: &str,
    span: Span,
) -> Vec<Stmt> {
    instantiate(
        &template.combine,
        &[("omp_in", priv_name), ("omp_out", orig_name)],
        span,
    )
}

fn instantiate(fragment: &[Stmt], map: &[(&str, &str)], span: Span) -> Vec<Stmt> {
    let mut stmts = fragment.to_vec();
    let renames: StdHashMap<String, String> = map
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    rename(&mut stmts, &renames);
    respan(&mut stmts, span);
    stmts
}

fn respan(stmts: &mut [Stmt], span: Span) {
    // Positions on synthesized fragments point at the directive so any
    // later diagnostic lands on user source.
    for stmt in stmts {
        match stmt {
            Stmt::Assign(s) => s.span = span,
            Stmt::AugAssign(s) => s.span = span,
            Stmt::Expr(s) => s.span = span,
            Stmt::If(s) => s.span = span,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omp_frontend::unparse::unparse_stmts;

    #[test]
    fn add_template_instantiates() {
        let table = builtin_templates();
        let t = &table["+"];
        let init = instantiate_init(t, "_omp_1x", "x", Span::default());
        assert_eq!(unparse_stmts(&init), "_omp_1x = 0\n");
        let combine = instantiate_combine(t, "_omp_1x", "x", Span::default());
        assert_eq!(unparse_stmts(&combine), "x += _omp_1x\n");
    }

    #[test]
    fn or_template_uses_bool_fold() {
        let table = builtin_templates();
        let t = &table["or"];
        let init = instantiate_init(t, "p", "x", Span::default());
        assert_eq!(unparse_stmts(&init), "p = False\n");
        let combine = instantiate_combine(t, "p", "x", Span::default());
        assert_eq!(unparse_stmts(&combine), "x = x or p\n");
    }

    #[test]
    fn operator_aliases_fold_to_word_forms() {
        assert_eq!(op_key("&&"), "and");
        assert_eq!(op_key("||"), "or");
        assert_eq!(op_key("+"), "+");
        assert_eq!(op_key("myop"), "myop");
    }
}
