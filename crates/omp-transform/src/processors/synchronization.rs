//! Synchronization processors: `barrier`, `critical`, `atomic`, `master`,
//! `ordered`.

use omp_frontend::ast::{build, Expr, If, Stmt};
use omp_frontend::walk::collect_vars;

use omp_directive::OmpDirective;

use super::*;
use crate::context::NodeContext;
use crate::rewriter::rewrite_stmts;

pub fn barrier(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_nobody(ctx, dir, &body)?;
    Ok(vec![ctx.rt_stmt("barrier", vec![])])
}

pub fn critical(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    let body = rewrite_stmts(ctx, body)?;
    Ok(mutex_guard(ctx, body))
}

/// `atomic` admits exactly one augmented assignment whose right-hand side
/// does not mention the updated variable; it lowers to a mutex-guarded
/// update.
pub fn atomic(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    if body.len() > 1 {
        return Err(ctx.error(
            "`atomic` takes a single augmented assignment",
            body[1].span(),
        ));
    }
    let Stmt::AugAssign(aug) = &body[0] else {
        return Err(ctx.error(
            "`atomic` takes a single augmented assignment",
            body[0].span(),
        ));
    };
    let target_name = match &aug.target {
        Expr::Name(name) => name.id.clone(),
        Expr::Subscript(sub) => match sub.value.as_ref() {
            Expr::Name(name) => name.id.clone(),
            other => {
                return Err(ctx.error("`atomic` target must be a local variable", other.span()));
            }
        },
        other => {
            return Err(ctx.error("`atomic` target must be a local variable", other.span()));
        }
    };
    let value_stmt = [build::expr_stmt(aug.value.clone(), aug.span)];
    let used = collect_vars(&value_stmt);
    if used.loaded.contains(&target_name) {
        return Err(ctx.error(
            "`atomic` expression must not reference the updated variable",
            aug.value.span(),
        ));
    }
    Ok(mutex_guard(ctx, body))
}

pub fn master(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    let body = rewrite_stmts(ctx, body)?;
    Ok(vec![Stmt::If(If {
        test: ctx.rt_call("master", vec![]),
        body,
        orelse: vec![],
        span: ctx.directive_span,
    })])
}

/// `ordered` wraps its body between sequence-point calls keyed by the
/// enclosing loop's induction variable.
pub fn ordered(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    let Some(iter_var) = ctx.ordered_iter.clone() else {
        return Err(ctx.error(
            "`ordered` must be nested in a work-shared loop with an `ordered` clause",
            dir.span,
        ));
    };
    let body = rewrite_stmts(ctx, body)?;
    let span = ctx.directive_span;
    Ok(vec![
        ctx.rt_stmt("ordered_start", vec![build::name(&iter_var, span)]),
        build::try_finally(body, vec![ctx.rt_stmt("ordered_end", vec![])], span),
    ])
}
