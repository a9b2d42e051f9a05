//! Declarative directives: `threadprivate` and `declare reduction`.
//!
//! Neither produces code; both update transform-time state that later
//! regions consult.

use omp_directive::names as n;
use omp_directive::{ItemValue, OmpDirective};
use omp_frontend::ast::Stmt;

use super::*;
use crate::context::NodeContext;
use crate::reduction::{op_key, Template};

/// `threadprivate(x, y)`: mark names so each worker sees an independent
/// binding inside regions.
pub fn threadprivate(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_nobody(ctx, dir, &body)?;
    let args = dir
        .args
        .as_ref()
        .expect("schema requires threadprivate arguments");
    for item in &args.items {
        let name = item
            .ident()
            .ok_or_else(|| ctx.error("identifier expected", item.span()))?;
        ctx.threadprivate.insert(name.to_string());
    }
    Ok(Vec::new())
}

/// `declare reduction(op[: types]) initializer(...) combiner(...)`: add a
/// user template to the reduction table, optionally qualified per type.
pub fn declare_reduction(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_nobody(ctx, dir, &body)?;
    let args = dir
        .args
        .as_ref()
        .expect("schema requires declare reduction arguments");
    let op = args
        .modifier(n::M_REDUCTION_ID)
        .expect("schema requires the reduction identifier");
    let ItemValue::Token(op_token) = &op.value else {
        unreachable!("reduction identifier is a raw token")
    };
    let key = op_key(op_token);

    let init = stmts_of(ctx, dir, n::C_INITIALIZER)?;
    let combine = stmts_of(ctx, dir, n::C_COMBINER)?;
    let template = Template { init, combine };

    let types: Vec<String> = args
        .items
        .iter()
        .filter_map(|i| i.ident().map(str::to_string))
        .collect();
    if types.is_empty() {
        ctx.reductions.insert(key, template);
    } else {
        for ty in types {
            ctx.reductions
                .insert(format!("{ty}.{key}"), template.clone());
        }
    }
    Ok(Vec::new())
}

fn stmts_of(ctx: &NodeContext, dir: &OmpDirective, clause: &str) -> Result<Vec<Stmt>> {
    let c = dir
        .clause(clause)
        .expect("schema requires this clause");
    match &c.args().items[0].value {
        ItemValue::Stmts(stmts) => Ok(stmts.clone()),
        _ => Err(ctx.error("statement expected", c.span())),
    }
}
