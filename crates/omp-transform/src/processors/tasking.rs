//! Tasking processors: `task` and `taskwait`.

use ahash::{HashSet, HashSetExt};
use omp_directive::names as n;
use omp_directive::{OmpClause, OmpDirective};
use omp_frontend::ast::{build, Stmt};

use super::*;
use crate::context::NodeContext;
use crate::rewriter::rewrite_stmts;

pub fn task(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    super::parallelism::check_escape(ctx, &body)?;
    let outer = ctx.variables.snapshot();
    let loads_before = captured_refs(ctx, &outer, &body);

    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut default_kind = n::K_SHARED;
    let mut c_if = build::bool_(true, ctx.directive_span);

    for clause in clauses {
        match clause.name() {
            n::C_IF => c_if = ctx.cast_expression("bool", clause_expr(clause)),
            // Tied/untied scheduling makes no difference here; accepted and
            // ignored.
            n::C_UNTIED => {}
            n::C_SHARED => {
                data_add(ctx, &mut scope, clause, true)?;
                for (name, item) in clause_vars(clause) {
                    if ctx.variables.final_name(&name) != name {
                        return Err(ctx.error(
                            format!(
                                "`{name}` is private in the enclosing construct and cannot be shared"
                            ),
                            item.span(),
                        ));
                    }
                }
            }
            n::C_PRIVATE => {
                let names = data_add(ctx, &mut scope, clause, false)?;
                let (h, _) = data_rename(ctx, &mut body, &names, RenameInit::Fresh);
                header.extend(h);
            }
            n::C_FIRSTPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                let (h, _) = data_rename(ctx, &mut body, &names, RenameInit::CopyOuter);
                header.extend(h);
            }
            n::C_DEFAULT => {
                if let omp_directive::ItemValue::Ident(k) = &clause.args().items[0].value {
                    default_kind = match k.as_str() {
                        n::K_NONE => n::K_NONE,
                        n::K_PRIVATE => n::K_PRIVATE,
                        n::K_FIRSTPRIVATE => n::K_FIRSTPRIVATE,
                        _ => n::K_SHARED,
                    };
                }
            }
            _ => {}
        }
    }

    let unclassified: Vec<String> = loads_before
        .iter()
        .filter(|name| !scope.contains(name.as_str()))
        .cloned()
        .collect();
    match default_kind {
        n::K_NONE => {
            if let Some(name) = unclassified.first() {
                return Err(ctx.error(
                    format!("`{name}` not specified in enclosing `task`"),
                    dir.span,
                ));
            }
        }
        n::K_PRIVATE => {
            let (h, _) = data_rename(ctx, &mut body, &unclassified, RenameInit::Fresh);
            header.extend(h);
        }
        n::K_FIRSTPRIVATE => {
            let (h, _) = data_rename(ctx, &mut body, &unclassified, RenameInit::CopyOuter);
            header.extend(h);
        }
        _ => {}
    }

    let body = rewrite_stmts(ctx, body)?;
    let mut stmts = header;
    stmts.extend(body);
    let fname = ctx.new_id("task");
    let func = assemble_function(ctx, fname.clone(), &outer, stmts);

    let call = ctx.rt_call(
        "task_submit",
        vec![build::name(&fname, ctx.directive_span), c_if],
    );

    ctx.variables = outer;
    Ok(vec![
        Stmt::FunctionDef(func),
        build::expr_stmt(call, ctx.directive_span),
    ])
}

pub fn taskwait(ctx: &mut NodeContext, dir: &OmpDirective, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
    check_nobody(ctx, dir, &body)?;
    Ok(vec![ctx.rt_stmt("task_wait", vec![])])
}
