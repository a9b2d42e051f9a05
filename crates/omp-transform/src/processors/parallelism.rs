//! `parallel` and `teams` processors.

use ahash::{HashSet, HashSetExt};
use omp_directive::names as n;
use omp_directive::{OmpClause, OmpDirective};
use omp_frontend::ast::{build, Expr, ExprList, Stmt};
use omp_frontend::walk::{find_escape, EscapeKind};

use super::*;
use crate::context::NodeContext;
use crate::rewriter::rewrite_stmts;

pub fn parallel(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    check_escape(ctx, &body)?;
    let outer = ctx.variables.snapshot();
    let refs_before = captured_refs(ctx, &outer, &body);

    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut footer: Vec<Stmt> = Vec::new();
    let mut default_kind = n::K_SHARED;
    let mut c_if = build::bool_(true, ctx.directive_span);
    let mut c_message = build::str_("", ctx.directive_span);
    let mut c_safesync = build::int(-1, ctx.directive_span);
    let mut c_severity = build::str_(n::K_FATAL, ctx.directive_span);
    let mut nthreads: Vec<Expr> = Vec::new();
    let mut copyin_names: Vec<String> = Vec::new();

    for clause in clauses {
        match clause.name() {
            n::C_SHARED => {
                data_add(ctx, &mut scope, clause, true)?;
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
            n::C_REDUCTION => {
                reduction_setup(ctx, clause, &mut scope, &mut body, &mut header, &mut footer)?;
            }
            n::C_COPYIN => {
                let names = data_add(ctx, &mut scope, clause, false)?;
                for name in names {
                    if !ctx.threadprivate.contains(&name) {
                        return Err(ctx.error(
                            format!("`{name}` must be declared threadprivate to appear in `copyin`"),
                            clause.span(),
                        ));
                    }
                    copyin_names.push(name);
                }
            }
            n::C_DEFAULT => {
                default_kind = match &clause.args().items[0].value {
                    omp_directive::ItemValue::Ident(k) => match k.as_str() {
                        n::K_NONE => n::K_NONE,
                        n::K_PRIVATE => n::K_PRIVATE,
                        n::K_FIRSTPRIVATE => n::K_FIRSTPRIVATE,
                        _ => n::K_SHARED,
                    },
                    _ => n::K_SHARED,
                };
            }
            n::C_IF => c_if = ctx.cast_expression("bool", clause_expr(clause)),
            n::C_NUM_THREADS => {
                for item in &clause.args().items {
                    let expr = item.value.as_expr().cloned().expect("expression item");
                    nthreads.push(ctx.cast_expression("int", expr));
                }
            }
            n::C_MESSAGE => c_message = clause_expr(clause),
            n::C_SEVERITY => {
                if let omp_directive::ItemValue::Ident(k) = &clause.args().items[0].value {
                    c_severity = build::str_(k.clone(), ctx.directive_span);
                }
            }
            n::C_SAFESYNC => {
                if let Some(args) = &clause.args {
                    c_safesync = args.items[0].value.as_expr().cloned().expect("expression");
                }
            }
            n::C_PROC_BIND | n::C_ALLOCATE => {
                return Err(clause_not_implemented(ctx, clause));
            }
            _ => {}
        }
    }

    // Thread-private names referenced in the region get a per-worker
    // binding seeded from thread-private storage (or the master's current
    // value under `copyin`). They are looked up in the raw body: a
    // threadprivate name has no binding in the enclosing scope.
    let body_vars = omp_frontend::walk::collect_vars(&body);
    let mut tp_referenced: Vec<String> = body_vars
        .loaded
        .iter()
        .chain(body_vars.stored.iter())
        .filter(|name| ctx.threadprivate.contains(name.as_str()))
        .cloned()
        .collect();
    for name in &copyin_names {
        if !tp_referenced.contains(name) {
            tp_referenced.push(name.clone());
        }
    }
    tp_referenced.sort();
    tp_referenced.dedup();
    for name in &tp_referenced {
        let with_copyin = copyin_names.contains(name);
        let old = ctx.variables.final_name(name);
        let fallback = if ctx.variables.contains(&old) {
            build::name(&old, ctx.directive_span)
        } else {
            build::constant(omp_frontend::ast::Const::None, ctx.directive_span)
        };
        let new = ctx.new_variable(name);
        let init = if with_copyin { "copyin" } else { "tp_init" };
        header.push(build::assign(
            build::name(&new, ctx.directive_span),
            ctx.rt_call(
                init,
                vec![build::str_(name.clone(), ctx.directive_span), fallback],
            ),
            ctx.directive_span,
        ));
        footer.push(ctx.rt_stmt(
            "tp_store",
            vec![
                build::str_(name.clone(), ctx.directive_span),
                build::name(&new, ctx.directive_span),
            ],
        ));
        let mapping = std::collections::HashMap::from([(old, new)]);
        omp_frontend::walk::rename(&mut body, &mapping);
    }

    // Data-sharing defaults apply to captured outer names not otherwise
    // classified.
    let unclassified: Vec<String> = refs_before
        .iter()
        .filter(|name| !scope.contains(name.as_str()) && !ctx.threadprivate.contains(name.as_str()))
        .cloned()
        .collect();
    match default_kind {
        n::K_NONE => {
            if let Some(name) = unclassified.first() {
                return Err(ctx.error(
                    format!("`{name}` not specified in enclosing `parallel`"),
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

    // Nested directives see the region's renamed scope.
    let body = rewrite_stmts(ctx, body)?;

    let mut stmts = header;
    stmts.extend(body);
    stmts.extend(footer);
    let fname = ctx.new_id("parallel");
    let func = assemble_function(ctx, fname.clone(), &outer, stmts);

    let call = ctx.rt_call(
        "parallel_run",
        vec![
            build::name(&fname, ctx.directive_span),
            c_if,
            c_message,
            Expr::Tuple(ExprList {
                elts: nthreads,
                span: ctx.directive_span,
            }),
            c_safesync,
            c_severity,
        ],
    );

    ctx.variables = outer;
    Ok(vec![
        Stmt::FunctionDef(func),
        build::expr_stmt(call, ctx.directive_span),
    ])
}

/// A lifted region body may not branch back into the enclosing function.
pub(super) fn check_escape(ctx: &NodeContext, body: &[Stmt]) -> Result<()> {
    if let Some((kind, span)) = find_escape(body) {
        let what = match kind {
            EscapeKind::Return => "return",
            EscapeKind::Yield => "yield",
        };
        return Err(ctx.error(
            format!("`{what}` cannot leave a parallel region"),
            span,
        ));
    }
    Ok(())
}

pub fn teams(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    check_escape(ctx, &body)?;
    // Only parallelism constructs may nest directly inside a league.
    for stmt in &body {
        if let Some(name) = crate::rewriter::directive_name_of(ctx, stmt)? {
            if !matches!(
                name.as_str(),
                n::D_PARALLEL | n::D_PARALLEL_FOR | n::D_DISTRIBUTE
            ) {
                return Err(ctx.error(
                    "only `distribute` or `parallel` regions are allowed to be \
                     strictly nested inside a `teams` region",
                    stmt.span(),
                ));
            }
        }
    }

    let outer = ctx.variables.snapshot();
    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut footer: Vec<Stmt> = Vec::new();
    let mut c_if = build::bool_(true, ctx.directive_span);
    let mut c_lower = build::int(1, ctx.directive_span);
    let mut c_upper = build::int(1, ctx.directive_span);
    let mut c_thread_limit = build::int(-1, ctx.directive_span);

    for clause in clauses {
        match clause.name() {
            n::C_SHARED => {
                data_add(ctx, &mut scope, clause, true)?;
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
            n::C_REDUCTION => {
                reduction_setup(ctx, clause, &mut scope, &mut body, &mut header, &mut footer)?;
            }
            n::C_IF => c_if = ctx.cast_expression("bool", clause_expr(clause)),
            n::C_NUM_TEAMS => {
                c_upper = ctx.cast_expression("int", clause_expr(clause));
                if let Some(lb) = clause.args().modifier(n::M_LOWER_BOUND) {
                    let expr = lb.value.as_expr().cloned().expect("expression modifier");
                    c_lower = ctx.cast_expression("int", expr);
                }
            }
            n::C_THREAD_LIMIT => {
                c_thread_limit = ctx.cast_expression("int", clause_expr(clause));
            }
            n::C_DEFAULT => {}
            n::C_ALLOCATE => return Err(clause_not_implemented(ctx, clause)),
            _ => {}
        }
    }

    let body = rewrite_stmts(ctx, body)?;
    let mut stmts = header;
    stmts.extend(body);
    stmts.extend(footer);
    let fname = ctx.new_id("teams");
    let func = assemble_function(ctx, fname.clone(), &outer, stmts);

    let call = ctx.rt_call(
        "teams_run",
        vec![
            build::name(&fname, ctx.directive_span),
            c_if,
            Expr::Tuple(ExprList {
                elts: vec![c_lower, c_upper],
                span: ctx.directive_span,
            }),
            c_thread_limit,
        ],
    );

    ctx.variables = outer;
    Ok(vec![
        Stmt::FunctionDef(func),
        build::expr_stmt(call, ctx.directive_span),
    ])
}
