//! Work-distribution processors: `for`, `sections`, `single`.

use ahash::{HashSet, HashSetExt};
use omp_directive::names as n;
use omp_directive::{ItemValue, OmpClause, OmpDirective};
use omp_frontend::ast::{
    build, BinOpKind, CmpOpKind, Expr, For, FunctionDef, If, NameList, Param, Stmt, While,
};
use omp_frontend::walk::find_loop_break;

use super::*;
use crate::context::NodeContext;
use crate::rewriter::{directive_name_of, rewrite_stmts};

/// Schedule kind codes shared with the runtime.
const KIND_STATIC: i64 = 0;
const KIND_DYNAMIC: i64 = 1;
const KIND_GUIDED: i64 = 2;
const KIND_AUTO: i64 = 3;
const KIND_RUNTIME: i64 = 4;

struct LoopLevel {
    target: String,
    start: Expr,
    stop: Expr,
    step: Expr,
}

pub fn for_loop(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    if !matches!(body[0], Stmt::For(_)) {
        return Err(ctx.error("for statement expected", body[0].span()));
    }
    if body.len() > 1 {
        return Err(ctx.error("unindent expected, but statement found", body[1].span()));
    }

    let outer = ctx.variables.snapshot();
    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut footer: Vec<Stmt> = Vec::new();
    let mut lastprivate: Vec<(String, String)> = Vec::new(); // (outer, private)
    let mut initialized: Vec<String> = Vec::new();

    let mut c_collapse: i64 = 1;
    let mut c_kind = KIND_STATIC - 1; // "unspecified" sentinel, maps to static
    let mut c_chunk = build::int(-1, ctx.directive_span);
    let mut c_monotonic = true;
    let mut c_ordered = build::int(0, ctx.directive_span);
    let mut has_ordered = false;
    let mut c_order = build::int(-1, ctx.directive_span);
    let mut nowait = NowaitVal::Const(false);

    for clause in clauses {
        match clause.name() {
            n::C_COLLAPSE => {
                c_collapse = const_int(ctx, &clause.args().items[0])?;
                if c_collapse < 1 {
                    return Err(ctx.error(
                        "`collapse` requires a positive constant",
                        clause.span(),
                    ));
                }
            }
            n::C_SCHEDULE => {
                let args = clause.args();
                let kind_name = match &args.items[0].value {
                    ItemValue::Ident(k) => k.as_str(),
                    _ => unreachable!("schedule kind is an identifier"),
                };
                c_kind = match kind_name {
                    n::K_STATIC => KIND_STATIC,
                    n::K_DYNAMIC => KIND_DYNAMIC,
                    n::K_GUIDED => KIND_GUIDED,
                    n::K_AUTO => KIND_AUTO,
                    _ => KIND_RUNTIME,
                };
                if args.items.len() == 2 {
                    if matches!(c_kind, KIND_AUTO | KIND_RUNTIME) {
                        return Err(ctx.error(
                            format!(
                                "schedule `{kind_name}` does not take a `chunk_size` parameter"
                            ),
                            args.items[1].span(),
                        ));
                    }
                    let expr = args.items[1].value.as_expr().cloned().expect("expression");
                    c_chunk = ctx.cast_expression("int", expr);
                }
                if let Some(m) = args.modifier(n::M_ORDERING_MODIFIER) {
                    if matches!(&m.value, ItemValue::Ident(k) if k == n::K_NONMONOTONIC) {
                        c_monotonic = false;
                    }
                }
            }
            n::C_ORDERED => {
                has_ordered = true;
                c_ordered = match &clause.args {
                    None => build::int(1, ctx.directive_span),
                    Some(args) => ctx.cast_expression(
                        "int",
                        args.items[0].value.as_expr().cloned().expect("expression"),
                    ),
                };
            }
            n::C_ORDER => {
                let reproducible = clause
                    .args()
                    .modifier(n::M_ORDER_MODIFIER)
                    .map(|m| matches!(&m.value, ItemValue::Ident(k) if k == n::K_REPRODUCIBLE))
                    .unwrap_or(false);
                c_order = build::int(if reproducible { 0 } else { 1 }, ctx.directive_span);
            }
            n::C_NOWAIT => nowait = nowait_value(ctx, Some(clause)),
            n::C_PRIVATE => {
                let names = data_add(ctx, &mut scope, clause, false)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::Fresh);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_FIRSTPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::CopyOuter);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_LASTPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                for name in names {
                    let old = ctx.variables.final_name(&name);
                    let mapping_from = old.clone();
                    let new = ctx.new_variable(&name);
                    let mapping =
                        std::collections::HashMap::from([(mapping_from, new.clone())]);
                    omp_frontend::walk::rename(&mut body, &mapping);
                    lastprivate.push((old, new));
                }
            }
            n::C_REDUCTION => {
                reduction_setup(ctx, clause, &mut scope, &mut body, &mut header, &mut footer)?;
            }
            n::C_LINEAR | n::C_INDUCTION | n::C_ALLOCATE => {
                return Err(clause_not_implemented(ctx, clause));
            }
            _ => {}
        }
    }

    // Walk the collapse nest: each level must be a bare range-form loop,
    // perfectly nested.
    let mut levels: Vec<LoopLevel> = Vec::new();
    let mut innermost_body: Vec<Stmt>;
    {
        let Stmt::For(first) = body.remove(0) else {
            unreachable!("checked above")
        };
        let mut current = first;
        loop {
            let level = loop_level(ctx, &current)?;
            levels.push(level);
            if levels.len() as i64 == c_collapse {
                innermost_body = current.body;
                break;
            }
            if current.body.len() > 1 {
                return Err(ctx.error(
                    "the loops must be perfectly nested",
                    current.body[1].span(),
                ));
            }
            match current.body.into_iter().next() {
                Some(Stmt::For(inner)) => current = inner,
                Some(other) => {
                    return Err(ctx.error("for statement expected", other.span()));
                }
                None => {
                    return Err(ctx.error("for statement expected", ctx.directive_span));
                }
            }
        }
    }

    if let Some(span) = find_loop_break(&innermost_body) {
        return Err(ctx.error("`break` is not allowed inside a work-shared loop", span));
    }
    super::parallelism::check_escape(ctx, &innermost_body)?;

    // Nested directives (including `ordered`) see the loop's induction
    // variable.
    let saved_iter = ctx.ordered_iter.take();
    if has_ordered {
        ctx.ordered_iter = Some(levels.last().expect("at least one level").target.clone());
    }
    innermost_body = rewrite_stmts(ctx, innermost_body)?;
    ctx.ordered_iter = saved_iter;

    let bounds_name = ctx.new_id("bounds");
    let span = ctx.directive_span;
    let b = |idx: i64| {
        build::subscript(
            build::name(&bounds_name, span),
            build::int(idx, span),
            span,
        )
    };

    let mut flat: Vec<Expr> = Vec::new();
    for level in &levels {
        flat.push(level.start.clone());
        flat.push(level.stop.clone());
        flat.push(level.step.clone());
    }
    let bounds_assign = build::assign(
        build::name(&bounds_name, span),
        ctx.rt_call(
            "for_bounds",
            vec![Expr::List(omp_frontend::ast::ExprList { elts: flat, span })],
        ),
        span,
    );
    let init_call = ctx.rt_stmt(
        "for_init",
        vec![
            build::name(&bounds_name, span),
            build::int(c_kind, span),
            c_chunk,
            build::bool_(c_monotonic, span),
            c_ordered,
            c_order,
        ],
    );

    // Rebuild the loop nest over the claimed chunk.
    let chunk_loop = if c_collapse == 1 {
        let level = &levels[0];
        Stmt::For(For {
            target: build::name(&level.target, span),
            iter: build::call("range", vec![b(0), b(1), level.step.clone()], span),
            body: innermost_body,
            span,
        })
    } else {
        let mut nest = innermost_body;
        // Innermost level counts the chunk down and breaks the whole nest.
        nest.push(build::aug_assign(b(0), BinOpKind::Sub, build::int(1, span), span));
        for (k, level) in levels.iter().enumerate().rev() {
            let k = k as i64;
            let offset = build::if_exp(
                build::compare(b(0), CmpOpKind::Eq, b(1), span),
                b(5 + 6 * k),
                build::int(0, span),
                span,
            );
            let start = build::binop(b(2 + 6 * k), BinOpKind::Add, offset, span);
            let mut level_body = nest;
            level_body.push(Stmt::If(If {
                test: build::not(b(0), span),
                body: vec![Stmt::Break(span)],
                orelse: vec![],
                span,
            }));
            nest = vec![Stmt::For(For {
                target: build::name(&level.target, span),
                iter: build::call(
                    "range",
                    vec![start, b(3 + 6 * k), level.step.clone()],
                    span,
                ),
                body: level_body,
                span,
            })];
        }
        nest.into_iter().next().expect("nest is non-empty")
    };

    let while_loop = Stmt::While(While {
        test: ctx.rt_call("for_next", vec![build::name(&bounds_name, span)]),
        body: vec![chunk_loop],
        span,
    });

    for (old, private) in &lastprivate {
        footer.push(Stmt::If(If {
            test: ctx.rt_call("for_last", vec![]),
            body: vec![build::assign(
                build::name(old, span),
                build::name(private, span),
                span,
            )],
            orelse: vec![],
            span,
        }));
    }
    footer.extend(data_delete(ctx, &initialized));
    footer.push(no_wait(ctx, &nowait));

    let mut out = header;
    out.push(bounds_assign);
    out.push(init_call);
    out.push(while_loop);
    out.extend(footer);

    ctx.variables = outer;
    Ok(out)
}

fn loop_level(ctx: &NodeContext, stmt: &For) -> Result<LoopLevel> {
    let target = match &stmt.target {
        Expr::Name(name) => name.id.clone(),
        other => {
            return Err(ctx.error("loop index must be a simple name", other.span()));
        }
    };
    let Expr::Call(call) = &stmt.iter else {
        return Err(ctx.error("range for expected", stmt.iter.span()));
    };
    if call.func.tail_name() != Some("range") || call.args.is_empty() || call.args.len() > 3 {
        return Err(ctx.error("range for expected", stmt.iter.span()));
    }
    let span = ctx.directive_span;
    let (start, stop, step) = match call.args.len() {
        1 => (build::int(0, span), call.args[0].clone(), build::int(1, span)),
        2 => (
            call.args[0].clone(),
            call.args[1].clone(),
            build::int(1, span),
        ),
        _ => (
            call.args[0].clone(),
            call.args[1].clone(),
            call.args[2].clone(),
        ),
    };
    Ok(LoopLevel {
        target,
        start,
        stop,
        step,
    })
}

pub fn sections(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    let outer = ctx.variables.snapshot();
    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut footer: Vec<Stmt> = Vec::new();
    let mut initialized: Vec<String> = Vec::new();
    let mut nowait = NowaitVal::Const(false);

    for clause in clauses {
        match clause.name() {
            n::C_PRIVATE => {
                let names = data_add(ctx, &mut scope, clause, false)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::Fresh);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_FIRSTPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::CopyOuter);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_REDUCTION => {
                reduction_setup(ctx, clause, &mut scope, &mut body, &mut header, &mut footer)?;
            }
            n::C_NOWAIT => nowait = nowait_value(ctx, Some(clause)),
            n::C_LASTPRIVATE | n::C_ALLOCATE => {
                return Err(clause_not_implemented(ctx, clause));
            }
            _ => {}
        }
    }

    let last = body.len() as i64 - 1;
    let mut guarded: Vec<Stmt> = Vec::new();
    for (i, stmt) in body.into_iter().enumerate() {
        let is_section = matches!(
            directive_name_of(ctx, &stmt)?,
            Some(name) if name == n::D_SECTION
        );
        if !is_section {
            return Err(ctx.error("expected `omp section`", stmt.span()));
        }
        let Stmt::With(with) = stmt else {
            unreachable!("section directives are with statements")
        };
        let section_body = rewrite_stmts(ctx, with.body)?;
        guarded.push(Stmt::If(If {
            test: ctx.rt_call(
                "section_claim",
                vec![
                    build::int(i as i64, ctx.directive_span),
                    build::int(last, ctx.directive_span),
                ],
            ),
            body: section_body,
            orelse: vec![],
            span: with.span,
        }));
    }

    footer.extend(data_delete(ctx, &initialized));
    footer.push(no_wait(ctx, &nowait));

    let mut out = header;
    out.extend(guarded);
    out.extend(footer);
    ctx.variables = outer;
    Ok(out)
}

pub fn single(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    clauses: &[&OmpClause],
    mut body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    check_body(ctx, dir, &body)?;
    let outer = ctx.variables.snapshot();
    let mut scope: HashSet<String> = HashSet::new();
    let mut header: Vec<Stmt> = Vec::new();
    let mut initialized: Vec<String> = Vec::new();
    let mut copyprivate: Vec<String> = Vec::new();
    let mut nowait = NowaitVal::Const(false);

    for clause in clauses {
        match clause.name() {
            n::C_PRIVATE => {
                let names = data_add(ctx, &mut scope, clause, false)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::Fresh);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_FIRSTPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                let (h, inited) = data_rename(ctx, &mut body, &names, RenameInit::CopyOuter);
                header.extend(h);
                initialized.extend(inited);
            }
            n::C_COPYPRIVATE => {
                let names = data_add(ctx, &mut scope, clause, true)?;
                copyprivate.extend(names);
            }
            n::C_NOWAIT => nowait = nowait_value(ctx, Some(clause)),
            n::C_ALLOCATE => {}
            _ => {}
        }
    }

    let body = rewrite_stmts(ctx, body)?;
    let span = ctx.directive_span;

    let mut if_body = header;
    if_body.extend(body);
    let mut orelse: Vec<Stmt> = Vec::new();

    if copyprivate.is_empty() {
        if_body.push(no_wait(ctx, &nowait));
        orelse.push(no_wait(ctx, &nowait));
    } else {
        // The executing worker publishes the named values; everyone else
        // receives them through a setter. This replaces the implicit
        // barrier.
        let nowait_expr = match &nowait {
            NowaitVal::Const(b) => build::bool_(*b, span),
            NowaitVal::Dynamic(e) => e.clone(),
        };
        let mut write_args = vec![nowait_expr.clone()];
        let mut setter = FunctionDef {
            name: ctx.new_id("copyprivate"),
            params: Vec::new(),
            body: Vec::new(),
            decorators: Vec::new(),
            span,
        };
        let mut refs = NameList {
            names: Vec::new(),
            span,
        };
        let mut assigns: Vec<Stmt> = Vec::new();
        for name in &copyprivate {
            let current = ctx.variables.final_name(name);
            let param = format!("__omp_{current}");
            write_args.push(build::name(&current, span));
            setter.params.push(Param {
                name: param.clone(),
                annotation: None,
                default: None,
                span,
            });
            refs.names.push(current.clone());
            assigns.push(build::assign(
                build::name(&current, span),
                build::name(&param, span),
                span,
            ));
        }
        setter.body.push(Stmt::Nonlocal(refs));
        setter.body.extend(assigns);

        if_body.push(ctx.rt_stmt("copyprivate_write", write_args));
        let setter_name = setter.name.clone();
        orelse.push(Stmt::FunctionDef(setter));
        orelse.push(ctx.rt_stmt(
            "copyprivate_read",
            vec![nowait_expr, build::name(&setter_name, span)],
        ));
    }

    if_body.extend(data_delete(ctx, &initialized));

    ctx.variables = outer;
    Ok(vec![Stmt::If(If {
        test: ctx.rt_call("single_enter", vec![]),
        body: if_body,
        orelse,
        span,
    })])
}
