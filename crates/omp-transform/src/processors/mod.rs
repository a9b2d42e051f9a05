//! Directive processors: one per directive kind, each producing the AST
//! replacement that calls into the runtime bindings.
//!
//! Shared lifting pattern: a region body moves into a fresh nested function
//! whose free variables are captured explicitly — names assigned inside and
//! bound outside become a `nonlocal` declaration, reads work through the
//! closure. Private/firstprivate/reduction variables are renamed inside the
//! region and initialized in a header block; reductions combine in a footer
//! under the team mutex.

mod datadecl;
mod parallelism;
mod synchronization;
mod tasking;
mod workdistribution;

use ahash::HashSet;
use omp_directive::names as n;
use omp_directive::{ItemValue, OmpClause, OmpDirective, OmpItem};
use omp_frontend::ast::{build, Const, Expr, FunctionDef, NameList, Stmt};
use omp_frontend::diag::SyntaxError;
use omp_frontend::walk::{collect_vars, rename};

use crate::context::{NodeContext, RUNTIME};
use crate::reduction::{instantiate_combine, instantiate_init, op_key};
use crate::symtab::Variables;

pub type Result<T> = std::result::Result<T, SyntaxError>;

/// Dispatch a parsed directive to its processor.
pub fn process(
    ctx: &mut NodeContext,
    dir: &OmpDirective,
    body: Vec<Stmt>,
) -> Result<Vec<Stmt>> {
    let owned = |owner: &str| -> Vec<&OmpClause> {
        dir.clauses.iter().filter(|c| c.directive == owner).collect()
    };
    match dir.name.as_str() {
        n::D_PARALLEL => parallelism::parallel(ctx, dir, &owned(n::D_PARALLEL), body),
        n::D_TEAMS => parallelism::teams(ctx, dir, &owned(n::D_TEAMS), body),
        n::D_FOR => workdistribution::for_loop(ctx, dir, &owned(n::D_FOR), body),
        n::D_PARALLEL_FOR => {
            let lowered = workdistribution::for_loop(ctx, dir, &owned(n::D_FOR), body)?;
            parallelism::parallel(ctx, dir, &owned(n::D_PARALLEL), lowered)
        }
        n::D_SECTIONS => workdistribution::sections(ctx, dir, &owned(n::D_SECTIONS), body),
        n::D_SECTION => Err(ctx.error(
            "`section` may only be used inside `sections`",
            dir.span,
        )),
        n::D_SINGLE => workdistribution::single(ctx, dir, &owned(n::D_SINGLE), body),
        n::D_TASK => tasking::task(ctx, dir, &owned(n::D_TASK), body),
        n::D_TASKWAIT => tasking::taskwait(ctx, dir, body),
        n::D_BARRIER => synchronization::barrier(ctx, dir, body),
        n::D_CRITICAL => synchronization::critical(ctx, dir, body),
        n::D_ATOMIC => synchronization::atomic(ctx, dir, body),
        n::D_MASTER => synchronization::master(ctx, dir, body),
        n::D_ORDERED => synchronization::ordered(ctx, dir, body),
        n::D_THREADPRIVATE => datadecl::threadprivate(ctx, dir, body),
        n::D_DECLARE_REDUCTION => datadecl::declare_reduction(ctx, dir, body),
        other => Err(ctx.error(
            format!("`{other}` directive is not implemented yet"),
            dir.span,
        )),
    }
}

pub fn check_body(ctx: &NodeContext, dir: &OmpDirective, body: &[Stmt]) -> Result<()> {
    if body.is_empty() {
        return Err(ctx.error(
            format!("`{}` requires a statement body", dir.name),
            dir.span,
        ));
    }
    Ok(())
}

/// Standalone directives take no body; a lone `pass` placeholder is fine.
pub fn check_nobody(ctx: &NodeContext, dir: &OmpDirective, body: &[Stmt]) -> Result<()> {
    let effectively_empty = body.is_empty() || matches!(body, [Stmt::Pass(_)]);
    if !effectively_empty {
        return Err(ctx.error(
            format!("`{}` does not take a statement body", dir.name),
            body[0].span(),
        ));
    }
    Ok(())
}

pub fn clause_not_implemented(ctx: &NodeContext, clause: &OmpClause) -> SyntaxError {
    ctx.error(
        format!("`{}` clause is not implemented yet", clause.name()),
        clause.span(),
    )
}

/// The single expression argument of a clause.
pub fn clause_expr(clause: &OmpClause) -> Expr {
    clause.args().items[0]
        .value
        .as_expr()
        .cloned()
        .expect("schema guarantees an expression argument")
}

/// Variable items of a data-sharing clause as (head name, item) pairs.
pub fn clause_vars<'c>(clause: &'c OmpClause) -> Vec<(String, &'c OmpItem)> {
    clause
        .args()
        .items
        .iter()
        .map(|item| {
            let name = item
                .ident()
                .expect("schema guarantees identifier-shaped items")
                .to_string();
            (name, item)
        })
        .collect()
}

/// Record clause variables into the region's data scope, rejecting
/// duplicates and (when `require_exists`) names with no visible binding.
pub fn data_add(
    ctx: &NodeContext,
    scope: &mut HashSet<String>,
    clause: &OmpClause,
    require_exists: bool,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for (name, item) in clause_vars(clause) {
        let current = ctx.variables.final_name(&name);
        if require_exists && !ctx.variables.contains(&current) && !ctx.variables.is_global(&current)
        {
            return Err(ctx.error(
                format!("`{name}` undeclared (first use in this function)"),
                item.span(),
            ));
        }
        if !scope.insert(name.clone()) {
            return Err(ctx.error(
                format!("`{name}` appears more than once in data clauses"),
                item.span(),
            ));
        }
        names.push(name);
    }
    Ok(names)
}

/// How a renamed binding is initialized.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RenameInit {
    /// Fresh default-constructed value (`__omp.new`), or nothing when the
    /// outer binding does not exist.
    Fresh,
    /// Copy of the outer value (`__omp.copy`).
    CopyOuter,
}

/// Rename `names` inside `body` to fresh private bindings, returning the
/// header statements that initialize them and the subset that got an
/// initializer (the ones a region-exit `del` may touch).
pub fn data_rename(
    ctx: &mut NodeContext,
    body: &mut [Stmt],
    names: &[String],
    init: RenameInit,
) -> (Vec<Stmt>, Vec<String>) {
    let mut header = Vec::new();
    let mut initialized = Vec::new();
    let mut mapping = std::collections::HashMap::new();
    for name in names {
        let old = ctx.variables.final_name(name);
        let exists = ctx.variables.contains(&old);
        let new = ctx.new_variable(name);
        match init {
            RenameInit::Fresh if exists => {
                header.push(build::assign(
                    build::name(&new, ctx.directive_span),
                    ctx.rt_call("new", vec![build::name(&old, ctx.directive_span)]),
                    ctx.directive_span,
                ));
                initialized.push(new.clone());
            }
            RenameInit::Fresh => {}
            RenameInit::CopyOuter => {
                header.push(build::assign(
                    build::name(&new, ctx.directive_span),
                    ctx.rt_call("copy", vec![build::name(&old, ctx.directive_span)]),
                    ctx.directive_span,
                ));
                initialized.push(new.clone());
            }
        }
        mapping.insert(old, new);
    }
    rename(body, &mapping);
    (header, initialized)
}

/// Lower one `reduction(op: vars)` clause: private accumulators in the
/// header, mutex-guarded combines in the footer.
pub fn reduction_setup(
    ctx: &mut NodeContext,
    clause: &OmpClause,
    scope: &mut HashSet<String>,
    body: &mut [Stmt],
    header: &mut Vec<Stmt>,
    footer: &mut Vec<Stmt>,
) -> Result<Vec<String>> {
    let op_item = clause
        .args()
        .modifier(n::M_REDUCTION_ID)
        .expect("schema requires the reduction identifier");
    let op_token = match &op_item.value {
        ItemValue::Token(t) => t.clone(),
        _ => unreachable!("reduction identifier is a raw token"),
    };
    let key = op_key(&op_token);

    let names = data_add(ctx, scope, clause, true)?;
    for (_, item) in clause_vars(clause) {
        if matches!(item.value, ItemValue::Var(Expr::Subscript(_))) {
            return Err(ctx.error("array reduction not yet supported", item.span()));
        }
    }

    let mut mapping = std::collections::HashMap::new();
    for name in &names {
        let old = ctx.variables.final_name(name);
        // A typed template wins when the variable carries an annotation.
        let typed_key = ctx
            .variables
            .type_of(&old)
            .and_then(|ann| ann.tail_name())
            .map(|t| format!("{t}.{key}"));
        let template = typed_key
            .as_deref()
            .and_then(|k| ctx.reductions.get(k))
            .or_else(|| ctx.reductions.get(&key))
            .cloned();
        let Some(template) = template else {
            return Err(ctx.error(format!("`{op_token}` is not defined"), op_item.span()));
        };
        let new = ctx.new_variable(name);
        header.extend(instantiate_init(&template, &new, &old, ctx.directive_span));
        footer.extend(mutex_guard(
            ctx,
            instantiate_combine(&template, &new, &old, ctx.directive_span),
        ));
        mapping.insert(old, new);
    }
    rename(body, &mapping);
    Ok(names)
}

/// Wrap statements in `__omp.mutex_lock()` / `try … finally unlock`.
pub fn mutex_guard(ctx: &NodeContext, stmts: Vec<Stmt>) -> Vec<Stmt> {
    vec![
        ctx.rt_stmt("mutex_lock", vec![]),
        build::try_finally(stmts, vec![ctx.rt_stmt("mutex_unlock", vec![])], ctx.directive_span),
    ]
}

/// `del` for the private bindings a region introduced.
pub fn data_delete(ctx: &NodeContext, initialized: &[String]) -> Vec<Stmt> {
    if initialized.is_empty() {
        return Vec::new();
    }
    vec![Stmt::Delete(omp_frontend::ast::Delete {
        targets: initialized
            .iter()
            .map(|n| build::name(n, ctx.directive_span))
            .collect(),
        span: ctx.directive_span,
    })]
}

/// The value of a `nowait` clause: absent → false, bare → true, or a
/// runtime expression.
pub enum NowaitVal {
    Const(bool),
    Dynamic(Expr),
}

pub fn nowait_value(ctx: &NodeContext, clause: Option<&&OmpClause>) -> NowaitVal {
    match clause {
        None => NowaitVal::Const(false),
        Some(c) => match &c.args {
            None => NowaitVal::Const(true),
            Some(args) => {
                let expr = args.items[0]
                    .value
                    .as_expr()
                    .cloned()
                    .expect("nowait argument is an expression");
                NowaitVal::Dynamic(ctx.cast_expression("bool", expr))
            }
        },
    }
}

/// Emit the implicit barrier a worksharing construct ends with, elided or
/// conditioned by `nowait`.
pub fn no_wait(ctx: &NodeContext, nowait: &NowaitVal) -> Stmt {
    match nowait {
        NowaitVal::Const(true) => build::pass(ctx.directive_span),
        NowaitVal::Const(false) => ctx.rt_stmt("barrier", vec![]),
        NowaitVal::Dynamic(expr) => Stmt::If(omp_frontend::ast::If {
            test: build::not(expr.clone(), ctx.directive_span),
            body: vec![ctx.rt_stmt("barrier", vec![])],
            orelse: vec![],
            span: ctx.directive_span,
        }),
    }
}

/// Assemble a lifted region function: compute the captured-assigned set on
/// the final statements (relative to the scope snapshot taken at region
/// entry) and prepend the `nonlocal` declaration.
pub fn assemble_function(
    ctx: &mut NodeContext,
    name: String,
    outer: &Variables,
    stmts: Vec<Stmt>,
) -> FunctionDef {
    let captured = captured_assigned(ctx, outer, &stmts);
    let mut func = build::function_def(name, ctx.directive_span);
    if !captured.is_empty() {
        func.body.push(Stmt::Nonlocal(NameList {
            names: captured,
            span: ctx.directive_span,
        }));
    }
    func.body.extend(stmts);
    func
}

/// Names assigned inside `stmts` that refer to bindings of the enclosing
/// function scope — these capture as mutable cells via `nonlocal`.
pub fn captured_assigned(ctx: &NodeContext, outer: &Variables, stmts: &[Stmt]) -> Vec<String> {
    let vars = collect_vars(stmts);
    let mut captured: Vec<String> = vars
        .stored
        .into_iter()
        .filter(|name| {
            outer.contains(name)
                && !outer.is_global(name)
                && name != &ctx.alias
                && name != "omp"
                && name != RUNTIME
        })
        .collect();
    captured.sort();
    captured
}

/// Names referenced (loaded) inside `stmts` that resolve to enclosing
/// bindings; used by `default(none)` checks.
pub fn captured_refs(ctx: &NodeContext, outer: &Variables, stmts: &[Stmt]) -> Vec<String> {
    let vars = collect_vars(stmts);
    let mut refs: Vec<String> = vars
        .loaded
        .iter()
        .chain(vars.stored.iter())
        .filter(|name| {
            outer.contains(name.as_str())
                && !outer.is_global(name.as_str())
                && name.as_str() != ctx.alias
                && name.as_str() != "omp"
                && name.as_str() != RUNTIME
        })
        .cloned()
        .collect();
    refs.sort();
    refs.dedup();
    refs
}

/// Evaluate a clause's constant item to an integer.
pub fn const_int(ctx: &NodeContext, item: &OmpItem) -> Result<i64> {
    match &item.value {
        ItemValue::Const(Const::Int(v)) => Ok(*v),
        ItemValue::Const(Const::Bool(b)) => Ok(*b as i64),
        _ => Err(ctx.error("expression must be constant", item.span())),
    }
}
