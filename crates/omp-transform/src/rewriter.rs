//! The AST rewriter: walks the host tree, detects directive markers, and
//! dispatches them to processors.
//!
//! Detection covers the three marker shapes: a decorator whose head
//! resolves to the directive function (stripped from the output), a
//! `with alias("…"):` context whose argument is a constant string, and a
//! bare `alias("…")` expression statement (body-less directives). The user
//! may import the function under any name; the alias travels in the
//! transform options.

use omp_directive::parse_line;
use omp_frontend::ast::{Call, Const, Expr, Module, Stmt};
use omp_frontend::span::Span;
use omp_frontend::walk::collect_vars;
use tracing::debug;

use crate::context::NodeContext;
use crate::processors::{self, Result};

/// Rewrite a whole module in place.
pub fn rewrite_module(ctx: &mut NodeContext, module: &mut Module) -> Result<()> {
    // Module-level bindings capture via `global`, never `nonlocal`.
    let vars = collect_vars(&module.body);
    for name in vars.stored {
        ctx.variables.add_global(name);
    }
    let body = std::mem::take(&mut module.body);
    module.body = rewrite_stmts(ctx, body)?;
    debug!(target: "transform", file = %ctx.src.name, "module rewritten");
    Ok(())
}

/// Rewrite a statement list, expanding directives.
pub fn rewrite_stmts(ctx: &mut NodeContext, stmts: Vec<Stmt>) -> Result<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::With(with) if is_directive_with(ctx, &with.items) => {
                let (dir_span, directive) = {
                    if with.items.len() > 1 {
                        return Err(ctx.error(
                            "a directive must be the only context item of its `with` statement",
                            with.span,
                        ));
                    }
                    let item = &with.items[0];
                    if item.binding.is_some() {
                        return Err(ctx.error(
                            "a directive `with` statement cannot bind a name with `as`",
                            item.span,
                        ));
                    }
                    let Expr::Call(call) = &item.context else {
                        unreachable!("is_directive_with matched a call")
                    };
                    let span = directive_string_span(ctx, call)?;
                    (span, parse_line(ctx.src, span)?)
                };
                ctx.stack.push(("with", with.span));
                let saved_span = ctx.directive_span;
                ctx.directive_span = dir_span;
                let expansion = processors::process(ctx, &directive, with.body)?;
                ctx.directive_span = saved_span;
                ctx.stack.pop();
                out.extend(expansion);
            }
            Stmt::Expr(expr_stmt) => {
                let is_marker = matches!(&expr_stmt.value, Expr::Call(_))
                    && ctx.is_omp(&expr_stmt.value);
                if is_marker {
                    let Expr::Call(call) = &expr_stmt.value else {
                        unreachable!("matched above")
                    };
                    let span = directive_string_span(ctx, call)?;
                    let directive = parse_line(ctx.src, span)?;
                    ctx.stack.push(("stmt", expr_stmt.span));
                    let saved_span = ctx.directive_span;
                    ctx.directive_span = span;
                    let expansion = processors::process(ctx, &directive, Vec::new())?;
                    ctx.directive_span = saved_span;
                    ctx.stack.pop();
                    out.extend(expansion);
                } else {
                    out.push(Stmt::Expr(expr_stmt));
                }
            }
            Stmt::FunctionDef(mut func) => {
                func.decorators.retain(|d| !ctx.is_omp(d));
                let saved = ctx.variables.clone();
                for param in &func.params {
                    ctx.variables.add(param.name.clone());
                }
                seed_scope(ctx, &func.body);
                ctx.stack.push(("def", func.span));
                func.body = rewrite_stmts(ctx, func.body)?;
                ctx.stack.pop();
                ctx.variables = saved;
                ctx.variables.add(func.name.clone());
                out.push(Stmt::FunctionDef(func));
            }
            Stmt::ClassDef(mut class) => {
                class.decorators.retain(|d| !ctx.is_omp(d));
                let saved = ctx.variables.clone();
                seed_scope(ctx, &class.body);
                ctx.stack.push(("class", class.span));
                class.body = rewrite_stmts(ctx, class.body)?;
                ctx.stack.pop();
                ctx.variables = saved;
                ctx.variables.add(class.name.clone());
                out.push(Stmt::ClassDef(class));
            }
            Stmt::If(mut s) => {
                s.body = rewrite_stmts(ctx, s.body)?;
                s.orelse = rewrite_stmts(ctx, s.orelse)?;
                out.push(Stmt::If(s));
            }
            Stmt::While(mut s) => {
                s.body = rewrite_stmts(ctx, s.body)?;
                out.push(Stmt::While(s));
            }
            Stmt::For(mut s) => {
                s.body = rewrite_stmts(ctx, s.body)?;
                out.push(Stmt::For(s));
            }
            Stmt::With(mut s) => {
                s.body = rewrite_stmts(ctx, s.body)?;
                out.push(Stmt::With(s));
            }
            Stmt::Try(mut s) => {
                s.body = rewrite_stmts(ctx, s.body)?;
                s.finalbody = rewrite_stmts(ctx, s.finalbody)?;
                out.push(Stmt::Try(s));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Seed the current scope with the names a statement list binds. A scope is
/// seeded whole, like the host's own symbol-table pass: position inside the
/// function does not matter.
fn seed_scope(ctx: &mut NodeContext, body: &[Stmt]) {
    let vars = collect_vars(body);
    for name in vars.globals {
        ctx.variables.add_global(name);
    }
    for name in vars.stored {
        ctx.variables.add(name);
    }
    for (name, annotation) in vars.annotations {
        ctx.variables.add_type(name, annotation);
    }
}

fn is_directive_with(ctx: &NodeContext, items: &[omp_frontend::ast::WithItem]) -> bool {
    items
        .iter()
        .any(|item| matches!(&item.context, Expr::Call(_)) && ctx.is_omp(&item.context))
}

/// Validate the marker call shape and return the span of the directive
/// text inside its string literal.
fn directive_string_span(ctx: &NodeContext, call: &Call) -> Result<Span> {
    let head = call.func.tail_name().unwrap_or("omp");
    if call.args.len() != 1 {
        return Err(ctx.error(
            format!("{head}() takes exactly one argument"),
            call.span,
        ));
    }
    let Expr::Constant(constant) = &call.args[0] else {
        return Err(ctx.error(
            format!("{head}() argument must be a constant string"),
            call.args[0].span(),
        ));
    };
    let Const::Str(text) = &constant.value else {
        return Err(ctx.error(
            format!("{head}() argument must be a constant string"),
            constant.span,
        ));
    };
    if text.trim().is_empty() {
        return Err(ctx.error("empty directive string", constant.span));
    }
    // The literal's span includes its quotes; the directive text sits one
    // byte inside each.
    Ok(Span::new(constant.span.start + 1, constant.span.end - 1))
}

/// The directive name carried by a statement, if it is a well-formed
/// directive `with`. Used by processors that constrain their children
/// (`sections`, `teams`).
pub fn directive_name_of(ctx: &NodeContext, stmt: &Stmt) -> Result<Option<String>> {
    let Stmt::With(with) = stmt else {
        return Ok(None);
    };
    if !is_directive_with(ctx, &with.items) || with.items.len() != 1 {
        return Ok(None);
    }
    let Expr::Call(call) = &with.items[0].context else {
        return Ok(None);
    };
    let span = directive_string_span(ctx, call)?;
    Ok(Some(parse_line(ctx.src, span)?.name))
}
