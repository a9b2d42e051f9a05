//! Argument parser for directives, clauses, and modifiers.
//!
//! Grammar recap: an optional parenthesized group follows the element name.
//! Inside it, a top-level `:` separates modifiers from positional arguments
//! (reversed for post-modified clauses such as `default`), `,` separates
//! items, and `;` separates whole argument sets for `multiple` clauses.
//! Bracket balancing is respected everywhere, so `reduction(+: a[i + 1])`
//! splits correctly.

use smallvec::SmallVec;

use omp_frontend::ast::{BinOpKind, Const, Expr, Stmt, UnaryOpKind};
use omp_frontend::diag::{SourceFile, SyntaxError};
use omp_frontend::parser::{parse_expr_tokens, parse_stmts_tokens};
use omp_frontend::span::Span;
use omp_frontend::token::{Token, TokenKind};

use crate::names::*;
use crate::schema::{ArgSpec, ItemTransform, ModifierSpec, MODIFIERS};
use crate::tokenizer::{end_span, merge_spans, untokenize};

/// Parsed parenthesized argument group.
#[derive(Debug, Clone)]
pub struct OmpArgs {
    pub lpar: Token,
    pub modifiers: Vec<OmpItem>,
    pub items: Vec<OmpItem>,
    pub rpar: Token,
    /// Next `;`-separated set for `multiple` clauses.
    pub next: Option<Box<OmpArgs>>,
}

impl OmpArgs {
    pub fn modifier(&self, name: &str) -> Option<&OmpItem> {
        self.modifiers.iter().find(|m| m.name == name)
    }
}

/// One parsed modifier or positional argument.
#[derive(Debug, Clone)]
pub struct OmpItem {
    /// Modifier name, or [`M_ARGS`] for positional arguments.
    pub name: String,
    pub tokens: Vec<Token>,
    pub value: ItemValue,
    pub args: Option<OmpArgs>,
}

impl OmpItem {
    pub fn span(&self) -> Span {
        merge_spans(&self.tokens)
    }

    /// The identifier this item names, for Ident/Var/RawToken items.
    pub fn ident(&self) -> Option<&str> {
        match &self.value {
            ItemValue::Ident(s) | ItemValue::Token(s) => Some(s),
            ItemValue::Var(e) => e.head_name(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemValue {
    Ident(String),
    Var(Expr),
    Const(Const),
    Expr(Expr),
    Stmts(Vec<Stmt>),
    Token(String),
}

impl ItemValue {
    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            ItemValue::Var(e) | ItemValue::Expr(e) => Some(e),
            _ => None,
        }
    }
}

/// Scan a balanced `( … )` group starting at `tokens[0]`.
///
/// Returns the index of the closing parenthesis, or `None` when the group is
/// absent. Unclosed groups are fatal.
pub fn consume_args(src: &SourceFile, tokens: &[Token]) -> Result<Option<usize>, SyntaxError> {
    let mut depth: SmallVec<[Span; 4]> = SmallVec::new();
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LPar => depth.push(token.span),
            TokenKind::RPar => {
                if depth.pop().is_none() {
                    return Err(src.error(format!("`{token}` was never opened"), token.span));
                }
            }
            _ if depth.is_empty() => return Ok(None),
            _ => {}
        }
        if depth.is_empty() {
            return Ok(Some(i));
        }
    }
    if let Some(open) = depth.last() {
        return Err(src.error("`(` was never closed", *open));
    }
    Ok(None)
}

/// Index of the first top-level separator of `kind`, or `tokens.len()`.
/// All three bracket pairs are balanced while scanning.
pub fn find_separator(
    src: &SourceFile,
    tokens: &[Token],
    kind: TokenKind,
) -> Result<usize, SyntaxError> {
    let mut stack: SmallVec<[&Token; 8]> = SmallVec::new();
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LPar | TokenKind::LSqb | TokenKind::LBrace => stack.push(token),
            TokenKind::RPar | TokenKind::RSqb | TokenKind::RBrace => {
                if stack.pop().is_none() {
                    return Err(src.error(format!("`{token}` was never opened"), token.span));
                }
            }
            k if k == kind && stack.is_empty() => return Ok(i),
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(src.error(format!("`{open}` was never closed"), open.span));
    }
    Ok(tokens.len())
}

/// Parse the argument group following an element name.
///
/// `tokens[0]` is the element's name token. Returns how many tokens past the
/// name were consumed, plus the parsed group (if any).
pub fn parse_args(
    src: &SourceFile,
    spec: Option<&ArgSpec>,
    tokens: &[Token],
) -> Result<(usize, Option<OmpArgs>), SyntaxError> {
    let Some(spec) = spec else {
        return Ok((0, None));
    };
    let rest = &tokens[1..];
    let close = consume_args(src, rest)?;
    let Some(close) = close else {
        if !spec.require_args {
            return Ok((0, None));
        }
        let at = rest
            .first()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(tokens[0].span.end));
        return Err(src.expected("`(`", at));
    };
    let group = &rest[..=close];
    let args = parse_group(src, spec, &group[0], &group[1..group.len() - 1], &group[close])?;
    Ok((close + 1, Some(args)))
}

/// Parse the contents of one parenthesized group.
fn parse_group(
    src: &SourceFile,
    spec: &ArgSpec,
    lpar: &Token,
    inner: &[Token],
    rpar: &Token,
) -> Result<OmpArgs, SyntaxError> {
    if inner.is_empty() {
        // The transformer owns the "expected …" wording for empty input.
        transform_item(src, 0, M_ARGS, spec, &[], rpar)?;
    }

    let mut inner = inner;
    let mut rpar = rpar.clone();
    let mut next = None;
    if spec.multiple {
        let semi = find_separator(src, inner, TokenKind::Semi)?;
        if semi < inner.len() {
            next = Some(Box::new(parse_group(
                src,
                spec,
                &inner[semi],
                &inner[semi + 1..],
                &rpar,
            )?));
            rpar = inner[semi].clone();
            inner = &inner[..semi];
        }
    }

    let colon = match find_separator(src, inner, TokenKind::Colon)? {
        i if i == inner.len() => None,
        i => Some(i),
    };

    let (mod_tokens, arg_tokens) = match colon {
        None => (&[][..], inner),
        Some(c) if spec.post_modified => (&inner[c + 1..], &inner[..c]),
        Some(c) => (&inner[..c], &inner[c + 1..]),
    };

    let modifiers = parse_modifiers(src, spec, mod_tokens, &rpar)?;

    let mut items = Vec::new();
    let mut i = 0;
    while i < arg_tokens.len() {
        let c_sep = (find_separator(src, &arg_tokens[i..], TokenKind::Comma)? + i).max(i + 1);
        items.push(transform_item(
            src,
            items.len(),
            M_ARGS,
            spec,
            &arg_tokens[i..c_sep.min(arg_tokens.len())],
            arg_tokens.get(c_sep).unwrap_or(&rpar),
        )?);
        i = c_sep + 1;
    }

    if items.is_empty() || spec.num_args > items.len() as i32 {
        transform_item(src, items.len(), M_ARGS, spec, &[], &rpar)?;
    } else if spec.num_args > 0 && items.len() as i32 > spec.num_args {
        let extra = &items[spec.num_args as usize];
        return Err(src.expected("`)`", extra.span()));
    }

    Ok(OmpArgs {
        lpar: lpar.clone(),
        modifiers,
        items,
        rpar,
        next,
    })
}

/// Human-readable stand-in for a modifier in `expected …` messages.
fn describe_modifier(name: &str) -> String {
    let Some(spec) = MODIFIERS.get(name) else {
        return name.to_string();
    };
    if let Some(msg) = spec.msg_value {
        return msg.to_string();
    }
    if let Some(values) = spec.values {
        return values
            .iter()
            .map(|v| format!("'{v}'"))
            .collect::<Vec<_>>()
            .join(" or ");
    }
    name.to_string()
}

fn parse_modifiers(
    src: &SourceFile,
    spec: &ArgSpec,
    tokens: &[Token],
    rpar: &Token,
) -> Result<Vec<OmpItem>, SyntaxError> {
    let mut available: Vec<&'static str> = spec.modifiers.clone();
    let mut used: Vec<&'static str> = Vec::new();
    let mut parsed: Vec<OmpItem> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let c_sep = (find_separator(src, &tokens[i..], TokenKind::Comma)? + i).max(i + 1);
        let mut matched: Option<(&'static str, usize)> = None;
        for &name in &available {
            let mspec = &MODIFIERS[name];
            // A following `(` marks a complex modifier: only its head name
            // participates in matching.
            let mut this_sep = c_sep;
            if tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::LPar)
                && mspec.transform == ItemTransform::Ident
            {
                this_sep = i + 1;
            }
            let candidate = &tokens[i..this_sep.min(tokens.len())];
            let hit = if let Some(values) = mspec.values {
                candidate.len() == 1 && values.contains(&candidate[0].text.as_str())
            } else if let Some(match_fn) = mspec.match_fn {
                if candidate.len() == 1 {
                    match_fn(&candidate[0].text, Some(candidate[0].kind))
                } else {
                    match_fn(untokenize(candidate).trim(), None)
                }
            } else {
                false
            };
            if hit {
                matched = Some((name, this_sep));
                break;
            }
        }
        let Some((name, this_sep)) = matched else {
            return Err(src.error(
                format!("`{}` is not a valid modifier", tokens[i].text),
                tokens[i].span,
            ));
        };

        let mspec = &MODIFIERS[name];
        let candidate = &tokens[i..this_sep.min(tokens.len())];
        let mut item = transform_modifier(
            src,
            parsed.len(),
            name,
            mspec,
            spec,
            candidate,
            tokens.get(this_sep).unwrap_or(rpar),
        )?;

        let mut consumed = this_sep;
        if mspec.args.is_some() {
            let (n_args, args) = parse_args(src, mspec.args.as_ref(), &tokens[i..])?;
            item.args = args;
            consumed = (i + 1 + n_args).max(this_sep);
        }

        used.push(name);
        if !mspec.flags.contains(crate::schema::ItemFlags::REPEATABLE) {
            available.retain(|&n| n != name);
        }
        parsed.push(item);

        i = consumed;
        if tokens.get(i).map(|t| t.kind) == Some(TokenKind::Comma) {
            i += 1;
        }
    }

    // Required modifiers that never appeared.
    for name in &available {
        let mspec = &MODIFIERS[*name];
        if mspec.flags.contains(crate::schema::ItemFlags::REQUIRED) && !used.contains(name) {
            return Err(src.expected(describe_modifier(name), end_span(tokens, rpar)));
        }
    }

    // Group constraints.
    for group in &spec.modifier_groups {
        let members: Vec<usize> = parsed
            .iter()
            .enumerate()
            .filter(|(_, m)| group.elems.contains(&m.name.as_str()))
            .map(|(i, _)| i)
            .collect();
        if group.required && members.is_empty() {
            let msg = group
                .elems
                .iter()
                .map(|e| describe_modifier(e))
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(src.expected(msg, end_span(tokens, rpar)));
        }
        if group.exclusive && members.len() > 1 {
            let a = &parsed[members[0]];
            let b = &parsed[members[1]];
            return Err(src.error(
                format!(
                    "`{}` and `{}` cannot be used together",
                    untokenize(&a.tokens).trim(),
                    untokenize(&b.tokens).trim()
                ),
                b.span(),
            ));
        }
    }

    // Ultimate modifiers must close the sequence.
    for window in parsed.windows(2) {
        let mspec = &MODIFIERS[window[0].name.as_str()];
        if mspec.flags.contains(crate::schema::ItemFlags::ULTIMATE) {
            return Err(src.expected("`)`", window[1].span()));
        }
    }

    Ok(parsed)
}

fn transform_modifier(
    src: &SourceFile,
    index: usize,
    name: &str,
    mspec: &ModifierSpec,
    clause_spec: &ArgSpec,
    tokens: &[Token],
    sep: &Token,
) -> Result<OmpItem, SyntaxError> {
    run_transform(src, index, name, mspec.transform, clause_spec, tokens, sep)
}

/// Transform a positional argument slice according to the clause spec.
pub fn transform_item(
    src: &SourceFile,
    index: usize,
    name: &str,
    spec: &ArgSpec,
    tokens: &[Token],
    sep: &Token,
) -> Result<OmpItem, SyntaxError> {
    run_transform(src, index, name, spec.transform, spec, tokens, sep)
}

fn empty_error(
    src: &SourceFile,
    name: &str,
    transform: ItemTransform,
    index: usize,
    sep: &Token,
) -> SyntaxError {
    let what = if MODIFIERS.contains_key(name) {
        describe_modifier(name)
    } else {
        match transform {
            ItemTransform::Ident | ItemTransform::Var => "identifier".to_string(),
            ItemTransform::ConstExpr => "constant".to_string(),
            ItemTransform::Expr => "expression".to_string(),
            ItemTransform::Stmt => "statement".to_string(),
            ItemTransform::RawToken => "argument".to_string(),
            ItemTransform::KindPair => {
                if index == 0 {
                    "identifier".to_string()
                } else {
                    "expression".to_string()
                }
            }
        }
    };
    src.expected(what, sep.span)
}

fn run_transform(
    src: &SourceFile,
    index: usize,
    name: &str,
    transform: ItemTransform,
    clause_spec: &ArgSpec,
    tokens: &[Token],
    sep: &Token,
) -> Result<OmpItem, SyntaxError> {
    if tokens.is_empty() {
        return Err(empty_error(src, name, transform, index, sep));
    }
    let item = |value: ItemValue| OmpItem {
        name: name.to_string(),
        tokens: tokens.to_vec(),
        value,
        args: None,
    };

    match transform {
        ItemTransform::Ident => {
            if tokens.len() > 1 || tokens[0].kind != TokenKind::Name {
                return Err(src.expected("identifier", merge_spans(tokens)));
            }
            if name == M_ARGS {
                if let Some(choices) = clause_spec.choices {
                    if !choices.contains(&tokens[0].text.as_str()) {
                        let msg = choices
                            .iter()
                            .map(|c| format!("'{c}'"))
                            .collect::<Vec<_>>()
                            .join(" or ");
                        return Err(src.expected(msg, tokens[0].span));
                    }
                }
            }
            Ok(item(ItemValue::Ident(tokens[0].text.clone())))
        }
        ItemTransform::Var => {
            let expr = parse_expr_tokens(src, tokens)
                .map_err(|_| src.expected("identifier or array section", merge_spans(tokens)))?;
            match &expr {
                Expr::Name(_) => {}
                Expr::Subscript(s) => {
                    if !matches!(s.value.as_ref(), Expr::Name(_)) {
                        return Err(src.expected("local identifier", merge_spans(tokens)));
                    }
                }
                _ => {
                    return Err(src.expected("identifier or array section", merge_spans(tokens)));
                }
            }
            Ok(item(ItemValue::Var(expr)))
        }
        ItemTransform::ConstExpr => {
            let expr = parse_expr_tokens(src, tokens)?;
            match const_fold(&expr) {
                Some(c) => Ok(item(ItemValue::Const(c))),
                None => Err(src.error("expression must be constant", merge_spans(tokens))),
            }
        }
        ItemTransform::Expr => {
            let expr = parse_expr_tokens(src, tokens)?;
            Ok(item(ItemValue::Expr(expr)))
        }
        ItemTransform::Stmt => {
            let stmts = parse_stmts_tokens(src, tokens)?;
            Ok(item(ItemValue::Stmts(stmts)))
        }
        ItemTransform::RawToken => {
            if tokens.len() > 1 {
                return Err(src.expected(format!("`{sep}`"), tokens[1].span));
            }
            Ok(item(ItemValue::Token(tokens[0].text.clone())))
        }
        ItemTransform::KindPair => match index {
            0 => run_transform(src, index, name, ItemTransform::Ident, clause_spec, tokens, sep),
            1 => run_transform(src, index, name, ItemTransform::Expr, clause_spec, tokens, sep),
            _ => Err(src.expected("`)`", tokens[0].span)),
        },
    }
}

/// Fold an expression to a constant. Anything mentioning a name, call, or
/// subscript is not constant.
pub fn const_fold(expr: &Expr) -> Option<Const> {
    match expr {
        Expr::Constant(c) => Some(c.value.clone()),
        Expr::UnaryOp(u) => {
            let inner = const_fold(&u.operand)?;
            match (u.op, inner) {
                (UnaryOpKind::Neg, Const::Int(i)) => Some(Const::Int(-i)),
                (UnaryOpKind::Neg, Const::Float(f)) => Some(Const::Float(-f)),
                (UnaryOpKind::Pos, v @ (Const::Int(_) | Const::Float(_))) => Some(v),
                (UnaryOpKind::Not, v) => Some(Const::Bool(!v.truthy())),
                (UnaryOpKind::Invert, Const::Int(i)) => Some(Const::Int(!i)),
                _ => None,
            }
        }
        Expr::BinOp(b) => {
            let l = const_fold(&b.left)?;
            let r = const_fold(&b.right)?;
            match (l, r) {
                (Const::Int(a), Const::Int(c)) => Some(match b.op {
                    BinOpKind::Add => Const::Int(a.checked_add(c)?),
                    BinOpKind::Sub => Const::Int(a.checked_sub(c)?),
                    BinOpKind::Mul => Const::Int(a.checked_mul(c)?),
                    BinOpKind::FloorDiv => Const::Int(a.checked_div(c)?),
                    BinOpKind::Mod => Const::Int(a.checked_rem(c)?),
                    BinOpKind::Div => Const::Float(a as f64 / c as f64),
                    BinOpKind::Pow => Const::Int(a.checked_pow(u32::try_from(c).ok()?)?),
                    BinOpKind::BitAnd => Const::Int(a & c),
                    BinOpKind::BitOr => Const::Int(a | c),
                    BinOpKind::BitXor => Const::Int(a ^ c),
                    BinOpKind::LShift => Const::Int(a.checked_shl(u32::try_from(c).ok()?)?),
                    BinOpKind::RShift => Const::Int(a.checked_shr(u32::try_from(c).ok()?)?),
                    BinOpKind::MatMul => return None,
                }),
                (Const::Float(a), Const::Float(c)) => float_op(b.op, a, c),
                (Const::Int(a), Const::Float(c)) => float_op(b.op, a as f64, c),
                (Const::Float(a), Const::Int(c)) => float_op(b.op, a, c as f64),
                (Const::Str(a), Const::Str(c)) if b.op == BinOpKind::Add => {
                    Some(Const::Str(a + &c))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn float_op(op: BinOpKind, a: f64, b: f64) -> Option<Const> {
    Some(Const::Float(match op {
        BinOpKind::Add => a + b,
        BinOpKind::Sub => a - b,
        BinOpKind::Mul => a * b,
        BinOpKind::Div => a / b,
        BinOpKind::FloorDiv => (a / b).floor(),
        BinOpKind::Mod => a % b,
        BinOpKind::Pow => a.powf(b),
        _ => return None,
    }))
}
