//! Recursive-descent parser for the host language subset.
//!
//! The grammar is the slice of a Python-style language the directive
//! transformer needs to see: module/function/class structure, the compound
//! statements regions are built from, and a conventional expression
//! precedence ladder. Anything outside the subset fails with a spanned
//! diagnostic rather than being silently skipped.

use tracing::trace;

use crate::ast::*;
use crate::diag::{SourceFile, SyntaxError};
use crate::lexer::tokenize;
use crate::span::Span;
use crate::token::{Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "else", "while", "for", "in", "with", "as", "return", "yield",
    "from", "pass", "break", "continue", "del", "global", "nonlocal", "import", "try", "finally",
    "lambda", "not", "and", "or", "is", "None", "True", "False",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Parse a whole source file into a [`Module`].
pub fn parse_module(src: &SourceFile) -> Result<Module, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(src, tokens);
    let mut body = Vec::new();
    while !parser.at(TokenKind::Eof) {
        body.push(parser.parse_stmt()?);
    }
    trace!(target: "frontend.parser", stmts = body.len(), file = %src.name, "parsed module");
    Ok(Module {
        body,
        span: Span::new(0, src.text.len()),
    })
}

/// Parse a token slice as exactly one expression.
///
/// Leftover tokens after the first complete expression mean a stray
/// separator in directive arguments; the error points at the first leftover
/// token with the canonical `expected `)`` message.
pub fn parse_expr_tokens(src: &SourceFile, tokens: &[Token]) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(src, with_terminator(src, tokens));
    let expr = parser.parse_testlist()?;
    if !parser.at(TokenKind::Newline) && !parser.at(TokenKind::Eof) {
        return Err(src.expected("`)`", parser.peek().span));
    }
    Ok(expr)
}

/// Parse a token slice as a sequence of simple statements (used for
/// statement-valued directive arguments such as `declare reduction`
/// initializers). `;` separates statements inside the slice.
pub fn parse_stmts_tokens(src: &SourceFile, tokens: &[Token]) -> Result<Vec<Stmt>, SyntaxError> {
    let mut out = Vec::new();
    for chunk in tokens.split(|t| t.kind == TokenKind::Semi) {
        if chunk.is_empty() {
            continue;
        }
        let mut parser = Parser::new(src, with_terminator(src, chunk));
        out.push(parser.parse_simple_stmt()?);
    }
    Ok(out)
}

fn with_terminator(src: &SourceFile, tokens: &[Token]) -> Vec<Token> {
    let end = tokens.last().map(|t| t.span.end).unwrap_or(src.text.len());
    let mut v = tokens.to_vec();
    v.push(Token::new(TokenKind::Newline, "\n", Span::point(end)));
    v.push(Token::new(TokenKind::Eof, "", Span::point(end)));
    v
}

struct Parser<'a> {
    src: &'a SourceFile,
    toks: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a SourceFile, toks: Vec<Token>) -> Self {
        Self { src, toks, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        &self.toks[(self.pos + n).min(self.toks.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_op(&self, text: &str) -> bool {
        self.peek().is(TokenKind::Op, text)
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.peek().is(TokenKind::Name, kw)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, text: &str) -> bool {
        if self.at_op(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, SyntaxError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.src.expected(what, self.peek().span))
        }
    }

    fn expect_name(&mut self) -> Result<Token, SyntaxError> {
        if self.at(TokenKind::Name) && !is_keyword(&self.peek().text) {
            Ok(self.advance())
        } else {
            Err(self.src.expected("identifier", self.peek().span))
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        if self.at_op("@") || self.at_kw("def") || self.at_kw("class") {
            return self.parse_decorated();
        }
        match self.peek().text.as_str() {
            "if" if self.at(TokenKind::Name) => self.parse_if(),
            "while" if self.at(TokenKind::Name) => self.parse_while(),
            "for" if self.at(TokenKind::Name) => self.parse_for(),
            "with" if self.at(TokenKind::Name) => self.parse_with(),
            "try" if self.at(TokenKind::Name) => self.parse_try(),
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect(TokenKind::Newline, "end of statement")?;
                Ok(stmt)
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "newline")?;
        self.expect(TokenKind::Indent, "indented block")?;
        let mut body = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::Dedent, "dedent")?;
        Ok(body)
    }

    fn parse_decorated(&mut self) -> Result<Stmt, SyntaxError> {
        let mut decorators = Vec::new();
        while self.at_op("@") {
            self.advance();
            decorators.push(self.parse_expr()?);
            self.expect(TokenKind::Newline, "newline after decorator")?;
        }
        if self.at_kw("def") {
            self.parse_function_def(decorators)
        } else if self.at_kw("class") {
            self.parse_class_def(decorators)
        } else {
            Err(self.src.expected("`def` or `class`", self.peek().span))
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span; // def
        let name = self.expect_name()?;
        self.expect(TokenKind::LPar, "`(`")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RPar) {
            let pname = self.expect_name()?;
            let mut param = Param {
                name: pname.text.clone(),
                annotation: None,
                default: None,
                span: pname.span,
            };
            if self.eat(TokenKind::Colon) {
                param.annotation = Some(self.parse_expr()?);
            }
            if self.eat_op("=") {
                param.default = Some(self.parse_expr()?);
            }
            params.push(param);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RPar, "`)`")?;
        if self.eat_op("->") {
            self.parse_expr()?; // return annotation recorded nowhere
        }
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::FunctionDef(FunctionDef {
            name: name.text,
            params,
            body,
            decorators,
            span,
        }))
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span; // class
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.eat(TokenKind::LPar) {
            while !self.at(TokenKind::RPar) {
                bases.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RPar, "`)`")?;
        }
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::ClassDef(ClassDef {
            name: name.text,
            bases,
            body,
            decorators,
            span,
        }))
    }

    fn parse_if(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span; // if / elif
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        let mut orelse = Vec::new();
        if self.at_kw("elif") {
            orelse.push(self.parse_if()?);
        } else if self.eat_kw("else") {
            orelse = self.parse_block()?;
        }
        let span = start.merge(
            orelse
                .last()
                .map(|s| s.span())
                .or_else(|| body.last().map(|s| s.span()))
                .unwrap_or(start),
        );
        Ok(Stmt::If(If {
            test,
            body,
            orelse,
            span,
        }))
    }

    fn parse_while(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::While(While { test, body, span }))
    }

    fn parse_for(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let target = self.parse_target()?;
        if !self.eat_kw("in") {
            return Err(self.src.expected("`in`", self.peek().span));
        }
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::For(For {
            target,
            iter,
            body,
            span,
        }))
    }

    fn parse_with(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let mut items = Vec::new();
        loop {
            let context = self.parse_expr()?;
            let mut binding = None;
            let mut span = context.span();
            if self.eat_kw("as") {
                let name = self.expect_name()?;
                span = span.merge(name.span);
                binding = Some(name.text);
            }
            items.push(WithItem {
                context,
                binding,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        let span = start.merge(body.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::With(With { items, body, span }))
    }

    fn parse_try(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span;
        let body = self.parse_block()?;
        if !self.eat_kw("finally") {
            return Err(self.src.expected("`finally`", self.peek().span));
        }
        let finalbody = self.parse_block()?;
        let span = start.merge(finalbody.last().map(|s| s.span()).unwrap_or(start));
        Ok(Stmt::Try(Try {
            body,
            finalbody,
            span,
        }))
    }

    /// One simple (single-line) statement, without its trailing newline.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Name {
            match tok.text.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(Stmt::Pass(tok.span));
                }
                "break" => {
                    self.advance();
                    return Ok(Stmt::Break(tok.span));
                }
                "continue" => {
                    self.advance();
                    return Ok(Stmt::Continue(tok.span));
                }
                "return" => {
                    self.advance();
                    let value = if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                        None
                    } else {
                        Some(self.parse_testlist()?)
                    };
                    let span = tok
                        .span
                        .merge(value.as_ref().map(|v| v.span()).unwrap_or(tok.span));
                    return Ok(Stmt::Return(Return { value, span }));
                }
                "yield" => {
                    self.advance();
                    let from = self.eat_kw("from");
                    let value = if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                        None
                    } else {
                        Some(self.parse_testlist()?)
                    };
                    let span = tok
                        .span
                        .merge(value.as_ref().map(|v| v.span()).unwrap_or(tok.span));
                    return Ok(Stmt::Yield(YieldStmt { value, from, span }));
                }
                "del" => {
                    self.advance();
                    let mut targets = vec![self.parse_target()?];
                    while self.eat(TokenKind::Comma) {
                        targets.push(self.parse_target()?);
                    }
                    let span = tok.span.merge(targets.last().expect("nonempty").span());
                    return Ok(Stmt::Delete(Delete { targets, span }));
                }
                "global" | "nonlocal" => {
                    self.advance();
                    let mut names = vec![self.expect_name()?.text];
                    let mut span = tok.span;
                    while self.eat(TokenKind::Comma) {
                        let n = self.expect_name()?;
                        span = span.merge(n.span);
                        names.push(n.text);
                    }
                    let list = NameList { names, span };
                    return Ok(if tok.text == "global" {
                        Stmt::Global(list)
                    } else {
                        Stmt::Nonlocal(list)
                    });
                }
                "import" => return self.parse_import(None),
                "from" => {
                    self.advance();
                    let module = self.parse_dotted_name()?;
                    if !self.eat_kw("import") {
                        return Err(self.src.expected("`import`", self.peek().span));
                    }
                    return self.parse_import_tail(Some(module), tok.span);
                }
                _ => {}
            }
        }
        self.parse_assign_or_expr()
    }

    fn parse_import(&mut self, from_module: Option<String>) -> Result<Stmt, SyntaxError> {
        let start = self.advance().span; // import
        self.parse_import_tail(from_module, start)
    }

    fn parse_import_tail(
        &mut self,
        from_module: Option<String>,
        start: Span,
    ) -> Result<Stmt, SyntaxError> {
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let asname = if self.eat_kw("as") {
                Some(self.expect_name()?.text)
            } else {
                None
            };
            names.push(ImportAlias { name, asname });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let span = start.merge(self.peek().span);
        Ok(Stmt::Import(Import {
            from_module,
            names,
            span,
        }))
    }

    fn parse_dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut name = self.expect_name()?.text;
        while self.at_op(".") {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_name()?.text);
        }
        Ok(name)
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, SyntaxError> {
        let first = self.parse_testlist()?;
        let start = first.span();

        // Annotated assignment: `name: T [= value]`.
        if self.at(TokenKind::Colon) && matches!(first, Expr::Name(_)) {
            self.advance();
            let annotation = self.parse_expr()?;
            let value = if self.eat_op("=") {
                Some(self.parse_testlist()?)
            } else {
                None
            };
            let span = start.merge(
                value
                    .as_ref()
                    .map(|v| v.span())
                    .unwrap_or_else(|| annotation.span()),
            );
            return Ok(Stmt::AnnAssign(AnnAssign {
                target: first,
                annotation,
                value,
                span,
            }));
        }

        // Augmented assignment.
        if self.at(TokenKind::Op) && self.peek().text.ends_with('=') {
            let text = self.peek().text.clone();
            if let Some(op) = text
                .strip_suffix('=')
                .filter(|s| !s.is_empty())
                .and_then(BinOpKind::from_symbol)
            {
                self.advance();
                let value = self.parse_testlist()?;
                let span = start.merge(value.span());
                self.check_assign_target(&first)?;
                return Ok(Stmt::AugAssign(AugAssign {
                    target: first,
                    op,
                    value,
                    span,
                }));
            }
        }

        // Plain (possibly chained) assignment.
        if self.at_op("=") {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat_op("=") {
                let next = self.parse_testlist()?;
                if self.at_op("=") {
                    targets.push(next);
                } else {
                    value = Some(next);
                }
            }
            let value = value.expect("loop always sets value");
            for t in &targets {
                self.check_assign_target(t)?;
            }
            let span = start.merge(value.span());
            return Ok(Stmt::Assign(Assign {
                targets,
                value,
                span,
            }));
        }

        Ok(Stmt::Expr(ExprStmt {
            value: first,
            span: start,
        }))
    }

    fn check_assign_target(&self, expr: &Expr) -> Result<(), SyntaxError> {
        match expr {
            Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_) => Ok(()),
            Expr::Tuple(t) | Expr::List(t) => {
                for e in &t.elts {
                    self.check_assign_target(e)?;
                }
                Ok(())
            }
            other => Err(self
                .src
                .error("cannot assign to this expression", other.span())),
        }
    }

    fn parse_target(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_postfix()?;
        if self.at(TokenKind::Comma) {
            let mut elts = vec![expr];
            while self.eat(TokenKind::Comma) {
                if self.at_kw("in") || self.at(TokenKind::Newline) {
                    break;
                }
                elts.push(self.parse_postfix()?);
            }
            let span = elts[0].span().merge(elts.last().expect("nonempty").span());
            let tuple = Expr::Tuple(ExprList { elts, span });
            self.check_assign_target(&tuple)?;
            return Ok(tuple);
        }
        self.check_assign_target(&expr)?;
        Ok(expr)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// `expr (',' expr)*` — a bare tuple when more than one element.
    fn parse_testlist(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_expr()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::Newline)
                || self.at(TokenKind::Eof)
                || self.at(TokenKind::RPar)
                || self.at(TokenKind::RSqb)
                || self.at(TokenKind::Colon)
                || self.at_op("=")
            {
                break;
            }
            elts.push(self.parse_expr()?);
        }
        let span = elts[0].span().merge(elts.last().expect("nonempty").span());
        Ok(Expr::Tuple(ExprList { elts, span }))
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_kw("lambda") {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if self.eat_kw("if") {
            let test = self.parse_or()?;
            if !self.eat_kw("else") {
                return Err(self.src.expected("`else`", self.peek().span));
            }
            let orelse = self.parse_expr()?;
            let span = body.span().merge(orelse.span());
            return Ok(Expr::IfExp(IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
                span,
            }));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.advance().span;
        let mut params = Vec::new();
        while !self.at(TokenKind::Colon) {
            params.push(self.expect_name()?.text);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_expr()?;
        let span = start.merge(body.span());
        Ok(Expr::Lambda(Lambda {
            params,
            body: Box::new(body),
            span,
        }))
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_and()?;
        if !self.at_kw("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("or") {
            values.push(self.parse_and()?);
        }
        let span = values[0]
            .span()
            .merge(values.last().expect("nonempty").span());
        Ok(Expr::BoolOp(BoolOp {
            op: BoolOpKind::Or,
            values,
            span,
        }))
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_not()?;
        if !self.at_kw("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("and") {
            values.push(self.parse_not()?);
        }
        let span = values[0]
            .span()
            .merge(values.last().expect("nonempty").span());
        Ok(Expr::BoolOp(BoolOp {
            op: BoolOpKind::And,
            values,
            span,
        }))
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_kw("not") {
            let start = self.advance().span;
            let operand = self.parse_not()?;
            let span = start.merge(operand.span());
            return Ok(Expr::UnaryOp(UnaryOp {
                op: UnaryOpKind::Not,
                operand: Box::new(operand),
                span,
            }));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = if self.at_op("==") {
                CmpOpKind::Eq
            } else if self.at_op("!=") {
                CmpOpKind::NotEq
            } else if self.at_op("<=") {
                CmpOpKind::LtE
            } else if self.at_op(">=") {
                CmpOpKind::GtE
            } else if self.at_op("<") {
                CmpOpKind::Lt
            } else if self.at_op(">") {
                CmpOpKind::Gt
            } else if self.at_kw("in") {
                CmpOpKind::In
            } else if self.at_kw("not") && self.peek_ahead(1).is(TokenKind::Name, "in") {
                self.advance();
                CmpOpKind::NotIn
            } else if self.at_kw("is") {
                if self.peek_ahead(1).is(TokenKind::Name, "not") {
                    self.advance();
                    self.advance();
                    comparators.push(self.parse_bitor()?);
                    ops.push(CmpOpKind::IsNot);
                    continue;
                }
                CmpOpKind::Is
            } else {
                break;
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let span = left
            .span()
            .merge(comparators.last().expect("nonempty").span());
        Ok(Expr::Compare(Compare {
            left: Box::new(left),
            ops,
            comparators,
            span,
        }))
    }

    fn binop_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let mut left = next(self)?;
        loop {
            let Some(sym) = ops.iter().find(|o| self.at_op(o)).copied() else {
                break;
            };
            self.advance();
            let right = next(self)?;
            let span = left.span().merge(right.span());
            left = Expr::BinOp(BinOp {
                left: Box::new(left),
                op: BinOpKind::from_symbol(sym).expect("symbol table covers ops"),
                right: Box::new(right),
                span,
            });
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["|"], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["^"], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["&"], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["<<", ">>"], Self::parse_arith)
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["+", "-"], Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        self.binop_level(&["*", "//", "/", "%", "@"], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = if self.at_op("-") {
            Some(UnaryOpKind::Neg)
        } else if self.at_op("+") {
            Some(UnaryOpKind::Pos)
        } else if self.at_op("~") {
            Some(UnaryOpKind::Invert)
        } else {
            None
        };
        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_factor()?;
            let span = start.merge(operand.span());
            return Ok(Expr::UnaryOp(UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            }));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_postfix()?;
        if self.eat_op("**") {
            let exp = self.parse_factor()?;
            let span = base.span().merge(exp.span());
            return Ok(Expr::BinOp(BinOp {
                left: Box::new(base),
                op: BinOpKind::Pow,
                right: Box::new(exp),
                span,
            }));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(TokenKind::LPar) {
                let mut args = Vec::new();
                while !self.at(TokenKind::RPar) {
                    args.push(self.parse_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let rpar = self.expect(TokenKind::RPar, "`)`")?;
                let span = expr.span().merge(rpar.span);
                expr = Expr::Call(Call {
                    func: Box::new(expr),
                    args,
                    span,
                });
            } else if self.at_op(".") {
                self.advance();
                let attr = self.expect_name()?;
                let span = expr.span().merge(attr.span);
                expr = Expr::Attribute(Attribute {
                    value: Box::new(expr),
                    attr: attr.text,
                    span,
                });
            } else if self.eat(TokenKind::LSqb) {
                let index = self.parse_testlist()?;
                let rsqb = self.expect(TokenKind::RSqb, "`]`")?;
                let span = expr.span().merge(rsqb.span);
                expr = Expr::Subscript(Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                    span,
                });
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Name => {
                self.advance();
                match tok.text.as_str() {
                    "True" => Ok(build::constant(Const::Bool(true), tok.span)),
                    "False" => Ok(build::constant(Const::Bool(false), tok.span)),
                    "None" => Ok(build::constant(Const::None, tok.span)),
                    name if is_keyword(name) => {
                        Err(self.src.expected("expression", tok.span))
                    }
                    name => Ok(build::name(name, tok.span)),
                }
            }
            TokenKind::Number => {
                self.advance();
                let digits: String = tok.text.replace('_', "");
                let value = if digits.contains('.')
                    || digits.contains('e')
                    || digits.contains('E')
                {
                    Const::Float(digits.parse::<f64>().map_err(|_| {
                        self.src.error("invalid number literal", tok.span)
                    })?)
                } else {
                    Const::Int(digits.parse::<i64>().map_err(|_| {
                        self.src.error("invalid number literal", tok.span)
                    })?)
                };
                Ok(build::constant(value, tok.span))
            }
            TokenKind::Str => {
                self.advance();
                Ok(build::constant(Const::Str(unquote(&tok.text)), tok.span))
            }
            TokenKind::LPar => {
                self.advance();
                if self.at(TokenKind::RPar) {
                    let rpar = self.advance();
                    return Ok(Expr::Tuple(ExprList {
                        elts: Vec::new(),
                        span: tok.span.merge(rpar.span),
                    }));
                }
                let inner = self.parse_testlist()?;
                let rpar = self.expect(TokenKind::RPar, "`)`")?;
                // Re-span a parenthesized tuple to include the brackets.
                if let Expr::Tuple(mut t) = inner {
                    t.span = tok.span.merge(rpar.span);
                    return Ok(Expr::Tuple(t));
                }
                Ok(inner)
            }
            TokenKind::LSqb => {
                self.advance();
                let mut elts = Vec::new();
                while !self.at(TokenKind::RSqb) {
                    elts.push(self.parse_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let rsqb = self.expect(TokenKind::RSqb, "`]`")?;
                Ok(Expr::List(ExprList {
                    elts,
                    span: tok.span.merge(rsqb.span),
                }))
            }
            _ => Err(self.src.expected("expression", tok.span)),
        }
    }
}

/// Strip quotes and process the minimal escape set.
fn unquote(raw: &str) -> String {
    let quote = raw.chars().next().unwrap_or('"');
    let inner = raw
        .strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse(src: &str) -> Module {
        parse_module(&SourceFile::new("t.py", src)).unwrap()
    }

    #[test]
    fn function_with_decorator() {
        let m = parse("@omp\ndef f(q, n=2):\n    return n\n");
        let Stmt::FunctionDef(f) = &m.body[0] else {
            panic!("expected def")
        };
        assert_eq!(f.name, "f");
        assert_eq!(f.decorators.len(), 1);
        assert_eq!(f.params.len(), 2);
        assert!(f.params[1].default.is_some());
    }

    #[test]
    fn with_call_and_body() {
        let m = parse("with omp(\"parallel\"):\n    x = 1\n");
        let Stmt::With(w) = &m.body[0] else {
            panic!("expected with")
        };
        assert_eq!(w.items.len(), 1);
        let Expr::Call(c) = &w.items[0].context else {
            panic!("expected call")
        };
        assert_eq!(c.func.tail_name(), Some("omp"));
        assert_eq!(w.body.len(), 1);
    }

    #[test]
    fn for_range_loop() {
        let m = parse("for i in range(0, 10, 2):\n    q.put(i)\n");
        let Stmt::For(f) = &m.body[0] else {
            panic!("expected for")
        };
        let Expr::Call(c) = &f.iter else {
            panic!("expected range call")
        };
        assert_eq!(c.args.len(), 3);
    }

    #[test]
    fn precedence_ladder() {
        let m = parse("x = 1 + 2 * 3 ** 2\n");
        let Stmt::Assign(a) = &m.body[0] else {
            panic!()
        };
        let Expr::BinOp(add) = &a.value else { panic!() };
        assert_eq!(add.op, BinOpKind::Add);
        let Expr::BinOp(mul) = add.right.as_ref() else {
            panic!()
        };
        assert_eq!(mul.op, BinOpKind::Mul);
    }

    #[test]
    fn aug_assign() {
        let m = parse("x += y + 1\n");
        let Stmt::AugAssign(a) = &m.body[0] else {
            panic!()
        };
        assert_eq!(a.op, BinOpKind::Add);
    }

    #[test]
    fn chained_comparison() {
        let m = parse("ok = 0 <= i < n\n");
        let Stmt::Assign(a) = &m.body[0] else { panic!() };
        let Expr::Compare(c) = &a.value else { panic!() };
        assert_eq!(c.ops, vec![CmpOpKind::LtE, CmpOpKind::Lt]);
    }

    #[test]
    fn nonlocal_and_global() {
        let m = parse("def f():\n    global g\n    nonlocal x, y\n    pass\n");
        let Stmt::FunctionDef(f) = &m.body[0] else {
            panic!()
        };
        assert!(matches!(&f.body[0], Stmt::Global(n) if n.names == ["g"]));
        assert!(matches!(&f.body[1], Stmt::Nonlocal(n) if n.names == ["x", "y"]));
    }

    #[test]
    fn expr_fragment_rejects_trailing() {
        let src = SourceFile::new("t.py", "a + b c");
        let toks = lexer::tokenize_fragment(&src, Span::new(0, src.text.len())).unwrap();
        let err = parse_expr_tokens(&src, &toks).unwrap_err();
        assert!(err.message.contains("expected `)`"));
    }

    #[test]
    fn stmt_fragment_with_semicolons() {
        let src = SourceFile::new("t.py", "omp_priv = 0; omp_out += omp_in");
        let toks = lexer::tokenize_fragment(&src, Span::new(0, src.text.len())).unwrap();
        let stmts = parse_stmts_tokens(&src, &toks).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[1], Stmt::AugAssign(_)));
    }

    #[test]
    fn try_finally_roundtrip() {
        let m = parse("try:\n    f()\nfinally:\n    g()\n");
        assert!(matches!(&m.body[0], Stmt::Try(_)));
    }

    #[test]
    fn tuple_assignment_target() {
        let m = parse("a, b = b, a\n");
        let Stmt::Assign(asn) = &m.body[0] else {
            panic!()
        };
        assert!(matches!(&asn.targets[0], Expr::Tuple(t) if t.elts.len() == 2));
    }
}
