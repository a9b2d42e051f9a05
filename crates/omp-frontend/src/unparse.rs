//! AST-to-source printer with canonical 4-space indentation.
//!
//! The printer emits minimally-parenthesized code: child expressions are
//! wrapped only when their precedence is lower than (or, on mismatched
//! sides, equal to) the parent's. `parse(unparse(ast))` is structurally
//! equal to `ast`, which the transform pipeline relies on when writing
//! rewritten files to disk.

use crate::ast::*;

pub fn unparse_module(module: &Module) -> String {
    let mut p = Printer::default();
    p.stmts(&module.body);
    p.out
}

pub fn unparse_stmts(stmts: &[Stmt]) -> String {
    let mut p = Printer::default();
    p.stmts(stmts);
    p.out
}

pub fn unparse_expr(expr: &Expr) -> String {
    let mut p = Printer::default();
    p.expr(expr, 0);
    p.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        if stmts.is_empty() {
            self.line_start();
            self.push("pass\n");
            return;
        }
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn block(&mut self, body: &[Stmt]) {
        self.push(":\n");
        self.indent += 1;
        self.stmts(body);
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(f) => {
                for dec in &f.decorators {
                    self.line_start();
                    self.push("@");
                    self.expr(dec, 0);
                    self.push("\n");
                }
                self.line_start();
                self.push("def ");
                self.push(&f.name);
                self.push("(");
                for (i, p) in f.params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&p.name);
                    if let Some(ann) = &p.annotation {
                        self.push(": ");
                        self.expr(ann, 0);
                    }
                    if let Some(d) = &p.default {
                        self.push("=");
                        self.expr(d, 0);
                    }
                }
                self.push(")");
                self.block(&f.body);
            }
            Stmt::ClassDef(c) => {
                for dec in &c.decorators {
                    self.line_start();
                    self.push("@");
                    self.expr(dec, 0);
                    self.push("\n");
                }
                self.line_start();
                self.push("class ");
                self.push(&c.name);
                if !c.bases.is_empty() {
                    self.push("(");
                    for (i, b) in c.bases.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.expr(b, 0);
                    }
                    self.push(")");
                }
                self.block(&c.body);
            }
            Stmt::If(s) => {
                self.if_chain(s, "if");
            }
            Stmt::While(s) => {
                self.line_start();
                self.push("while ");
                self.expr(&s.test, 0);
                self.block(&s.body);
            }
            Stmt::For(s) => {
                self.line_start();
                self.push("for ");
                self.expr_bare_tuple(&s.target);
                self.push(" in ");
                self.expr_bare_tuple(&s.iter);
                self.block(&s.body);
            }
            Stmt::With(s) => {
                self.line_start();
                self.push("with ");
                for (i, item) in s.items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(&item.context, 0);
                    if let Some(b) = &item.binding {
                        self.push(" as ");
                        self.push(b);
                    }
                }
                self.block(&s.body);
            }
            Stmt::Try(s) => {
                self.line_start();
                self.push("try");
                self.block(&s.body);
                self.line_start();
                self.push("finally");
                self.block(&s.finalbody);
            }
            Stmt::Return(s) => {
                self.line_start();
                self.push("return");
                if let Some(v) = &s.value {
                    self.push(" ");
                    self.expr_bare_tuple(v);
                }
                self.push("\n");
            }
            Stmt::Yield(s) => {
                self.line_start();
                self.push(if s.from { "yield from" } else { "yield" });
                if let Some(v) = &s.value {
                    self.push(" ");
                    self.expr_bare_tuple(v);
                }
                self.push("\n");
            }
            Stmt::Assign(s) => {
                self.line_start();
                for t in &s.targets {
                    self.expr_bare_tuple(t);
                    self.push(" = ");
                }
                self.expr_bare_tuple(&s.value);
                self.push("\n");
            }
            Stmt::AnnAssign(s) => {
                self.line_start();
                self.expr(&s.target, 0);
                self.push(": ");
                self.expr(&s.annotation, 0);
                if let Some(v) = &s.value {
                    self.push(" = ");
                    self.expr_bare_tuple(v);
                }
                self.push("\n");
            }
            Stmt::AugAssign(s) => {
                self.line_start();
                self.expr(&s.target, 0);
                self.push(" ");
                self.push(s.op.symbol());
                self.push("= ");
                self.expr_bare_tuple(&s.value);
                self.push("\n");
            }
            Stmt::Expr(s) => {
                self.line_start();
                self.expr_bare_tuple(&s.value);
                self.push("\n");
            }
            Stmt::Delete(s) => {
                self.line_start();
                self.push("del ");
                for (i, t) in s.targets.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(t, 0);
                }
                self.push("\n");
            }
            Stmt::Global(s) => {
                self.line_start();
                self.push("global ");
                self.push(&s.names.join(", "));
                self.push("\n");
            }
            Stmt::Nonlocal(s) => {
                self.line_start();
                self.push("nonlocal ");
                self.push(&s.names.join(", "));
                self.push("\n");
            }
            Stmt::Import(s) => {
                self.line_start();
                if let Some(m) = &s.from_module {
                    self.push("from ");
                    self.push(m);
                    self.push(" import ");
                } else {
                    self.push("import ");
                }
                for (i, alias) in s.names.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(&alias.name);
                    if let Some(a) = &alias.asname {
                        self.push(" as ");
                        self.push(a);
                    }
                }
                self.push("\n");
            }
            Stmt::Pass(_) => {
                self.line_start();
                self.push("pass\n");
            }
            Stmt::Break(_) => {
                self.line_start();
                self.push("break\n");
            }
            Stmt::Continue(_) => {
                self.line_start();
                self.push("continue\n");
            }
        }
    }

    fn if_chain(&mut self, s: &If, head: &str) {
        self.line_start();
        self.push(head);
        self.push(" ");
        self.expr(&s.test, 0);
        self.block(&s.body);
        if s.orelse.is_empty() {
            return;
        }
        // `elif` compression when the else-branch is a lone `if`.
        if s.orelse.len() == 1 {
            if let Stmt::If(inner) = &s.orelse[0] {
                self.if_chain(inner, "elif");
                return;
            }
        }
        self.line_start();
        self.push("else");
        self.block(&s.orelse);
    }

    /// Print a tuple without parentheses (targets, return values).
    fn expr_bare_tuple(&mut self, expr: &Expr) {
        if let Expr::Tuple(t) = expr {
            if t.elts.is_empty() {
                self.push("()");
                return;
            }
            for (i, e) in t.elts.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(e, 0);
            }
            if t.elts.len() == 1 {
                self.push(",");
            }
            return;
        }
        self.expr(expr, 0);
    }

    /// Print `expr`, parenthesizing if its precedence is below `min_prec`.
    fn expr(&mut self, expr: &Expr, min_prec: u8) {
        let prec = precedence(expr);
        let need_parens = prec < min_prec;
        if need_parens {
            self.push("(");
        }
        match expr {
            Expr::Name(n) => self.push(&n.id),
            Expr::Attribute(a) => {
                self.expr(&a.value, PREC_POSTFIX);
                self.push(".");
                self.push(&a.attr);
            }
            Expr::Call(c) => {
                self.expr(&c.func, PREC_POSTFIX);
                self.push("(");
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(a, 0);
                }
                self.push(")");
            }
            Expr::Subscript(s) => {
                self.expr(&s.value, PREC_POSTFIX);
                self.push("[");
                self.expr_bare_tuple(&s.index);
                self.push("]");
            }
            Expr::Constant(c) => self.constant(&c.value),
            Expr::Tuple(t) => {
                self.push("(");
                for (i, e) in t.elts.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(e, 0);
                }
                if t.elts.len() == 1 {
                    self.push(",");
                }
                self.push(")");
            }
            Expr::List(l) => {
                self.push("[");
                for (i, e) in l.elts.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(e, 0);
                }
                self.push("]");
            }
            Expr::BinOp(b) => {
                // Left-associative: the right child needs strictly higher
                // precedence to stay unparenthesized. Power is the one
                // right-associative case.
                let (lp, rp) = if b.op == BinOpKind::Pow {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.expr(&b.left, lp);
                self.push(" ");
                self.push(b.op.symbol());
                self.push(" ");
                self.expr(&b.right, rp);
            }
            Expr::BoolOp(b) => {
                let word = match b.op {
                    BoolOpKind::And => " and ",
                    BoolOpKind::Or => " or ",
                };
                for (i, v) in b.values.iter().enumerate() {
                    if i > 0 {
                        self.push(word);
                    }
                    self.expr(v, prec + 1);
                }
            }
            Expr::UnaryOp(u) => {
                match u.op {
                    UnaryOpKind::Not => self.push("not "),
                    UnaryOpKind::Neg => self.push("-"),
                    UnaryOpKind::Pos => self.push("+"),
                    UnaryOpKind::Invert => self.push("~"),
                }
                self.expr(&u.operand, prec);
            }
            Expr::Compare(c) => {
                self.expr(&c.left, prec + 1);
                for (op, right) in c.ops.iter().zip(&c.comparators) {
                    self.push(" ");
                    self.push(op.symbol());
                    self.push(" ");
                    self.expr(right, prec + 1);
                }
            }
            Expr::IfExp(e) => {
                self.expr(&e.body, prec + 1);
                self.push(" if ");
                self.expr(&e.test, prec + 1);
                self.push(" else ");
                self.expr(&e.orelse, prec);
            }
            Expr::Lambda(l) => {
                self.push("lambda");
                if !l.params.is_empty() {
                    self.push(" ");
                    self.push(&l.params.join(", "));
                }
                self.push(": ");
                self.expr(&l.body, 0);
            }
        }
        if need_parens {
            self.push(")");
        }
    }

    fn constant(&mut self, c: &Const) {
        match c {
            Const::Int(i) => self.push(&i.to_string()),
            Const::Float(f) => {
                let s = if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                };
                self.push(&s);
            }
            Const::Str(s) => {
                self.push("\"");
                for ch in s.chars() {
                    match ch {
                        '"' => self.push("\\\""),
                        '\\' => self.push("\\\\"),
                        '\n' => self.push("\\n"),
                        '\t' => self.push("\\t"),
                        '\r' => self.push("\\r"),
                        _ => self.out.push(ch),
                    }
                }
                self.push("\"");
            }
            Const::Bool(true) => self.push("True"),
            Const::Bool(false) => self.push("False"),
            Const::None => self.push("None"),
        }
    }
}

const PREC_POSTFIX: u8 = 12;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Lambda(_) => 0,
        Expr::IfExp(_) => 1,
        Expr::BoolOp(b) => match b.op {
            BoolOpKind::Or => 2,
            BoolOpKind::And => 3,
        },
        Expr::UnaryOp(u) if u.op == UnaryOpKind::Not => 4,
        Expr::Compare(_) => 5,
        Expr::BinOp(b) => match b.op {
            BinOpKind::BitOr => 6,
            BinOpKind::BitXor => 7,
            BinOpKind::BitAnd => 8,
            BinOpKind::LShift | BinOpKind::RShift => 9,
            BinOpKind::Add | BinOpKind::Sub => 10,
            BinOpKind::Mul
            | BinOpKind::Div
            | BinOpKind::FloorDiv
            | BinOpKind::Mod
            | BinOpKind::MatMul => 11,
            BinOpKind::Pow => 13,
        },
        Expr::UnaryOp(_) => 12,
        _ => 14,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::SourceFile;
    use crate::parser::parse_module;
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) -> String {
        let module = parse_module(&SourceFile::new("t.py", src)).unwrap();
        unparse_module(&module)
    }

    #[test]
    fn simple_function() {
        let out = roundtrip("def f(x):\n    return x + 1\n");
        assert_eq!(out, "def f(x):\n    return x + 1\n");
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let out = roundtrip("x = (1 + 2) * 3\n");
        assert_eq!(out, "x = (1 + 2) * 3\n");
        let out = roundtrip("x = 1 + 2 * 3\n");
        assert_eq!(out, "x = 1 + 2 * 3\n");
    }

    #[test]
    fn elif_chain_preserved() {
        let src = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn reparse_is_stable() {
        let src = "\
def f(q):
    x = 0
    with omp(\"parallel for reduction(+: x)\"):
        for i in range(10):
            x += i
    return x
";
        let first = parse_module(&SourceFile::new("t.py", src)).unwrap();
        let printed = unparse_module(&first);
        let second = parse_module(&SourceFile::new("t.py", &*printed)).unwrap();
        assert_eq!(unparse_module(&second), printed);
    }

    #[test]
    fn string_escapes() {
        let out = roundtrip("s = \"a\\nb\\\"c\"\n");
        assert_eq!(out, "s = \"a\\nb\\\"c\"\n");
    }

    #[test]
    fn try_finally() {
        let src = "try:\n    f()\nfinally:\n    g()\n";
        assert_eq!(roundtrip(src), src);
    }
}
