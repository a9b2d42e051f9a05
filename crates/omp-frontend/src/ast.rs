//! AST for the host language subset the transformer understands.
//!
//! Nodes carry their source [`Span`]; synthesized nodes inherit the span of
//! the directive that produced them so diagnostics and generated code keep
//! pointing at user source.

use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    If(If),
    While(While),
    For(For),
    With(With),
    Try(Try),
    Return(Return),
    Yield(YieldStmt),
    Assign(Assign),
    AnnAssign(AnnAssign),
    AugAssign(AugAssign),
    Expr(ExprStmt),
    Delete(Delete),
    Global(NameList),
    Nonlocal(NameList),
    Import(Import),
    Pass(Span),
    Break(Span),
    Continue(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::FunctionDef(s) => s.span,
            Stmt::ClassDef(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::With(s) => s.span,
            Stmt::Try(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Yield(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::AnnAssign(s) => s.span,
            Stmt::AugAssign(s) => s.span,
            Stmt::Expr(s) => s.span,
            Stmt::Delete(s) => s.span,
            Stmt::Global(s) | Stmt::Nonlocal(s) => s.span,
            Stmt::Import(s) => s.span,
            Stmt::Pass(sp) | Stmt::Break(sp) | Stmt::Continue(sp) => *sp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub binding: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct With {
    pub items: Vec<WithItem>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Try {
    pub body: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldStmt {
    pub value: Option<Expr>,
    pub from: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub targets: Vec<Expr>,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnAssign {
    pub target: Expr,
    pub annotation: Expr,
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AugAssign {
    pub target: Expr,
    pub op: BinOpKind,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub targets: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameList {
    pub names: Vec<String>,
    pub span: Span,
}

/// `import a.b as c` / `from m import a as b, c`. Bodies are opaque to the
/// transformer; only the bound names matter for scoping.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub from_module: Option<String>,
    pub names: Vec<ImportAlias>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub name: String,
    pub asname: Option<String>,
}

impl ImportAlias {
    /// The identifier this alias binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(n) => n,
            // `import a.b` binds `a`.
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(Name),
    Attribute(Attribute),
    Call(Call),
    Subscript(Subscript),
    Constant(Constant),
    Tuple(ExprList),
    List(ExprList),
    BinOp(BinOp),
    BoolOp(BoolOp),
    UnaryOp(UnaryOp),
    Compare(Compare),
    IfExp(IfExp),
    Lambda(Lambda),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Name(e) => e.span,
            Expr::Attribute(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Subscript(e) => e.span,
            Expr::Constant(e) => e.span,
            Expr::Tuple(e) | Expr::List(e) => e.span,
            Expr::BinOp(e) => e.span,
            Expr::BoolOp(e) => e.span,
            Expr::UnaryOp(e) => e.span,
            Expr::Compare(e) => e.span,
            Expr::IfExp(e) => e.span,
            Expr::Lambda(e) => e.span,
        }
    }

    /// The leftmost dotted name of an expression head: `a.b(x)[0]` → `a`.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(&n.id),
            Expr::Attribute(a) => a.value.head_name(),
            Expr::Call(c) => c.func.head_name(),
            Expr::Subscript(s) => s.value.head_name(),
            _ => None,
        }
    }

    /// The rightmost simple name: `a.b` → `b`, `f(x)` → `f`'s rightmost.
    pub fn tail_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(&n.id),
            Expr::Attribute(a) => Some(&a.attr),
            Expr::Call(c) => c.func.tail_name(),
            Expr::Subscript(s) => s.value.tail_name(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub id: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub value: Box<Expr>,
    pub attr: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscript {
    pub value: Box<Expr>,
    pub index: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Const,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl Const {
    pub fn truthy(&self) -> bool {
        match self {
            Const::Int(i) => *i != 0,
            Const::Float(f) => *f != 0.0,
            Const::Str(s) => !s.is_empty(),
            Const::Bool(b) => *b,
            Const::None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprList {
    pub elts: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    MatMul,
}

impl BinOpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::FloorDiv => "//",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
            BinOpKind::LShift => "<<",
            BinOpKind::RShift => ">>",
            BinOpKind::BitAnd => "&",
            BinOpKind::BitOr => "|",
            BinOpKind::BitXor => "^",
            BinOpKind::MatMul => "@",
        }
    }

    pub fn from_symbol(sym: &str) -> Option<Self> {
        Some(match sym {
            "+" => BinOpKind::Add,
            "-" => BinOpKind::Sub,
            "*" => BinOpKind::Mul,
            "/" => BinOpKind::Div,
            "//" => BinOpKind::FloorDiv,
            "%" => BinOpKind::Mod,
            "**" => BinOpKind::Pow,
            "<<" => BinOpKind::LShift,
            ">>" => BinOpKind::RShift,
            "&" => BinOpKind::BitAnd,
            "|" => BinOpKind::BitOr,
            "^" => BinOpKind::BitXor,
            "@" => BinOpKind::MatMul,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinOp {
    pub left: Box<Expr>,
    pub op: BinOpKind,
    pub right: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolOp {
    pub op: BoolOpKind,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOp {
    pub op: UnaryOpKind,
    pub operand: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOpKind::Eq => "==",
            CmpOpKind::NotEq => "!=",
            CmpOpKind::Lt => "<",
            CmpOpKind::LtE => "<=",
            CmpOpKind::Gt => ">",
            CmpOpKind::GtE => ">=",
            CmpOpKind::In => "in",
            CmpOpKind::NotIn => "not in",
            CmpOpKind::Is => "is",
            CmpOpKind::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compare {
    pub left: Box<Expr>,
    pub ops: Vec<CmpOpKind>,
    pub comparators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExp {
    pub test: Box<Expr>,
    pub body: Box<Expr>,
    pub orelse: Box<Expr>,
    pub span: Span,
}

/// Parsed but never recursed into by the transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Expr>,
    pub span: Span,
}

/// Convenience constructors for synthesized nodes. All take the span the
/// generated code should report (usually the originating directive's).
pub mod build {
    use super::*;

    pub fn name(id: impl Into<String>, span: Span) -> Expr {
        Expr::Name(Name {
            id: id.into(),
            span,
        })
    }

    pub fn store_name(id: impl Into<String>, span: Span) -> Expr {
        name(id, span)
    }

    pub fn constant(value: Const, span: Span) -> Expr {
        Expr::Constant(Constant { value, span })
    }

    pub fn int(v: i64, span: Span) -> Expr {
        constant(Const::Int(v), span)
    }

    pub fn bool_(v: bool, span: Span) -> Expr {
        constant(Const::Bool(v), span)
    }

    pub fn str_(v: impl Into<String>, span: Span) -> Expr {
        constant(Const::Str(v.into()), span)
    }

    /// Build `a.b.c` (or a bare name) from a dotted path.
    pub fn dotted(path: &str, span: Span) -> Expr {
        let mut parts = path.split('.');
        let mut expr = name(parts.next().expect("non-empty path"), span);
        for part in parts {
            expr = Expr::Attribute(Attribute {
                value: Box::new(expr),
                attr: part.to_string(),
                span,
            });
        }
        expr
    }

    /// Build a call to a dotted path with positional args.
    pub fn call(path: &str, args: Vec<Expr>, span: Span) -> Expr {
        Expr::Call(Call {
            func: Box::new(dotted(path, span)),
            args,
            span,
        })
    }

    pub fn call_expr(func: Expr, args: Vec<Expr>, span: Span) -> Expr {
        Expr::Call(Call {
            func: Box::new(func),
            args,
            span,
        })
    }

    pub fn subscript(value: Expr, index: Expr, span: Span) -> Expr {
        Expr::Subscript(Subscript {
            value: Box::new(value),
            index: Box::new(index),
            span,
        })
    }

    pub fn assign(target: Expr, value: Expr, span: Span) -> Stmt {
        Stmt::Assign(Assign {
            targets: vec![target],
            value,
            span,
        })
    }

    pub fn aug_assign(target: Expr, op: BinOpKind, value: Expr, span: Span) -> Stmt {
        Stmt::AugAssign(AugAssign {
            target,
            op,
            value,
            span,
        })
    }

    pub fn expr_stmt(value: Expr, span: Span) -> Stmt {
        Stmt::Expr(ExprStmt { value, span })
    }

    pub fn function_def(name: impl Into<String>, span: Span) -> FunctionDef {
        FunctionDef {
            name: name.into(),
            params: Vec::new(),
            body: Vec::new(),
            decorators: Vec::new(),
            span,
        }
    }

    pub fn binop(left: Expr, op: BinOpKind, right: Expr, span: Span) -> Expr {
        Expr::BinOp(BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
            span,
        })
    }

    pub fn compare(left: Expr, op: CmpOpKind, right: Expr, span: Span) -> Expr {
        Expr::Compare(Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
            span,
        })
    }

    pub fn not(operand: Expr, span: Span) -> Expr {
        Expr::UnaryOp(UnaryOp {
            op: UnaryOpKind::Not,
            operand: Box::new(operand),
            span,
        })
    }

    pub fn if_exp(test: Expr, body: Expr, orelse: Expr, span: Span) -> Expr {
        Expr::IfExp(IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
            span,
        })
    }

    pub fn try_finally(body: Vec<Stmt>, finalbody: Vec<Stmt>, span: Span) -> Stmt {
        Stmt::Try(Try {
            body,
            finalbody,
            span,
        })
    }

    pub fn pass(span: Span) -> Stmt {
        Stmt::Pass(span)
    }
}
