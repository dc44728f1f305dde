#![forbid(unsafe_code)]

//! Abstract syntax for the Instruction Description Language.
//!
//! Nodes are produced by an external parser (instruction `operation()` bodies,
//! function bodies, CSR `sw_read()`/`sw_write()` bodies). The convenience
//! constructors on [`Expr`] and [`Stmt`] build nodes with an empty span, which
//! is what synthesized nodes and tests use.

mod printer;
mod visit;

use std::fmt;

use miette::SourceSpan;

pub use visit::{assigned_vars, contains_return, contains_stmt, declared_vars, lvalue_root};

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn no_span() -> Span {
    span(0, 0)
}

pub type Ident = Spanned<String>;

pub fn ident(name: impl Into<String>) -> Ident {
    Spanned::new(no_span(), name.into())
}

/// Where a definition came from (architecture YAML file and line).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// The node that introduced a symbol table scope, kept for callstack rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeOwner {
    pub label: String,
    pub span: Span,
    pub origin: Option<Origin>,
}

impl ScopeOwner {
    pub fn new(label: impl Into<String>, span: Span) -> Self {
        Self {
            label: label.into(),
            span,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<Origin>) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Display for ScopeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{} ({origin})", self.label),
            None => write!(f, "{} (@{})", self.label, self.span.offset()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Ident),
    Literal(Literal),
    /// `EnumClass::Member`
    EnumRef {
        class: Ident,
        member: Ident,
    },
    /// `[a, b, c]`
    ArrayLit(Vec<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// `cond ? then_expr : else_expr`
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `base[msb:lsb]`
    Slice {
        base: Box<Expr>,
        msb: Box<Expr>,
        lsb: Box<Expr>,
    },
    /// `name<template_args>(args)`
    Call {
        name: Ident,
        template_args: Vec<Expr>,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Bits {
        value: u128,
        width: Option<u32>,
        radix: Radix,
    },
    Bool(bool),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Radix {
    Dec,
    Hex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    Shl,
    Shr,
    Sra,

    BitAnd,
    BitOr,
    BitXor,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Sra => ">>>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// The relational operator that holds exactly when `self` does not.
    pub fn negated_comparison(self) -> Option<BinOp> {
        Some(match self {
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            BinOp::Lt => BinOp::Ge,
            BinOp::Ge => BinOp::Lt,
            BinOp::Gt => BinOp::Le,
            BinOp::Le => BinOp::Gt,
            _ => return None,
        })
    }
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    pub fn synthetic(kind: ExprKind) -> Self {
        Self::new(no_span(), kind)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Ident(ident(name)))
    }

    pub fn int(value: u128) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Bits {
            value,
            width: None,
            radix: Radix::Dec,
        }))
    }

    pub fn sized_int(width: u32, value: u128) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Bits {
            value,
            width: Some(width),
            radix: if value <= 512 { Radix::Dec } else { Radix::Hex },
        }))
    }

    pub fn bool(value: bool) -> Self {
        Self::synthetic(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn enum_ref(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::EnumRef {
            class: ident(class),
            member: ident(member),
        })
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::synthetic(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Self::synthetic(ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Self::synthetic(ExprKind::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Self::synthetic(ExprKind::Index {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn slice(base: Expr, msb: Expr, lsb: Expr) -> Self {
        Self::synthetic(ExprKind::Slice {
            base: Box::new(base),
            msb: Box::new(msb),
            lsb: Box::new(lsb),
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::templated_call(name, Vec::new(), args)
    }

    pub fn templated_call(name: impl Into<String>, template_args: Vec<Expr>, args: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::Call {
            name: ident(name),
            template_args,
            args,
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    pub fn as_bool_literal(&self) -> Option<bool> {
        match &self.kind {
            ExprKind::Literal(Literal::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// A type as written in source, resolved against a symbol table later.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    /// `Bits<width>`
    Bits(Box<Expr>),
    Boolean,
    String,
    /// `XReg`, an enum class, or any other named type.
    Named(Ident),
    /// `Bits<8> name[len]`
    Array {
        elem: Box<TypeName>,
        len: Box<Expr>,
    },
}

impl TypeName {
    pub fn bits(width: u32) -> Self {
        TypeName::Bits(Box::new(Expr::int(width as u128)))
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeName::Named(ident(name))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Decl(VarDecl),
    Assign(AssignStmt),
    If(IfStmt),
    For(ForLoop),
    Return(Option<Expr>),
    /// `return expr if cond;`
    CondReturn {
        cond: Expr,
        expr: Option<Expr>,
    },
    /// `action if cond;`
    CondStmt {
        cond: Expr,
        action: Box<Stmt>,
    },
    /// A scoped group of statements, produced when a branch carrying its own
    /// declarations is collapsed into its parent.
    Block(Vec<Stmt>),
    ExprStmt(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub ty: TypeName,
    pub name: Ident,
    pub constant: bool,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    /// An identifier, or an index/slice rooted at one.
    pub target: Expr,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Vec<Stmt>,
    pub elseifs: Vec<ElseIf>,
    pub else_body: Option<Vec<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElseIf {
    pub span: Span,
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForLoop {
    pub span: Span,
    pub init: VarDecl,
    pub cond: Expr,
    pub update: Box<Stmt>,
    pub body: Vec<Stmt>,
}

impl Stmt {
    pub fn new(span: Span, kind: StmtKind) -> Self {
        Self { span, kind }
    }

    pub fn synthetic(kind: StmtKind) -> Self {
        Self::new(no_span(), kind)
    }

    pub fn decl(ty: TypeName, name: impl Into<String>, init: Option<Expr>) -> Self {
        Self::synthetic(StmtKind::Decl(VarDecl {
            span: no_span(),
            ty,
            name: ident(name),
            constant: false,
            init,
        }))
    }

    pub fn assign(target: Expr, expr: Expr) -> Self {
        Self::synthetic(StmtKind::Assign(AssignStmt {
            span: no_span(),
            target,
            expr,
        }))
    }

    pub fn if_else(cond: Expr, body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Self {
        Self::synthetic(StmtKind::If(IfStmt {
            span: no_span(),
            cond,
            body,
            elseifs: Vec::new(),
            else_body,
        }))
    }

    pub fn if_chain(
        cond: Expr,
        body: Vec<Stmt>,
        elseifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    ) -> Self {
        Self::synthetic(StmtKind::If(IfStmt {
            span: no_span(),
            cond,
            body,
            elseifs: elseifs
                .into_iter()
                .map(|(cond, body)| ElseIf {
                    span: no_span(),
                    cond,
                    body,
                })
                .collect(),
            else_body,
        }))
    }

    pub fn for_loop(init: VarDecl, cond: Expr, update: Stmt, body: Vec<Stmt>) -> Self {
        Self::synthetic(StmtKind::For(ForLoop {
            span: no_span(),
            init,
            cond,
            update: Box::new(update),
            body,
        }))
    }

    pub fn ret(expr: Expr) -> Self {
        Self::synthetic(StmtKind::Return(Some(expr)))
    }

    pub fn cond_ret(cond: Expr, expr: Expr) -> Self {
        Self::synthetic(StmtKind::CondReturn {
            cond,
            expr: Some(expr),
        })
    }

    pub fn cond_stmt(cond: Expr, action: Stmt) -> Self {
        Self::synthetic(StmtKind::CondStmt {
            cond,
            action: Box::new(action),
        })
    }

    pub fn expr(expr: Expr) -> Self {
        Self::synthetic(StmtKind::ExprStmt(expr))
    }

    /// True for a statement that introduces a name into the enclosing scope.
    pub fn is_decl(&self) -> bool {
        matches!(self.kind, StmtKind::Decl(_))
    }
}

impl VarDecl {
    pub fn new(ty: TypeName, name: impl Into<String>, init: Option<Expr>) -> Self {
        Self {
            span: no_span(),
            ty,
            name: ident(name),
            constant: false,
            init,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeName,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeName) -> Self {
        Self {
            span: no_span(),
            name: ident(name),
            ty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// Body written in IDL next to the architecture definition.
    Authored,
    /// Implemented by the host (`raise`, `implemented?`, ...).
    Builtin,
    /// Body produced by a generator rather than written by hand.
    Generated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub span: Span,
    pub name: Ident,
    pub origin: Option<Origin>,
    pub kind: FunctionKind,
    pub templates: Vec<Param>,
    pub params: Vec<Param>,
    /// `None` for a function returning nothing.
    pub ret: Option<TypeName>,
    pub body: Option<FunctionBody>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionBody {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

impl FunctionBody {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            span: no_span(),
            stmts,
        }
    }
}

impl FunctionDef {
    pub fn authored(
        name: impl Into<String>,
        params: Vec<Param>,
        ret: Option<TypeName>,
        stmts: Vec<Stmt>,
    ) -> Self {
        Self {
            span: no_span(),
            name: ident(name),
            origin: None,
            kind: FunctionKind::Authored,
            templates: Vec::new(),
            params,
            ret,
            body: Some(FunctionBody::new(stmts)),
        }
    }

    pub fn builtin(name: impl Into<String>, params: Vec<Param>, ret: Option<TypeName>) -> Self {
        Self {
            span: no_span(),
            name: ident(name),
            origin: None,
            kind: FunctionKind::Builtin,
            templates: Vec::new(),
            params,
            ret,
            body: None,
        }
    }

    pub fn with_templates(mut self, templates: Vec<Param>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_origin(mut self, file: impl Into<String>, line: u32) -> Self {
        self.origin = Some(Origin {
            file: file.into(),
            line,
        });
        self
    }

    pub fn is_templated(&self) -> bool {
        !self.templates.is_empty()
    }

    pub fn scope_owner(&self) -> ScopeOwner {
        ScopeOwner::new(format!("function {}", self.name.node), self.span)
            .with_origin(self.origin.clone())
    }
}

/// An instruction encoding field visible in the instruction's `operation()`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeField {
    pub name: Ident,
    pub width: u32,
}

/// The `operation()` body of one instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub span: Span,
    pub instruction: Ident,
    pub origin: Option<Origin>,
    pub decode_fields: Vec<DecodeField>,
    pub body: FunctionBody,
}

impl Operation {
    pub fn new(instruction: impl Into<String>, decode_fields: &[(&str, u32)], stmts: Vec<Stmt>) -> Self {
        Self {
            span: no_span(),
            instruction: ident(instruction),
            origin: None,
            decode_fields: decode_fields
                .iter()
                .map(|(name, width)| DecodeField {
                    name: ident(*name),
                    width: *width,
                })
                .collect(),
            body: FunctionBody::new(stmts),
        }
    }

    pub fn scope_owner(&self) -> ScopeOwner {
        ScopeOwner::new(format!("instruction {}", self.instruction.node), self.span)
            .with_origin(self.origin.clone())
    }
}
