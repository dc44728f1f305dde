#![forbid(unsafe_code)]

//! Renders nodes back to IDL source text.

use std::fmt::{self, Display, Formatter, Write};

use crate::{
    Expr, ExprKind, FunctionDef, Literal, Operation, Radix, Stmt, StmtKind, TypeName, UnaryOp,
    VarDecl,
};

const INDENT: &str = "  ";

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bits {
                value,
                width: Some(w),
                radix: Radix::Dec,
            } => write!(f, "{w}'d{value}"),
            Literal::Bits {
                value,
                width: Some(w),
                radix: Radix::Hex,
            } => write!(f, "{w}'h{value:x}"),
            Literal::Bits {
                value,
                width: None,
                radix: Radix::Dec,
            } => write!(f, "{value}"),
            Literal::Bits {
                value,
                width: None,
                radix: Radix::Hex,
            } => write!(f, "0x{value:x}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::String(s) => write!(f, "{s:?}"),
        }
    }
}

fn needs_parens(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Binary { .. } | ExprKind::Ternary { .. })
}

fn write_operand(f: &mut Formatter<'_>, expr: &Expr) -> fmt::Result {
    if needs_parens(expr) {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_list(f: &mut Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Ident(id) => f.write_str(&id.node),
            ExprKind::Literal(lit) => write!(f, "{lit}"),
            ExprKind::EnumRef { class, member } => write!(f, "{}::{}", class.node, member.node),
            ExprKind::ArrayLit(items) => {
                f.write_char('[')?;
                write_list(f, items)?;
                f.write_char(']')
            }
            ExprKind::Unary { op, expr } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                };
                f.write_str(sym)?;
                write_operand(f, expr)
            }
            ExprKind::Binary { left, op, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right)
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                write_operand(f, cond)?;
                f.write_str(" ? ")?;
                write_operand(f, then_expr)?;
                f.write_str(" : ")?;
                write_operand(f, else_expr)
            }
            ExprKind::Index { base, index } => {
                write_operand(f, base)?;
                write!(f, "[{index}]")
            }
            ExprKind::Slice { base, msb, lsb } => {
                write_operand(f, base)?;
                write!(f, "[{msb}:{lsb}]")
            }
            ExprKind::Call {
                name,
                template_args,
                args,
            } => {
                f.write_str(&name.node)?;
                if !template_args.is_empty() {
                    f.write_char('<')?;
                    write_list(f, template_args)?;
                    f.write_char('>')?;
                }
                f.write_char('(')?;
                write_list(f, args)?;
                f.write_char(')')
            }
        }
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Bits(width) => write!(f, "Bits<{width}>"),
            TypeName::Boolean => f.write_str("Boolean"),
            TypeName::String => f.write_str("String"),
            TypeName::Named(id) => f.write_str(&id.node),
            TypeName::Array { elem, .. } => write!(f, "{elem}"),
        }
    }
}

fn write_decl(f: &mut Formatter<'_>, decl: &VarDecl) -> fmt::Result {
    write!(f, "{} {}", decl.ty, decl.name.node)?;
    if let TypeName::Array { len, .. } = &decl.ty {
        write!(f, "[{len}]")?;
    }
    if let Some(init) = &decl.init {
        write!(f, " = {init}")?;
    }
    Ok(())
}

/// Statement text without the trailing `;`, for loop updates and guarded actions.
fn write_simple(f: &mut Formatter<'_>, stmt: &Stmt) -> fmt::Result {
    match &stmt.kind {
        StmtKind::Decl(decl) => write_decl(f, decl),
        StmtKind::Assign(assign) => write!(f, "{} = {}", assign.target, assign.expr),
        StmtKind::ExprStmt(expr) => write!(f, "{expr}"),
        StmtKind::Return(Some(expr)) => write!(f, "return {expr}"),
        StmtKind::Return(None) => f.write_str("return"),
        _ => write_stmt(f, stmt, 0),
    }
}

fn write_body(f: &mut Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    f.write_str("{\n")?;
    for stmt in stmts {
        write_stmt(f, stmt, depth + 1)?;
    }
    write!(f, "{}}}", INDENT.repeat(depth))
}

fn write_stmt(f: &mut Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    f.write_str(&pad)?;
    match &stmt.kind {
        StmtKind::Decl(_)
        | StmtKind::Assign(_)
        | StmtKind::ExprStmt(_)
        | StmtKind::Return(_) => {
            write_simple(f, stmt)?;
            f.write_str(";\n")
        }
        StmtKind::CondReturn { cond, expr } => {
            match expr {
                Some(expr) => write!(f, "return {expr} if {cond};")?,
                None => write!(f, "return if {cond};")?,
            }
            f.write_char('\n')
        }
        StmtKind::CondStmt { cond, action } => {
            write_simple(f, action)?;
            writeln!(f, " if {cond};")
        }
        StmtKind::If(if_stmt) => {
            write!(f, "if ({}) ", if_stmt.cond)?;
            write_body(f, &if_stmt.body, depth)?;
            for elseif in &if_stmt.elseifs {
                write!(f, " else if ({}) ", elseif.cond)?;
                write_body(f, &elseif.body, depth)?;
            }
            if let Some(else_body) = &if_stmt.else_body {
                f.write_str(" else ")?;
                write_body(f, else_body, depth)?;
            }
            f.write_char('\n')
        }
        StmtKind::For(for_loop) => {
            f.write_str("for (")?;
            write_decl(f, &for_loop.init)?;
            write!(f, "; {}; ", for_loop.cond)?;
            write_simple(f, &for_loop.update)?;
            f.write_str(") ")?;
            write_body(f, &for_loop.body, depth)?;
            f.write_char('\n')
        }
        StmtKind::Block(stmts) => {
            write_body(f, stmts, depth)?;
            f.write_char('\n')
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl Display for FunctionDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("function ")?;
        f.write_str(&self.name.node)?;
        if !self.templates.is_empty() {
            f.write_char('<')?;
            for (i, t) in self.templates.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} {}", t.ty, t.name.node)?;
            }
            f.write_char('>')?;
        }
        f.write_char('(')?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", p.ty, p.name.node)?;
        }
        f.write_char(')')?;
        if let Some(ret) = &self.ret {
            write!(f, " -> {ret}")?;
        }
        match &self.body {
            Some(body) => {
                f.write_char(' ')?;
                write_body(f, &body.stmts, 0)?;
                f.write_char('\n')
            }
            None => f.write_str(";\n"),
        }
    }
}

/// `add.operation(rd: 5, rs1: 5) { ... }`, encoding fields with their widths.
impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.operation(", self.instruction.node)?;
        for (i, field) in self.decode_fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name.node, field.width)?;
        }
        f.write_str(") ")?;
        write_body(f, &self.body.stmts, 0)?;
        f.write_char('\n')
    }
}
