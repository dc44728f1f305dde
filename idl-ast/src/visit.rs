#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::{Expr, ExprKind, Stmt, StmtKind};

/// The variable an assignment target ultimately writes to (`x`, `x[i]`, `x[7:0]`).
pub fn lvalue_root(target: &Expr) -> Option<&str> {
    match &target.kind {
        ExprKind::Ident(id) => Some(id.node.as_str()),
        ExprKind::Index { base, .. } | ExprKind::Slice { base, .. } => lvalue_root(base),
        _ => None,
    }
}

/// Every variable written anywhere in `stmts`, including nested bodies and
/// loop updates.
pub fn assigned_vars(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for stmt in stmts {
        collect_stmt(stmt, &mut out);
    }
    out
}

fn collect_stmt(stmt: &Stmt, out: &mut BTreeSet<String>) {
    match &stmt.kind {
        StmtKind::Assign(assign) => {
            if let Some(root) = lvalue_root(&assign.target) {
                out.insert(root.to_string());
            }
        }
        StmtKind::If(if_stmt) => {
            collect_all(&if_stmt.body, out);
            for elseif in &if_stmt.elseifs {
                collect_all(&elseif.body, out);
            }
            if let Some(else_body) = &if_stmt.else_body {
                collect_all(else_body, out);
            }
        }
        StmtKind::For(for_loop) => {
            collect_stmt(&for_loop.update, out);
            collect_all(&for_loop.body, out);
        }
        StmtKind::CondStmt { action, .. } => collect_stmt(action, out),
        StmtKind::Block(stmts) => collect_all(stmts, out),
        StmtKind::Decl(_)
        | StmtKind::Return(_)
        | StmtKind::CondReturn { .. }
        | StmtKind::ExprStmt(_) => {}
    }
}

fn collect_all(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        collect_stmt(stmt, out);
    }
}

/// Every local declared anywhere in `stmts`, loop variables included.
pub fn declared_vars(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk(stmts, &mut |stmt| {
        match &stmt.kind {
            StmtKind::Decl(decl) => {
                out.insert(decl.name.node.clone());
            }
            StmtKind::For(for_loop) => {
                out.insert(for_loop.init.name.node.clone());
            }
            _ => {}
        }
        false
    });
    out
}

/// Whether any statement in `stmts`, at any depth, satisfies `pred`.
pub fn contains_stmt(stmts: &[Stmt], pred: impl Fn(&Stmt) -> bool) -> bool {
    walk(stmts, &mut |stmt| pred(stmt))
}

/// Whether `stmts` has a plain or conditional return at any depth.
pub fn contains_return(stmts: &[Stmt]) -> bool {
    contains_stmt(stmts, |stmt| {
        matches!(stmt.kind, StmtKind::Return(_) | StmtKind::CondReturn { .. })
    })
}

/// Pre-order walk that stops as soon as `visit` returns true.
fn walk(stmts: &[Stmt], visit: &mut dyn FnMut(&Stmt) -> bool) -> bool {
    stmts.iter().any(|stmt| walk_stmt(stmt, visit))
}

fn walk_stmt(stmt: &Stmt, visit: &mut dyn FnMut(&Stmt) -> bool) -> bool {
    if visit(stmt) {
        return true;
    }
    match &stmt.kind {
        StmtKind::If(if_stmt) => {
            walk(&if_stmt.body, visit)
                || if_stmt.elseifs.iter().any(|e| walk(&e.body, visit))
                || if_stmt
                    .else_body
                    .as_deref()
                    .is_some_and(|body| walk(body, visit))
        }
        StmtKind::For(for_loop) => {
            walk_stmt(&for_loop.update, visit) || walk(&for_loop.body, visit)
        }
        StmtKind::CondStmt { action, .. } => walk_stmt(action, visit),
        StmtKind::Block(stmts) => walk(stmts, visit),
        StmtKind::Decl(_)
        | StmtKind::Assign(_)
        | StmtKind::Return(_)
        | StmtKind::CondReturn { .. }
        | StmtKind::ExprStmt(_) => false,
    }
}
