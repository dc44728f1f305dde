#![forbid(unsafe_code)]

//! Partial evaluation of IDL against a symbol table.
//!
//! Pruning is sequential abstract interpretation: statements are visited in
//! order, and declarations and assignments update the known values in the
//! table so later statements fold against them. Anything that cannot be
//! decided keeps its structure, with its children pruned.

use std::collections::BTreeSet;

use idl_ast::{
    assigned_vars, lvalue_root, AssignStmt, BinOp, ElseIf, Expr, ExprKind, ForLoop, FunctionBody,
    FunctionDef, FunctionKind, IfStmt, Literal, Operation, Radix, ScopeOwner, Span, Stmt, StmtKind,
    TypeName, VarDecl,
};
use tracing::{debug, trace};

use crate::error::IdlError;
use crate::eval::{bind_function_args, literal_for, type_of, value_of};
use crate::symtab::{SymbolTable, NORETURN_BUILTINS};
use crate::types::Type;
use crate::value::{mask, Value};
use crate::var::Var;

pub trait Prune {
    type Output;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<Self::Output, IdlError>;
}

/// Whether control can continue past a pruned statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    FallThrough,
    Terminated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrunedStmts {
    pub stmts: Vec<Stmt>,
    pub flow: Flow,
}

impl PrunedStmts {
    fn empty() -> Self {
        Self {
            stmts: Vec::new(),
            flow: Flow::FallThrough,
        }
    }

    fn one(stmt: Stmt, flow: Flow) -> Self {
        Self {
            stmts: vec![stmt],
            flow,
        }
    }
}

impl Prune for Expr {
    type Output = Expr;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<Expr, IdlError> {
        prune_expr(self, symtab)
    }
}

pub fn prune_expr(expr: &Expr, symtab: &SymbolTable) -> Result<Expr, IdlError> {
    if expr.is_literal() {
        return Ok(expr.clone());
    }
    if let Some(value) = value_of(expr, symtab)? {
        let ty = type_of(expr, symtab)?;
        return Ok(literal_for(&value, ty.as_ref(), symtab, expr.span));
    }

    let kind = match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Literal(_) | ExprKind::EnumRef { .. } => {
            return Ok(expr.clone());
        }
        ExprKind::ArrayLit(items) => ExprKind::ArrayLit(prune_exprs(items, symtab)?),
        ExprKind::Unary { op, expr: inner } => ExprKind::Unary {
            op: *op,
            expr: Box::new(prune_expr(inner, symtab)?),
        },
        ExprKind::Binary { left, op, right } => return prune_binary(expr, left, *op, right, symtab),
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            let cond = prune_expr(cond, symtab)?;
            match cond.as_bool_literal() {
                Some(true) => return prune_expr(then_expr, symtab),
                Some(false) => return prune_expr(else_expr, symtab),
                None => ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(prune_expr(then_expr, symtab)?),
                    else_expr: Box::new(prune_expr(else_expr, symtab)?),
                },
            }
        }
        ExprKind::Index { base, index } => ExprKind::Index {
            base: Box::new(prune_expr(base, symtab)?),
            index: Box::new(prune_expr(index, symtab)?),
        },
        ExprKind::Slice { base, msb, lsb } => ExprKind::Slice {
            base: Box::new(prune_expr(base, symtab)?),
            msb: Box::new(prune_expr(msb, symtab)?),
            lsb: Box::new(prune_expr(lsb, symtab)?),
        },
        ExprKind::Call {
            name,
            template_args,
            args,
        } => ExprKind::Call {
            name: name.clone(),
            template_args: prune_exprs(template_args, symtab)?,
            args: prune_exprs(args, symtab)?,
        },
    };
    refold(Expr::new(expr.span, kind), symtab)
}

/// Folds a rebuilt node whose operands became literals while pruning.
fn refold(pruned: Expr, symtab: &SymbolTable) -> Result<Expr, IdlError> {
    match value_of(&pruned, symtab)? {
        Some(value) => {
            let ty = type_of(&pruned, symtab)?;
            Ok(literal_for(&value, ty.as_ref(), symtab, pruned.span))
        }
        None => Ok(pruned),
    }
}

fn prune_exprs(exprs: &[Expr], symtab: &SymbolTable) -> Result<Vec<Expr>, IdlError> {
    exprs.iter().map(|e| prune_expr(e, symtab)).collect()
}

/// Prunes both operands, then applies identities that need only one of them.
fn prune_binary(
    expr: &Expr,
    left: &Expr,
    op: BinOp,
    right: &Expr,
    symtab: &SymbolTable,
) -> Result<Expr, IdlError> {
    let left = prune_expr(left, symtab)?;
    let right = prune_expr(right, symtab)?;
    let lhs = known(&left, symtab)?;
    let rhs = known(&right, symtab)?;

    match op {
        BinOp::And | BinOp::Or => {
            let decisive = op == BinOp::Or;
            if lhs.as_ref().and_then(Value::as_bool) == Some(decisive)
                || rhs.as_ref().and_then(Value::as_bool) == Some(decisive)
            {
                return Ok(Expr::new(expr.span, ExprKind::Literal(Literal::Bool(decisive))));
            }
            if lhs.as_ref().and_then(Value::as_bool) == Some(!decisive) {
                return Ok(right);
            }
            if rhs.as_ref().and_then(Value::as_bool) == Some(!decisive) {
                return Ok(left);
            }
        }
        BinOp::BitAnd => {
            if lhs == Some(Value::Bits(0)) || rhs == Some(Value::Bits(0)) {
                let ty = type_of(expr, symtab)?;
                return Ok(literal_for(&Value::Bits(0), ty.as_ref(), symtab, expr.span));
            }
            if is_all_ones_for(lhs.as_ref(), &right, symtab)? {
                return Ok(right);
            }
            if is_all_ones_for(rhs.as_ref(), &left, symtab)? {
                return Ok(left);
            }
        }
        BinOp::BitOr => {
            if lhs == Some(Value::Bits(0)) {
                return Ok(right);
            }
            if rhs == Some(Value::Bits(0)) {
                return Ok(left);
            }
            if is_all_ones_for(lhs.as_ref(), &right, symtab)? {
                return Ok(left);
            }
            if is_all_ones_for(rhs.as_ref(), &left, symtab)? {
                return Ok(right);
            }
        }
        _ => {}
    }

    let rebuilt = Expr::new(
        expr.span,
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
    );
    if lhs.is_some() && rhs.is_some() {
        return refold(rebuilt, symtab);
    }
    Ok(rebuilt)
}

/// Value of an already pruned operand; only literals are known.
fn known(expr: &Expr, symtab: &SymbolTable) -> Result<Option<Value>, IdlError> {
    match expr.kind {
        ExprKind::Literal(_) | ExprKind::EnumRef { .. } => value_of(expr, symtab),
        _ => Ok(None),
    }
}

/// True when `value` sets every bit of `other`'s static width.
fn is_all_ones_for(
    value: Option<&Value>,
    other: &Expr,
    symtab: &SymbolTable,
) -> Result<bool, IdlError> {
    let Some(Value::Bits(v)) = value else {
        return Ok(false);
    };
    let width = type_of(other, symtab)?.and_then(|t| t.width());
    Ok(width.and_then(mask) == Some(*v))
}

/// Prunes a statement list in order. Statements after one that always
/// terminates are dropped.
///
/// `tracking` turns false once a statement's effect could not be applied to
/// the table; from then on no new values are recorded, but pruning goes on.
pub fn prune_stmt_list(
    stmts: &[Stmt],
    symtab: &mut SymbolTable,
    tracking: &mut bool,
) -> Result<PrunedStmts, IdlError> {
    let mut out = Vec::with_capacity(stmts.len());
    for (i, stmt) in stmts.iter().enumerate() {
        let pruned = prune_stmt(stmt, symtab, tracking)?;
        out.extend(pruned.stmts);
        if pruned.flow == Flow::Terminated {
            let dropped = stmts.len() - i - 1;
            if dropped > 0 {
                debug!(dropped, "unreachable statements removed");
            }
            return Ok(PrunedStmts {
                stmts: out,
                flow: Flow::Terminated,
            });
        }
    }
    Ok(PrunedStmts {
        stmts: out,
        flow: Flow::FallThrough,
    })
}

impl Prune for Stmt {
    type Output = PrunedStmts;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<PrunedStmts, IdlError> {
        let mut tracking = true;
        prune_stmt(self, symtab, &mut tracking)
    }
}

pub fn prune_stmt(
    stmt: &Stmt,
    symtab: &mut SymbolTable,
    tracking: &mut bool,
) -> Result<PrunedStmts, IdlError> {
    let span = stmt.span;
    match &stmt.kind {
        StmtKind::Decl(decl) => {
            let decl = prune_decl(decl, symtab, *tracking)?;
            Ok(PrunedStmts::one(Stmt::new(span, StmtKind::Decl(decl)), Flow::FallThrough))
        }
        StmtKind::Assign(assign) => {
            let assign = prune_assign(assign, symtab, tracking)?;
            Ok(PrunedStmts::one(Stmt::new(span, StmtKind::Assign(assign)), Flow::FallThrough))
        }
        StmtKind::If(if_stmt) => prune_if(if_stmt, span, symtab, tracking),
        StmtKind::For(for_loop) => prune_for(for_loop, span, symtab, tracking),
        StmtKind::Return(expr) => {
            let expr = expr.as_ref().map(|e| prune_expr(e, symtab)).transpose()?;
            Ok(PrunedStmts::one(Stmt::new(span, StmtKind::Return(expr)), Flow::Terminated))
        }
        StmtKind::CondReturn { cond, expr } => {
            let expr = expr.as_ref().map(|e| prune_expr(e, symtab)).transpose()?;
            match value_of(cond, symtab)? {
                Some(Value::Bool(true)) => Ok(PrunedStmts::one(
                    Stmt::new(span, StmtKind::Return(expr)),
                    Flow::Terminated,
                )),
                Some(Value::Bool(false)) => Ok(PrunedStmts::empty()),
                _ => {
                    let cond = prune_expr(cond, symtab)?;
                    Ok(PrunedStmts::one(
                        Stmt::new(span, StmtKind::CondReturn { cond, expr }),
                        Flow::FallThrough,
                    ))
                }
            }
        }
        StmtKind::CondStmt { cond, action } => match value_of(cond, symtab)? {
            Some(Value::Bool(true)) => prune_stmt(action, symtab, tracking),
            Some(Value::Bool(false)) => Ok(PrunedStmts::empty()),
            _ => {
                let cond = prune_expr(cond, symtab)?;
                let mut scratch = symtab.deep_clone();
                let mut branch_tracking = *tracking;
                let pruned = prune_stmt(action, &mut scratch, &mut branch_tracking)?;
                *tracking &= branch_tracking;
                symtab.nullify(assigned_vars(std::slice::from_ref(&**action)));
                let action = match <[Stmt; 1]>::try_from(pruned.stmts) {
                    Ok([single]) => single,
                    Err(stmts) if stmts.is_empty() => return Ok(PrunedStmts::empty()),
                    Err(stmts) => Stmt::new(action.span, StmtKind::Block(stmts)),
                };
                Ok(PrunedStmts::one(
                    Stmt::new(
                        span,
                        StmtKind::CondStmt {
                            cond,
                            action: Box::new(action),
                        },
                    ),
                    Flow::FallThrough,
                ))
            }
        },
        StmtKind::Block(stmts) => {
            let pruned = symtab.scoped(None, |s| prune_stmt_list(stmts, s, tracking))?;
            if pruned.stmts.is_empty() {
                return Ok(PrunedStmts {
                    stmts: Vec::new(),
                    flow: pruned.flow,
                });
            }
            Ok(PrunedStmts::one(Stmt::new(span, StmtKind::Block(pruned.stmts)), pruned.flow))
        }
        StmtKind::ExprStmt(expr) => {
            // A call statement is kept for its effect even when its value folds.
            let (expr, flow) = match &expr.kind {
                ExprKind::Call {
                    name,
                    template_args,
                    args,
                } => {
                    let flow = if NORETURN_BUILTINS.contains(&name.node.as_str()) {
                        Flow::Terminated
                    } else {
                        Flow::FallThrough
                    };
                    let call = ExprKind::Call {
                        name: name.clone(),
                        template_args: prune_exprs(template_args, symtab)?,
                        args: prune_exprs(args, symtab)?,
                    };
                    (Expr::new(expr.span, call), flow)
                }
                _ => (prune_expr(expr, symtab)?, Flow::FallThrough),
            };
            Ok(PrunedStmts::one(Stmt::new(span, StmtKind::ExprStmt(expr)), flow))
        }
    }
}

fn prune_type_name(ty: &TypeName, symtab: &SymbolTable) -> Result<TypeName, IdlError> {
    Ok(match ty {
        TypeName::Bits(width) => TypeName::Bits(Box::new(match value_of(width, symtab)? {
            Some(Value::Bits(w)) => Expr::new(
                width.span,
                ExprKind::Literal(Literal::Bits {
                    value: w,
                    width: None,
                    radix: Radix::Dec,
                }),
            ),
            _ => prune_expr(width, symtab)?,
        })),
        TypeName::Array { elem, len } => TypeName::Array {
            elem: Box::new(prune_type_name(elem, symtab)?),
            len: Box::new(prune_expr(len, symtab)?),
        },
        other => other.clone(),
    })
}

/// Declares the variable and keeps the declaration with a pruned initializer.
fn prune_decl(decl: &VarDecl, symtab: &mut SymbolTable, tracking: bool) -> Result<VarDecl, IdlError> {
    let init = decl
        .init
        .as_ref()
        .map(|e| prune_expr(e, symtab))
        .transpose()?;
    let mut ty = Type::resolve(&decl.ty, symtab)?;
    if decl.constant {
        ty = ty.make_const();
    }
    let value = match (&init, tracking) {
        (Some(init), true) => value_of(init, symtab)?.map(|v| v.fit_to(&ty)),
        _ => None,
    };
    symtab.add_strict(Var::new(decl.name.node.clone(), ty, value))?;
    Ok(VarDecl {
        span: decl.span,
        ty: prune_type_name(&decl.ty, symtab)?,
        name: decl.name.clone(),
        constant: decl.constant,
        init,
    })
}

fn prune_assign(
    assign: &AssignStmt,
    symtab: &mut SymbolTable,
    tracking: &mut bool,
) -> Result<AssignStmt, IdlError> {
    let expr = prune_expr(&assign.expr, symtab)?;
    let target = prune_lvalue(&assign.target, symtab)?;

    match lvalue_root(&assign.target) {
        Some(root) if symtab.get_var(root).is_some() => {
            let value = if *tracking {
                assigned_value(&assign.target, &expr, symtab)?
            } else {
                None
            };
            trace!(var = root, known = value.is_some(), "assignment");
            symtab.refine(root, value);
        }
        _ => {
            debug!(target = %assign.target, "assignment to undeclared target; no longer tracking values");
            *tracking = false;
        }
    }

    Ok(AssignStmt {
        span: assign.span,
        target,
        expr,
    })
}

/// Prunes the index expressions of an assignment target, keeping its root.
fn prune_lvalue(target: &Expr, symtab: &SymbolTable) -> Result<Expr, IdlError> {
    let kind = match &target.kind {
        ExprKind::Ident(_) => return Ok(target.clone()),
        ExprKind::Index { base, index } => ExprKind::Index {
            base: Box::new(prune_lvalue(base, symtab)?),
            index: Box::new(prune_expr(index, symtab)?),
        },
        ExprKind::Slice { base, msb, lsb } => ExprKind::Slice {
            base: Box::new(prune_lvalue(base, symtab)?),
            msb: Box::new(prune_expr(msb, symtab)?),
            lsb: Box::new(prune_expr(lsb, symtab)?),
        },
        _ => return prune_expr(target, symtab),
    };
    Ok(Expr::new(target.span, kind))
}

/// The root variable's value after the assignment, if it is known.
fn assigned_value(
    target: &Expr,
    rhs: &Expr,
    symtab: &SymbolTable,
) -> Result<Option<Value>, IdlError> {
    let Some(new) = value_of(rhs, symtab)? else {
        return Ok(None);
    };
    let Some(root) = lvalue_root(target) else {
        return Ok(None);
    };
    let Some(var) = symtab.get_var(root) else {
        return Ok(None);
    };
    let root_ty = var.ty().clone();
    let current = var.value().cloned();

    Ok(match &target.kind {
        ExprKind::Ident(_) => Some(new.fit_to(&root_ty)),
        ExprKind::Index { base, index } if matches!(base.kind, ExprKind::Ident(_)) => {
            match (current, value_of(index, symtab)?, new) {
                (Some(Value::Array(mut items)), Some(Value::Bits(i)), new) => {
                    let slot = usize::try_from(i).ok().and_then(|i| items.get_mut(i));
                    match (slot, root_ty.element_type()) {
                        (Some(slot), Some(elem)) => {
                            *slot = new.fit_to(elem);
                            Some(Value::Array(items))
                        }
                        _ => None,
                    }
                }
                (Some(Value::Bits(v)), Some(Value::Bits(i)), Value::Bits(bit)) if i < 128 => {
                    Some(Value::Bits((v & !(1 << i)) | ((bit & 1) << i)))
                }
                _ => None,
            }
        }
        ExprKind::Slice { base, msb, lsb } if matches!(base.kind, ExprKind::Ident(_)) => {
            match (current, value_of(msb, symtab)?, value_of(lsb, symtab)?, new) {
                (
                    Some(Value::Bits(v)),
                    Some(Value::Bits(msb)),
                    Some(Value::Bits(lsb)),
                    Value::Bits(bits),
                ) if msb >= lsb && msb < 128 => {
                    let field = u32::try_from(msb - lsb + 1)
                        .ok()
                        .and_then(mask)
                        .map(|m| m << lsb);
                    field.map(|field| Value::Bits((v & !field) | ((bits << lsb) & field)))
                }
                _ => None,
            }
        }
        _ => None,
    })
}

fn prune_if(
    if_stmt: &IfStmt,
    span: Span,
    symtab: &mut SymbolTable,
    tracking: &mut bool,
) -> Result<PrunedStmts, IdlError> {
    let arms = std::iter::once((&if_stmt.cond, if_stmt.body.as_slice(), if_stmt.span)).chain(
        if_stmt
            .elseifs
            .iter()
            .map(|e| (&e.cond, e.body.as_slice(), e.span)),
    );

    let mut residual: Vec<(Expr, PrunedStmts, Span)> = Vec::new();
    let mut kept_bodies: Vec<&[Stmt]> = Vec::new();
    let mut else_body = if_stmt.else_body.as_deref();
    let mut taken: Option<&[Stmt]> = None;

    for (cond, body, arm_span) in arms {
        match value_of(cond, symtab)? {
            Some(Value::Bool(true)) => {
                if residual.is_empty() {
                    taken = Some(body);
                } else {
                    else_body = Some(body);
                }
                break;
            }
            Some(Value::Bool(false)) => {
                trace!(cond = %cond, "dropping branch with false condition");
            }
            _ => {
                let cond = prune_expr(cond, symtab)?;
                let pruned = prune_speculative(body, symtab, tracking)?;
                residual.push((cond, pruned, arm_span));
                kept_bodies.push(body);
            }
        }
    }

    if residual.is_empty() {
        let Some(branch) = taken.or(else_body) else {
            debug!("if statement removed");
            return Ok(PrunedStmts::empty());
        };
        debug!("if statement collapsed to a single branch");
        let pruned = symtab.scoped(None, |s| prune_stmt_list(branch, s, tracking))?;
        if pruned.stmts.iter().any(Stmt::is_decl) {
            return Ok(PrunedStmts::one(Stmt::new(span, StmtKind::Block(pruned.stmts)), pruned.flow));
        }
        return Ok(pruned);
    }

    let else_pruned = match else_body {
        Some(body) => {
            kept_bodies.push(body);
            Some(prune_speculative(body, symtab, tracking)?)
        }
        None => None,
    };

    let assigned: BTreeSet<String> = kept_bodies.iter().flat_map(|b| assigned_vars(b)).collect();
    symtab.nullify(&assigned);

    let terminated = residual.iter().all(|(_, p, _)| p.flow == Flow::Terminated)
        && else_pruned.as_ref().is_some_and(|p| p.flow == Flow::Terminated);

    let mut arms = residual.into_iter();
    let Some((cond, first, _)) = arms.next() else {
        return Ok(PrunedStmts::empty());
    };
    let pruned = IfStmt {
        span: if_stmt.span,
        cond,
        body: first.stmts,
        elseifs: arms
            .map(|(cond, body, span)| ElseIf {
                span,
                cond,
                body: body.stmts,
            })
            .collect(),
        else_body: else_pruned
            .map(|p| p.stmts)
            .filter(|stmts| !stmts.is_empty()),
    };
    Ok(PrunedStmts::one(
        Stmt::new(span, StmtKind::If(pruned)),
        if terminated {
            Flow::Terminated
        } else {
            Flow::FallThrough
        },
    ))
}

/// Prunes a branch that may or may not run, against a copy of the table.
fn prune_speculative(
    body: &[Stmt],
    symtab: &SymbolTable,
    tracking: &mut bool,
) -> Result<PrunedStmts, IdlError> {
    let mut scratch = symtab.deep_clone();
    let mut branch_tracking = *tracking;
    let pruned = scratch.scoped(None, |s| prune_stmt_list(body, s, &mut branch_tracking))?;
    *tracking &= branch_tracking;
    Ok(pruned)
}

fn prune_for(
    for_loop: &ForLoop,
    span: Span,
    symtab: &mut SymbolTable,
    tracking: &mut bool,
) -> Result<PrunedStmts, IdlError> {
    let mut assigned = assigned_vars(&for_loop.body);
    assigned.extend(assigned_vars(std::slice::from_ref(&*for_loop.update)));
    symtab.nullify(&assigned);
    debug!(vars = ?assigned, "values assigned in loop forgotten");

    let mut loop_tracking = *tracking;
    let owner = ScopeOwner::new("for loop", for_loop.span);
    let pruned = symtab.scoped(Some(owner), |s| {
        let init = &for_loop.init;
        let init_expr = init.init.as_ref().map(|e| prune_expr(e, s)).transpose()?;
        let ty = Type::resolve(&init.ty, s)?;
        s.add_strict(Var::new(init.name.node.clone(), ty, None))?;
        let init = VarDecl {
            span: init.span,
            ty: prune_type_name(&init.ty, s)?,
            name: init.name.clone(),
            constant: init.constant,
            init: init_expr,
        };

        let cond = prune_expr(&for_loop.cond, s)?;
        let update = match <[Stmt; 1]>::try_from(
            prune_stmt(&for_loop.update, s, &mut loop_tracking)?.stmts,
        ) {
            Ok([single]) => single,
            Err(_) => (*for_loop.update).clone(),
        };
        let body = s.scoped(None, |b| prune_stmt_list(&for_loop.body, b, &mut loop_tracking))?;

        Ok(ForLoop {
            span: for_loop.span,
            init,
            cond,
            update: Box::new(update),
            body: body.stmts,
        })
    })?;

    symtab.nullify(&assigned);
    *tracking &= loop_tracking;
    Ok(PrunedStmts::one(Stmt::new(span, StmtKind::For(pruned)), Flow::FallThrough))
}

impl Prune for FunctionBody {
    type Output = FunctionBody;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<FunctionBody, IdlError> {
        let mut tracking = true;
        let pruned = symtab.scoped(None, |s| prune_stmt_list(&self.stmts, s, &mut tracking))?;
        Ok(FunctionBody {
            span: self.span,
            stmts: pruned.stmts,
        })
    }
}

impl Prune for FunctionDef {
    type Output = FunctionDef;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<FunctionDef, IdlError> {
        prune_function(self, symtab, &[], &[])
    }
}

/// Prunes `def` with the given template and argument values bound.
///
/// Builtin and generated functions are returned unchanged.
pub fn prune_function(
    def: &FunctionDef,
    symtab: &mut SymbolTable,
    template_values: &[Option<Value>],
    arg_values: &[Option<Value>],
) -> Result<FunctionDef, IdlError> {
    let body = match (&def.kind, &def.body) {
        (FunctionKind::Authored, Some(body)) => body,
        _ => return Ok(def.clone()),
    };
    let stmts = symtab.scoped(Some(def.scope_owner()), |s| {
        bind_function_args(def, s, template_values, arg_values)?;
        let mut tracking = true;
        prune_stmt_list(&body.stmts, s, &mut tracking).map(|p| p.stmts)
    })?;
    Ok(FunctionDef {
        body: Some(FunctionBody {
            span: body.span,
            stmts,
        }),
        ..def.clone()
    })
}

impl Prune for Operation {
    type Output = Operation;

    fn prune(&self, symtab: &mut SymbolTable) -> Result<Operation, IdlError> {
        let stmts = symtab.scoped(Some(self.scope_owner()), |s| {
            for field in &self.decode_fields {
                s.add_strict(Var::decode(field.name.node.clone(), Type::bits(field.width)))?;
            }
            let mut tracking = true;
            prune_stmt_list(&self.body.stmts, s, &mut tracking).map(|p| p.stmts)
        })?;
        Ok(Operation {
            body: FunctionBody {
                span: self.body.span,
                stmts,
            },
            ..self.clone()
        })
    }
}
