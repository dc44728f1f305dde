#![forbid(unsafe_code)]

//! Enumerates the values a function can return and the conditions under which
//! each is returned.

use idl_ast::{BinOp, Expr, ExprKind, FunctionBody, IfStmt, Literal, Stmt, StmtKind, UnaryOp};

use crate::error::IdlError;
use crate::eval::value_of;
use crate::symtab::{SymbolTable, NORETURN_BUILTINS};
use crate::value::Value;

/// A returned expression and the conditions, all of which hold, on its path.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnValue {
    pub expr: Expr,
    pub conditions: Vec<Expr>,
}

/// Walks `body` without modifying `symtab`. Conditions that `symtab` already
/// decides select a branch and are not recorded.
pub fn return_values(
    body: &FunctionBody,
    symtab: &SymbolTable,
) -> Result<Vec<ReturnValue>, IdlError> {
    let mut walker = Walker {
        symtab,
        out: Vec::new(),
    };
    let mut conds = Vec::new();
    walker.walk_list(&body.stmts, &mut conds)?;
    Ok(walker.out)
}

struct Walker<'a> {
    symtab: &'a SymbolTable,
    out: Vec<ReturnValue>,
}

impl Walker<'_> {
    fn decide(&self, cond: &Expr) -> Result<Option<bool>, IdlError> {
        Ok(value_of(cond, self.symtab)?.as_ref().and_then(Value::as_bool))
    }

    /// Returns whether the list always terminates.
    fn walk_list(&mut self, stmts: &[Stmt], conds: &mut Vec<Expr>) -> Result<bool, IdlError> {
        let depth = conds.len();
        let mut terminates = false;
        for stmt in stmts {
            if self.walk_stmt(stmt, conds)? {
                terminates = true;
                break;
            }
        }
        conds.truncate(depth);
        Ok(terminates)
    }

    fn walk_stmt(&mut self, stmt: &Stmt, conds: &mut Vec<Expr>) -> Result<bool, IdlError> {
        match &stmt.kind {
            StmtKind::Return(Some(expr)) => {
                self.record(expr, conds)?;
                Ok(true)
            }
            StmtKind::Return(None) => Ok(true),
            StmtKind::CondReturn { cond, expr } => match self.decide(cond)? {
                Some(true) => {
                    if let Some(expr) = expr {
                        self.record(expr, conds)?;
                    }
                    Ok(true)
                }
                Some(false) => Ok(false),
                None => {
                    if let Some(expr) = expr {
                        conds.push(cond.clone());
                        self.record(expr, conds)?;
                        conds.pop();
                    }
                    conds.push(invert_condition(cond));
                    Ok(false)
                }
            },
            StmtKind::If(if_stmt) => self.walk_if(if_stmt, conds),
            StmtKind::For(for_loop) => {
                // The body may run zero times, so the loop never terminates the list.
                let mut branch = conds.clone();
                branch.push(for_loop.cond.clone());
                self.walk_list(&for_loop.body, &mut branch)?;
                Ok(false)
            }
            StmtKind::CondStmt { cond, action } if is_noreturn(action) => {
                match self.decide(cond)? {
                    Some(true) => Ok(true),
                    Some(false) => Ok(false),
                    None => {
                        conds.push(invert_condition(cond));
                        Ok(false)
                    }
                }
            }
            StmtKind::ExprStmt(_) => Ok(is_noreturn(stmt)),
            StmtKind::Block(stmts) => {
                // Facts learned inside the block still hold after it.
                for stmt in stmts {
                    if self.walk_stmt(stmt, conds)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            StmtKind::Decl(_) | StmtKind::Assign(_) | StmtKind::CondStmt { .. } => Ok(false),
        }
    }

    fn walk_if(&mut self, if_stmt: &IfStmt, conds: &mut Vec<Expr>) -> Result<bool, IdlError> {
        let arms = std::iter::once((&if_stmt.cond, &if_stmt.body))
            .chain(if_stmt.elseifs.iter().map(|e| (&e.cond, &e.body)));

        // Negations of every earlier undecided arm.
        let mut path: Vec<Expr> = Vec::new();
        // Conditions of earlier arms that can fall through past the if.
        let mut open: Vec<Expr> = Vec::new();
        // Facts that hold if control reaches the statement after the if.
        let mut after: Vec<Expr> = Vec::new();
        let mut last = if_stmt.else_body.as_ref();
        let mut all_terminate = true;

        for (cond, body) in arms {
            match self.decide(cond)? {
                Some(false) => continue,
                Some(true) => {
                    last = Some(body);
                    break;
                }
                None => {
                    let mut branch = conds.clone();
                    branch.extend(path.iter().cloned());
                    branch.push(cond.clone());
                    if self.walk_list(body, &mut branch)? {
                        let mut taken = open.clone();
                        taken.push(cond.clone());
                        after.push(invert_condition(&conjunction(&taken)));
                    } else {
                        all_terminate = false;
                        open.push(invert_condition(cond));
                    }
                    path.push(invert_condition(cond));
                }
            }
        }

        match last {
            Some(body) => {
                let mut branch = conds.clone();
                branch.extend(path.iter().cloned());
                if self.walk_list(body, &mut branch)? {
                    if !open.is_empty() {
                        after.push(invert_condition(&conjunction(&open)));
                    }
                } else {
                    all_terminate = false;
                }
            }
            None => all_terminate = false,
        }

        if all_terminate {
            return Ok(true);
        }
        conds.extend(after);
        Ok(false)
    }

    /// Records `expr`, splitting a ternary on its condition.
    fn record(&mut self, expr: &Expr, conds: &mut Vec<Expr>) -> Result<(), IdlError> {
        if let ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } = &expr.kind
        {
            match self.decide(cond)? {
                Some(true) => return self.record(then_expr, conds),
                Some(false) => return self.record(else_expr, conds),
                None => {
                    conds.push((**cond).clone());
                    self.record(then_expr, conds)?;
                    conds.pop();
                    conds.push(invert_condition(cond));
                    self.record(else_expr, conds)?;
                    conds.pop();
                    return Ok(());
                }
            }
        }
        self.out.push(ReturnValue {
            expr: expr.clone(),
            conditions: conds.clone(),
        });
        Ok(())
    }
}

fn is_noreturn(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::ExprStmt(Expr {
            kind: ExprKind::Call { name, .. },
            ..
        }) => NORETURN_BUILTINS.contains(&name.node.as_str()),
        _ => false,
    }
}

fn conjunction(conds: &[Expr]) -> Expr {
    let mut iter = conds.iter().cloned();
    match iter.next() {
        Some(first) => iter.fold(first, |acc, c| Expr::binary(acc, BinOp::And, c)),
        None => Expr::bool(true),
    }
}

/// The logical negation of `cond`, pushed through comparisons and `&&`/`||`
/// so the result still evaluates against a symbol table.
pub fn invert_condition(cond: &Expr) -> Expr {
    let kind = match &cond.kind {
        ExprKind::Literal(Literal::Bool(b)) => ExprKind::Literal(Literal::Bool(!b)),
        ExprKind::Unary {
            op: UnaryOp::Not,
            expr,
        } => return (**expr).clone(),
        ExprKind::Binary { left, op, right } => match op.negated_comparison() {
            Some(negated) => ExprKind::Binary {
                left: left.clone(),
                op: negated,
                right: right.clone(),
            },
            None if op.is_logical() => ExprKind::Binary {
                left: Box::new(invert_condition(left)),
                op: if *op == BinOp::And { BinOp::Or } else { BinOp::And },
                right: Box::new(invert_condition(right)),
            },
            None => ExprKind::Unary {
                op: UnaryOp::Not,
                expr: Box::new(cond.clone()),
            },
        },
        _ => ExprKind::Unary {
            op: UnaryOp::Not,
            expr: Box::new(cond.clone()),
        },
    };
    Expr::new(cond.span, kind)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn inverts_through_de_morgan() {
        let cond = Expr::binary(
            Expr::binary(Expr::ident("a"), BinOp::Lt, Expr::int(3)),
            BinOp::And,
            Expr::unary(UnaryOp::Not, Expr::ident("b")),
        );
        assert_eq!(invert_condition(&cond).to_string(), "(a >= 3) || b");
        assert_eq!(invert_condition(&Expr::ident("c")).to_string(), "!c");
    }

    #[test]
    fn ternary_returns_split_on_condition() {
        let table = SymbolTable::new(None).expect("symbol table");
        let body = FunctionBody::new(vec![Stmt::ret(Expr::ternary(
            Expr::ident("c"),
            Expr::int(1),
            Expr::int(2),
        ))]);
        let values = return_values(&body, &table).expect("walk");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].conditions, vec![Expr::ident("c")]);
        assert_eq!(values[1].expr, Expr::int(2));
        assert_eq!(values[1].conditions[0].to_string(), "!c");
    }

    #[test]
    fn conditional_returns_constrain_later_paths() {
        let table = SymbolTable::new(None).expect("symbol table");
        let body = FunctionBody::new(vec![
            Stmt::cond_ret(Expr::ident("a"), Expr::int(0)),
            Stmt::ret(Expr::int(1)),
        ]);
        let values = return_values(&body, &table).expect("walk");
        assert_eq!(values[0].conditions, vec![Expr::ident("a")]);
        assert_eq!(values[1].conditions[0].to_string(), "!a");
    }

    #[test]
    fn decided_conditions_are_not_recorded() {
        let table = SymbolTable::new(None).expect("symbol table");
        let body = FunctionBody::new(vec![Stmt::if_else(
            Expr::ident("false"),
            vec![Stmt::ret(Expr::int(1))],
            Some(vec![Stmt::ret(Expr::int(2))]),
        )]);
        let values = return_values(&body, &table).expect("walk");
        assert_eq!(
            values,
            vec![ReturnValue {
                expr: Expr::int(2),
                conditions: Vec::new(),
            }]
        );
    }
}
