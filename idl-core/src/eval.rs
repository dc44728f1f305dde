#![forbid(unsafe_code)]

//! Static evaluation of expressions against a symbol table.
//!
//! `Ok(None)` means the value (or type) is not statically known. That is the
//! normal outcome for anything depending on an unpinned parameter or a
//! register, and callers fall back to structural handling.

use std::collections::BTreeSet;
use std::sync::Arc;

use idl_ast::{
    assigned_vars, contains_return, contains_stmt, declared_vars, BinOp, Expr, ExprKind,
    FunctionDef, FunctionKind, Ident, Literal, Radix, Span, Stmt, StmtKind, TypeName, UnaryOp,
};

use crate::error::IdlError;
use crate::prune::{prune_stmt_list, Flow};
use crate::symtab::{Symbol, SymbolTable, IMPLEMENTED};
use crate::types::{EnumDef, Type, TypeKind, Width};
use crate::value::{bit_length, mask, Value};
use crate::var::Var;

pub fn value_of(expr: &Expr, symtab: &SymbolTable) -> Result<Option<Value>, IdlError> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(Some(literal_value(lit))),
        ExprKind::Ident(id) => Ok(symtab.get_var(&id.node).and_then(Var::value).cloned()),
        ExprKind::EnumRef { class, member } => Ok(enum_def(symtab, &class.node)
            .and_then(|def| def.value_of(&member.node))
            .map(Value::Bits)),
        ExprKind::ArrayLit(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match value_of(item, symtab)? {
                    Some(v) => values.push(v),
                    None => return Ok(None),
                }
            }
            Ok(Some(Value::Array(values)))
        }
        ExprKind::Unary { op, expr: inner } => {
            let Some(v) = value_of(inner, symtab)? else {
                return Ok(None);
            };
            let width = type_of(expr, symtab)?.and_then(|t| t.width());
            Ok(match (op, v) {
                (UnaryOp::Not, Value::Bool(b)) => Some(Value::Bool(!b)),
                (UnaryOp::BitNot, Value::Bits(v)) => width.and_then(mask).map(|m| Value::Bits(!v & m)),
                (UnaryOp::Neg, Value::Bits(v)) => {
                    width.and_then(mask).map(|m| Value::Bits(v.wrapping_neg() & m))
                }
                _ => None,
            })
        }
        ExprKind::Binary { left, op, right } => value_of_binary(expr, left, *op, right, symtab),
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => match value_of(cond, symtab)? {
            Some(Value::Bool(true)) => value_of(then_expr, symtab),
            Some(Value::Bool(false)) => value_of(else_expr, symtab),
            _ => Ok(None),
        },
        ExprKind::Index { base, index } => {
            let (Some(base), Some(Value::Bits(i))) = (value_of(base, symtab)?, value_of(index, symtab)?)
            else {
                return Ok(None);
            };
            Ok(match base {
                Value::Array(items) => usize::try_from(i).ok().and_then(|i| items.get(i).cloned()),
                Value::Bits(v) if i < 128 => Some(Value::Bits((v >> i) & 1)),
                _ => None,
            })
        }
        ExprKind::Slice { base, msb, lsb } => {
            let (Some(Value::Bits(v)), Some(Value::Bits(msb)), Some(Value::Bits(lsb))) = (
                value_of(base, symtab)?,
                value_of(msb, symtab)?,
                value_of(lsb, symtab)?,
            ) else {
                return Ok(None);
            };
            if msb < lsb || lsb >= 128 {
                return Ok(None);
            }
            let width = u32::try_from(msb - lsb + 1).ok().and_then(mask);
            Ok(width.map(|m| Value::Bits((v >> lsb) & m)))
        }
        ExprKind::Call {
            name,
            template_args,
            args,
        } => value_of_call(name, template_args, args, symtab),
    }
}

fn value_of_binary(
    expr: &Expr,
    left: &Expr,
    op: BinOp,
    right: &Expr,
    symtab: &SymbolTable,
) -> Result<Option<Value>, IdlError> {
    let lhs = value_of(left, symtab)?;
    if op.is_logical() {
        // Either side decides the result on its own.
        let decisive = Value::Bool(op == BinOp::Or);
        if lhs.as_ref() == Some(&decisive) {
            return Ok(Some(decisive));
        }
        let rhs = value_of(right, symtab)?;
        if rhs.as_ref() == Some(&decisive) {
            return Ok(Some(decisive));
        }
        return Ok(match (lhs, rhs) {
            (Some(Value::Bool(_)), Some(Value::Bool(_))) => Some(Value::Bool(op == BinOp::And)),
            _ => None,
        });
    }

    let Some(lhs) = lhs else {
        return Ok(None);
    };
    let Some(rhs) = value_of(right, symtab)? else {
        return Ok(None);
    };
    let result_width = type_of(expr, symtab)?.and_then(|t| t.width());
    let left_width = type_of(left, symtab)?.and_then(|t| t.width());
    Ok(fold_binary(op, lhs, rhs, result_width, left_width))
}

/// Folds `lhs op rhs`. Results wrap to `result_width`; operations that need a
/// width and have none stay unknown.
pub fn fold_binary(
    op: BinOp,
    lhs: Value,
    rhs: Value,
    result_width: Option<u32>,
    left_width: Option<u32>,
) -> Option<Value> {
    let wrap = |v: u128| result_width.and_then(mask).map(|m| Value::Bits(v & m));
    match (lhs, rhs) {
        (Value::Bits(a), Value::Bits(b)) => match op {
            BinOp::Add => wrap(a.wrapping_add(b)),
            BinOp::Sub => wrap(a.wrapping_sub(b)),
            BinOp::Mul => wrap(a.wrapping_mul(b)),
            BinOp::Div => a.checked_div(b).map(Value::Bits),
            BinOp::Rem => a.checked_rem(b).map(Value::Bits),
            BinOp::Shl => wrap(u32::try_from(b).ok().and_then(|b| a.checked_shl(b)).unwrap_or(0)),
            BinOp::Shr => Some(Value::Bits(
                u32::try_from(b).ok().and_then(|b| a.checked_shr(b)).unwrap_or(0),
            )),
            BinOp::Sra => {
                let w = left_width?;
                let m = mask(w)?;
                let negative = w > 0 && (a >> (w - 1)) & 1 == 1;
                let shifted = u32::try_from(b).ok().and_then(|b| a.checked_shr(b));
                let fill = u32::try_from(b).ok().and_then(|b| m.checked_shr(b)).unwrap_or(0);
                Some(Value::Bits(match (negative, shifted) {
                    (false, Some(s)) => s,
                    (false, None) => 0,
                    (true, Some(s)) => (s | (m ^ fill)) & m,
                    (true, None) => m,
                }))
            }
            BinOp::BitAnd => Some(Value::Bits(a & b)),
            BinOp::BitOr => Some(Value::Bits(a | b)),
            BinOp::BitXor => Some(Value::Bits(a ^ b)),
            BinOp::Eq => Some(Value::Bool(a == b)),
            BinOp::Ne => Some(Value::Bool(a != b)),
            BinOp::Lt => Some(Value::Bool(a < b)),
            BinOp::Gt => Some(Value::Bool(a > b)),
            BinOp::Le => Some(Value::Bool(a <= b)),
            BinOp::Ge => Some(Value::Bool(a >= b)),
            BinOp::And | BinOp::Or => None,
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinOp::And => Some(Value::Bool(a && b)),
            BinOp::Or => Some(Value::Bool(a || b)),
            BinOp::Eq => Some(Value::Bool(a == b)),
            BinOp::Ne => Some(Value::Bool(a != b)),
            _ => None,
        },
        (a @ (Value::String(_) | Value::Array(_)), b) => match op {
            BinOp::Eq => Some(Value::Bool(a == b)),
            BinOp::Ne => Some(Value::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn value_of_call(
    name: &Ident,
    template_args: &[Expr],
    args: &[Expr],
    symtab: &SymbolTable,
) -> Result<Option<Value>, IdlError> {
    let Some(def) = symtab.get(&name.node).and_then(Symbol::as_function) else {
        return Ok(None);
    };
    match def.kind {
        FunctionKind::Builtin if def.name.node == IMPLEMENTED => {
            let [arg] = args else {
                return Ok(None);
            };
            let extension = match &arg.kind {
                ExprKind::EnumRef { member, .. } => Some(member.node.clone()),
                _ => match value_of(arg, symtab)? {
                    Some(Value::Bits(i)) => enum_def(symtab, "ExtensionName")
                        .and_then(|def| def.member_for(i))
                        .map(str::to_string),
                    _ => None,
                },
            };
            Ok(extension
                .and_then(|ext| symtab.extension_state(&ext).known())
                .map(Value::Bool))
        }
        FunctionKind::Builtin | FunctionKind::Generated => Ok(None),
        FunctionKind::Authored => {
            let def = Arc::clone(def);
            if template_args.len() != def.templates.len() || args.len() != def.params.len() {
                return Ok(None);
            }
            if !is_pure(&def) {
                return Ok(None);
            }
            let mut template_values = Vec::with_capacity(template_args.len());
            for arg in template_args {
                match value_of(arg, symtab)? {
                    Some(v) => template_values.push(Some(v)),
                    None => return Ok(None),
                }
            }
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                match value_of(arg, symtab)? {
                    Some(v) => arg_values.push(Some(v)),
                    None => return Ok(None),
                }
            }
            let Some(mut frame) = symtab.call_frame() else {
                return Ok(None);
            };
            frame.scoped(Some(def.scope_owner()), |frame| {
                bind_function_args(&def, frame, &template_values, &arg_values)?;
                let ret = def
                    .ret
                    .as_ref()
                    .map(|ty| Type::resolve(ty, frame))
                    .transpose()?;
                let Some(body) = &def.body else {
                    return Ok(None);
                };
                let value = evaluate_body(&body.stmts, frame)?;
                Ok(match (value, ret) {
                    (Some(v), Some(ty)) => Some(v.fit_to(&ty)),
                    _ => None,
                })
            })
        }
    }
}

/// A function can be folded at a call site when evaluating it has no effect
/// outside its own locals.
fn is_pure(def: &FunctionDef) -> bool {
    let Some(body) = &def.body else {
        return false;
    };
    if contains_stmt(&body.stmts, |s| matches!(s.kind, StmtKind::ExprStmt(_))) {
        return false;
    }
    let mut locals: BTreeSet<String> = declared_vars(&body.stmts);
    locals.extend(def.params.iter().map(|p| p.name.node.clone()));
    assigned_vars(&body.stmts).is_subset(&locals)
}

/// Binds template and ordinary arguments of `def` into the innermost scope.
/// Missing or `None` values bind the name with its type only.
pub(crate) fn bind_function_args(
    def: &FunctionDef,
    symtab: &mut SymbolTable,
    template_values: &[Option<Value>],
    arg_values: &[Option<Value>],
) -> Result<(), IdlError> {
    for (index, param) in def.templates.iter().enumerate() {
        let ty = Type::resolve(&param.ty, symtab)?;
        let value = template_values
            .get(index)
            .cloned()
            .flatten()
            .map(|v| v.fit_to(&ty));
        symtab.add(Var::template_arg(
            param.name.node.clone(),
            ty,
            value,
            index,
            def.name.node.clone(),
        ))?;
    }
    for (index, param) in def.params.iter().enumerate() {
        let ty = Type::resolve(&param.ty, symtab)?;
        let value = arg_values
            .get(index)
            .cloned()
            .flatten()
            .map(|v| v.fit_to(&ty));
        symtab.add(Var::new(param.name.node.clone(), ty, value))?;
    }
    Ok(())
}

/// Runs a function body and returns its result when every path through it
/// is decided and ends in a literal return.
fn evaluate_body(stmts: &[Stmt], symtab: &mut SymbolTable) -> Result<Option<Value>, IdlError> {
    let mut tracking = true;
    let pruned = prune_stmt_list(stmts, symtab, &mut tracking)?;
    if pruned.flow != Flow::Terminated {
        return Ok(None);
    }
    let Some((last, earlier)) = pruned.stmts.split_last() else {
        return Ok(None);
    };
    if contains_return(earlier) {
        return Ok(None);
    }
    match &last.kind {
        StmtKind::Return(Some(expr)) => match expr.kind {
            ExprKind::Literal(_) | ExprKind::EnumRef { .. } | ExprKind::ArrayLit(_) => {
                value_of(expr, symtab)
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// The static type of `expr`, without qualifiers, if it can be determined.
pub fn type_of(expr: &Expr, symtab: &SymbolTable) -> Result<Option<Type>, IdlError> {
    let ty = match &expr.kind {
        ExprKind::Literal(Literal::Bits { value, width, .. }) => {
            Some(Type::bits(width.unwrap_or_else(|| bit_length(*value))))
        }
        ExprKind::Literal(Literal::Bool(_)) => Some(Type::boolean()),
        ExprKind::Literal(Literal::String(_)) => Some(Type::string()),
        ExprKind::Ident(id) => symtab.get_var(&id.node).map(|var| var.ty().clone()),
        ExprKind::EnumRef { class, .. } => enum_def(symtab, &class.node).map(Type::enum_ref),
        ExprKind::ArrayLit(items) => match items.first() {
            Some(first) => type_of(first, symtab)?
                .map(|elem| Type::array(elem, Width::Known(items.len() as u32))),
            None => None,
        },
        ExprKind::Unary { op: UnaryOp::Not, .. } => Some(Type::boolean()),
        ExprKind::Unary { expr: inner, .. } => {
            if is_unsized_literal(inner) {
                Some(Type::bits_unknown())
            } else {
                type_of(inner, symtab)?
            }
        }
        ExprKind::Binary { left, op, right } => {
            if op.is_comparison() || op.is_logical() {
                Some(Type::boolean())
            } else if matches!(op, BinOp::Shl | BinOp::Shr | BinOp::Sra) {
                if is_unsized_literal(left) {
                    Some(Type::bits_unknown())
                } else {
                    type_of(left, symtab)?.map(|t| as_bits(&t))
                }
            } else {
                match (type_of(left, symtab)?, type_of(right, symtab)?) {
                    (Some(l), Some(r)) => Some(Type::bits_width(match (l.width(), r.width()) {
                        (Some(a), Some(b)) => Width::Known(a.max(b)),
                        _ => Width::Unknown,
                    })),
                    _ => None,
                }
            }
        }
        ExprKind::Ternary {
            then_expr,
            else_expr,
            ..
        } => match type_of(then_expr, symtab)? {
            Some(t) => Some(t),
            None => type_of(else_expr, symtab)?,
        },
        ExprKind::Index { base, .. } => match type_of(base, symtab)? {
            Some(t) => match t.element_type() {
                Some(elem) => Some(elem.clone()),
                None => Some(Type::bits(1)),
            },
            None => None,
        },
        ExprKind::Slice { msb, lsb, .. } => {
            match (value_of(msb, symtab)?, value_of(lsb, symtab)?) {
                (Some(Value::Bits(m)), Some(Value::Bits(l))) if m >= l => {
                    Some(Type::bits_width(u32::try_from(m - l + 1).ok().into()))
                }
                _ => Some(Type::bits_unknown()),
            }
        }
        ExprKind::Call {
            name,
            template_args,
            ..
        } => type_of_call(name, template_args, symtab)?,
    };
    Ok(ty.map(|t| t.without_qualifiers()))
}

fn type_of_call(
    name: &Ident,
    template_args: &[Expr],
    symtab: &SymbolTable,
) -> Result<Option<Type>, IdlError> {
    let Some(def) = symtab.get(&name.node).and_then(Symbol::as_function) else {
        return Ok(None);
    };
    let Some(ret) = &def.ret else {
        return Ok(Some(Type::void()));
    };
    if !def.is_templated() {
        return Type::resolve(ret, symtab).map(Some);
    }
    let mut template_values = Vec::with_capacity(template_args.len());
    for arg in template_args {
        template_values.push(value_of(arg, symtab)?);
    }
    let Some(mut frame) = symtab.call_frame() else {
        return Ok(None);
    };
    let def = Arc::clone(def);
    frame
        .scoped(Some(def.scope_owner()), |frame| {
            bind_function_args(&def, frame, &template_values, &[])?;
            Type::resolve(ret, frame)
        })
        .map(Some)
}

fn is_unsized_literal(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Literal(Literal::Bits { width: None, .. })
    )
}

fn as_bits(ty: &Type) -> Type {
    match ty.kind() {
        TypeKind::EnumRef { width, .. } => Type::bits_width(*width),
        _ => ty.clone(),
    }
}

impl Type {
    /// Resolves a type as written in source.
    pub fn resolve(name: &TypeName, symtab: &SymbolTable) -> Result<Type, IdlError> {
        match name {
            TypeName::Bits(width) => Ok(match value_of(width, symtab)? {
                Some(Value::Bits(w)) => Type::bits_width(u32::try_from(w).ok().into()),
                _ => Type::bits_unknown(),
            }),
            TypeName::Boolean => Ok(Type::boolean()),
            TypeName::String => Ok(Type::string()),
            TypeName::Named(id) => match symtab.get(&id.node).and_then(Symbol::as_type) {
                Some(ty) => Ok(ty.instance_type().without_qualifiers()),
                None => Err(IdlError::UndefinedType {
                    name: id.node.clone(),
                    callstack: symtab.callstack(),
                }),
            },
            TypeName::Array { elem, len } => {
                let elem = Type::resolve(elem, symtab)?;
                let len = match value_of(len, symtab)? {
                    Some(Value::Bits(n)) => u32::try_from(n).ok().into(),
                    _ => Width::Unknown,
                };
                Ok(Type::array(elem, len))
            }
        }
    }
}

pub fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Bits { value, width, .. } => {
            Value::Bits(width.and_then(mask).map_or(*value, |m| value & m))
        }
        Literal::Bool(b) => Value::Bool(*b),
        Literal::String(s) => Value::String(s.clone()),
    }
}

pub fn enum_def<'a>(symtab: &'a SymbolTable, class: &str) -> Option<&'a EnumDef> {
    match symtab.get(class).and_then(Symbol::as_type).map(Type::kind) {
        Some(TypeKind::Enum(def)) => Some(def.as_ref()),
        _ => None,
    }
}

/// Builds the literal node for a folded value of type `ty`.
///
/// Sized bits print in decimal up to 512 and in hex above; enum values print
/// as `Class::Member`.
pub fn literal_for(value: &Value, ty: Option<&Type>, symtab: &SymbolTable, span: Span) -> Expr {
    let kind = match value {
        Value::Bits(v) => {
            let member = match ty.map(Type::kind) {
                Some(TypeKind::EnumRef { class, .. }) => enum_def(symtab, class)
                    .and_then(|def| def.member_for(*v))
                    .map(|member| (class.clone(), member.to_string())),
                _ => None,
            };
            match member {
                Some((class, member)) => ExprKind::EnumRef {
                    class: Ident::new(span, class),
                    member: Ident::new(span, member),
                },
                None => ExprKind::Literal(Literal::Bits {
                    value: *v,
                    width: ty.and_then(Type::width),
                    radix: if *v <= 512 { Radix::Dec } else { Radix::Hex },
                }),
            }
        }
        Value::Bool(b) => ExprKind::Literal(Literal::Bool(*b)),
        Value::String(s) => ExprKind::Literal(Literal::String(s.clone())),
        Value::Array(items) => {
            let elem = ty.and_then(Type::element_type);
            ExprKind::ArrayLit(
                items
                    .iter()
                    .map(|item| literal_for(item, elem, symtab, span))
                    .collect(),
            )
        }
    };
    Expr::new(span, kind)
}

#[cfg(test)]
mod tests {
    use idl_ast::{FunctionDef, Param};

    use super::*;

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table.push(None);
        table
            .add(Var::new("a", Type::bits(8), Some(Value::Bits(0xf0))))
            .expect("add");
        table
            .add(Var::new("u", Type::bits(8), None))
            .expect("add");
        table
    }

    #[test]
    fn arithmetic_wraps_to_result_width() {
        let table = table();
        let sum = Expr::binary(Expr::ident("a"), BinOp::Add, Expr::int(0x20));
        assert_eq!(value_of(&sum, &table).expect("eval"), Some(Value::Bits(0x10)));

        let sra = Expr::binary(Expr::ident("a"), BinOp::Sra, Expr::int(4));
        assert_eq!(value_of(&sra, &table).expect("eval"), Some(Value::Bits(0xff)));
    }

    #[test]
    fn logical_operators_short_circuit_on_unknowns() {
        let table = table();
        let unknown = Expr::binary(Expr::ident("u"), BinOp::Eq, Expr::int(1));
        let and = Expr::binary(unknown.clone(), BinOp::And, Expr::bool(false));
        assert_eq!(value_of(&and, &table).expect("eval"), Some(Value::Bool(false)));
        let or = Expr::binary(unknown, BinOp::Or, Expr::bool(false));
        assert_eq!(value_of(&or, &table).expect("eval"), None);
    }

    #[test]
    fn division_by_zero_stays_unknown() {
        let table = table();
        let div = Expr::binary(Expr::ident("a"), BinOp::Div, Expr::int(0));
        assert_eq!(value_of(&div, &table).expect("eval"), None);
    }

    #[test]
    fn slices_and_bit_indexes() {
        let table = table();
        let slice = Expr::slice(Expr::ident("a"), Expr::int(7), Expr::int(4));
        assert_eq!(value_of(&slice, &table).expect("eval"), Some(Value::Bits(0xf)));
        assert_eq!(
            type_of(&slice, &table).expect("type").and_then(|t| t.width()),
            Some(4)
        );
        let bit = Expr::index(Expr::ident("a"), Expr::int(3));
        assert_eq!(value_of(&bit, &table).expect("eval"), Some(Value::Bits(0)));
    }

    #[test]
    fn folds_calls_to_pure_functions() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table
            .add_function(FunctionDef::authored(
                "double",
                vec![Param::new("v", TypeName::bits(8))],
                Some(TypeName::bits(8)),
                vec![Stmt::ret(Expr::binary(
                    Expr::ident("v"),
                    BinOp::Add,
                    Expr::ident("v"),
                ))],
            ))
            .expect("add function");
        let call = Expr::call("double", vec![Expr::sized_int(8, 0x90)]);
        assert_eq!(value_of(&call, &table).expect("eval"), Some(Value::Bits(0x20)));
        assert!(table.at_global_scope());
    }

    #[test]
    fn undefined_type_names_are_errors() {
        let table = table();
        let err = Type::resolve(&TypeName::named("Nope"), &table).expect_err("undefined");
        assert!(matches!(err, IdlError::UndefinedType { ref name, .. } if name == "Nope"));
    }

    #[test]
    fn enum_values_render_as_members() {
        let mut table = SymbolTable::new(None).expect("symbol table");
        table
            .add_enum(EnumDef::new(
                "Mode",
                vec![("M".to_string(), 3), ("S".to_string(), 1)],
            ))
            .expect("enum");
        let ty = Type::resolve(&TypeName::named("Mode"), &table).expect("type");
        let lit = literal_for(&Value::Bits(1), Some(&ty), &table, idl_ast::no_span());
        assert_eq!(lit.to_string(), "Mode::S");
    }
}
