use idl_ast::{BinOp, Expr, FunctionBody, Stmt};
use idl_core::{return_values, ReturnValue};
use pretty_assertions::assert_eq;

mod common;
use common::rv32;

fn rendered(values: &[ReturnValue]) -> Vec<(String, Vec<String>)> {
    values
        .iter()
        .map(|rv| {
            (
                rv.expr.to_string(),
                rv.conditions.iter().map(ToString::to_string).collect(),
            )
        })
        .collect()
}

#[test]
fn nested_branches_accumulate_negated_conditions() {
    let table = rv32();
    let body = FunctionBody::new(vec![Stmt::if_else(
        Expr::ident("A"),
        vec![Stmt::ret(Expr::int(1))],
        Some(vec![
            Stmt::if_else(Expr::ident("B"), vec![Stmt::ret(Expr::int(2))], None),
            Stmt::ret(Expr::int(3)),
        ]),
    )]);

    let values = return_values(&body, &table).expect("walk");
    assert_eq!(
        rendered(&values),
        vec![
            ("1".to_string(), vec!["A".to_string()]),
            ("2".to_string(), vec!["!A".to_string(), "B".to_string()]),
            ("3".to_string(), vec!["!A".to_string(), "!B".to_string()]),
        ]
    );
}

#[test]
fn configuration_decides_branches_and_guards_narrow_paths() {
    let table = rv32();
    let body = FunctionBody::new(vec![
        Stmt::cond_stmt(
            Expr::binary(Expr::ident("rs1"), BinOp::Eq, Expr::int(0)),
            Stmt::expr(Expr::call("raise", vec![Expr::int(2), Expr::int(0)])),
        ),
        Stmt::if_else(
            Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(64)),
            vec![Stmt::ret(Expr::int(64))],
            None,
        ),
        Stmt::ret(Expr::index(Expr::ident("X"), Expr::ident("rs1"))),
    ]);

    let values = return_values(&body, &table).expect("walk");
    assert_eq!(
        rendered(&values),
        vec![("X[rs1]".to_string(), vec!["rs1 != 0".to_string()])]
    );
}

#[test]
fn elseif_chains_see_every_earlier_arm_fail() {
    let table = rv32();
    let body = FunctionBody::new(vec![Stmt::if_chain(
        Expr::binary(Expr::ident("mode"), BinOp::Eq, Expr::int(0)),
        vec![Stmt::ret(Expr::int(10))],
        vec![(
            Expr::binary(Expr::ident("mode"), BinOp::Lt, Expr::int(3)),
            vec![Stmt::ret(Expr::int(20))],
        )],
        Some(vec![Stmt::ret(Expr::int(30))]),
    )]);

    let values = return_values(&body, &table).expect("walk");
    assert_eq!(
        rendered(&values),
        vec![
            ("10".to_string(), vec!["mode == 0".to_string()]),
            (
                "20".to_string(),
                vec!["mode != 0".to_string(), "mode < 3".to_string()]
            ),
            (
                "30".to_string(),
                vec!["mode != 0".to_string(), "mode >= 3".to_string()]
            ),
        ]
    );
}

#[test]
fn fall_through_branch_leaves_later_returns_unconstrained_by_it() {
    let table = rv32();
    let body = FunctionBody::new(vec![
        Stmt::if_else(
            Expr::ident("a"),
            vec![Stmt::ret(Expr::int(1))],
            Some(vec![Stmt::assign(Expr::ident("t"), Expr::int(0))]),
        ),
        Stmt::ret(Expr::ident("t")),
    ]);

    let values = return_values(&body, &table).expect("walk");
    assert_eq!(
        rendered(&values),
        vec![
            ("1".to_string(), vec!["a".to_string()]),
            ("t".to_string(), vec!["!a".to_string()]),
        ]
    );
}
