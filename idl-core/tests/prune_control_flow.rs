use idl_ast::{
    BinOp, Expr, FunctionDef, Operation, Param, Stmt, StmtKind, TypeName, VarDecl,
};
use idl_core::{prune_expr, prune_function, prune_stmt_list, IdlError, Prune, Value, Var};
use pretty_assertions::assert_eq;

mod common;
use common::rv32;

fn render(stmts: &[Stmt]) -> String {
    stmts.iter().map(ToString::to_string).collect()
}

#[test]
fn width_dependent_shift_mask_collapses() {
    let table = rv32();
    let mut lease = table.global_clone().expect("lease");
    lease.push(None);
    lease.add(Var::decode("rs1", idl_core::Type::bits(5))).expect("rs1");
    lease.add(Var::decode("rs2", idl_core::Type::bits(5))).expect("rs2");

    let shift = |msb| {
        Expr::binary(
            Expr::index(Expr::ident("X"), Expr::ident("rs1")),
            BinOp::Shl,
            Expr::slice(
                Expr::index(Expr::ident("X"), Expr::ident("rs2")),
                Expr::int(msb),
                Expr::int(0),
            ),
        )
    };
    let expr = Expr::ternary(
        Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(64)),
        shift(5),
        shift(4),
    );

    let pruned = prune_expr(&expr, &lease).expect("prune");
    assert_eq!(pruned, shift(4));
    assert_eq!(pruned.to_string(), "X[rs1] << X[rs2][4:0]");

    lease.pop().expect("pop");
    lease.release().expect("release");
}

#[test]
fn if_false_elseif_true_yields_elseif_body() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);
    table.add(Var::new("a", idl_core::Type::bits(8), None)).expect("a");

    let stmt = Stmt::if_chain(
        Expr::bool(false),
        vec![Stmt::assign(Expr::ident("a"), Expr::int(1))],
        vec![(
            Expr::bool(true),
            vec![Stmt::assign(Expr::ident("a"), Expr::int(2))],
        )],
        Some(vec![Stmt::assign(Expr::ident("a"), Expr::int(3))]),
    );

    let pruned = stmt.prune(&mut table).expect("prune");
    assert_eq!(pruned.stmts, vec![Stmt::assign(Expr::ident("a"), Expr::int(2))]);
    assert_eq!(table.get_var("a").and_then(Var::value), Some(&Value::Bits(2)));
}

#[test]
fn parameter_conditions_select_branches() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);

    let stmts = vec![
        Stmt::decl(TypeName::named("XReg"), "result", None),
        Stmt::if_chain(
            Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(64)),
            vec![Stmt::assign(Expr::ident("result"), Expr::int(64))],
            vec![(
                Expr::binary(Expr::ident("PMP_ENTRIES"), BinOp::Gt, Expr::ident("MTVAL_WIDTH")),
                vec![Stmt::assign(Expr::ident("result"), Expr::int(1))],
            )],
            Some(vec![Stmt::assign(Expr::ident("result"), Expr::int(2))]),
        ),
        Stmt::ret(Expr::ident("result")),
    ];

    let mut tracking = true;
    let pruned = prune_stmt_list(&stmts, &mut table, &mut tracking).expect("prune");
    assert_eq!(
        render(&pruned.stmts),
        "XReg result;\n\
         if (7'd16 > MTVAL_WIDTH) {\n  result = 1;\n} else {\n  result = 2;\n}\n\
         return result;\n"
    );
}

#[test]
fn collapsed_branch_with_declarations_keeps_its_scope() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);

    let stmts = vec![
        Stmt::if_else(
            Expr::call("implemented?", vec![Expr::enum_ref("ExtensionName", "C")]),
            vec![
                Stmt::decl(TypeName::bits(16), "half", Some(Expr::int(2))),
                Stmt::expr(Expr::call("advance_pc", vec![Expr::ident("half")])),
            ],
            None,
        ),
        Stmt::decl(TypeName::bits(16), "half", Some(Expr::int(4))),
    ];

    let mut tracking = true;
    let pruned = prune_stmt_list(&stmts, &mut table, &mut tracking).expect("prune");
    assert!(matches!(pruned.stmts[0].kind, StmtKind::Block(_)));
    assert_eq!(
        render(&pruned.stmts),
        "{\n  Bits<16> half = 2;\n  advance_pc(16'd2);\n}\nBits<16> half = 4;\n"
    );
}

#[test]
fn unimplemented_extension_branch_disappears() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);
    let stmt = Stmt::if_else(
        Expr::call("implemented?", vec![Expr::enum_ref("ExtensionName", "F")]),
        vec![Stmt::expr(Expr::call("mark_fs_dirty", vec![]))],
        None,
    );
    let pruned = stmt.prune(&mut table).expect("prune");
    assert!(pruned.stmts.is_empty());
}

#[test]
fn undecidable_branches_forget_assigned_values() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);
    table.add(Var::decode("rd", idl_core::Type::bits(5))).expect("rd");

    let stmts = vec![
        Stmt::decl(TypeName::bits(8), "a", Some(Expr::int(5))),
        Stmt::decl(TypeName::bits(8), "b", Some(Expr::int(6))),
        Stmt::if_else(
            Expr::binary(Expr::ident("rd"), BinOp::Eq, Expr::int(0)),
            vec![Stmt::assign(Expr::ident("a"), Expr::int(1))],
            None,
        ),
        Stmt::assign(
            Expr::index(Expr::ident("X"), Expr::ident("rd")),
            Expr::binary(Expr::ident("a"), BinOp::Add, Expr::ident("b")),
        ),
    ];

    let mut tracking = true;
    let pruned = prune_stmt_list(&stmts, &mut table, &mut tracking).expect("prune");
    assert_eq!(
        render(&pruned.stmts),
        "Bits<8> a = 5;\nBits<8> b = 6;\nif (rd == 0) {\n  a = 1;\n}\nX[rd] = a + 8'd6;\n"
    );
}

#[test]
fn loop_assignments_are_unknown_inside_and_after_the_loop() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);

    let stmts = vec![
        Stmt::decl(TypeName::bits(8), "a", Some(Expr::int(5))),
        Stmt::decl(TypeName::bits(8), "b", Some(Expr::int(0))),
        Stmt::for_loop(
            VarDecl::new(TypeName::bits(5), "i", Some(Expr::int(0))),
            Expr::binary(Expr::ident("i"), BinOp::Lt, Expr::int(4)),
            Stmt::assign(
                Expr::ident("i"),
                Expr::binary(Expr::ident("i"), BinOp::Add, Expr::int(1)),
            ),
            vec![
                Stmt::assign(Expr::ident("b"), Expr::ident("a")),
                Stmt::assign(Expr::ident("a"), Expr::int(3)),
            ],
        ),
        Stmt::decl(TypeName::bits(8), "c", Some(Expr::ident("a"))),
    ];

    let mut tracking = true;
    let pruned = prune_stmt_list(&stmts, &mut table, &mut tracking).expect("prune");
    assert_eq!(
        render(&pruned.stmts),
        "Bits<8> a = 5;\nBits<8> b = 0;\n\
         for (Bits<5> i = 0; i < 4; i = i + 1) {\n  b = a;\n  a = 3;\n}\n\
         Bits<8> c = a;\n"
    );
    assert_eq!(table.get_var("a").and_then(Var::value), None);
    assert_eq!(table.get_var("b").and_then(Var::value), None);
}

#[test]
fn statements_after_return_are_dropped() {
    let table = rv32();
    let mut lease = table.global_clone().expect("lease");

    let def = FunctionDef::authored(
        "early",
        vec![],
        Some(TypeName::bits(8)),
        vec![
            Stmt::decl(TypeName::bits(8), "t", Some(Expr::int(1))),
            Stmt::ret(Expr::ident("t")),
            Stmt::assign(Expr::ident("ghost"), Expr::call("nowhere", vec![])),
            Stmt::decl(TypeName::named("NoSuchType"), "u", Some(Expr::ident("zz"))),
        ],
    );

    let pruned = def.prune(&mut lease).expect("prune");
    let body = pruned.body.expect("body");
    assert_eq!(render(&body.stmts), "Bits<8> t = 1;\nreturn 8'd1;\n");
    lease.release().expect("release");
}

#[test]
fn decided_conditional_return_truncates() {
    let mut table = rv32().global_clone().expect("lease");
    table.push(None);
    let stmts = vec![
        Stmt::cond_ret(
            Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(64)),
            Expr::int(1),
        ),
        Stmt::cond_ret(
            Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(32)),
            Expr::int(2),
        ),
        Stmt::ret(Expr::int(3)),
    ];
    let mut tracking = true;
    let pruned = prune_stmt_list(&stmts, &mut table, &mut tracking).expect("prune");
    assert_eq!(render(&pruned.stmts), "return 2;\n");
}

#[test]
fn template_arguments_fold_through_calls() {
    let mut table = idl_core::SymbolTable::new(Some(common::config(common::RV32)))
        .expect("symbol table");
    table
        .add_function(
            FunctionDef::authored(
                "low_bits",
                vec![Param::new("v", TypeName::bits(32))],
                Some(TypeName::bits(32)),
                vec![Stmt::ret(Expr::binary(
                    Expr::ident("v"),
                    BinOp::BitAnd,
                    Expr::binary(
                        Expr::binary(Expr::sized_int(32, 1), BinOp::Shl, Expr::ident("N")),
                        BinOp::Sub,
                        Expr::int(1),
                    ),
                ))],
            )
            .with_templates(vec![Param::new("N", TypeName::bits(8))]),
        )
        .expect("function");
    table.deep_freeze().expect("freeze");
    let lease = table.global_clone().expect("lease");

    let call = Expr::templated_call("low_bits", vec![Expr::int(4)], vec![Expr::sized_int(32, 0xff)]);
    assert_eq!(prune_expr(&call, &lease).expect("prune").to_string(), "32'd15");

    let symbolic = Expr::templated_call("low_bits", vec![Expr::int(4)], vec![Expr::ident("X")]);
    assert_eq!(prune_expr(&symbolic, &lease).expect("prune"), symbolic);
    assert!(lease.at_global_scope());
}

#[test]
fn pruning_a_function_binds_known_arguments() {
    let table = rv32();
    let mut lease = table.global_clone().expect("lease");
    let def = FunctionDef::authored(
        "pick",
        vec![Param::new("sel", TypeName::Boolean), Param::new("v", TypeName::named("XReg"))],
        Some(TypeName::named("XReg")),
        vec![Stmt::if_else(
            Expr::ident("sel"),
            vec![Stmt::ret(Expr::ident("v"))],
            Some(vec![Stmt::ret(Expr::int(0))]),
        )],
    )
    .with_origin("arch/isa/util.idl", 12);

    let pruned = prune_function(&def, &mut lease, &[], &[Some(Value::Bool(false)), None])
        .expect("prune");
    let body = pruned.body.expect("body");
    assert_eq!(render(&body.stmts), "return 0;\n");
    assert!(lease.at_global_scope());
    lease.release().expect("release");
}

#[test]
fn instruction_operations_see_decode_fields() {
    let table = rv32();
    let mut lease = table.global_clone().expect("lease");
    let op = Operation::new(
        "slli",
        &[("rd", 5), ("rs1", 5), ("shamt", 6)],
        vec![
            Stmt::cond_stmt(
                Expr::binary(
                    Expr::binary(Expr::ident("XLEN"), BinOp::Eq, Expr::int(32)),
                    BinOp::And,
                    Expr::binary(
                        Expr::slice(Expr::ident("shamt"), Expr::int(5), Expr::int(5)),
                        BinOp::Eq,
                        Expr::int(1),
                    ),
                ),
                Stmt::expr(Expr::call(
                    "raise",
                    vec![Expr::int(2), Expr::int(0)],
                )),
            ),
            Stmt::assign(
                Expr::index(Expr::ident("X"), Expr::ident("rd")),
                Expr::binary(
                    Expr::index(Expr::ident("X"), Expr::ident("rs1")),
                    BinOp::Shl,
                    Expr::ident("shamt"),
                ),
            ),
        ],
    );

    let pruned = op.prune(&mut lease).expect("prune");
    assert_eq!(
        render(&pruned.body.stmts),
        "raise(2, 0) if shamt[5:5] == 1;\nX[rd] = X[rs1] << shamt;\n"
    );

    let err = Operation::new("dup", &[("rd", 5), ("rd", 5)], vec![])
        .prune(&mut lease)
        .expect_err("duplicate decode field");
    assert!(matches!(err, IdlError::DuplicateDefinition { .. }));
    assert!(lease.at_global_scope());
    lease.release().expect("release");
}

/// `count(n) = (n == 0) ? 8'd0 : count(n - 8'd1)`
fn count() -> FunctionDef {
    FunctionDef::authored(
        "count",
        vec![Param::new("n", TypeName::bits(8))],
        Some(TypeName::bits(8)),
        vec![Stmt::ret(Expr::ternary(
            Expr::binary(Expr::ident("n"), BinOp::Eq, Expr::int(0)),
            Expr::sized_int(8, 0),
            Expr::call(
                "count",
                vec![Expr::binary(Expr::ident("n"), BinOp::Sub, Expr::sized_int(8, 1))],
            ),
        ))],
    )
}

/// `spread(n) = (n == 0) ? 8'd1 : spread(n - 8'd1) + spread(n - 8'd1)`
fn spread() -> FunctionDef {
    let recurse = || {
        Expr::call(
            "spread",
            vec![Expr::binary(Expr::ident("n"), BinOp::Sub, Expr::sized_int(8, 1))],
        )
    };
    FunctionDef::authored(
        "spread",
        vec![Param::new("n", TypeName::bits(8))],
        Some(TypeName::bits(8)),
        vec![Stmt::ret(Expr::ternary(
            Expr::binary(Expr::ident("n"), BinOp::Eq, Expr::int(0)),
            Expr::sized_int(8, 1),
            Expr::binary(recurse(), BinOp::Add, recurse()),
        ))],
    )
}

fn rv32_with(defs: Vec<FunctionDef>) -> idl_core::SymbolTable {
    let mut table = idl_core::SymbolTable::new(Some(common::config(common::RV32)))
        .expect("symbol table");
    for def in defs {
        table.add_function(def).expect("function");
    }
    table.deep_freeze().expect("freeze");
    table
}

#[test]
fn shallow_recursion_folds() {
    let table = rv32_with(vec![count()]);
    let call = Expr::call("count", vec![Expr::sized_int(8, 10)]);
    assert_eq!(prune_expr(&call, &table).expect("prune").to_string(), "8'd0");
}

#[test]
fn deep_recursion_stays_symbolic() {
    let table = rv32_with(vec![count()]);
    for n in [17, 50, 200] {
        let call = Expr::call("count", vec![Expr::sized_int(8, n)]);
        assert_eq!(prune_expr(&call, &table).expect("prune"), call);
    }
}

#[test]
fn branching_recursion_gives_up_quickly() {
    let table = rv32_with(vec![spread()]);
    let call = Expr::call("spread", vec![Expr::sized_int(8, 40)]);
    assert_eq!(prune_expr(&call, &table).expect("prune"), call);

    let small = Expr::call("spread", vec![Expr::sized_int(8, 3)]);
    assert_eq!(prune_expr(&small, &table).expect("prune").to_string(), "8'd8");
}

#[test]
fn deep_recursion_in_a_batch_is_contained() {
    let table = rv32_with(vec![count(), spread()]);
    let callers: Vec<FunctionDef> = [("deep", "count", 200), ("wide", "spread", 60)]
        .into_iter()
        .map(|(name, callee, n)| {
            FunctionDef::authored(
                name,
                vec![],
                Some(TypeName::bits(8)),
                vec![Stmt::ret(Expr::call(callee, vec![Expr::sized_int(8, n)]))],
            )
        })
        .collect();

    let report = idl_core::prune_functions(&table, &callers).expect("batch");
    assert!(report.is_clean());
    let rendered: Vec<String> = report
        .pruned
        .iter()
        .map(|def| render(&def.body.as_ref().expect("body").stmts))
        .collect();
    assert_eq!(
        rendered,
        vec![
            "return count(8'd200);\n".to_string(),
            "return spread(8'd60);\n".to_string(),
        ]
    );
}
