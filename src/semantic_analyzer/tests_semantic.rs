use crate::ast;
use crate::ast::ast_def::*;

use super::analyzer::{analyze_program, prepare_global_scope};
use super::namespace::{IdentDesc, Namesp, StorageClass};
use super::types::TypeDesc;
use super::{SemResult, SemanticError, SemanticErrorKind};

fn analyze_src(src: &str) -> SemResult<StmtListNode> {
    let _ = env_logger::builder().is_test(true).try_init();
    let prog = ast::parse(src).expect("test program parses");
    analyze_program(prog)
}

fn expect_err(src: &str) -> SemanticError {
    analyze_src(src).expect_err("analysis should fail")
}

fn var_desc(stmt: &StmtNode) -> &IdentDesc {
    match stmt {
        StmtNode::VarDecl(v) => v.name.info.ident.as_ref().expect("declaration decorated"),
        other => panic!("expected a declaration, got {:?}", other),
    }
}

fn var_init(stmt: &StmtNode) -> &ExprNode {
    match stmt {
        StmtNode::VarDecl(v) => v.init.as_ref().expect("declaration initialized"),
        other => panic!("expected a declaration, got {:?}", other),
    }
}

#[test]
fn exact_operands_need_no_conversion() {
    let prog = analyze_src("var a: Int = 1 var b: Int = a + 2").unwrap();
    match var_init(&prog.stmts[1]) {
        ExprNode::BinOp(op) => {
            assert_eq!(op.info.ty, Some(TypeDesc::INT));
            assert!(matches!(op.left.as_ref(), ExprNode::Ident(_)));
            assert!(matches!(op.right.as_ref(), ExprNode::Literal(_)));
        }
        other => panic!("expected a binary operation, got {:?}", other),
    }
}

#[test]
fn int_right_operand_converts_to_float() {
    let prog = analyze_src("var f: Float = 1.5 var g: Float = f + 1").unwrap();
    match var_init(&prog.stmts[1]) {
        ExprNode::BinOp(op) => {
            assert_eq!(op.info.ty, Some(TypeDesc::FLOAT));
            match op.right.as_ref() {
                ExprNode::TypeConvert(conv) => {
                    assert_eq!(conv.info.ty, Some(TypeDesc::FLOAT));
                    assert!(matches!(conv.expr.as_ref(), ExprNode::Literal(_)));
                }
                other => panic!("expected a conversion, got {:?}", other),
            }
        }
        other => panic!("expected a binary operation, got {:?}", other),
    }
}

#[test]
fn int_left_operand_converts_to_float() {
    let prog = analyze_src("var f: Float = 1.5 var g: Float = 1 + f").unwrap();
    match var_init(&prog.stmts[1]) {
        ExprNode::BinOp(op) => {
            assert!(matches!(op.left.as_ref(), ExprNode::TypeConvert(_)));
            assert!(matches!(op.right.as_ref(), ExprNode::Ident(_)));
        }
        other => panic!("expected a binary operation, got {:?}", other),
    }
}

#[test]
fn incompatible_operands_are_rejected() {
    let err = expect_err("var s: String = \"a\" var i: Int = 1 var x: Int = i - s");
    match err.kind {
        SemanticErrorKind::IncompatibleOperands { op, left, right } => {
            assert_eq!(op, BinOp::Sub);
            assert_eq!(left, TypeDesc::INT);
            assert_eq!(right, TypeDesc::STR);
        }
        other => panic!("expected an operator error, got {:?}", other),
    }
}

#[test]
fn conversions_are_directed() {
    assert!(analyze_src("var f: Float = 1").is_ok());
    let err = expect_err("var i: Int = 1.5");
    assert!(matches!(err.kind, SemanticErrorKind::CannotConvert { .. }));
}

#[test]
fn storage_classes_and_slots() {
    let prog = analyze_src("var g: Int\n{ var h: Int }\nfun f(p0: Int): Void { var l: Int }").unwrap();

    let g = var_desc(&prog.stmts[0]);
    assert_eq!(g.storage, StorageClass::Global);
    assert_eq!(g.index, 0);

    let block = match &prog.stmts[1] {
        StmtNode::Block(b) => b,
        other => panic!("expected a block, got {:?}", other),
    };
    let h = var_desc(&block.stmts[0]);
    assert_eq!(h.storage, StorageClass::GlobalLocal);
    assert_eq!(h.index, 1);

    let func = match &prog.stmts[2] {
        StmtNode::FuncDecl(f) => f,
        other => panic!("expected a function, got {:?}", other),
    };
    let p0 = func.params[0].name.info.ident.as_ref().expect("param decorated");
    assert_eq!(p0.storage, StorageClass::Param);
    assert_eq!(p0.index, 0);
    let l = var_desc(&func.body.stmts[0]);
    assert_eq!(l.storage, StorageClass::Local);
    assert_eq!(l.index, 0);
}

#[test]
fn duplicate_param_leaves_outer_scopes_intact() {
    let mut scope = Namesp::new();
    scope.add_ident(IdentDesc::new("g", TypeDesc::INT), None).unwrap();
    scope.enter_function_scope(IdentDesc::new("f", TypeDesc::func(TypeDesc::VOID, Vec::new())));
    scope.add_ident(IdentDesc::param("p", TypeDesc::INT), None).unwrap();

    let err = scope.add_ident(IdentDesc::param("p", TypeDesc::STR), None).unwrap_err();
    assert!(matches!(err.kind, SemanticErrorKind::AlreadyDeclared(_)));
    assert_eq!(scope.lookup("p").unwrap().ty, TypeDesc::INT);
    assert_eq!(scope.lookup("g").unwrap().index, 0);

    scope.exit_scope();
    assert!(scope.lookup("p").is_none());
    assert!(scope.lookup("g").is_some());
}

#[test]
fn locals_shadow_globals_only() {
    assert!(analyze_src("var x: Int fun f(): Void { var x: Int }").is_ok());

    let err = expect_err("fun f(): Void { var x: Int var x: Int }");
    assert!(matches!(err.kind, SemanticErrorKind::AlreadyDeclared(_)));

    let err = expect_err("fun f(p: Int): Void { var p: Int }");
    assert!(matches!(err.kind, SemanticErrorKind::AlreadyDeclared(_)));
}

#[test]
fn duplicate_global_declaration_fails() {
    let err = expect_err("var a: Int var a: Int");
    assert!(matches!(err.kind, SemanticErrorKind::AlreadyDeclared(_)));
}

#[test]
fn identifier_must_be_declared() {
    let err = expect_err("x = 1");
    assert!(matches!(err.kind, SemanticErrorKind::IdentNotFound(_)));
    assert!(err.pos.is_some());
    assert!(err.to_string().contains("line 1"));
}

#[test]
fn condition_must_be_bool_convertible() {
    let err = expect_err("var s: String = \"a\" if (s) { }");
    assert!(matches!(err.kind, SemanticErrorKind::CannotConvert { .. }));
    // Int converts to Boolean, so a numeric condition is accepted.
    assert!(analyze_src("if (1) { }").is_ok());
}

#[test]
fn when_requires_an_else_branch() {
    let err = expect_err("var i: Int = 1 when (i) { 1 -> { } }");
    assert!(matches!(err.kind, SemanticErrorKind::MissingElseBranch));
}

#[test]
fn when_accepts_duplicate_branch_values() {
    assert!(analyze_src("var i: Int = 1 when (i) { 1 -> { } 1 -> { } else -> { } }").is_ok());
}

#[test]
fn functions_must_be_top_level() {
    let err = expect_err("fun f(): Void { fun g(): Void { } }");
    assert!(matches!(err.kind, SemanticErrorKind::NestedFunction));
}

#[test]
fn return_needs_an_enclosing_function() {
    let err = expect_err("return 1");
    assert!(matches!(err.kind, SemanticErrorKind::ReturnOutsideFunction));
}

#[test]
fn return_value_converts_to_the_declared_type() {
    assert!(analyze_src("fun f(): Float { return 1 }").is_ok());
    let err = expect_err("fun f(): Int { return 1.5 }");
    assert!(matches!(err.kind, SemanticErrorKind::CannotConvert { .. }));
    let err = expect_err("fun f(): Int { return; }");
    assert!(matches!(err.kind, SemanticErrorKind::CannotConvert { .. }));
}

#[test]
fn call_arity_is_checked() {
    let err = expect_err("fun f(a: Int): Int { return a } var x: Int = f(1, 2)");
    assert_eq!(
        err.kind,
        SemanticErrorKind::ArityMismatch { name: "f".to_string(), expected: 1, actual: 2 }
    );
}

#[test]
fn argument_mismatches_are_aggregated() {
    let err = expect_err("fun f(a: Int, b: Int): Void { } var s: String = \"x\" f(s, s)");
    match err.kind {
        SemanticErrorKind::ArgumentTypeMismatch { name, details, expected, actual } => {
            assert_eq!(name, "f");
            assert!(details.contains("argument 1"));
            assert!(details.contains("argument 2"));
            assert_eq!(expected, "Int, Int");
            assert_eq!(actual, "String, String");
        }
        other => panic!("expected an aggregated argument error, got {:?}", other),
    }
}

#[test]
fn recursive_calls_resolve() {
    assert!(
        analyze_src("fun fact(n: Int): Int { if (n < 2) { return 1 } return fact(n - 1) * n }")
            .is_ok()
    );
}

#[test]
fn duplicate_function_names_fail() {
    let err = expect_err("fun f(): Void { } fun f(): Void { }");
    assert!(matches!(err.kind, SemanticErrorKind::AlreadyDeclared(_)));
}

#[test]
fn built_ins_are_seeded() {
    let scope = prepare_global_scope();
    let println = scope.lookup("println").expect("println registered");
    assert!(println.built_in);
    assert_eq!(println.ty, TypeDesc::func(TypeDesc::VOID, vec![TypeDesc::STR]));

    // User globals start at slot 0 even though the library was analyzed first.
    let prog = analyze_src("var x: Int = 5").unwrap();
    assert_eq!(var_desc(&prog.stmts[0]).index, 0);
}

#[test]
fn range_loop_declares_an_int_counter() {
    let prog = analyze_src("fun f(): Void { for (i in 1..3) { println(\"x\") } }").unwrap();
    let func = match &prog.stmts[0] {
        StmtNode::FuncDecl(f) => f,
        other => panic!("expected a function, got {:?}", other),
    };
    let loop_var = match &func.body.stmts[0] {
        StmtNode::ForRange(f) => f.var.info.ident.as_ref().expect("loop variable decorated"),
        other => panic!("expected a range loop, got {:?}", other),
    };
    assert_eq!(loop_var.ty, TypeDesc::INT);
    assert_eq!(loop_var.storage, StorageClass::Local);
    assert_eq!(loop_var.index, 0);
}

#[test]
fn array_elements_type_check() {
    assert!(analyze_src("fun first(a: Array<Int>): Int { return a[0] }").is_ok());
    let err = expect_err("var i: Int = 1 var x: Int = i[0]");
    assert!(matches!(err.kind, SemanticErrorKind::NotAnArray(_)));
}

#[test]
fn unknown_types_are_rejected() {
    let err = expect_err("var x: Number = 1");
    assert!(matches!(err.kind, SemanticErrorKind::UnknownType(_)));
}

#[test]
fn decorated_tree_renders_descriptors() {
    let prog = analyze_src("var x: Int = 5").unwrap();
    let lines = prog.tree_lines();
    assert!(lines.iter().any(|line| line.contains("x : Int, global, 0")));
    assert_eq!(lines, prog.tree_lines());
}
