use super::ast_def::*;
use super::parse;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn literal_classification() {
    let pos = Pos { line: 1, column: 1 };
    assert_eq!(LiteralNode::from_literal("5", pos).value, LiteralValue::Int(5));
    assert_eq!(LiteralNode::from_literal("5.25", pos).value, LiteralValue::Float(5.25));
    assert_eq!(LiteralNode::from_literal("true", pos).value, LiteralValue::Bool(true));
    assert_eq!(LiteralNode::from_literal("false", pos).value, LiteralValue::Bool(false));
    assert_eq!(
        LiteralNode::from_literal("\"a\\nb\"", pos).value,
        LiteralValue::Str("a\nb".to_string())
    );
}

#[test]
fn line_index_positions() {
    let index = LineIndex::new("ab\ncd");
    assert_eq!(index.pos(0), Pos { line: 1, column: 1 });
    assert_eq!(index.pos(3), Pos { line: 2, column: 1 });
    assert_eq!(index.pos(4), Pos { line: 2, column: 2 });
}

#[test]
fn parse_builds_statement_list() {
    init_logging();
    let prog = parse("var x: Int = 5\nx = x + 1").expect("program parses");
    assert_eq!(prog.stmts.len(), 2);
    assert!(matches!(prog.stmts[0], StmtNode::VarDecl(_)));
    assert!(matches!(prog.stmts[1], StmtNode::Assign(_)));
}

#[test]
fn omitted_for_clauses_are_materialized() {
    let prog = parse("for (;;) {}").expect("program parses");
    match &prog.stmts[0] {
        StmtNode::For(f) => {
            assert!(f.init.stmts.is_empty());
            assert!(f.step.stmts.is_empty());
            match &f.cond {
                ExprNode::Literal(lit) => assert_eq!(lit.value, LiteralValue::Bool(true)),
                other => panic!("expected a literal condition, got {:?}", other),
            }
        }
        other => panic!("expected a for loop, got {:?}", other),
    }
}

#[test]
fn else_if_chain_nests() {
    let prog = parse("var x: Int = 1 if (x == 1) { } else if (x == 2) { } else { }")
        .expect("program parses");
    match &prog.stmts[1] {
        StmtNode::If(outer) => match outer.else_stmt.as_deref() {
            Some(StmtNode::If(inner)) => assert!(inner.else_stmt.is_some()),
            other => panic!("expected an else-if, got {:?}", other),
        },
        other => panic!("expected an if, got {:?}", other),
    }
}

#[test]
fn expr_bodied_function_desugars_to_return() {
    let prog = parse("fun twice(a: Int): Int = a + a").expect("program parses");
    match &prog.stmts[0] {
        StmtNode::FuncDecl(f) => {
            assert_eq!(f.body.stmts.len(), 1);
            assert!(matches!(f.body.stmts[0], StmtNode::Return(_)));
        }
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn nested_array_annotations_parse() {
    let prog = parse("var m: Array<Array<Int>>").expect("program parses");
    match &prog.stmts[0] {
        StmtNode::VarDecl(v) => assert_eq!(v.var_type.type_text(), "Array<Array<Int>>"),
        other => panic!("expected a declaration, got {:?}", other),
    }
}

#[test]
fn tree_rendering_is_idempotent() {
    let prog = parse("var x: Int = 5 if (x > 1) { x = 2 } else { x = 3 }").expect("program parses");
    let first = prog.tree_lines();
    let second = prog.tree_lines();
    assert_eq!(first, second);
    assert_eq!(first[0], "...");
    assert!(first.iter().any(|line| line.ends_with("if")));
    assert!(first.iter().any(|line| line.starts_with("├ ") || line.starts_with("└ ")));
}

#[test]
fn syntax_errors_carry_positions() {
    let err = parse("var = 5").expect_err("bad program is rejected");
    assert!(err.pos.is_some());
    assert!(err.to_string().contains("line 1"));
}
