use crate::ast;
use crate::semantic_analyzer::analyze_program;

use super::generator::generate_program;
use super::GenError;

fn msil_of(src: &str) -> Vec<String> {
    let _ = env_logger::builder().is_test(true).try_init();
    let prog = ast::parse(src).expect("test program parses");
    let prog = analyze_program(prog).expect("test program analyzes");
    generate_program(&prog).expect("test program generates")
}

/// Trimmed lines of the entry-point method body, `.entrypoint` excluded.
fn entry_body(lines: &[String]) -> Vec<String> {
    let start = lines
        .iter()
        .position(|line| line.trim() == ".entrypoint")
        .expect("entry point marker")
        + 1;
    let mut out = Vec::new();
    for line in &lines[start..] {
        if line.trim() == "}" {
            break;
        }
        out.push(line.trim().to_string());
    }
    out
}

fn expected(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

#[test]
fn global_increment_round_trip() {
    let lines = msil_of("var x: Int = 5\nx = x + 1");
    assert!(lines.contains(&"  .field public static int32 _gl0".to_string()));
    assert_eq!(
        entry_body(&lines),
        expected(&[
            "ldc.i4 5",
            "stsfld int32 Program::_gl0",
            "ldsfld int32 Program::_gl0",
            "ldc.i4 1",
            "add",
            "stsfld int32 Program::_gl0",
            "ret",
        ])
    );
}

#[test]
fn headers_precede_fields_and_methods() {
    let lines = msil_of("var x: Int = 5 fun f(): Void { }");
    let field = lines
        .iter()
        .position(|line| line.starts_with("  .field"))
        .expect("field directive");
    let method = lines
        .iter()
        .position(|line| line.starts_with("  .method public static void f"))
        .expect("function method");
    let main = lines
        .iter()
        .position(|line| line.starts_with("  .method public static void Main"))
        .expect("entry method");
    assert_eq!(lines[0], ".assembly program");
    assert!(field < method);
    assert!(method < main);
}

#[test]
fn if_else_lowers_to_labeled_branches() {
    let lines = msil_of("var i: Int = 1 if (i == 1) { i = 2 } else { i = 3 }");
    assert_eq!(
        entry_body(&lines),
        expected(&[
            "ldc.i4 1",
            "stsfld int32 Program::_gl0",
            "ldsfld int32 Program::_gl0",
            "ldc.i4 1",
            "ceq",
            "ldc.i4 0",
            "ceq",
            "brtrue IL_0",
            "ldc.i4 2",
            "stsfld int32 Program::_gl0",
            "br IL_1",
            "IL_0:",
            "ldc.i4 3",
            "stsfld int32 Program::_gl0",
            "IL_1:",
            "ret",
        ])
    );
}

#[test]
fn while_loops_jump_back_to_their_test() {
    let lines = msil_of("var i: Int = 0 while (i < 3) { i = i + 1 }");
    let body = entry_body(&lines);
    assert!(body.contains(&"IL_0:".to_string()));
    assert!(body.contains(&"brtrue IL_1".to_string()));
    assert!(body.contains(&"br IL_0".to_string()));
    let test = body.iter().position(|line| line == "clt").expect("loop test");
    let exit = body.iter().position(|line| line == "brtrue IL_1").expect("loop exit");
    assert!(test < exit);
}

#[test]
fn string_equality_calls_the_string_runtime() {
    let lines = msil_of("var a: String = \"x\" if (a == \"x\") { }");
    assert!(lines
        .iter()
        .any(|line| line.trim() == "call bool [mscorlib]System.String::op_Equality(string, string)"));
}

#[test]
fn ordering_without_direct_opcode_is_negated() {
    let lines = msil_of("var i: Int = 1 var b: Boolean = i >= 2");
    let body = entry_body(&lines);
    let clt = body.iter().position(|line| line == "clt").expect("clt");
    assert_eq!(body[clt + 1], "ldc.i4 0");
    assert_eq!(body[clt + 2], "ceq");
}

#[test]
fn calls_name_class_and_return_type() {
    let lines = msil_of("println(\"hi\")");
    assert_eq!(
        entry_body(&lines),
        expected(&["ldstr \"hi\"", "call void class Runtime::println(string)", "ret"])
    );
}

#[test]
fn discarded_call_results_are_popped() {
    let lines = msil_of("toInt(\"5\")");
    assert_eq!(
        entry_body(&lines),
        expected(&["ldstr \"5\"", "call int32 class Runtime::toInt(string)", "pop", "ret"])
    );
}

#[test]
fn conversions_call_the_runtime() {
    let lines = msil_of("var f: Float = 1");
    assert_eq!(
        entry_body(&lines),
        expected(&[
            "ldc.i4 1",
            "call float32 class Runtime::intToFloat(int32)",
            "stsfld float32 Program::_gl0",
            "ret",
        ])
    );
}

#[test]
fn function_methods_carry_header_locals_and_args() {
    let lines =
        msil_of("fun add(a: Int, b: Int): Int { var sum: Int = a + b return sum } var r: Int = add(1, 2)");
    assert!(lines
        .contains(&"  .method public static int32 add(int32 a, int32 b) cil managed".to_string()));
    assert!(lines.contains(&"    .locals init ([0] int32 sum)".to_string()));
    assert!(lines.iter().any(|line| line.trim() == "ldarg 0"));
    assert!(lines.iter().any(|line| line.trim() == "ldarg 1"));
    assert!(lines.iter().any(|line| line.trim() == "stloc 0"));
    assert!(lines.iter().any(|line| line.trim() == "call int32 class Program::add(int32, int32)"));
}

#[test]
fn when_tests_run_in_source_order() {
    let lines = msil_of("var i: Int = 1 when (i) { 1 -> { i = 10 } 1 -> { i = 20 } else -> { i = 30 } }");
    let body = entry_body(&lines);
    let first = body.iter().position(|line| line == "brtrue IL_0").expect("first test");
    let second = body.iter().position(|line| line == "brtrue IL_1").expect("second test");
    let else_store = body.iter().position(|line| line == "ldc.i4 30").expect("else body");
    let first_body = body.iter().position(|line| line == "ldc.i4 10").expect("first body");
    assert!(first < second);
    assert!(second < else_store);
    assert!(else_store < first_body);
}

#[test]
fn range_loops_count_up_inclusively() {
    let lines = msil_of("fun f(): Void { for (i in 1..3) { println(\"x\") } }");
    assert!(lines.contains(&"    .locals init ([0] int32 i)".to_string()));
    assert!(lines.iter().any(|line| line.trim() == "cgt"));
    assert!(lines.iter().any(|line| line.trim() == "br IL_0"));
}

#[test]
fn array_elements_load_and_store() {
    let lines = msil_of("fun swap0(a: Array<Int>): Void { a[0] = a[1] }");
    assert!(lines.iter().any(|line| line.trim() == "ldelem.i4"));
    assert!(lines.iter().any(|line| line.trim() == "stelem.i4"));
}

#[test]
fn unanalyzed_trees_are_internal_errors() {
    let prog = ast::parse("var x: Int = 5").expect("test program parses");
    let err = generate_program(&prog).expect_err("generation must refuse undecorated trees");
    assert_eq!(err, GenError::UnresolvedIdent);
}

#[test]
fn label_numbering_counts_only_labeled_lines() {
    let lines = msil_of("var i: Int = 1 if (i == 1) { } if (i == 2) { }");
    let labeled: Vec<&String> = lines.iter().filter(|line| line.starts_with("IL_")).collect();
    assert_eq!(labeled.len(), 4);
    for (i, line) in labeled.iter().enumerate() {
        assert_eq!(**line, format!("IL_{}:", i));
    }
}
