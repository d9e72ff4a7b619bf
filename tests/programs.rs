//! End-to-end programs run through the library API, with captured output.

use lox::vm::LoxError;

fn run(source: &str) -> (String, Result<(), LoxError>) {
    let mut out = Vec::new();
    let result = lox::interpret_with_output(source, &mut out);
    (
        String::from_utf8(out).expect("interpreter output is UTF-8"),
        result,
    )
}

fn run_ok(source: &str) -> String {
    let (output, result) = run(source);
    result.expect("program runs to completion");
    output
}

fn runtime_error(source: &str) -> (usize, String, String) {
    let (output, result) = run(source);
    match result {
        Err(LoxError::RuntimeError { line, message }) => (line, message, output),
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
}

#[test]
fn global_variables() {
    assert_eq!(
        run_ok("var a = 2; var b = 3; print a + b; a = a + 10; print a;"),
        "5\n12\n"
    );
}

#[test]
fn if_else() {
    assert_eq!(
        run_ok("var x = 1; if (x == 1) print \"yes\"; else print \"no\";"),
        "yes\n"
    );
}

#[test]
fn while_loop() {
    assert_eq!(
        run_ok("var i = 0; while (i < 3) { print i; i = i + 1; }"),
        "0\n1\n2\n"
    );
}

#[test]
fn division_by_zero() {
    let (line, message, output) = runtime_error("print 1 / 0;");
    assert_eq!(message, "Division by zero.");
    assert_eq!(line, 1);
    assert_eq!(output, "", "nothing was printed before the error");
}

#[test]
fn undefined_variable() {
    let (_, message, _) = runtime_error("print undefined_var;");
    assert_eq!(message, "Undefined variable 'undefined_var'.");
}

#[test]
fn unary_and_truthiness() {
    assert_eq!(run_ok("print -(3 + 4); print !nil; print !!0;"), "-7\ntrue\ntrue\n");
}

#[test]
fn strings_print_their_bytes() {
    assert_eq!(run_ok("print \"hello world\"; print \"\";"), "hello world\n\n");
}

#[test]
fn chained_assignment() {
    assert_eq!(
        run_ok("var a = 1; var b = 2; var c = 3; a = b = c = 9; print a; print b; print c;"),
        "9\n9\n9\n"
    );
}

#[test]
fn nested_blocks() {
    assert_eq!(
        run_ok("var total = 0; { { total = total + 1; } { total = total + 2; } } print total;"),
        "3\n"
    );
}

#[test]
fn deep_while_iteration() {
    assert_eq!(
        run_ok(
            "var i = 0; var total = 0; \
             while (i < 100000) { total = total + i; i = i + 1; } \
             print total;"
        ),
        "4999950000\n"
    );
}

#[test]
fn compile_errors_are_reported_not_executed() {
    for source in [
        "print ;",
        "var = 1;",
        "while true print 1;",
        "\"unterminated",
        "print 1. ;",
        "1 ? 2;",
    ] {
        let (output, result) = run(source);
        assert!(
            matches!(result, Err(LoxError::CompileError)),
            "{:?} should fail to compile",
            source
        );
        assert_eq!(output, "", "{:?} must not execute", source);
    }
}

#[test]
fn number_roundtrip_through_display() {
    for literal in ["0", "1", "3", "2.5", "0.125", "123456789", "0.1"] {
        let printed = run_ok(&format!("print {};", literal));
        let reparsed: f64 = printed.trim().parse().expect("printed number reparses");
        assert_eq!(reparsed, literal.parse::<f64>().unwrap(), "{}", literal);
    }
}

#[test]
fn output_interleaves_with_control_flow() {
    assert_eq!(
        run_ok(
            "var n = 5; var acc = 1; var i = 1; \
             while (i < n + 1) { acc = acc * i; i = i + 1; } \
             if (acc > 100) print acc; else print \"small\";"
        ),
        "120\n"
    );
}
