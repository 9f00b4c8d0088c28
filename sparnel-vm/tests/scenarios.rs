//! End-to-end behavior of the full pipeline: source → bytecode → result.

use sparnel_types::{NativeError, Value};
use sparnel_vm::{Context, Error, ErrorKind, Fault, VmParams};

fn eval(src: &str) -> Value {
    Context::new().eval_source(src).unwrap()
}

fn eval_err(src: &str) -> Error {
    Context::new().eval_source(src).unwrap_err()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval("return 1 + 2 * 3;"), Value::Int(7));
}

#[test]
fn string_concatenation() {
    assert_eq!(eval("var s = \"foo\" .. \"bar\"; return s;"), Value::from("foobar"));
    assert_eq!(
        eval("return \"a\" .. \"b\" .. \"c\";"),
        Value::from("abc")
    );
}

#[test]
fn function_call() {
    assert_eq!(
        eval("var f = fn(x) { return x * x; }; return f(5);"),
        Value::Int(25)
    );
}

#[test]
fn aggregate_integer_keys() {
    assert_eq!(
        eval("var a = {}; a[0] = 10; a[1] = 20; return a[0] + a[1];"),
        Value::Int(30)
    );
}

#[test]
fn integer_division_by_zero_has_a_backtrace() {
    let mut ctx = Context::new();
    let err = ctx.eval_source("return 1 / 0;").unwrap_err();
    match &err {
        Error::Runtime(e) => {
            assert_eq!(e.fault, Fault::IntegerDivisionByZero);
            assert!(!e.trace.is_empty());
            assert_eq!(e.trace.frames(), ["<main>"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(err.to_string(), "runtime error: integer division by zero");
    assert_eq!(ctx.last_error(), Some(&err));
    assert!(ctx.backtrace().is_some());
}

#[test]
fn writing_a_captured_free_variable_is_a_global_store() {
    // `c` is a top-level local; the closure assigns it, so inside the
    // closure every `c` is a global reference. No such global exists, so
    // the call faults.
    let err = eval_err(
        "var c = 0; var inc = fn() { c = c + 1; return c; }; \
         inc(); inc(); return inc();",
    );
    match err {
        Error::Runtime(e) => {
            assert_eq!(e.fault, Fault::GlobalNotFound("c".into()));
            assert_eq!(e.trace.frames(), ["inc", "<main>"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn arithmetic_promotion_is_observable() {
    assert_eq!(eval("return 7 / 2;"), Value::Int(3));
    assert_eq!(eval("return 7.0 / 2;"), Value::Float(3.5));
    assert_eq!(eval("return 7 / 2.0;"), Value::Float(3.5));
    assert_eq!(eval("return 2 * 3;"), Value::Int(6));
    assert_eq!(eval("return 7 % 4;"), Value::Int(3));
}

#[test]
fn comparisons_and_equality() {
    assert_eq!(eval("return 1 < 2;"), Value::Bool(true));
    assert_eq!(eval("return \"a\" < \"b\";"), Value::Bool(true));
    assert_eq!(eval("return 1 == 1.0;"), Value::Bool(true));
    assert_eq!(eval("return 1 != 2;"), Value::Bool(true));
    let err = eval_err("return 1 < \"a\";");
    assert!(matches!(
        err,
        Error::Runtime(e) if matches!(e.fault, Fault::NotComparable { .. })
    ));
}

#[test]
fn short_circuit_logic() {
    // The right operand must not run when the left decides.
    assert_eq!(
        eval("var f = fn() { return boom(); }; return false && f();"),
        Value::Bool(false)
    );
    assert_eq!(
        eval("var f = fn() { return boom(); }; return true || f();"),
        Value::Bool(true)
    );
    assert_eq!(eval("return 1 and 2;"), Value::Bool(true));
    assert_eq!(eval("return 0 or nil;"), Value::Bool(false));
}

#[test]
fn ternary_selects_lazily() {
    assert_eq!(eval("return 1 ? 10 : boom();"), Value::Int(10));
    assert_eq!(eval("return 0 ? boom() : 20;"), Value::Int(20));
}

#[test]
fn loops() {
    assert_eq!(
        eval("var s = 0; for (var i = 1; i <= 10; i += 1) { s += i; } return s;"),
        Value::Int(55)
    );
    assert_eq!(
        eval("var i = 0; while (i < 5) { i += 1; } return i;"),
        Value::Int(5)
    );
    assert_eq!(
        eval("var i = 0; do { i += 1; } while (i < 3); return i;"),
        Value::Int(3)
    );
    assert_eq!(
        eval(
            "var s = 0; for (var i = 0; i < 10; i += 1) { \
               if (i == 2) continue; if (i == 5) break; s += i; } return s;"
        ),
        Value::Int(1 + 3 + 4)
    );
}

#[test]
fn sizeof_and_typeof() {
    assert_eq!(eval("return sizeof \"four\";"), Value::Int(4));
    assert_eq!(eval("return sizeof { 1, 2, 3 };"), Value::Int(3));
    assert_eq!(eval("return typeof 1;"), Value::from("int"));
    assert_eq!(eval("return typeof 1.5;"), Value::from("float"));
    assert_eq!(eval("return typeof nil;"), Value::from("nil"));
    assert_eq!(eval("return typeof \"s\";"), Value::from("string"));
    assert_eq!(eval("return typeof {};"), Value::from("array"));
    assert_eq!(eval("return typeof fn() {};"), Value::from("function"));
}

#[test]
fn aggregate_literals_and_members() {
    assert_eq!(
        eval("var p = { x: 3, y: 4 }; return p.x * p.x + p[\"y\"] * p.y;"),
        Value::Int(25)
    );
    assert_eq!(
        eval("var a = { 10, 20, 30 }; return a[0] + a[2];"),
        Value::Int(40)
    );
    assert_eq!(eval("var a = {}; return a[99];"), Value::Nil);
    assert_eq!(
        eval("var t = {}; t.n = 1; t.n += 41; return t.n;"),
        Value::Int(42)
    );
}

#[test]
fn globals_and_const() {
    assert_eq!(eval("const K = 6; var f = fn() { return K * 7; }; return f();"), Value::Int(42));
    // Assignment to an undeclared name creates a global visible to
    // functions.
    assert_eq!(
        eval("g = 21; var f = fn() { return g + g; }; return f();"),
        Value::Int(42)
    );
}

#[test]
fn resolved_symbols_never_revert() {
    let mut ctx = Context::new();
    ctx.set_global("g", Value::Int(1));
    let f = ctx.load_source("return g + g;").unwrap();
    assert_eq!(ctx.call(&f, &[]).unwrap(), Value::Int(2));
    // The stub was rewritten in place; later redefinition does not reach
    // an already-resolved program.
    ctx.set_global("g", Value::Int(100));
    assert_eq!(ctx.call(&f, &[]).unwrap(), Value::Int(2));
    // A freshly loaded program resolves the new value.
    assert_eq!(ctx.eval_source("return g;").unwrap(), Value::Int(100));
}

#[test]
fn unresolved_global_is_a_runtime_error() {
    let err = eval_err("return missing;");
    assert!(matches!(
        err,
        Error::Runtime(e) if e.fault == Fault::GlobalNotFound("missing".into())
    ));
}

#[test]
fn native_functions_round_trip_values() {
    let mut ctx = Context::new();
    ctx.register_native("double", |args| match args {
        [Value::Int(i)] => Ok(Value::Int(i * 2)),
        _ => Err(NativeError::new("expected one integer")),
    });
    assert_eq!(
        ctx.eval_source("return double(21);").unwrap(),
        Value::Int(42)
    );
    let err = ctx.eval_source("return double(\"x\");").unwrap_err();
    match err {
        Error::Runtime(e) => {
            assert_eq!(
                e.fault,
                Fault::Native {
                    name: "double".into(),
                    message: "expected one integer".into()
                }
            );
            assert!(!e.trace.is_empty());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn host_calls_a_script_function_with_values() {
    let mut ctx = Context::new();
    ctx.eval_source("var f = fn(a, b) { return a .. b; }; glue = f;")
        .unwrap();
    let f = ctx.global("glue").unwrap();
    let f = match f {
        Value::Function(f) => f,
        other => panic!("unexpected: {other:?}"),
    };
    let out = ctx.call(&f, &[Value::from("spar"), Value::from("nel")]).unwrap();
    assert_eq!(out, Value::from("sparnel"));
    // Missing arguments arrive as nil.
    let mut ctx2 = Context::new();
    ctx2.eval_source("probe = fn(a) { return typeof a; };").unwrap();
    let probe = match ctx2.global("probe").unwrap() {
        Value::Function(f) => f,
        other => panic!("unexpected: {other:?}"),
    };
    assert_eq!(ctx2.call(&probe, &[]).unwrap(), Value::from("nil"));
}

#[test]
fn script_arguments() {
    let mut ctx = Context::new();
    ctx.set_script_args(vec![Value::from("first"), Value::Int(2)]);
    assert_eq!(ctx.eval_source("return argc;").unwrap(), Value::Int(2));
    assert_eq!(ctx.eval_source("return #0;").unwrap(), Value::from("first"));
    assert_eq!(ctx.eval_source("return #1;").unwrap(), Value::Int(2));
    let err = ctx.eval_source("return #5;").unwrap_err();
    assert!(matches!(
        err,
        Error::Runtime(e) if matches!(e.fault, Fault::ArgumentOutOfBounds { index: 5, len: 2 })
    ));
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let mut ctx = Context::with_params(VmParams {
        max_call_depth: 32,
        ..VmParams::default()
    });
    // `rec` is a global, so the closure body can see itself.
    let err = ctx
        .eval_source("rec = fn(n) { return rec(n + 1); }; return rec(0);")
        .unwrap_err();
    match err {
        Error::Runtime(e) => {
            assert_eq!(e.fault, Fault::CallDepthExceeded);
            assert!(e.trace.frames().len() > 2);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn error_kinds_classify() {
    let mut ctx = Context::new();
    assert_eq!(
        ctx.eval_source("return 1 +;").unwrap_err().kind(),
        ErrorKind::Syntax
    );
    assert_eq!(
        ctx.eval_source("break;").unwrap_err().kind(),
        ErrorKind::Semantic
    );
    assert_eq!(
        ctx.eval_source("return 1 / 0;").unwrap_err().kind(),
        ErrorKind::Runtime
    );
    assert_eq!(ctx.load_binary(&[1, 2, 3]).unwrap_err().kind(), ErrorKind::Generic);
}

#[test]
fn expression_entry_point() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval_expression("6 * 7").unwrap(), Value::Int(42));
    assert_eq!(
        ctx.eval_expression("\"ab\" .. \"cd\"").unwrap(),
        Value::from("abcd")
    );
}

#[test]
fn wrong_operand_types_fault() {
    for src in [
        "return 1 + \"a\";",
        "return -\"a\";",
        "return ~1.5;",
        "return 1 .. 2;",
        "return sizeof 1;",
        "return nil[0];",
        "return 3();",
    ] {
        let err = eval_err(src);
        assert!(
            matches!(
                &err,
                Error::Runtime(e) if matches!(
                    e.fault,
                    Fault::WrongOperandType { .. } | Fault::NotIndexable(_) | Fault::NotCallable(_)
                )
            ),
            "{src} gave {err:?}"
        );
    }
}

#[test]
fn unhashable_keys_fault() {
    let err = eval_err("var a = {}; a[{}] = 1;");
    assert!(matches!(
        err,
        Error::Runtime(e) if matches!(e.fault, Fault::UnhashableKey(_))
    ));
}
