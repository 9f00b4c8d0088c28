//! Closure and upvalue semantics: captures are by value at creation time.

use sparnel_types::Value;
use sparnel_vm::Context;

fn eval(src: &str) -> Value {
    Context::new().eval_source(src).unwrap()
}

#[test]
fn captures_snapshot_the_creation_site() {
    // Reassigning the source slot after closure creation must not be
    // visible through the capture.
    assert_eq!(
        eval("var x = 1; var f = fn() { return x; }; x = 2; return f();"),
        Value::Int(1)
    );
}

#[test]
fn each_closure_captures_independently() {
    assert_eq!(
        eval(
            "var fs = {}; \
             for (var i = 0; i < 3; i += 1) { fs[i] = fn() { return i; }; } \
             return fs[0]() + fs[1]() + fs[2]();"
        ),
        Value::Int(0 + 1 + 2)
    );
}

#[test]
fn parameters_capture_like_locals() {
    assert_eq!(
        eval(
            "var make = fn(a) { return fn(b) { return a + b; }; }; \
             var add2 = make(2); var add10 = make(10); \
             return add2(3) + add10(3);"
        ),
        Value::Int(5 + 13)
    );
}

#[test]
fn outer_captures_chain_through_intermediate_closures() {
    assert_eq!(
        eval(
            "var x = 40; \
             var outer = fn() { \
               var mid = fn() { \
                 var inner = fn() { return x + 2; }; \
                 return inner; \
               }; \
               return mid()(); \
             }; \
             return outer();"
        ),
        Value::Int(42)
    );
}

#[test]
fn closures_are_first_class_values() {
    assert_eq!(
        eval(
            "var apply = fn(f, v) { return f(v); }; \
             var sq = fn(x) { return x * x; }; \
             return apply(sq, 8);"
        ),
        Value::Int(64)
    );
}

#[test]
fn plain_lambdas_without_free_names_are_not_closures() {
    assert_eq!(
        eval("var f = fn(x) { var y = x + 1; return y; }; return f(41);"),
        Value::Int(42)
    );
}

#[test]
fn capture_of_a_mutated_loop_local_sees_the_value_at_creation() {
    assert_eq!(
        eval(
            "var i = 0; var snap = nil; \
             while (i < 5) { if (i == 2) { snap = fn() { return i; }; } i += 1; } \
             return snap();"
        ),
        Value::Int(2)
    );
}
