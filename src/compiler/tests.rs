//! End-to-end compiler tests: compile from source, apply to JSON.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::ast::{Expr, ExprKind, Slot};
use crate::error::Result;
use crate::functions::Callable;
use crate::interpreter::operations::compare;
use crate::value::Value;

fn eval(input: serde_json::Value, expr: &str) -> serde_json::Value {
    Compiler::new().compile(expr).unwrap().apply_json(&input).unwrap()
}

fn compile_err(expr: &str) -> JsltError {
    match Compiler::new().compile(expr) {
        Ok(_) => panic!("expected compile error for {}", expr),
        Err(e) => e,
    }
}

fn with_modules(modules: &[(&str, &str)]) -> Compiler {
    let resolver = modules
        .iter()
        .fold(MapResolver::new(), |r, (path, text)| r.with_source(*path, *text));
    Compiler::new().with_resolver(Arc::new(resolver))
}

// ---------------------------------------------------------------------------
// Operator and evaluation properties
// ---------------------------------------------------------------------------

#[test]
fn test_truthiness_table() {
    for falsy in [json!(false), json!(null), json!(""), json!([]), json!({}), json!(0), json!(0.0)] {
        assert_eq!(eval(falsy.clone(), "boolean(.)"), json!(false), "{}", falsy);
    }
    for truthy in [json!(true), json!("a"), json!([0]), json!({"a": null}), json!(1), json!(-0.5)] {
        assert_eq!(eval(truthy.clone(), "boolean(.)"), json!(true), "{}", truthy);
    }
}

#[test]
fn test_null_is_minimal() {
    let values = [
        json!(null),
        json!(false),
        json!(-1000),
        json!(2.5),
        json!(""),
        json!("z"),
        json!([1]),
        json!({"a": 1}),
    ];
    for v in values {
        let v = Value::from(v);
        assert_ne!(compare(&Value::Null, &v).unwrap(), std::cmp::Ordering::Greater);
    }
    assert_eq!(compare(&Value::Null, &Value::Null).unwrap(), std::cmp::Ordering::Equal);
    assert_eq!(eval(json!(null), "null < 1"), json!(true));
    assert_eq!(eval(json!(null), "null >= null"), json!(true));
}

#[test]
fn test_incomparable_values() {
    let err = Compiler::new().compile(". < 1").unwrap().apply(&Value::from(json!([1]))).unwrap_err();
    assert!(!err.is_compile_error());
    assert!(err.message().contains("Can't compare"));
}

#[test]
fn test_division_closure() {
    assert_eq!(eval(json!({"a": 6, "b": 3}), ".a / .b"), json!(2));
    assert_eq!(eval(json!({"a": 7, "b": 2}), ".a / .b"), json!(3.5));
    let err = Compiler::new().compile(".a / 0").unwrap().apply_json(&json!({"a": 1})).unwrap_err();
    assert!(!err.is_compile_error());
}

#[test]
fn test_numeric_equality_across_representations() {
    assert_eq!(eval(json!({"i": 1, "d": 1.0}), ".i == .d"), json!(true));
    assert_eq!(eval(json!({"a": [1, {"b": 2}]}), ".a == [1.0, {\"b\": 2}]"), json!(true));
    assert_eq!(eval(json!(null), "1 != \"1\""), json!(true));
}

#[test]
fn test_plus_variants() {
    assert_eq!(eval(json!({"s": "n="}), ".s + 5"), json!("n=5"));
    assert_eq!(eval(json!(null), "[1] + [2]"), json!([1, 2]));
    assert_eq!(eval(json!({"a": {"x": 1, "y": 1}, "b": {"y": 2, "z": 2}}), ".a + .b"), json!({"x": 1, "y": 1, "z": 2}));
    assert_eq!(eval(json!({"a": [1]}), ".a + .missing"), json!([1]));
    assert_eq!(eval(json!(null), "\"ab\" * 3"), json!("ababab"));
}

#[test]
fn test_matcher_explicit_entry_wins() {
    assert_eq!(eval(json!({"a": 1, "b": 2}), "{\"a\": 10, * : .}"), json!({"a": 10, "b": 2}));
}

#[test]
fn test_for_over_object_in_key_order() {
    assert_eq!(eval(json!(null), "[for ({\"x\": 1, \"y\": 2}) .value]"), json!([1, 2]));
    assert_eq!(eval(json!({"y": 2, "x": 1}), "[for (.) .key]"), json!(["y", "x"]));
}

#[test]
fn test_fallback_short_circuits() {
    assert_eq!(eval(json!({"b": 2}), "fallback(.a, .b, error(\"unused\"))"), json!(2));
    assert_eq!(eval(json!({"a": []}), "fallback(.a, .c)"), json!(null));
}

#[test]
fn test_pipe_and_lets() {
    let expr = "let total = sum(.items) .items | [for (.) . * 100 / $total]";
    assert_eq!(eval(json!({"items": [1, 3]}), expr), json!([25, 75]));
}

#[test]
fn test_recursive_function() {
    let expr = "def fact(n) if ($n <= 1) 1 else $n * fact($n - 1) fact(.)";
    assert_eq!(eval(json!(10), expr), json!(3628800));
}

#[test]
fn test_recursion_over_long_array() {
    // unoptimized debug builds use large frames per call
    let handle = std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(|| {
            let expr = "def s(arr) if ($arr) $arr[0] + s($arr[1:]) else 0 s(.)";
            eval(json!(vec![1; 150]), expr)
        })
        .unwrap();
    assert_eq!(handle.join().unwrap(), json!(150));
}

#[test]
fn test_call_depth_is_configurable() {
    let expr = "def s(arr) if ($arr) $arr[0] + s($arr[1:]) else 0 s(.)";
    let compiled = Compiler::new().with_max_call_depth(10).compile(expr).unwrap();
    assert_eq!(compiled.apply_json(&json!(vec![1; 9])).unwrap(), json!(9));
    let err = compiled.apply_json(&json!(vec![1; 30])).unwrap_err();
    assert!(err.to_string().contains("recursed deeper than 10 calls"));
}

#[test]
fn test_mutual_recursion_with_forward_reference() {
    let expr = "def even(n) if ($n == 0) true else odd($n - 1) \
                def odd(n) if ($n == 0) false else even($n - 1) \
                [even(10), odd(7), even(3)]";
    assert_eq!(eval(json!(null), expr), json!([true, true, false]));
}

#[test]
fn test_function_sees_top_level_lets() {
    let expr = "let rate = .rate def price(x) $x * $rate [for (.items) price(.)]";
    assert_eq!(eval(json!({"rate": 2, "items": [1, 2]}), expr), json!([2, 4]));
}

// ---------------------------------------------------------------------------
// Compile-time checks
// ---------------------------------------------------------------------------

#[test]
fn test_arity_enforced_at_compile_time() {
    let err = compile_err("def f(a, b) $a + $b f(1, 2, 3)");
    assert!(err.is_compile_error());
    let err = compile_err("contains(1, [1], 3)");
    assert!(err.is_compile_error());
    let err = compile_err("def g() f(1, 2, 3) def f(a, b) $a g()");
    assert!(err.is_compile_error());
}

#[test]
fn test_unknown_function_is_compile_error() {
    let err = compile_err("no-such-thing(1)");
    assert!(err.message().contains("no-such-thing"));
}

#[test]
fn test_declarations_only_is_rejected() {
    let err = compile_err("def f() 1");
    assert!(err.message().contains("no body"));
}

#[test]
fn test_source_name_in_locations() {
    let expr = Compiler::new().with_source_name("main.jslt").compile("\n  error(\"x\")").unwrap();
    let err = expr.apply(&Value::Null).unwrap_err();
    assert_eq!(err.to_string(), "Runtime error: error: x at main.jslt:2:3");
}

#[test]
fn test_slot_uniqueness() {
    let source = "let a = .a let b = .b \
                  def f(x, y) let z = $x [for ($y) let w = . {let v = $w \"k\": $v + $z}] \
                  {let c = $a \"q\": [for (.) let d = . let e = $d $e], \"r\": f($a, $b) + $c}";
    let expr = Compiler::new().without_optimization().compile(source).unwrap();
    let program = expr.program();

    let mut globals = HashSet::new();
    for binding in &program.lets {
        assert!(globals.insert(binding.slot.unwrap()));
    }
    declared_slots(program.body.as_ref().unwrap(), &mut globals);
    for (_, slot) in &program.parameters {
        assert!(globals.insert(*slot));
    }
    assert!(globals.iter().all(|s| !s.is_local()));
    assert_eq!(globals.len(), program.global_frame_size);

    let f = &program.functions[0];
    let mut locals: HashSet<Slot> = f.param_slots.iter().copied().collect();
    declared_slots(&f.body, &mut locals);
    assert!(locals.iter().all(|s| s.is_local()));
    assert_eq!(locals.len(), f.frame_size);
}

/// Collects let slots below `expr`, failing on any slot declared twice.
fn declared_slots(expr: &Expr, out: &mut HashSet<Slot>) {
    let mut expr = expr.clone();
    collect(&mut expr, out);

    fn collect(expr: &mut Expr, out: &mut HashSet<Slot>) {
        let lets: Vec<Slot> = match &expr.kind {
            ExprKind::Let { bindings, .. } => bindings.iter().filter_map(|b| b.slot).collect(),
            ExprKind::For { lets, .. } | ExprKind::ObjectFor { lets, .. } => {
                lets.iter().filter_map(|b| b.slot).collect()
            }
            ExprKind::Object(template) => template.lets.iter().filter_map(|b| b.slot).collect(),
            _ => Vec::new(),
        };
        for slot in lets {
            assert!(out.insert(slot), "slot {} declared twice", slot);
        }
        for child in expr.children_mut() {
            collect(child, out);
        }
    }
}

#[test]
fn test_optimized_and_unoptimized_agree() {
    let sources = [
        "let k = 3 [for (.xs) . * $k + 1 if (. > 1)]",
        "{\"a\": 1 + 2, \"b\": [1, 2][1], \"c\": if (true) .xs else 0, * : .}",
        "contains(.n, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])",
        "let s = \"a,b\" split($s, \",\") + [size(.xs)]",
    ];
    let inputs = [json!({"xs": [1, 2, 3], "n": 4}), json!({"xs": [], "n": 40}), json!({"xs": null})];
    for source in sources {
        let fast = Compiler::new().compile(source).unwrap();
        let slow = Compiler::new().without_optimization().compile(source).unwrap();
        for input in &inputs {
            assert_eq!(
                fast.apply_json(input).ok(),
                slow.apply_json(input).ok(),
                "{} on {}",
                source,
                input
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

#[test]
fn test_import_functions() {
    let compiler = with_modules(&[("lib.jslt", "def double(n) $n * 2 def triple(n) $n * 3")]);
    let expr = compiler.compile("import \"lib.jslt\" as lib [lib:double(.), lib:triple(.)]").unwrap();
    assert_eq!(expr.apply_json(&json!(5)).unwrap(), json!([10, 15]));
}

#[test]
fn test_module_body_and_lets() {
    let compiler =
        with_modules(&[("m.jslt", "let base = .base def add(n) $n + $base {\"sum\": add(.v)}")]);
    let expr = compiler
        .compile("import \"m.jslt\" as m [m({\"base\": 10, \"v\": 5}), m:add(1)]")
        .unwrap();
    // module lets see the call's input
    assert_eq!(expr.apply_json(&json!({"base": 100})).unwrap(), json!([{"sum": 15}, 101]));
}

#[test]
fn test_module_without_body_is_not_callable() {
    let compiler = with_modules(&[("lib.jslt", "def f() 1")]);
    let err = match compiler.compile("import \"lib.jslt\" as lib lib(1)") {
        Ok(_) => panic!("expected error"),
        Err(e) => e,
    };
    assert!(err.message().contains("No such function: 'lib'"));
}

#[test]
fn test_unknown_module_function() {
    let compiler = with_modules(&[("lib.jslt", "def f() 1")]);
    assert!(compiler.compile("import \"lib.jslt\" as lib lib:g()").is_err());
}

#[test]
fn test_nested_imports() {
    let compiler = with_modules(&[
        ("a.jslt", "import \"b.jslt\" as b def f(x) b:g($x) + 1"),
        ("b.jslt", "def g(x) $x * 10"),
    ]);
    let expr = compiler.compile("import \"a.jslt\" as a a:f(2)").unwrap();
    assert_eq!(expr.apply(&Value::Null).unwrap(), Value::Integer(21));
}

#[test]
fn test_cyclic_imports_rejected() {
    let compiler = with_modules(&[
        ("a.jslt", "import \"b.jslt\" as b def f() 1"),
        ("b.jslt", "import \"a.jslt\" as a def g() 2"),
        ("self.jslt", "import \"self.jslt\" as me def h() 3"),
    ]);
    let err = match compiler.compile("import \"a.jslt\" as a a:f()") {
        Ok(_) => panic!("cycle compiled"),
        Err(e) => e,
    };
    assert!(err.is_compile_error());
    assert!(err.message().contains("already imported"), "{}", err);

    let err = match compiler.compile("import \"self.jslt\" as s s:h()") {
        Ok(_) => panic!("self import compiled"),
        Err(e) => e,
    };
    assert!(err.message().contains("already imported"));

    let main = compiler.clone().with_source_name("main.jslt");
    let err = match main.compile("import \"main.jslt\" as m 1") {
        Ok(_) => panic!("main self import compiled"),
        Err(e) => e,
    };
    assert!(err.message().contains("already imported"));
}

struct CountingResolver {
    inner: MapResolver,
    calls: AtomicUsize,
}

impl ResourceResolver for CountingResolver {
    fn resolve(&self, path: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(path)
    }
}

#[test]
fn test_module_loaded_once_per_compilation() {
    let resolver = Arc::new(CountingResolver {
        inner: MapResolver::new()
            .with_source("shared.jslt", "def one() 1")
            .with_source("a.jslt", "import \"shared.jslt\" as s def f() s:one()"),
        calls: AtomicUsize::new(0),
    });
    let expr = Compiler::new()
        .with_resolver(resolver.clone())
        .compile("import \"shared.jslt\" as s import \"a.jslt\" as a s:one() + a:f()")
        .unwrap();
    assert_eq!(expr.apply(&Value::Null).unwrap(), Value::Integer(2));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_import_without_resolver() {
    let err = compile_err("import \"x.jslt\" as x 1");
    assert!(err.message().contains("no resource resolver"));
    assert_eq!(err.location().unwrap().line, 1);
}

#[test]
fn test_duplicate_prefix() {
    let compiler = with_modules(&[("a.jslt", "def f() 1"), ("b.jslt", "def f() 2")]);
    assert!(compiler.compile("import \"a.jslt\" as p import \"b.jslt\" as p p:f()").is_err());
}

struct Shout;

impl Callable for Shout {
    fn name(&self) -> &str {
        "shout"
    }
    fn min_arguments(&self) -> usize {
        1
    }
    fn max_arguments(&self) -> usize {
        1
    }
}

impl Function for Shout {
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(Value::String(format!("{}!", args[0].to_text().to_uppercase())))
    }
}

#[test]
fn test_named_function_module() {
    let module = FunctionModule::new().with_function(Arc::new(Shout));
    let expr = Compiler::new()
        .with_module("text", Arc::new(module))
        .compile("import \"text\" as t t:shout(.)")
        .unwrap();
    assert_eq!(expr.apply_json(&json!("hi")).unwrap(), json!("HI!"));
}

#[test]
fn test_extension_function() {
    let expr = Compiler::new().with_function(Arc::new(Shout)).compile("shout(.name)").unwrap();
    assert_eq!(expr.apply_json(&json!({"name": "ada"})).unwrap(), json!("ADA!"));
    assert!(compile_err("shout(1)").message().contains("shout"));
}

#[test]
fn test_parameters_reported() {
    let expr = Compiler::new().compile("let a = $x $a + $y").unwrap();
    assert_eq!(expr.parameters(), vec!["x", "y"]);
    let mut vars = HashMap::new();
    vars.insert("x".to_string(), Value::Integer(1));
    vars.insert("y".to_string(), Value::Integer(2));
    assert_eq!(expr.apply_with(&vars, &Value::Null).unwrap(), Value::Integer(3));
}
