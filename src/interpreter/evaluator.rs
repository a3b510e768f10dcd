use std::collections::HashSet;

use super::filter::ObjectFilter;
use super::operations::apply_binary_op;
use super::scope::Scope;
use crate::ast::*;
use crate::error::{JsltError, Location, Result};
use crate::value::{Map, Value};

/// Default for the deepest chain of user-function calls; beyond it
/// evaluation stops with an error.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Everything an evaluation needs besides the input: variable frames, the
/// unit's declared functions and the object filter.
pub struct EvalContext<'a> {
    pub scope: Scope,
    pub functions: &'a [FunctionDecl],
    pub filter: &'a dyn ObjectFilter,
    pub max_call_depth: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(program: &'a Program, filter: &'a dyn ObjectFilter) -> Self {
        Self {
            scope: Scope::new(program.global_frame_size),
            functions: &program.functions,
            filter,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

// ---------------------------------------------------------------------------
// Main evaluate function
// ---------------------------------------------------------------------------

pub fn evaluate(ctx: &mut EvalContext<'_>, input: &Value, expr: &Expr) -> Result<Value> {
    eval_node(ctx, input, expr).map_err(|e| e.or_at(&expr.location))
}

/// Runs a unit: its top-level lets in order, then its body.
pub fn evaluate_program(ctx: &mut EvalContext<'_>, input: &Value, program: &Program) -> Result<Value> {
    bind_lets(ctx, input, &program.lets)?;
    match &program.body {
        Some(body) => evaluate(ctx, input, body),
        None => Err(JsltError::runtime("Unit has no body expression")),
    }
}

pub fn bind_lets(ctx: &mut EvalContext<'_>, input: &Value, lets: &[LetBinding]) -> Result<()> {
    for binding in lets {
        let value = evaluate(ctx, input, &binding.value)?;
        let slot = resolved(binding.slot, &binding.name, &binding.location)?;
        ctx.scope.set(slot, value)?;
    }
    Ok(())
}

fn resolved(slot: Option<Slot>, name: &str, location: &Location) -> Result<Slot> {
    slot.ok_or_else(|| JsltError::runtime_at(format!("Variable ${} was never resolved", name), location))
}

fn eval_node(ctx: &mut EvalContext<'_>, input: &Value, expr: &Expr) -> Result<Value> {
    match &expr.kind {
        ExprKind::Literal(value) => Ok(value.clone()),

        ExprKind::Dot => Ok(input.clone()),

        ExprKind::DotKey { base, key } => {
            let base = eval_base(ctx, input, base.as_deref())?;
            Ok(base.get(key).cloned().unwrap_or(Value::Null))
        }

        ExprKind::Index { base, index } => {
            let base = eval_base(ctx, input, base.as_deref())?;
            let index = evaluate(ctx, input, index)?;
            index_value(&base, &index)
        }

        ExprKind::Slice { base, start, end } => {
            let base = eval_base(ctx, input, base.as_deref())?;
            let start = match start {
                Some(e) => evaluate(ctx, input, e)?,
                None => Value::Null,
            };
            let end = match end {
                Some(e) => evaluate(ctx, input, e)?,
                None => Value::Null,
            };
            slice_value(&base, &start, &end)
        }

        ExprKind::Variable { name, slot } => {
            let slot = resolved(*slot, name, &expr.location)?;
            Ok(ctx.scope.get(slot)?.clone())
        }

        ExprKind::FunctionCall { name, target, args } => match target {
            FunctionTarget::Callable(function) => {
                let args = eval_args(ctx, input, args)?;
                function.call(input, &args)
            }
            FunctionTarget::Declared(index) => {
                let args = eval_args(ctx, input, args)?;
                call_declared(ctx, input, *index, args)
            }
            FunctionTarget::Unresolved => {
                Err(JsltError::runtime(format!("Function '{}' was never resolved", name)))
            }
        },

        ExprKind::MacroCall { target, args, .. } => target.0.call(ctx, input, args),

        ExprKind::StaticContains { needle, set } => {
            let needle = evaluate(ctx, input, needle)?;
            Ok(Value::Bool(set.contains(&needle)))
        }

        ExprKind::Binary { op: BinaryOp::And, left, right } => {
            if !evaluate(ctx, input, left)?.is_true() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(evaluate(ctx, input, right)?.is_true()))
        }

        ExprKind::Binary { op: BinaryOp::Or, left, right } => {
            if evaluate(ctx, input, left)?.is_true() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(evaluate(ctx, input, right)?.is_true()))
        }

        ExprKind::Binary { op, left, right } => {
            let l = evaluate(ctx, input, left)?;
            let r = evaluate(ctx, input, right)?;
            apply_binary_op(*op, &l, &r)
        }

        ExprKind::If { cond, then, otherwise } => {
            if evaluate(ctx, input, cond)?.is_true() {
                evaluate(ctx, input, then)
            } else if let Some(otherwise) = otherwise {
                evaluate(ctx, input, otherwise)
            } else {
                Ok(Value::Null)
            }
        }

        ExprKind::For { seq, lets, body, filter } => {
            match iteration_items(evaluate(ctx, input, seq)?)? {
                Some(items) => eval_for(ctx, &items, lets, body, filter.as_deref()),
                None => Ok(Value::Null),
            }
        }

        ExprKind::ObjectFor { seq, lets, key, value, filter } => {
            match iteration_items(evaluate(ctx, input, seq)?)? {
                Some(items) => eval_object_for(ctx, &items, lets, key, value, filter.as_deref()),
                None => Ok(Value::Null),
            }
        }

        ExprKind::Object(template) => eval_object(ctx, input, template),

        ExprKind::Array(items) => Ok(Value::Array(eval_args(ctx, input, items)?)),

        ExprKind::Let { bindings, body } => {
            bind_lets(ctx, input, bindings)?;
            evaluate(ctx, input, body)
        }

        ExprKind::Pipe { left, right } => {
            let piped = evaluate(ctx, input, left)?;
            evaluate(ctx, &piped, right)
        }
    }
}

fn eval_base(ctx: &mut EvalContext<'_>, input: &Value, base: Option<&Expr>) -> Result<Value> {
    match base {
        Some(base) => evaluate(ctx, input, base),
        None => Ok(input.clone()),
    }
}

fn eval_args(ctx: &mut EvalContext<'_>, input: &Value, args: &[Expr]) -> Result<Vec<Value>> {
    args.iter().map(|arg| evaluate(ctx, input, arg)).collect()
}

/// Calls the unit's function at `index` with already evaluated arguments.
pub fn call_declared(
    ctx: &mut EvalContext<'_>,
    input: &Value,
    index: usize,
    args: Vec<Value>,
) -> Result<Value> {
    let functions = ctx.functions;
    let decl = functions
        .get(index)
        .ok_or_else(|| JsltError::runtime(format!("No function at index {}", index)))?;
    if ctx.scope.call_depth() >= ctx.max_call_depth {
        return Err(JsltError::runtime(format!(
            "Function '{}' recursed deeper than {} calls",
            decl.name, ctx.max_call_depth
        )));
    }

    ctx.scope.enter_call(decl.frame_size);
    let result = bind_params(ctx, decl, args).and_then(|_| evaluate(ctx, input, &decl.body));
    ctx.scope.leave_call();
    result
}

fn bind_params(ctx: &mut EvalContext<'_>, decl: &FunctionDecl, args: Vec<Value>) -> Result<()> {
    if decl.param_slots.len() != args.len() {
        return Err(JsltError::runtime(format!(
            "Function '{}' takes {} arguments, got {}",
            decl.name,
            decl.param_slots.len(),
            args.len()
        )));
    }
    for (slot, value) in decl.param_slots.iter().zip(args) {
        ctx.scope.set(*slot, value)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Comprehensions
// ---------------------------------------------------------------------------

/// Binds the item's lets and reports whether the item passes the filter.
fn admit(
    ctx: &mut EvalContext<'_>,
    item: &Value,
    lets: &[LetBinding],
    filter: Option<&Expr>,
) -> Result<bool> {
    bind_lets(ctx, item, lets)?;
    match filter {
        Some(filter) => Ok(evaluate(ctx, item, filter)?.is_true()),
        None => Ok(true),
    }
}

fn eval_for(
    ctx: &mut EvalContext<'_>,
    items: &[Value],
    lets: &[LetBinding],
    body: &Expr,
    filter: Option<&Expr>,
) -> Result<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if admit(ctx, item, lets, filter)? {
            out.push(evaluate(ctx, item, body)?);
        }
    }
    Ok(Value::Array(out))
}

fn eval_object_for(
    ctx: &mut EvalContext<'_>,
    items: &[Value],
    lets: &[LetBinding],
    key: &Expr,
    value_expr: &Expr,
    filter: Option<&Expr>,
) -> Result<Value> {
    let mut out = Map::new();
    for item in items {
        if !admit(ctx, item, lets, filter)? {
            continue;
        }
        // the key is only computed for values the object filter keeps
        let value = evaluate(ctx, item, value_expr)?;
        if !ctx.filter.keep(&value)? {
            continue;
        }
        match evaluate(ctx, item, key)? {
            Value::String(k) => {
                out.insert(k, value);
            }
            other => {
                return Err(JsltError::runtime_at(
                    format!("Object comprehension key must be a string, got {}", other),
                    &key.location,
                ))
            }
        }
    }
    Ok(Value::Object(out))
}

// ---------------------------------------------------------------------------
// Object templates
// ---------------------------------------------------------------------------

fn eval_object(ctx: &mut EvalContext<'_>, input: &Value, template: &ObjectTemplate) -> Result<Value> {
    bind_lets(ctx, input, &template.lets)?;

    let mut out = Map::new();
    // every explicit key, kept or filtered, is off limits to the matcher
    let mut produced: HashSet<String> = HashSet::new();

    for entry in &template.entries {
        let key = match &entry.key {
            ObjectKey::Static(key) => key.clone(),
            ObjectKey::Dynamic(key_expr) => match evaluate(ctx, input, key_expr)? {
                Value::String(key) => key,
                other => {
                    return Err(JsltError::runtime_at(
                        format!("Object key must be a string, got {}", other),
                        &entry.location,
                    ))
                }
            },
        };
        if !produced.insert(key.clone()) {
            return Err(JsltError::runtime_at(
                format!("Duplicate key '{}' in object", key),
                &entry.location,
            ));
        }
        let value = evaluate(ctx, input, &entry.value)?;
        if ctx.filter.keep(&value)? {
            out.insert(key, value);
        }
    }

    if let Some(matcher) = &template.matcher {
        let path = matcher.context.as_deref().unwrap_or(&[]);
        let mut source = Some(input);
        for key in path {
            source = source.and_then(|v| v.get(key));
        }
        if let Some(Value::Object(source)) = source {
            for (key, value) in source {
                if produced.contains(key) || matcher.exclusions.iter().any(|e| e == key) {
                    continue;
                }
                let value = evaluate(ctx, value, &matcher.value)?;
                if ctx.filter.keep(&value)? {
                    out.insert(key.clone(), value);
                }
            }
        }
    }

    Ok(Value::Object(out))
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Elements a `for` walks over; `None` when the sequence is null.
fn iteration_items(seq: Value) -> Result<Option<Vec<Value>>> {
    match seq {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(Some(items)),
        Value::Object(obj) => Ok(Some(
            obj.into_iter().map(|(k, v)| Value::key_value_pair(&k, v)).collect(),
        )),
        other => Err(JsltError::runtime(format!(
            "Can't iterate over {}",
            other.to_json_string_compact()
        ))),
    }
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

fn index_value(base: &Value, index: &Value) -> Result<Value> {
    match (base, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(items), Value::Integer(i)) => {
            Ok(normalize_index(*i, items.len()).map(|i| items[i].clone()).unwrap_or(Value::Null))
        }
        (Value::String(s), Value::Integer(i)) => {
            let chars: Vec<char> = s.chars().collect();
            match normalize_index(*i, chars.len()) {
                Some(i) => Ok(Value::String(chars[i].to_string())),
                None => Err(JsltError::runtime(format!(
                    "String index {} out of range for string of length {}",
                    i,
                    chars.len()
                ))),
            }
        }
        (Value::Object(obj), Value::String(key)) => {
            Ok(obj.get(key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(JsltError::runtime(format!(
            "Can't index {} with {}",
            base.type_name(),
            index.to_json_string_compact()
        ))),
    }
}

fn slice_bound(bound: &Value, default: i64, len: usize) -> Result<usize> {
    let n = match bound {
        Value::Null => default,
        Value::Integer(n) => *n,
        other => {
            return Err(JsltError::runtime(format!(
                "Slice bounds must be integers, got {}",
                other.to_json_string_compact()
            )))
        }
    };
    let len = len as i64;
    let n = if n < 0 { n + len } else { n };
    Ok(n.clamp(0, len) as usize)
}

fn slice_value(base: &Value, start: &Value, end: &Value) -> Result<Value> {
    match base {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let from = slice_bound(start, 0, items.len())?;
            let to = slice_bound(end, items.len() as i64, items.len())?;
            if from >= to {
                return Ok(Value::Array(Vec::new()));
            }
            Ok(Value::Array(items[from..to].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let from = slice_bound(start, 0, chars.len())?;
            let to = slice_bound(end, chars.len() as i64, chars.len())?;
            if from >= to {
                return Ok(Value::String(String::new()));
            }
            Ok(Value::String(chars[from..to].iter().collect()))
        }
        other => Err(JsltError::runtime(format!("Can't slice {}", other.type_name()))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::interpreter::filter::KeepAll;
    use serde_json::json;
    use std::sync::Arc;

    fn eval(input: serde_json::Value, expr: &str) -> Value {
        try_eval(input, expr).unwrap()
    }

    fn try_eval(input: serde_json::Value, expr: &str) -> Result<Value> {
        let compiled = Compiler::new().compile(expr)?;
        compiled.apply(&Value::from(input))
    }

    fn eval_err(input: serde_json::Value, expr: &str) -> String {
        try_eval(input, expr).unwrap_err().message().to_string()
    }

    #[test]
    fn test_dot_access() {
        assert_eq!(eval(json!({"a": {"b": 1}}), ".a.b"), Value::Integer(1));
        assert_eq!(eval(json!({"a": 1}), ".a.b"), Value::Null);
        assert_eq!(eval(json!([1, 2]), ".a"), Value::Null);
        assert_eq!(eval(json!({"a b": 2}), ".\"a b\""), Value::Integer(2));
    }

    #[test]
    fn test_array_indexing() {
        assert_eq!(eval(json!([1, 2, 3]), ".[0]"), Value::Integer(1));
        assert_eq!(eval(json!([1, 2, 3]), ".[-1]"), Value::Integer(3));
        assert_eq!(eval(json!([1, 2, 3]), ".[5]"), Value::Null);
        assert_eq!(eval(json!(null), ".[0]"), Value::Null);
        assert_eq!(eval(json!({"k": 4}), ".[\"k\"]"), Value::Integer(4));
        assert_eq!(eval(json!([1, 2]), ".[-9223372036854775808]"), Value::Null);
    }

    #[test]
    fn test_string_indexing() {
        assert_eq!(eval(json!("héllo"), ".[1]"), Value::from("é"));
        assert!(eval_err(json!("abc"), ".[3]").contains("out of range"));
    }

    #[test]
    fn test_slicing_clamps() {
        assert_eq!(eval(json!([1, 2, 3, 4]), ".[1:3]"), Value::from(json!([2, 3])));
        assert_eq!(eval(json!([1, 2, 3, 4]), ".[-2:]"), Value::from(json!([3, 4])));
        assert_eq!(eval(json!([1, 2, 3, 4]), ".[:100]"), Value::from(json!([1, 2, 3, 4])));
        assert_eq!(eval(json!([1, 2, 3, 4]), ".[3:1]"), Value::from(json!([])));
        assert_eq!(eval(json!("abcdef"), ".[2:4]"), Value::from("cd"));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(eval(json!(null), "false and error(\"boom\")"), Value::Bool(false));
        assert_eq!(eval(json!(null), "1 or error(\"boom\")"), Value::Bool(true));
        assert_eq!(eval(json!(null), "[1] and \"x\""), Value::Bool(true));
    }

    #[test]
    fn test_if_without_else() {
        assert_eq!(eval(json!({"a": 0}), "if (.a) \"yes\""), Value::Null);
        assert_eq!(eval(json!({"a": 1}), "if (.a) \"yes\" else \"no\""), Value::from("yes"));
    }

    #[test]
    fn test_for_over_arrays_and_objects() {
        assert_eq!(
            eval(json!([1, 2, 3, 4]), "[for (.) . * 10 if (. % 2 == 0)]"),
            Value::from(json!([20, 40]))
        );
        assert_eq!(
            eval(json!({"a": 1, "b": 2}), "[for (.) .key + \"=\" + .value]"),
            Value::from(json!(["a=1", "b=2"]))
        );
        assert_eq!(eval(json!(null), "[for (.) .]"), Value::Null);
        assert!(eval_err(json!(5), "[for (.) .]").contains("iterate"));
    }

    #[test]
    fn test_for_lets_see_each_item() {
        assert_eq!(
            eval(json!([1, 2]), "[for (.) let d = . * 2 $d + 1]"),
            Value::from(json!([3, 5]))
        );
    }

    #[test]
    fn test_object_comprehension() {
        assert_eq!(
            eval(json!([{"k": "a", "v": 1}, {"k": "b", "v": null}]), "{for (.) .k : .v}"),
            Value::from(json!({"a": 1}))
        );
        assert_eq!(
            eval(json!([["x", 1], ["x", 2]]), "{for (.) .[0] : .[1]}"),
            Value::from(json!({"x": 2}))
        );
        assert!(eval_err(json!([1]), "{for (.) . : 1}").contains("must be a string"));
    }

    #[test]
    fn test_object_comprehension_skips_key_of_filtered_value() {
        assert_eq!(
            eval(json!([1, 2]), "{for (.) error(\"key evaluated\") : null}"),
            Value::from(json!({}))
        );
        assert!(eval_err(json!([1]), "{for (.) error(\"key evaluated\") : 1}").contains("key evaluated"));
    }

    #[test]
    fn test_object_template_filters_empty_values() {
        assert_eq!(
            eval(json!({"a": 1}), "{\"a\": .a, \"b\": .missing, \"c\": [], \"d\": {}}"),
            Value::from(json!({"a": 1}))
        );
    }

    #[test]
    fn test_dynamic_key_duplicates_are_runtime_errors() {
        let err = eval_err(json!({"k": "a"}), "{\"a\": 1, (.k): 2}");
        assert!(err.contains("Duplicate key 'a'"));
        assert!(eval_err(json!(null), "{(1): 2}").contains("must be a string"));
    }

    #[test]
    fn test_matcher_copies_remaining_keys() {
        assert_eq!(
            eval(json!({"a": 1, "b": 2, "c": 3}), "{\"a\": 10, * - c : .}"),
            Value::from(json!({"a": 10, "b": 2}))
        );
    }

    #[test]
    fn test_matcher_value_sees_copied_value() {
        assert_eq!(
            eval(json!({"a": 1, "b": 2}), "{* : . * 100}"),
            Value::from(json!({"a": 100, "b": 200}))
        );
    }

    #[test]
    fn test_nested_matcher_uses_context_path() {
        let input = json!({"type": "x", "data": {"p": 1, "q": 2}});
        assert_eq!(
            eval(input, "{\"data\": {\"q\": 0, * : .}, * : .}"),
            Value::from(json!({"data": {"q": 0, "p": 1}, "type": "x"}))
        );
    }

    #[test]
    fn test_filtered_explicit_key_not_refilled_by_matcher() {
        assert_eq!(
            eval(json!({"a": 1, "b": 2}), "{\"a\": null, * : .}"),
            Value::from(json!({"b": 2}))
        );
    }

    #[test]
    fn test_matcher_on_non_object_copies_nothing() {
        assert_eq!(eval(json!([1, 2]), "{\"x\": 1, * : .}"), Value::from(json!({"x": 1})));
    }

    #[test]
    fn test_pipe_changes_context() {
        assert_eq!(eval(json!({"a": {"b": 3}}), ".a | .b + 1"), Value::Integer(4));
    }

    #[test]
    fn test_keep_all_filter() {
        let compiled = Compiler::new()
            .with_object_filter(Arc::new(KeepAll))
            .compile("{\"a\": null, \"b\": []}")
            .unwrap();
        assert_eq!(compiled.apply(&Value::Null).unwrap(), Value::from(json!({"a": null, "b": []})));
    }

    #[test]
    fn test_recursion_limit() {
        let compiled = Compiler::new().with_max_call_depth(20).compile("def f(x) f($x) f(1)").unwrap();
        let err = compiled.apply(&Value::Null).unwrap_err().to_string();
        assert!(err.contains("recursed deeper than 20 calls"));
    }

    #[test]
    fn test_runtime_errors_carry_location() {
        let err = try_eval(json!(null), "1 +\n  (2 / 0)").unwrap_err();
        let location = err.location().unwrap();
        assert_eq!(location.line, 2);
    }
}
