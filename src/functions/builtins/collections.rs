use super::{expect_array, expect_str, type_error, BuiltinContext, BuiltinSpec};
use crate::error::{JsltError, Result};
use crate::value::{Map, Value};

pub(super) const FUNCTIONS: &[BuiltinSpec] = &[
    // ---- booleans ----
    BuiltinSpec::new("boolean", 1, 1, boolean),
    BuiltinSpec::new("not", 1, 1, not),
    BuiltinSpec::new("is-boolean", 1, 1, is_boolean),
    // ---- objects ----
    BuiltinSpec::new("is-object", 1, 1, is_object),
    BuiltinSpec::new("get-key", 2, 3, get_key),
    // ---- arrays ----
    BuiltinSpec::new("array", 1, 1, array),
    BuiltinSpec::new("is-array", 1, 1, is_array),
    BuiltinSpec::new("flatten", 1, 1, flatten),
    BuiltinSpec::new("all", 1, 1, all),
    BuiltinSpec::new("any", 1, 1, any),
    BuiltinSpec::new("zip", 2, 2, zip),
    BuiltinSpec::new("zip-with-index", 1, 1, zip_with_index),
    BuiltinSpec::new("index-of", 2, 2, index_of),
];

fn boolean(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_true()))
}

fn not(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(!args[0].is_true()))
}

fn is_boolean(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_bool()))
}

fn is_object(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_object()))
}

fn get_key(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    let fallback = args.get(2).cloned().unwrap_or(Value::Null);
    let obj = match &args[0] {
        Value::Null => return Ok(fallback),
        Value::Object(obj) => obj,
        other => return Err(type_error("get-key", "an object", other)),
    };
    let key = expect_str("get-key", &args[1])?;
    match obj.get(key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Ok(fallback),
    }
}

fn array(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        a @ Value::Array(_) => Ok(a.clone()),
        Value::Object(obj) => Ok(Value::Array(
            obj.iter().map(|(k, v)| Value::key_value_pair(k, v.clone())).collect(),
        )),
        other => Err(JsltError::runtime(format!(
            "array() cannot convert {} to an array",
            other.type_name()
        ))),
    }
}

fn is_array(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_array()))
}

fn flatten(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("flatten", &args[0])?;
    let mut out = Vec::with_capacity(items.len());
    flatten_into(items, &mut out);
    Ok(Value::Array(out))
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn all(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("all", &args[0])?;
    Ok(Value::Bool(items.iter().all(Value::is_true)))
}

fn any(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("any", &args[0])?;
    Ok(Value::Bool(items.iter().any(Value::is_true)))
}

fn zip(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() || args[1].is_null() {
        return Ok(Value::Null);
    }
    let left = expect_array("zip", &args[0])?;
    let right = expect_array("zip", &args[1])?;
    if left.len() != right.len() {
        return Err(JsltError::runtime(format!(
            "zip() arrays must have the same length, got {} and {}",
            left.len(),
            right.len()
        )));
    }
    Ok(Value::Array(
        left.iter()
            .zip(right)
            .map(|(a, b)| Value::Array(vec![a.clone(), b.clone()]))
            .collect(),
    ))
}

fn zip_with_index(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("zip-with-index", &args[0])?;
    let pairs = items
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let mut pair = Map::with_capacity(2);
            pair.insert("value".to_string(), value.clone());
            pair.insert("index".to_string(), Value::from(index));
            Value::Object(pair)
        })
        .collect();
    Ok(Value::Array(pairs))
}

fn index_of(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("index-of", &args[0])?;
    Ok(match items.iter().position(|item| item == &args[1]) {
        Some(index) => Value::from(index),
        None => Value::Integer(-1),
    })
}
