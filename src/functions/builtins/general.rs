use std::cmp::Ordering;

use super::{BuiltinContext, BuiltinSpec};
use crate::error::{JsltError, Result};
use crate::interpreter::operations::compare;
use crate::value::Value;

pub(super) const FUNCTIONS: &[BuiltinSpec] = &[
    BuiltinSpec::new("contains", 2, 2, contains),
    BuiltinSpec::new("size", 1, 1, size),
    BuiltinSpec::new("error", 1, 1, error),
    BuiltinSpec::new("min", 2, 2, min),
    BuiltinSpec::new("max", 2, 2, max),
];

fn contains(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    let (needle, haystack) = (&args[0], &args[1]);
    match haystack {
        Value::Null => Ok(Value::Bool(false)),
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| item == needle))),
        Value::Object(obj) => Ok(Value::Bool(obj.contains_key(&needle.to_text()))),
        Value::String(s) => Ok(Value::Bool(s.contains(needle.to_text().as_str()))),
        other => Err(JsltError::runtime(format!(
            "contains() cannot look inside {}",
            other.type_name()
        ))),
    }
}

fn size(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(obj) => Ok(Value::from(obj.len())),
        Value::String(s) => Ok(Value::from(s.chars().count())),
        other => Err(JsltError::runtime(format!(
            "Function size() cannot work on {}",
            other.type_name()
        ))),
    }
}

fn error(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Err(JsltError::runtime(format!("error: {}", args[0].to_text())))
}

fn min(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    pick(&args[0], &args[1], Ordering::Less)
}

fn max(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    pick(&args[0], &args[1], Ordering::Greater)
}

fn pick(a: &Value, b: &Value, wanted: Ordering) -> Result<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if compare(b, a)? == wanted {
        Ok(b.clone())
    } else {
        Ok(a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, json};
    use crate::value::Value;

    #[test]
    fn test_contains() {
        assert_eq!(call("contains", vec![json("2"), json("[1, 2.0]")]).unwrap(), Value::Bool(true));
        assert_eq!(call("contains", vec![json("\"a\""), json(r#"{"a": 1}"#)]).unwrap(), Value::Bool(true));
        assert_eq!(call("contains", vec![json("\"ell\""), json("\"hello\"")]).unwrap(), Value::Bool(true));
        assert_eq!(call("contains", vec![json("1"), Value::Null]).unwrap(), Value::Bool(false));
        assert!(call("contains", vec![json("1"), json("5")]).is_err());
    }

    #[test]
    fn test_size() {
        assert_eq!(call("size", vec![json("[1,2,3]")]).unwrap(), Value::Integer(3));
        assert_eq!(call("size", vec![json("\"héllo\"")]).unwrap(), Value::Integer(5));
        assert_eq!(call("size", vec![Value::Null]).unwrap(), Value::Null);
        assert!(call("size", vec![json("true")]).is_err());
    }

    #[test]
    fn test_error_raises_message() {
        let err = call("error", vec![json("\"bad input\"")]).unwrap_err();
        assert_eq!(err.message(), "error: bad input");
        assert!(!err.is_compile_error());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(call("min", vec![json("3"), json("2.5")]).unwrap(), Value::Decimal(2.5));
        assert_eq!(call("max", vec![json("\"a\""), json("\"b\"")]).unwrap(), Value::from("b"));
        assert_eq!(call("max", vec![Value::Null, json("1")]).unwrap(), Value::Null);
        assert!(call("min", vec![json("1"), json("\"a\"")]).is_err());
    }
}
