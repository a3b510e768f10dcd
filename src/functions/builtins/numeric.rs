use sha2::{Digest, Sha256};

use super::{expect_array, expect_number, fallback_or, type_error, BuiltinContext, BuiltinSpec};
use crate::error::{JsltError, Result};
use crate::interpreter::operations::remainder;
use crate::value::Value;

pub(super) const FUNCTIONS: &[BuiltinSpec] = &[
    BuiltinSpec::new("is-number", 1, 1, is_number),
    BuiltinSpec::new("is-integer", 1, 1, is_integer),
    BuiltinSpec::new("is-decimal", 1, 1, is_decimal),
    BuiltinSpec::new("number", 1, 2, number),
    BuiltinSpec::new("round", 1, 1, round),
    BuiltinSpec::new("floor", 1, 1, floor),
    BuiltinSpec::new("ceiling", 1, 1, ceiling),
    BuiltinSpec::new("random", 0, 0, random),
    BuiltinSpec::new("sum", 1, 1, sum),
    BuiltinSpec::new("mod", 2, 2, modulo),
    BuiltinSpec::new("hash-int", 1, 1, hash_int),
];

fn is_number(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_number()))
}

fn is_integer(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_integral()))
}

fn is_decimal(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_decimal()))
}

fn number(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        n @ (Value::Integer(_) | Value::Decimal(_)) => Ok(n.clone()),
        Value::String(s) => match parse_number(s.trim()) {
            Some(n) => Ok(n),
            None => fallback_or(
                args,
                1,
                JsltError::runtime(format!("number({}) failed: not a number", s)),
            ),
        },
        other => fallback_or(
            args,
            1,
            JsltError::runtime(format!("Can't convert {} to number", other.type_name())),
        ),
    }
}

/// Parses JSON-style number text, keeping integers integral.
pub(crate) fn parse_number(text: &str) -> Option<Value> {
    if text.is_empty()
        || !text.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
    {
        return None;
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::Integer(n));
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite()).map(Value::Decimal)
}

fn to_integer(n: f64) -> Value {
    if n.abs() < 9.2e18 {
        Value::Integer(n as i64)
    } else {
        Value::Decimal(n)
    }
}

fn round(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(n) => Ok(Value::Integer(*n)),
        // halves go toward positive infinity
        Value::Decimal(n) => Ok(to_integer((n + 0.5).floor())),
        other => Err(type_error("round", "a number", other)),
    }
}

fn floor(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Decimal(n) => Ok(to_integer(n.floor())),
        other => Err(type_error("floor", "a number", other)),
    }
}

fn ceiling(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Decimal(n) => Ok(to_integer(n.ceil())),
        other => Err(type_error("ceiling", "a number", other)),
    }
}

fn random(_ctx: &BuiltinContext<'_>, _args: &[Value]) -> Result<Value> {
    Ok(Value::Decimal(rand::random::<f64>()))
}

fn sum(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("sum", &args[0])?;

    let mut integral: Option<i64> = Some(0);
    let mut total = 0.0;
    for item in items {
        let n = expect_number("sum", item)?;
        total += n;
        integral = match (integral, item) {
            (Some(acc), Value::Integer(i)) => acc.checked_add(*i),
            _ => None,
        };
    }
    Ok(match integral {
        Some(n) => Value::Integer(n),
        None => Value::Decimal(total),
    })
}

fn modulo(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    remainder(&args[0], &args[1], "mod()")
}

fn hash_int(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    let digest = Sha256::digest(args[0].canonical_key().as_bytes());
    let bytes = [digest[0], digest[1], digest[2], digest[3]];
    Ok(Value::Integer(i32::from_be_bytes(bytes) as i64))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, json};
    use super::parse_number;
    use crate::value::Value;

    #[test]
    fn test_number_parses_text() {
        assert_eq!(call("number", vec![json("\"42\"")]).unwrap(), Value::Integer(42));
        assert_eq!(call("number", vec![json("\" 2.5 \"")]).unwrap(), Value::Decimal(2.5));
        assert_eq!(call("number", vec![json("\"1e3\"")]).unwrap(), Value::Decimal(1000.0));
        assert_eq!(call("number", vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_number_fallback() {
        assert!(call("number", vec![json("\"abc\"")]).is_err());
        assert_eq!(call("number", vec![json("\"abc\""), json("0")]).unwrap(), Value::Integer(0));
        assert_eq!(call("number", vec![json("[1]"), json("-1")]).unwrap(), Value::Integer(-1));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call("round", vec![json("2.5")]).unwrap(), Value::Integer(3));
        assert_eq!(call("round", vec![json("-2.5")]).unwrap(), Value::Integer(-2));
        assert_eq!(call("floor", vec![json("-1.2")]).unwrap(), Value::Integer(-2));
        assert_eq!(call("ceiling", vec![json("1.2")]).unwrap(), Value::Integer(2));
        assert_eq!(call("round", vec![json("7")]).unwrap(), Value::Integer(7));
        assert!(call("floor", vec![json("\"x\"")]).is_err());
    }

    #[test]
    fn test_random_in_unit_interval() {
        let n = call("random", vec![]).unwrap().as_f64().unwrap();
        assert!((0.0..1.0).contains(&n));
    }

    #[test]
    fn test_sum() {
        assert_eq!(call("sum", vec![json("[1, 2, 3]")]).unwrap(), Value::Integer(6));
        assert_eq!(call("sum", vec![json("[1, 2.5]")]).unwrap(), Value::Decimal(3.5));
        assert_eq!(call("sum", vec![json("[]")]).unwrap(), Value::Integer(0));
        assert!(call("sum", vec![json("[1, \"2\"]")]).is_err());
    }

    #[test]
    fn test_mod_is_non_negative() {
        assert_eq!(call("mod", vec![json("10"), json("3")]).unwrap(), Value::Integer(1));
        assert_eq!(call("mod", vec![json("-10"), json("3")]).unwrap(), Value::Integer(2));
        assert_eq!(call("mod", vec![json("10"), json("-3")]).unwrap(), Value::Integer(1));
        assert_eq!(call("mod", vec![Value::Null, json("3")]).unwrap(), Value::Null);
        assert!(call("mod", vec![json("1"), json("0")]).is_err());
        assert!(call("mod", vec![json("1.5"), json("2")]).is_err());
    }

    #[test]
    fn test_hash_int_is_stable() {
        let a = call("hash-int", vec![json(r#"{"a": 1, "b": 2}"#)]).unwrap();
        let b = call("hash-int", vec![json(r#"{"b": 2, "a": 1}"#)]).unwrap();
        assert_eq!(a, b);
        assert!(a.is_integral());
    }
}
