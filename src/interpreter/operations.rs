//! Operator semantics
//!
//! Pure functions over values: no scope, no evaluation. `and`/`or` are not
//! here since they decide whether their right side is evaluated at all.

use std::cmp::Ordering;

use crate::ast::BinaryOp;
use crate::error::{JsltError, Result};
use crate::value::Value;

/// Upper bound, in bytes, on a string built by `string * n`.
pub const MAX_REPEAT_BYTES: usize = 64 * 1024 * 1024;

pub fn apply_binary_op(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    match op {
        BinaryOp::Plus => plus(l, r),
        BinaryOp::Minus => arithmetic(op, l, r),
        BinaryOp::Multiply => multiply(l, r),
        BinaryOp::Divide => divide(l, r),
        BinaryOp::Modulo => remainder(l, r, "%"),
        BinaryOp::Equal => Ok(Value::Bool(l == r)),
        BinaryOp::NotEqual => Ok(Value::Bool(l != r)),
        BinaryOp::Less => Ok(Value::Bool(compare(l, r)? == Ordering::Less)),
        BinaryOp::LessOrEqual => Ok(Value::Bool(compare(l, r)? != Ordering::Greater)),
        BinaryOp::Greater => Ok(Value::Bool(compare(l, r)? == Ordering::Greater)),
        BinaryOp::GreaterOrEqual => Ok(Value::Bool(compare(l, r)? != Ordering::Less)),
        BinaryOp::And | BinaryOp::Or => Err(JsltError::runtime(format!(
            "'{}' must be evaluated lazily",
            op.symbol()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Ordering for `<`, `<=`, `>`, `>=`, `min` and `max`. Numbers compare with
/// numbers, strings with strings, and null sits below everything.
pub fn compare(l: &Value, r: &Value) -> Result<Ordering> {
    match (l, r) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Less),
        (_, Value::Null) => Ok(Ordering::Greater),
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) if a.is_number() && b.is_number() => {
            let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        _ => Err(JsltError::runtime(format!(
            "Can't compare {} and {}",
            l.to_json_string_compact(),
            r.to_json_string_compact()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn plus(l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", l.to_text(), r.to_text())))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut result = a.clone();
            result.extend(b.iter().cloned());
            Ok(Value::Array(result))
        }
        (Value::Object(a), Value::Object(b)) => {
            // left operand wins on shared keys
            let mut result = b.clone();
            for (k, v) in a {
                result.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(result))
        }
        (Value::Null, other @ (Value::Array(_) | Value::Object(_)))
        | (other @ (Value::Array(_) | Value::Object(_)), Value::Null) => Ok(other.clone()),
        _ => arithmetic(BinaryOp::Plus, l, r),
    }
}

fn multiply(l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s)) => {
            let count = usize::try_from((*n).max(0)).unwrap_or(usize::MAX);
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_REPEAT_BYTES => Ok(Value::String(s.repeat(count))),
                _ => Err(JsltError::runtime(format!(
                    "Can't repeat a string of {} bytes {} times",
                    s.len(),
                    n
                ))),
            }
        }
        _ => arithmetic(BinaryOp::Multiply, l, r),
    }
}

/// Numeric `+`, `-`, `*`. Null on either side gives null; integer overflow
/// is redone in decimal.
fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = operands(op, l, r)?;

    if let (Value::Integer(x), Value::Integer(y)) = (l, r) {
        let exact = match op {
            BinaryOp::Plus => x.checked_add(*y),
            BinaryOp::Minus => x.checked_sub(*y),
            BinaryOp::Multiply => x.checked_mul(*y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(Value::Integer(n));
        }
    }

    let n = match op {
        BinaryOp::Plus => a + b,
        BinaryOp::Minus => a - b,
        BinaryOp::Multiply => a * b,
        _ => return Err(JsltError::runtime(format!("'{}' is not arithmetic", op.symbol()))),
    };
    Ok(Value::Decimal(n))
}

fn divide(l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = operands(BinaryOp::Divide, l, r)?;
    if b == 0.0 {
        return Err(JsltError::runtime(format!(
            "Can't divide {} by zero",
            l.to_json_string_compact()
        )));
    }

    if let (Value::Integer(x), Value::Integer(y)) = (l, r) {
        if x.checked_rem(*y) == Some(0) {
            if let Some(n) = x.checked_div(*y) {
                return Ok(Value::Integer(n));
            }
        }
    }
    Ok(Value::Decimal(a / b))
}

/// `%` and `mod()`: integral operands only, result in `[0, |divisor|)`.
pub fn remainder(l: &Value, r: &Value, what: &str) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = match (l, r) {
        (Value::Integer(x), Value::Integer(y)) => (*x, *y),
        _ => {
            return Err(JsltError::runtime(format!(
                "{} requires integer operands, got {} and {}",
                what,
                l.to_json_string_compact(),
                r.to_json_string_compact()
            )))
        }
    };
    if y == 0 {
        return Err(JsltError::runtime(format!("{}: can't divide {} by zero", what, x)));
    }
    // i64::MIN % -1 is the only overflow and its remainder is 0
    Ok(Value::Integer(x.checked_rem_euclid(y).unwrap_or(0)))
}

fn operands(op: BinaryOp, l: &Value, r: &Value) -> Result<(f64, f64)> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(JsltError::runtime(format!(
            "Can't apply '{}' to {} and {}",
            op.symbol(),
            l.to_json_string_compact(),
            r.to_json_string_compact()
        ))),
    }
}
