use regex_lite::NoExpand;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{expect_array, expect_integer, expect_str, fallback_or, BuiltinContext, BuiltinSpec};
use crate::error::{JsltError, Result};
use crate::value::{Map, Value};

pub(super) const FUNCTIONS: &[BuiltinSpec] = &[
    BuiltinSpec::new("is-string", 1, 1, is_string),
    BuiltinSpec::new("string", 1, 1, string),
    BuiltinSpec::new("test", 2, 2, test).with_regex(1),
    BuiltinSpec::new("capture", 2, 2, capture).with_regex(1),
    BuiltinSpec::new("split", 2, 2, split).with_regex(1),
    BuiltinSpec::new("join", 2, 2, join),
    BuiltinSpec::new("lowercase", 1, 1, lowercase),
    BuiltinSpec::new("uppercase", 1, 1, uppercase),
    BuiltinSpec::new("sha256-hex", 1, 1, sha256_hex),
    BuiltinSpec::new("starts-with", 2, 2, starts_with),
    BuiltinSpec::new("ends-with", 2, 2, ends_with),
    BuiltinSpec::new("from-json", 1, 2, from_json),
    BuiltinSpec::new("to-json", 1, 1, to_json),
    BuiltinSpec::new("replace", 3, 3, replace).with_regex(1),
    BuiltinSpec::new("trim", 1, 1, trim),
    BuiltinSpec::new("uuid", 0, 2, uuid),
];

fn is_string(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_string()))
}

fn string(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match &args[0] {
        s @ Value::String(_) => Ok(s.clone()),
        other => Ok(Value::String(other.to_text())),
    }
}

fn test(ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Bool(false));
    }
    let regex = ctx.regexes.get(expect_str("test", &args[1])?)?;
    Ok(Value::Bool(regex.is_match(&args[0].to_text())))
}

fn capture(ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let regex = ctx.regexes.get(expect_str("capture", &args[1])?)?;
    let text = args[0].to_text();

    let mut groups = Map::new();
    if let Some(caps) = regex.captures(&text) {
        for name in regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                groups.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }
    }
    Ok(Value::Object(groups))
}

fn split(ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let text = expect_str("split", &args[0])?;
    let regex = ctx.regexes.get(expect_str("split", &args[1])?)?;
    let first = match regex.find(text) {
        Some(m) => m,
        None => return Ok(Value::Array(vec![Value::String(text.to_string())])),
    };
    let mut parts: Vec<&str> = regex.split(text).collect();
    // a zero-width match at the start yields no leading empty part
    if first.start() == 0 && first.end() == 0 && parts.first() == Some(&"") {
        parts.remove(0);
    }
    while parts.last() == Some(&"") {
        parts.pop();
    }
    Ok(Value::Array(parts.into_iter().map(|part| Value::String(part.to_string())).collect()))
}

fn join(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = expect_array("join", &args[0])?;
    let separator = expect_str("join", &args[1])?;
    let parts: Vec<String> = items.iter().map(Value::to_text).collect();
    Ok(Value::String(parts.join(separator)))
}

fn lowercase(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::String(args[0].to_text().to_lowercase()))
}

fn uppercase(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::String(args[0].to_text().to_uppercase()))
}

fn sha256_hex(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let digest = Sha256::digest(args[0].to_text().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(Value::String(hex))
}

fn starts_with(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(args[0].to_text().starts_with(args[1].to_text().as_str())))
}

fn ends_with(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(args[0].to_text().ends_with(args[1].to_text().as_str())))
}

fn from_json(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let text = expect_str("from-json", &args[0])?;
    match Value::from_json_str(text) {
        Ok(value) => Ok(value),
        Err(e) => fallback_or(
            args,
            1,
            JsltError::runtime(format!("from-json can't parse {}: {}", text, e)),
        ),
    }
}

fn to_json(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    Ok(Value::String(args[0].to_json_string_compact()))
}

fn replace(ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let text = expect_str("replace", &args[0])?;
    let regex = ctx.regexes.get(expect_str("replace", &args[1])?)?;
    let replacement = expect_str("replace", &args[2])?;
    if regex.is_match("") {
        return Err(JsltError::runtime(format!(
            "Regexp '{}' in replace() matches the empty string",
            regex.as_str()
        )));
    }
    Ok(Value::String(regex.replace_all(text, NoExpand(replacement)).into_owned()))
}

fn trim(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::String(args[0].to_text().trim().to_string()))
}

fn uuid(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    match args {
        [] => Ok(Value::String(Uuid::new_v4().to_string())),
        [Value::Null, Value::Null] => Ok(Value::String(Uuid::nil().to_string())),
        [high, low] => {
            let high = expect_integer("uuid", high)? as u64;
            let low = expect_integer("uuid", low)? as u64;
            Ok(Value::String(Uuid::from_u64_pair(high, low).to_string()))
        }
        _ => Err(JsltError::runtime("uuid() takes either 0 or 2 arguments")),
    }
}
