//! Time functions. Timestamps are seconds since the Unix epoch; patterns use
//! the Java `SimpleDateFormat` letters and are translated to chrono strftime.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use super::{expect_number, expect_str, fallback_or, BuiltinContext, BuiltinSpec};
use crate::error::{JsltError, Result};
use crate::value::Value;

pub(super) const FUNCTIONS: &[BuiltinSpec] = &[
    BuiltinSpec::new("now", 0, 0, now),
    BuiltinSpec::new("parse-time", 2, 3, parse_time),
    BuiltinSpec::new("format-time", 2, 3, format_time),
];

fn now(_ctx: &BuiltinContext<'_>, _args: &[Value]) -> Result<Value> {
    Ok(Value::Decimal(Utc::now().timestamp_millis() as f64 / 1000.0))
}

fn parse_time(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let pattern = expect_str("parse-time", &args[1])?;
    let text = match args[0].as_str() {
        Some(text) => text,
        None => {
            return fallback_or(
                args,
                2,
                JsltError::runtime(format!(
                    "parse-time() can't parse {}",
                    args[0].to_json_string_compact()
                )),
            )
        }
    };

    match parse_with_pattern(text, pattern) {
        Ok(millis) => Ok(seconds_value(millis)),
        Err(e) if e.message().starts_with("Unsupported") => Err(e),
        Err(e) => fallback_or(args, 2, e),
    }
}

fn parse_with_pattern(text: &str, pattern: &str) -> Result<i64> {
    let format = translate(pattern, Mode::Parse)?;
    let failed = |e: chrono::ParseError| {
        JsltError::runtime(format!(
            "parse-time() can't parse '{}' with '{}': {}",
            text, pattern, e
        ))
    };

    if has_zone(pattern) {
        let normalized = match text.strip_suffix('Z') {
            Some(rest) => format!("{}+00:00", rest),
            None => text.to_string(),
        };
        let parsed = DateTime::parse_from_str(&normalized, &format).map_err(failed)?;
        return Ok(parsed.timestamp_millis());
    }

    match NaiveDateTime::parse_from_str(text, &format) {
        Ok(naive) => Ok(Utc.from_utc_datetime(&naive).timestamp_millis()),
        Err(e) => {
            // date-only patterns have no time fields for NaiveDateTime
            let date = NaiveDate::parse_from_str(text, &format).map_err(|_| failed(e))?;
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
                JsltError::runtime(format!("parse-time() can't parse '{}'", text))
            })?;
            Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
        }
    }
}

fn seconds_value(millis: i64) -> Value {
    if millis % 1000 == 0 {
        Value::Integer(millis / 1000)
    } else {
        Value::Decimal(millis as f64 / 1000.0)
    }
}

fn format_time(_ctx: &BuiltinContext<'_>, args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let seconds = expect_number("format-time", &args[0])?;
    let pattern = expect_str("format-time", &args[1])?;
    let offset = match args.get(2) {
        Some(zone) => parse_zone(expect_str("format-time", zone)?)?,
        None => utc_offset(),
    };

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    let utc = DateTime::<Utc>::from_timestamp(whole as i64, nanos).ok_or_else(|| {
        JsltError::runtime(format!("format-time() timestamp {} is out of range", seconds))
    })?;
    let local = utc.with_timezone(&offset);

    let mode = if offset.local_minus_utc() == 0 { Mode::FormatUtc } else { Mode::Format };
    let format = translate(pattern, mode)?;
    if StrftimeItems::new(&format).any(|item| item == Item::Error) {
        return Err(JsltError::runtime(format!("Invalid time pattern '{}'", pattern)));
    }
    let mut out = String::new();
    write!(out, "{}", local.format(&format))
        .map_err(|_| JsltError::runtime(format!("Couldn't format time with '{}'", pattern)))?;
    Ok(Value::String(out))
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// `UTC`, `GMT`, `Z` or a fixed offset such as `+02:00`, `-0530`.
fn parse_zone(zone: &str) -> Result<FixedOffset> {
    let unknown = || JsltError::runtime(format!("Unknown timezone '{}'", zone));
    let rest = match zone {
        "UTC" | "GMT" | "Z" => return Ok(utc_offset()),
        _ => zone.strip_prefix("UTC").or_else(|| zone.strip_prefix("GMT")).unwrap_or(zone),
    };
    let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
        (1, digits)
    } else if let Some(digits) = rest.strip_prefix('-') {
        (-1, digits)
    } else {
        return Err(unknown());
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(unknown());
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().map_err(|_| unknown())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| unknown())?,
            digits[2..].parse::<i32>().map_err(|_| unknown())?,
        ),
        _ => return Err(unknown()),
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(unknown)
}

// ---------------------------------------------------------------------------
// Pattern translation
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Parse,
    Format,
    /// Formatting in UTC, where ISO zone letters print as `Z`.
    FormatUtc,
}

fn has_zone(pattern: &str) -> bool {
    let mut quoted = false;
    for c in pattern.chars() {
        match c {
            '\'' => quoted = !quoted,
            'X' | 'Z' | 'x' if !quoted => return true,
            _ => {}
        }
    }
    false
}

fn translate(pattern: &str, mode: Mode) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' is a literal quote, otherwise text up to the next quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == c {
            i += 1;
        }
        let run = i - start;

        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('D', _) => "%j",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('a', _) => "%p",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', 4..=6) => "%6f",
            ('S', _) => "%9f",
            ('X' | 'x', _) if mode == Mode::FormatUtc => "Z",
            ('X' | 'x', _) if mode == Mode::Parse => "%#z",
            ('X' | 'x', 3) => "%:z",
            ('X' | 'x', _) => "%z",
            ('Z', _) => "%z",
            ('z', _) => "%Z",
            _ => {
                return Err(JsltError::runtime(format!(
                    "Unsupported time pattern letter '{}' in '{}'",
                    c, pattern
                )))
            }
        };
        out.push_str(spec);
    }
    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
