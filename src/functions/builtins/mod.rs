//! Built-in functions
//!
//! Each submodule exposes a table of `BuiltinSpec`s; `register_all` turns them
//! into `Builtin` callables bound to the registry's regex cache.

mod collections;
mod general;
mod numeric;
mod strings;
mod time;

use std::sync::Arc;

use super::regex_cache::RegexCache;
use super::registry::FunctionRegistry;
use super::{Callable, Function};
use crate::error::{JsltError, Result};
use crate::value::Value;

/// What a built-in sees besides its arguments.
pub struct BuiltinContext<'a> {
    pub input: &'a Value,
    pub regexes: &'a dyn RegexCache,
}

pub type BuiltinFn = fn(&BuiltinContext<'_>, &[Value]) -> Result<Value>;

#[derive(Clone, Copy)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub min: usize,
    pub max: usize,
    pub imp: BuiltinFn,
    pub regex_arg: Option<usize>,
}

impl BuiltinSpec {
    const fn new(name: &'static str, min: usize, max: usize, imp: BuiltinFn) -> Self {
        Self { name, min, max, imp, regex_arg: None }
    }

    const fn with_regex(mut self, arg: usize) -> Self {
        self.regex_arg = Some(arg);
        self
    }
}

pub struct Builtin {
    spec: BuiltinSpec,
    regexes: Arc<dyn RegexCache>,
}

impl Builtin {
    pub fn new(spec: BuiltinSpec, regexes: Arc<dyn RegexCache>) -> Self {
        Self { spec, regexes }
    }
}

impl Callable for Builtin {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn min_arguments(&self) -> usize {
        self.spec.min
    }

    fn max_arguments(&self) -> usize {
        self.spec.max
    }
}

impl Function for Builtin {
    fn call(&self, input: &Value, args: &[Value]) -> Result<Value> {
        let ctx = BuiltinContext { input, regexes: self.regexes.as_ref() };
        (self.spec.imp)(&ctx, args)
    }

    fn regex_argument(&self) -> Option<usize> {
        self.spec.regex_arg
    }

    fn membership_test(&self) -> bool {
        self.spec.name == "contains"
    }
}

pub fn register_all(registry: &mut FunctionRegistry) {
    let regexes = registry.regex_cache().clone();
    let tables: [&[BuiltinSpec]; 5] = [
        general::FUNCTIONS,
        numeric::FUNCTIONS,
        strings::FUNCTIONS,
        collections::FUNCTIONS,
        time::FUNCTIONS,
    ];
    for table in tables {
        for spec in table {
            registry.register_function(Arc::new(Builtin::new(*spec, regexes.clone())));
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers shared by the tables
// ---------------------------------------------------------------------------

fn type_error(function: &str, expected: &str, got: &Value) -> JsltError {
    JsltError::runtime(format!(
        "{}() expects {}, but got {}: {}",
        function,
        expected,
        got.type_name(),
        got.to_json_string_compact()
    ))
}

fn expect_str<'v>(function: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| type_error(function, "a string", value))
}

fn expect_array<'v>(function: &str, value: &'v Value) -> Result<&'v Vec<Value>> {
    value.as_array().ok_or_else(|| type_error(function, "an array", value))
}

fn expect_integer(function: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| type_error(function, "an integer", value))
}

fn expect_number(function: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_error(function, "a number", value))
}

/// The optional trailing fallback argument, or the error if there is none.
fn fallback_or(args: &[Value], fallback_index: usize, err: JsltError) -> Result<Value> {
    match args.get(fallback_index) {
        Some(fallback) => Ok(fallback.clone()),
        None => Err(err),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::functions::regex_cache::LruRegexCache;

    /// Call a built-in by name with the given arguments and a null input.
    pub fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        let registry = FunctionRegistry::with_builtins(Arc::new(LruRegexCache::default()));
        let f = registry
            .function(name)
            .unwrap_or_else(|| panic!("no built-in named {}", name))
            .clone();
        assert!(f.accepts(args.len()), "bad arity for {}", name);
        f.call(&Value::Null, &args)
    }

    pub fn json(text: &str) -> Value {
        Value::from_json_str(text).unwrap()
    }
}
