//! Built-in macros

use std::sync::Arc;

use super::registry::FunctionRegistry;
use super::{Callable, Macro};
use crate::ast::Expr;
use crate::error::Result;
use crate::interpreter::{evaluate, EvalContext};
use crate::value::Value;

pub fn register_all(registry: &mut FunctionRegistry) {
    registry.register_macro(Arc::new(Fallback));
}

/// `fallback(a, b, ...)`: the first argument that is valuable (not null, `{}`
/// or `[]`), evaluating no further; null if none is.
pub struct Fallback;

impl Callable for Fallback {
    fn name(&self) -> &str {
        "fallback"
    }

    fn min_arguments(&self) -> usize {
        2
    }

    fn max_arguments(&self) -> usize {
        1024
    }
}

impl Macro for Fallback {
    fn call(&self, ctx: &mut EvalContext<'_>, input: &Value, args: &[Expr]) -> Result<Value> {
        for arg in args {
            let value = evaluate(ctx, input, arg)?;
            if value.is_valuable() {
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }
}
