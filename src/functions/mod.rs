//! Callables
//!
//! A call site resolves to either a `Function`, which receives evaluated
//! arguments, or a `Macro`, which receives the argument expressions and the
//! live evaluation context and decides what to evaluate.

pub mod builtins;
pub mod macros;
pub mod regex_cache;
pub mod registry;

use crate::ast::Expr;
use crate::error::Result;
use crate::interpreter::EvalContext;
use crate::value::Value;

pub use regex_cache::{LruRegexCache, RegexCache};
pub use registry::FunctionRegistry;

/// Name and arity shared by functions and macros. Arity bounds are inclusive.
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;
    fn min_arguments(&self) -> usize;
    fn max_arguments(&self) -> usize;

    fn accepts(&self, count: usize) -> bool {
        count >= self.min_arguments() && count <= self.max_arguments()
    }
}

pub trait Function: Callable {
    fn call(&self, input: &Value, args: &[Value]) -> Result<Value>;

    /// Index of an argument holding a regular expression, if any. Literal
    /// patterns in that position are compiled ahead of time.
    fn regex_argument(&self) -> Option<usize> {
        None
    }

    /// True if `f(x, array)` is plain membership of `x` in `array`, so a call
    /// against a literal array can become a hashed lookup.
    fn membership_test(&self) -> bool {
        false
    }
}

pub trait Macro: Callable {
    fn call(&self, ctx: &mut EvalContext<'_>, input: &Value, args: &[Expr]) -> Result<Value>;
}

/// Human-readable arity for error messages.
pub fn describe_arity(callable: &dyn Callable) -> String {
    let (min, max) = (callable.min_arguments(), callable.max_arguments());
    if min == max {
        format!("{}", min)
    } else if max == usize::MAX {
        format!("at least {}", min)
    } else {
        format!("{} to {}", min, max)
    }
}
