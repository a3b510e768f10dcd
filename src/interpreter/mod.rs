//! Interpreter module
//!
//! Tree-walking evaluation of compiled units: runtime variable frames,
//! operator semantics, object filters and the evaluator itself.

pub mod evaluator;
pub mod filter;
pub mod operations;
pub mod scope;

pub use evaluator::{
    bind_lets, call_declared, evaluate, evaluate_program, EvalContext,
    DEFAULT_MAX_CALL_DEPTH,
};
pub use filter::{DefaultObjectFilter, KeepAll, ObjectFilter};
pub use scope::Scope;
