//! Compiled expressions
//!
//! An `Expression` is immutable once built and may be applied from many
//! threads at once; every application gets its own `Scope`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::Program;
use crate::error::Result;
use crate::interpreter::{evaluate_program, EvalContext, ObjectFilter};
use crate::value::Value;

pub struct Expression {
    program: Program,
    filter: Arc<dyn ObjectFilter>,
    max_call_depth: usize,
}

impl Expression {
    pub(crate) fn new(program: Program, filter: Arc<dyn ObjectFilter>, max_call_depth: usize) -> Self {
        Self { program, filter, max_call_depth }
    }

    pub fn apply(&self, input: &Value) -> Result<Value> {
        self.apply_with(&HashMap::new(), input)
    }

    /// Applies the expression with values for variables the source uses but
    /// never binds. Unknown names are ignored; missing ones are null.
    pub fn apply_with(&self, variables: &HashMap<String, Value>, input: &Value) -> Result<Value> {
        let mut ctx = EvalContext::new(&self.program, self.filter.as_ref())
            .with_max_call_depth(self.max_call_depth);
        for (name, slot) in &self.program.parameters {
            if let Some(value) = variables.get(name) {
                ctx.scope.set(*slot, value.clone())?;
            }
        }
        evaluate_program(&mut ctx, input, &self.program)
    }

    pub fn apply_json(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(self.apply(&Value::from_serde_json(input.clone()))?.to_serde_json())
    }

    /// Names of the variables `apply_with` can supply, in first-use order.
    pub fn parameters(&self) -> Vec<&str> {
        self.program.parameters.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// An expression used as an object filter keeps the values it maps to
/// something true.
impl ObjectFilter for Expression {
    fn keep(&self, value: &Value) -> Result<bool> {
        Ok(self.apply(value)?.is_true())
    }
}
