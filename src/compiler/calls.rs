//! Call-name resolution
//!
//! Built-ins, extensions and imported module functions are known before a
//! unit is parsed and are bound by the parser through `CallTable`. Calls to
//! functions declared later in the same unit stay unresolved until the whole
//! unit has been read; `link_forward_calls` binds them afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use super::module::Module;
use crate::ast::{Expr, ExprKind, FunctionTarget, Program};
use crate::error::{JsltError, Location, Result};
use crate::functions::FunctionRegistry;
use crate::parser::{CallResolver, Callee};

pub struct CallTable {
    registry: Arc<FunctionRegistry>,
    modules: HashMap<String, Arc<dyn Module>>,
}

impl CallTable {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry, modules: HashMap::new() }
    }

    pub fn add_module(
        &mut self,
        prefix: &str,
        module: Arc<dyn Module>,
        location: &Location,
    ) -> Result<()> {
        if self.modules.contains_key(prefix) {
            return Err(JsltError::compile(
                format!("Prefix '{}' is already used by another import", prefix),
                Some(location.clone()),
            ));
        }
        self.modules.insert(prefix.to_string(), module);
        Ok(())
    }
}

impl CallResolver for CallTable {
    fn resolve(&self, name: &str) -> Option<Callee> {
        if let Some((prefix, function)) = name.split_once(':') {
            return self.modules.get(prefix)?.function(function).map(Callee::Function);
        }
        if let Some(function) = self.registry.function(name) {
            return Some(Callee::Function(function.clone()));
        }
        if let Some(mac) = self.registry.macro_named(name) {
            return Some(Callee::Macro(mac.clone()));
        }
        // `prefix(x)` runs an imported module's body
        self.modules.get(name)?.body().map(Callee::Function)
    }
}

/// Binds every call the parser left unresolved to a function declared in
/// the unit, checking arity.
pub fn link_forward_calls(program: &mut Program) -> Result<()> {
    let declared: HashMap<String, (usize, usize)> = program
        .functions
        .iter()
        .enumerate()
        .map(|(index, f)| (f.name.clone(), (index, f.params.len())))
        .collect();

    for binding in &mut program.lets {
        link(&mut binding.value, &declared)?;
    }
    for function in &mut program.functions {
        link(&mut function.body, &declared)?;
    }
    if let Some(body) = &mut program.body {
        link(body, &declared)?;
    }
    Ok(())
}

fn link(expr: &mut Expr, declared: &HashMap<String, (usize, usize)>) -> Result<()> {
    let location = &expr.location;
    if let ExprKind::FunctionCall { name, target, args } = &mut expr.kind {
        if matches!(target, FunctionTarget::Unresolved) {
            *target = match declared.get(name.as_str()) {
                Some(&(index, count)) if count == args.len() => FunctionTarget::Declared(index),
                Some(&(_, count)) => {
                    return Err(JsltError::compile(
                        format!("Function '{}' takes {} arguments, got {}", name, count, args.len()),
                        Some(location.clone()),
                    ))
                }
                None => {
                    return Err(JsltError::compile(
                        format!("No such function: '{}'", name),
                        Some(location.clone()),
                    ))
                }
            };
        }
    }
    for child in expr.children_mut() {
        link(child, declared)?;
    }
    Ok(())
}
