//! Parser Types and Constants

use std::sync::Arc;

use crate::functions::{Function, Macro};

pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

/// What a call name refers to when it is known before the unit is parsed:
/// built-ins, extensions and imported module functions.
#[derive(Clone)]
pub enum Callee {
    Function(Arc<dyn Function>),
    Macro(Arc<dyn Macro>),
}

/// Lookup of names that are callable before any local `def` is seen.
pub trait CallResolver {
    fn resolve(&self, name: &str) -> Option<Callee>;
}

/// Resolves nothing; every call stays a reference to a local function.
pub struct NoCalls;

impl CallResolver for NoCalls {
    fn resolve(&self, _name: &str) -> Option<Callee> {
        None
    }
}
