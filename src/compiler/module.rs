//! Modules and import resolution
//!
//! `import "path" as p` asks a `ResourceResolver` for the source text of
//! `path`, compiles it as its own unit and exposes its functions as `p:name`
//! and, if it has a body, the body as `p(x)`. Callers can also hand the
//! compiler ready-made modules by logical name.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::Program;
use crate::error::{JsltError, Result};
use crate::functions::{Callable, Function};
use crate::interpreter::{bind_lets, call_declared, evaluate_program, EvalContext, ObjectFilter};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Resource resolvers
// ---------------------------------------------------------------------------

/// Maps an import path to module source text.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<String>;
}

/// Loads imports from files below a base directory.
#[derive(Debug, Clone)]
pub struct FileResolver {
    base: PathBuf,
}

impl FileResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl ResourceResolver for FileResolver {
    fn resolve(&self, path: &str) -> Result<String> {
        let full = self.base.join(path);
        fs::read_to_string(&full).map_err(|e| {
            JsltError::compile(format!("Could not load module '{}': {}", full.display(), e), None)
        })
    }
}

/// Serves imports from an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    sources: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.insert(path.into(), text.into());
        self
    }
}

impl ResourceResolver for MapResolver {
    fn resolve(&self, path: &str) -> Result<String> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| JsltError::compile(format!("No module source for '{}'", path), None))
    }
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

pub trait Module: Send + Sync {
    fn function(&self, name: &str) -> Option<Arc<dyn Function>>;

    /// The callable behind `prefix(x)`, for modules with a body.
    fn body(&self) -> Option<Arc<dyn Function>> {
        None
    }
}

/// A module made of caller-supplied functions.
#[derive(Default)]
pub struct FunctionModule {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, function: Arc<dyn Function>) -> Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }
}

impl Module for FunctionModule {
    fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }
}

/// A compiled source unit imported by path.
pub struct SourceModule {
    functions: HashMap<String, Arc<dyn Function>>,
    body: Option<Arc<dyn Function>>,
}

impl SourceModule {
    pub fn new(
        path: &str,
        program: Program,
        filter: Arc<dyn ObjectFilter>,
        max_call_depth: usize,
    ) -> Self {
        let program = Arc::new(program);
        let functions = program
            .functions
            .iter()
            .enumerate()
            .map(|(index, decl)| {
                let function: Arc<dyn Function> = Arc::new(ModuleFunction {
                    program: program.clone(),
                    index,
                    filter: filter.clone(),
                    max_call_depth,
                });
                (decl.name.clone(), function)
            })
            .collect();
        let body = program.body.as_ref().map(|_| {
            let body: Arc<dyn Function> =
                Arc::new(ModuleBody {
                name: path.to_string(),
                program: program.clone(),
                filter,
                max_call_depth,
            });
            body
        });
        Self { functions, body }
    }
}

impl Module for SourceModule {
    fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    fn body(&self) -> Option<Arc<dyn Function>> {
        self.body.clone()
    }
}

/// A `def` of an imported unit. Each call runs in a fresh module scope whose
/// top-level lets are bound against the call's input.
struct ModuleFunction {
    program: Arc<Program>,
    index: usize,
    filter: Arc<dyn ObjectFilter>,
    max_call_depth: usize,
}

impl ModuleFunction {
    fn arity(&self) -> usize {
        self.program.functions.get(self.index).map(|f| f.params.len()).unwrap_or(0)
    }
}

impl Callable for ModuleFunction {
    fn name(&self) -> &str {
        self.program.functions.get(self.index).map(|f| f.name.as_str()).unwrap_or("")
    }

    fn min_arguments(&self) -> usize {
        self.arity()
    }

    fn max_arguments(&self) -> usize {
        self.arity()
    }
}

impl Function for ModuleFunction {
    fn call(&self, input: &Value, args: &[Value]) -> Result<Value> {
        let mut ctx = EvalContext::new(&self.program, self.filter.as_ref())
            .with_max_call_depth(self.max_call_depth);
        bind_lets(&mut ctx, input, &self.program.lets)?;
        call_declared(&mut ctx, input, self.index, args.to_vec())
    }
}

/// An imported unit's body, applied to the single argument.
struct ModuleBody {
    name: String,
    program: Arc<Program>,
    filter: Arc<dyn ObjectFilter>,
    max_call_depth: usize,
}

impl Callable for ModuleBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_arguments(&self) -> usize {
        1
    }

    fn max_arguments(&self) -> usize {
        1
    }
}

impl Function for ModuleBody {
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let null = Value::Null;
        let input = args.first().unwrap_or(&null);
        let mut ctx = EvalContext::new(&self.program, self.filter.as_ref())
            .with_max_call_depth(self.max_call_depth);
        evaluate_program(&mut ctx, input, &self.program)
    }
}

// ---------------------------------------------------------------------------
// Import bookkeeping
// ---------------------------------------------------------------------------

/// Per-compilation import state: the chain of units being compiled, for
/// cycle detection, and every module compiled so far.
#[derive(Default)]
pub struct ImportChain {
    chain: Vec<String>,
    loaded: HashMap<String, Arc<dyn Module>>,
}

impl ImportChain {
    pub fn new(root: Option<&str>) -> Self {
        Self { chain: root.map(|r| vec![r.to_string()]).unwrap_or_default(), loaded: HashMap::new() }
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.chain.iter().any(|p| p == path)
    }

    pub fn loaded(&self, path: &str) -> Option<Arc<dyn Module>> {
        self.loaded.get(path).cloned()
    }

    pub fn enter(&mut self, path: &str) -> Result<()> {
        if self.is_active(path) {
            return Err(JsltError::compile(format!("Module '{}' is already imported", path), None));
        }
        self.chain.push(path.to_string());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.chain.pop();
    }

    pub fn finish(&mut self, path: &str, module: Arc<dyn Module>) {
        self.loaded.insert(path.to_string(), module);
    }
}
