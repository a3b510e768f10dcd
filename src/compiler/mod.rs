//! Compiler
//!
//! Turns source text into an `Expression`:
//!   parse imports → load modules → parse unit → link forward calls →
//!   assign slots → optimize
//!
//! `Compiler` is the configuration surface: extension functions and
//! macros, import resolution, injected modules, the object filter, the regex
//! cache and whether to optimize.

pub mod calls;
pub mod expression;
pub mod module;
pub mod optimizer;
pub mod resolver;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{ImportDecl, Program};
use crate::error::{JsltError, Result};
use crate::functions::{Function, FunctionRegistry, LruRegexCache, Macro, RegexCache};
use crate::interpreter::{DefaultObjectFilter, ObjectFilter, DEFAULT_MAX_CALL_DEPTH};
use crate::parser::Parser;

pub use calls::CallTable;
pub use expression::Expression;
pub use module::{FileResolver, FunctionModule, MapResolver, Module, ResourceResolver, SourceModule};
pub use optimizer::{Optimizer, OptimizerStats};
pub use resolver::Resolver;

use module::ImportChain;

#[derive(Clone)]
pub struct Compiler {
    functions: Vec<Arc<dyn Function>>,
    macros: Vec<Arc<dyn Macro>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    modules: HashMap<String, Arc<dyn Module>>,
    filter: Arc<dyn ObjectFilter>,
    source_name: Option<Arc<str>>,
    regexes: Arc<dyn RegexCache>,
    optimize: bool,
    max_call_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            macros: Vec::new(),
            resolver: None,
            modules: HashMap::new(),
            filter: Arc::new(DefaultObjectFilter),
            source_name: None,
            regexes: Arc::new(LruRegexCache::default()),
            optimize: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension function; it replaces a built-in of the same
    /// name.
    pub fn with_function(mut self, function: Arc<dyn Function>) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_macro(mut self, mac: Arc<dyn Macro>) -> Self {
        self.macros.push(mac);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Makes `import "name" as p` use `module` instead of resolving source.
    pub fn with_module(mut self, name: impl Into<String>, module: Arc<dyn Module>) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn with_object_filter(mut self, filter: Arc<dyn ObjectFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Name reported in error locations of the main expression.
    pub fn with_source_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_regex_cache(mut self, regexes: Arc<dyn RegexCache>) -> Self {
        self.regexes = regexes;
        self
    }

    /// Deepest chain of user-function calls an application may reach.
    /// Recursion is otherwise bounded only by the thread's stack.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn without_optimization(mut self) -> Self {
        self.optimize = false;
        self
    }

    pub fn compile(&self, text: &str) -> Result<Expression> {
        debug!(source = ?self.source_name, optimize = self.optimize, "compiling expression");
        let registry = Arc::new(self.registry());
        let mut imports = ImportChain::new(self.source_name.as_deref());

        let program = self.compile_unit(text, self.source_name.clone(), &registry, &mut imports)?;
        if program.body.is_none() {
            return Err(JsltError::compile("Expression has no body, only declarations", None));
        }

        debug!(
            globals = program.global_frame_size,
            functions = program.functions.len(),
            parameters = program.parameters.len(),
            "compiled expression"
        );
        Ok(Expression::new(program, self.filter.clone(), self.max_call_depth))
    }

    fn registry(&self) -> FunctionRegistry {
        let mut registry = FunctionRegistry::with_builtins(self.regexes.clone());
        for function in &self.functions {
            registry.register_function(function.clone());
        }
        for mac in &self.macros {
            registry.register_macro(mac.clone());
        }
        registry
    }

    fn compile_unit(
        &self,
        text: &str,
        source: Option<Arc<str>>,
        registry: &Arc<FunctionRegistry>,
        imports: &mut ImportChain,
    ) -> Result<Program> {
        let mut parser = Parser::new(text, source)?;

        let mut calls = CallTable::new(registry.clone());
        for import in parser.parse_imports()? {
            let module = self.load_module(&import, registry, imports)?;
            calls.add_module(&import.prefix, module, &import.location)?;
        }
        parser.set_call_resolver(Box::new(calls));

        let mut program = parser.parse_unit()?;
        calls::link_forward_calls(&mut program)?;
        Resolver::new().resolve(&mut program)?;
        if self.optimize {
            Optimizer::new(self.filter.as_ref(), self.regexes.as_ref()).optimize_program(&mut program)?;
        }
        Ok(program)
    }

    fn load_module(
        &self,
        import: &ImportDecl,
        registry: &Arc<FunctionRegistry>,
        imports: &mut ImportChain,
    ) -> Result<Arc<dyn Module>> {
        if let Some(module) = self.modules.get(&import.path) {
            return Ok(module.clone());
        }
        imports.enter(&import.path).map_err(|e| e.or_at(&import.location))?;
        if let Some(module) = imports.loaded(&import.path) {
            imports.leave();
            return Ok(module);
        }

        debug!(path = %import.path, prefix = %import.prefix, "importing module");
        let result = self.compile_module(import, registry, imports);
        imports.leave();
        let module = result?;
        imports.finish(&import.path, module.clone());
        Ok(module)
    }

    fn compile_module(
        &self,
        import: &ImportDecl,
        registry: &Arc<FunctionRegistry>,
        imports: &mut ImportChain,
    ) -> Result<Arc<dyn Module>> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            JsltError::compile(
                format!("Cannot import '{}': no resource resolver configured", import.path),
                Some(import.location.clone()),
            )
        })?;
        let text = resolver.resolve(&import.path).map_err(|e| e.or_at(&import.location))?;
        let program =
            self.compile_unit(&text, Some(Arc::from(import.path.as_str())), registry, imports)?;
        Ok(Arc::new(SourceModule::new(
            &import.path,
            program,
            self.filter.clone(),
            self.max_call_depth,
        )))
    }
}
