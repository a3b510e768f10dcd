//! Function and macro registry
//!
//! Built-ins are installed into an explicitly constructed registry that the
//! compiler owns; extension functions registered afterwards replace built-ins
//! of the same name.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtins;
use super::macros;
use super::regex_cache::{LruRegexCache, RegexCache};
use super::{Function, Macro};

#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    macros: HashMap<String, Arc<dyn Macro>>,
    regexes: Arc<dyn RegexCache>,
}

impl FunctionRegistry {
    /// An empty registry. Regex-taking functions registered later share
    /// `regexes`.
    pub fn new(regexes: Arc<dyn RegexCache>) -> Self {
        Self { functions: HashMap::new(), macros: HashMap::new(), regexes }
    }

    /// A registry holding every built-in function and macro.
    pub fn with_builtins(regexes: Arc<dyn RegexCache>) -> Self {
        let mut registry = Self::new(regexes);
        builtins::register_all(&mut registry);
        macros::register_all(&mut registry);
        registry
    }

    pub fn register_function(&mut self, function: Arc<dyn Function>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn register_macro(&mut self, mac: Arc<dyn Macro>) {
        self.macros.insert(mac.name().to_string(), mac);
    }

    pub fn function(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    pub fn macro_named(&self, name: &str) -> Option<&Arc<dyn Macro>> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.macros.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .functions
            .keys()
            .chain(self.macros.keys())
            .map(|s| s.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn regex_cache(&self) -> &Arc<dyn RegexCache> {
        &self.regexes
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins(Arc::new(LruRegexCache::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::functions::Callable;
    use crate::value::Value;

    struct Shout;

    impl Callable for Shout {
        fn name(&self) -> &str {
            "uppercase"
        }
        fn min_arguments(&self) -> usize {
            1
        }
        fn max_arguments(&self) -> usize {
            1
        }
    }

    impl Function for Shout {
        fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
            Ok(Value::String(format!("{}!", args[0].to_text().to_uppercase())))
        }
    }

    #[test]
    fn test_default_has_builtins() {
        let registry = FunctionRegistry::default();
        assert!(registry.function("size").is_some());
        assert!(registry.macro_named("fallback").is_some());
        assert!(registry.function("fallback").is_none());
        assert!(registry.contains("contains"));
        assert!(!registry.contains("no-such-function"));
    }

    #[test]
    fn test_extension_replaces_builtin() {
        let mut registry = FunctionRegistry::default();
        registry.register_function(Arc::new(Shout));
        let f = registry.function("uppercase").unwrap();
        let out = f.call(&Value::Null, &[Value::from("hi")]).unwrap();
        assert_eq!(out, Value::from("HI!"));
    }

    #[test]
    fn test_names_sorted() {
        let registry = FunctionRegistry::default();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"fallback"));
    }
}
