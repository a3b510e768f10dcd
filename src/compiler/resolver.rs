//! Variable slot assignment
//!
//! One depth-first walk over a unit. Every `let` and function parameter gets
//! a slot in either the global frame or the enclosing function's frame;
//! variables bound nowhere become external parameters in the global frame.
//! The same walk fixes each object matcher's context path and rejects
//! matchers placed where no context exists.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::error::{JsltError, Location, Result};

/// Where a matcher found under the current node copies its keys from.
#[derive(Debug, Clone)]
enum MatchRoot {
    /// Keys leading from the nearest input to the enclosing template.
    Path(Vec<String>),
    /// No matcher allowed; names the construct for the error.
    Forbidden(&'static str),
}

impl MatchRoot {
    fn top() -> Self {
        MatchRoot::Path(Vec::new())
    }

    fn child(&self, key: &str) -> Self {
        match self {
            MatchRoot::Path(path) => {
                let mut path = path.clone();
                path.push(key.to_string());
                MatchRoot::Path(path)
            }
            forbidden => forbidden.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Resolver {
    scopes: Vec<HashMap<String, Slot>>,
    global_size: usize,
    /// Slots used so far in the function being resolved.
    local_size: Option<usize>,
    parameters: Vec<(String, Slot)>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns slots in `program`, sets frame sizes and records external
    /// parameters.
    pub fn resolve(mut self, program: &mut Program) -> Result<()> {
        self.push_scope();
        self.resolve_lets(&mut program.lets, &MatchRoot::top())?;
        for function in &mut program.functions {
            self.resolve_function(function)?;
        }
        if let Some(body) = &mut program.body {
            self.resolve_expr(body, &MatchRoot::top())?;
        }
        self.pop_scope();

        program.global_frame_size = self.global_size;
        program.parameters = self.parameters;
        Ok(())
    }

    // ---- scopes and slots ----

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn allocate(&mut self) -> Slot {
        match &mut self.local_size {
            Some(size) => {
                *size += 1;
                Slot::local(*size - 1)
            }
            None => self.allocate_global(),
        }
    }

    fn allocate_global(&mut self) -> Slot {
        self.global_size += 1;
        Slot::global(self.global_size - 1)
    }

    fn declare(&mut self, name: &str, location: &Location) -> Result<Slot> {
        let taken = self.scopes.last().map(|s| s.contains_key(name)).unwrap_or(false);
        if taken {
            return Err(JsltError::compile(
                format!("Duplicate variable '{}'", name),
                Some(location.clone()),
            ));
        }
        let slot = self.allocate();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        Ok(slot)
    }

    fn lookup(&mut self, name: &str) -> Slot {
        if let Some(slot) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return *slot;
        }
        if let Some((_, slot)) = self.parameters.iter().find(|(n, _)| n == name) {
            return *slot;
        }
        let slot = self.allocate_global();
        self.parameters.push((name.to_string(), slot));
        slot
    }

    // ---- declarations ----

    /// Each binding is visible to the ones after it, not to itself.
    fn resolve_lets(&mut self, lets: &mut [LetBinding], root: &MatchRoot) -> Result<()> {
        for binding in lets {
            self.resolve_expr(&mut binding.value, root)?;
            binding.slot = Some(self.declare(&binding.name, &binding.location)?);
        }
        Ok(())
    }

    fn resolve_function(&mut self, function: &mut FunctionDecl) -> Result<()> {
        self.local_size = Some(0);
        self.push_scope();
        // parameters take the first slots of the call frame
        let mut slots = Vec::with_capacity(function.params.len());
        for param in &function.params {
            slots.push(self.declare(param, &function.location)?);
        }
        function.param_slots = slots;
        self.resolve_expr(&mut function.body, &MatchRoot::Forbidden("function"))?;
        self.pop_scope();
        function.frame_size = self.local_size.take().unwrap_or(0);
        Ok(())
    }

    // ---- expressions ----

    fn resolve_expr(&mut self, expr: &mut Expr, root: &MatchRoot) -> Result<()> {
        match &mut expr.kind {
            ExprKind::Literal(_) | ExprKind::Dot => Ok(()),

            ExprKind::Variable { name, slot } => {
                *slot = Some(self.lookup(name));
                Ok(())
            }

            ExprKind::DotKey { base, .. } => self.resolve_opt(base.as_deref_mut(), root),

            ExprKind::Index { base, index } => {
                self.resolve_opt(base.as_deref_mut(), root)?;
                self.resolve_expr(index, root)
            }

            ExprKind::Slice { base, start, end } => {
                self.resolve_opt(base.as_deref_mut(), root)?;
                self.resolve_opt(start.as_deref_mut(), root)?;
                self.resolve_opt(end.as_deref_mut(), root)
            }

            ExprKind::FunctionCall { args, .. } | ExprKind::MacroCall { args, .. } => {
                for arg in args {
                    self.resolve_expr(arg, root)?;
                }
                Ok(())
            }

            ExprKind::StaticContains { needle, .. } => self.resolve_expr(needle, root),

            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left, root)?;
                self.resolve_expr(right, root)
            }

            // the right side sees the left side's output as its input
            ExprKind::Pipe { left, right } => {
                self.resolve_expr(left, root)?;
                self.resolve_expr(right, &MatchRoot::top())
            }

            ExprKind::If { cond, then, otherwise } => {
                self.resolve_expr(cond, root)?;
                self.resolve_expr(then, root)?;
                self.resolve_opt(otherwise.as_deref_mut(), root)
            }

            ExprKind::Array(items) => {
                let inside = MatchRoot::Forbidden("array");
                for item in items {
                    self.resolve_expr(item, &inside)?;
                }
                Ok(())
            }

            ExprKind::For { seq, lets, body, filter } => {
                self.resolve_expr(seq, root)?;
                let item = MatchRoot::top();
                self.push_scope();
                self.resolve_lets(lets, &item)?;
                self.resolve_opt(filter.as_deref_mut(), &item)?;
                self.resolve_expr(body, &item)?;
                self.pop_scope();
                Ok(())
            }

            ExprKind::ObjectFor { seq, lets, key, value, filter } => {
                self.resolve_expr(seq, root)?;
                let item = MatchRoot::top();
                self.push_scope();
                self.resolve_lets(lets, &item)?;
                self.resolve_opt(filter.as_deref_mut(), &item)?;
                self.resolve_expr(value, &item)?;
                self.resolve_expr(key, &item)?;
                self.pop_scope();
                Ok(())
            }

            ExprKind::Object(template) => self.resolve_template(template, root),

            ExprKind::Let { bindings, body } => {
                self.push_scope();
                self.resolve_lets(bindings, root)?;
                self.resolve_expr(body, root)?;
                self.pop_scope();
                Ok(())
            }
        }
    }

    fn resolve_opt(&mut self, expr: Option<&mut Expr>, root: &MatchRoot) -> Result<()> {
        match expr {
            Some(expr) => self.resolve_expr(expr, root),
            None => Ok(()),
        }
    }

    fn resolve_template(&mut self, template: &mut ObjectTemplate, root: &MatchRoot) -> Result<()> {
        self.push_scope();
        self.resolve_lets(&mut template.lets, root)?;

        let mut keys = HashSet::new();
        for entry in &mut template.entries {
            match &mut entry.key {
                ObjectKey::Static(key) => {
                    if !keys.insert(key.clone()) {
                        return Err(JsltError::compile(
                            format!("Duplicate key '{}' in object", key),
                            Some(entry.location.clone()),
                        ));
                    }
                    self.resolve_expr(&mut entry.value, &root.child(key))?;
                }
                ObjectKey::Dynamic(key) => {
                    self.resolve_expr(key, root)?;
                    let inside = MatchRoot::Forbidden("entry with a computed key");
                    self.resolve_expr(&mut entry.value, &inside)?;
                }
            }
        }

        if let Some(matcher) = &mut template.matcher {
            match root {
                MatchRoot::Path(path) => matcher.context = Some(path.clone()),
                MatchRoot::Forbidden(inside) => {
                    return Err(JsltError::compile(
                        format!("Object matcher not allowed inside {}", inside),
                        Some(matcher.location.clone()),
                    ))
                }
            }
            // `.` in the matcher's value is the copied value itself
            self.resolve_expr(&mut matcher.value, &MatchRoot::top())?;
        }

        self.pop_scope();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, NoCalls};
    use pretty_assertions::assert_eq;

    fn resolved(input: &str) -> Result<Program> {
        let mut program = parse(input, NoCalls)?;
        crate::compiler::calls::link_forward_calls(&mut program)?;
        Resolver::new().resolve(&mut program)?;
        Ok(program)
    }

    fn variable_slots(expr: &mut Expr, out: &mut Vec<(String, Slot)>) {
        if let ExprKind::Variable { name, slot: Some(slot) } = &expr.kind {
            out.push((name.clone(), *slot));
        }
        for child in expr.children_mut() {
            variable_slots(child, out);
        }
    }

    #[test]
    fn test_top_level_lets_get_global_slots() {
        let program = resolved("let a = 1 let b = 2 $a + $b").unwrap();
        assert_eq!(program.lets[0].slot, Some(Slot::global(0)));
        assert_eq!(program.lets[1].slot, Some(Slot::global(1)));
        assert_eq!(program.global_frame_size, 2);
        assert!(program.parameters.is_empty());
    }

    #[test]
    fn test_unbound_variables_become_parameters() {
        let mut program = resolved("let a = $x $a + $x + $y").unwrap();
        assert_eq!(
            program.parameters,
            vec![("x".to_string(), Slot::global(0)), ("y".to_string(), Slot::global(2))]
        );
        let mut slots = Vec::new();
        variable_slots(program.body.as_mut().unwrap(), &mut slots);
        assert_eq!(
            slots,
            vec![
                ("a".to_string(), Slot::global(1)),
                ("x".to_string(), Slot::global(0)),
                ("y".to_string(), Slot::global(2)),
            ]
        );
    }

    #[test]
    fn test_function_frames_are_local() {
        let program = resolved("let g = 1 def f(a, b) let c = $a $c + $b + $g f(1, 2)").unwrap();
        let f = &program.functions[0];
        assert_eq!(f.param_slots, vec![Slot::local(0), Slot::local(1)]);
        assert_eq!(f.frame_size, 3);
        assert_eq!(program.global_frame_size, 1);
    }

    #[test]
    fn test_shadowing_gets_distinct_slots() {
        let mut program = resolved("let x = 1 [for (.) let x = 2 $x]").unwrap();
        let mut slots = Vec::new();
        variable_slots(program.body.as_mut().unwrap(), &mut slots);
        assert_eq!(slots, vec![("x".to_string(), Slot::global(1))]);
    }

    #[test]
    fn test_duplicate_declarations() {
        let err = resolved("let a = 1 let a = 2 $a").unwrap_err();
        assert_eq!(err.message(), "Duplicate variable 'a'");
        assert!(resolved("def f(x, x) $x f(1, 2)").is_err());
        assert!(resolved("{let v = 1 let v = 2 \"k\": $v}").is_err());
    }

    #[test]
    fn test_static_duplicate_keys() {
        let err = resolved("{\"a\": 1, a: 2}").unwrap_err();
        assert!(err.is_compile_error());
        assert!(err.message().contains("Duplicate key 'a'"));
    }

    #[test]
    fn test_matcher_context_paths() {
        let program = resolved("{\"x\": {\"y\": {* : .}, * : .}, * : .}").unwrap();
        let ExprKind::Object(outer) = &program.body.as_ref().unwrap().kind else { panic!() };
        assert_eq!(outer.matcher.as_ref().unwrap().context, Some(vec![]));
        let ExprKind::Object(x) = &outer.entries[0].value.kind else { panic!() };
        assert_eq!(x.matcher.as_ref().unwrap().context, Some(vec!["x".to_string()]));
        let ExprKind::Object(y) = &x.entries[0].value.kind else { panic!() };
        assert_eq!(
            y.matcher.as_ref().unwrap().context,
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_pipe_resets_matcher_context() {
        let program = resolved("{\"x\": .a | {* : .}}").unwrap();
        let ExprKind::Object(outer) = &program.body.as_ref().unwrap().kind else { panic!() };
        let ExprKind::Pipe { right, .. } = &outer.entries[0].value.kind else { panic!() };
        let ExprKind::Object(inner) = &right.kind else { panic!() };
        assert_eq!(inner.matcher.as_ref().unwrap().context, Some(vec![]));
    }

    #[test]
    fn test_matcher_forbidden_in_arrays_and_functions() {
        let err = resolved("[{* : .}]").unwrap_err();
        assert_eq!(err.message(), "Object matcher not allowed inside array");
        let err = resolved("def f() {* : .} f()").unwrap_err();
        assert_eq!(err.message(), "Object matcher not allowed inside function");
        // comprehensions start a fresh context
        assert!(resolved("[for (.) {* : .}]").is_ok());
    }
}
