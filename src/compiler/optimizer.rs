//! Tree rewriting after resolution
//!
//! Works bottom-up through exclusive `&mut` access to the tree:
//! - lets bound to literals are substituted into their scope and dropped
//! - operators, paths, arrays and plain object templates over literals are
//!   evaluated once and replaced by the result
//! - `contains(x, [...])` against a large literal array becomes a hashed
//!   lookup
//! - literal regex arguments are compiled up front, so a malformed pattern is
//!   a compile error
//!
//! Running the optimizer on its own output changes nothing.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::*;
use crate::error::{JsltError, Location, Result};
use crate::functions::RegexCache;
use crate::interpreter::{evaluate, EvalContext, ObjectFilter, Scope, DEFAULT_MAX_CALL_DEPTH};
use crate::value::Value;

/// Literal arrays longer than this turn `contains` into a set lookup.
pub const STATIC_CONTAINS_THRESHOLD: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerStats {
    pub folded: usize,
    pub inlined: usize,
    pub static_contains: usize,
    pub regexes: usize,
}

pub struct Optimizer<'a> {
    filter: &'a dyn ObjectFilter,
    regexes: &'a dyn RegexCache,
    stats: OptimizerStats,
}

impl<'a> Optimizer<'a> {
    pub fn new(filter: &'a dyn ObjectFilter, regexes: &'a dyn RegexCache) -> Self {
        Self { filter, regexes, stats: OptimizerStats::default() }
    }

    pub fn stats(&self) -> OptimizerStats {
        self.stats
    }

    pub fn optimize_program(&mut self, program: &mut Program) -> Result<()> {
        let mut inlined = HashMap::new();
        program.lets = self.optimize_lets(std::mem::take(&mut program.lets), &mut inlined)?;
        for function in &mut program.functions {
            self.optimize_scoped(&mut function.body, &inlined)?;
        }
        if let Some(body) = &mut program.body {
            self.optimize_scoped(body, &inlined)?;
        }
        debug!(
            source = ?program.source,
            folded = self.stats.folded,
            inlined = self.stats.inlined,
            static_contains = self.stats.static_contains,
            regexes = self.stats.regexes,
            "optimized unit"
        );
        Ok(())
    }

    /// Optimizes each binding in order; literal ones are recorded in
    /// `inlined` and removed.
    fn optimize_lets(
        &mut self,
        lets: Vec<LetBinding>,
        inlined: &mut HashMap<Slot, Value>,
    ) -> Result<Vec<LetBinding>> {
        let mut kept = Vec::with_capacity(lets.len());
        for mut binding in lets {
            self.optimize_scoped(&mut binding.value, inlined)?;
            match (binding.slot, binding.value.as_literal()) {
                (Some(slot), Some(value)) => {
                    inlined.insert(slot, value.clone());
                    self.stats.inlined += 1;
                }
                _ => kept.push(binding),
            }
        }
        Ok(kept)
    }

    fn optimize_scoped(&mut self, expr: &mut Expr, inlined: &HashMap<Slot, Value>) -> Result<()> {
        substitute(expr, inlined);
        self.optimize(expr)
    }

    pub fn optimize(&mut self, expr: &mut Expr) -> Result<()> {
        match &mut expr.kind {
            ExprKind::Let { bindings, body } => {
                let mut inlined = HashMap::new();
                *bindings = self.optimize_lets(std::mem::take(bindings), &mut inlined)?;
                self.optimize_scoped(body, &inlined)?;
            }

            ExprKind::For { seq, lets, body, filter } => {
                self.optimize(seq)?;
                let mut inlined = HashMap::new();
                *lets = self.optimize_lets(std::mem::take(lets), &mut inlined)?;
                if let Some(filter) = filter {
                    self.optimize_scoped(filter, &inlined)?;
                }
                self.optimize_scoped(body, &inlined)?;
            }

            ExprKind::ObjectFor { seq, lets, key, value, filter } => {
                self.optimize(seq)?;
                let mut inlined = HashMap::new();
                *lets = self.optimize_lets(std::mem::take(lets), &mut inlined)?;
                if let Some(filter) = filter {
                    self.optimize_scoped(filter, &inlined)?;
                }
                self.optimize_scoped(value, &inlined)?;
                self.optimize_scoped(key, &inlined)?;
            }

            ExprKind::Object(template) => {
                let mut inlined = HashMap::new();
                template.lets = self.optimize_lets(std::mem::take(&mut template.lets), &mut inlined)?;
                for entry in &mut template.entries {
                    if let ObjectKey::Dynamic(key) = &mut entry.key {
                        self.optimize_scoped(key, &inlined)?;
                    }
                    self.optimize_scoped(&mut entry.value, &inlined)?;
                }
                if let Some(matcher) = &mut template.matcher {
                    self.optimize_scoped(&mut matcher.value, &inlined)?;
                }
            }

            _ => {
                for child in expr.children_mut() {
                    self.optimize(child)?;
                }
            }
        }

        // a let whose bindings were all inlined is just its body
        if let ExprKind::Let { bindings, body } = &mut expr.kind {
            if bindings.is_empty() {
                let body = std::mem::replace(body.as_mut(), placeholder());
                *expr = body;
            }
        }

        self.specialize_call(expr)?;
        self.fold(expr);
        Ok(())
    }

    fn specialize_call(&mut self, expr: &mut Expr) -> Result<()> {
        let location = expr.location.clone();
        let ExprKind::FunctionCall { target: FunctionTarget::Callable(function), args, .. } =
            &mut expr.kind
        else {
            return Ok(());
        };

        if let Some(index) = function.regex_argument() {
            if let Some(arg) = args.get(index) {
                if let Some(Value::String(pattern)) = arg.as_literal() {
                    self.regexes
                        .get(pattern)
                        .map_err(|e| JsltError::compile(e.message(), Some(arg.location.clone())))?;
                    self.stats.regexes += 1;
                }
            }
        }

        if !function.membership_test() || args.len() != 2 {
            return Ok(());
        }
        let set = match args[1].as_literal() {
            Some(Value::Array(items)) if items.len() > STATIC_CONTAINS_THRESHOLD => {
                LiteralSet::from_values(items)
            }
            _ => return Ok(()),
        };
        let needle = args.swap_remove(0);
        *expr = Expr::new(ExprKind::StaticContains { needle: Box::new(needle), set }, location);
        self.stats.static_contains += 1;
        Ok(())
    }

    fn fold(&mut self, expr: &mut Expr) {
        if let ExprKind::If { cond, then, otherwise } = &mut expr.kind {
            let Some(cond) = cond.as_literal() else { return };
            let chosen = if cond.is_true() {
                std::mem::replace(then.as_mut(), placeholder())
            } else {
                match otherwise {
                    Some(otherwise) => std::mem::replace(otherwise.as_mut(), placeholder()),
                    None => Expr::literal(Value::Null, expr.location.clone()),
                }
            };
            *expr = chosen;
            self.stats.folded += 1;
            return;
        }

        if !is_constant(expr) {
            return;
        }
        let mut ctx = EvalContext {
            scope: Scope::default(),
            functions: &[],
            filter: self.filter,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        };
        // failures stay in the tree and surface at run time
        if let Ok(value) = evaluate(&mut ctx, &Value::Null, expr) {
            *expr = Expr::literal(value, expr.location.clone());
            self.stats.folded += 1;
        }
    }
}

/// True for nodes whose value is fixed once their children are literals.
fn is_constant(expr: &Expr) -> bool {
    let literal = |e: &Option<Box<Expr>>| e.as_ref().map(|e| e.is_literal()).unwrap_or(true);
    match &expr.kind {
        ExprKind::Binary { left, right, .. } => left.is_literal() && right.is_literal(),
        ExprKind::Array(items) => items.iter().all(Expr::is_literal),
        ExprKind::Object(template) => {
            template.lets.is_empty()
                && template.matcher.is_none()
                && template
                    .entries
                    .iter()
                    .all(|e| matches!(e.key, ObjectKey::Static(_)) && e.value.is_literal())
        }
        ExprKind::DotKey { base: Some(base), .. } => base.is_literal(),
        ExprKind::Index { base: Some(base), index } => base.is_literal() && index.is_literal(),
        ExprKind::Slice { base: Some(base), start, end } => {
            base.is_literal() && literal(start) && literal(end)
        }
        ExprKind::StaticContains { needle, .. } => needle.is_literal(),
        _ => false,
    }
}

fn substitute(expr: &mut Expr, inlined: &HashMap<Slot, Value>) {
    if inlined.is_empty() {
        return;
    }
    if let ExprKind::Variable { slot: Some(slot), .. } = &expr.kind {
        if let Some(value) = inlined.get(slot) {
            *expr = Expr::literal(value.clone(), expr.location.clone());
        }
        return;
    }
    for child in expr.children_mut() {
        substitute(child, inlined);
    }
}

fn placeholder() -> Expr {
    Expr::literal(Value::Null, Location::default())
}
