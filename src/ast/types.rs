//! Expression tree types
//!
//! Every node owns its children. The parser leaves variable slots, forward
//! function references and matcher contexts empty; the compiler passes fill
//! them in, after which the tree is only ever read.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::Location;
use crate::functions::{Function, Macro};
use crate::value::Value;

// =============================================================================
// SLOTS
// =============================================================================

/// Storage location of a variable: a frame tag in the top bit and a dense
/// offset into that frame below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    const LOCAL_TAG: u32 = 1 << 31;

    pub fn global(offset: usize) -> Self {
        Slot(offset as u32)
    }

    pub fn local(offset: usize) -> Self {
        Slot(offset as u32 | Self::LOCAL_TAG)
    }

    /// True when the slot lives in the current function call's frame.
    pub fn is_local(self) -> bool {
        self.0 & Self::LOCAL_TAG != 0
    }

    pub fn offset(self) -> usize {
        (self.0 & !Self::LOCAL_TAG) as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = if self.is_local() { "local" } else { "global" };
        write!(f, "{}#{}", frame, self.offset())
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    /// `.`
    Dot,
    /// `.key`, `base.key`
    DotKey {
        base: Option<Box<Expr>>,
        key: String,
    },
    /// `.[index]`, `base[index]`
    Index {
        base: Option<Box<Expr>>,
        index: Box<Expr>,
    },
    /// `.[start : end]`, `base[start : end]`
    Slice {
        base: Option<Box<Expr>>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Variable {
        name: String,
        slot: Option<Slot>,
    },
    FunctionCall {
        name: String,
        target: FunctionTarget,
        args: Vec<Expr>,
    },
    MacroCall {
        name: String,
        target: MacroRef,
        args: Vec<Expr>,
    },
    /// `contains(needle, [...])` against a large literal array, pre-hashed.
    StaticContains {
        needle: Box<Expr>,
        set: LiteralSet,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `[for (seq) lets body if (filter)]`
    For {
        seq: Box<Expr>,
        lets: Vec<LetBinding>,
        body: Box<Expr>,
        filter: Option<Box<Expr>>,
    },
    /// `{for (seq) lets key : value if (filter)}`
    ObjectFor {
        seq: Box<Expr>,
        lets: Vec<LetBinding>,
        key: Box<Expr>,
        value: Box<Expr>,
        filter: Option<Box<Expr>>,
    },
    Object(ObjectTemplate),
    Array(Vec<Expr>),
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn literal(value: Value, location: Location) -> Self {
        Self { kind: ExprKind::Literal(value), location }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Direct subexpressions, let values included, in evaluation order.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out: Vec<&mut Expr> = Vec::new();
        match &mut self.kind {
            ExprKind::Literal(_) | ExprKind::Dot | ExprKind::Variable { .. } => {}
            ExprKind::DotKey { base, .. } => out.extend(base.as_deref_mut()),
            ExprKind::Index { base, index } => {
                out.extend(base.as_deref_mut());
                out.push(index.as_mut());
            }
            ExprKind::Slice { base, start, end } => {
                out.extend(base.as_deref_mut());
                out.extend(start.as_deref_mut());
                out.extend(end.as_deref_mut());
            }
            ExprKind::FunctionCall { args, .. }
            | ExprKind::MacroCall { args, .. }
            | ExprKind::Array(args) => out.extend(args.iter_mut()),
            ExprKind::StaticContains { needle, .. } => out.push(needle.as_mut()),
            ExprKind::Binary { left, right, .. } | ExprKind::Pipe { left, right } => {
                out.push(left.as_mut());
                out.push(right.as_mut());
            }
            ExprKind::If { cond, then, otherwise } => {
                out.push(cond.as_mut());
                out.push(then.as_mut());
                out.extend(otherwise.as_deref_mut());
            }
            ExprKind::For { seq, lets, body, filter } => {
                out.push(seq.as_mut());
                out.extend(lets.iter_mut().map(|l| &mut l.value));
                out.extend(filter.as_deref_mut());
                out.push(body.as_mut());
            }
            ExprKind::ObjectFor { seq, lets, key, value, filter } => {
                out.push(seq.as_mut());
                out.extend(lets.iter_mut().map(|l| &mut l.value));
                out.extend(filter.as_deref_mut());
                out.push(value.as_mut());
                out.push(key.as_mut());
            }
            ExprKind::Object(template) => {
                out.extend(template.lets.iter_mut().map(|l| &mut l.value));
                for entry in &mut template.entries {
                    if let ObjectKey::Dynamic(key) = &mut entry.key {
                        out.push(key);
                    }
                    out.push(&mut entry.value);
                }
                if let Some(matcher) = &mut template.matcher {
                    out.push(matcher.value.as_mut());
                }
            }
            ExprKind::Let { bindings, body } => {
                out.extend(bindings.iter_mut().map(|l| &mut l.value));
                out.push(body.as_mut());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: String,
    pub slot: Option<Slot>,
    pub value: Expr,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// `and`/`or` decide for themselves whether the right side is evaluated.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

// =============================================================================
// OBJECT TEMPLATES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTemplate {
    pub lets: Vec<LetBinding>,
    pub entries: Vec<ObjectEntry>,
    pub matcher: Option<Matcher>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub value: Expr,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Static(String),
    Dynamic(Expr),
}

/// `* - excluded : value`
#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub exclusions: Vec<String>,
    pub value: Box<Expr>,
    /// Keys leading from the template's input to the object whose remaining
    /// keys get copied. Filled in by the resolver.
    pub context: Option<Vec<String>>,
    pub location: Location,
}

// =============================================================================
// CALLS
// =============================================================================

#[derive(Clone)]
pub enum FunctionTarget {
    /// A forward reference to a function declared later in the same unit.
    Unresolved,
    /// Index into the unit's function declarations.
    Declared(usize),
    Callable(Arc<dyn Function>),
}

impl fmt::Debug for FunctionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionTarget::Unresolved => write!(f, "Unresolved"),
            FunctionTarget::Declared(index) => write!(f, "Declared({})", index),
            FunctionTarget::Callable(func) => write!(f, "Callable({})", func.name()),
        }
    }
}

impl PartialEq for FunctionTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FunctionTarget::Unresolved, FunctionTarget::Unresolved) => true,
            (FunctionTarget::Declared(a), FunctionTarget::Declared(b)) => a == b,
            (FunctionTarget::Callable(a), FunctionTarget::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct MacroRef(pub Arc<dyn Macro>);

impl fmt::Debug for MacroRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Macro({})", self.0.name())
    }
}

impl PartialEq for MacroRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Canonical keys of the elements of a literal array.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralSet {
    keys: HashSet<String>,
}

impl LiteralSet {
    pub fn from_values(values: &[Value]) -> Self {
        Self { keys: values.iter().map(|v| v.canonical_key()).collect() }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.keys.contains(&value.canonical_key())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// DECLARATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub param_slots: Vec<Slot>,
    pub body: Expr,
    /// Size of the per-call frame, known after resolution.
    pub frame_size: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub prefix: String,
    pub location: Location,
}

/// One compiled source unit: the main expression or an imported module.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub source: Option<Arc<str>>,
    pub lets: Vec<LetBinding>,
    pub functions: Vec<FunctionDecl>,
    /// Absent for modules that only declare functions.
    pub body: Option<Expr>,
    pub global_frame_size: usize,
    /// Variables not bound anywhere in the source, in first-use order.
    pub parameters: Vec<(String, Slot)>,
}
