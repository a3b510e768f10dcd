//! Error types
//!
//! Parse and compile errors are raised before any input is seen; runtime
//! errors come out of evaluation. All of them carry an optional location.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Where a node came from. The source name is absent for anonymous text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub source: Option<Arc<str>>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(source: Option<Arc<str>>, line: usize, column: usize) -> Self {
        Self { source, line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}:{}", source, self.line, self.column),
            None => write!(f, "<unknown>:{}:{}", self.line, self.column),
        }
    }
}

fn at(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JsltError {
    #[error("Parse error: {}{}", .message, at(.location))]
    Parse {
        message: String,
        location: Option<Location>,
    },

    #[error("Compile error: {}{}", .message, at(.location))]
    Compile {
        message: String,
        location: Option<Location>,
    },

    #[error("Runtime error: {}{}", .message, at(.location))]
    Runtime {
        message: String,
        location: Option<Location>,
    },
}

pub type Result<T> = std::result::Result<T, JsltError>;

impl JsltError {
    pub fn parse(message: impl Into<String>, location: Location) -> Self {
        JsltError::Parse { message: message.into(), location: Some(location) }
    }

    pub fn compile(message: impl Into<String>, location: Option<Location>) -> Self {
        JsltError::Compile { message: message.into(), location }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        JsltError::Runtime { message: message.into(), location: None }
    }

    pub fn runtime_at(message: impl Into<String>, location: &Location) -> Self {
        JsltError::Runtime { message: message.into(), location: Some(location.clone()) }
    }

    pub fn message(&self) -> &str {
        match self {
            JsltError::Parse { message, .. }
            | JsltError::Compile { message, .. }
            | JsltError::Runtime { message, .. } => message,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            JsltError::Parse { location, .. }
            | JsltError::Compile { location, .. }
            | JsltError::Runtime { location, .. } => location.as_ref(),
        }
    }

    /// True for everything raised before evaluation (parse and compile).
    pub fn is_compile_error(&self) -> bool {
        !matches!(self, JsltError::Runtime { .. })
    }

    /// Attach a location if the error does not carry one yet. Errors raised by
    /// functions know nothing about call sites; the evaluator fills it in.
    pub fn or_at(self, loc: &Location) -> Self {
        match self {
            JsltError::Runtime { message, location: None } => {
                JsltError::Runtime { message, location: Some(loc.clone()) }
            }
            JsltError::Compile { message, location: None } => {
                JsltError::Compile { message, location: Some(loc.clone()) }
            }
            other => other,
        }
    }
}
