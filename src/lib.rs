//! jslt - A JSON query and transformation language
//!
//! Source text is parsed, statically resolved, optimized and compiled into
//! an `Expression` that maps JSON input to JSON output.
//!
//! ```no_run
//! use jslt::{Compiler, Value};
//!
//! let expr = Compiler::new().compile("{\"name\": .user.name, * : .}").unwrap();
//! let out = expr.apply(&Value::from_json_str(r#"{"user": {"name": "ada"}}"#).unwrap()).unwrap();
//! println!("{}", out);
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod parser;
pub mod value;

pub use compiler::{
    Compiler, Expression, FileResolver, FunctionModule, MapResolver, Module, ResourceResolver,
};
pub use error::{JsltError, Location, Result};
pub use functions::{Callable, Function, FunctionRegistry, Macro, RegexCache};
pub use interpreter::{DefaultObjectFilter, KeepAll, ObjectFilter};
pub use value::{Map, Value};
