//! Abstract Syntax Tree (AST) Types
//!
//! Architecture:
//!   Source → Lexer → Parser → AST → Call binding → Resolver → Optimizer → Evaluator

pub mod types;

pub use types::*;
