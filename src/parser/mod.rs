//! Parser module for JSLT sources
//!
//! This module contains the lexer and the recursive-descent parser that
//! turns a source unit into an unresolved `Program`.

pub mod types;
pub mod lexer;
pub mod parser;

// Re-exports
pub use types::{CallResolver, Callee, NoCalls, MAX_PARSER_DEPTH};
pub use lexer::{tokenize, Lexer, Token, TokenType};
pub use parser::{parse, Parser};
