//! The reference query language: a JMESPath dialect with extension functions.

pub mod ast;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use serde_json::Value;

use crate::EvalError;

pub use ast::Ast;
pub use parser::parse;

/// Parse and evaluate `expression` against `data`.
///
/// # Errors
/// Syntax errors and function errors; a path that does not exist is `null`,
/// not an error.
pub fn search(expression: &str, data: &Value) -> Result<Value, EvalError> {
    let ast = parse(expression)?;
    interpreter::interpret(data, &ast)
}
