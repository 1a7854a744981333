//! Evaluation error types.

use thiserror::Error;

/// Errors raised while resolving a Fn marker.
///
/// All of these point at a defect in the scenario (a malformed query, a
/// template that does not parse, a function called with the wrong arguments).
/// Call sites decide whether that aborts the surrounding operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    // -- Query language ------------------------------------------------------
    /// The query could not be tokenized or parsed.
    #[error("syntax error in '{expression}' at offset {offset}: {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    /// A function name that is neither built in nor an extension.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: &'static str,
        actual: usize,
    },

    /// A function argument has the wrong JSON type.
    #[error("function '{name}': argument {position} must be {expected}, got {actual}")]
    InvalidType {
        name: String,
        position: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// A function failed for a reason other than its argument types.
    #[error("function '{name}': {message}")]
    Function { name: String, message: String },

    /// An `&expression` was evaluated outside of a function argument.
    #[error("expression references are only valid as function arguments")]
    UnexpectedExpref,

    // -- Templates -----------------------------------------------------------
    /// The template could not be parsed or rendered.
    #[error("template error: {0}")]
    Template(String),

    // -- Markers -------------------------------------------------------------
    /// A `<ref>`, `<tpl>` or `<select>` marker has the wrong shape.
    #[error("malformed {kind} marker: {message}")]
    Marker {
        kind: &'static str,
        message: String,
    },
}
