//! Query syntax tree.

use serde_json::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A parsed query.
///
/// Projections are a single node: `lhs` produces a list, `rhs` is applied to
/// each element and `null` results are dropped. Filters are projections whose
/// `rhs` is a [`Ast::Condition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// `@`
    Identity,
    Field(String),
    Literal(Value),
    Subexpr(Box<Ast>, Box<Ast>),
    Index(i64),
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    Projection {
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    /// Values of an object, for `*` projections.
    ObjectValues(Box<Ast>),
    Flatten(Box<Ast>),
    Condition {
        predicate: Box<Ast>,
        then: Box<Ast>,
    },
    Comparison {
        comparator: Comparator,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    MultiList(Vec<Ast>),
    MultiHash(Vec<(String, Ast)>),
    Function {
        name: String,
        args: Vec<Ast>,
    },
    /// `&expression`
    Expref(Box<Ast>),
}
