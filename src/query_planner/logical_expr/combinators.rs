//! Expression Combinators
//!
//! Small constructors for building `Expr` trees without spelling out the
//! boxed variants. Used by the join synthesizer, the collection rewriter and
//! the test suites.
//!
//! # Example
//! ```ignore
//! use crate::query_planner::logical_expr::combinators::{eq, lit_str, param};
//!
//! let predicate = eq(param(&o).member("Name"), lit_str("Acme"));
//! // Result: o.Name == "Acme"
//! ```

use super::{BinaryOp, Expr, Literal, RecordField, Symbol, UnaryOp};

pub fn param(symbol: &Symbol) -> Expr {
    Expr::Parameter(symbol.clone())
}

pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn lit_bool(value: bool) -> Expr {
    Expr::Literal(Literal::Bool(value))
}

pub fn lit_int(value: i64) -> Expr {
    Expr::Literal(Literal::Int(value))
}

pub fn lit_str(value: &str) -> Expr {
    Expr::Literal(Literal::String(value.to_string()))
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Eq, left, right)
}

pub fn ne(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::NotEq, left, right)
}

pub fn not(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    }
}

/// Combine predicates with `&&`.
///
/// - Empty vec → None
/// - Single predicate → Some(predicate)
/// - Multiple → Some(pred1 && pred2 && ...), left associative
pub fn and(predicates: Vec<Expr>) -> Option<Expr> {
    combine_predicates(predicates, BinaryOp::And)
}

/// Combine predicates with `||`, same shape rules as [`and`].
pub fn or(predicates: Vec<Expr>) -> Option<Expr> {
    combine_predicates(predicates, BinaryOp::Or)
}

fn combine_predicates(predicates: Vec<Expr>, op: BinaryOp) -> Option<Expr> {
    predicates
        .into_iter()
        .reduce(|acc, next| binary(op, acc, next))
}

pub fn record(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::Record(
        fields
            .into_iter()
            .map(|(name, value)| RecordField {
                name: name.to_string(),
                value,
            })
            .collect(),
    )
}

pub fn composite(outer: Expr, inner: Expr) -> Expr {
    Expr::Composite {
        outer: Box::new(outer),
        inner: Box::new(inner),
    }
}

pub fn nullable(operand: Expr) -> Expr {
    Expr::Convert(Box::new(operand))
}

pub fn call(function: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        function: function.to_string(),
        args,
    }
}

/// Builds the access to a key: the field itself for single-field keys, a
/// record of the fields otherwise.
pub fn key_access<S: AsRef<str>>(target: &Expr, fields: &[S]) -> Expr {
    match fields {
        [single] => target.clone().member(single.as_ref()),
        many => Expr::Record(
            many.iter()
                .map(|f| RecordField {
                    name: f.as_ref().to_string(),
                    value: target.clone().member(f.as_ref()),
                })
                .collect(),
        ),
    }
}
