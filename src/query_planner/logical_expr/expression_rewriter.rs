//! Expression rewriting utilities for lambda composition
//!
//! - Capture-aware substitution of parameters by expressions
//! - Composition of a lambda with a pending (deferred) projection
//! - Member-of-constructor simplification, so `new { A = x }.A` folds to `x`
//!   and `{ Outer = a, Inner = b }.Inner` folds to `b`

use std::collections::HashMap;
use std::convert::Infallible;

use super::visitors::{rewrite_children, ExpressionRewriter};
use super::{Expr, Lambda, Symbol};

struct Substitution<'a> {
    replacements: HashMap<&'a str, &'a Expr>,
}

impl ExpressionRewriter for Substitution<'_> {
    type Error = Infallible;

    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, Infallible> {
        match expr {
            Expr::Parameter(symbol) => Ok(self
                .replacements
                .get(symbol.name.as_str())
                .map(|e| (*e).clone())
                .unwrap_or_else(|| expr.clone())),
            _ => rewrite_children(self, expr),
        }
    }

    fn rewrite_lambda(&mut self, lambda: &Lambda) -> Result<Lambda, Infallible> {
        let shadowed: Vec<_> = lambda
            .params
            .iter()
            .filter_map(|p| self.replacements.remove_entry(p.name.as_str()))
            .collect();
        let body = self.rewrite_expr(&lambda.body);
        self.replacements.extend(shadowed);
        Ok(Lambda {
            params: lambda.params.clone(),
            body: body?,
        })
    }
}

/// Replaces free occurrences of each symbol with its expression.
pub fn substitute(expr: &Expr, replacements: &[(&Symbol, &Expr)]) -> Expr {
    let mut substitution = Substitution {
        replacements: replacements
            .iter()
            .map(|(symbol, replacement)| (symbol.name.as_str(), *replacement))
            .collect(),
    };
    match substitution.rewrite_expr(expr) {
        Ok(rewritten) => rewritten,
        Err(never) => match never {},
    }
}

/// Renames free occurrences of `old` to `new`.
pub fn replace_symbol(expr: &Expr, old: &Symbol, new: &Symbol) -> Expr {
    if old.name == new.name {
        return expr.clone();
    }
    substitute(expr, &[(old, &Expr::param(new))])
}

struct Simplifier;

impl ExpressionRewriter for Simplifier {
    type Error = Infallible;

    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, Infallible> {
        let rewritten = rewrite_children(self, expr)?;
        Ok(match rewritten {
            Expr::Member { target, member } => match *target {
                Expr::Record(mut fields) => {
                    match fields.iter().position(|f| f.name == member) {
                        Some(pos) => fields.swap_remove(pos).value,
                        None => Expr::Member {
                            target: Box::new(Expr::Record(fields)),
                            member,
                        },
                    }
                }
                Expr::Composite { outer, inner } => match member.as_str() {
                    crate::query_planner::types::OUTER => *outer,
                    crate::query_planner::types::INNER => *inner,
                    _ => Expr::Member {
                        target: Box::new(Expr::Composite { outer, inner }),
                        member,
                    },
                },
                target => Expr::Member {
                    target: Box::new(target),
                    member,
                },
            },
            other => other,
        })
    }
}

/// Folds member accesses on record and composite constructors.
pub fn simplify(expr: &Expr) -> Expr {
    match Simplifier.rewrite_expr(expr) {
        Ok(rewritten) => rewritten,
        Err(never) => match never {},
    }
}

/// Inlines `pending` into `lambda`: the first parameter of `lambda` is
/// replaced by the body of `pending`, then constructor accesses are folded.
pub fn compose(pending: &Lambda, lambda: &Lambda) -> Expr {
    compose_at(&pending.body, lambda, 0)
}

/// Like [`compose`] but substitutes the parameter at `index` by `body`.
pub fn compose_at(body: &Expr, lambda: &Lambda, index: usize) -> Expr {
    match lambda.param(index) {
        Some(param) => simplify(&substitute(&lambda.body, &[(param, body)])),
        None => lambda.body.clone(),
    }
}
