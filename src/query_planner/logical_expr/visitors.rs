//! Expression Visitor Pattern
//!
//! Two traversal traits over `Expr` trees, shared by the navigation
//! expansion stages:
//!
//! - [`ExpressionVisitor`] is read-only and driven by [`walk_expression`].
//! - [`ExpressionRewriter`] rebuilds a tree. Implementors override
//!   `rewrite_expr` for the nodes they care about and call
//!   [`rewrite_children`] to keep descending.
//!
//! Both descend into correlated subqueries, visiting every lambda body and
//! argument of the embedded operator tree.
//!
//! # Example
//!
//! ```ignore
//! struct BindingCounter(usize);
//!
//! impl ExpressionVisitor for BindingCounter {
//!     fn visit_expr(&mut self, expr: &Expr) {
//!         if matches!(expr, Expr::NavigationBinding { .. }) {
//!             self.0 += 1;
//!         }
//!     }
//! }
//!
//! let mut counter = BindingCounter(0);
//! walk_expression(&expr, &mut counter);
//! ```

use std::sync::Arc;

use super::{Expr, Lambda, RecordField};
use crate::query_planner::logical_plan::QueryOperator;

/// Read-only visitor, called pre-order for every node.
pub trait ExpressionVisitor {
    fn visit_expr(&mut self, _expr: &Expr) {}

    /// Return false to skip the subtree below a subquery.
    fn enter_subquery(&mut self, _op: &QueryOperator) -> bool {
        true
    }
}

pub fn walk_expression<V: ExpressionVisitor + ?Sized>(expr: &Expr, visitor: &mut V) {
    visitor.visit_expr(expr);
    match expr {
        Expr::Member { target, .. } => walk_expression(target, visitor),
        Expr::Binary { left, right, .. } => {
            walk_expression(left, visitor);
            walk_expression(right, visitor);
        }
        Expr::Unary { operand, .. } | Expr::Convert(operand) => walk_expression(operand, visitor),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            walk_expression(test, visitor);
            walk_expression(if_true, visitor);
            walk_expression(if_false, visitor);
        }
        Expr::Record(fields) => {
            for field in fields {
                walk_expression(&field.value, visitor);
            }
        }
        Expr::Composite { outer, inner } => {
            walk_expression(outer, visitor);
            walk_expression(inner, visitor);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                walk_expression(arg, visitor);
            }
        }
        Expr::Subquery(op) => walk_operator(op, visitor),
        Expr::Parameter(_)
        | Expr::Literal(_)
        | Expr::NavigationBinding { .. }
        | Expr::CustomRoot(_) => {}
    }
}

/// Walks every expression held by an operator tree.
pub fn walk_operator<V: ExpressionVisitor + ?Sized>(op: &QueryOperator, visitor: &mut V) {
    if !visitor.enter_subquery(op) {
        return;
    }
    for lambda in op.lambdas() {
        walk_expression(&lambda.body, visitor);
    }
    for expr in op.arguments() {
        walk_expression(expr, visitor);
    }
    for input in op.inputs() {
        walk_operator(input, visitor);
    }
}

/// Rebuilding visitor. The defaults reproduce the tree unchanged.
pub trait ExpressionRewriter {
    type Error;

    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, Self::Error> {
        rewrite_children(self, expr)
    }

    /// Lambdas met inside subqueries. Override to honor shadowing.
    fn rewrite_lambda(&mut self, lambda: &Lambda) -> Result<Lambda, Self::Error> {
        Ok(Lambda {
            params: lambda.params.clone(),
            body: self.rewrite_expr(&lambda.body)?,
        })
    }

    fn rewrite_subquery(
        &mut self,
        op: &Arc<QueryOperator>,
    ) -> Result<Arc<QueryOperator>, Self::Error> {
        op.rewrite_expressions(self)
    }
}

/// Rewrites the direct children of `expr` with `rewriter`, keeping its shape.
pub fn rewrite_children<R: ExpressionRewriter + ?Sized>(
    rewriter: &mut R,
    expr: &Expr,
) -> Result<Expr, R::Error> {
    let rewritten = match expr {
        Expr::Member { target, member } => Expr::Member {
            target: Box::new(rewriter.rewrite_expr(target)?),
            member: member.clone(),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(rewriter.rewrite_expr(left)?),
            right: Box::new(rewriter.rewrite_expr(right)?),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(rewriter.rewrite_expr(operand)?),
        },
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => Expr::Conditional {
            test: Box::new(rewriter.rewrite_expr(test)?),
            if_true: Box::new(rewriter.rewrite_expr(if_true)?),
            if_false: Box::new(rewriter.rewrite_expr(if_false)?),
        },
        Expr::Record(fields) => {
            let mut rewritten = Vec::with_capacity(fields.len());
            for field in fields {
                rewritten.push(RecordField {
                    name: field.name.clone(),
                    value: rewriter.rewrite_expr(&field.value)?,
                });
            }
            Expr::Record(rewritten)
        }
        Expr::Composite { outer, inner } => Expr::Composite {
            outer: Box::new(rewriter.rewrite_expr(outer)?),
            inner: Box::new(rewriter.rewrite_expr(inner)?),
        },
        Expr::Convert(operand) => Expr::Convert(Box::new(rewriter.rewrite_expr(operand)?)),
        Expr::Call { function, args } => {
            let mut rewritten = Vec::with_capacity(args.len());
            for arg in args {
                rewritten.push(rewriter.rewrite_expr(arg)?);
            }
            Expr::Call {
                function: function.clone(),
                args: rewritten,
            }
        }
        Expr::Subquery(op) => Expr::Subquery(rewriter.rewrite_subquery(op)?),
        Expr::Parameter(_)
        | Expr::Literal(_)
        | Expr::NavigationBinding { .. }
        | Expr::CustomRoot(_) => expr.clone(),
    };
    Ok(rewritten)
}

/// True when any transient navigation variant is left in `expr`.
pub fn contains_transient(expr: &Expr) -> bool {
    struct TransientFinder(bool);

    impl ExpressionVisitor for TransientFinder {
        fn visit_expr(&mut self, expr: &Expr) {
            self.0 |= expr.is_transient();
        }
    }

    let mut finder = TransientFinder(false);
    walk_expression(expr, &mut finder);
    finder.0
}
