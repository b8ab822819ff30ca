//! # Query Analyzer
//!
//! Runs the analysis passes over a query operator tree. Each pass receives
//! the tree produced by the previous one together with the shared
//! [`PlanCtx`].
//!
//! ## Pass Pipeline Overview
//!
//! ```text
//! 1. PlanValidation       - Reject trees that already hold transient references
//! 2. NavigationExpansion  - Rewrite relationship navigations into joins
//! ```
//!
//! ## Module Organization
//!
//! - `analyzer_pass.rs`: Pass trait and infrastructure
//! - `navigation_expansion/`: Navigation expansion pass
//! - `errors.rs`: Pass identifiers and analyzer errors

use std::sync::Arc;

use analyzer_pass::AnalyzerResult;

use crate::{
    entity_catalog::EntityModel,
    query_planner::{
        analyzer::{
            analyzer_pass::AnalyzerPass, errors::AnalyzerError,
            navigation_expansion::NavigationExpansion,
        },
        logical_expr::visitors::{walk_operator, ExpressionVisitor},
        logical_expr::Expr,
        logical_plan::QueryOperator,
        plan_ctx::PlanCtx,
    },
};

pub mod analyzer_pass;
pub mod errors;
pub mod navigation_expansion;

struct TransientInput(bool);

impl ExpressionVisitor for TransientInput {
    fn visit_expr(&mut self, expr: &Expr) {
        self.0 |= expr.is_transient();
    }
}

/// Navigation bindings and custom roots only exist inside the pass.
fn validate_input(plan: &QueryOperator) -> AnalyzerResult<()> {
    let mut finder = TransientInput(false);
    walk_operator(plan, &mut finder);
    if finder.0 {
        return Err(AnalyzerError::InvalidPlan(
            "input query already contains navigation bindings".to_string(),
        ));
    }
    Ok(())
}

pub fn initial_analyzing(
    plan: Arc<QueryOperator>,
    plan_ctx: &mut PlanCtx,
    entity_model: &EntityModel,
) -> AnalyzerResult<Arc<QueryOperator>> {
    log::info!("ANALYZER: Entering initial_analyzing");

    // Step 1: Input validation
    validate_input(&plan)?;

    // Step 2: Navigation expansion
    let navigation_expansion = NavigationExpansion::new(plan_ctx.config().clone());
    let transformed =
        navigation_expansion.analyze_with_entity_model(plan, plan_ctx, entity_model)?;
    log::debug!(
        "ANALYZER: NavigationExpansion transformed plan: {}",
        transformed.is_yes()
    );

    Ok(transformed.get_plan())
}
