use std::sync::Arc;

use crate::{
    entity_catalog::EntityModel,
    query_planner::{logical_plan::QueryOperator, plan_ctx::PlanCtx, transformed::Transformed},
};

use super::errors::AnalyzerError;

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// A rewrite over the whole operator tree. Passes record anything beyond
/// the rewritten tree in `plan_ctx`.
pub trait AnalyzerPass {
    fn analyze_with_entity_model(
        &self,
        logical_plan: Arc<QueryOperator>,
        plan_ctx: &mut PlanCtx,
        entity_model: &EntityModel,
    ) -> AnalyzerResult<Transformed<Arc<QueryOperator>>>;
}
