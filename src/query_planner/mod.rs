use std::path::Path;
use std::sync::Arc;

use crate::{
    config::ExpansionConfig,
    entity_catalog::EntityModel,
    query_planner::{
        analyzer::navigation_expansion::NavigationExpansionResult,
        logical_plan::QueryOperator, plan_ctx::PlanCtx,
    },
};

pub use errors::QueryPlannerError;

pub mod analyzer;
mod errors;
pub mod logical_expr;
pub mod logical_plan;
pub mod plan_ctx;
pub mod transformed;
pub mod types;

/// Reads a query operator tree from its JSON form.
pub fn parse_query(json: &str) -> Result<Arc<QueryOperator>, QueryPlannerError> {
    Ok(Arc::new(serde_json::from_str(json)?))
}

pub fn load_query<P: AsRef<Path>>(path: P) -> Result<Arc<QueryOperator>, QueryPlannerError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| QueryPlannerError::QueryRead {
        path: path.display().to_string(),
        source,
    })?;
    parse_query(&contents)
}

/// Runs the analyzer pipeline over `plan` and returns the expanded query.
pub fn expand_navigations(
    plan: Arc<QueryOperator>,
    entity_model: &EntityModel,
    config: &ExpansionConfig,
) -> Result<NavigationExpansionResult, QueryPlannerError> {
    let mut plan_ctx = PlanCtx::new(config.clone());
    let plan = analyzer::initial_analyzing(plan, &mut plan_ctx, entity_model)?;
    log::debug!("expand_navigations: {}\n{}", plan_ctx, plan);
    plan_ctx
        .take_navigation_result()
        .ok_or(QueryPlannerError::MissingExpansionResult)
}
