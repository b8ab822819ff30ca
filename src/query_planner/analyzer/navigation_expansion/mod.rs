//! Navigation Expansion Analyzer
//!
//! Rewrites relationship traversals written as member accesses
//! (`o => o.Customer.Name == "Acme"`) into explicit joins against the related
//! entity, so that later stages only see flat, joinable fields.
//!
//! ## Architecture Overview
//!
//! The operator tree is rewritten bottom-up. Each operator first rewrites its
//! source, obtaining an [`Expansion`] (rewritten source plus
//! [`ExpansionState`]), then its handler consumes that state:
//!
//! 1. **Bind** - the operator's lambda is composed with the pending projection
//!    and relationship accesses are bound to navigation tree nodes
//! 2. **Join** - pending nodes are expanded into `Join` or
//!    `GroupJoin + SelectMany` operators; existing paths are re-prefixed
//! 3. **Unbind** - bound references become member paths on the new row symbol
//! 4. **Emit or defer** - projections and orderings stay pending until an
//!    operator needs a concrete source
//!
//! ## Module Structure
//!
//! - `navigation_tree` - arena of navigation nodes, source mappings and custom roots
//! - `expansion_state` - per-subtree state, symbol generation
//! - `reference_binder` - binding and unbinding of navigation references
//! - `join_synthesizer` - join emission and path remapping
//! - `pending` - ordering queue, deferred projection, finalization
//! - `operator_handlers` - one handler per operator kind
//! - `tests` - scenario and property tests

mod errors;
mod expansion_state;
mod join_synthesizer;
pub mod navigation_tree;
mod operator_handlers;
mod pending;
mod reference_binder;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;

pub use errors::NavigationExpansionError;
pub use expansion_state::{Expansion, ExpansionState, PendingOrdering};
use expansion_state::{Grouping, SymbolGenerator};
use navigation_tree::{NavigationArena, SourceMappingView};
use reference_binder::{unbind, ReferenceBinder};

use crate::{
    config::ExpansionConfig,
    entity_catalog::EntityModel,
    query_planner::{
        analyzer::{
            analyzer_pass::{AnalyzerPass, AnalyzerResult},
            errors::{AnalyzerError, Pass},
        },
        logical_expr::{
            expression_rewriter::compose,
            visitors::{walk_operator, ExpressionVisitor},
            Expr, Lambda,
        },
        logical_plan::{OperatorKind, QueryOperator, ReducerKind},
        plan_ctx::PlanCtx,
        transformed::Transformed,
        types::ElementType,
    },
};

type ExpansionResult<T> = Result<T, NavigationExpansionError>;

/// What downstream stages receive after expansion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationExpansionResult {
    #[serde(with = "crate::utils::serde_arc")]
    pub plan: Arc<QueryOperator>,
    pub element_type: ElementType,
    pub source_mappings: Vec<SourceMappingView>,
    /// Root entity followed by the relationship names of the last inclusion.
    pub include_chain: Option<Vec<String>>,
    pub cardinality_reducer: Option<ReducerKind>,
}

/// Per-call rewriting context. Owns the navigation arena shared by every
/// subtree of the query, including correlated subqueries.
pub(crate) struct NavigationExpander<'a> {
    model: &'a EntityModel,
    config: &'a ExpansionConfig,
    arena: NavigationArena,
    symbols: SymbolGenerator,
    /// Element states of the groups built by `GroupJoin`, by location.
    groupings: Vec<Grouping>,
    /// Operator being rewritten; error context.
    operator: OperatorKind,
    operator_depth: u32,
}

impl<'a> NavigationExpander<'a> {
    pub(crate) fn new(
        model: &'a EntityModel,
        config: &'a ExpansionConfig,
        root: OperatorKind,
    ) -> Self {
        NavigationExpander {
            model,
            config,
            arena: NavigationArena::new(),
            symbols: SymbolGenerator::default(),
            groupings: Vec::new(),
            operator: root,
            operator_depth: 0,
        }
    }

    fn scan(&self, entity: &str) -> ExpansionResult<QueryOperator> {
        self.model
            .scan(entity)
            .map_err(|_| NavigationExpansionError::UnknownEntityType {
                entity: entity.to_string(),
            })
    }

    /// Rewrites `op` and its inputs, returning the rewritten source and state.
    fn expand(&mut self, op: &Arc<QueryOperator>) -> ExpansionResult<Expansion> {
        if self.operator_depth >= self.config.max_operator_depth {
            return Err(NavigationExpansionError::OperatorDepthExceeded {
                limit: self.config.max_operator_depth,
            });
        }
        let parent = std::mem::replace(&mut self.operator, op.kind());
        self.operator_depth += 1;
        let expansion = self.expand_operator(op);
        self.operator_depth -= 1;
        self.operator = parent;
        expansion
    }

    /// Expands a correlated subquery on its own state and closes it.
    fn expand_subquery(&mut self, op: &Arc<QueryOperator>) -> ExpansionResult<Arc<QueryOperator>> {
        let expansion = self.expand(op)?;
        Ok(self.finalize(expansion)?.source)
    }

    /// Composes `lambda` with the pending projection, binds its navigations
    /// and emits the joins they require. Returns the bound body.
    fn find_and_apply_navigations(
        &mut self,
        expansion: Expansion,
        lambda: &Lambda,
    ) -> ExpansionResult<(Expansion, Expr)> {
        let Expansion { source, mut state } = expansion;
        let composed = compose(&state.pending_projection, lambda);
        let bound = ReferenceBinder::new(self, &state).bind(&composed)?;
        let source = self.expand_pending_navigations(source, &mut state)?;
        Ok((Expansion::new(source, state), bound))
    }

    /// `current_symbol => unbind(body)`
    fn unbind_lambda(&self, state: &ExpansionState, body: &Expr) -> ExpansionResult<Lambda> {
        Ok(Lambda::unary(
            state.current_symbol.clone(),
            unbind(&self.arena, state, self.operator, body)?,
        ))
    }

    fn include_chain_path(&self, state: &ExpansionState) -> Option<Vec<String>> {
        let node = state.pending_include_chain?;
        let mapping = self.arena.mapping(self.arena.node(node).mapping);
        let mut path = vec![mapping.root_entity.clone()];
        path.extend(self.arena.relationship_path(node));
        Some(path)
    }
}

struct TransientFinder(Option<String>);

impl ExpressionVisitor for TransientFinder {
    fn visit_expr(&mut self, expr: &Expr) {
        if self.0.is_none() && expr.is_transient() {
            self.0 = Some(expr.to_string());
        }
    }
}

pub struct NavigationExpansion {
    config: ExpansionConfig,
}

impl NavigationExpansion {
    pub fn new(config: ExpansionConfig) -> Self {
        NavigationExpansion { config }
    }

    /// Runs the rewrite over a whole query.
    pub fn expand(
        &self,
        plan: &Arc<QueryOperator>,
        model: &EntityModel,
    ) -> Result<NavigationExpansionResult, NavigationExpansionError> {
        log::info!(
            "NavigationExpansion: rewriting {} query over model '{}'",
            plan.kind(),
            model.name
        );
        let mut expander = NavigationExpander::new(model, &self.config, plan.kind());
        let expansion = expander.expand(plan)?;
        let Expansion { source, state } = expander.finalize(expansion)?;

        let mut finder = TransientFinder(None);
        walk_operator(&source, &mut finder);
        if let Some(expr) = finder.0 {
            return Err(NavigationExpansionError::TransientReferenceLeft { expr });
        }

        let result = NavigationExpansionResult {
            element_type: source.element_type(model),
            source_mappings: state
                .source_mappings
                .iter()
                .map(|m| expander.arena.view(*m))
                .collect(),
            include_chain: expander.include_chain_path(&state),
            cardinality_reducer: state.pending_cardinality_reducer,
            plan: source,
        };
        log::debug!("NavigationExpansion: result {}", result.plan);
        Ok(result)
    }
}

impl AnalyzerPass for NavigationExpansion {
    fn analyze_with_entity_model(
        &self,
        logical_plan: Arc<QueryOperator>,
        plan_ctx: &mut PlanCtx,
        entity_model: &EntityModel,
    ) -> AnalyzerResult<Transformed<Arc<QueryOperator>>> {
        let result = self.expand(&logical_plan, entity_model).map_err(|source| {
            AnalyzerError::NavigationExpansion {
                pass: Pass::NavigationExpansion,
                source,
            }
        })?;
        let plan = result.plan.clone();
        plan_ctx.set_navigation_result(result);
        Ok(if plan == logical_plan {
            Transformed::No(logical_plan)
        } else {
            Transformed::Yes(plan)
        })
    }
}
