//! One handler per operator kind.
//!
//! Every handler first expands its input(s), then decides between binding
//! its lambdas against the resulting state, deferring them, or materializing
//! the pending projection before emitting itself.

use std::{collections::HashMap, sync::Arc};

use crate::query_planner::{
    logical_expr::{
        combinators::{composite, param},
        expression_rewriter::{compose, compose_at, replace_symbol},
        Expr, Lambda, Symbol,
    },
    logical_plan::{IncludeTarget, OperatorKind, QueryOperator},
    types::{ElementType, INNER, OUTER},
};

use super::{
    errors::NavigationExpansionError,
    expansion_state::{
        symbol_base, Expansion, ExpansionState, Grouping, PendingOrdering, Relabel,
    },
    navigation_tree::{ExpansionStatus, NodeId},
    reference_binder::{custom_root_chain, unbind, ReferenceBinder},
    ExpansionResult, NavigationExpander,
};

impl NavigationExpander<'_> {
    pub(super) fn expand_operator(&mut self, op: &Arc<QueryOperator>) -> ExpansionResult<Expansion> {
        log::debug!("NavigationExpansion: visiting {}", op.kind());
        match op.as_ref() {
            QueryOperator::EntityScan { entity } => self.expand_entity_scan(op, entity),
            QueryOperator::Source {
                expr: Expr::Subquery(inner),
            } => self.expand(inner),
            QueryOperator::Source { expr } => match self.grouping_elements(expr) {
                Some(state) => Ok(Expansion::new(op.clone(), state)),
                None => {
                    let element = op.element_type(self.model);
                    Ok(self.opaque(op.clone(), "s", element))
                }
            },
            QueryOperator::GroupBy {
                input,
                key,
                element,
            } => {
                log::warn!(
                    "NavigationExpansion: GroupBy key `{}` is passed through without navigation expansion",
                    key
                );
                let expansion = self.expand(input)?;
                let expansion = self.pre_process_terminating(expansion)?;
                let source = Arc::new(QueryOperator::GroupBy {
                    input: expansion.source,
                    key: key.clone(),
                    element: element.clone(),
                });
                Ok(self.opaque(source, "g", ElementType::Unknown))
            }
            QueryOperator::Where { input, predicate } => {
                let expansion = self.expand(input)?;
                let (expansion, bound) = self.find_and_apply_navigations(expansion, predicate)?;
                let expansion = self.flush_orderings(expansion)?;
                let predicate = self.unbind_lambda(&expansion.state, &bound)?;
                Ok(expansion.wrap(|input| QueryOperator::Where { input, predicate }))
            }
            QueryOperator::Select { input, selector } => self.expand_select(input, selector),
            QueryOperator::OrderBy {
                input,
                key,
                descending,
            } => {
                let expansion = self.expand(input)?;
                let (expansion, bound) = self.find_and_apply_navigations(expansion, key)?;
                let mut expansion = self.flush_orderings(expansion)?;
                expansion.state.pending_orderings.push(PendingOrdering {
                    key: bound,
                    descending: *descending,
                    then_by: false,
                });
                Ok(expansion)
            }
            QueryOperator::ThenBy {
                input,
                key,
                descending,
            } => {
                let expansion = self.expand(input)?;
                let (mut expansion, bound) = self.find_and_apply_navigations(expansion, key)?;
                expansion.state.pending_orderings.push(PendingOrdering {
                    key: bound,
                    descending: *descending,
                    then_by: true,
                });
                Ok(expansion)
            }
            QueryOperator::Join {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            } => self.expand_join(outer, inner, outer_key, inner_key, result),
            QueryOperator::GroupJoin {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            } => self.expand_group_join(outer, inner, outer_key, inner_key, result),
            QueryOperator::SelectMany {
                input,
                collection,
                result,
            } => self.expand_select_many(input, collection, result.as_ref()),
            QueryOperator::All { input, predicate } => {
                let expansion = self.expand(input)?;
                let (expansion, bound) = self.find_and_apply_navigations(expansion, predicate)?;
                let expansion = self.flush_orderings(expansion)?;
                let predicate = self.unbind_lambda(&expansion.state, &bound)?;
                let source = Arc::new(QueryOperator::All {
                    input: expansion.source,
                    predicate,
                });
                Ok(self.scalar(source))
            }
            QueryOperator::Any {
                input,
                predicate: Some(predicate),
            } => self.expand_operator(&Arc::new(QueryOperator::Any {
                input: filtered(input, predicate),
                predicate: None,
            })),
            QueryOperator::Any {
                input,
                predicate: None,
            } => {
                let expansion = self.expand(input)?;
                let expansion = self.pre_process_terminating(expansion)?;
                let source = Arc::new(QueryOperator::Any {
                    input: expansion.source,
                    predicate: None,
                });
                Ok(self.scalar(source))
            }
            QueryOperator::Count {
                input,
                predicate: Some(predicate),
            } => self.expand_operator(&Arc::new(QueryOperator::Count {
                input: filtered(input, predicate),
                predicate: None,
            })),
            QueryOperator::Count {
                input,
                predicate: None,
            } => {
                let expansion = self.expand(input)?;
                let expansion = self.pre_process_terminating(expansion)?;
                let source = Arc::new(QueryOperator::Count {
                    input: expansion.source,
                    predicate: None,
                });
                Ok(self.scalar(source))
            }
            QueryOperator::Average { input, selector } => {
                let expansion = self.expand(input)?;
                let (expansion, selector) = match selector {
                    Some(selector) => {
                        let (expansion, bound) =
                            self.find_and_apply_navigations(expansion, selector)?;
                        let expansion = self.flush_orderings(expansion)?;
                        let selector = self.unbind_lambda(&expansion.state, &bound)?;
                        (expansion, Some(selector))
                    }
                    None => (self.pre_process_terminating(expansion)?, None),
                };
                let source = Arc::new(QueryOperator::Average {
                    input: expansion.source,
                    selector,
                });
                Ok(self.scalar(source))
            }
            QueryOperator::CardinalityReducer {
                input,
                kind,
                predicate: Some(predicate),
            } => self.expand_operator(&Arc::new(QueryOperator::CardinalityReducer {
                input: filtered(input, predicate),
                kind: *kind,
                predicate: None,
            })),
            QueryOperator::CardinalityReducer {
                input,
                kind,
                predicate: None,
            } => {
                let expansion = self.expand(input)?;
                let mut expansion = self.flush_orderings(expansion)?;
                expansion.state.pending_cardinality_reducer = Some(*kind);
                Ok(expansion)
            }
            QueryOperator::Distinct { input } => {
                self.materialized(input, |input| QueryOperator::Distinct { input })
            }
            QueryOperator::AsTracking { input } => {
                self.materialized(input, |input| QueryOperator::AsTracking { input })
            }
            QueryOperator::AsNoTracking { input } => {
                self.materialized(input, |input| QueryOperator::AsNoTracking { input })
            }
            QueryOperator::Skip { input, count } => {
                let count = count.clone();
                self.materialized(input, |input| QueryOperator::Skip { input, count })
            }
            QueryOperator::Take { input, count } => {
                let count = count.clone();
                self.materialized(input, |input| QueryOperator::Take { input, count })
            }
            QueryOperator::DefaultIfEmpty { input, default } => {
                let expansion = self.expand(input)?;
                for mapping in &expansion.state.source_mappings {
                    self.arena.make_optional(*mapping);
                }
                let expansion = match default {
                    Some(_) => self.pre_process_terminating(expansion)?,
                    None => self.flush_orderings(expansion)?,
                };
                let default = default.clone();
                Ok(expansion.wrap(|input| QueryOperator::DefaultIfEmpty { input, default }))
            }
            QueryOperator::OfType { input, entity } => self.expand_of_type(input, entity),
            QueryOperator::Include { input, navigation } => match navigation {
                IncludeTarget::Lambda(lambda) => self.expand_include(input, lambda),
                IncludeTarget::Path(path) => self.expand_include_path(input, path),
            },
            QueryOperator::ThenInclude { input, navigation } => {
                self.expand_then_include(input, navigation)
            }
            QueryOperator::MaterializeCollectionNavigation {
                input,
                relationship,
            } => {
                let mut expansion = self.expand(input)?;
                expansion.state.materialize_as_collection = Some(relationship.clone());
                Ok(expansion)
            }
        }
    }

    fn expand_entity_scan(
        &mut self,
        op: &Arc<QueryOperator>,
        entity: &str,
    ) -> ExpansionResult<Expansion> {
        self.scan(entity)?;
        Ok(Expansion::new(op.clone(), self.entity_state(entity)))
    }

    /// State of a fresh source of `entity` rows.
    fn entity_state(&mut self, entity: &str) -> ExpansionState {
        let symbol = self
            .symbols
            .fresh(&symbol_base(entity), ElementType::entity(entity));
        let mapping = self.arena.add_mapping(entity, vec![], false, None);
        let root = self.arena.root_of(mapping);
        let mut state = ExpansionState::new(
            symbol,
            Expr::NavigationBinding {
                node: root,
                entity: entity.to_string(),
            },
        );
        state.source_mappings.push(mapping);
        state
    }

    fn scalar(&mut self, source: Arc<QueryOperator>) -> Expansion {
        let element = source.element_type(self.model);
        self.opaque(source, "v", element)
    }

    fn materialized(
        &mut self,
        input: &Arc<QueryOperator>,
        make: impl FnOnce(Arc<QueryOperator>) -> QueryOperator,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.expand(input)?;
        Ok(self.pre_process_terminating(expansion)?.wrap(make))
    }

    fn expand_select(
        &mut self,
        input: &Arc<QueryOperator>,
        selector: &Lambda,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.expand(input)?;
        let (expansion, bound) = self.find_and_apply_navigations(expansion, selector)?;
        let mut expansion = self.flush_orderings(expansion)?;
        let state = &mut expansion.state;
        if bound != state.pending_projection.body {
            state.pending_projection = Lambda::unary(state.current_symbol.clone(), bound);
            state.apply_pending_projection = true;
        }
        Ok(expansion)
    }

    /// Binds a key selector against one side and returns it in emitted form.
    fn side_key(
        &mut self,
        expansion: Expansion,
        key: &Lambda,
    ) -> ExpansionResult<(Expansion, Lambda)> {
        let (expansion, bound) = self.find_and_apply_navigations(expansion, key)?;
        let expansion = self.flush_orderings(expansion)?;
        let key = self.unbind_lambda(&expansion.state, &bound)?;
        Ok((expansion, key))
    }

    fn expand_join(
        &mut self,
        outer: &Arc<QueryOperator>,
        inner: &Arc<QueryOperator>,
        outer_key: &Lambda,
        inner_key: &Lambda,
        result: &Lambda,
    ) -> ExpansionResult<Expansion> {
        let outer = self.expand(outer)?;
        let inner = self.expand(inner)?;
        let (outer, outer_key) = self.side_key(outer, outer_key)?;
        let (inner, inner_key) = self.side_key(inner, inner_key)?;

        let Expansion {
            source: inner_source,
            state: inner_state,
        } = inner;
        self.combine_two_sources(outer, inner_state, result, |outer, result| {
            QueryOperator::Join {
                outer,
                inner: inner_source,
                outer_key,
                inner_key,
                result,
            }
        })
    }

    /// Emits an operator pairing two sources into `{ Outer, Inner }` rows
    /// and makes the user's result selector the pending projection.
    fn combine_two_sources(
        &mut self,
        outer: Expansion,
        inner: ExpansionState,
        result: &Lambda,
        make: impl FnOnce(Arc<QueryOperator>, Lambda) -> QueryOperator,
    ) -> ExpansionResult<Expansion> {
        let Expansion {
            source: outer_source,
            state: outer,
        } = outer;
        let composed = compose_at(&outer.pending_projection.body, result, 0);
        let composed = compose_at(
            &inner.pending_projection.body,
            &Lambda::new(result.params.clone(), composed),
            1,
        );

        self.prefix_state(&outer, OUTER);
        self.prefix_state(&inner, INNER);

        let outer_symbol = outer.current_symbol.clone();
        let inner_symbol = inner.current_symbol.clone();
        let paired = self.symbols.fresh(
            "join",
            ElementType::composite(outer_symbol.ty.clone(), inner_symbol.ty.clone()),
        );
        let source = Arc::new(make(
            outer_source,
            Lambda::new(
                vec![outer_symbol.clone(), inner_symbol.clone()],
                composite(param(&outer_symbol), param(&inner_symbol)),
            ),
        ));

        let mut state = ExpansionState::new(paired.clone(), param(&paired));
        state.source_mappings = outer.source_mappings;
        state.source_mappings.extend(inner.source_mappings);
        state.custom_root_paths = outer.custom_root_paths;
        state.custom_root_paths.extend(inner.custom_root_paths);

        self.apply_result_selector(Expansion::new(source, state), paired, composed)
    }

    /// Binds an already composed result selector over a paired row and makes
    /// it the pending projection.
    fn apply_result_selector(
        &mut self,
        expansion: Expansion,
        paired: Symbol,
        composed: Expr,
    ) -> ExpansionResult<Expansion> {
        let (mut expansion, bound) =
            self.find_and_apply_navigations(expansion, &Lambda::unary(paired, composed))?;
        let state = &mut expansion.state;
        state.pending_projection = Lambda::unary(state.current_symbol.clone(), bound);
        state.apply_pending_projection = true;
        Ok(expansion)
    }

    /// Prefixes the complete nodes and custom roots of `state` with `marker`.
    fn prefix_state(&mut self, state: &ExpansionState, marker: &str) {
        for mapping in &state.source_mappings {
            for id in self.arena.nodes_of(*mapping) {
                if self.arena.node(id).status == ExpansionStatus::Complete {
                    self.arena.prepend_to_node(id, marker);
                }
            }
        }
        for root in &state.custom_root_paths {
            self.arena.prepend_to_custom_root(*root, marker);
        }
    }

    /// The inner side is materialized. The grouping parameter of the result
    /// selector becomes a custom root at `Inner` whose elements keep the
    /// inner state, so sources over a group bind the inner entities.
    fn expand_group_join(
        &mut self,
        outer: &Arc<QueryOperator>,
        inner: &Arc<QueryOperator>,
        outer_key: &Lambda,
        inner_key: &Lambda,
        result: &Lambda,
    ) -> ExpansionResult<Expansion> {
        let outer = self.expand(outer)?;
        let inner = self.expand(inner)?;
        let (outer, outer_key) = self.side_key(outer, outer_key)?;
        let inner = self.pre_process_terminating(inner)?;
        let (inner, inner_key) = self.side_key(inner, inner_key)?;
        if inner.state.apply_pending_projection {
            log::debug!(
                "NavigationExpansion: GroupJoin inner key `{}` navigates; groups carry the joined rows",
                inner_key
            );
        }

        let Expansion {
            source: outer_source,
            state: outer_state,
        } = outer;
        let group_root = self.arena.add_custom_root(vec![INNER.to_string()]);
        let mut element = inner.state.clone();
        element.pending_cardinality_reducer = None;
        element.materialize_as_collection = None;
        self.groupings.push(Grouping {
            root: group_root,
            path: Vec::new(),
            element,
        });
        let composed = compose_at(&outer_state.pending_projection.body, result, 0);
        let composed = compose_at(
            &Expr::CustomRoot(group_root),
            &Lambda::new(result.params.clone(), composed),
            1,
        );
        self.prefix_state(&outer_state, OUTER);

        let outer_symbol = outer_state.current_symbol.clone();
        let inner_type = inner.state.current_symbol.ty.clone();
        let group = self.symbols.fresh(
            &format!("{}_group", inner.state.current_symbol.name),
            ElementType::sequence(inner_type.clone()),
        );
        let paired = self.symbols.fresh(
            "groupjoin",
            ElementType::composite(
                outer_symbol.ty.clone(),
                ElementType::sequence(inner_type),
            ),
        );
        let source = Arc::new(QueryOperator::GroupJoin {
            outer: outer_source,
            inner: inner.source,
            outer_key,
            inner_key,
            result: Lambda::new(
                vec![outer_symbol.clone(), group.clone()],
                composite(param(&outer_symbol), param(&group)),
            ),
        });

        let mut state = ExpansionState::new(paired.clone(), param(&paired));
        state.source_mappings = outer_state.source_mappings;
        state.custom_root_paths = outer_state.custom_root_paths;
        state.custom_root_paths.push(group_root);

        self.apply_result_selector(Expansion::new(source, state), paired, composed)
    }

    /// A fresh element state when `expr` is where the groups of a `GroupJoin`
    /// live. The registered element state is copied node for node so that
    /// navigations joined inside one use stay out of the others.
    fn grouping_elements(&mut self, expr: &Expr) -> Option<ExpansionState> {
        let (root, path) = custom_root_chain(expr)?;
        let template = self
            .groupings
            .iter()
            .find(|g| g.root == root && g.path == path)?
            .element
            .clone();

        let mut roots = HashMap::new();
        for custom in &template.custom_root_paths {
            let path = self.arena.custom_root_path(*custom).to_vec();
            roots.insert(*custom, self.arena.add_custom_root(path));
        }
        let mut nodes = HashMap::new();
        let mut source_mappings = Vec::with_capacity(template.source_mappings.len());
        for mapping in &template.source_mappings {
            let anchor = self
                .arena
                .mapping(*mapping)
                .anchor
                .map(|a| roots.get(&a).copied().unwrap_or(a));
            let (copy, copies) = self.arena.copy_mapping(*mapping, anchor);
            nodes.extend(copies);
            source_mappings.push(copy);
        }

        let previous = &template.current_symbol;
        let symbol = self.symbols.fresh(&previous.name, previous.ty.clone());
        let body = Relabel {
            nodes: &nodes,
            roots: &roots,
        }
        .apply(&template.pending_projection.body);
        let mut state =
            ExpansionState::new(symbol.clone(), replace_symbol(&body, previous, &symbol));
        state.apply_pending_projection = template.apply_pending_projection;
        state.source_mappings = source_mappings;
        state.custom_root_paths = template
            .custom_root_paths
            .iter()
            .filter_map(|r| roots.get(r).copied())
            .collect();
        state.pending_include_chain = template
            .pending_include_chain
            .and_then(|n| nodes.get(&n).copied());
        log::debug!(
            "NavigationExpansion: group elements of `{}` bound as `{}`",
            expr,
            symbol.name
        );
        Some(state)
    }

    fn expand_select_many(
        &mut self,
        input: &Arc<QueryOperator>,
        collection: &Lambda,
        result: Option<&Lambda>,
    ) -> ExpansionResult<Expansion> {
        let outer = self.expand(input)?;
        let composed = compose(&outer.state.pending_projection, collection);
        let bound = ReferenceBinder::new(self, &outer.state)
            .deferring_subqueries()
            .bind(&composed)?;
        let Expr::Subquery(inner_op) = bound else {
            return Err(NavigationExpansionError::UnsupportedShape {
                operator: OperatorKind::SelectMany,
                reason: format!("collection selector `{}` is not a subquery", collection),
            });
        };

        let Expansion {
            source,
            state: mut outer_state,
        } = outer;
        let source = self.expand_pending_navigations(source, &mut outer_state)?;
        let outer = self.flush_orderings(Expansion::new(source, outer_state))?;

        let inner = self.expand(&inner_op)?;
        let mut inner = self.flush_orderings(inner)?;
        inner.state.materialize_as_collection = None;

        let correlated = unbind(
            &self.arena,
            &outer.state,
            self.operator,
            &Expr::Subquery(inner.source.clone()),
        )?;
        let collection = Lambda::unary(outer.state.current_symbol.clone(), correlated);

        match result {
            None => {
                let source = Arc::new(QueryOperator::SelectMany {
                    input: outer.source,
                    collection,
                    result: None,
                });
                Ok(Expansion::new(source, inner.state))
            }
            Some(result) => {
                self.combine_two_sources(outer, inner.state, result, |input, result| {
                    QueryOperator::SelectMany {
                        input,
                        collection,
                        result: Some(result),
                    }
                })
            }
        }
    }

    fn expand_of_type(
        &mut self,
        input: &Arc<QueryOperator>,
        entity: &str,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.expand(input)?;
        let Expansion { source, state } = self.pre_process_terminating(expansion)?;
        let source = Arc::new(QueryOperator::OfType {
            input: source,
            entity: entity.to_string(),
        });
        if self.model.find_entity(entity).is_none() {
            return Ok(Expansion::new(source, state));
        }
        let mut narrowed = self.entity_state(entity);
        narrowed.pending_cardinality_reducer = state.pending_cardinality_reducer;
        narrowed.materialize_as_collection = state.materialize_as_collection;
        Ok(Expansion::new(source, narrowed))
    }

    /// Binds an inclusion argument and returns the included node.
    fn bind_include(
        &mut self,
        state: &ExpansionState,
        expr: &Expr,
        operator: OperatorKind,
        argument: String,
    ) -> ExpansionResult<NodeId> {
        let bound = ReferenceBinder::new(self, state).including().bind(expr)?;
        match bound {
            Expr::NavigationBinding { node, .. }
                if self.arena.node(node).relationship.is_some()
                    && state.owns_mapping(self.arena.node(node).mapping) =>
            {
                Ok(node)
            }
            _ => Err(NavigationExpansionError::InvalidIncludeArgument { operator, argument }),
        }
    }

    fn expand_include(
        &mut self,
        input: &Arc<QueryOperator>,
        lambda: &Lambda,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.expand(input)?;
        let mut expansion = self.flush_orderings(expansion)?;
        let composed = compose(&expansion.state.pending_projection, lambda);
        let node = self.bind_include(
            &expansion.state,
            &composed,
            OperatorKind::Include,
            lambda.to_string(),
        )?;
        expansion.state.pending_include_chain = Some(node);
        Ok(expansion)
    }

    fn expand_include_path(
        &mut self,
        input: &Arc<QueryOperator>,
        path: &str,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.expand(input)?;
        let mut expansion = self.flush_orderings(expansion)?;
        if !self.config.expand_string_includes {
            let path = path.to_string();
            return Ok(expansion.wrap(|input| QueryOperator::Include {
                input,
                navigation: IncludeTarget::Path(path),
            }));
        }

        let invalid = || NavigationExpansionError::InvalidIncludeArgument {
            operator: OperatorKind::Include,
            argument: path.to_string(),
        };
        let mut chain = expansion.state.pending_projection.body.clone();
        for segment in path.split('.') {
            if segment.trim().is_empty() {
                return Err(invalid());
            }
            chain = chain.member(segment.trim());
        }
        let node = self.bind_include(
            &expansion.state,
            &chain,
            OperatorKind::Include,
            path.to_string(),
        )?;
        expansion.state.pending_include_chain = Some(node);
        Ok(expansion)
    }

    fn expand_then_include(
        &mut self,
        input: &Arc<QueryOperator>,
        lambda: &Lambda,
    ) -> ExpansionResult<Expansion> {
        let mut expansion = self.expand(input)?;
        let Some(previous) = expansion.state.pending_include_chain else {
            return Err(NavigationExpansionError::InvalidIncludeArgument {
                operator: OperatorKind::ThenInclude,
                argument: lambda.to_string(),
            });
        };
        let binding = Expr::NavigationBinding {
            node: previous,
            entity: self.arena.node(previous).entity.clone(),
        };
        let composed = compose_at(&binding, lambda, 0);
        let node = self.bind_include(
            &expansion.state,
            &composed,
            OperatorKind::ThenInclude,
            lambda.to_string(),
        )?;
        expansion.state.pending_include_chain = Some(node);
        Ok(expansion)
    }
}

/// `input.Where(predicate)`, used to normalize predicate overloads.
fn filtered(input: &Arc<QueryOperator>, predicate: &Lambda) -> Arc<QueryOperator> {
    Arc::new(QueryOperator::Where {
        input: input.clone(),
        predicate: predicate.clone(),
    })
}
