//! Deferred work carried by an [`ExpansionState`]: the ordering queue, the
//! pending projection and the terminal markers, and the points where they
//! are forced into the emitted tree.

use std::sync::Arc;

use crate::query_planner::{
    logical_expr::{Expr, Symbol},
    logical_plan::QueryOperator,
    types::{ElementType, INNER, OUTER},
};

use super::{
    expansion_state::{symbol_base, Expansion, ExpansionState, Grouping},
    navigation_tree::{CustomRootId, NodeId},
    reference_binder::custom_root_chain,
    ExpansionResult, NavigationExpander,
};

impl NavigationExpander<'_> {
    /// Emits queued orderings, oldest first, against the current row shape.
    pub(super) fn flush_orderings(&self, expansion: Expansion) -> ExpansionResult<Expansion> {
        let Expansion {
            mut source,
            mut state,
        } = expansion;
        for ordering in std::mem::take(&mut state.pending_orderings) {
            let key = self.unbind_lambda(&state, &ordering.key)?;
            source = Arc::new(if ordering.then_by {
                QueryOperator::ThenBy {
                    input: source,
                    key,
                    descending: ordering.descending,
                }
            } else {
                QueryOperator::OrderBy {
                    input: source,
                    key,
                    descending: ordering.descending,
                }
            });
        }
        Ok(Expansion::new(source, state))
    }

    /// Prepares a source for an operator that consumes concrete rows: flushes
    /// orderings and, when a projection is pending, emits it and rebuilds the
    /// source mappings from the entities surviving in the projected shape.
    pub(super) fn pre_process_terminating(
        &mut self,
        expansion: Expansion,
    ) -> ExpansionResult<Expansion> {
        let expansion = self.flush_orderings(expansion)?;
        if !expansion.state.apply_pending_projection {
            return Ok(expansion);
        }

        let Expansion { source, state } = expansion;
        let selector = self.unbind_lambda(&state, &state.pending_projection.body)?;
        let projected_type = selector.body.element_type(self.model);
        let base = match &state.pending_projection.body {
            Expr::NavigationBinding { entity, .. } => symbol_base(entity),
            _ => "p".to_string(),
        };
        let symbol = self.symbols.fresh(&base, projected_type);
        log::debug!(
            "pending: materializing projection {} as `{}`",
            selector,
            symbol.name
        );

        let source = Arc::new(QueryOperator::Select {
            input: source,
            selector,
        });
        let state = self.regenerate_state(&state, symbol);
        Ok(Expansion::new(source, state))
    }

    /// Builds the state of a freshly materialized projection. A bare entity
    /// becomes a plain root; any other shape becomes a custom root with one
    /// anchored mapping per entity found along record and composite fields.
    fn regenerate_state(&mut self, old: &ExpansionState, symbol: Symbol) -> ExpansionState {
        let body = &old.pending_projection.body;
        let mut state = match body {
            Expr::NavigationBinding { node, entity } if self.owns(old, *node) => {
                let optional = self.arena.node(*node).optional;
                let mapping = self.arena.add_mapping(entity, vec![], optional, None);
                let root = self.arena.root_of(mapping);
                let mut state = ExpansionState::new(
                    symbol,
                    Expr::NavigationBinding {
                        node: root,
                        entity: entity.clone(),
                    },
                );
                state.source_mappings.push(mapping);
                state.pending_include_chain =
                    self.replay_includes(*node, root, old.pending_include_chain);
                state
            }
            _ => {
                let custom_root = self.arena.add_custom_root(vec![]);
                let mut state = ExpansionState::opaque(symbol, custom_root);
                let mut found = Vec::new();
                self.collect_entities(body, old, &mut Vec::new(), &mut found);
                for (survivor, path) in found {
                    let node = match survivor {
                        Survivor::Entity(node) => node,
                        Survivor::Grouping(index) => {
                            let element = self.groupings[index].element.clone();
                            self.groupings.push(Grouping {
                                root: custom_root,
                                path,
                                element,
                            });
                            continue;
                        }
                    };
                    let source_node = self.arena.node(node);
                    let (entity, optional) = (source_node.entity.clone(), source_node.optional);
                    let mapping = self
                        .arena
                        .add_mapping(&entity, path, optional, Some(custom_root));
                    let root = self.arena.root_of(mapping);
                    state.source_mappings.push(mapping);
                    let chain = self.replay_includes(node, root, old.pending_include_chain);
                    if chain.is_some() {
                        state.pending_include_chain = chain;
                    }
                }
                state
            }
        };
        state.pending_cardinality_reducer = old.pending_cardinality_reducer;
        state.materialize_as_collection = old.materialize_as_collection.clone();
        state
    }

    fn owns(&self, state: &ExpansionState, node: NodeId) -> bool {
        state.owns_mapping(self.arena.node(node).mapping)
    }

    /// Entity references and `GroupJoin` groups reachable through
    /// constructors, with their path. Those held under an opaque row shape
    /// are found through what is registered at its custom root.
    fn collect_entities(
        &self,
        expr: &Expr,
        state: &ExpansionState,
        path: &mut Vec<String>,
        found: &mut Vec<(Survivor, Vec<String>)>,
    ) {
        match expr {
            Expr::Record(fields) => {
                for field in fields {
                    path.push(field.name.clone());
                    self.collect_entities(&field.value, state, path, found);
                    path.pop();
                }
            }
            Expr::Composite { outer, inner } => {
                path.push(OUTER.to_string());
                self.collect_entities(outer, state, path, found);
                path.pop();
                path.push(INNER.to_string());
                self.collect_entities(inner, state, path, found);
                path.pop();
            }
            Expr::Unary { operand, .. } | Expr::Convert(operand) => {
                self.collect_entities(operand, state, path, found)
            }
            Expr::Conditional {
                if_true, if_false, ..
            } => {
                self.collect_entities(if_true, state, path, found);
                self.collect_entities(if_false, state, path, found);
            }
            Expr::NavigationBinding { node, .. } if self.owns(state, *node) => {
                found.push((Survivor::Entity(*node), path.clone()));
            }
            _ => {
                let Some((root, chain)) = custom_root_chain(expr) else {
                    return;
                };
                if !state.owns_custom_root(root) {
                    return;
                }
                for (index, grouping) in self.groupings.iter().enumerate() {
                    if grouping.root != root {
                        continue;
                    }
                    if let Some(rest) = grouping.path.strip_prefix(chain.as_slice()) {
                        let mut full = path.clone();
                        full.extend_from_slice(rest);
                        found.push((Survivor::Grouping(index), full));
                    }
                }
                for mapping in self.arena.mappings_anchored_at(root) {
                    if !state.owns_mapping(mapping) {
                        continue;
                    }
                    let node = self.arena.root_of(mapping);
                    let Some(from) = self.arena.node(node).from_paths.first() else {
                        continue;
                    };
                    if let Some(rest) = from.strip_prefix(chain.as_slice()) {
                        let mut full = path.clone();
                        full.extend_from_slice(rest);
                        found.push((Survivor::Entity(node), full));
                    }
                }
            }
        }
    }

    /// Copies the included subtree of `from` under `to`. Returns the copy of
    /// `chain` when it lies in that subtree.
    fn replay_includes(
        &mut self,
        from: NodeId,
        to: NodeId,
        chain: Option<NodeId>,
    ) -> Option<NodeId> {
        let mut replayed = (chain == Some(from)).then_some(to);
        for child in self.arena.node(from).children().to_vec() {
            let node = self.arena.node(child);
            if !node.included {
                continue;
            }
            let Some(relationship) = node.relationship.clone() else {
                continue;
            };
            let copy = self.arena.get_or_add_child(to, &relationship, true);
            if let Some(hit) = self.replay_includes(child, copy, chain) {
                replayed = Some(hit);
            }
        }
        replayed
    }

    /// Closes a subtree: materializes pending work, then emits the collection
    /// marker and finally the cardinality reducer as the outermost operator.
    pub(super) fn finalize(&mut self, expansion: Expansion) -> ExpansionResult<Expansion> {
        let Expansion { mut source, state } = self.pre_process_terminating(expansion)?;
        if let Some(relationship) = &state.materialize_as_collection {
            source = Arc::new(QueryOperator::MaterializeCollectionNavigation {
                input: source,
                relationship: relationship.clone(),
            });
        }
        if let Some(kind) = state.pending_cardinality_reducer {
            source = Arc::new(QueryOperator::CardinalityReducer {
                input: source,
                kind,
                predicate: None,
            });
        }
        Ok(Expansion::new(source, state))
    }

    /// Registers a fresh custom root and returns a state that treats the whole
    /// row as opaque.
    pub(super) fn opaque(
        &mut self,
        source: Arc<QueryOperator>,
        base: &str,
        element: ElementType,
    ) -> Expansion {
        let symbol = self.symbols.fresh(base, element);
        let root: CustomRootId = self.arena.add_custom_root(vec![]);
        Expansion::new(source, ExpansionState::opaque(symbol, root))
    }
}

/// Something a materialized projection carries over to the new row shape.
enum Survivor {
    Entity(NodeId),
    /// Index into the expander's registered groupings.
    Grouping(usize),
}
