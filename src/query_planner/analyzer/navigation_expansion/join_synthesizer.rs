//! Join synthesis for pending navigation nodes.
//!
//! A required navigation becomes
//!
//! ```text
//! Join(source, Scan(T), s => s.<path>.Fk, t => t.Pk, (s, t) => { Outer = s, Inner = t })
//! ```
//!
//! and an optional one becomes a left outer join spelled as a group join
//! followed by a flattening with a default:
//!
//! ```text
//! GroupJoin(source, Scan(T), s => s.<path>.Fk, t => t.Pk, (s, g) => { Outer = s, Inner = g })
//!   .SelectMany(ti => ti.Inner.DefaultIfEmpty(), (ti, t) => { Outer = ti, Inner = t })
//! ```
//!
//! After each join every other `Complete` node and custom root of the state
//! is pushed one level down (two for the optional form) with `Outer`, and the
//! expanded node moves to `Inner`.

use std::sync::Arc;

use crate::{
    entity_catalog::Relationship,
    query_planner::{
        logical_expr::{
            combinators::{composite, nullable, param},
            Expr, Lambda, RecordField,
        },
        logical_plan::QueryOperator,
        types::{ElementType, INNER, OUTER},
    },
};

use super::{
    errors::NavigationExpansionError,
    expansion_state::{symbol_base, ExpansionState},
    navigation_tree::{ExpansionStatus, NodeId},
    NavigationExpander,
};

type JoinResult<T> = Result<T, NavigationExpansionError>;

/// Widens whichever side is non-nullable when the other one is nullable.
pub(super) fn widen_to_common_nullability(
    left: Expr,
    left_nullable: bool,
    right: Expr,
    right_nullable: bool,
) -> (Expr, Expr) {
    match (left_nullable, right_nullable) {
        (true, false) => (left, nullable(right)),
        (false, true) => (nullable(left), right),
        _ => (left, right),
    }
}

impl NavigationExpander<'_> {
    /// Emits a join for every pending node reachable from the state's roots,
    /// mapping by mapping, children in creation order.
    pub(super) fn expand_pending_navigations(
        &mut self,
        mut source: Arc<QueryOperator>,
        state: &mut ExpansionState,
    ) -> JoinResult<Arc<QueryOperator>> {
        for mapping in state.source_mappings.clone() {
            let root = self.arena.root_of(mapping);
            source = self.expand_children(source, state, root)?;
        }
        Ok(source)
    }

    fn expand_children(
        &mut self,
        mut source: Arc<QueryOperator>,
        state: &mut ExpansionState,
        parent: NodeId,
    ) -> JoinResult<Arc<QueryOperator>> {
        for child in self.arena.node(parent).children().to_vec() {
            let node = self.arena.node(child);
            match node.status {
                ExpansionStatus::NotNeeded => continue,
                ExpansionStatus::Pending if node.is_collection() => {
                    return Err(NavigationExpansionError::CollectionInJoinTree {
                        operator: self.operator,
                        relationship: node
                            .relationship
                            .as_ref()
                            .map(Relationship::qualified_name)
                            .unwrap_or_default(),
                    });
                }
                ExpansionStatus::Pending => {
                    source = self.expand_node(source, state, child)?;
                }
                ExpansionStatus::Complete => {}
            }
            if !self.arena.node(child).is_collection() {
                source = self.expand_children(source, state, child)?;
            }
        }
        Ok(source)
    }

    fn expand_node(
        &mut self,
        source: Arc<QueryOperator>,
        state: &mut ExpansionState,
        id: NodeId,
    ) -> JoinResult<Arc<QueryOperator>> {
        let node = self.arena.node(id).clone();
        let (Some(relationship), Some(parent)) = (node.relationship, node.parent) else {
            return Ok(source);
        };
        let parent = self.arena.node(parent).clone();

        let outer = state.current_symbol.clone();
        let target_type = ElementType::entity(&relationship.target);
        let inner = self
            .symbols
            .fresh(&symbol_base(&relationship.target), target_type.clone());
        let (outer_key, inner_key) = self.join_keys(
            &relationship,
            param(&outer).member_path(&parent.to_path),
            parent.optional,
            param(&inner),
        )?;
        let outer_key = Lambda::unary(outer.clone(), outer_key);
        let inner_key = Lambda::unary(inner.clone(), inner_key);
        let scan = Arc::new(self.scan(&relationship.target)?);
        let joined_name = format!("{}_{}", outer.name, relationship.name.to_lowercase());

        let (joined, joined_type, depth) = if node.optional {
            let group_type = ElementType::sequence(target_type.clone());
            let group = self
                .symbols
                .fresh(&format!("{}_group", symbol_base(&relationship.target)), group_type.clone());
            let grouped_type = ElementType::composite(outer.ty.clone(), group_type);
            let group_join = Arc::new(QueryOperator::GroupJoin {
                outer: source,
                inner: scan,
                outer_key,
                inner_key,
                result: Lambda::new(
                    vec![outer.clone(), group.clone()],
                    composite(param(&outer), param(&group)),
                ),
            });

            let grouped = self.symbols.fresh("ti", grouped_type.clone());
            let element = self
                .symbols
                .fresh(&symbol_base(&relationship.target), target_type.clone());
            let defaulted = QueryOperator::DefaultIfEmpty {
                input: Arc::new(QueryOperator::Source {
                    expr: param(&grouped).member(INNER),
                }),
                default: None,
            };
            let flattened = QueryOperator::SelectMany {
                input: group_join,
                collection: Lambda::unary(grouped.clone(), Expr::Subquery(Arc::new(defaulted))),
                result: Some(Lambda::new(
                    vec![grouped.clone(), element.clone()],
                    composite(param(&grouped), param(&element)),
                )),
            };
            (
                flattened,
                ElementType::composite(grouped_type, target_type),
                2,
            )
        } else {
            let join = QueryOperator::Join {
                outer: source,
                inner: scan,
                outer_key,
                inner_key,
                result: Lambda::new(
                    vec![outer.clone(), inner.clone()],
                    composite(param(&outer), param(&inner)),
                ),
            };
            (join, ElementType::composite(outer.ty.clone(), target_type), 1)
        };

        log::debug!(
            "join synthesizer: expanded {} as {} join over `{}`",
            relationship.qualified_name(),
            if node.optional { "left outer" } else { "inner" },
            outer.name
        );

        self.push_down(state, id, depth);
        let expanded = self.arena.node_mut(id);
        expanded.to_path = vec![INNER.to_string()];
        expanded.status = ExpansionStatus::Complete;

        let joined_symbol = self.symbols.fresh(&joined_name, joined_type);
        state.rebase(joined_symbol);
        Ok(Arc::new(joined))
    }

    /// Prefixes every complete node except `expanded`, and every custom root
    /// of the state, with `depth` copies of `Outer`.
    fn push_down(&mut self, state: &ExpansionState, expanded: NodeId, depth: usize) {
        for mapping in &state.source_mappings {
            for id in self.arena.nodes_of(*mapping) {
                if id != expanded && self.arena.node(id).status == ExpansionStatus::Complete {
                    for _ in 0..depth {
                        self.arena.prepend_to_node(id, OUTER);
                    }
                    log::trace!(
                        "join synthesizer: nav#{} now at {:?}",
                        id.0,
                        self.arena.node(id).to_path
                    );
                }
            }
        }
        for root in &state.custom_root_paths {
            for _ in 0..depth {
                self.arena.prepend_to_custom_root(*root, OUTER);
            }
        }
    }

    /// Key selectors of a navigation join. Composite keys are compared as
    /// records named after the target's key fields.
    fn join_keys(
        &self,
        relationship: &Relationship,
        outer: Expr,
        outer_optional: bool,
        inner: Expr,
    ) -> JoinResult<(Expr, Expr)> {
        let mut outer_parts = Vec::new();
        let mut inner_parts = Vec::new();
        for (outer_field, inner_field) in relationship
            .outer_key_fields()
            .iter()
            .zip(relationship.inner_key_fields())
        {
            let outer_nullable = outer_optional
                || self
                    .model
                    .field(&relationship.source, outer_field)?
                    .nullable;
            let inner_nullable = self.model.field(&relationship.target, inner_field)?.nullable;
            let (o, i) = widen_to_common_nullability(
                outer.clone().member(outer_field.as_str()),
                outer_nullable,
                inner.clone().member(inner_field.as_str()),
                inner_nullable,
            );
            outer_parts.push((inner_field.clone(), o));
            inner_parts.push((inner_field.clone(), i));
        }

        if outer_parts.len() == 1 {
            let (_, o) = outer_parts.remove(0);
            let (_, i) = inner_parts.remove(0);
            return Ok((o, i));
        }
        let into_record = |parts: Vec<(String, Expr)>| {
            Expr::Record(
                parts
                    .into_iter()
                    .map(|(name, value)| RecordField { name, value })
                    .collect(),
            )
        };
        Ok((into_record(outer_parts), into_record(inner_parts)))
    }
}
