//! Reference binding and unbinding.
//!
//! Binding replaces every relationship access rooted at an entity of the
//! current state with a [`Expr::NavigationBinding`] to a navigation tree node,
//! creating `Pending` nodes along the way. It also rewrites entity
//! comparisons into key comparisons, turns collection navigations into
//! correlated subqueries and expands subqueries embedded in the lambda.
//!
//! Unbinding is the inverse once joins exist: each binding of the state
//! becomes a member path on the current row symbol.

use std::sync::Arc;

use crate::{
    entity_catalog::Relationship,
    query_planner::{
        logical_expr::{
            combinators::{and, binary, eq, lit_null, or},
            visitors::{rewrite_children, ExpressionRewriter},
            BinaryOp, Expr, Lambda, Symbol,
        },
        logical_plan::{OperatorKind, QueryOperator},
        types::ElementType,
    },
};

use super::{
    errors::NavigationExpansionError,
    expansion_state::{symbol_base, ExpansionState},
    join_synthesizer::widen_to_common_nullability,
    navigation_tree::{CustomRootId, ExpansionStatus, MappingId, NavigationArena, NodeId},
    NavigationExpander,
};

type BindResult<T> = Result<T, NavigationExpansionError>;

pub(super) struct ReferenceBinder<'e, 'a> {
    expander: &'e mut NavigationExpander<'a>,
    state: &'e ExpansionState,
    include: bool,
    defer_subqueries: bool,
    subquery_depth: usize,
}

impl<'e, 'a> ReferenceBinder<'e, 'a> {
    pub(super) fn new(expander: &'e mut NavigationExpander<'a>, state: &'e ExpansionState) -> Self {
        ReferenceBinder {
            expander,
            state,
            include: false,
            defer_subqueries: false,
            subquery_depth: 0,
        }
    }

    /// Inclusion mode: relationships are recorded as included, not joined,
    /// and collections are accepted.
    pub(super) fn including(mut self) -> Self {
        self.include = true;
        self
    }

    /// Leaves top-level subqueries bound but unexpanded so the caller can
    /// keep their state.
    pub(super) fn deferring_subqueries(mut self) -> Self {
        self.defer_subqueries = true;
        self
    }

    fn expands_subqueries_here(&self) -> bool {
        self.subquery_depth == 0 && !self.defer_subqueries
    }

    pub(super) fn bind(&mut self, expr: &Expr) -> BindResult<Expr> {
        self.rewrite_expr(expr)
    }

    fn owns_node(&self, node: NodeId) -> bool {
        self.state
            .owns_mapping(self.expander.arena.node(node).mapping)
    }

    /// Leftmost mapping of the state anchored at `root` whose root lives at
    /// exactly `path` inside that custom root.
    fn mapping_at(&self, root: CustomRootId, path: &[String]) -> Option<MappingId> {
        let arena = &self.expander.arena;
        self.state.source_mappings.iter().copied().find(|m| {
            let mapping = arena.mapping(*m);
            mapping.anchor == Some(root)
                && arena
                    .node(mapping.root)
                    .from_paths
                    .first()
                    .is_some_and(|p| p.as_slice() == path)
        })
    }

    fn bind_member(&mut self, target: Expr, member: String) -> BindResult<Expr> {
        if let Expr::NavigationBinding { node, entity } = &target {
            if !self.owns_node(*node) {
                return Ok(target.member(member));
            }
            let Some(relationship) = self
                .expander
                .model
                .find_relationship(entity, &member)
                .cloned()
            else {
                return Ok(target.member(member));
            };
            if relationship.is_collection && !self.include {
                return self.collection_navigation(*node, &target, &relationship);
            }
            let node = *node;
            self.check_depth(node, &relationship)?;
            let child = self
                .expander
                .arena
                .get_or_add_child(node, &relationship, self.include);
            return Ok(Expr::NavigationBinding {
                node: child,
                entity: relationship.target.clone(),
            });
        }

        let target = target.member(member);
        if let Some((root, path)) = custom_root_chain(&target) {
            if let Some(mapping) = self.mapping_at(root, &path) {
                let root = self.expander.arena.root_of(mapping);
                return Ok(Expr::NavigationBinding {
                    node: root,
                    entity: self.expander.arena.node(root).entity.clone(),
                });
            }
        }
        Ok(target)
    }

    fn check_depth(&self, node: NodeId, relationship: &Relationship) -> BindResult<()> {
        let arena = &self.expander.arena;
        let limit = self.expander.config.max_navigation_depth;
        if arena.depth(node) + 1 > limit as usize {
            let mut path = arena.relationship_path(node);
            path.insert(0, arena.mapping(arena.node(node).mapping).root_entity.clone());
            path.push(relationship.name.clone());
            return Err(NavigationExpansionError::NavigationDepthExceeded {
                operator: self.expander.operator,
                path: path.join("."),
                limit,
            });
        }
        Ok(())
    }

    /// `binding.Lines` becomes a correlated subquery over the target entity
    /// filtered by the foreign key, marked as a collection materialization.
    fn collection_navigation(
        &mut self,
        node: NodeId,
        binding: &Expr,
        relationship: &Relationship,
    ) -> BindResult<Expr> {
        let model = self.expander.model;
        let outer_optional = self.expander.arena.node(node).optional;
        let element = Symbol::new(
            symbol_base(&relationship.target),
            ElementType::entity(&relationship.target),
        );

        let mut predicates = Vec::new();
        for (outer_field, inner_field) in relationship
            .outer_key_fields()
            .iter()
            .zip(relationship.inner_key_fields())
        {
            let outer_nullable =
                outer_optional || model.field(&relationship.source, outer_field)?.nullable;
            let inner_nullable = model.field(&relationship.target, inner_field)?.nullable;
            let (inner, outer) = widen_to_common_nullability(
                Expr::param(&element).member(inner_field.as_str()),
                inner_nullable,
                binding.clone().member(outer_field.as_str()),
                outer_nullable,
            );
            predicates.push(eq(inner, outer));
        }
        let predicate = and(predicates).ok_or_else(|| NavigationExpansionError::UnsupportedShape {
            operator: OperatorKind::MaterializeCollectionNavigation,
            reason: format!("{} has no key fields", relationship.qualified_name()),
        })?;

        let scan = self.expander.scan(&relationship.target)?;
        let subquery = Arc::new(QueryOperator::MaterializeCollectionNavigation {
            input: Arc::new(QueryOperator::Where {
                input: Arc::new(scan),
                predicate: Lambda::unary(element, predicate),
            }),
            relationship: relationship.qualified_name(),
        });
        log::debug!(
            "binder: collection navigation {} rewritten to subquery",
            relationship.qualified_name()
        );

        if self.expands_subqueries_here() {
            Ok(Expr::Subquery(self.expander.expand_subquery(&subquery)?))
        } else {
            Ok(Expr::Subquery(subquery))
        }
    }

    fn entity_of<'x>(&self, expr: &'x Expr) -> Option<&'x str> {
        match expr {
            Expr::NavigationBinding { node, entity } if self.owns_node(*node) => Some(entity),
            _ => None,
        }
    }

    /// `a == b` on entities compares keys; `a == null` checks each key field.
    fn entity_comparison(&self, op: BinaryOp, left: &Expr, right: &Expr) -> BindResult<Option<Expr>> {
        let (entity, right_is_null) = match (self.entity_of(left), self.entity_of(right)) {
            (Some(l), Some(r)) if l == r => (l, false),
            (Some(l), None) if right.is_null() => (l, true),
            (None, Some(r)) if left.is_null() => (r, true),
            _ => return Ok(None),
        };
        let (binding, other) = if self.entity_of(left).is_some() {
            (left, right)
        } else {
            (right, left)
        };

        let key = &self.expander.model.entity(entity)?.key;
        let parts: Vec<Expr> = key
            .iter()
            .map(|k| {
                let other = if right_is_null {
                    lit_null()
                } else {
                    other.clone().member(k.as_str())
                };
                binary(op, binding.clone().member(k.as_str()), other)
            })
            .collect();
        Ok(match op {
            BinaryOp::Eq => and(parts),
            _ => or(parts),
        })
    }
}

impl ExpressionRewriter for ReferenceBinder<'_, '_> {
    type Error = NavigationExpansionError;

    fn rewrite_expr(&mut self, expr: &Expr) -> BindResult<Expr> {
        match expr {
            Expr::Member { target, member } => {
                let target = self.rewrite_expr(target)?;
                self.bind_member(target, member.clone())
            }
            Expr::CustomRoot(root) => Ok(match self.mapping_at(*root, &[]) {
                Some(mapping) => {
                    let node = self.expander.arena.root_of(mapping);
                    Expr::NavigationBinding {
                        node,
                        entity: self.expander.arena.node(node).entity.clone(),
                    }
                }
                None => expr.clone(),
            }),
            Expr::Binary { op, left, right } if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) => {
                let left = self.rewrite_expr(left)?;
                let right = self.rewrite_expr(right)?;
                match self.entity_comparison(*op, &left, &right)? {
                    Some(rewritten) => Ok(rewritten),
                    None => Ok(binary(*op, left, right)),
                }
            }
            Expr::Subquery(op) => {
                self.subquery_depth += 1;
                let bound = op.rewrite_expressions(self);
                self.subquery_depth -= 1;
                let bound = bound?;
                if self.expands_subqueries_here() {
                    Ok(Expr::Subquery(self.expander.expand_subquery(&bound)?))
                } else {
                    Ok(Expr::Subquery(bound))
                }
            }
            _ => rewrite_children(self, expr),
        }
    }
}

/// `root#3.Outer.Customer` -> `(root#3, [Outer, Customer])`.
pub(super) fn custom_root_chain(expr: &Expr) -> Option<(CustomRootId, Vec<String>)> {
    let mut path = Vec::new();
    let mut current = expr;
    loop {
        match current {
            Expr::Member { target, member } => {
                path.push(member.clone());
                current = target;
            }
            Expr::CustomRoot(root) => {
                path.reverse();
                return Some((*root, path));
            }
            _ => return None,
        }
    }
}

struct Unbinder<'e> {
    arena: &'e NavigationArena,
    state: &'e ExpansionState,
    operator: OperatorKind,
}

impl ExpressionRewriter for Unbinder<'_> {
    type Error = NavigationExpansionError;

    fn rewrite_expr(&mut self, expr: &Expr) -> BindResult<Expr> {
        match expr {
            Expr::NavigationBinding { node, .. }
                if self.state.owns_mapping(self.arena.node(*node).mapping) =>
            {
                let n = self.arena.node(*node);
                if n.status != ExpansionStatus::Complete {
                    let mut path = self.arena.relationship_path(*node);
                    path.insert(0, self.arena.mapping(n.mapping).root_entity.clone());
                    return Err(NavigationExpansionError::UnexpandedNavigation {
                        operator: self.operator,
                        path: path.join("."),
                    });
                }
                Ok(Expr::param(&self.state.current_symbol).member_path(&n.to_path))
            }
            Expr::CustomRoot(root) if self.state.owns_custom_root(*root) => Ok(Expr::param(
                &self.state.current_symbol,
            )
            .member_path(self.arena.custom_root_path(*root))),
            _ => rewrite_children(self, expr),
        }
    }
}

/// Replaces the state's bindings and custom roots in `expr` by member paths
/// on the current symbol. Descends into subqueries. `operator` is reported
/// when a binding has no join yet.
pub(super) fn unbind(
    arena: &NavigationArena,
    state: &ExpansionState,
    operator: OperatorKind,
    expr: &Expr,
) -> Result<Expr, NavigationExpansionError> {
    Unbinder {
        arena,
        state,
        operator,
    }
    .rewrite_expr(expr)
}
