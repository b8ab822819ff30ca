use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::Arc,
};

use crate::query_planner::{
    logical_expr::{
        expression_rewriter::replace_symbol,
        visitors::{rewrite_children, ExpressionRewriter},
        Expr, Lambda, Symbol,
    },
    logical_plan::{QueryOperator, ReducerKind},
    types::ElementType,
};

use super::navigation_tree::{CustomRootId, MappingId, NodeId};

/// An ordering requested by `OrderBy`/`ThenBy` and not yet emitted. The key
/// is kept in bound form so it can be re-expressed against whatever row
/// shape is current when the queue is flushed.
#[derive(Debug, Clone)]
pub struct PendingOrdering {
    pub key: Expr,
    pub descending: bool,
    pub then_by: bool,
}

/// Context threaded through the bottom-up rewrite of one operator subtree.
#[derive(Debug, Clone)]
pub struct ExpansionState {
    pub current_symbol: Symbol,
    pub source_mappings: Vec<MappingId>,
    /// Deferred projection; its single parameter is always `current_symbol`.
    pub pending_projection: Lambda,
    pub apply_pending_projection: bool,
    pub pending_orderings: Vec<PendingOrdering>,
    pub pending_include_chain: Option<NodeId>,
    pub pending_cardinality_reducer: Option<ReducerKind>,
    pub custom_root_paths: Vec<CustomRootId>,
    /// `Entity.Relationship` of a collection this subtree materializes.
    pub materialize_as_collection: Option<String>,
}

impl ExpansionState {
    pub fn new(current_symbol: Symbol, pending_body: Expr) -> Self {
        ExpansionState {
            pending_projection: Lambda::unary(current_symbol.clone(), pending_body),
            current_symbol,
            source_mappings: Vec::new(),
            apply_pending_projection: false,
            pending_orderings: Vec::new(),
            pending_include_chain: None,
            pending_cardinality_reducer: None,
            custom_root_paths: Vec::new(),
            materialize_as_collection: None,
        }
    }

    /// State of a row shape the pass does not look into: the whole row is a
    /// custom root with an empty path.
    pub fn opaque(current_symbol: Symbol, root: CustomRootId) -> Self {
        let mut state = ExpansionState::new(current_symbol, Expr::CustomRoot(root));
        state.custom_root_paths.push(root);
        state
    }

    pub fn owns_mapping(&self, mapping: MappingId) -> bool {
        self.source_mappings.contains(&mapping)
    }

    pub fn owns_custom_root(&self, root: CustomRootId) -> bool {
        self.custom_root_paths.contains(&root)
    }

    /// Moves the state onto a new row symbol. The pending projection is
    /// re-parameterized and must now be applied to recover the old shape.
    pub fn rebase(&mut self, symbol: Symbol) {
        let old = std::mem::replace(&mut self.current_symbol, symbol);
        self.pending_projection = Lambda::unary(
            self.current_symbol.clone(),
            replace_symbol(&self.pending_projection.body, &old, &self.current_symbol),
        );
        self.apply_pending_projection = true;
    }
}

/// The groups of a `GroupJoin`, found at `path` inside the custom root
/// `root`. `element` describes one row of a group; it is copied each time
/// the group is used as a source so every use joins on its own nodes.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub root: CustomRootId,
    pub path: Vec<String>,
    pub element: ExpansionState,
}

/// Moves bindings and custom roots of `expr` onto their copies.
pub(super) struct Relabel<'a> {
    pub nodes: &'a HashMap<NodeId, NodeId>,
    pub roots: &'a HashMap<CustomRootId, CustomRootId>,
}

impl Relabel<'_> {
    pub fn apply(&mut self, expr: &Expr) -> Expr {
        match self.rewrite_expr(expr) {
            Ok(relabeled) => relabeled,
            Err(never) => match never {},
        }
    }
}

impl ExpressionRewriter for Relabel<'_> {
    type Error = Infallible;

    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, Infallible> {
        match expr {
            Expr::NavigationBinding { node, entity } => Ok(Expr::NavigationBinding {
                node: self.nodes.get(node).copied().unwrap_or(*node),
                entity: entity.clone(),
            }),
            Expr::CustomRoot(root) => Ok(Expr::CustomRoot(
                self.roots.get(root).copied().unwrap_or(*root),
            )),
            _ => rewrite_children(self, expr),
        }
    }
}

/// A rewritten operator subtree together with the state describing its rows.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub source: Arc<QueryOperator>,
    pub state: ExpansionState,
}

impl Expansion {
    pub fn new(source: Arc<QueryOperator>, state: ExpansionState) -> Self {
        Expansion { source, state }
    }

    pub fn wrap(self, make: impl FnOnce(Arc<QueryOperator>) -> QueryOperator) -> Self {
        Expansion {
            source: Arc::new(make(self.source)),
            state: self.state,
        }
    }
}

/// Deterministic generator of correlation symbol names, unique within one
/// rewrite call.
#[derive(Debug, Default)]
pub struct SymbolGenerator {
    used: HashSet<String>,
}

impl SymbolGenerator {
    pub fn fresh(&mut self, base: &str, ty: ElementType) -> Symbol {
        let mut name = base.to_string();
        let mut n = 1;
        while self.used.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.used.insert(name.clone());
        Symbol::new(name, ty)
    }
}

/// Lowercased entity name used as a row symbol base: `OrderLine` -> `orderline`.
pub fn symbol_base(entity: &str) -> String {
    entity.to_lowercase()
}
