//! Navigation trees and source mappings.
//!
//! All trees built while one query is rewritten live in a single
//! [`NavigationArena`]. Nodes, source mappings and custom roots are addressed
//! by index handles, so parent links and the shared path registrations are
//! plain indices rather than references.
//!
//! ```text
//! mapping#0 (Order, root nav#0, to_path [Outer])
//! └── nav#1 Customer  Complete  to_path [Inner]
//!     └── nav#2 Address  Pending
//! ```

use serde::{Deserialize, Serialize};

use crate::entity_catalog::Relationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingId(pub usize);

/// Handle of a path registered for a non-entity row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomRootId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionStatus {
    /// Known only through an inclusion hint; no join required.
    NotNeeded,
    /// Referenced by a bound expression, join not yet emitted.
    Pending,
    /// Joined; `to_path` locates the value in the current row shape.
    Complete,
}

#[derive(Debug, Clone)]
pub struct NavigationTreeNode {
    /// `None` for the root of a mapping.
    pub relationship: Option<Relationship>,
    pub entity: String,
    pub parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub status: ExpansionStatus,
    /// Set when this node or any ancestor may be absent.
    pub optional: bool,
    pub included: bool,
    pub to_path: Vec<String>,
    pub from_paths: Vec<Vec<String>>,
    pub mapping: MappingId,
}

impl NavigationTreeNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_collection(&self) -> bool {
        self.relationship.as_ref().is_some_and(|r| r.is_collection)
    }
}

/// One independent entity root visible to the query.
#[derive(Debug, Clone)]
pub struct SourceMapping {
    pub root_entity: String,
    pub root: NodeId,
    /// Custom root whose row shape holds this entity, when the mapping was
    /// recovered from a materialized projection.
    pub anchor: Option<CustomRootId>,
}

#[derive(Debug, Clone, Default)]
pub struct NavigationArena {
    nodes: Vec<NavigationTreeNode>,
    mappings: Vec<SourceMapping>,
    custom_roots: Vec<Vec<String>>,
}

impl NavigationArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new entity root. The root starts `Complete` with its value
    /// found at `path`.
    pub fn add_mapping(
        &mut self,
        root_entity: &str,
        path: Vec<String>,
        optional: bool,
        anchor: Option<CustomRootId>,
    ) -> MappingId {
        let mapping = MappingId(self.mappings.len());
        let root = NodeId(self.nodes.len());
        self.nodes.push(NavigationTreeNode {
            relationship: None,
            entity: root_entity.to_string(),
            parent: None,
            children: Vec::new(),
            status: ExpansionStatus::Complete,
            optional,
            included: false,
            to_path: path.clone(),
            from_paths: vec![path],
            mapping,
        });
        self.mappings.push(SourceMapping {
            root_entity: root_entity.to_string(),
            root,
            anchor,
        });
        mapping
    }

    pub fn mapping(&self, id: MappingId) -> &SourceMapping {
        &self.mappings[id.0]
    }

    pub fn node(&self, id: NodeId) -> &NavigationTreeNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NavigationTreeNode {
        &mut self.nodes[id.0]
    }

    pub fn root_of(&self, mapping: MappingId) -> NodeId {
        self.mappings[mapping.0].root
    }

    pub fn child(&self, parent: NodeId, relationship: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.iter().copied().find(|c| {
            self.nodes[c.0]
                .relationship
                .as_ref()
                .is_some_and(|r| r.name == relationship)
        })
    }

    /// Returns the child of `parent` for `relationship`, creating it when
    /// missing. Outside inclusion mode the child is marked `Pending`.
    pub fn get_or_add_child(
        &mut self,
        parent: NodeId,
        relationship: &Relationship,
        include: bool,
    ) -> NodeId {
        if let Some(existing) = self.child(parent, &relationship.name) {
            let node = &mut self.nodes[existing.0];
            if include {
                node.included = true;
            } else if node.status == ExpansionStatus::NotNeeded {
                node.status = ExpansionStatus::Pending;
            }
            return existing;
        }

        let id = NodeId(self.nodes.len());
        let parent_node = &self.nodes[parent.0];
        let from_paths = parent_node
            .from_paths
            .iter()
            .map(|p| {
                let mut path = p.clone();
                path.push(relationship.name.clone());
                path
            })
            .collect();
        let node = NavigationTreeNode {
            relationship: Some(relationship.clone()),
            entity: relationship.target.clone(),
            parent: Some(parent),
            children: Vec::new(),
            status: if include {
                ExpansionStatus::NotNeeded
            } else {
                ExpansionStatus::Pending
            },
            optional: parent_node.optional || relationship.is_optional,
            included: include,
            to_path: Vec::new(),
            from_paths,
            mapping: parent_node.mapping,
        };
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        log::trace!(
            "navigation tree: added nav#{} {} under nav#{}",
            id.0,
            relationship.qualified_name(),
            parent.0
        );
        id
    }

    /// Number of relationship hops between `node` and its root.
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.0].parent;
        }
        depth
    }

    /// Relationship names from the root down to `node`.
    pub fn relationship_path(&self, node: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.nodes[id.0];
            if let Some(rel) = &n.relationship {
                path.push(rel.name.clone());
            }
            current = n.parent;
        }
        path.reverse();
        path
    }

    /// Every node of a mapping, pre-order, children in creation order.
    pub fn nodes_of(&self, mapping: MappingId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root_of(mapping)];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Copies the whole tree of `mapping` with its statuses and paths into a
    /// new mapping. Returns it with each copied node next to its original.
    pub fn copy_mapping(
        &mut self,
        mapping: MappingId,
        anchor: Option<CustomRootId>,
    ) -> (MappingId, Vec<(NodeId, NodeId)>) {
        let copy = MappingId(self.mappings.len());
        self.mappings.push(SourceMapping {
            root_entity: self.mappings[mapping.0].root_entity.clone(),
            root: NodeId(self.nodes.len()),
            anchor,
        });

        let mut copies: Vec<(NodeId, NodeId)> = Vec::new();
        for original in self.nodes_of(mapping) {
            let id = NodeId(self.nodes.len());
            let mut node = self.nodes[original.0].clone();
            node.mapping = copy;
            node.children = Vec::new();
            node.parent = node
                .parent
                .and_then(|p| copies.iter().find(|(o, _)| *o == p).map(|(_, c)| *c));
            if let Some(parent) = node.parent {
                self.nodes[parent.0].children.push(id);
            }
            self.nodes.push(node);
            copies.push((original, id));
        }
        log::trace!(
            "navigation tree: copied mapping#{} as mapping#{} ({} nodes)",
            mapping.0,
            copy.0,
            copies.len()
        );
        (copy, copies)
    }

    /// Marks every node of the mapping optional.
    pub fn make_optional(&mut self, mapping: MappingId) {
        for id in self.nodes_of(mapping) {
            self.nodes[id.0].optional = true;
        }
    }

    pub fn add_custom_root(&mut self, path: Vec<String>) -> CustomRootId {
        self.custom_roots.push(path);
        CustomRootId(self.custom_roots.len() - 1)
    }

    pub fn custom_root_path(&self, id: CustomRootId) -> &[String] {
        &self.custom_roots[id.0]
    }

    pub fn prepend_to_custom_root(&mut self, id: CustomRootId, marker: &str) {
        self.custom_roots[id.0].insert(0, marker.to_string());
    }

    pub fn prepend_to_node(&mut self, id: NodeId, marker: &str) {
        self.nodes[id.0].to_path.insert(0, marker.to_string());
    }

    /// Mappings anchored at `root`, in creation order.
    pub fn mappings_anchored_at(&self, root: CustomRootId) -> impl Iterator<Item = MappingId> + '_ {
        self.mappings
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.anchor == Some(root))
            .map(|(i, _)| MappingId(i))
    }

    /// Plain export of a mapping for downstream consumers.
    pub fn view(&self, mapping: MappingId) -> SourceMappingView {
        let nodes = self
            .nodes_of(mapping)
            .into_iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                NavigationNodeView {
                    relationship_path: self.relationship_path(id),
                    entity: node.entity.clone(),
                    status: node.status,
                    optional: node.optional,
                    included: node.included,
                    to_path: node.to_path.clone(),
                    from_paths: node.from_paths.clone(),
                }
            })
            .collect();
        SourceMappingView {
            root_entity: self.mappings[mapping.0].root_entity.clone(),
            nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationNodeView {
    /// Empty for the root.
    pub relationship_path: Vec<String>,
    pub entity: String,
    pub status: ExpansionStatus,
    pub optional: bool,
    pub included: bool,
    pub to_path: Vec<String>,
    pub from_paths: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMappingView {
    pub root_entity: String,
    pub nodes: Vec<NavigationNodeView>,
}

impl SourceMappingView {
    pub fn node(&self, relationship_path: &[&str]) -> Option<&NavigationNodeView> {
        self.nodes
            .iter()
            .find(|n| n.relationship_path.iter().map(String::as_str).eq(relationship_path.iter().copied()))
    }
}
