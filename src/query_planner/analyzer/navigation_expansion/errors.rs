use thiserror::Error;

use crate::{entity_catalog::EntityModelError, query_planner::logical_plan::OperatorKind};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavigationExpansionError {
    #[error("{operator}: unsupported query shape: {reason}")]
    UnsupportedShape {
        operator: OperatorKind,
        reason: String,
    },

    #[error("{operator}: `{argument}` does not resolve to a relationship")]
    InvalidIncludeArgument {
        operator: OperatorKind,
        argument: String,
    },

    /// A collection navigation reached the join tree.
    #[error("{operator}: collection navigation `{relationship}` cannot be expanded into a join")]
    CollectionInJoinTree {
        operator: OperatorKind,
        relationship: String,
    },

    #[error("unknown entity type `{entity}`")]
    UnknownEntityType { entity: String },

    #[error("{operator}: navigation `{path}` is deeper than the configured limit of {limit}")]
    NavigationDepthExceeded {
        operator: OperatorKind,
        path: String,
        limit: u32,
    },

    #[error("operator nesting is deeper than the configured limit of {limit}")]
    OperatorDepthExceeded { limit: u32 },

    /// A bound navigation was unbound before its join was emitted.
    #[error("{operator}: navigation `{path}` was referenced but never expanded")]
    UnexpandedNavigation { operator: OperatorKind, path: String },

    #[error("rewritten tree still holds a navigation reference: {expr}")]
    TransientReferenceLeft { expr: String },

    #[error(transparent)]
    Metadata(#[from] EntityModelError),
}
