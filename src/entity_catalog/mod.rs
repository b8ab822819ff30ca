//! Read-only entity metadata: entity types, their scalar fields and the
//! relationships between them.

pub mod config;
pub mod entity_model;
pub mod errors;

pub use config::{load_entity_model, EntityModelConfig};
pub use entity_model::{
    EntityModel, EntityType, FieldDef, Relationship, RelationshipSide, ScalarKind,
};
pub use errors::EntityModelError;
