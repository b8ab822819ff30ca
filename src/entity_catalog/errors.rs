//! # Entity Model Error Types
//!
//! Errors raised while loading, validating and querying the entity catalog.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: unknown entity, relationship or field names
//! - **Definition Errors**: a catalog that violates a structural rule
//! - **Configuration Errors**: file I/O and parsing issues during loading

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntityModelError {
    #[error("No entity type named `{entity}`")]
    UnknownEntity { entity: String },
    #[error("Entity `{entity}` has no relationship named `{relationship}`")]
    UnknownRelationship { entity: String, relationship: String },
    #[error("Entity `{entity}` has no field named `{field}`")]
    UnknownField { entity: String, field: String },
    #[error("Invalid entity model: {message}")]
    InvalidDefinition { message: String },
    #[error("Failed to read entity model file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse entity model: {error}")]
    ConfigParseError { error: String },
}

impl EntityModelError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EntityModelError::InvalidDefinition {
            message: message.into(),
        }
    }
}
