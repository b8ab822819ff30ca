use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::EntityModelError;

/// Scalar field kinds understood by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Datetime,
    Uuid,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Decimal => "decimal",
            ScalarKind::String => "string",
            ScalarKind::Datetime => "datetime",
            ScalarKind::Uuid => "uuid",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

/// Which end of a relationship a set of key fields lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipSide {
    /// The entity the relationship is declared on (the navigating side).
    Source,
    /// The entity the relationship points at.
    Target,
}

/// A typed reference from one entity to another, backed by a foreign key.
///
/// `foreign_key` always lives on the dependent entity and `principal_key` on
/// the principal one. When `is_owning_side` is set the declaring entity is the
/// dependent, so `source.foreign_key == target.principal_key`; otherwise the
/// declaring entity is the principal, so `source.principal_key == target.foreign_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub source: String,
    pub target: String,
    pub foreign_key: Vec<String>,
    pub principal_key: Vec<String>,
    pub is_owning_side: bool,
    pub is_collection: bool,
    pub is_optional: bool,
    pub inverse: Option<String>,
}

impl Relationship {
    fn dependent_side(&self) -> RelationshipSide {
        if self.is_owning_side {
            RelationshipSide::Source
        } else {
            RelationshipSide::Target
        }
    }

    /// Foreign-key fields held by `side`, empty when that side is the principal.
    pub fn foreign_key_fields_on(&self, side: RelationshipSide) -> &[String] {
        if side == self.dependent_side() {
            &self.foreign_key
        } else {
            &[]
        }
    }

    /// Key fields that take part in the join on `side`.
    pub fn key_fields_on(&self, side: RelationshipSide) -> &[String] {
        if side == self.dependent_side() {
            &self.foreign_key
        } else {
            &self.principal_key
        }
    }

    /// Fields compared on the navigating entity.
    pub fn outer_key_fields(&self) -> &[String] {
        self.key_fields_on(RelationshipSide::Source)
    }

    /// Fields compared on the target entity.
    pub fn inner_key_fields(&self) -> &[String] {
        self.key_fields_on(RelationshipSide::Target)
    }

    /// The relationship declared on the target that walks back to the source.
    pub fn inverse_side<'m>(&self, model: &'m EntityModel) -> Option<&'m Relationship> {
        let target = model.find_entity(&self.target)?;
        if let Some(inverse) = &self.inverse {
            return target.relationship(inverse);
        }
        target.relationships.iter().find(|rel| {
            rel.target == self.source
                && rel.inverse.as_deref() == Some(self.name.as_str())
        })
    }

    /// `Entity.Relationship`, used in logs and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.source, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub key: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<Relationship>,
}

impl EntityType {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.key.iter().filter_map(|k| self.field(k))
    }
}

/// Read-only entity metadata consumed by the planner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityModel {
    pub name: String,
    entities: Vec<EntityType>,
    index: BTreeMap<String, usize>,
}

impl EntityModel {
    /// Builds a model from already validated entity definitions.
    pub(crate) fn from_entities(name: String, entities: Vec<EntityType>) -> Self {
        let index = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        EntityModel {
            name,
            entities,
            index,
        }
    }

    pub fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    pub fn find_entity(&self, name: &str) -> Option<&EntityType> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType, EntityModelError> {
        self.find_entity(name)
            .ok_or_else(|| EntityModelError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    pub fn find_relationship(&self, entity: &str, name: &str) -> Option<&Relationship> {
        self.find_entity(entity)?.relationship(name)
    }

    pub fn relationship(&self, entity: &str, name: &str) -> Result<&Relationship, EntityModelError> {
        self.entity(entity)?
            .relationship(name)
            .ok_or_else(|| EntityModelError::UnknownRelationship {
                entity: entity.to_string(),
                relationship: name.to_string(),
            })
    }

    pub fn field(&self, entity: &str, name: &str) -> Result<&FieldDef, EntityModelError> {
        self.entity(entity)?
            .field(name)
            .ok_or_else(|| EntityModelError::UnknownField {
                entity: entity.to_string(),
                field: name.to_string(),
            })
    }

    /// Checks that `entity` is known before a scan of it is emitted.
    pub fn scan(
        &self,
        entity: &str,
    ) -> Result<crate::query_planner::logical_plan::QueryOperator, EntityModelError> {
        let entity = self.entity(entity)?;
        Ok(crate::query_planner::logical_plan::QueryOperator::scan(
            &entity.name,
        ))
    }
}
