/// Entity model configuration management.
///
/// Loads entity definitions from YAML, validates them and builds the
/// read-only [`EntityModel`] used by the planner.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::entity_model::{EntityModel, EntityType, FieldDef, Relationship, ScalarKind};
use super::errors::EntityModelError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ScalarKind,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipDefinition {
    pub name: String,
    pub target: String,
    pub foreign_key: Vec<String>,
    /// Defaults to the principal entity's key.
    #[serde(default)]
    pub principal_key: Option<Vec<String>>,
    #[serde(default = "default_owning")]
    pub owning: bool,
    #[serde(default)]
    pub collection: bool,
    /// Defaults to `!owning || any foreign-key field nullable`.
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(default)]
    pub inverse: Option<String>,
}

fn default_owning() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDefinition {
    pub name: String,
    pub key: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

impl EntityDefinition {
    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    fn field_nullable(&self, name: &str) -> bool {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.nullable)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityModelConfig {
    #[serde(default)]
    pub name: String,
    pub entities: Vec<EntityDefinition>,
}

impl EntityModelConfig {
    /// Load an entity model definition from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, EntityModelError> {
        let contents = fs::read_to_string(path).map_err(|e| EntityModelError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse an entity model definition from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, EntityModelError> {
        serde_yaml::from_str(yaml).map_err(|e| EntityModelError::ConfigParseError {
            error: e.to_string(),
        })
    }

    fn find(&self, name: &str) -> Option<&EntityDefinition> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Structural validation of the definitions
    pub fn validate(&self) -> Result<(), EntityModelError> {
        if self.entities.is_empty() {
            return Err(EntityModelError::invalid(
                "Model must contain at least one entity definition",
            ));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                return Err(EntityModelError::invalid(format!(
                    "Duplicate entity name: {}",
                    entity.name
                )));
            }
        }

        for entity in &self.entities {
            self.validate_entity(entity)?;
        }

        Ok(())
    }

    fn validate_entity(&self, entity: &EntityDefinition) -> Result<(), EntityModelError> {
        if entity.key.is_empty() {
            return Err(EntityModelError::invalid(format!(
                "Entity {} declares an empty key",
                entity.name
            )));
        }
        if let Some(missing) = entity.key.iter().find(|k| !entity.has_field(k)) {
            return Err(EntityModelError::invalid(format!(
                "Key field {} is not declared on entity {}",
                missing, entity.name
            )));
        }

        let mut seen = HashSet::new();
        for rel in &entity.relationships {
            if !seen.insert(rel.name.as_str()) || entity.has_field(&rel.name) {
                return Err(EntityModelError::invalid(format!(
                    "Member {}.{} is declared more than once",
                    entity.name, rel.name
                )));
            }
            self.validate_relationship(entity, rel)?;
        }

        Ok(())
    }

    fn validate_relationship(
        &self,
        entity: &EntityDefinition,
        rel: &RelationshipDefinition,
    ) -> Result<(), EntityModelError> {
        let qualified = format!("{}.{}", entity.name, rel.name);
        let target = self.find(&rel.target).ok_or_else(|| {
            EntityModelError::invalid(format!(
                "Relationship {} targets unknown entity {}",
                qualified, rel.target
            ))
        })?;

        if rel.collection && rel.owning {
            return Err(EntityModelError::invalid(format!(
                "Collection relationship {} cannot be the owning side",
                qualified
            )));
        }

        let (dependent, principal) = if rel.owning {
            (entity, target)
        } else {
            (target, entity)
        };

        if rel.foreign_key.is_empty() {
            return Err(EntityModelError::invalid(format!(
                "Relationship {} declares an empty foreign key",
                qualified
            )));
        }
        if let Some(missing) = rel.foreign_key.iter().find(|f| !dependent.has_field(f)) {
            return Err(EntityModelError::invalid(format!(
                "Foreign key field {} of {} is not declared on {}",
                missing, qualified, dependent.name
            )));
        }

        let principal_key = rel.principal_key.as_ref().unwrap_or(&principal.key);
        if let Some(missing) = principal_key.iter().find(|f| !principal.has_field(f)) {
            return Err(EntityModelError::invalid(format!(
                "Principal key field {} of {} is not declared on {}",
                missing, qualified, principal.name
            )));
        }
        if principal_key.len() != rel.foreign_key.len() {
            return Err(EntityModelError::invalid(format!(
                "Relationship {} compares {} foreign key fields against {} principal key fields",
                qualified,
                rel.foreign_key.len(),
                principal_key.len()
            )));
        }

        if let Some(inverse) = &rel.inverse {
            if !target.relationships.iter().any(|r| &r.name == inverse) {
                return Err(EntityModelError::invalid(format!(
                    "Inverse {} of {} is not declared on {}",
                    inverse, qualified, target.name
                )));
            }
        }

        Ok(())
    }

    /// Validate and build the read-only model
    pub fn build(&self) -> Result<EntityModel, EntityModelError> {
        self.validate()?;

        let mut entities = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            let fields = entity
                .fields
                .iter()
                .map(|f| FieldDef {
                    name: f.name.clone(),
                    kind: f.kind,
                    nullable: f.nullable,
                })
                .collect();

            let mut relationships = Vec::with_capacity(entity.relationships.len());
            for rel in &entity.relationships {
                let target = self.find(&rel.target).ok_or_else(|| {
                    EntityModelError::UnknownEntity {
                        entity: rel.target.clone(),
                    }
                })?;
                let (dependent, principal) = if rel.owning {
                    (entity, target)
                } else {
                    (target, entity)
                };
                let principal_key = rel
                    .principal_key
                    .clone()
                    .unwrap_or_else(|| principal.key.clone());
                let is_optional = rel.optional.unwrap_or_else(|| {
                    !rel.owning || rel.foreign_key.iter().any(|f| dependent.field_nullable(f))
                });

                relationships.push(Relationship {
                    name: rel.name.clone(),
                    source: entity.name.clone(),
                    target: rel.target.clone(),
                    foreign_key: rel.foreign_key.clone(),
                    principal_key,
                    is_owning_side: rel.owning,
                    is_collection: rel.collection,
                    is_optional,
                    inverse: rel.inverse.clone(),
                });
            }

            entities.push(EntityType {
                name: entity.name.clone(),
                key: entity.key.clone(),
                fields,
                relationships,
            });
        }

        log::debug!(
            "Built entity model '{}' with {} entities",
            self.name,
            entities.len()
        );

        Ok(EntityModel::from_entities(self.name.clone(), entities))
    }
}

/// Load, validate and build a model from a YAML file.
pub fn load_entity_model<P: AsRef<Path>>(path: P) -> Result<EntityModel, EntityModelError> {
    EntityModelConfig::from_yaml_file(path)?.build()
}
