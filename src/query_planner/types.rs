use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity_catalog::{EntityModel, ScalarKind};

/// Field name of the left slot of a composite record.
pub const OUTER: &str = "Outer";
/// Field name of the right slot of a composite record.
pub const INNER: &str = "Inner";

/// Shape of the rows flowing between operators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ElementType {
    Entity(String),
    Scalar { kind: ScalarKind, nullable: bool },
    Record(Vec<(String, ElementType)>),
    /// The paired record introduced by joins: fields `Outer` and `Inner`.
    Composite(Box<ElementType>, Box<ElementType>),
    Sequence(Box<ElementType>),
    #[default]
    Unknown,
}

impl ElementType {
    pub fn entity(name: &str) -> Self {
        ElementType::Entity(name.to_string())
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        ElementType::Scalar {
            kind,
            nullable: false,
        }
    }

    pub fn composite(outer: ElementType, inner: ElementType) -> Self {
        ElementType::Composite(Box::new(outer), Box::new(inner))
    }

    pub fn sequence(element: ElementType) -> Self {
        ElementType::Sequence(Box::new(element))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ElementType::Scalar { nullable: true, .. })
    }

    /// The same type with nulls admitted; non-scalars are returned unchanged.
    pub fn as_nullable(&self) -> ElementType {
        match self {
            ElementType::Scalar { kind, .. } => ElementType::Scalar {
                kind: *kind,
                nullable: true,
            },
            other => other.clone(),
        }
    }

    pub fn entity_name(&self) -> Option<&str> {
        match self {
            ElementType::Entity(name) => Some(name),
            _ => None,
        }
    }

    /// Element type of a sequence, or the type itself for non-sequences.
    pub fn element(&self) -> &ElementType {
        match self {
            ElementType::Sequence(inner) => inner,
            other => other,
        }
    }

    /// Type of the member `name`, when this type has one.
    pub fn member_type(&self, model: &EntityModel, name: &str) -> Option<ElementType> {
        match self {
            ElementType::Entity(entity) => {
                let entity = model.find_entity(entity)?;
                if let Some(field) = entity.field(name) {
                    return Some(ElementType::Scalar {
                        kind: field.kind,
                        nullable: field.nullable,
                    });
                }
                let rel = entity.relationship(name)?;
                let target = ElementType::Entity(rel.target.clone());
                Some(if rel.is_collection {
                    ElementType::sequence(target)
                } else {
                    target
                })
            }
            ElementType::Record(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, ty)| ty.clone()),
            ElementType::Composite(outer, inner) => match name {
                OUTER => Some((**outer).clone()),
                INNER => Some((**inner).clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Follows `path` member by member; `None` when any step does not exist.
    pub fn resolve_path<S: AsRef<str>>(&self, model: &EntityModel, path: &[S]) -> Option<ElementType> {
        let mut current = self.clone();
        for segment in path {
            current = current.member_type(model, segment.as_ref())?;
        }
        Some(current)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Entity(name) => write!(f, "{}", name),
            ElementType::Scalar { kind, nullable } => {
                write!(f, "{}{}", kind, if *nullable { "?" } else { "" })
            }
            ElementType::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, " }}")
            }
            ElementType::Composite(outer, inner) => {
                write!(f, "<{}: {}, {}: {}>", OUTER, outer, INNER, inner)
            }
            ElementType::Sequence(element) => write!(f, "seq<{}>", element),
            ElementType::Unknown => write!(f, "?"),
        }
    }
}
