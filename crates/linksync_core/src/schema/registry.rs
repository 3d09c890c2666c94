//! Validated, read-only schema registry.

use super::types::{Cardinality, EntityType, KeyType};
use crate::error::{LinkError, LinkResult};
use std::collections::{BTreeMap, BTreeSet};

/// Field names reserved by the links projection.
const RESERVED_FIELDS: [&str; 2] = ["id", "links"];

/// The resolved inverse side of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InverseDef {
    /// Inverse field name on the target type.
    pub field: String,
    /// Cardinality of the inverse field.
    pub cardinality: Cardinality,
}

/// A validated reference field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDef {
    /// Field name.
    pub name: String,
    /// One key or many.
    pub cardinality: Cardinality,
    /// Target entity type.
    pub target: String,
    /// Key type of referenced ids.
    pub key_type: KeyType,
    /// Resolved inverse, if any. Always `None` for external references.
    pub inverse: Option<InverseDef>,
    /// The target is not managed by this system.
    pub external: bool,
}

impl ReferenceDef {
    /// Returns true if changes to this field are mirrored on the target.
    #[must_use]
    pub fn propagates(&self) -> bool {
        !self.external && self.inverse.is_some()
    }

    /// Returns true if the field is its own inverse on its own type.
    #[must_use]
    pub fn is_self_inverse(&self, owner: &str) -> bool {
        self.target == owner
            && self
                .inverse
                .as_ref()
                .is_some_and(|inverse| inverse.field == self.name)
    }
}

/// A validated entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    name: String,
    key_field: Option<String>,
    key_type: KeyType,
    attributes: Vec<String>,
    references: Vec<ReferenceDef>,
}

impl EntityDef {
    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Business key attribute, if keys are not generated.
    #[must_use]
    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    /// Key type of this entity's documents.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Attribute fields, including the business key field.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Reference fields in declaration order.
    #[must_use]
    pub fn references(&self) -> &[ReferenceDef] {
        &self.references
    }

    /// Looks up one reference field.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&ReferenceDef> {
        self.references.iter().find(|field| field.name == name)
    }

    /// Iterates over reference field names.
    pub fn reference_names(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|field| field.name.as_str())
    }
}

/// Collects entity type declarations before validation.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: BTreeMap<String, EntityType>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from a list of declarations.
    pub fn from_types(types: impl IntoIterator<Item = EntityType>) -> LinkResult<Self> {
        let mut builder = Self::new();
        for entity in types {
            builder.define(entity)?;
        }
        Ok(builder)
    }

    /// Registers an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::DuplicateType`] if the name is already defined.
    pub fn define(&mut self, entity: EntityType) -> LinkResult<&mut Self> {
        if self.types.contains_key(&entity.name) {
            return Err(LinkError::DuplicateType { name: entity.name });
        }
        self.types.insert(entity.name.clone(), entity);
        Ok(self)
    }

    /// Validates every declaration and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSchema`] when a field name is duplicated or
    /// reserved, a managed reference targets an undefined type, an inverse is
    /// missing or not reciprocal, or declared key types disagree.
    pub fn build(self) -> LinkResult<Schema> {
        let mut types = BTreeMap::new();
        for entity in self.types.values() {
            let def = self.resolve(entity)?;
            types.insert(def.name.clone(), def);
        }
        tracing::debug!(types = types.len(), "schema built");
        Ok(Schema { types })
    }

    fn resolve(&self, entity: &EntityType) -> LinkResult<EntityDef> {
        if entity.name.is_empty() {
            return Err(LinkError::invalid_schema("entity type name is empty"));
        }

        let mut seen = BTreeSet::new();
        let names = entity
            .attributes
            .iter()
            .chain(entity.references.iter().map(|field| &field.name));
        for name in names {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(LinkError::invalid_schema(format!(
                    "{}.{name} uses a reserved field name",
                    entity.name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(LinkError::invalid_schema(format!(
                    "{}.{name} is declared more than once",
                    entity.name
                )));
            }
        }

        let mut attributes = entity.attributes.clone();
        if let Some(key_field) = &entity.key_field {
            if entity.references.iter().any(|field| &field.name == key_field) {
                return Err(LinkError::invalid_schema(format!(
                    "{}.{key_field} cannot be both key and reference",
                    entity.name
                )));
            }
            if RESERVED_FIELDS.contains(&key_field.as_str()) {
                return Err(LinkError::invalid_schema(format!(
                    "{}.{key_field} uses a reserved field name",
                    entity.name
                )));
            }
            if !attributes.contains(key_field) {
                attributes.push(key_field.clone());
            }
        }

        let references = entity
            .references
            .iter()
            .map(|field| self.resolve_reference(entity, field))
            .collect::<LinkResult<Vec<_>>>()?;

        Ok(EntityDef {
            name: entity.name.clone(),
            key_field: entity.key_field.clone(),
            key_type: entity.key_type(),
            attributes,
            references,
        })
    }

    fn resolve_reference(
        &self,
        owner: &EntityType,
        field: &super::types::ReferenceField,
    ) -> LinkResult<ReferenceDef> {
        let path = format!("{}.{}", owner.name, field.name);

        if field.external {
            if let Some(inverse) = &field.inverse {
                return Err(LinkError::invalid_schema(format!(
                    "{path} is external and cannot declare inverse {inverse}"
                )));
            }
            return Ok(ReferenceDef {
                name: field.name.clone(),
                cardinality: field.cardinality,
                target: field.target.clone(),
                key_type: field.key_type.unwrap_or(KeyType::String),
                inverse: None,
                external: true,
            });
        }

        let target = self.types.get(&field.target).ok_or_else(|| {
            LinkError::invalid_schema(format!(
                "{path} targets undefined type {}; mark it external if it is not managed here",
                field.target
            ))
        })?;

        let key_type = target.key_type();
        if let Some(declared) = field.key_type {
            if declared != key_type {
                return Err(LinkError::invalid_schema(format!(
                    "{path} declares key type {declared:?} but {} keys are {key_type:?}",
                    target.name
                )));
            }
        }

        let inverse = match &field.inverse {
            None => None,
            Some(inverse_name) => {
                let back = target
                    .references
                    .iter()
                    .find(|candidate| &candidate.name == inverse_name)
                    .ok_or_else(|| {
                        LinkError::invalid_schema(format!(
                            "{path} names inverse {}.{inverse_name}, which is not a reference field",
                            target.name
                        ))
                    })?;
                let reciprocal = !back.external
                    && back.target == owner.name
                    && back.inverse.as_deref() == Some(field.name.as_str());
                if !reciprocal {
                    return Err(LinkError::invalid_schema(format!(
                        "{path} and {}.{inverse_name} are not reciprocal inverses",
                        target.name
                    )));
                }
                Some(InverseDef {
                    field: back.name.clone(),
                    cardinality: back.cardinality,
                })
            }
        };

        Ok(ReferenceDef {
            name: field.name.clone(),
            cardinality: field.cardinality,
            target: field.target.clone(),
            key_type,
            inverse,
            external: false,
        })
    }
}

/// The immutable schema registry.
///
/// Built once at startup and shared read-only (typically behind an `Arc`) by
/// every engine and request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    types: BTreeMap<String, EntityDef>,
}

impl Schema {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Parses and validates a JSON array of [`EntityType`] declarations.
    pub fn from_json(json: &str) -> LinkResult<Self> {
        let types: Vec<EntityType> = serde_json::from_str(json)
            .map_err(|err| LinkError::invalid_schema(format!("cannot parse schema: {err}")))?;
        SchemaBuilder::from_types(types)?.build()
    }

    /// Looks up an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnknownType`] if it is not defined.
    pub fn entity(&self, name: &str) -> LinkResult<&EntityDef> {
        self.types.get(name).ok_or_else(|| LinkError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Returns the reference fields of an entity type.
    pub fn reference_fields_of(&self, name: &str) -> LinkResult<&[ReferenceDef]> {
        self.entity(name).map(EntityDef::references)
    }

    /// Returns true if the type is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Iterates over all entity types, ordered by name.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.types.values()
    }
}
