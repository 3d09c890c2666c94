//! Declaration types for entity schemas.

use serde::{Deserialize, Serialize};

/// Whether a reference field holds one key or a list of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// A single key, stored as a string (or absent).
    One,
    /// A set of keys, stored as an array without duplicates.
    Many,
}

/// Shape of an entity type's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Any string, typically a business key such as an email address.
    String,
    /// A generated UUID.
    Uuid,
}

/// Declaration of one reference field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceField {
    /// Field name on the owning entity type.
    pub name: String,
    /// One key or many.
    pub cardinality: Cardinality,
    /// Name of the referenced entity type.
    pub target: String,
    /// Back-reference field on the target type kept in sync with this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    /// The target lives outside this system and is never written to.
    #[serde(default)]
    pub external: bool,
    /// Key type of referenced ids. Inferred from the target when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
}

impl ReferenceField {
    /// Declares a single-valued reference.
    pub fn one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::One)
    }

    /// Declares a multi-valued reference.
    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::Many)
    }

    fn new(name: impl Into<String>, target: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            cardinality,
            target: target.into(),
            inverse: None,
            external: false,
            key_type: None,
        }
    }

    /// Names the inverse field on the target type.
    #[must_use]
    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    /// Marks the target as external.
    #[must_use]
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Declares the key type of referenced ids.
    #[must_use]
    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }
}

/// Declaration of an entity type.
///
/// ```rust
/// use linksync_core::{EntityType, ReferenceField};
///
/// let person = EntityType::new("person")
///     .key_field("email")
///     .attributes(["name", "appearances"])
///     .reference(ReferenceField::many("houses", "house").inverse("owners"))
///     .reference(ReferenceField::many("lovers", "person").inverse("lovers"));
/// assert_eq!(person.references.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    /// Type name, also used as the collection name.
    pub name: String,
    /// Attribute holding the business key. Keys are generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    /// Plain attribute fields.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Reference fields.
    #[serde(default)]
    pub references: Vec<ReferenceField>,
}

impl EntityType {
    /// Declares an entity type with generated keys and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: None,
            attributes: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Uses the named attribute as the primary key.
    #[must_use]
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Adds an attribute field.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Adds several attribute fields.
    #[must_use]
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a reference field.
    #[must_use]
    pub fn reference(mut self, field: ReferenceField) -> Self {
        self.references.push(field);
        self
    }

    /// Returns the key type implied by the key declaration.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        if self.key_field.is_some() {
            KeyType::String
        } else {
            KeyType::Uuid
        }
    }
}
