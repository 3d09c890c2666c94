//! Links projection.
//!
//! Documents returned to callers expose their reference fields separately from
//! plain attributes, under `links`. The projection is computed at read time
//! from the stored reference fields; there is no separate link storage.

use crate::diff::reference_ids;
use crate::error::LinkResult;
use crate::schema::{Cardinality, EntityDef};
use linksync_store::{Document, Key, Projection};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current value of one reference field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Link {
    /// A single-valued reference.
    One(Option<Key>),
    /// A multi-valued reference.
    Many(Vec<Key>),
}

impl Link {
    /// Returns the referenced keys.
    #[must_use]
    pub fn ids(&self) -> &[Key] {
        match self {
            Link::One(key) => key.as_slice(),
            Link::Many(keys) => keys,
        }
    }

    /// Returns the number of referenced keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids().len()
    }

    /// Returns true if nothing is referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Returns true if `key` is referenced.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.ids().contains(key)
    }
}

/// A document as returned to callers: key, attributes, and links.
///
/// Serializes as `{ "id": ..., <attributes>..., "links": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedDocument {
    /// Primary key.
    pub id: Key,
    /// Attribute fields that survived the projection.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    /// One entry per reference field of the entity type.
    pub links: BTreeMap<String, Link>,
}

impl LinkedDocument {
    /// Splits a stored document into attributes and links.
    ///
    /// `links` always carries every reference field of the type, whatever
    /// the projection selects. The business key field only appears among the
    /// attributes when the projection includes it; the key itself is always
    /// available as `id`.
    pub fn project(
        entity: &EntityDef,
        document: Document,
        projection: &Projection,
    ) -> LinkResult<Self> {
        let (id, mut fields) = document.into_parts();

        let mut links = BTreeMap::new();
        for field in entity.references() {
            let stored = fields.remove(&field.name);
            let ids = reference_ids(entity.name(), field, stored.as_ref())?;
            let link = match field.cardinality {
                Cardinality::One => Link::One(ids.into_iter().next()),
                Cardinality::Many => Link::Many(ids),
            };
            links.insert(field.name.clone(), link);
        }

        let attributes = fields
            .into_iter()
            .filter(|(name, _)| projection.includes(name))
            .collect();

        Ok(Self {
            id,
            attributes,
            links,
        })
    }

    /// Returns the link for a reference field.
    #[must_use]
    pub fn link(&self, field: &str) -> Option<&Link> {
        self.links.get(field)
    }

    /// Returns the keys referenced by `field`; empty for unknown fields.
    #[must_use]
    pub fn linked_ids(&self, field: &str) -> &[Key] {
        self.links.get(field).map(Link::ids).unwrap_or_default()
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Renders the document as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, ReferenceField, SchemaBuilder};
    use serde_json::json;

    fn person_def() -> EntityDef {
        SchemaBuilder::from_types([EntityType::new("person")
            .key_field("email")
            .attributes(["name", "appearances"])
            .reference(ReferenceField::one("soulmate", "person").inverse("soulmate"))
            .reference(ReferenceField::many("lovers", "person").inverse("lovers"))])
        .unwrap()
        .build()
        .unwrap()
        .entity("person")
        .unwrap()
        .clone()
    }

    fn stored() -> Document {
        let fields = json!({
            "email": "a@example.com",
            "name": "Ann",
            "appearances": 3,
            "lovers": ["b@example.com"]
        });
        Document::new(Key::new("a@example.com"), fields.as_object().cloned().unwrap())
    }

    #[test]
    fn links_cover_every_reference_field() {
        let doc = LinkedDocument::project(&person_def(), stored(), &Projection::all()).unwrap();
        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.link("soulmate"), Some(&Link::One(None)));
        assert_eq!(doc.linked_ids("lovers"), [Key::new("b@example.com")]);
        assert!(doc.attribute("lovers").is_none());
        assert_eq!(doc.attribute("email"), Some(&json!("a@example.com")));
    }

    #[test]
    fn projection_limits_attributes_not_links() {
        let doc =
            LinkedDocument::project(&person_def(), stored(), &Projection::select(["name"])).unwrap();
        assert_eq!(doc.id, Key::new("a@example.com"));
        assert_eq!(doc.attributes.len(), 1);
        assert!(doc.attribute("email").is_none());
        assert_eq!(doc.linked_ids("lovers").len(), 1);
    }

    #[test]
    fn serializes_with_id_and_links() {
        let doc =
            LinkedDocument::project(&person_def(), stored(), &Projection::select(["name"])).unwrap();
        assert_eq!(
            doc.to_json(),
            json!({
                "id": "a@example.com",
                "name": "Ann",
                "links": { "lovers": ["b@example.com"], "soulmate": null }
            })
        );
    }
}
