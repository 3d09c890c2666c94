//! Query filters and field projections.

use crate::document::{Document, Key};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Selects documents in a collection.
///
/// Conditions are conjunctive. An equality condition on an array field
/// matches when the array contains the value, mirroring MongoDB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    keys: Option<Vec<Key>>,
    conditions: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl Filter {
    /// Matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches the documents whose primary key is in `keys`.
    pub fn keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: Some(keys.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Adds an equality (or array-contains) condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.push((field.into(), value));
        self
    }

    /// Caps the number of returned documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the limit, if any.
    #[must_use]
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Returns true if `document` satisfies every condition.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        if let Some(keys) = &self.keys {
            if !keys.contains(document.key()) {
                return false;
            }
        }
        self.conditions
            .iter()
            .all(|(field, expected)| match document.get(field) {
                Some(actual @ Value::Array(items)) => {
                    items.contains(expected) || actual == expected
                }
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
    }
}

/// Restricts which stored fields are returned.
///
/// The primary key is carried by [`Document`] itself and can never be
/// projected away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    select: Option<BTreeSet<String>>,
}

impl Projection {
    /// Returns every field.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns only the named fields.
    pub fn select<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns true if no selection is applied.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.select.is_none()
    }

    /// Returns true if `field` survives the projection.
    #[must_use]
    pub fn includes(&self, field: &str) -> bool {
        self.select
            .as_ref()
            .map_or(true, |select| select.contains(field))
    }

    /// Returns a projection that additionally keeps `fields`.
    ///
    /// A projection returning everything stays unchanged.
    #[must_use]
    pub fn widened<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        match &self.select {
            None => Self::all(),
            Some(select) => {
                let mut select = select.clone();
                select.extend(fields.into_iter().map(str::to_string));
                Self {
                    select: Some(select),
                }
            }
        }
    }

    /// Applies the projection to a document.
    #[must_use]
    pub fn apply(&self, document: Document) -> Document {
        if self.is_all() {
            return document;
        }
        let (key, fields) = document.into_parts();
        let kept: Map<String, Value> = fields
            .into_iter()
            .filter(|(field, _)| self.includes(field))
            .collect();
        Document::new(key, kept)
    }
}
